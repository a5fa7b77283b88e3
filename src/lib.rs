pub use gantry_core::*;
pub use gantry_macros::{Entity, col, expr};
