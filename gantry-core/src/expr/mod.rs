mod cache;
mod order;
mod predicate;
mod translate;

pub use cache::*;
pub use order::*;
pub use predicate::*;
pub use translate::*;
