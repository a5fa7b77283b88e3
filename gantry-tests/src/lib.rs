//! Test suite for Gantry drivers. Ships an in-memory scripted driver, a set
//! of mapped entities and helpers the scenario tests build on.

mod entities;
mod fake;

pub use entities::*;
pub use fake::*;

use gantry::{DbContext, Value};
use std::time::Duration;

/// A context over the given fake driver with fast retry timings.
pub fn context(driver: FakeDriver) -> DbContext<FakeDriver> {
    DbContext::builder(driver)
        .retry_base_delay(Duration::from_millis(1))
        .build()
}

pub fn int(v: i32) -> Value {
    Value::Int32(Some(v))
}

pub fn long(v: i64) -> Value {
    Value::Int64(Some(v))
}

pub fn text(v: &str) -> Value {
    Value::Varchar(Some(v.into()))
}

pub fn flag(v: bool) -> Value {
    Value::Boolean(Some(v))
}

/// Initialize logging once for the binary; harmless to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
