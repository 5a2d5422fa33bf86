//! Shared test utilities

pub mod test_app;

#[allow(unused_imports)]
pub use test_app::{test_config, TestApp, TestResponse};
