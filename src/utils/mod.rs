//! Utility modules

pub mod error;
pub mod tokens;

pub use error::{AppError, AppResult, ErrorResponse};
