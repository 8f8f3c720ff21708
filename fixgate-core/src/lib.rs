#[macro_use]
extern crate slog;

pub mod config;
pub mod error;
pub mod logger;

pub use error::{GatewayError, Result};
