mod commands;
mod queries;
mod service;
pub mod types;

pub use service::*;
pub use types::{ensure_non_empty, validate_page};
