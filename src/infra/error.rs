//! Failures raised while wiring the process together: database pool and
//! migrations, telemetry, startup settings and the shutdown signal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("shutdown signal listener failed: {0}")]
    Signal(#[from] std::io::Error),
    #[error("database unavailable: {message}")]
    Database { message: String },
    #[error("schema migration failed: {message}")]
    Migration { message: String },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("setting `{key}` is required for this command")]
    MissingSetting { key: &'static str },
}

impl InfraError {
    pub fn database(err: impl ToString) -> Self {
        Self::Database {
            message: err.to_string(),
        }
    }

    pub fn migration(err: impl ToString) -> Self {
        Self::Migration {
            message: err.to_string(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
