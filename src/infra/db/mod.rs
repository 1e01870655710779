//! Postgres adapter for the durable store.
//!
//! Posts, comments, users and communities live here. The fast store never reads this
//! module directly; the application layer goes through the repository traits.

mod comments;
mod communities;
mod posts;
mod users;
mod util;

use util::map_sqlx_error;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::application::repos::RepoError;
use crate::config::DatabaseSettings;
use crate::infra::error::InfraError;

const SOURCE: &str = "infra::db";

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: PgPool,
}

impl PostgresRepositories {
    /// Connect with the configured pool size and bring the schema up to date.
    pub async fn open(settings: &DatabaseSettings) -> Result<Self, InfraError> {
        let url = settings.url.as_deref().ok_or(InfraError::MissingSetting {
            key: "database.url",
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections.get())
            .connect(url)
            .await
            .map_err(InfraError::database)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(InfraError::migration)?;

        info!(
            target = SOURCE,
            max_connections = settings.max_connections.get(),
            "durable store ready"
        );
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}
