//! Postgres-backed repository implementations.

mod meta;
mod pieces;
mod util;

pub use util::map_sqlx_error;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::infra::error::InfraError;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared pool implementing every repository trait.
#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: NonZeroU32) -> Result<Self, InfraError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.get())
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), InfraError> {
        sqlx::migrate!("./migrations").run(self.pool()).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
