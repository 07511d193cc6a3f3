// koalabot-core/src/db/mod.rs

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::{error, info};

use crate::Error;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    /// Create a new Database connection.
    pub async fn new(database_url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        info!("Connected to Postgres");
        Ok(Self { pool })
    }

    /// Connects and migrates when a URL is configured. Any failure is logged
    /// and yields `None`; the caller then runs without a durable store.
    pub async fn connect_optional(database_url: Option<&str>) -> Option<Self> {
        let Some(url) = database_url else {
            info!("No DATABASE_URL; running without a durable store.");
            return None;
        };
        let db = match Self::new(url).await {
            Ok(db) => db,
            Err(e) => {
                error!("Could not connect to Postgres, continuing in memory: {}", e);
                return None;
            }
        };
        if let Err(e) = db.migrate().await {
            error!("Migrations failed, continuing in memory: {}", e);
            db.close().await;
            return None;
        }
        Some(db)
    }

    /// Run migrations in the `migrations/` folder.
    pub async fn migrate(&self) -> Result<(), Error> {
        info!("Applying migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations applied successfully.");
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
