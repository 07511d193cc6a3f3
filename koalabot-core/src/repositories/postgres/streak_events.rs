// src/repositories/postgres/streak_events.rs
use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder, Row};

use koalabot_common::models::StreakEventRow;
use koalabot_common::traits::StreakEventRepository;
use crate::Error;

use super::BULK_BATCH_SIZE;

#[derive(Clone)]
pub struct PostgresStreakEventRepository {
    pool: Pool<Postgres>,
}

impl PostgresStreakEventRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreakEventRepository for PostgresStreakEventRepository {
    async fn get_streak_events(&self, channel_id: &str, word: &str) -> Result<Vec<StreakEventRow>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT channel_id, badword, user_id, user_name, timestamp
            FROM badword_events
            WHERE channel_id = $1 AND badword = $2
            ORDER BY timestamp ASC
            "#
        )
            .bind(channel_id)
            .bind(word)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(StreakEventRow {
                channel_id: r.try_get("channel_id")?,
                word: r.try_get("badword")?,
                user_id: r.try_get("user_id")?,
                user_name: r.try_get("user_name")?,
                timestamp_ms: r.try_get("timestamp")?,
            });
        }
        Ok(out)
    }

    /// Rows already present are skipped, so repeating a migration is harmless.
    async fn bulk_insert_streak_events(&self, rows: &[StreakEventRow]) -> Result<(), Error> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        for chunk in rows.chunks(BULK_BATCH_SIZE) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO badword_events (channel_id, badword, user_id, user_name, timestamp) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.channel_id)
                    .push_bind(&row.word)
                    .push_bind(&row.user_id)
                    .push_bind(&row.user_name)
                    .push_bind(row.timestamp_ms);
            });
            qb.push(" ON CONFLICT (channel_id, badword, user_id, timestamp) DO NOTHING");
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_streak_event(&self, row: &StreakEventRow) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO badword_events (channel_id, badword, user_id, user_name, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (channel_id, badword, user_id, timestamp) DO NOTHING
            "#
        )
            .bind(&row.channel_id)
            .bind(&row.word)
            .bind(&row.user_id)
            .bind(&row.user_name)
            .bind(row.timestamp_ms)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
