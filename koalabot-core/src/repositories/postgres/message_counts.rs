// src/repositories/postgres/message_counts.rs
use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder, Row};

use koalabot_common::models::MessageCountRow;
use koalabot_common::traits::MessageCountRepository;
use crate::Error;

use super::BULK_BATCH_SIZE;

#[derive(Clone)]
pub struct PostgresMessageCountRepository {
    pool: Pool<Postgres>,
}

impl PostgresMessageCountRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageCountRepository for PostgresMessageCountRepository {
    async fn get_message_counts(&self, guild_id: &str) -> Result<Vec<MessageCountRow>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT guild_id, user_name, count
            FROM message_counts
            WHERE guild_id = $1
            ORDER BY user_name
            "#
        )
            .bind(guild_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|r| -> Result<MessageCountRow, Error> {
                Ok(MessageCountRow {
                    guild_id: r.try_get("guild_id")?,
                    user_name: r.try_get("user_name")?,
                    count: r.try_get("count")?,
                })
            })
            .collect()
    }

    async fn bulk_upsert_message_counts(&self, rows: &[MessageCountRow]) -> Result<(), Error> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        for chunk in rows.chunks(BULK_BATCH_SIZE) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO message_counts (guild_id, user_name, count) ");
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.guild_id)
                    .push_bind(&row.user_name)
                    .push_bind(row.count);
            });
            qb.push(
                " ON CONFLICT (guild_id, user_name) \
                  DO UPDATE SET count = GREATEST(message_counts.count, EXCLUDED.count)",
            );
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn increment_message_count(&self, guild_id: &str, user_name: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO message_counts (guild_id, user_name, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (guild_id, user_name)
            DO UPDATE SET count = message_counts.count + 1
            "#
        )
            .bind(guild_id)
            .bind(user_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
