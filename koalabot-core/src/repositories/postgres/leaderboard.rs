// src/repositories/postgres/leaderboard.rs
use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder, Row};
use tracing::debug;

use koalabot_common::models::LeaderboardRow;
use koalabot_common::traits::LeaderboardRepository;
use crate::Error;

use super::BULK_BATCH_SIZE;

#[derive(Clone)]
pub struct PostgresLeaderboardRepository {
    pool: Pool<Postgres>,
}

impl PostgresLeaderboardRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaderboardRepository for PostgresLeaderboardRepository {
    async fn get_leaderboard_rows(&self, guild_id: &str) -> Result<Vec<LeaderboardRow>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT guild_id, user_name, word, count
            FROM leaderboard_stats
            WHERE guild_id = $1
            ORDER BY user_name, word
            "#
        )
            .bind(guild_id)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(LeaderboardRow {
                guild_id: r.try_get("guild_id")?,
                user_name: r.try_get("user_name")?,
                word: r.try_get("word")?,
                count: r.try_get("count")?,
            });
        }
        Ok(out)
    }

    /// Existing cells keep the larger of the stored and incoming counts.
    async fn bulk_upsert_leaderboard(&self, rows: &[LeaderboardRow]) -> Result<(), Error> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        for chunk in rows.chunks(BULK_BATCH_SIZE) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO leaderboard_stats (guild_id, user_name, word, count) ");
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.guild_id)
                    .push_bind(&row.user_name)
                    .push_bind(&row.word)
                    .push_bind(row.count);
            });
            qb.push(
                " ON CONFLICT (guild_id, user_name, word) \
                  DO UPDATE SET count = GREATEST(leaderboard_stats.count, EXCLUDED.count)",
            );
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!("Upserted {} leaderboard rows", rows.len());
        Ok(())
    }

    async fn increment_word_count(&self, guild_id: &str, user_name: &str, word: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO leaderboard_stats (guild_id, user_name, word, count)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (guild_id, user_name, word)
            DO UPDATE SET count = leaderboard_stats.count + 1
            "#
        )
            .bind(guild_id)
            .bind(user_name)
            .bind(word)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
