// File: koalabot-core/src/tasks/bootstrap_sync.rs
//
// Startup-only merge of in-memory state with the durable store. Each guild
// (leaderboard) and channel (streaks) is its own unit: a failure is logged
// and the next unit still runs.

use indexmap::IndexMap;
use tracing::{debug, error, info, instrument, warn};

use koalabot_common::models::{StreakEvent, StreakEventRow};
use koalabot_common::traits::DurableStore;

use crate::Error;
use crate::cache::Stenographer;
use crate::services::leaderboard_service::ProfanityLeaderboard;
use crate::services::streak_service::StreakListener;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LeaderboardSyncReport {
    /// Guilds whose in-memory state was pushed to an empty store.
    pub pushed: Vec<String>,
    /// Guilds whose in-memory state was raised from durable rows.
    pub pulled: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreakSyncReport {
    pub migrated: Vec<String>,
    pub merged: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncDirection {
    Pushed,
    Pulled,
    Unchanged,
}

/// For every guild known to the caches or the leaderboard: push leaderboard
/// cells and message counts when the store has none, otherwise raise
/// in-memory values to the durable ones.
#[instrument(skip_all)]
pub async fn sync_leaderboard_startup_data(
    store: &dyn DurableStore,
    leaderboard: &mut ProfanityLeaderboard,
    stenographer: &Stenographer,
) -> LeaderboardSyncReport {
    let mut report = LeaderboardSyncReport::default();
    if !store.is_available() {
        warn!("Durable store unavailable; skipping leaderboard reconciliation");
        return report;
    }

    let mut guild_ids: Vec<String> = stenographer
        .guild_ids()
        .chain(leaderboard.guild_ids())
        .map(str::to_string)
        .collect();
    guild_ids.sort();
    guild_ids.dedup();

    for guild_id in guild_ids {
        let leaderboard_result = sync_guild_leaderboard(store, leaderboard, &guild_id).await;
        let counts_result = sync_guild_message_counts(store, leaderboard, stenographer, &guild_id).await;

        match (leaderboard_result, counts_result) {
            (Ok(direction), Ok(_)) => match direction {
                SyncDirection::Pushed => report.pushed.push(guild_id),
                SyncDirection::Pulled => report.pulled.push(guild_id),
                SyncDirection::Unchanged => {}
            },
            (Err(e), _) | (_, Err(e)) => {
                error!("Leaderboard reconciliation failed for guild {}: {:?}", guild_id, e);
                report.failed.push(guild_id);
            }
        }
    }

    info!(
        "Leaderboard reconciliation done: {} pushed, {} pulled, {} failed",
        report.pushed.len(),
        report.pulled.len(),
        report.failed.len()
    );
    report
}

async fn sync_guild_leaderboard(
    store: &dyn DurableStore,
    leaderboard: &mut ProfanityLeaderboard,
    guild_id: &str,
) -> Result<SyncDirection, Error> {
    let rows = store.get_leaderboard_rows(guild_id).await?;
    if !rows.is_empty() {
        debug!("Applying {} durable leaderboard rows for guild {}", rows.len(), guild_id);
        leaderboard.apply_durable_rows(guild_id, &rows);
        return Ok(SyncDirection::Pulled);
    }

    let local = leaderboard.leaderboard_rows(guild_id);
    if local.is_empty() {
        return Ok(SyncDirection::Unchanged);
    }
    info!("First run for guild {}: pushing {} leaderboard rows", guild_id, local.len());
    store.bulk_upsert_leaderboard(&local).await?;
    Ok(SyncDirection::Pushed)
}

async fn sync_guild_message_counts(
    store: &dyn DurableStore,
    leaderboard: &mut ProfanityLeaderboard,
    stenographer: &Stenographer,
    guild_id: &str,
) -> Result<SyncDirection, Error> {
    let rows = store.get_message_counts(guild_id).await?;
    if !rows.is_empty() {
        for row in &rows {
            leaderboard.raise_message_total(guild_id, &row.user_name, row.count.max(0) as u64);
        }
        return Ok(SyncDirection::Pulled);
    }

    let local = leaderboard.message_count_rows(guild_id, stenographer);
    if local.is_empty() {
        return Ok(SyncDirection::Unchanged);
    }
    store.bulk_upsert_message_counts(&local).await?;
    Ok(SyncDirection::Pushed)
}

/// Pushes every in-memory streak event to the store (conflicts are no-ops),
/// then merges each channel's durable events back into memory.
#[instrument(skip_all, fields(word = %listener.word()))]
pub async fn sync_streak_startup_data(store: &dyn DurableStore, listener: &mut StreakListener) -> StreakSyncReport {
    let mut report = StreakSyncReport::default();
    if !store.is_available() {
        warn!("Durable store unavailable; skipping streak reconciliation");
        return report;
    }

    let word = listener.word().to_string();
    let channels = listener.tracking_channels().to_vec();

    for channel_id in &channels {
        let rows: Vec<StreakEventRow> = listener
            .tracked_events(channel_id)
            .iter()
            .map(|ev| StreakEventRow::from_event(channel_id, &word, ev))
            .collect();
        if rows.is_empty() {
            continue;
        }
        match store.bulk_insert_streak_events(&rows).await {
            Ok(()) => report.migrated.push(channel_id.clone()),
            Err(e) => {
                error!("Failed to migrate '{}' streak events for channel {}: {:?}", word, channel_id, e);
                report.failed.push(channel_id.clone());
            }
        }
    }

    for channel_id in &channels {
        let durable = match store.get_streak_events(channel_id, &word).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Failed to load '{}' streak events for channel {}: {:?}", word, channel_id, e);
                if !report.failed.contains(channel_id) {
                    report.failed.push(channel_id.clone());
                }
                continue;
            }
        };
        if durable.is_empty() {
            continue;
        }
        let durable: Vec<StreakEvent> = durable.into_iter().map(StreakEventRow::into_event).collect();
        let merged = merge_streak_events(listener.tracked_events(channel_id), &durable);
        debug!("Channel {} now has {} '{}' events", channel_id, merged.len(), word);
        listener.replace_events(channel_id, merged);
        report.merged.push(channel_id.clone());
    }

    report
}

/// Union of both lists keyed by `userId:timestamp`, later entries replacing
/// earlier ones, sorted by timestamp. Equal timestamps keep first-seen order.
pub fn merge_streak_events(in_memory: &[StreakEvent], durable: &[StreakEvent]) -> Vec<StreakEvent> {
    let mut by_key: IndexMap<String, StreakEvent> = IndexMap::new();
    for ev in in_memory.iter().chain(durable) {
        by_key.insert(ev.dedup_key(), ev.clone());
    }
    let mut merged: Vec<StreakEvent> = by_key.into_values().collect();
    merged.sort_by_key(|ev| ev.timestamp_ms);
    merged
}
