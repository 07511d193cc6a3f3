// File: koalabot-core/tests/analytics_tests.rs

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

use koalabot_common::models::ResponseTier;
use koalabot_common::traits::DurableStore;
use koalabot_core::cache::{MessageCache, Stenographer};
use koalabot_core::eventbus::{BotEvent, EventBus};
use koalabot_core::services::{AnalyticsState, ChatListener, StreakListener};

use test_utils::{chat, leaderboard_for, InMemoryStore};

/// Polls until `check` holds or a second passes.
async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[test]
fn capacity_two_cache_keeps_last_two_events() {
    let mut cache = MessageCache::new(2);
    for content in ["E1", "E2", "E3"] {
        cache.push_message(Arc::new(chat("g1", "c1", "alice", content, 0)));
    }
    let contents: Vec<&str> = cache.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["E2", "E3"]);
    assert_eq!(cache.count_by_author("alice"), 2);
}

#[test]
fn history_tree_loads_each_scope_independently() {
    let root = tempfile::tempdir().unwrap();
    let file = "discord_messages.log";

    std::fs::write(
        root.path().join(file),
        "{\"message\":\"alice<@1>: global one\"}\n{\"message\":\"bob<@2>: global two\"}\n",
    )
    .unwrap();

    let guild_dir = root.path().join("g1");
    std::fs::create_dir_all(guild_dir.join("c1")).unwrap();
    std::fs::create_dir_all(guild_dir.join("c2")).unwrap();
    std::fs::write(
        guild_dir.join(file),
        "{\"message\":\"alice<@1>: heck\"}\n{\"message\":\"alice<@1>: HECK\"}\n{\"message\":\"bob<@2>: hi\"}\n",
    )
    .unwrap();
    std::fs::write(guild_dir.join("c1").join(file), "{\"message\":\"alice<@1>: in c1\"}\n").unwrap();
    std::fs::write(guild_dir.join("c2").join(file), "][ total garbage").unwrap();

    // guild directory with no files at all
    std::fs::create_dir_all(root.path().join("g2")).unwrap();

    let mut steno = Stenographer::new(100);
    steno.load_history(root.path(), file);

    assert_eq!(steno.global_messages().len(), 2);
    assert_eq!(steno.guild_messages("g1").len(), 3);
    assert_eq!(steno.channel_messages("c1").len(), 1);
    assert!(steno.channel_messages("c2").is_empty());
    assert!(steno.guild_messages("g2").is_empty());
    assert_eq!(steno.message_count("g1", "alice"), 2);

    let mut lb = leaderboard_for(&[("heck", &["heck"])]);
    lb.recalculate_all(&steno);
    assert_eq!(lb.count("g1", "alice", "heck"), 2);
    assert_eq!(lb.count("g1", "bob", "heck"), 0);
}

#[test]
fn heck_twice_counts_two() {
    let mut steno = Stenographer::new(100);
    let mut lb = leaderboard_for(&[("heck", &["heck"])]);
    for content in ["heck", "HECK"] {
        let ev = steno.push_message(chat("g1", "c1", "alice", content, 0));
        lb.observe(&ev, &steno);
    }
    assert_eq!(lb.count("g1", "alice", "heck"), 2);
}

#[test]
fn leader_ties_and_strict_overtake() {
    let mut steno = Stenographer::new(100);
    let mut lb = leaderboard_for(&[("heck", &["heck"])]);
    let mut say = |author: &str| {
        let ev = steno.push_message(chat("g1", "c1", author, "heck", 0));
        lb.observe(&ev, &steno)
    };
    for _ in 0..3 {
        say("A");
    }
    for _ in 0..3 {
        say("B");
    }
    drop(say);
    assert_eq!(lb.leader("g1", "heck", false, &[], &steno).unwrap().author, "A");

    let ev = steno.push_message(chat("g1", "c1", "B", "heck", 0));
    let changes = lb.observe(&ev, &steno);
    assert_eq!(changes.len(), 1);
    assert_eq!(lb.leader("g1", "heck", false, &[], &steno).unwrap().author, "B");
}

#[tokio::test]
async fn live_messages_reach_the_store_in_the_background() {
    let store = Arc::new(InMemoryStore::new());
    let mut steno = Stenographer::new(100);
    let mut lb = leaderboard_for(&[("heck", &["heck"])]);
    lb.set_store(Some(store.clone() as Arc<dyn DurableStore>));

    for content in ["heck", "hello", "heck"] {
        let ev = steno.push_message(chat("g1", "c1", "alice", content, 0));
        lb.observe(&ev, &steno);
    }

    assert!(eventually(|| store.word_count("g1", "alice", "heck") == 2).await);
    assert!(eventually(|| store.message_count("g1", "alice") == 3).await);
}

#[tokio::test]
async fn store_failures_never_reach_the_chat_path() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_guild("g1");
    store.fail_channel("c1");

    let dir = tempfile::tempdir().unwrap();
    let mut lb = leaderboard_for(&[("heck", &["heck"])]);
    lb.set_store(Some(store.clone() as Arc<dyn DurableStore>));
    let mut streak = StreakListener::new("heck", ResponseTier::Always, vec!["c1".into()], dir.path());
    streak.set_store(Some(store.clone() as Arc<dyn DurableStore>));

    let mut state = AnalyticsState::new(Stenographer::new(100), lb, vec![streak]);
    state.handle_chat(chat("g1", "c1", "alice", "heck", 1_000));
    let replies = state.handle_chat(chat("g1", "c1", "alice", "heck", 5_000));

    assert_eq!(state.leaderboard.count("g1", "alice", "heck"), 2);
    assert_eq!(replies.len(), 1);
    assert!(replies[0].starts_with("RESET THE CLOCK!"));
    state.flush().await;
    assert!(store.leaderboard.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unavailable_store_receives_nothing() {
    let store = Arc::new(InMemoryStore::new());
    store.set_available(false);

    let mut steno = Stenographer::new(100);
    let mut lb = leaderboard_for(&[("heck", &["heck"])]);
    lb.set_store(Some(store.clone() as Arc<dyn DurableStore>));
    let ev = steno.push_message(chat("g1", "c1", "alice", "heck", 0));
    lb.observe(&ev, &steno);

    sleep(Duration::from_millis(50)).await;
    assert!(store.leaderboard.lock().unwrap().is_empty());
    assert!(store.message_counts.lock().unwrap().is_empty());
    assert_eq!(lb.count("g1", "alice", "heck"), 1);
}

#[tokio::test]
async fn chat_listener_publishes_replies_on_the_bus() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(EventBus::new());
    let lb = leaderboard_for(&[("heck", &["heck"])]);
    let streak = StreakListener::new("heck", ResponseTier::RecordsOnly, vec!["c1".into()], dir.path());
    let state = Arc::new(Mutex::new(AnalyticsState::new(Stenographer::new(100), lb, vec![streak])));

    let mut replies = bus.subscribe(None).await;
    let handle = ChatListener::new(state.clone(), bus.clone())
        .with_self_author_id("bot-id")
        .spawn()
        .await;

    // A leads, then B overtakes on their second message.
    bus.publish_chat(chat("g1", "c0", "A", "heck", 0)).await;
    bus.publish_chat(chat("g1", "c0", "B", "heck", 1)).await;
    bus.publish_chat(koalabot_common::models::ChatEvent::new("g1", "c0", "koala", "bot-id", "heck", 3)).await;
    bus.publish_chat(chat("g1", "c0", "B", "heck", 4)).await;

    let reply = timeout(Duration::from_secs(2), async {
        loop {
            match replies.recv().await {
                Some(BotEvent::ChatReply { channel_id, text, .. }) => return (channel_id, text),
                Some(_) => continue,
                None => panic!("bus closed"),
            }
        }
    })
    .await
    .expect("a reply should be published");

    assert_eq!(reply.0, "c0");
    assert_eq!(reply.1, "Congrats B, you've surpassed A at saying heck!");

    bus.shutdown();
    handle.await.unwrap();

    let state = state.lock().await;
    // the bot's own message was never cached or counted
    assert_eq!(state.leaderboard.count("g1", "koala", "heck"), 0);
    assert_eq!(state.stenographer.guild_messages("g1").len(), 3);
}

#[tokio::test]
async fn reply_bursts_never_stall_the_listener() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(EventBus::new());
    let lb = leaderboard_for(&[("heck", &["heck"])]);
    let streak = StreakListener::new("heck", ResponseTier::Always, vec!["c1".into()], dir.path());
    let state = Arc::new(Mutex::new(AnalyticsState::new(Stenographer::new(100), lb, vec![streak])));

    let seen = Arc::new(AtomicUsize::new(0));
    let mut replies = bus.subscribe(Some(4)).await;
    let counter = seen.clone();
    tokio::spawn(async move {
        while let Some(event) = replies.recv().await {
            if matches!(event, BotEvent::ChatReply { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    let handle = ChatListener::new(state.clone(), bus.clone())
        .with_buffer_size(4)
        .spawn()
        .await;

    // every message after the first produces a streak reply, 399 in all
    let producer = {
        let bus = bus.clone();
        async move {
            for i in 0..400 {
                bus.publish_chat(chat("g1", "c1", "alice", "heck", i * 1_000)).await;
            }
        }
    };
    assert!(timeout(Duration::from_secs(10), producer).await.is_ok(), "producer stalled");
    assert!(eventually(|| seen.load(Ordering::SeqCst) >= 399).await);

    bus.shutdown();
    handle.await.unwrap();
    assert_eq!(state.lock().await.leaderboard.count("g1", "alice", "heck"), 400);
}
