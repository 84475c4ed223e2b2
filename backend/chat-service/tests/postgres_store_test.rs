//! PostgresStore against a live database.
//!
//! Run with `DATABASE_URL=postgres://... cargo test --test postgres_store_test -- --ignored`.
//! Every test works on fresh user ids, so runs can share one database.

use chat_service::config::DatabaseConfig;
use chat_service::db;
use chat_service::models::{MessageContent, UserId};
use chat_service::services::{ConversationDirectory, MessageStore};
use chat_service::storage::PostgresStore;
use deadpool_postgres::Pool;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

// concurrent CREATE TABLE IF NOT EXISTS can still conflict in the catalog
static MIGRATIONS: Mutex<()> = Mutex::const_new(());

async fn create_test_pool() -> Pool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let _guard = MIGRATIONS.lock().await;
    db::init_pool(&DatabaseConfig {
        url,
        max_connections: 16,
    })
    .await
    .expect("Failed to create test pool")
}

async fn setup() -> (Pool, ConversationDirectory, MessageStore) {
    let pool = create_test_pool().await;
    let store = Arc::new(PostgresStore::new(pool.clone()));
    (
        pool,
        ConversationDirectory::new(store.clone()),
        MessageStore::new(store),
    )
}

fn fresh_user(label: &str) -> UserId {
    UserId::from(format!("{label}-{}", Uuid::new_v4()))
}

fn text(s: &str) -> MessageContent {
    MessageContent::Text { text: s.to_string() }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires database setup
async fn test_concurrent_direct_creation_leaves_one_row() {
    let (pool, directory, _) = setup().await;
    let alice = fresh_user("alice");
    let bob = fresh_user("bob");

    let tasks = (0..20).map(|i| {
        let directory = directory.clone();
        let (a, b) = if i % 2 == 0 {
            (alice.clone(), bob.clone())
        } else {
            (bob.clone(), alice.clone())
        };
        tokio::spawn(async move { directory.find_or_create_direct(&a, &b).await })
    });

    let ids: HashSet<Uuid> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().id)
        .collect();
    assert_eq!(ids.len(), 1);

    let client = pool.get().await.unwrap();
    let row = client
        .query_one(
            r#"
            SELECT COUNT(*) FROM conversations c
            WHERE c.is_group = FALSE
              AND EXISTS (SELECT 1 FROM conversation_participants p
                          WHERE p.conversation_id = c.id AND p.user_id = $1)
            "#,
            &[&alice.as_str()],
        )
        .await
        .unwrap();
    let count: i64 = row.get(0);
    assert_eq!(count, 1);

    let conversation = directory.get(*ids.iter().next().unwrap()).await.unwrap();
    assert!(conversation.is_direct_between(&alice, &bob));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_groups_with_same_members_get_separate_rows() {
    let (_, directory, _) = setup().await;
    let members = vec![fresh_user("a"), fresh_user("b")];

    let first = directory
        .create_group(members.clone(), Some("one".into()), None)
        .await
        .unwrap();
    let second = directory
        .create_group(members, Some("one".into()), None)
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(directory.get(second.id).await.unwrap().participants.len(), 2);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_sequence_numbers_and_timestamps_round_trip() {
    let (_, directory, messages) = setup().await;
    let sender = fresh_user("sender");
    let conversation = directory
        .find_or_create_direct(&sender, &fresh_user("peer"))
        .await
        .unwrap();

    let mut sent = Vec::new();
    for i in 0..3 {
        sent.push(
            messages
                .append(conversation.id, &sender, text(&format!("m{i}")))
                .await
                .unwrap(),
        );
    }
    assert_eq!(
        sent.iter().map(|m| m.sequence_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    // the returned record equals what a later read sees
    for message in &sent {
        assert_eq!(&messages.get(message.id).await.unwrap(), message);
    }

    let page = messages
        .list_visible(conversation.id, None, 0, 10)
        .await
        .unwrap();
    assert_eq!(page, sent);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_recall_rewrites_matching_preview_only() {
    let (_, directory, messages) = setup().await;
    let sender = fresh_user("sender");
    let conversation = directory
        .find_or_create_direct(&sender, &fresh_user("peer"))
        .await
        .unwrap();

    let older = messages.append(conversation.id, &sender, text("old")).await.unwrap();
    let newer = messages.append(conversation.id, &sender, text("new")).await.unwrap();
    directory
        .update_preview_and_touch(conversation.id, &newer.summary())
        .await
        .unwrap();
    // a stale preview never replaces a newer one
    let stored = directory
        .update_preview_and_touch(conversation.id, &older.summary())
        .await
        .unwrap();
    assert_eq!(stored.last_message, Some(newer.summary()));
    assert_eq!(stored.seen_by, vec![sender.clone()]);

    assert!(!directory.recall_preview(conversation.id, older.id).await.unwrap());

    let recalled = messages.recall(newer.id, &sender).await.unwrap();
    assert_eq!(recalled.content, MessageContent::Recalled);
    assert_eq!(recalled.created_at, newer.created_at);
    assert!(directory.recall_preview(conversation.id, newer.id).await.unwrap());

    let preview = directory
        .get(conversation.id)
        .await
        .unwrap()
        .last_message
        .unwrap();
    assert_eq!(preview.message_id, newer.id);
    assert_eq!(preview.content, MessageContent::Recalled);
    assert_eq!(preview.created_at, newer.created_at);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_watermark_hides_earlier_messages() {
    let (_, directory, messages) = setup().await;
    let sender = fresh_user("sender");
    let viewer = fresh_user("viewer");
    let conversation = directory
        .find_or_create_direct(&sender, &viewer)
        .await
        .unwrap();

    messages.append(conversation.id, &sender, text("before")).await.unwrap();
    let cleared = directory.clear_history(conversation.id, &viewer).await.unwrap();
    let watermark = cleared.participant(&viewer).unwrap().delete_watermark;
    assert!(watermark.is_some());

    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let after = messages.append(conversation.id, &sender, text("after")).await.unwrap();

    let visible = messages
        .list_visible(conversation.id, watermark, 0, 10)
        .await
        .unwrap();
    assert_eq!(visible, vec![after]);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_last_leaver_stamps_dissolved_at() {
    let (_, directory, _) = setup().await;
    let a = fresh_user("a");
    let b = fresh_user("b");
    let group = directory
        .create_group(vec![a.clone(), b.clone()], None, None)
        .await
        .unwrap();

    let after_first = directory.remove_member(group.id, &a).await.unwrap();
    assert!(after_first.dissolved_at.is_none());
    assert_eq!(after_first.participants.len(), 1);

    let after_last = directory.remove_member(group.id, &b).await.unwrap();
    assert!(after_last.participants.is_empty());
    assert!(after_last.dissolved_at.is_some());
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_mute_and_seen_are_per_user() {
    let (_, directory, messages) = setup().await;
    let sender = fresh_user("sender");
    let peer = fresh_user("peer");
    let conversation = directory
        .find_or_create_direct(&sender, &peer)
        .await
        .unwrap();

    let message = messages.append(conversation.id, &sender, text("hi")).await.unwrap();
    directory
        .update_preview_and_touch(conversation.id, &message.summary())
        .await
        .unwrap();

    let seen = directory.mark_seen(conversation.id, &peer).await.unwrap();
    assert_eq!(seen.seen_by, vec![sender.clone(), peer.clone()]);
    let again = directory.mark_seen(conversation.id, &peer).await.unwrap();
    assert_eq!(again.seen_by.len(), 2);

    let muted = directory.set_muted(conversation.id, &peer, true).await.unwrap();
    assert!(muted.participant(&peer).unwrap().muted);
    assert!(!muted.participant(&sender).unwrap().muted);
}
