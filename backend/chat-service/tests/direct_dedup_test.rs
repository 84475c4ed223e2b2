mod common;

use common::{user, Harness};
use futures::future::join_all;
use std::collections::HashSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_direct_creation_yields_one_conversation() {
    let h = Harness::new();

    let tasks = (0..20).map(|i| {
        let state = h.state.clone();
        tokio::spawn(async move {
            // half the callers pass the pair in the opposite order
            let (a, b) = if i % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
            state
                .conversations
                .find_or_create_direct(&user(a), &user(b))
                .await
        })
    });

    let ids: HashSet<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().id)
        .collect();

    assert_eq!(ids.len(), 1);
    assert_eq!(h.store.conversation_count().await, 1);
}

#[tokio::test]
async fn direct_conversation_with_self_is_rejected() {
    let h = Harness::new();
    let result = h
        .state
        .conversations
        .find_or_create_direct(&user("alice"), &user("alice"))
        .await;
    assert!(result.is_err());
    assert_eq!(h.store.conversation_count().await, 0);
}
