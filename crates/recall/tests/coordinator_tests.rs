//! Integration tests for the multi-entity coordinator

use std::sync::Arc;
use std::time::Duration;

use recall_engine::config::Config;
use recall_engine::coordinator::Coordinator;
use recall_engine::memory::{InMemoryArchive, MemoryItem, Role};
use recall_engine::oracle::OracleError;
use recall_engine::testing::ScriptedOracle;
use recall_engine::{RecallError, TurnState};

fn config() -> Config {
    let mut config = Config::default();
    config.memory.l1_threshold = 2;
    config.memory.keep_recent = false;
    config.oracle.timeout_secs = 1;
    config
}

fn coordinator(responder: ScriptedOracle) -> Coordinator {
    coordinator_with(config(), responder)
}

fn coordinator_with(config: Config, responder: ScriptedOracle) -> Coordinator {
    Coordinator::new(
        config,
        Arc::new(ScriptedOracle::new("We chatted.")),
        Arc::new(responder),
        Arc::new(InMemoryArchive::new()),
    )
}

#[tokio::test]
async fn test_conversation_compresses_each_side_independently() {
    let coord = coordinator(ScriptedOracle::new("Sounds good."));
    coord.register("alice", "Alice").unwrap();
    coord.register("bob", "Bob").unwrap();

    for i in 0..3 {
        coord
            .speak("alice", "bob", &format!("point {i}"))
            .await
            .unwrap();
    }

    let alice = coord.entity("alice").unwrap();
    let alice = alice.lock().await;
    // three assistant messages on alice's side close three exchanges
    assert_eq!(alice.stats().summary_count, 1);

    let bob = coord.entity("bob").unwrap();
    let bob = bob.lock().await;
    let stats = bob.stats();
    assert_eq!(stats.l1_count, 1);
    assert_eq!(stats.raw_count, 2);
    match &bob.store().items()[0] {
        MemoryItem::Summary(summary) => assert_eq!(summary.covers.len(), 4),
        other => panic!("expected a summary first, got {other:?}"),
    }
}

#[tokio::test]
async fn test_response_uses_receiver_context() {
    let mut config = config();
    config.memory.l1_threshold = 5;
    let coord = coordinator_with(config, ScriptedOracle::new("Noted."));
    coord.register("alice", "Alice").unwrap();
    coord.register("bob", "Bob").unwrap();

    coord
        .append("bob", "my favourite colour is green", Role::User)
        .await
        .unwrap();
    coord.speak("alice", "bob", "what do you like?").await.unwrap();

    let bob = coord.entity("bob").unwrap();
    let context = bob.lock().await.build_context("", None);
    assert!(context.contains("user: my favourite colour is green"));
    assert!(context.ends_with("assistant: Noted."));
}

#[tokio::test]
async fn test_response_timeout_surfaces_error() {
    let coord = coordinator(ScriptedOracle::slow("too late", Duration::from_secs(5)));
    coord.register("alice", "Alice").unwrap();
    coord.register("bob", "Bob").unwrap();

    let err = coord.speak("alice", "bob", "hello?").await.unwrap_err();
    assert!(matches!(
        err,
        RecallError::Oracle(OracleError::Timeout(_))
    ));

    let alice = coord.entity("alice").unwrap();
    assert_eq!(alice.lock().await.stats().raw_count, 1);
    let bob = coord.entity("bob").unwrap();
    let bob = bob.lock().await;
    assert!(bob.store().is_empty());
    assert_eq!(bob.turn_state(), TurnState::Idle);
}

#[tokio::test]
async fn test_entities_run_concurrently() {
    let coord = Arc::new(coordinator(ScriptedOracle::new("ok")));
    for name in ["a", "b", "c", "d"] {
        coord.register(name, name).unwrap();
    }

    let pairs = [("a", "b"), ("c", "d"), ("b", "c"), ("d", "a")];
    let handles: Vec<_> = pairs
        .into_iter()
        .map(|(from, to)| {
            let coord = coord.clone();
            tokio::spawn(async move {
                for i in 0..5 {
                    coord
                        .speak(from, to, &format!("{from} to {to} #{i}"))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    for name in ["a", "b", "c", "d"] {
        let engine = coord.entity(name).unwrap();
        let engine = engine.lock().await;
        let stats = engine.stats();
        let sum: usize = engine
            .store()
            .items()
            .iter()
            .map(|i| i.character_count())
            .sum();
        assert_eq!(stats.total_characters, sum);
        assert_eq!(engine.turn_state(), TurnState::Idle);
    }
}

#[tokio::test]
async fn test_concurrent_appends_to_one_entity_are_serialized() {
    let coord = Arc::new(coordinator(ScriptedOracle::new("ok")));
    coord.register("solo", "Solo").unwrap();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let coord = coord.clone();
            tokio::spawn(async move {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                coord.append("solo", &format!("message {i}"), role).await
            })
        })
        .collect();
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().item.id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 20);

    let engine = coord.entity("solo").unwrap();
    let engine = engine.lock().await;
    let represented: usize = engine
        .store()
        .items()
        .iter()
        .map(|item| item.message_count())
        .sum();
    assert_eq!(represented, 20);
}
