//! Integration tests for the compression scheduler
//!
//! Drives a real store with scripted oracles through the trigger scenarios:
//! exchange threshold, budget pressure, oracle failure, hierarchical merge.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use recall_engine::compression::{CompressionScheduler, SkipReason};
use recall_engine::config::MemoryConfig;
use recall_engine::memory::{
    ArchiveStore, InMemoryArchive, ItemId, MemoryStore, Role, SummaryItem, SummaryMetadata,
};
use recall_engine::testing::{FailingArchive, ScriptedOracle};

const PERSONA: &str = "Ada";

fn memory_config(max_characters: usize, l1_threshold: usize, keep_recent: bool) -> MemoryConfig {
    MemoryConfig {
        max_characters,
        l1_threshold,
        keep_recent,
        ..MemoryConfig::default()
    }
}

fn scheduler(config: &MemoryConfig, oracle: Arc<ScriptedOracle>) -> CompressionScheduler {
    CompressionScheduler::new(config.clone(), oracle, "en", Duration::from_secs(5))
}

fn new_store(config: &MemoryConfig) -> (MemoryStore, Arc<InMemoryArchive>) {
    let archive = Arc::new(InMemoryArchive::new());
    (
        MemoryStore::new("ada", config.max_characters, archive.clone()),
        archive,
    )
}

fn assert_budget_consistent(store: &MemoryStore) {
    let sum: usize = store.items().iter().map(|i| i.character_count()).sum();
    assert_eq!(store.budget().current_characters, sum);
}

mod threshold_tests {
    use super::*;

    #[tokio::test]
    async fn test_three_exchanges_make_one_l1() {
        let config = memory_config(10_000, 3, false);
        let oracle = Arc::new(ScriptedOracle::new("We introduced ourselves."));
        let sched = scheduler(&config, oracle.clone());
        let (mut store, archive) = new_store(&config);

        let mut appended = Vec::new();
        let mut created = Vec::new();
        for i in 0..3 {
            for (role, text) in [(Role::User, "question"), (Role::Assistant, "answer")] {
                appended.push(store.append(format!("{text} {i}"), role).id);
                let report = sched.evaluate(&mut store, PERSONA).await.unwrap();
                created.extend(report.created);
            }
        }

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].level, 1);
        let expected: BTreeSet<ItemId> = appended.iter().cloned().collect();
        assert_eq!(created[0].covers, expected);

        let stats = store.stats();
        assert_eq!(stats.raw_count, 0);
        assert_eq!(stats.l1_count, 1);
        assert_eq!(archive.lookup(&created[0].id).unwrap().len(), 6);
        assert_eq!(oracle.summarize_calls(), 1);
        assert_budget_consistent(&store);
    }

    #[tokio::test]
    async fn test_keep_recent_holds_back_newest_two() {
        let config = memory_config(10_000, 3, true);
        let oracle = Arc::new(ScriptedOracle::new("We introduced ourselves."));
        let sched = scheduler(&config, oracle.clone());
        let (mut store, _) = new_store(&config);

        let mut appended = Vec::new();
        for i in 0..3 {
            appended.push(store.append(format!("question {i}"), Role::User).id);
            sched.evaluate(&mut store, PERSONA).await.unwrap();
            appended.push(store.append(format!("answer {i}"), Role::Assistant).id);
            sched.evaluate(&mut store, PERSONA).await.unwrap();
        }
        // only two exchanges are outside the reserved window so far
        assert_eq!(store.stats().summary_count, 0);

        store.append("question 3", Role::User);
        sched.evaluate(&mut store, PERSONA).await.unwrap();
        store.append("answer 3", Role::Assistant);
        let report = sched.evaluate(&mut store, PERSONA).await.unwrap();

        assert_eq!(report.created.len(), 1);
        let expected: BTreeSet<ItemId> = appended.iter().cloned().collect();
        assert_eq!(report.created[0].covers, expected);
        assert_eq!(store.stats().raw_count, 2);
        assert_eq!(store.items()[0].level(), 1);
    }

    #[tokio::test]
    async fn test_user_only_stream_is_summarized() {
        let config = memory_config(10_000, 5, false);
        let oracle = Arc::new(ScriptedOracle::new("They kept talking."));
        let sched = scheduler(&config, oracle.clone());
        let (mut store, archive) = new_store(&config);

        let mut appended = Vec::new();
        let mut created = Vec::new();
        for i in 0..20 {
            appended.push(store.append(format!("note {i}"), Role::User).id);
            let report = sched.evaluate(&mut store, PERSONA).await.unwrap();
            created.extend(report.created);
            assert_budget_consistent(&store);
        }

        // a summary every five unanswered turns, the newest turn left waiting
        assert_eq!(created.len(), 3);
        for (n, summary) in created.iter().enumerate() {
            let expected: BTreeSet<ItemId> = appended[n * 5..n * 5 + 5].iter().cloned().collect();
            assert_eq!(summary.covers, expected);
            assert_eq!(archive.lookup(&summary.id).unwrap().len(), 5);
        }
        let stats = store.stats();
        assert_eq!(stats.l1_count, 3);
        assert_eq!(stats.raw_count, 5);
    }

    #[tokio::test]
    async fn test_trailing_user_turn_does_not_close_exchange() {
        let config = memory_config(10_000, 3, false);
        let oracle = Arc::new(ScriptedOracle::new("unused"));
        let sched = scheduler(&config, oracle.clone());
        let (mut store, _) = new_store(&config);

        for (text, role) in [
            ("question 0", Role::User),
            ("answer 0", Role::Assistant),
            ("question 1", Role::User),
            ("answer 1", Role::Assistant),
            ("question 2", Role::User),
        ] {
            store.append(text, role);
            let report = sched.evaluate(&mut store, PERSONA).await.unwrap();
            assert!(report.is_noop());
        }
        assert_eq!(oracle.summarize_calls(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_items_is_noop() {
        let config = memory_config(10_000, 5, true);
        let oracle = Arc::new(ScriptedOracle::new("unused"));
        let sched = scheduler(&config, oracle.clone());
        let (mut store, _) = new_store(&config);

        for i in 0..4 {
            store.append(format!("message {i}"), Role::Assistant);
            let report = sched.evaluate(&mut store, PERSONA).await.unwrap();
            assert!(report.is_noop());
        }
        assert_eq!(oracle.summarize_calls(), 0);
    }

    #[tokio::test]
    async fn test_summary_metadata_is_filled_in() {
        let config = memory_config(10_000, 1, false);
        let oracle = Arc::new(ScriptedOracle::new(
            "I remember we talked about travel plans and music for the summer.",
        ));
        let sched = scheduler(&config, oracle.clone());
        let (mut store, _) = new_store(&config);

        store.append("Where should we travel this summer?", Role::User);
        store.append("Somewhere with good music festivals.", Role::Assistant);
        let report = sched.evaluate(&mut store, PERSONA).await.unwrap();

        let summary = store.get(&report.created[0].id).unwrap().as_summary().unwrap();
        assert_eq!(summary.metadata.original_message_count, 2);
        assert!(summary.metadata.compression_ratio > 0.0);
        assert!(summary.metadata.quality_score >= 0.5);
        assert!(summary.topics.contains(&"travel".to_string()));
        assert!(summary.topics.contains(&"music".to_string()));

        let request = &oracle.requests()[0];
        assert_eq!(request.len(), 2);
        assert_eq!(request[0].label, "user");
    }
}

mod budget_tests {
    use super::*;

    #[tokio::test]
    async fn test_budget_trigger_brings_store_under_ceiling() {
        let config = memory_config(100, 3, true);
        let oracle = Arc::new(ScriptedOracle::new("short recap"));
        let sched = scheduler(&config, oracle.clone());
        let (mut store, _) = new_store(&config);

        let mut created = 0;
        let mut total_appended = 0;
        for i in 0..6 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            let text = format!("message number {i:02} here!!!"); // 25 chars
            total_appended += text.chars().count();
            store.append(text, role);
            let report = sched.evaluate(&mut store, PERSONA).await.unwrap();
            assert!(!report.budget_inconsistent);
            created += report.created.len();
            assert_budget_consistent(&store);
        }

        assert_eq!(total_appended, 150);
        assert!(created >= 1);
        assert!(store.stats().l1_count >= 1);
        assert!(store.budget().current_characters <= 100);
    }

    #[tokio::test]
    async fn test_irreducible_store_reports_inconsistency() {
        let config = memory_config(10, 5, false);
        let oracle = Arc::new(ScriptedOracle::new("unused"));
        let sched = scheduler(&config, oracle.clone());
        let (mut store, _) = new_store(&config);

        store.append("a single message that is far too long", Role::User);
        let report = sched.evaluate(&mut store, PERSONA).await.unwrap();

        assert!(report.budget_inconsistent);
        assert!(report.created.is_empty());
        assert_eq!(store.len(), 1);
        assert_eq!(oracle.summarize_calls(), 0);
    }

    #[tokio::test]
    async fn test_merge_creates_l2_from_oldest_l1s() {
        let config = MemoryConfig {
            merge_threshold: 2,
            ..memory_config(100, 100, false)
        };
        let oracle = Arc::new(ScriptedOracle::new("merged"));
        let sched = scheduler(&config, oracle.clone());
        let (mut store, archive) = new_store(&config);

        let mut l1_ids = Vec::new();
        for i in 0..4 {
            let a = store.append(format!("ask{i}"), Role::User).id;
            let b = store.append(format!("ans{i}"), Role::Assistant).id;
            let covers: BTreeSet<ItemId> = [a, b].into_iter().collect();
            let summary = SummaryItem::new(
                store.next_summary_id(),
                1,
                format!("{:<30}", format!("summary {i}")),
                covers.clone(),
                vec![],
                SummaryMetadata {
                    original_message_count: 2,
                    compression_ratio: 1.0,
                    quality_score: 0.5,
                },
            );
            l1_ids.push(summary.id.clone());
            store.replace(&covers, summary).unwrap();
        }
        assert_eq!(store.budget().current_characters, 120);

        store.append("ok?", Role::User);
        let report = sched.evaluate(&mut store, PERSONA).await.unwrap();

        assert_eq!(report.created.len(), 1);
        let l2 = &report.created[0];
        assert_eq!(l2.level, 2);
        let oldest: BTreeSet<ItemId> = l1_ids[..2].iter().cloned().collect();
        assert_eq!(l2.covers, oldest);

        let archived = archive.lookup(&l2.id).unwrap();
        assert_eq!(archived.len(), 2);
        assert!(archived.iter().all(|item| item.level() == 1));
        for id in &l1_ids[..2] {
            assert!(!store.contains(id));
        }
        for id in &l1_ids[2..] {
            assert!(store.contains(id));
        }

        let l2_item = store.get(&l2.id).unwrap().as_summary().unwrap();
        assert_eq!(l2_item.metadata.original_message_count, 4);
        assert_eq!(store.items()[0].id(), &l2.id);
        assert!(store.budget().current_characters <= 100);
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_oracle_failure_skips_and_retries_same_block() {
        let config = memory_config(10_000, 1, false);
        let oracle = Arc::new(ScriptedOracle::failing_first(1, "recap"));
        let sched = scheduler(&config, oracle.clone());
        let (mut store, archive) = new_store(&config);

        let a = store.append("hi", Role::User).id;
        let b = store.append("hello", Role::Assistant).id;
        let report = sched.evaluate(&mut store, PERSONA).await.unwrap();

        assert!(matches!(report.skipped, Some(SkipReason::Oracle(_))));
        assert_eq!(report.skipped_level, Some(1));
        assert!(report.created.is_empty());
        assert!(store.contains(&a) && store.contains(&b));
        assert!(archive.is_empty());

        store.append("how are you?", Role::User);
        let report = sched.evaluate(&mut store, PERSONA).await.unwrap();
        assert_eq!(report.created.len(), 1);
        let expected: BTreeSet<ItemId> = [a, b].into_iter().collect();
        assert_eq!(report.created[0].covers, expected);

        let requests = oracle.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
    }

    #[tokio::test]
    async fn test_oracle_timeout_is_a_skip() {
        let config = memory_config(10_000, 1, false);
        let oracle = Arc::new(ScriptedOracle::slow("late", Duration::from_secs(5)));
        let sched =
            CompressionScheduler::new(config.clone(), oracle, "en", Duration::from_millis(20));
        let (mut store, _) = new_store(&config);

        store.append("hi", Role::User);
        store.append("hello", Role::Assistant);
        let before = store.items().to_vec();

        let report = sched.evaluate(&mut store, PERSONA).await.unwrap();
        match report.skipped {
            Some(SkipReason::Oracle(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected oracle skip, got {other:?}"),
        }
        assert_eq!(store.items(), before.as_slice());
    }

    #[tokio::test]
    async fn test_empty_summary_is_a_skip() {
        let config = memory_config(10_000, 1, false);
        let sched = scheduler(&config, Arc::new(ScriptedOracle::new("   ")));
        let (mut store, _) = new_store(&config);

        store.append("hi", Role::User);
        store.append("hello", Role::Assistant);
        let report = sched.evaluate(&mut store, PERSONA).await.unwrap();
        assert!(matches!(report.skipped, Some(SkipReason::Oracle(_))));
        assert_eq!(store.stats().summary_count, 0);
    }

    #[tokio::test]
    async fn test_archive_failure_rolls_back_replace() {
        let config = memory_config(10_000, 1, false);
        let sched = scheduler(&config, Arc::new(ScriptedOracle::new("recap")));
        let mut store = MemoryStore::new("ada", 10_000, Arc::new(FailingArchive));

        store.append("hi", Role::User);
        store.append("hello", Role::Assistant);
        let before = store.items().to_vec();

        let report = sched.evaluate(&mut store, PERSONA).await.unwrap();
        assert!(matches!(report.skipped, Some(SkipReason::Archive(_))));
        assert_eq!(store.items(), before.as_slice());
        assert!(store.archived_summaries().is_empty());
        assert_budget_consistent(&store);
    }

    #[tokio::test]
    async fn test_cancelled_evaluation_leaves_store_unchanged() {
        let config = memory_config(10_000, 1, false);
        let oracle = Arc::new(ScriptedOracle::slow("late", Duration::from_secs(5)));
        let sched = scheduler(&config, oracle.clone());
        let (mut store, archive) = new_store(&config);

        store.append("hi", Role::User);
        store.append("hello", Role::Assistant);
        let before = store.items().to_vec();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            sched.evaluate(&mut store, PERSONA),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(oracle.summarize_calls(), 1);
        assert_eq!(store.items(), before.as_slice());
        assert!(archive.is_empty());
    }
}
