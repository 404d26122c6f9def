//! Integration tests for the conversation context engine
//!
//! These exercise the public API end to end against the in-memory store:
//! recording turns, specification persistence and the budgeted context.

use std::sync::Arc;
use std::time::Duration;
use window_context::prelude::*;
use window_context::storage::spawn_expiry_task;

fn engine_with(config: Config) -> (ConversationContextEngine, Arc<InMemoryConversationStore>) {
    let store = Arc::new(InMemoryConversationStore::new());
    let engine = ConversationContextEngine::new(store.clone(), config).unwrap();
    (engine, store)
}

#[tokio::test]
async fn test_quote_conversation_end_to_end() {
    let (engine, _) = engine_with(Config::default());
    let turns = [
        (Role::User, "Hi, I need a quote for a window in my living room"),
        (Role::Assistant, "Sure! What size is it?"),
        (Role::User, "It's 48 by 60 inches, casement, and I want triple pane glass"),
        (Role::Assistant, "Any extras like Low-E or grilles?"),
        (Role::User, "Low-E with argon please"),
    ];
    for (role, content) in turns {
        engine.record_message("cust-7", role, content).await.unwrap();
    }

    let report = engine.get_context_report("cust-7", None, None).await.unwrap();
    assert_eq!(report.stage, OptimizationStage::Unchanged);
    assert_eq!(report.specification_count, 1);
    assert!(report.is_within_budget());

    let preamble = report.messages[0].text();
    assert!(preamble.starts_with("Previous window specifications:"));
    assert!(preamble.contains("Living Room: 48\" x 60\""));
    assert!(preamble.contains("Casement"));
    assert!(preamble.contains("Low-E with Argon"));
    assert_eq!(report.messages.len(), turns.len() + 1);
}

#[tokio::test]
async fn test_long_conversation_respects_budget() {
    let (engine, _) = engine_with(Config::default());
    let filler = "lorem ipsum dolor sit amet ".repeat(40);
    for i in 0..60 {
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        engine
            .record_message("cust-1", role, &format!("{i}: {filler}"))
            .await
            .unwrap();
    }

    for budget in [400, 1500, 3000] {
        let messages = engine
            .get_conversation_context("cust-1", Some(20), Some(budget))
            .await
            .unwrap();
        assert!(estimate_conversation_tokens(&messages) <= budget, "budget {budget}");
        assert!(messages.last().unwrap().text().starts_with("59: "));
    }
}

#[tokio::test]
async fn test_users_are_isolated() {
    let (engine, _) = engine_with(Config::default());
    engine.record_message("a", Role::User, "bedroom 30x40 double pane").await.unwrap();
    engine.record_message("b", Role::User, "hello").await.unwrap();

    let a = engine.get_context_report("a", None, None).await.unwrap();
    let b = engine.get_context_report("b", None, None).await.unwrap();
    assert_eq!(a.specification_count, 1);
    assert_eq!(b.specification_count, 0);
    assert_eq!(b.messages, vec![Message::user("hello")]);
}

#[tokio::test]
async fn test_expired_conversation_is_recreated_empty() {
    let (engine, store) = engine_with(Config::default());
    engine.record_message("cust-3", Role::User, "hello").await.unwrap();

    let task = spawn_expiry_task(store.clone(), Duration::from_millis(10), Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(50)).await;
    task.abort();

    let messages = engine.get_conversation_context("cust-3", None, None).await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn test_configured_expiry_purges_idle_conversations() {
    let config = Config::from_toml_str(
        r#"
        [storage]
        conversation_ttl_secs = 0
        purge_interval_secs = 3600
        "#,
    )
    .unwrap();
    let (engine, store) = engine_with(config);
    engine.record_message("cust-4", Role::User, "hello").await.unwrap();
    assert_eq!(store.conversation_count(), 1);

    // The first purge runs immediately
    let task = engine.spawn_expiry_task();
    tokio::time::sleep(Duration::from_millis(50)).await;
    task.abort();

    assert_eq!(store.conversation_count(), 0);
}

#[test]
fn test_config_drives_defaults() {
    let config = Config::from_toml_str(
        r#"
        [context]
        default_max_tokens = 500
        recent_window = 4

        [storage]
        default_display_name = "Guest"
        "#,
    )
    .unwrap();
    let (engine, _) = engine_with(config);

    assert_eq!(engine.config().context.default_max_tokens, 500);
    assert_eq!(engine.config().storage.default_display_name, "Guest");
}

#[test]
fn test_produced_interface_without_storage() {
    let (engine, _) = engine_with(Config::default());
    let messages = vec![
        Message::user("The first window is 24x36 in the bathroom, frosted glass"),
        Message::assistant("Got it"),
        Message::user("The second window is 30x40 in the office, clear glass, 2 windows like that"),
    ];

    let multi = engine.parse_multiple_window_specifications(&messages);
    assert_eq!(multi.count, 2);
    assert!(multi.has_multiple_windows);
    assert!(multi.is_complete);
    assert_eq!(multi.windows[1].quantity, 2);

    let single = engine.parse_window_specifications(&messages);
    assert!(!single.is_degraded());
    assert_eq!(single.value().glass_type, Some(GlassType::Frosted));

    let summarized = engine.summarize_conversation_context(&messages, 10_000);
    assert_eq!(summarized, messages);
}

#[test]
fn test_metrics_registered_on_caller_registry() {
    let registry = prometheus::Registry::new();
    let metrics = ContextMetrics::new(registry.clone()).unwrap();
    let (engine, _) = engine_with(Config::default());
    let engine = engine.with_metrics(metrics);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        engine.get_conversation_context("m", None, None).await.unwrap();
    });

    let names: Vec<String> = registry.gather().iter().map(|f| f.get_name().to_string()).collect();
    assert!(names.contains(&"context_requests_total".to_string()));
}
