//! Per-user conversation context engine
//!
//! Orchestrates one request:
//! - fetch an expanded window of stored history
//! - persist a newly complete specification (advisory)
//! - prepend a "Previous window specifications" system message
//! - compress with [`ContextSummarizer`] when over budget, keeping system
//!   messages intact

use super::models::{Message, Role};
use super::summarizer::{ContextSummarizer, OptimizationStage, OptimizedContext};
use super::token_budget::ContextBudget;
use super::token_estimator::{CharRatioEstimator, TokenEstimator};
use crate::config::Config;
use crate::error::{ContextError, Result};
use crate::metrics::ContextMetrics;
use crate::specification::{
    Extraction, MultiWindowSpecification, SpecificationExtractor, WindowSpecification,
};
use crate::storage::{spawn_configured_expiry_task, ConversationStore, StoredMessage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Header of the injected specification preamble
pub const SPECIFICATIONS_PREAMBLE: &str = "Previous window specifications:";

/// Context plus how it was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextReport {
    pub messages: Vec<Message>,
    pub stage: OptimizationStage,
    pub estimated_tokens: usize,
    pub max_tokens: usize,
    /// Specifications on file when the preamble was built
    pub specification_count: usize,
}

impl ContextReport {
    pub fn is_within_budget(&self) -> bool {
        self.estimated_tokens <= self.max_tokens
    }
}

/// Conversation context engine
pub struct ConversationContextEngine {
    store: Arc<dyn ConversationStore>,
    config: Config,
    extractor: SpecificationExtractor,
    summarizer: ContextSummarizer,
    estimator: Arc<dyn TokenEstimator>,
    metrics: Option<ContextMetrics>,
}

impl ConversationContextEngine {
    pub fn new(store: Arc<dyn ConversationStore>, config: Config) -> Result<Self> {
        config.validate()?;
        let extractor = SpecificationExtractor::new(&config.extraction);
        let summarizer = ContextSummarizer::new(&config.context, extractor.clone());
        Ok(Self {
            store,
            config,
            extractor,
            summarizer,
            estimator: Arc::new(CharRatioEstimator::default()),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: ContextMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the token estimator used for budgeting and summarization
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.summarizer = self.summarizer.with_estimator(estimator.clone());
        self.estimator = estimator;
        self
    }

    /// Replace the specification extractor used for persistence, parsing
    /// and summaries
    pub fn with_extractor(mut self, extractor: SpecificationExtractor) -> Self {
        self.summarizer = ContextSummarizer::new(&self.config.context, extractor.clone())
            .with_estimator(self.estimator.clone());
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Start purging idle conversations on the configured schedule
    pub fn spawn_expiry_task(&self) -> JoinHandle<()> {
        spawn_configured_expiry_task(self.store.clone(), &self.config.storage)
    }

    /// Append a customer or assistant turn to the user's conversation
    pub async fn record_message(
        &self,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> Result<StoredMessage> {
        if role == Role::System {
            return Err(ContextError::InvalidRole(role));
        }
        let conversation = self
            .store
            .get_or_create_conversation(user_id, &self.config.storage.default_display_name)
            .await?;
        Ok(self
            .store
            .append_message(&conversation.id, role, content)
            .await?)
    }

    /// Conversation history ready to send as chat messages
    pub async fn get_conversation_context(
        &self,
        user_id: &str,
        limit: Option<usize>,
        max_tokens: Option<usize>,
    ) -> Result<Vec<Message>> {
        Ok(self
            .get_context_report(user_id, limit, max_tokens)
            .await?
            .messages)
    }

    pub async fn get_context_report(
        &self,
        user_id: &str,
        limit: Option<usize>,
        max_tokens: Option<usize>,
    ) -> Result<ContextReport> {
        let limit = limit.unwrap_or(self.config.context.default_limit);
        let budget =
            ContextBudget::new(max_tokens.unwrap_or(self.config.context.default_max_tokens))?;

        let conversation = self
            .store
            .get_or_create_conversation(user_id, &self.config.storage.default_display_name)
            .await?;

        let fetch = self.config.context.fetch_size(limit);
        let mut stored = self
            .store
            .list_recent_messages(&conversation.id, fetch)
            .await?;
        stored.reverse();
        let history: Vec<Message> = stored.iter().map(StoredMessage::to_message).collect();
        debug!(
            "Loaded {} messages for user {} (fetch {})",
            history.len(),
            user_id,
            fetch
        );

        self.persist_specification(&conversation.id, &history).await;

        let specifications = match self.store.list_specifications(&conversation.id).await {
            Ok(specifications) => specifications,
            Err(e) => {
                warn!("Could not load specifications for {}: {}", conversation.id, e);
                Vec::new()
            }
        };

        let mut enhanced = Vec::with_capacity(history.len() + 1);
        if let Some(preamble) = specifications_preamble(&specifications) {
            enhanced.push(preamble);
        }
        enhanced.extend(history);

        let optimized = self.fit_to_budget(enhanced, &budget, limit);
        if let Some(metrics) = &self.metrics {
            metrics.record_context(optimized.stage, optimized.estimated_tokens);
        }

        Ok(ContextReport {
            messages: optimized.messages,
            stage: optimized.stage,
            estimated_tokens: optimized.estimated_tokens,
            max_tokens: budget.max_tokens(),
            specification_count: specifications.len(),
        })
    }

    /// Bring an enhanced context within budget. System messages are kept
    /// verbatim and the rest is summarized into what remains; if that fails
    /// the last `limit` messages are kept.
    pub fn fit_to_budget(
        &self,
        enhanced: Vec<Message>,
        budget: &ContextBudget,
        limit: usize,
    ) -> OptimizedContext {
        let tokens = self.estimator.estimate_conversation(&enhanced);
        if budget.fits(tokens) {
            return OptimizedContext {
                messages: enhanced,
                stage: OptimizationStage::Unchanged,
                estimated_tokens: tokens,
            };
        }

        warn!(
            "Context exceeds budget: {} > {}",
            tokens,
            budget.max_tokens()
        );
        let (system, rest): (Vec<Message>, Vec<Message>) =
            enhanced.into_iter().partition(Message::is_system);
        let system_tokens: usize = system
            .iter()
            .map(|m| self.estimator.estimate_message(m))
            .sum();
        let reduced = budget.reduced_by(system_tokens);
        debug!(
            "Summarizing {} messages into {} tokens ({} reserved for system messages)",
            rest.len(),
            reduced,
            system_tokens
        );

        let optimized = self.summarizer.optimize_with_limit(&rest, reduced, limit);
        let mut messages = system;
        messages.extend(optimized.messages);
        let estimated_tokens = self.estimator.estimate_conversation(&messages);
        info!(
            "Reduced context to {} messages, {} tokens ({})",
            messages.len(),
            estimated_tokens,
            optimized.stage
        );

        OptimizedContext {
            messages,
            stage: optimized.stage,
            estimated_tokens,
        }
    }

    /// Save the conversation's specification if it is complete and new.
    /// Failures are logged and otherwise ignored.
    async fn persist_specification(&self, conversation_id: &str, history: &[Message]) {
        let spec = match self.extractor.extract(history) {
            Extraction::Parsed(spec) if spec.is_complete => spec,
            Extraction::Parsed(_) => return,
            Extraction::Degraded { reason, .. } => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_degraded_extraction();
                }
                debug!("Skipping specification save: {}", reason);
                return;
            }
        };

        let existing = match self.store.list_specifications(conversation_id).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!("Could not check saved specifications: {}", e);
                return;
            }
        };

        if existing.iter().any(|saved| saved.is_duplicate_of(&spec)) {
            if let Some(metrics) = &self.metrics {
                metrics.record_specification(true);
            }
            debug!("Specification already on file for {}", conversation_id);
            return;
        }

        match self.store.save_specification(conversation_id, &spec).await {
            Ok(saved) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_specification(false);
                }
                info!(
                    "Saved specification for {}: {}",
                    conversation_id,
                    saved.summary_line()
                )
            }
            Err(e) => warn!("Failed to save specification: {}", e),
        }
    }

    /// Compress arbitrary messages into `max_tokens`
    pub fn summarize_conversation_context(&self, messages: &[Message], max_tokens: usize) -> Vec<Message> {
        self.summarizer.optimize_context(messages, max_tokens)
    }

    /// Single-window reading of `messages`. A degraded result carries an
    /// empty, incomplete specification and the reason.
    pub fn parse_window_specifications(&self, messages: &[Message]) -> Extraction<WindowSpecification> {
        let extraction = self.extractor.extract(messages);
        if extraction.is_degraded() {
            if let Some(metrics) = &self.metrics {
                metrics.record_degraded_extraction();
            }
        }
        extraction
    }

    pub fn parse_multiple_window_specifications(&self, messages: &[Message]) -> MultiWindowSpecification {
        let result = self.extractor.parse_multiple_window_specifications(messages);
        if result.error.is_some() {
            if let Some(metrics) = &self.metrics {
                metrics.record_degraded_extraction();
            }
        }
        result
    }
}

/// One system message listing the saved specifications, if any
pub fn specifications_preamble(specifications: &[WindowSpecification]) -> Option<Message> {
    if specifications.is_empty() {
        return None;
    }
    let mut content = SPECIFICATIONS_PREAMBLE.to_string();
    for (i, spec) in specifications.iter().enumerate() {
        content.push_str(&format!("\n{}. {}", i + 1, spec.summary_line()));
    }
    Some(Message::system(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::token_estimator::{estimate_conversation_tokens, estimate_message_tokens};
    use crate::storage::{InMemoryConversationStore, StorageError};
    use prometheus::Registry;

    fn engine() -> ConversationContextEngine {
        ConversationContextEngine::new(
            Arc::new(InMemoryConversationStore::new()),
            Config::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_new_user_gets_empty_context() {
        let engine = engine();
        let report = engine.get_context_report("nobody", None, None).await.unwrap();
        assert!(report.messages.is_empty());
        assert_eq!(report.stage, OptimizationStage::Unchanged);
        assert_eq!(report.max_tokens, 4000);
    }

    #[tokio::test]
    async fn test_system_role_is_rejected() {
        let engine = engine();
        let result = engine.record_message("u1", Role::System, "injected").await;
        assert!(matches!(result, Err(ContextError::InvalidRole(Role::System))));
    }

    #[tokio::test]
    async fn test_zero_budget_is_an_error() {
        let engine = engine();
        let result = engine.get_conversation_context("u1", None, Some(0)).await;
        assert!(matches!(result, Err(ContextError::Budget(_))));
    }

    #[tokio::test]
    async fn test_context_is_chronological_and_bounded_by_fetch() {
        let engine = engine();
        for i in 0..40 {
            engine
                .record_message("u1", Role::User, &format!("turn {i}"))
                .await
                .unwrap();
        }

        let messages = engine.get_conversation_context("u1", Some(5), None).await.unwrap();
        assert_eq!(messages.len(), 30);
        assert_eq!(messages[0].text(), "turn 10");
        assert_eq!(messages[29].text(), "turn 39");
    }

    #[tokio::test]
    async fn test_complete_specification_saved_once_and_prepended() {
        let registry = Registry::new();
        let engine = engine().with_metrics(ContextMetrics::new(registry).unwrap());
        engine
            .record_message("u1", Role::User, "Kitchen window, 36x48, double pane with Low-E")
            .await
            .unwrap();
        engine
            .record_message("u1", Role::Assistant, "Great, anything else?")
            .await
            .unwrap();

        let first = engine.get_context_report("u1", None, None).await.unwrap();
        let second = engine.get_context_report("u1", None, None).await.unwrap();

        assert_eq!(first.specification_count, 1);
        assert_eq!(second.specification_count, 1);
        assert_eq!(first.messages.len(), 3);
        assert_eq!(first.messages[0].role, Role::System);
        assert!(first.messages[0]
            .text()
            .starts_with("Previous window specifications:\n1. Kitchen: 36\" x 48\""));
        assert_eq!(first.messages, second.messages);

        let metrics = engine.metrics.as_ref().unwrap();
        assert_eq!(metrics.specifications_saved.get(), 1.0);
        assert_eq!(metrics.specifications_deduplicated.get(), 1.0);
        assert_eq!(metrics.context_requests.get(), 2.0);
    }

    #[tokio::test]
    async fn test_incomplete_specification_not_saved() {
        let engine = engine();
        engine
            .record_message("u1", Role::User, "I need a 36x48 hung window for my kitchen with Low-E glass")
            .await
            .unwrap();

        let report = engine.get_context_report("u1", None, None).await.unwrap();
        assert_eq!(report.specification_count, 0);
        assert!(report.messages.iter().all(|m| !m.is_system()));
    }

    #[test]
    fn test_system_messages_reserved_before_summarizing() {
        let engine = engine();
        // Exactly 300 tokens
        let preamble = Message::system(format!("{SPECIFICATIONS_PREAMBLE}{}", "s".repeat(1157)));
        assert_eq!(estimate_message_tokens(&preamble), 300);

        let history: Vec<Message> = (0..20)
            .map(|i| Message::user(format!("{:02}{}", i, "q".repeat(600))))
            .collect();
        let mut enhanced = vec![preamble.clone()];
        enhanced.extend(history.clone());

        let budget = ContextBudget::new(2000).unwrap();
        let optimized = engine.fit_to_budget(enhanced, &budget, 10);

        assert_eq!(optimized.messages[0], preamble);
        assert_eq!(
            optimized.messages[1..].to_vec(),
            engine.summarizer.optimize_context(&history, 1700)
        );
        assert!(estimate_conversation_tokens(&optimized.messages) <= 2000);
        assert_eq!(optimized.estimated_tokens, estimate_conversation_tokens(&optimized.messages));
    }

    #[test]
    fn test_parse_delegates() {
        let engine = engine();
        let messages = vec![
            Message::user("Window 1 is 30x40 casement, window 2 is 36x48"),
            Message::user("both double pane"),
        ];

        let multi = engine.parse_multiple_window_specifications(&messages);
        assert_eq!(multi.count, 2);

        let single = engine.parse_window_specifications(&messages);
        assert_eq!(single, engine.parse_window_specifications(&messages));
        assert!(!single.is_degraded());
        assert_eq!(single.value().width, Some(30.0));
    }

    #[tokio::test]
    async fn test_broken_extraction_degrades_without_failing_requests() {
        let registry = Registry::new();
        let engine = engine()
            .with_extractor(SpecificationExtractor::with_broken_patterns())
            .with_metrics(ContextMetrics::new(registry).unwrap());
        let mut recorded = Vec::new();
        for i in 0..20 {
            // 300 tokens each
            let content = format!("{:02}{}", i, "w".repeat(1186));
            recorded.push(Message::user(content.clone()));
            engine.record_message("u1", Role::User, &content).await.unwrap();
        }

        let report = engine.get_context_report("u1", Some(3), Some(3000)).await.unwrap();
        assert_eq!(report.stage, OptimizationStage::Fallback);
        assert_eq!(report.messages, recorded[17..].to_vec());
        assert_eq!(report.specification_count, 0);

        let parsed = engine.parse_window_specifications(&recorded);
        assert!(parsed.is_degraded());
        assert!(parsed.reason().is_some());
        assert!(!parsed.value().is_complete);

        let metrics = engine.metrics.as_ref().unwrap();
        assert_eq!(metrics.degraded_extractions.get(), 2.0);
        assert_eq!(metrics.specifications_saved.get(), 0.0);
    }

    #[derive(Default)]
    struct RejectingStore {
        inner: InMemoryConversationStore,
    }

    #[async_trait::async_trait]
    impl ConversationStore for RejectingStore {
        async fn get_or_create_conversation(
            &self,
            user_id: &str,
            display_name: &str,
        ) -> std::result::Result<crate::storage::Conversation, StorageError> {
            self.inner.get_or_create_conversation(user_id, display_name).await
        }

        async fn append_message(
            &self,
            conversation_id: &str,
            role: Role,
            content: &str,
        ) -> std::result::Result<StoredMessage, StorageError> {
            self.inner.append_message(conversation_id, role, content).await
        }

        async fn list_recent_messages(
            &self,
            conversation_id: &str,
            limit: usize,
        ) -> std::result::Result<Vec<StoredMessage>, StorageError> {
            self.inner.list_recent_messages(conversation_id, limit).await
        }

        async fn list_specifications(
            &self,
            conversation_id: &str,
        ) -> std::result::Result<Vec<WindowSpecification>, StorageError> {
            self.inner.list_specifications(conversation_id).await
        }

        async fn save_specification(
            &self,
            _conversation_id: &str,
            _spec: &WindowSpecification,
        ) -> std::result::Result<WindowSpecification, StorageError> {
            Err(StorageError::Backend("read only".to_string()))
        }

        async fn purge_expired(&self, ttl: std::time::Duration) -> std::result::Result<usize, StorageError> {
            self.inner.purge_expired(ttl).await
        }
    }

    #[tokio::test]
    async fn test_failed_save_is_not_counted() {
        let registry = Registry::new();
        let engine = ConversationContextEngine::new(Arc::new(RejectingStore::default()), Config::default())
            .unwrap()
            .with_metrics(ContextMetrics::new(registry).unwrap());
        engine
            .record_message("u1", Role::User, "Kitchen window, 36x48, double pane with Low-E")
            .await
            .unwrap();

        let report = engine.get_context_report("u1", None, None).await.unwrap();
        assert_eq!(report.specification_count, 0);
        assert_eq!(report.messages.len(), 1);

        let metrics = engine.metrics.as_ref().unwrap();
        assert_eq!(metrics.specifications_saved.get(), 0.0);
        assert_eq!(metrics.specifications_deduplicated.get(), 0.0);
    }

    #[test]
    fn test_preamble_lists_each_specification() {
        assert!(specifications_preamble(&[]).is_none());

        let extractor = SpecificationExtractor::default();
        let specs = vec![
            extractor.parse_text("kitchen 36x48 double pane").into_value(),
            extractor.parse_text("bedroom 30x40 triple pane casement").into_value(),
        ];
        let preamble = specifications_preamble(&specs).unwrap();
        let lines: Vec<&str> = preamble.text().lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1. Kitchen:"));
        assert!(lines[2].starts_with("2. Bedroom:"));
    }
}
