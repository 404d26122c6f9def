//! Importance-aware context compression
//!
//! Given a chronological message list and a token budget, the summarizer
//! picks the first of these that fits:
//!
//! 1. the recent window (last `recent_window` messages), older ones dropped
//! 2. important older messages or one synthetic summary message, followed by
//!    the longest recent tail that fits; whichever keeps more recent turns
//!    wins and important messages win ties
//! 3. a recent tail sized from the average message cost
//!
//! Input that already fits is returned untouched. Nothing here fails: internal
//! errors degrade to a plain recent tail of the caller's message limit.

use super::models::{Message, Role};
use super::token_estimator::{CharRatioEstimator, TokenEstimator, CONVERSATION_OVERHEAD_TOKENS};
use crate::config::ContextConfig;
use crate::specification::{Extraction, SpecificationExtractor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Keyword vocabulary for the importance predicate, grouped by tag.
/// Matching is a case-insensitive substring test.
pub const IMPORTANCE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "dimensions",
        &["inch", "\"", "width", "height", "wide", "tall", "size", "dimension", "measure", " cm", "feet", " x "],
    ),
    (
        "materials",
        &["glass", "pane", "low-e", "low e", "argon", "vinyl", "wood", "aluminum", "fiberglass", "frame", "grille"],
    ),
    (
        "window_types",
        &["bay", "bow", "casement", "awning", "slider", "sliding", "hung", "fixed", "picture", "arch"],
    ),
    (
        "rooms",
        &["kitchen", "bedroom", "bathroom", "living room", "dining", "office", "den", "basement", "garage", "room"],
    ),
    ("pricing", &["price", "cost", "quote", "budget", "estimate", "$", "discount"]),
];

/// Tags of the importance vocabulary found in `text`
pub fn importance_tags(text: &str) -> Vec<&'static str> {
    let lowered = text.to_lowercase();
    IMPORTANCE_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(tag, _)| *tag)
        .collect()
}

/// Non-empty content mentioning at least one domain keyword
pub fn is_important(message: &Message) -> bool {
    match message.content.as_deref() {
        Some(content) if !content.trim().is_empty() => !importance_tags(content).is_empty(),
        _ => false,
    }
}

/// Which step produced an optimized context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStage {
    /// Input already fit the budget
    Unchanged,
    RecentWindow,
    ImportantMessages,
    Summary,
    /// Average-cost tail of the recent window
    Truncated,
    /// Internal error; plain recent tail
    Fallback,
}

impl OptimizationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationStage::Unchanged => "unchanged",
            OptimizationStage::RecentWindow => "recent_window",
            OptimizationStage::ImportantMessages => "important_messages",
            OptimizationStage::Summary => "summary",
            OptimizationStage::Truncated => "truncated",
            OptimizationStage::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for OptimizationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedContext {
    pub messages: Vec<Message>,
    pub stage: OptimizationStage,
    pub estimated_tokens: usize,
}

/// Summarizer errors. Never returned to callers; they select the fallback.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SummarizerError {
    #[error("Specification extraction failed while summarizing: {0}")]
    Extraction(String),
}

/// Budget-driven context optimizer
#[derive(Clone)]
pub struct ContextSummarizer {
    recent_window: usize,
    estimator: Arc<dyn TokenEstimator>,
    extractor: SpecificationExtractor,
}

impl Default for ContextSummarizer {
    fn default() -> Self {
        Self::new(&ContextConfig::default(), SpecificationExtractor::default())
    }
}

impl ContextSummarizer {
    pub fn new(config: &ContextConfig, extractor: SpecificationExtractor) -> Self {
        Self {
            recent_window: config.recent_window.max(1),
            estimator: Arc::new(CharRatioEstimator::default()),
            extractor,
        }
    }

    /// Replace the token estimator
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn recent_window(&self) -> usize {
        self.recent_window
    }

    /// Messages to present within `max_tokens`
    pub fn optimize_context(&self, messages: &[Message], max_tokens: usize) -> Vec<Message> {
        self.optimize(messages, max_tokens).messages
    }

    /// Optimize and report which step produced the result
    pub fn optimize(&self, messages: &[Message], max_tokens: usize) -> OptimizedContext {
        self.optimize_with_limit(messages, max_tokens, self.recent_window)
    }

    /// Like [`optimize`](Self::optimize), but an internal error falls back to
    /// the last `limit` messages instead of the recent window
    pub fn optimize_with_limit(
        &self,
        messages: &[Message],
        max_tokens: usize,
        limit: usize,
    ) -> OptimizedContext {
        if messages.is_empty() {
            return self.finish(Vec::new(), OptimizationStage::Unchanged);
        }
        if self.estimator.estimate_conversation(messages) <= max_tokens {
            return self.finish(messages.to_vec(), OptimizationStage::Unchanged);
        }

        match self.compress(messages, max_tokens) {
            Ok((kept, stage)) => {
                info!(
                    "Compressed context from {} to {} messages ({})",
                    messages.len(),
                    kept.len(),
                    stage
                );
                self.finish(kept, stage)
            }
            Err(e) => {
                warn!("Context summarization failed, keeping recent tail: {}", e);
                let start = messages.len().saturating_sub(limit.max(1));
                let tail = self.trim_to_budget(&messages[start..], max_tokens);
                self.finish(tail, OptimizationStage::Fallback)
            }
        }
    }

    fn compress(
        &self,
        messages: &[Message],
        max_tokens: usize,
    ) -> Result<(Vec<Message>, OptimizationStage), SummarizerError> {
        let split = messages.len().saturating_sub(self.recent_window);
        let (older, recent) = messages.split_at(split);

        if self.estimator.estimate_conversation(recent) <= max_tokens {
            debug!("Recent window of {} messages fits", recent.len());
            return Ok((recent.to_vec(), OptimizationStage::RecentWindow));
        }

        let important: Vec<Message> = older.iter().filter(|m| is_important(m)).cloned().collect();
        let important_keep = if important.is_empty() {
            0
        } else {
            self.longest_tail(recent, self.message_cost(&important), max_tokens)
        };

        // A summary only replaces the important messages when it keeps more
        // recent turns
        for keep in ((important_keep + 1)..=recent.len()).rev() {
            let cut = messages.len() - keep;
            let summary = self.summary_message(&messages[..cut])?;
            let reserved = self.estimator.estimate_message(&summary);
            if self.longest_tail(&recent[recent.len() - keep..], reserved, max_tokens) == keep {
                let mut kept = vec![summary];
                kept.extend_from_slice(&messages[cut..]);
                return Ok((kept, OptimizationStage::Summary));
            }
        }

        if important_keep > 0 {
            debug!(
                "Keeping {} important older messages and {} recent",
                important.len(),
                important_keep
            );
            let mut kept = important;
            kept.extend_from_slice(&recent[recent.len() - important_keep..]);
            return Ok((kept, OptimizationStage::ImportantMessages));
        }

        Ok((self.average_cost_tail(recent, max_tokens), OptimizationStage::Truncated))
    }

    /// Synthetic system message recapping `dropped`
    fn summary_message(&self, dropped: &[Message]) -> Result<Message, SummarizerError> {
        let user_count = dropped.iter().filter(|m| m.role == Role::User).count();
        let assistant_count = dropped.iter().filter(|m| m.role == Role::Assistant).count();

        let mut summary = format!(
            "Summary of earlier conversation: {} customer message(s) and {} assistant message(s).",
            user_count, assistant_count
        );

        match self.extractor.extract(dropped) {
            Extraction::Parsed(spec) if spec.is_complete => {
                summary.push_str(&format!(" Window discussed: {}.", spec.summary_line()));
            }
            Extraction::Parsed(_) => {}
            Extraction::Degraded { reason, .. } => return Err(SummarizerError::Extraction(reason)),
        }
        Ok(Message::system(summary))
    }

    fn message_cost(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimator.estimate_message(m)).sum()
    }

    /// Largest `k` such that `reserved` plus the last `k` messages fit
    fn longest_tail(&self, recent: &[Message], reserved: usize, max_tokens: usize) -> usize {
        let mut used = reserved + CONVERSATION_OVERHEAD_TOKENS;
        let mut keep = 0;
        for message in recent.iter().rev() {
            used += self.estimator.estimate_message(message);
            if used > max_tokens {
                break;
            }
            keep += 1;
        }
        keep
    }

    fn average_cost_tail(&self, recent: &[Message], max_tokens: usize) -> Vec<Message> {
        if recent.is_empty() {
            return Vec::new();
        }
        let average = self.message_cost(recent).div_ceil(recent.len()).max(1);
        let count = (max_tokens.saturating_sub(CONVERSATION_OVERHEAD_TOKENS) / average)
            .clamp(1, recent.len());
        debug!("Average message cost {}, keeping {} messages", average, count);
        self.trim_to_budget(&recent[recent.len() - count..], max_tokens)
    }

    /// Drop from the front until within budget, always keeping the newest
    fn trim_to_budget(&self, messages: &[Message], max_tokens: usize) -> Vec<Message> {
        let mut start = 0;
        while messages.len() - start > 1
            && self.estimator.estimate_conversation(&messages[start..]) > max_tokens
        {
            start += 1;
        }
        messages[start..].to_vec()
    }

    fn finish(&self, messages: Vec<Message>, stage: OptimizationStage) -> OptimizedContext {
        let estimated_tokens = self.estimator.estimate_conversation(&messages);
        OptimizedContext {
            messages,
            stage,
            estimated_tokens,
        }
    }
}
