//! Context management with token budget enforcement
//!
//! Token estimation, budgets, the importance-aware summarizer and the
//! per-user engine that assembles the context handed to the model.

pub mod engine;
pub mod models;
pub mod summarizer;
pub mod token_budget;
pub mod token_estimator;

pub use engine::{specifications_preamble, ContextReport, ConversationContextEngine};
pub use models::{Message, Role};
pub use summarizer::{
    importance_tags, is_important, ContextSummarizer, OptimizationStage, OptimizedContext,
    SummarizerError,
};
pub use token_budget::{BudgetError, ContextBudget};
pub use token_estimator::{
    estimate_conversation_tokens, estimate_message_tokens, estimate_optional_conversation_tokens,
    estimate_tokens, CharRatioEstimator, TokenEstimator, CONVERSATION_OVERHEAD_TOKENS,
    MESSAGE_OVERHEAD_TOKENS,
};
