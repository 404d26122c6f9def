//! Conversation context management for window quoting chats
//!
//! Keeps a bounded, token-budgeted view of a customer's conversation and
//! extracts structured window specifications from free-text turns:
//!
//! - [`context`]: token estimation, budget checks, the importance-aware
//!   summarizer and the per-user [`ConversationContextEngine`]
//! - [`specification`]: heuristic extraction of [`WindowSpecification`]s
//! - [`storage`]: the conversation store contract and an in-memory store
//! - [`config`], [`logging`], [`metrics`]: ambient service plumbing

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod specification;
pub mod storage;

pub use context::{ConversationContextEngine, Message, Role};
pub use error::{ContextError, Result};
pub use specification::{MultiWindowSpecification, SpecificationExtractor, WindowSpecification};

/// Commonly used types
pub mod prelude {
    pub use crate::config::{Config, ContextConfig, ExtractionConfig, LoggingConfig, StorageConfig};
    pub use crate::context::{
        estimate_conversation_tokens, estimate_message_tokens, estimate_tokens, ContextBudget,
        ContextReport, ContextSummarizer, ConversationContextEngine, Message, OptimizationStage,
        Role, TokenEstimator,
    };
    pub use crate::error::{ContextError, Result};
    pub use crate::metrics::ContextMetrics;
    pub use crate::specification::{
        Extraction, GlassType, MultiWindowSpecification, OperationType, SpecificationExtractor,
        WindowSpecification, WindowType,
    };
    pub use crate::storage::{ConversationStore, InMemoryConversationStore, StorageError};
}
