//! Data models for the conversation store

use crate::context::{Message, Role};
use crate::specification::{
    BayDetails, GlassType, LengthUnit, OperationType, ShapedDetails, WindowSpecification, WindowType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One customer's conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Conversation {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            display_name: display_name.into(),
            created_at: now,
            last_activity: now,
        }
    }
}

/// Append-only transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(conversation_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn to_message(&self) -> Message {
        Message::new(self.role, self.content.clone())
    }
}

/// Persisted row form of a [`WindowSpecification`]. Set-valued and nested
/// fields are stored as JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationRecord {
    pub id: String,
    pub conversation_id: String,
    pub dedup_key: String,
    pub location: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub original_units: Option<LengthUnit>,
    pub window_type: Option<WindowType>,
    pub operation_type: OperationType,
    pub glass_type: Option<GlassType>,
    /// JSON array of feature tags
    pub features: String,
    pub quantity: u32,
    pub has_interior_color: bool,
    pub has_exterior_color: bool,
    pub shaped_details: Option<String>,
    pub bay_details: Option<String>,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl SpecificationRecord {
    pub fn from_specification(
        conversation_id: impl Into<String>,
        spec: &WindowSpecification,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            dedup_key: spec.dedup_key(),
            location: spec.location.clone(),
            width: spec.width,
            height: spec.height,
            original_units: spec.original_units,
            window_type: spec.window_type,
            operation_type: spec.operation_type,
            glass_type: spec.glass_type,
            features: serde_json::to_string(&spec.features)?,
            quantity: spec.quantity,
            has_interior_color: spec.has_interior_color,
            has_exterior_color: spec.has_exterior_color,
            shaped_details: spec.shaped_details.as_ref().map(serde_json::to_string).transpose()?,
            bay_details: spec.bay_details.as_ref().map(serde_json::to_string).transpose()?,
            is_complete: spec.is_complete,
            created_at: Utc::now(),
        })
    }

    pub fn to_specification(&self) -> Result<WindowSpecification, serde_json::Error> {
        let features: BTreeSet<String> = serde_json::from_str(&self.features)?;
        let shaped_details: Option<ShapedDetails> = self
            .shaped_details
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let bay_details: Option<BayDetails> = self
            .bay_details
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        let mut spec = WindowSpecification {
            location: self.location.clone(),
            width: self.width,
            height: self.height,
            original_units: self.original_units,
            window_type: self.window_type,
            operation_type: self.operation_type,
            glass_type: self.glass_type,
            features,
            quantity: self.quantity,
            has_interior_color: self.has_interior_color,
            has_exterior_color: self.has_exterior_color,
            shaped_details,
            bay_details,
            is_complete: false,
        };
        spec.refresh_completeness();
        Ok(spec)
    }
}
