//! Data models for window specifications

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Smallest and largest accepted side length, in inches
pub const MIN_DIMENSION_INCHES: f64 = 12.0;
pub const MAX_DIMENSION_INCHES: f64 = 120.0;

/// Unit a dimension was originally stated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LengthUnit {
    #[serde(rename = "inches")]
    Inches,
    #[serde(rename = "cm")]
    Centimeters,
    #[serde(rename = "feet")]
    Feet,
}

impl LengthUnit {
    /// Multiplier converting this unit to inches
    pub fn to_inches_factor(&self) -> f64 {
        match self {
            LengthUnit::Inches => 1.0,
            LengthUnit::Centimeters => 0.3937,
            LengthUnit::Feet => 12.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LengthUnit::Inches => "inches",
            LengthUnit::Centimeters => "cm",
            LengthUnit::Feet => "feet",
        }
    }
}

/// Width and height in inches, rounded to one decimal place
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
    pub original_units: LengthUnit,
}

impl Dimensions {
    /// Convert raw values stated in `unit` to inches
    pub fn from_units(width: f64, height: f64, unit: LengthUnit) -> Self {
        Self::from_sides(width, unit, height, unit)
    }

    /// Convert each side with its own unit; the width's unit is reported as
    /// the original
    pub fn from_sides(width: f64, width_unit: LengthUnit, height: f64, height_unit: LengthUnit) -> Self {
        Self {
            width: round_tenth(width * width_unit.to_inches_factor()),
            height: round_tenth(height * height_unit.to_inches_factor()),
            original_units: width_unit,
        }
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Dimension range problems reported by [`validate_dimensions`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DimensionError {
    #[error("{side} of {value}\" is below the {min}\" minimum")]
    TooSmall { side: &'static str, value: f64, min: f64 },

    #[error("{side} of {value}\" is above the {max}\" maximum")]
    TooLarge { side: &'static str, value: f64, max: f64 },
}

/// Check dimensions against the manufacturable range. The extractor never
/// applies this; callers decide what to do with out-of-range values.
pub fn validate_dimensions(dimensions: &Dimensions) -> Vec<DimensionError> {
    let mut problems = Vec::new();
    for (side, value) in [("width", dimensions.width), ("height", dimensions.height)] {
        if value < MIN_DIMENSION_INCHES {
            problems.push(DimensionError::TooSmall {
                side,
                value,
                min: MIN_DIMENSION_INCHES,
            });
        } else if value > MAX_DIMENSION_INCHES {
            problems.push(DimensionError::TooLarge {
                side,
                value,
                max: MAX_DIMENSION_INCHES,
            });
        }
    }
    problems
}

/// Overall window form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    Standard,
    Bay,
    Shaped,
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WindowType::Standard => "standard",
            WindowType::Bay => "bay",
            WindowType::Shaped => "shaped",
        })
    }
}

/// How the sash opens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    #[default]
    Hung,
    Slider,
    Fixed,
    Casement,
    Awning,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationType::Hung => "Hung",
            OperationType::Slider => "Slider",
            OperationType::Fixed => "Fixed",
            OperationType::Casement => "Casement",
            OperationType::Awning => "Awning",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlassType {
    #[serde(rename = "clear")]
    Clear,
    #[serde(rename = "frosted")]
    Frosted,
    #[serde(rename = "tinted")]
    Tinted,
    #[serde(rename = "double pane")]
    DoublePane,
    #[serde(rename = "triple pane")]
    TriplePane,
    #[serde(rename = "laminated")]
    Laminated,
}

impl fmt::Display for GlassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GlassType::Clear => "clear",
            GlassType::Frosted => "frosted",
            GlassType::Tinted => "tinted",
            GlassType::DoublePane => "double pane",
            GlassType::TriplePane => "triple pane",
            GlassType::Laminated => "laminated",
        })
    }
}

/// Extra detail for shaped windows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapedDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
}

/// Extra detail for bay and bow windows
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BayDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle_degrees: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel_count: Option<u32>,
    pub is_bow: bool,
}

/// Best current summary of one window extractable from a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSpecification {
    pub location: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_units: Option<LengthUnit>,
    pub window_type: Option<WindowType>,
    pub operation_type: OperationType,
    pub glass_type: Option<GlassType>,
    pub features: BTreeSet<String>,
    pub quantity: u32,
    pub has_interior_color: bool,
    pub has_exterior_color: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shaped_details: Option<ShapedDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bay_details: Option<BayDetails>,
    pub is_complete: bool,
}

impl Default for WindowSpecification {
    fn default() -> Self {
        Self {
            location: None,
            width: None,
            height: None,
            original_units: None,
            window_type: None,
            operation_type: OperationType::default(),
            glass_type: None,
            features: BTreeSet::new(),
            quantity: 1,
            has_interior_color: false,
            has_exterior_color: false,
            shaped_details: None,
            bay_details: None,
            is_complete: false,
        }
    }
}

impl WindowSpecification {
    /// Empty specification used when extraction could not run
    pub fn empty() -> Self {
        Self::default()
    }

    /// The single completeness gate: width, height, window type and glass
    /// type all present
    pub fn has_required_fields(&self) -> bool {
        self.width.is_some()
            && self.height.is_some()
            && self.window_type.is_some()
            && self.glass_type.is_some()
    }

    /// Recompute `is_complete` after fields were changed
    pub fn refresh_completeness(&mut self) {
        self.is_complete = self.has_required_fields();
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => Some(Dimensions {
                width,
                height,
                original_units: self.original_units.unwrap_or(LengthUnit::Inches),
            }),
            _ => None,
        }
    }

    /// Key for the exact-match dedup rule on location, width and height
    pub fn dedup_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            self.location
                .as_deref()
                .map(str::to_lowercase)
                .unwrap_or_default()
                .as_bytes(),
        );
        hasher.update(b"|");
        if let Some(width) = self.width {
            hasher.update(width.to_string().as_bytes());
        }
        hasher.update(b"|");
        if let Some(height) = self.height {
            hasher.update(height.to_string().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn is_duplicate_of(&self, other: &WindowSpecification) -> bool {
        self.dedup_key() == other.dedup_key()
    }

    /// One-line natural-language recap, e.g.
    /// `Kitchen: 36" x 48" standard Hung window, double pane glass, features: Low-E`
    pub fn summary_line(&self) -> String {
        let mut line = String::new();
        if let Some(location) = &self.location {
            line.push_str(location);
            line.push_str(": ");
        }
        if let (Some(width), Some(height)) = (self.width, self.height) {
            line.push_str(&format!("{}\" x {}\" ", width, height));
        }
        if let Some(window_type) = self.window_type {
            line.push_str(&format!("{} ", window_type));
        }
        line.push_str(&format!("{} window", self.operation_type));
        if let Some(glass) = self.glass_type {
            line.push_str(&format!(", {} glass", glass));
        }
        if !self.features.is_empty() {
            let features: Vec<&str> = self.features.iter().map(String::as_str).collect();
            line.push_str(&format!(", features: {}", features.join(", ")));
        }
        if self.quantity > 1 {
            line.push_str(&format!(" (quantity {})", self.quantity));
        }
        line
    }
}

/// Which segmentation strategy produced a multi-window result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationStrategy {
    ExplicitNumbering,
    LocationGrouping,
    SingleWindow,
}

/// All windows described in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiWindowSpecification {
    pub windows: Vec<WindowSpecification>,
    pub count: usize,
    pub has_multiple_windows: bool,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SegmentationStrategy>,
    /// Set when extraction could not run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MultiWindowSpecification {
    pub fn from_windows(windows: Vec<WindowSpecification>, strategy: SegmentationStrategy) -> Self {
        let count = windows.len();
        let is_complete = count > 0 && windows.iter().all(|w| w.is_complete);
        Self {
            windows,
            count,
            has_multiple_windows: count > 1,
            is_complete,
            strategy: Some(strategy),
            error: None,
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            windows: Vec::new(),
            count: 0,
            has_multiple_windows: false,
            is_complete: false,
            strategy: None,
            error: Some(reason.into()),
        }
    }
}

/// Outcome of running the extraction heuristics
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction<T> {
    /// Heuristics ran to completion; the value may still be sparse
    Parsed(T),
    /// Heuristics could not run; carries an empty fallback and the reason
    Degraded { fallback: T, reason: String },
}

impl<T> Extraction<T> {
    pub fn value(&self) -> &T {
        match self {
            Extraction::Parsed(value) => value,
            Extraction::Degraded { fallback, .. } => fallback,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Extraction::Parsed(value) => value,
            Extraction::Degraded { fallback, .. } => fallback,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Extraction::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Extraction::Parsed(_) => None,
            Extraction::Degraded { reason, .. } => Some(reason),
        }
    }
}
