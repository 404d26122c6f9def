//! Window specification extraction
//!
//! Keyword/pattern heuristics over the user's turns produce a structured
//! [`WindowSpecification`]. Nothing here understands language; ambiguity is
//! resolved by first-match-wins over the ordered tables in [`patterns`].
//! Multi-window conversations are segmented by explicit numbering, then by
//! room, then read as a single window.

pub mod extractor;
pub mod models;
pub mod patterns;
mod strategies;

pub use extractor::{ExtractionError, SpecificationExtractor};
pub use models::{
    validate_dimensions, BayDetails, DimensionError, Dimensions, Extraction, GlassType, LengthUnit,
    MultiWindowSpecification, OperationType, SegmentationStrategy, ShapedDetails,
    WindowSpecification, WindowType,
};
