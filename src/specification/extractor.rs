//! Heuristic field extraction from free text

use super::models::{
    BayDetails, Dimensions, Extraction, LengthUnit, MultiWindowSpecification, OperationType,
    ShapedDetails, WindowSpecification, WindowType, GlassType,
};
use super::patterns::{
    self, CompiledPatterns, ARGON, COLOR_STOP_WORDS, LOW_E, LOW_E_WITH_ARGON, NEUTRAL_COLOR,
};
use super::strategies;
use crate::config::ExtractionConfig;
use crate::context::{Message, Role};
use regex::Regex;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Reasons extraction could not run
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    #[error("pattern table failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

/// Fields found in a piece of text, before defaults are applied
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ParsedFields {
    pub dimensions: Option<Dimensions>,
    pub operation_type: Option<OperationType>,
    pub window_type: Option<WindowType>,
    pub glass_type: Option<GlassType>,
    pub features: BTreeSet<String>,
    pub location: Option<String>,
    pub quantity: Option<u32>,
    pub has_interior_color: bool,
    pub has_exterior_color: bool,
    pub shaped_details: Option<ShapedDetails>,
    pub bay_details: Option<BayDetails>,
}

impl ParsedFields {
    pub fn filled_count(&self) -> usize {
        [
            self.dimensions.is_some(),
            self.operation_type.is_some(),
            self.window_type.is_some(),
            self.glass_type.is_some(),
            self.location.is_some(),
            self.quantity.is_some(),
            self.has_interior_color,
            self.has_exterior_color,
        ]
        .iter()
        .filter(|filled| **filled)
        .count()
            + self.features.len()
    }

    /// Whether the text carried anything usable at all
    pub fn carries_information(&self) -> bool {
        self.filled_count() > 0
    }

    /// Number of fields filled here that are empty in `base`
    pub fn gained_over(&self, base: &ParsedFields) -> usize {
        let gained = [
            self.dimensions.is_some() && base.dimensions.is_none(),
            self.operation_type.is_some() && base.operation_type.is_none(),
            self.window_type.is_some() && base.window_type.is_none(),
            self.glass_type.is_some() && base.glass_type.is_none(),
            self.location.is_some() && base.location.is_none(),
            self.quantity.is_some() && base.quantity.is_none(),
            self.has_interior_color && !base.has_interior_color,
            self.has_exterior_color && !base.has_exterior_color,
        ]
        .iter()
        .filter(|g| **g)
        .count();
        gained + self.features.difference(&base.features).count()
    }

    /// Fill fields still empty here from shared context (e.g. a preamble
    /// that applies to every numbered window)
    pub fn inherit_from(&mut self, shared: &ParsedFields) {
        if self.location.is_none() {
            self.location = shared.location.clone();
        }
        if self.glass_type.is_none() {
            self.glass_type = shared.glass_type;
        }
        if self.operation_type.is_none() {
            self.operation_type = shared.operation_type;
        }
        if self.window_type.is_none() {
            self.window_type = shared.window_type;
            self.shaped_details = shared.shaped_details.clone();
            self.bay_details = shared.bay_details.clone();
        }
        self.features.extend(shared.features.iter().cloned());
        collapse_low_e_argon(&mut self.features);
    }

    /// Apply defaults and compute completeness
    pub fn into_specification(self) -> WindowSpecification {
        let window_type = self.window_type.unwrap_or(WindowType::Standard);
        let mut spec = WindowSpecification {
            location: self.location,
            width: self.dimensions.map(|d| d.width),
            height: self.dimensions.map(|d| d.height),
            original_units: self.dimensions.map(|d| d.original_units),
            window_type: Some(window_type),
            operation_type: self.operation_type.unwrap_or_default(),
            glass_type: self.glass_type,
            features: self.features,
            quantity: self.quantity.unwrap_or(1),
            has_interior_color: self.has_interior_color,
            has_exterior_color: self.has_exterior_color,
            shaped_details: None,
            bay_details: None,
            is_complete: false,
        };
        match window_type {
            WindowType::Shaped => {
                spec.shaped_details = Some(self.shaped_details.unwrap_or(ShapedDetails { shape: None }))
            }
            WindowType::Bay => spec.bay_details = Some(self.bay_details.unwrap_or_default()),
            WindowType::Standard => {}
        }
        spec.refresh_completeness();
        spec
    }
}

fn first_in_table<T: Copy>(table: &[(T, Regex)], text: &str) -> Option<T> {
    table
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(value, _)| *value)
}

fn parse_unit(token: Option<&str>) -> Option<LengthUnit> {
    match token? {
        "cm" | "centimeter" | "centimeters" => Some(LengthUnit::Centimeters),
        "feet" | "foot" | "ft" | "'" => Some(LengthUnit::Feet),
        "inches" | "inch" | "in" | "\"" => Some(LengthUnit::Inches),
        _ => None,
    }
}

pub(crate) fn find_dimensions(patterns: &CompiledPatterns, text: &str) -> Option<Dimensions> {
    patterns.dimensions.iter().find_map(|re| {
        let caps = re.captures(text)?;
        let width: f64 = caps.get(1)?.as_str().parse().ok()?;
        let height: f64 = caps.get(3)?.as_str().parse().ok()?;
        let width_unit = parse_unit(caps.get(2).map(|m| m.as_str()));
        let height_unit = parse_unit(caps.get(4).map(|m| m.as_str()));
        // A side without a suffix shares the other side's unit
        Some(Dimensions::from_sides(
            width,
            width_unit.or(height_unit).unwrap_or(LengthUnit::Inches),
            height,
            height_unit.or(width_unit).unwrap_or(LengthUnit::Inches),
        ))
    })
}

/// Blank out dimension phrases so their numbers are not read as counts or
/// item numbers. Byte offsets are preserved.
pub(crate) fn mask_dimensions(patterns: &CompiledPatterns, text: &str) -> String {
    let mut masked = text.to_string();
    for re in &patterns.dimensions {
        let spans: Vec<(usize, usize)> = re.find_iter(&masked).map(|m| (m.start(), m.end())).collect();
        for (start, end) in spans {
            masked.replace_range(start..end, &" ".repeat(end - start));
        }
    }
    masked
}

fn find_operation(patterns: &CompiledPatterns, text: &str) -> Option<OperationType> {
    first_in_table(&patterns.operations, text)
        .or_else(|| first_in_table(&patterns.operation_phrases, text))
}

fn collapse_low_e_argon(features: &mut BTreeSet<String>) {
    if features.contains(LOW_E) && features.contains(ARGON) {
        features.remove(LOW_E);
        features.remove(ARGON);
        features.insert(LOW_E_WITH_ARGON.to_string());
    }
    if features.contains(LOW_E_WITH_ARGON) {
        features.remove(LOW_E);
        features.remove(ARGON);
    }
}

fn find_features(patterns: &CompiledPatterns, text: &str) -> BTreeSet<String> {
    let mut features: BTreeSet<String> = patterns
        .features
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(tag, _)| tag.to_string())
        .collect();
    collapse_low_e_argon(&mut features);
    features
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn find_location(patterns: &CompiledPatterns, text: &str) -> Option<String> {
    if let Some(name) = first_in_table(&patterns.locations, text) {
        return Some(name.to_string());
    }
    let caps = patterns.location_phrase.captures(text)?;
    let phrase = caps.get(1)?.as_str().trim();
    if phrase.is_empty() {
        return None;
    }
    Some(title_case(phrase))
}

fn find_quantity(patterns: &CompiledPatterns, masked: &str, max_quantity: u32) -> Option<u32> {
    patterns.quantity.iter().find_map(|re| {
        re.captures_iter(masked)
            .filter_map(|caps| patterns::parse_count(caps.get(1)?.as_str()))
            .find(|n| (1..=max_quantity).contains(n))
    })
}

fn mentions_color(color_patterns: &[Regex], text: &str) -> bool {
    color_patterns.iter().any(|re| {
        re.captures_iter(text).any(|caps| {
            caps.get(1)
                .map(|word| word.as_str())
                .is_some_and(|word| word != NEUTRAL_COLOR && !COLOR_STOP_WORDS.contains(&word))
        })
    })
}

fn find_shape(patterns: &CompiledPatterns, text: &str) -> ShapedDetails {
    ShapedDetails {
        shape: first_in_table(&patterns.shapes, text).map(str::to_string),
    }
}

fn find_bay_details(patterns: &CompiledPatterns, text: &str) -> BayDetails {
    let angle_degrees = patterns
        .bay_angle
        .captures(text)
        .and_then(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .filter(|angle| (10..=90).contains(angle));
    let panel_count = patterns
        .bay_panels
        .captures(text)
        .and_then(|caps| patterns::parse_count(caps.get(1)?.as_str()));
    BayDetails {
        angle_degrees,
        panel_count,
        is_bow: patterns.bow.is_match(text),
    }
}

/// Run every field heuristic over already lower-cased text
pub(crate) fn parse_fields(patterns: &CompiledPatterns, text: &str, max_quantity: u32) -> ParsedFields {
    let masked = mask_dimensions(patterns, text);
    let window_type = first_in_table(&patterns.window_types, text);
    ParsedFields {
        dimensions: find_dimensions(patterns, text),
        operation_type: find_operation(patterns, text),
        window_type,
        glass_type: first_in_table(&patterns.glass_types, text),
        features: find_features(patterns, text),
        location: find_location(patterns, text),
        quantity: find_quantity(patterns, &masked, max_quantity),
        has_interior_color: mentions_color(&patterns.interior_color, text),
        has_exterior_color: mentions_color(&patterns.exterior_color, text),
        shaped_details: (window_type == Some(WindowType::Shaped)).then(|| find_shape(patterns, text)),
        bay_details: (window_type == Some(WindowType::Bay)).then(|| find_bay_details(patterns, text)),
    }
}

/// Lower-cased contents of the user turns; other roles never describe
/// the customer's windows
pub(crate) fn user_texts(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| m.role == Role::User)
        .filter_map(|m| m.content.as_deref())
        .filter(|content| !content.trim().is_empty())
        .map(str::to_lowercase)
        .collect()
}

type PatternSource = fn() -> Result<&'static CompiledPatterns, regex::Error>;

/// Stateless extractor turning conversation text into window specifications
#[derive(Debug, Clone)]
pub struct SpecificationExtractor {
    max_quantity: u32,
    patterns: PatternSource,
}

impl Default for SpecificationExtractor {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

impl SpecificationExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            max_quantity: config.max_quantity,
            patterns: patterns::compiled,
        }
    }

    /// Extractor whose pattern tables never compile
    #[cfg(test)]
    pub(crate) fn with_broken_patterns() -> Self {
        Self {
            patterns: || Err(Regex::new("(").unwrap_err()),
            ..Self::default()
        }
    }

    fn patterns(&self) -> Result<&'static CompiledPatterns, ExtractionError> {
        (self.patterns)().map_err(ExtractionError::from)
    }

    pub(crate) fn max_quantity(&self) -> u32 {
        self.max_quantity
    }

    /// Parse one free-text description
    pub fn parse_text(&self, text: &str) -> Extraction<WindowSpecification> {
        match self.patterns() {
            Ok(patterns) => Extraction::Parsed(
                parse_fields(patterns, &text.to_lowercase(), self.max_quantity).into_specification(),
            ),
            Err(err) => degraded_single(err),
        }
    }

    /// Treat all user turns as describing a single window
    pub fn extract(&self, messages: &[Message]) -> Extraction<WindowSpecification> {
        let patterns = match self.patterns() {
            Ok(patterns) => patterns,
            Err(err) => return degraded_single(err),
        };
        let combined = user_texts(messages).join("\n");
        let spec = parse_fields(patterns, &combined, self.max_quantity).into_specification();
        debug!(
            "Extracted specification: complete={}, location={:?}",
            spec.is_complete, spec.location
        );
        Extraction::Parsed(spec)
    }

    /// Single-window view of a conversation; empty and incomplete when the
    /// heuristics could not run
    pub fn parse_window_specifications(&self, messages: &[Message]) -> WindowSpecification {
        self.extract(messages).into_value()
    }

    /// Split the conversation into individual windows, trying explicit
    /// numbering, then room grouping, then a single-window reading
    pub fn parse_multiple_window_specifications(&self, messages: &[Message]) -> MultiWindowSpecification {
        let patterns = match self.patterns() {
            Ok(patterns) => patterns,
            Err(err) => {
                warn!("Multi-window extraction degraded: {}", err);
                return MultiWindowSpecification::degraded(err.to_string());
            }
        };
        strategies::segment(self, patterns, &user_texts(messages))
    }

    /// Width and height in inches, if any phrasing matched
    pub fn parse_dimensions(&self, text: &str) -> Option<Dimensions> {
        let patterns = self.patterns().ok()?;
        find_dimensions(patterns, &text.to_lowercase())
    }
}

fn degraded_single(err: ExtractionError) -> Extraction<WindowSpecification> {
    warn!("Specification extraction degraded: {}", err);
    Extraction::Degraded {
        fallback: WindowSpecification::empty(),
        reason: err.to_string(),
    }
}
