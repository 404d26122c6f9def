//! Segmentation of a conversation into individual windows
//!
//! Strategies are tried in priority order and the first one that produces
//! anything wins:
//!
//! 1. explicit numbering ("window 2", "3rd window", "second window")
//! 2. grouping user turns by the room they mention
//! 3. the whole conversation as one window

use super::extractor::{find_location, mask_dimensions, parse_fields, ParsedFields, SpecificationExtractor};
use super::models::{MultiWindowSpecification, SegmentationStrategy, WindowSpecification};
use super::patterns::{parse_count, CompiledPatterns};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Highest item number accepted as an explicit marker
const MAX_ITEM_NUMBER: u32 = 20;

/// What a single strategy produced
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExtractionResult {
    None,
    Single(WindowSpecification),
    Multiple(Vec<WindowSpecification>),
}

type Strategy = fn(&SpecificationExtractor, &CompiledPatterns, &[String]) -> ExtractionResult;

const STRATEGIES: &[(SegmentationStrategy, Strategy)] = &[
    (SegmentationStrategy::ExplicitNumbering, explicit_numbering as Strategy),
    (SegmentationStrategy::LocationGrouping, location_grouping as Strategy),
    (SegmentationStrategy::SingleWindow, single_window as Strategy),
];

/// Run the strategy chain over lower-cased user turns
pub(crate) fn segment(
    extractor: &SpecificationExtractor,
    patterns: &CompiledPatterns,
    texts: &[String],
) -> MultiWindowSpecification {
    for (kind, strategy) in STRATEGIES {
        let windows = match strategy(extractor, patterns, texts) {
            ExtractionResult::None => continue,
            ExtractionResult::Single(spec) => vec![spec],
            ExtractionResult::Multiple(windows) => windows,
        };
        debug!("Segmented {} window(s) using {:?}", windows.len(), kind);
        return MultiWindowSpecification::from_windows(windows, *kind);
    }
    MultiWindowSpecification::from_windows(Vec::new(), SegmentationStrategy::SingleWindow)
}

fn explicit_numbering(
    extractor: &SpecificationExtractor,
    patterns: &CompiledPatterns,
    texts: &[String],
) -> ExtractionResult {
    let text = texts.join("\n");
    let masked = mask_dimensions(patterns, &text);

    let mut markers: Vec<(usize, u32)> = patterns
        .item_markers
        .iter()
        .flat_map(|re| {
            re.captures_iter(&masked)
                .filter_map(|caps| {
                    let start = caps.get(0)?.start();
                    let number = parse_count(caps.get(1)?.as_str())?;
                    Some((start, number))
                })
                .collect::<Vec<_>>()
        })
        .filter(|(_, number)| (1..=MAX_ITEM_NUMBER).contains(number))
        .collect();
    markers.sort_by_key(|(start, _)| *start);
    markers.dedup_by_key(|(start, _)| *start);

    // A lone marker is a reference, not an enumeration
    let distinct: BTreeSet<u32> = markers.iter().map(|(_, number)| *number).collect();
    if distinct.len() < 2 {
        return ExtractionResult::None;
    }

    let max_quantity = extractor.max_quantity();
    let preamble = parse_fields(patterns, &text[..markers[0].0], max_quantity);

    let mut segments: BTreeMap<u32, String> = BTreeMap::new();
    for (i, (start, number)) in markers.iter().enumerate() {
        let end = markers.get(i + 1).map(|(next, _)| *next).unwrap_or(text.len());
        let segment = segments.entry(*number).or_default();
        segment.push_str(&text[*start..end]);
        segment.push('\n');
    }

    let windows = segments
        .into_values()
        .map(|segment| {
            let mut fields = parse_fields(patterns, &segment, max_quantity);
            fields.inherit_from(&preamble);
            fields.into_specification()
        })
        .collect();
    ExtractionResult::Multiple(windows)
}

type GroupKey = Option<String>;

/// Group whose parse gains the most fields from `text`; ties go to the most
/// recently created group
fn best_group(
    patterns: &CompiledPatterns,
    groups: &IndexMap<GroupKey, Vec<&str>>,
    text: &str,
    max_quantity: u32,
) -> Option<GroupKey> {
    let mut best: Option<(usize, &GroupKey)> = None;
    for (key, members) in groups {
        let joined = members.join("\n");
        let without = parse_fields(patterns, &joined, max_quantity);
        let with = parse_fields(patterns, &format!("{joined}\n{text}"), max_quantity);
        let gain = with.gained_over(&without);
        if gain > 0 && best.map_or(true, |(top, _)| gain >= top) {
            best = Some((gain, key));
        }
    }
    best.map(|(_, key)| key.clone())
}

fn location_grouping(
    extractor: &SpecificationExtractor,
    patterns: &CompiledPatterns,
    texts: &[String],
) -> ExtractionResult {
    let max_quantity = extractor.max_quantity();
    let mut groups: IndexMap<GroupKey, Vec<&str>> = IndexMap::new();

    for text in texts {
        if let Some(location) = find_location(patterns, text) {
            groups.entry(Some(location)).or_default().push(text);
            continue;
        }

        let key = match best_group(patterns, &groups, text, max_quantity) {
            Some(key) => key,
            None => {
                let own = parse_fields(patterns, text, max_quantity);
                match groups.last() {
                    Some((latest, _)) if !own.carries_information() => latest.clone(),
                    _ => None,
                }
            }
        };
        groups.entry(key).or_default().push(text);
    }

    if !groups.keys().any(Option::is_some) {
        return ExtractionResult::None;
    }

    let windows = groups
        .into_iter()
        .filter_map(|(location, members)| {
            let mut fields: ParsedFields = parse_fields(patterns, &members.join("\n"), max_quantity);
            match location {
                Some(location) => {
                    fields.location = Some(location);
                    Some(fields.into_specification())
                }
                // Unplaced turns only count as a window if they sized one
                None => fields.dimensions.is_some().then(|| fields.into_specification()),
            }
        })
        .collect();
    ExtractionResult::Multiple(windows)
}

fn single_window(
    extractor: &SpecificationExtractor,
    patterns: &CompiledPatterns,
    texts: &[String],
) -> ExtractionResult {
    if texts.is_empty() {
        return ExtractionResult::None;
    }
    let fields = parse_fields(patterns, &texts.join("\n"), extractor.max_quantity());
    ExtractionResult::Single(fields.into_specification())
}

#[cfg(test)]
mod tests {
    use crate::context::Message;
    use crate::specification::models::{GlassType, OperationType, SegmentationStrategy};
    use crate::specification::SpecificationExtractor;

    fn segment(messages: &[Message]) -> crate::specification::MultiWindowSpecification {
        SpecificationExtractor::default().parse_multiple_window_specifications(messages)
    }

    #[test]
    fn test_numbered_windows_inherit_preamble() {
        let result = segment(&[Message::user(
            "I need two windows for the kitchen, all double pane. \
             Window 2 is 36x48 hung. Window 1 is 30x40 casement.",
        )]);

        assert_eq!(result.strategy, Some(SegmentationStrategy::ExplicitNumbering));
        assert_eq!(result.count, 2);
        assert!(result.has_multiple_windows);
        assert!(result.is_complete);

        let first = &result.windows[0];
        assert_eq!((first.width, first.height), (Some(30.0), Some(40.0)));
        assert_eq!(first.operation_type, OperationType::Casement);
        assert_eq!(first.location.as_deref(), Some("Kitchen"));
        assert_eq!(first.glass_type, Some(GlassType::DoublePane));

        let second = &result.windows[1];
        assert_eq!((second.width, second.height), (Some(36.0), Some(48.0)));
        assert_eq!(second.operation_type, OperationType::Hung);
    }

    #[test]
    fn test_ordinal_markers_across_messages() {
        let result = segment(&[
            Message::user("The first window is 24x36 in the bathroom with frosted glass"),
            Message::assistant("Got it. And the other one?"),
            Message::user("The second window is 30x40 in the office, clear glass"),
        ]);

        assert_eq!(result.strategy, Some(SegmentationStrategy::ExplicitNumbering));
        assert_eq!(result.count, 2);
        assert_eq!(result.windows[0].location.as_deref(), Some("Bathroom"));
        assert_eq!(result.windows[0].glass_type, Some(GlassType::Frosted));
        assert_eq!(result.windows[1].location.as_deref(), Some("Office"));
        assert_eq!(result.windows[1].glass_type, Some(GlassType::Clear));
    }

    #[test]
    fn test_single_marker_is_not_an_enumeration() {
        let result = segment(&[Message::user("the first window is 24x36 with clear glass")]);
        assert_eq!(result.strategy, Some(SegmentationStrategy::SingleWindow));
        assert_eq!(result.count, 1);
    }

    #[test]
    fn test_location_grouping_assigns_unplaced_turns() {
        let result = segment(&[
            Message::user("Kitchen window is 36x48"),
            Message::user("double pane glass"),
            Message::user("Bedroom one is 30x40 casement"),
            Message::user("triple pane for that one"),
            Message::user("thanks!"),
        ]);

        assert_eq!(result.strategy, Some(SegmentationStrategy::LocationGrouping));
        assert_eq!(result.count, 2);
        assert!(result.is_complete);

        let kitchen = &result.windows[0];
        assert_eq!(kitchen.location.as_deref(), Some("Kitchen"));
        assert_eq!(kitchen.glass_type, Some(GlassType::DoublePane));

        let bedroom = &result.windows[1];
        assert_eq!(bedroom.location.as_deref(), Some("Bedroom"));
        assert_eq!(bedroom.glass_type, Some(GlassType::TriplePane));
        assert_eq!(bedroom.operation_type, OperationType::Casement);
    }

    #[test]
    fn test_unplaced_bucket_before_first_room() {
        let result = segment(&[
            Message::user("36x48 double pane"),
            Message::user("and a kitchen one too, 30x40"),
        ]);

        assert_eq!(result.strategy, Some(SegmentationStrategy::LocationGrouping));
        assert_eq!(result.count, 2);
        assert_eq!(result.windows[0].location, None);
        assert_eq!(result.windows[0].width, Some(36.0));
        assert_eq!(result.windows[1].location.as_deref(), Some("Kitchen"));
    }

    #[test]
    fn test_single_window_fallback() {
        let result = segment(&[Message::user("36x48 double pane")]);
        assert_eq!(result.strategy, Some(SegmentationStrategy::SingleWindow));
        assert_eq!(result.count, 1);
        assert!(!result.has_multiple_windows);
        assert!(result.is_complete);
    }

    #[test]
    fn test_no_user_turns() {
        let result = segment(&[Message::assistant("How can I help?")]);
        assert_eq!(result.count, 0);
        assert!(!result.is_complete);
        assert!(result.error.is_none());
    }
}
