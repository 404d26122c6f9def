//! Keyword and pattern tables driving specification extraction
//!
//! Every table is plain data: an ordered list of `(value, patterns)` entries.
//! Lookups walk the entries in order and the first entry with a matching
//! pattern wins. Patterns run against lower-cased text.

use super::models::{GlassType, OperationType, WindowType};
use once_cell::sync::Lazy;
use regex::Regex;

pub const LOW_E: &str = "Low-E";
pub const ARGON: &str = "Argon";
/// Replaces [`LOW_E`] and [`ARGON`] when both are mentioned
pub const LOW_E_WITH_ARGON: &str = "Low-E with Argon";

const NUM: &str = r"(\d+(?:\.\d+)?)";
const UNIT: &str = r#"(?:\s*(inches|inch|in\b|"|centimeters?|cm\b|feet|foot|ft\b|'))?"#;

/// Spelled-out numbers accepted wherever a count is expected
pub const NUMBER_WORDS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
];

/// Spelled-out ordinals recognised as item markers
pub const ORDINAL_WORDS: &[(&str, u32)] = &[
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
    ("fifth", 5),
];

pub const OPERATION_KEYWORDS: &[(OperationType, &[&str])] = &[
    (
        OperationType::Hung,
        &[r"single[\s-]?hung", r"double[\s-]?hung", r"\bhung\b"],
    ),
    (
        OperationType::Slider,
        &[r"\bsliders?\b", r"\bsliding\b", r"\bgliders?\b"],
    ),
    (
        OperationType::Fixed,
        &[r"\bfixed\b", r"\bpicture windows?\b", r"\bstationary\b", r"non[\s-]?operable"],
    ),
    (
        OperationType::Casement,
        &[r"\bcasements?\b", r"\bcrank(?:s|ed)?\b"],
    ),
    (OperationType::Awning, &[r"\bawnings?\b"]),
];

/// Fallback phrasings describing how the window opens
pub const OPERATION_PHRASES: &[(OperationType, &[&str])] = &[
    (
        OperationType::Casement,
        &[
            r"opens? (?:from|on|to) the side",
            r"swings? (?:out|open)",
            r"opens? like a door",
            r"hinged on the side",
        ],
    ),
    (
        OperationType::Awning,
        &[
            r"opens? (?:from|at) the (?:bottom|top)",
            r"hinged (?:at|on) the top",
            r"tilts? out",
        ],
    ),
    (
        OperationType::Slider,
        &[r"slides? (?:side to side|left and right|horizontally|sideways)"],
    ),
    (
        OperationType::Hung,
        &[r"slides? (?:up and down|vertically)", r"moves? up and down"],
    ),
    (
        OperationType::Fixed,
        &[r"(?:doesn'?t|does not|won'?t|will not|shouldn'?t|should not|can'?t|cannot) open"],
    ),
];

pub const WINDOW_TYPE_KEYWORDS: &[(WindowType, &[&str])] = &[
    (WindowType::Bay, &[r"\bbay\b", r"\bbow\b"]),
    (
        WindowType::Shaped,
        &[
            r"\bshaped\b",
            r"\barch(?:ed|top|es)?\b",
            r"half[\s-]?(?:round|moon|circle)",
            r"\bcirc(?:le|ular)\b",
            r"\bround\b",
            r"\boctagon(?:al)?\b",
            r"\btriang(?:le|ular)\b",
            r"\btrapezoid(?:al)?\b",
            r"\beyebrow\b",
            r"custom shape",
        ],
    ),
    (
        WindowType::Standard,
        &[r"\bstandard\b", r"\bregular\b", r"\brectangular\b", r"\bnormal\b"],
    ),
];

pub const SHAPE_KEYWORDS: &[(&str, &[&str])] = &[
    ("half round", &[r"half[\s-]?(?:round|moon|circle)"]),
    ("eyebrow", &[r"\beyebrow\b"]),
    ("arch", &[r"\barch(?:ed|top|es)?\b"]),
    ("circle", &[r"\bcirc(?:le|ular)\b", r"\bround\b"]),
    ("octagon", &[r"\boctagon(?:al)?\b"]),
    ("triangle", &[r"\btriang(?:le|ular)\b"]),
    ("trapezoid", &[r"\btrapezoid(?:al)?\b"]),
];

pub const GLASS_KEYWORDS: &[(GlassType, &[&str])] = &[
    (
        GlassType::TriplePane,
        &[r"triple[\s-]?pane", r"triple[\s-]?glaz(?:ed|ing)"],
    ),
    (
        GlassType::DoublePane,
        &[
            r"double[\s-]?pane",
            r"dual[\s-]?pane",
            r"double[\s-]?glaz(?:ed|ing)",
            r"insulated glass",
        ],
    ),
    (GlassType::Laminated, &[r"\blaminated\b"]),
    (
        GlassType::Frosted,
        &[r"\bfrosted\b", r"\bobscured?\b", r"privacy glass", r"textured glass"],
    ),
    (GlassType::Tinted, &[r"\btint(?:ed)?\b"]),
    (GlassType::Clear, &[r"\bclear\b"]),
];

/// Independent feature tags; several may apply at once
pub const FEATURE_KEYWORDS: &[(&str, &[&str])] = &[
    (LOW_E, &[r"\blow[\s-]?e\b", r"low[\s-]emissivity"]),
    (ARGON, &[r"\bargon\b"]),
    ("Grilles", &[r"\bgrilles?\b", r"\bgrids?\b", r"\bmuntins?\b"]),
    ("Tempered", &[r"\btempered\b", r"safety glass"]),
    ("Screen", &[r"\bscreens?\b"]),
    ("Impact Resistant", &[r"impact[\s-]resistant", r"\bhurricane\b"]),
];

/// Room vocabulary, more specific names first
pub const LOCATION_KEYWORDS: &[(&str, &[&str])] = &[
    ("Master Bathroom", &[r"master bath(?:room)?\b"]),
    ("Master Bedroom", &[r"master bed(?:room)?\b"]),
    ("Guest Bedroom", &[r"guest bed(?:room)?\b"]),
    ("Living Room", &[r"living ?room\b"]),
    ("Dining Room", &[r"dining ?room\b"]),
    ("Family Room", &[r"family ?room\b"]),
    ("Great Room", &[r"great ?room\b"]),
    ("Laundry Room", &[r"laundry(?: ?room)?\b"]),
    ("Guest Room", &[r"guest ?room\b"]),
    ("Sunroom", &[r"sun ?room\b"]),
    ("Mudroom", &[r"mud ?room\b"]),
    ("Bedroom", &[r"\bbedrooms?\b"]),
    ("Bathroom", &[r"\bbath(?:room)?s?\b"]),
    ("Kitchen", &[r"\bkitchen\b"]),
    ("Basement", &[r"\bbasement\b"]),
    ("Office", &[r"\boffice\b"]),
    ("Den", &[r"\bden\b"]),
    ("Garage", &[r"\bgarage\b"]),
    ("Attic", &[r"\battic\b"]),
    ("Hallway", &[r"\bhall(?:way)?\b"]),
    ("Foyer", &[r"\bfoyer\b", r"\bentryway\b"]),
    ("Nursery", &[r"\bnursery\b"]),
    ("Stairwell", &[r"\bstair(?:well|way|case)\b"]),
    ("Study", &[r"\bstudy\b"]),
    ("Loft", &[r"\bloft\b"]),
];

/// Generic "room is X" phrasing used when no vocabulary entry matches
pub const LOCATION_PHRASE: &str =
    r"\b(?:room|location)\s*(?:is|:)\s*(?:the\s+|my\s+|a\s+|an\s+)?([a-z][a-z' ]{1,30}?)\s*(?:[.,;!?\n]|$|\band\b|\bwith\b)";

/// Words next to interior/exterior that never name a color. Any other word
/// except white sets the color flag.
pub const COLOR_STOP_WORDS: &[&str] = &[
    "a", "an", "the", "my", "our", "your", "its", "their", "this", "that", "it", "and", "or",
    "but", "with", "of", "on", "in", "to", "for", "from", "at", "as", "is", "are", "be", "will",
    "should", "would", "can", "both", "also", "too", "only", "no", "not", "none", "same",
    "matching", "standard", "default", "side", "sides", "color", "colour", "colors", "colours",
    "paint", "painted", "finish", "trim", "frame", "frames", "window", "windows", "wall", "walls",
    "measurement", "measurements", "measured", "dimensions",
];

/// Literal that never counts as a color flag
pub const NEUTRAL_COLOR: &str = "white";

fn dimension_patterns() -> Vec<String> {
    vec![
        format!(r"{NUM}{UNIT}\s*(?:x|×|\*)\s*{NUM}{UNIT}"),
        format!(r"{NUM}{UNIT}\s+by\s+{NUM}{UNIT}"),
        format!(r"(?s)\bwidth\s*(?:is|of|:|=)?\s*{NUM}{UNIT}.*?\bheight\s*(?:is|of|:|=)?\s*{NUM}{UNIT}"),
        format!(r"(?s){NUM}{UNIT}\s*wide\b.*?{NUM}{UNIT}\s*(?:tall|high)\b"),
    ]
}

fn count_alternation() -> String {
    let words: Vec<&str> = NUMBER_WORDS.iter().map(|(word, _)| *word).collect();
    format!(r"(\d+|{})", words.join("|"))
}

fn quantity_patterns() -> Vec<String> {
    let count = count_alternation();
    vec![
        format!(r"\b{count}\s+(?:(?:new|more|replacement|identical|matching|similar)\s+)?windows?\b"),
        format!(r"\bneed\s+{count}\b"),
        format!(r"\bwant\s+{count}\b"),
        format!(r"\b{count}\s+of\s+them\b"),
    ]
}

fn marker_patterns() -> Vec<String> {
    let ordinals: Vec<&str> = ORDINAL_WORDS.iter().map(|(word, _)| *word).collect();
    vec![
        r"\bwindow\s*(?:#|no\.?\s*|number\s*)?(\d{1,2})\b".to_string(),
        r"\b(\d{1,2})(?:st|nd|rd|th)\s+window\b".to_string(),
        format!(r"\b({})\s+window\b", ordinals.join("|")),
    ]
}

/// Compiled form of the tables above
#[derive(Debug)]
pub(crate) struct CompiledPatterns {
    pub dimensions: Vec<Regex>,
    pub operations: Vec<(OperationType, Regex)>,
    pub operation_phrases: Vec<(OperationType, Regex)>,
    pub window_types: Vec<(WindowType, Regex)>,
    pub shapes: Vec<(&'static str, Regex)>,
    pub glass_types: Vec<(GlassType, Regex)>,
    pub features: Vec<(&'static str, Regex)>,
    pub locations: Vec<(&'static str, Regex)>,
    pub location_phrase: Regex,
    pub quantity: Vec<Regex>,
    pub interior_color: Vec<Regex>,
    pub exterior_color: Vec<Regex>,
    pub bay_angle: Regex,
    pub bay_panels: Regex,
    pub bow: Regex,
    pub item_markers: Vec<Regex>,
}

/// Join an entry's patterns into one alternation
fn compile_entry(patterns: &[&str]) -> Result<Regex, regex::Error> {
    let joined: Vec<String> = patterns.iter().map(|p| format!("(?:{p})")).collect();
    Regex::new(&joined.join("|"))
}

fn compile_table<T: Copy>(table: &[(T, &[&str])]) -> Result<Vec<(T, Regex)>, regex::Error> {
    table
        .iter()
        .map(|(value, patterns)| Ok((*value, compile_entry(patterns)?)))
        .collect()
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

fn color_patterns(surfaces: &str) -> Result<Vec<Regex>, regex::Error> {
    compile_all(&[
        format!(r"\b(?:{surfaces})\s+(?:colou?r\s+)?(?:is\s+|of\s+|in\s+|should be\s+)?([a-z]+)"),
        format!(r"\b([a-z]+)\s+(?:{surfaces})\b"),
    ])
}

impl CompiledPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            dimensions: compile_all(&dimension_patterns())?,
            operations: compile_table(OPERATION_KEYWORDS)?,
            operation_phrases: compile_table(OPERATION_PHRASES)?,
            window_types: compile_table(WINDOW_TYPE_KEYWORDS)?,
            shapes: compile_table(SHAPE_KEYWORDS)?,
            glass_types: compile_table(GLASS_KEYWORDS)?,
            features: compile_table(FEATURE_KEYWORDS)?,
            locations: compile_table(LOCATION_KEYWORDS)?,
            location_phrase: Regex::new(LOCATION_PHRASE)?,
            quantity: compile_all(&quantity_patterns())?,
            interior_color: color_patterns("interior|inside")?,
            exterior_color: color_patterns("exterior|outside")?,
            bay_angle: Regex::new(r"\b(\d{2})\s*(?:°|-?\s*deg(?:ree)?s?\b)")?,
            bay_panels: Regex::new(r"\b(\d|two|three|four|five)[\s-]*(?:panels?|lites?|sections?)\b")?,
            bow: Regex::new(r"\bbow\b")?,
            item_markers: compile_all(&marker_patterns())?,
        })
    }
}

static PATTERNS: Lazy<Result<CompiledPatterns, regex::Error>> = Lazy::new(CompiledPatterns::compile);

/// Shared compiled tables, or the compilation error
pub(crate) fn compiled() -> Result<&'static CompiledPatterns, regex::Error> {
    match &*PATTERNS {
        Ok(patterns) => Ok(patterns),
        Err(err) => Err(err.clone()),
    }
}

/// Resolve a digit string or number word
pub(crate) fn parse_count(token: &str) -> Option<u32> {
    token.parse().ok().or_else(|| {
        NUMBER_WORDS
            .iter()
            .chain(ORDINAL_WORDS.iter())
            .find(|(word, _)| *word == token)
            .map(|(_, n)| *n)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tables_compile() {
        let patterns = compiled().unwrap();
        assert_eq!(patterns.operations.len(), OPERATION_KEYWORDS.len());
        assert_eq!(patterns.locations.len(), LOCATION_KEYWORDS.len());
        assert_eq!(patterns.dimensions.len(), 4);
    }

    #[test]
    fn test_operation_table_matches_synonyms() {
        let patterns = compiled().unwrap();
        let lookup = |text: &str| {
            patterns
                .operations
                .iter()
                .find(|(_, re)| re.is_match(text))
                .map(|(op, _)| *op)
        };
        assert_eq!(lookup("a double-hung unit"), Some(OperationType::Hung));
        assert_eq!(lookup("a sliding window"), Some(OperationType::Slider));
        assert_eq!(lookup("it cranks open"), Some(OperationType::Casement));
        assert_eq!(lookup("just a picture window"), Some(OperationType::Fixed));
        assert_eq!(lookup("no idea"), None);
    }

    #[test]
    fn test_location_table_prefers_specific_rooms() {
        let patterns = compiled().unwrap();
        let first = patterns
            .locations
            .iter()
            .find(|(_, re)| re.is_match("the master bedroom window"))
            .map(|(name, _)| *name);
        assert_eq!(first, Some("Master Bedroom"));
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("12"), Some(12));
        assert_eq!(parse_count("three"), Some(3));
        assert_eq!(parse_count("second"), Some(2));
        assert_eq!(parse_count("many"), None);
    }
}
