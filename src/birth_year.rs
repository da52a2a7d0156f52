// 🎂 Year Validator/Extractor - Birth year from heterogeneous inputs
//
// Structured values:  2002, "2002", "'03", 2002.0
// Biographical prose: "nato il 23 gennaio 2002", "born 4 May 2003",
//                     "classe '05", "... (born in 1999) ..."
//
// Every candidate is validated against plausibility bounds; anything that
// fails is simply absent, never an error.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Oldest birth year considered plausible
pub const DEFAULT_MIN_BIRTH_YEAR: i32 = 1900;

/// Youngest plausible competitive age
pub const DEFAULT_MIN_AGE: i32 = 14;

/// Bare years are only trusted this close (in characters) to a birth keyword
const KEYWORD_WINDOW_BEFORE: usize = 80;
const KEYWORD_WINDOW_AFTER: usize = 10;

const BIRTH_KEYWORDS: &[&str] = &["nato", "nata", "nascita", "born", "birth", "classe", "class of"];

// ============================================================================
// BOUNDS
// ============================================================================

/// Plausibility window: `min_year <= year <= reference_year - min_age`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearBounds {
    pub reference_year: i32,
    pub min_age: i32,
    pub min_year: i32,
}

impl YearBounds {
    pub fn new(reference_year: i32) -> Self {
        YearBounds {
            reference_year,
            min_age: DEFAULT_MIN_AGE,
            min_year: DEFAULT_MIN_BIRTH_YEAR,
        }
    }

    pub fn with_min_age(mut self, min_age: i32) -> Self {
        self.min_age = min_age;
        self
    }

    pub fn with_min_year(mut self, min_year: i32) -> Self {
        self.min_year = min_year;
        self
    }

    /// Latest acceptable birth year
    pub fn max_year(&self) -> i32 {
        self.reference_year.min(self.reference_year - self.min_age)
    }

    /// `Some(year)` when plausible, `None` otherwise
    pub fn validate(&self, year: i64) -> Option<i32> {
        let year = i32::try_from(year).ok()?;
        if year < self.min_year || year > self.reference_year {
            return None;
        }
        if year > self.reference_year - self.min_age {
            return None;
        }
        Some(year)
    }
}

// ============================================================================
// INPUT
// ============================================================================

/// A year-bearing value as scraped: a number, a numeric string, a two-digit
/// shorthand, or biographical prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BirthYearInput {
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl From<i64> for BirthYearInput {
    fn from(value: i64) -> Self {
        BirthYearInput::Integer(value)
    }
}

impl From<i32> for BirthYearInput {
    fn from(value: i32) -> Self {
        BirthYearInput::Integer(i64::from(value))
    }
}

impl From<&str> for BirthYearInput {
    fn from(value: &str) -> Self {
        BirthYearInput::Text(value.to_string())
    }
}

impl From<String> for BirthYearInput {
    fn from(value: String) -> Self {
        BirthYearInput::Text(value)
    }
}

/// Which rule produced an extracted year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Integer or numeric string
    Structured,
    /// "nato il 23 gennaio 2002", "born 23 January 2002"
    BornOnDate,
    /// "nato nel 2002", "born in 2002"
    BornInYear,
    /// "classe '02", "class of 2002"
    ClassOf,
    /// Bare year near a birth keyword
    KeywordWindow,
}

// ============================================================================
// PATTERNS
// ============================================================================

const IT_MONTHS: &str =
    "gennaio|febbraio|marzo|aprile|maggio|giugno|luglio|agosto|settembre|ottobre|novembre|dicembre";

const EN_MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex")
}

/// "2025-26", "2024/25" (season labels); a third date component marks a real date
static SEASON_RANGE: Lazy<Regex> =
    Lazy::new(|| compile(r"\b(?:19|20)\d{2}\s*[-/]\s*\d{2}\b([-/]\d)?"));

static BORN_ON_DATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // nato a Roma il 23 gennaio 2002 / nata il 1º marzo 1999
        compile(&format!(
            r"(?i)\bnat[oa](?:\s+a\s+[\p{{L}}\s']+?)?\s*(?:il\s+)?\d{{1,2}}[°º]?\s+(?:{IT_MONTHS})\s+(?P<year>(?:19|20)\d{{2}})\b"
        )),
        // born on 23 January 2002 / born 23 Jan. 2002
        compile(&format!(
            r"(?i)\bborn\s+(?:on\s+)?\d{{1,2}}\s+(?:{EN_MONTHS})\.?,?\s+(?P<year>(?:19|20)\d{{2}})\b"
        )),
        // born on January 23, 2002
        compile(&format!(
            r"(?i)\bborn\s+(?:on\s+)?(?:{EN_MONTHS})\.?\s+\d{{1,2}},?\s+(?P<year>(?:19|20)\d{{2}})\b"
        )),
        // (Roma, 23 gennaio 2002) / (23 January 2002 – ...)
        compile(&format!(
            r"(?i)\(\s*(?:born\s+)?(?:[\p{{L}}\s']+,\s*)?\d{{1,2}}[°º]?\s+(?:{IT_MONTHS}|{EN_MONTHS})\s+(?P<year>(?:19|20)\d{{2}})\b"
        )),
    ]
});

static BORN_IN_YEAR: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![compile(
        r"(?i)\b(?:nat[oa]\s+nel|born\s+in)\s+(?P<year>(?:19|20)\d{2})\b",
    )]
});

static CLASS_OF: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![compile(
        r"(?i)\b(?:classe|class\s+of)\s+['’]?(?P<year>\d{4}|\d{2})\b",
    )]
});

static BARE_YEAR: Lazy<Regex> = Lazy::new(|| compile(r"\b(?:19|20)\d{2}\b"));

// ============================================================================
// EXTRACTION
// ============================================================================

/// Extract and validate a birth year against `reference_year` with the
/// default age and floor bounds.
pub fn extract_birth_year(source: &BirthYearInput, reference_year: i32) -> Option<i32> {
    extract_with_bounds(source, &YearBounds::new(reference_year))
}

pub fn extract_with_bounds(source: &BirthYearInput, bounds: &YearBounds) -> Option<i32> {
    extract_with_method(source, bounds).map(|(year, _)| year)
}

/// Extract a birth year and report which rule produced it
pub fn extract_with_method(
    source: &BirthYearInput,
    bounds: &YearBounds,
) -> Option<(i32, ExtractionMethod)> {
    match source {
        BirthYearInput::Integer(value) => bounds
            .validate(expand_two_digit(*value))
            .map(|y| (y, ExtractionMethod::Structured)),
        BirthYearInput::Decimal(value) => {
            if !value.is_finite() || value.fract() != 0.0 {
                return None;
            }
            bounds
                .validate(expand_two_digit(*value as i64))
                .map(|y| (y, ExtractionMethod::Structured))
        }
        BirthYearInput::Text(text) => match parse_structured(text) {
            Some(value) => bounds
                .validate(expand_two_digit(value))
                .map(|y| (y, ExtractionMethod::Structured)),
            None => extract_from_text(text, bounds),
        },
    }
}

/// Parse a numeric string such as "2002", " 2002 " or "'03".
/// Returns `None` for anything that is not a plain integer.
pub fn parse_structured(raw: &str) -> Option<i64> {
    let trimmed = raw.trim().trim_start_matches(['\'', '’']);
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i64>().ok()
}

/// Two-digit shorthand: values below 100 are read as 20xx
pub fn expand_two_digit(value: i64) -> i64 {
    if (0..100).contains(&value) {
        value + 2000
    } else {
        value
    }
}

/// Scan biographical prose, most specific pattern family first.
pub fn extract_from_text(text: &str, bounds: &YearBounds) -> Option<(i32, ExtractionMethod)> {
    if text.trim().is_empty() {
        return None;
    }

    let text = strip_season_ranges(&text.replace(['–', '—'], "-"));

    let families: [(&[Regex], ExtractionMethod); 3] = [
        (BORN_ON_DATE.as_slice(), ExtractionMethod::BornOnDate),
        (BORN_IN_YEAR.as_slice(), ExtractionMethod::BornInYear),
        (CLASS_OF.as_slice(), ExtractionMethod::ClassOf),
    ];

    for (patterns, method) in families {
        for pattern in patterns {
            for caps in pattern.captures_iter(&text) {
                let Some(value) = caps.name("year").and_then(|m| m.as_str().parse::<i64>().ok())
                else {
                    continue;
                };
                if let Some(year) = bounds.validate(expand_two_digit(value)) {
                    return Some((year, method));
                }
            }
        }
    }

    keyword_window_year(&text, bounds).map(|y| (y, ExtractionMethod::KeywordWindow))
}

/// Remove season labels ("2025-26") but keep full dates ("2002-03-15")
fn strip_season_ranges(text: &str) -> String {
    SEASON_RANGE
        .replace_all(text, |caps: &Captures| {
            if caps.get(1).is_some() {
                caps[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// First plausible bare year with a birth keyword close by
fn keyword_window_year(text: &str, bounds: &YearBounds) -> Option<i32> {
    BARE_YEAR.find_iter(text).find_map(|m| {
        let year = bounds.validate(m.as_str().parse::<i64>().ok()?)?;
        let context = char_window(text, m.start(), m.end()).to_lowercase();
        BIRTH_KEYWORDS
            .iter()
            .any(|keyword| context.contains(keyword))
            .then_some(year)
    })
}

/// Slice of `text` around `[start, end)`, widened by a fixed number of chars
fn char_window(text: &str, start: usize, end: usize) -> &str {
    let from = text[..start]
        .char_indices()
        .rev()
        .take(KEYWORD_WINDOW_BEFORE)
        .last()
        .map_or(start, |(i, _)| i);
    let to = text[end..]
        .char_indices()
        .nth(KEYWORD_WINDOW_AFTER)
        .map_or(text.len(), |(i, _)| end + i);
    &text[from..to]
}

// ============================================================================
// TESTS
// ============================================================================
