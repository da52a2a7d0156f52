// 📋 Roster Records - Raw observations in, resolved entities out
//
// RawRecord:      one observation from one source (scraped page, manual fix,
//                 encyclopedic summary, transfer feed). Every field except the
//                 person name may be missing.
// ResolvedEntity: one merged record per canonical key.
//
// Source feeds disagree on field names ("team" vs "club", "price" vs "cost"),
// so deserialization accepts the known aliases and degrades unreadable
// scalars to absent instead of failing the whole record.

use crate::birth_year::BirthYearInput;
use crate::key::CanonicalKey;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============================================================================
// ROLE CODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum RoleCode {
    Goalkeeper,
    Defender,
    Midfielder,
    Forward,
    #[default]
    Unknown,
}

impl RoleCode {
    /// Lenient parse: English names, Italian names, single-letter Italian
    /// codes (P/D/C/A) and common abbreviations. Anything else is `Unknown`.
    pub fn parse(raw: &str) -> RoleCode {
        match raw.trim().to_lowercase().as_str() {
            "goalkeeper" | "gk" | "por" | "portiere" | "p" => RoleCode::Goalkeeper,
            "defender" | "def" | "dif" | "difensore" | "d" => RoleCode::Defender,
            "midfielder" | "mid" | "cen" | "centrocampista" | "c" => RoleCode::Midfielder,
            "forward" | "fwd" | "att" | "attaccante" | "a" | "striker" => RoleCode::Forward,
            _ => RoleCode::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleCode::Goalkeeper => "Goalkeeper",
            RoleCode::Defender => "Defender",
            RoleCode::Midfielder => "Midfielder",
            RoleCode::Forward => "Forward",
            RoleCode::Unknown => "Unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != RoleCode::Unknown
    }

    /// `None` for `Unknown`, so the completeness rule treats it as absent
    pub fn known(self) -> Option<RoleCode> {
        self.is_known().then_some(self)
    }
}

impl fmt::Display for RoleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoleCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(serde_json::Value::String(s)) => RoleCode::parse(&s),
            _ => RoleCode::Unknown,
        })
    }
}

// ============================================================================
// RAW RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Free text as scraped; an empty name is rejected by the engine
    #[serde(default, alias = "name", alias = "player")]
    pub person_name: String,

    #[serde(default, alias = "team", alias = "club", deserialize_with = "lenient_string")]
    pub org_name: Option<String>,

    #[serde(default, alias = "role", alias = "position")]
    pub role_code: RoleCode,

    #[serde(
        default,
        alias = "birth_year",
        alias = "birthyear",
        alias = "year_of_birth",
        deserialize_with = "lenient_birth_year"
    )]
    pub birth_year_raw: Option<BirthYearInput>,

    #[serde(
        default,
        alias = "fantamedia",
        alias = "avg",
        deserialize_with = "lenient_f64"
    )]
    pub performance_value: Option<f64>,

    #[serde(default, alias = "price", alias = "cost", deserialize_with = "lenient_f64")]
    pub cost_value: Option<f64>,

    /// Source identifier
    #[serde(default, alias = "source")]
    pub provenance: String,

    #[serde(default, alias = "date", deserialize_with = "lenient_date")]
    pub observed_at: Option<NaiveDate>,
}

impl RawRecord {
    pub fn new(person_name: &str, provenance: &str) -> Self {
        RawRecord {
            person_name: person_name.to_string(),
            org_name: None,
            role_code: RoleCode::Unknown,
            birth_year_raw: None,
            performance_value: None,
            cost_value: None,
            provenance: provenance.to_string(),
            observed_at: None,
        }
    }

    pub fn with_org(mut self, org: &str) -> Self {
        self.org_name = Some(org.to_string());
        self
    }

    pub fn with_role(mut self, role: RoleCode) -> Self {
        self.role_code = role;
        self
    }

    pub fn with_birth_year(mut self, raw: impl Into<BirthYearInput>) -> Self {
        self.birth_year_raw = Some(raw.into());
        self
    }

    pub fn with_performance(mut self, value: f64) -> Self {
        self.performance_value = Some(value);
        self
    }

    pub fn with_cost(mut self, value: f64) -> Self {
        self.cost_value = Some(value);
        self
    }

    pub fn observed(mut self, date: NaiveDate) -> Self {
        self.observed_at = Some(date);
        self
    }

    /// Organization text, empty when unknown
    pub fn org(&self) -> &str {
        self.org_name.as_deref().unwrap_or("")
    }
}

// ============================================================================
// RESOLVED ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub canonical_key: CanonicalKey,

    /// Best-available original-cased name
    pub display_name: String,

    #[serde(default)]
    pub org_name: String,

    #[serde(default)]
    pub role_code: RoleCode,

    #[serde(default)]
    pub birth_year: Option<i32>,

    #[serde(default)]
    pub performance_value: Option<f64>,

    #[serde(default)]
    pub cost_value: Option<f64>,

    /// Every contributing source, in arrival order
    #[serde(default)]
    pub provenance_trail: Vec<String>,
}

impl ResolvedEntity {
    pub fn has_birth_year(&self) -> bool {
        self.birth_year.is_some()
    }

    /// Age reached during `reference_year`
    pub fn age_in(&self, reference_year: i32) -> Option<i32> {
        self.birth_year.map(|y| reference_year - y)
    }
}

// ============================================================================
// LENIENT SCALARS
// ============================================================================

/// Accepts `YYYY-MM-DD`, `MM/DD/YYYY`, `DD/MM/YYYY` (when the day gives it
/// away) and RFC 3339 timestamps.
pub fn parse_observed_at(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%m/%d/%Y") {
        return Some(date);
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
        return Some(date);
    }

    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive())
}

/// Numbers or numeric strings ("6.5", "6,5"); anything else is absent
pub fn parse_number(raw: &str) -> Option<f64> {
    let value = raw.trim().replace(',', ".").parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()),
        Some(serde_json::Value::String(s)) => parse_number(&s),
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        _ => None,
    })
}

fn lenient_birth_year<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<BirthYearInput>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => match n.as_i64() {
            Some(i) => Some(BirthYearInput::Integer(i)),
            None => n.as_f64().map(BirthYearInput::Decimal),
        },
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(BirthYearInput::Text(s)),
        _ => None,
    })
}

fn lenient_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => parse_observed_at(&s),
        _ => None,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_code_parse() {
        assert_eq!(RoleCode::parse("P"), RoleCode::Goalkeeper);
        assert_eq!(RoleCode::parse("difensore"), RoleCode::Defender);
        assert_eq!(RoleCode::parse(" MID "), RoleCode::Midfielder);
        assert_eq!(RoleCode::parse("Forward"), RoleCode::Forward);
        assert_eq!(RoleCode::parse("libero"), RoleCode::Unknown);
        assert_eq!(RoleCode::Unknown.known(), None);
    }

    #[test]
    fn test_deserialize_with_aliases() {
        let json = r#"{
            "name": "Yunus Musah",
            "team": "Atalanta",
            "role": "C",
            "birth_year": 2002,
            "fantamedia": "6,25",
            "price": 14,
            "source": "fantagazzetta",
            "date": "2025-08-01"
        }"#;
        let record: RawRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.person_name, "Yunus Musah");
        assert_eq!(record.org(), "Atalanta");
        assert_eq!(record.role_code, RoleCode::Midfielder);
        assert_eq!(record.birth_year_raw, Some(BirthYearInput::Integer(2002)));
        assert_eq!(record.performance_value, Some(6.25));
        assert_eq!(record.cost_value, Some(14.0));
        assert_eq!(record.provenance, "fantagazzetta");
        assert_eq!(record.observed_at, NaiveDate::from_ymd_opt(2025, 8, 1));
    }

    #[test]
    fn test_missing_and_garbage_fields_degrade_to_absent() {
        let json = r#"{
            "person_name": "Nicola Zalewski",
            "org_name": "",
            "role_code": 7,
            "birth_year_raw": null,
            "performance_value": "n/d",
            "cost_value": [1, 2],
            "observed_at": "yesterday"
        }"#;
        let record: RawRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.org_name, None);
        assert_eq!(record.role_code, RoleCode::Unknown);
        assert_eq!(record.birth_year_raw, None);
        assert_eq!(record.performance_value, None);
        assert_eq!(record.cost_value, None);
        assert_eq!(record.observed_at, None);
        assert_eq!(record.provenance, "");
    }

    #[test]
    fn test_birth_year_text_and_decimal() {
        let record: RawRecord =
            serde_json::from_str(r#"{"name": "X", "birth_year": "classe '03"}"#).unwrap();
        assert_eq!(record.birth_year_raw, Some(BirthYearInput::Text("classe '03".into())));

        let record: RawRecord = serde_json::from_str(r#"{"name": "X", "birth_year": 2001.0}"#).unwrap();
        assert_eq!(record.birth_year_raw, Some(BirthYearInput::Decimal(2001.0)));
    }

    #[test]
    fn test_parse_observed_at_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 23);
        assert_eq!(parse_observed_at("2025-01-23"), expected);
        assert_eq!(parse_observed_at("01/23/2025"), expected);
        assert_eq!(parse_observed_at("23/01/2025"), expected);
        assert_eq!(parse_observed_at("2025-01-23T10:30:00Z"), expected);
        assert_eq!(parse_observed_at(""), None);
        assert_eq!(parse_observed_at("soon"), None);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("6.5"), Some(6.5));
        assert_eq!(parse_number(" 6,5 "), Some(6.5));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("-"), None);
    }

    #[test]
    fn test_entity_age() {
        let entity = ResolvedEntity {
            canonical_key: crate::key::build_key("Yunus Musah", "Atalanta"),
            display_name: "Yunus Musah".to_string(),
            org_name: "Atalanta".to_string(),
            role_code: RoleCode::Midfielder,
            birth_year: Some(2002),
            performance_value: None,
            cost_value: None,
            provenance_trail: vec![],
        };
        assert_eq!(entity.age_in(2025), Some(23));
        assert!(entity.has_birth_year());
    }
}
