//! Draft and profile data models.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single answer as stored in the draft.
///
/// Serialized externally tagged (`{"date": "2024-01-01"}`) so a reload
/// yields the same variant that was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftValue {
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    Dates(Vec<NaiveDate>),
    Text(String),
}

impl DraftValue {
    /// Numeric view: numbers, and text that parses as one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Date view: dates, and `YYYY-MM-DD` text.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    /// Boolean view. Legacy drafts stored flags as 0/1.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(n) if *n == 0.0 => Some(false),
            Self::Number(n) if *n == 1.0 => Some(true),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<bool> for DraftValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for DraftValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<NaiveDate> for DraftValue {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<&str> for DraftValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Every answer entered so far, keyed by field name.
///
/// Later writes overwrite earlier ones. Fields no step knows about are kept
/// as-is.
pub type DraftAnswers = BTreeMap<String, DraftValue>;

/// Raw, unvalidated text a step collected, keyed by field name.
pub type StepInput = BTreeMap<String, String>;

/// The canonical profile payload sent to the backend.
///
/// Built once per submission and never retained. Field order is fixed so
/// serialization is byte-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub height_cm: u32,
    pub weight_kg: f64,
    pub cycle_length: u32,
    pub luteal_length: u32,
    pub menses_length: u32,
    pub period_start_dates: Vec<NaiveDate>,
    pub unusual_bleeding: bool,
    pub number_of_peak: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn draft_value_keeps_its_variant_through_json() {
        let mut draft = DraftAnswers::new();
        draft.insert("period_start".into(), DraftValue::Date(date("2024-01-01")));
        draft.insert("note".into(), DraftValue::Text("2024-01-01".into()));
        draft.insert("cycle_length".into(), DraftValue::Number(28.0));

        let json = serde_json::to_string(&draft).unwrap();
        let parsed: DraftAnswers = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, draft);
        assert!(matches!(parsed["note"], DraftValue::Text(_)));
    }

    #[test]
    fn numeric_and_date_views_accept_text() {
        assert_eq!(DraftValue::Text(" 28 ".into()).as_number(), Some(28.0));
        assert_eq!(DraftValue::Text("abc".into()).as_number(), None);
        assert_eq!(
            DraftValue::Text("2024-03-09".into()).as_date(),
            Some(date("2024-03-09"))
        );
        assert_eq!(DraftValue::Number(3.0).as_date(), None);
    }

    #[test]
    fn bool_view_accepts_legacy_flags() {
        assert_eq!(DraftValue::Number(0.0).as_bool(), Some(false));
        assert_eq!(DraftValue::Number(1.0).as_bool(), Some(true));
        assert_eq!(DraftValue::Text("Yes".into()).as_bool(), Some(true));
        assert_eq!(DraftValue::Number(2.0).as_bool(), None);
    }

    #[test]
    fn profile_record_serializes_dates_as_iso() {
        let record = ProfileRecord {
            height_cm: 165,
            weight_kg: 60.0,
            cycle_length: 28,
            luteal_length: 14,
            menses_length: 5,
            period_start_dates: vec![date("2024-01-01")],
            unusual_bleeding: false,
            number_of_peak: 2,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["period_start_dates"][0], "2024-01-01");
        assert_eq!(json["cycle_length"], 28);
    }
}
