//! Profile assembly: turns the accumulated draft into a `ProfileRecord`.
//!
//! Pure and deterministic: the same draft and the same `today` always yield
//! the same record. No I/O happens here.

use chrono::NaiveDate;

use crate::config::{OnboardingConfig, fields};
use crate::error::AssemblyError;

use super::model::{DraftAnswers, DraftValue, ProfileRecord};

/// Build the submission payload from `draft`.
///
/// `cycle_length` and at least one period start date are required. Every
/// other field falls back to `config.defaults` when absent, but a value that
/// is present and unusable is an error rather than silently replaced.
pub fn assemble(
    draft: &DraftAnswers,
    config: &OnboardingConfig,
    today: NaiveDate,
) -> Result<ProfileRecord, AssemblyError> {
    let lookup = Lookup { draft, config };
    let defaults = &config.defaults;

    let cycle_length = lookup
        .positive_int(fields::CYCLE_LENGTH)?
        .ok_or_else(|| missing(fields::CYCLE_LENGTH))?;

    let period_start_dates = period_start_dates(&lookup)?;
    for date in &period_start_dates {
        if *date > today {
            return Err(AssemblyError::InvalidDateRange {
                reason: format!("period start {date} is after {today}"),
            });
        }
    }

    let height_cm = lookup
        .positive_int(fields::HEIGHT_CM)?
        .unwrap_or(defaults.height_cm);
    let weight_kg = lookup
        .positive_number(fields::WEIGHT_KG)?
        .unwrap_or(defaults.weight_kg);
    let luteal_length = lookup
        .positive_int(fields::LUTEAL_LENGTH)?
        .unwrap_or(defaults.luteal_length);

    let menses_length = match menses_from_dates(&lookup, &period_start_dates)? {
        Some(days) => days,
        None => lookup
            .non_negative_int(fields::MENSES_LENGTH)?
            .unwrap_or(defaults.menses_length),
    };

    let unusual_bleeding = match lookup.get(fields::UNUSUAL_BLEEDING) {
        Some(v) => v.as_bool().ok_or_else(|| invalid(fields::UNUSUAL_BLEEDING))?,
        None => defaults.unusual_bleeding,
    };
    let number_of_peak = lookup
        .non_negative_int(fields::NUMBER_OF_PEAK)?
        .unwrap_or(defaults.number_of_peak);

    Ok(ProfileRecord {
        height_cm,
        weight_kg,
        cycle_length,
        luteal_length,
        menses_length,
        period_start_dates,
        unusual_bleeding,
        number_of_peak,
    })
}

/// Inclusive day count between `start` and `end`: the same day is 1.
///
/// Returns `InvalidDateRange` when `end` precedes `start`.
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> Result<u32, AssemblyError> {
    let diff = end.signed_duration_since(start).num_days();
    if diff < 0 {
        return Err(AssemblyError::InvalidDateRange {
            reason: format!("period end {end} is before period start {start}"),
        });
    }
    u32::try_from(diff + 1).map_err(|_| AssemblyError::InvalidDateRange {
        reason: format!("period from {start} to {end} is too long"),
    })
}

fn period_start_dates(lookup: &Lookup<'_>) -> Result<Vec<NaiveDate>, AssemblyError> {
    let mut dates = match lookup.get(fields::PERIOD_START_DATES) {
        Some(DraftValue::Dates(list)) => list.clone(),
        Some(DraftValue::Date(d)) => vec![*d],
        Some(_) => return Err(invalid(fields::PERIOD_START_DATES)),
        None => Vec::new(),
    };

    if let Some(value) = lookup.get(fields::PERIOD_START) {
        let start = value.as_date().ok_or_else(|| AssemblyError::InvalidDateRange {
            reason: format!("{} is not a date", fields::PERIOD_START),
        })?;
        if !dates.contains(&start) {
            dates.push(start);
        }
    }

    // Oldest first, whatever order the answers arrived in.
    dates.sort();
    dates.dedup();

    if dates.is_empty() {
        return Err(missing(fields::PERIOD_START_DATES));
    }
    Ok(dates)
}

/// `Some(days)` when a period end is recorded alongside a start.
fn menses_from_dates(
    lookup: &Lookup<'_>,
    starts: &[NaiveDate],
) -> Result<Option<u32>, AssemblyError> {
    let Some(end_value) = lookup.get(fields::PERIOD_END) else {
        return Ok(None);
    };
    let end = end_value
        .as_date()
        .ok_or_else(|| AssemblyError::InvalidDateRange {
            reason: format!("{} is not a date", fields::PERIOD_END),
        })?;

    // The end date belongs to the explicitly entered start, or failing that
    // to the most recent start on record.
    let start = match lookup.get(fields::PERIOD_START).and_then(DraftValue::as_date) {
        Some(start) => start,
        None => match starts.iter().max() {
            Some(start) => *start,
            None => return Ok(None),
        },
    };

    inclusive_days(start, end).map(Some)
}

fn missing(field: &str) -> AssemblyError {
    AssemblyError::MissingRequired {
        field: field.to_string(),
    }
}

fn invalid(field: &str) -> AssemblyError {
    AssemblyError::InvalidValue {
        field: field.to_string(),
    }
}

/// Draft access that understands legacy field names.
struct Lookup<'a> {
    draft: &'a DraftAnswers,
    config: &'a OnboardingConfig,
}

impl<'a> Lookup<'a> {
    fn get(&self, canonical: &str) -> Option<&'a DraftValue> {
        if let Some(v) = self.draft.get(canonical) {
            return Some(v);
        }
        self.config
            .aliases_of(canonical)
            .find_map(|alias| self.draft.get(alias))
    }

    fn number(&self, field: &str) -> Result<Option<f64>, AssemblyError> {
        match self.get(field) {
            None => Ok(None),
            Some(v) => v
                .as_number()
                .filter(|n| n.is_finite())
                .map(Some)
                .ok_or_else(|| invalid(field)),
        }
    }

    fn positive_number(&self, field: &str) -> Result<Option<f64>, AssemblyError> {
        match self.number(field)? {
            Some(n) if n <= 0.0 => Err(invalid(field)),
            other => Ok(other),
        }
    }

    fn non_negative_int(&self, field: &str) -> Result<Option<u32>, AssemblyError> {
        match self.number(field)? {
            None => Ok(None),
            Some(n) if n < 0.0 || n.fract() != 0.0 || n > u32::MAX as f64 => Err(invalid(field)),
            Some(n) => Ok(Some(n as u32)),
        }
    }

    fn positive_int(&self, field: &str) -> Result<Option<u32>, AssemblyError> {
        match self.non_negative_int(field)? {
            Some(0) => Err(invalid(field)),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn today() -> NaiveDate {
        date("2024-06-01")
    }

    fn base_draft() -> DraftAnswers {
        let mut draft = DraftAnswers::new();
        draft.insert("cycle_length".into(), DraftValue::Number(28.0));
        draft.insert("period_start".into(), DraftValue::Date(date("2024-01-01")));
        draft
    }

    fn run(draft: &DraftAnswers) -> Result<ProfileRecord, AssemblyError> {
        assemble(draft, &OnboardingConfig::default(), today())
    }

    #[test]
    fn minimal_draft_uses_defaults() {
        let record = run(&base_draft()).unwrap();
        assert_eq!(record.height_cm, 165);
        assert_eq!(record.weight_kg, 60.0);
        assert_eq!(record.luteal_length, 14);
        assert_eq!(record.menses_length, 5);
        assert_eq!(record.period_start_dates, vec![date("2024-01-01")]);
        assert!(!record.unusual_bleeding);
        assert_eq!(record.number_of_peak, 2);
    }

    #[test]
    fn menses_length_is_inclusive() {
        let mut draft = base_draft();
        draft.insert("period_end".into(), DraftValue::Date(date("2024-01-05")));
        assert_eq!(run(&draft).unwrap().menses_length, 5);

        draft.insert("period_end".into(), DraftValue::Date(date("2024-01-01")));
        assert_eq!(run(&draft).unwrap().menses_length, 1);
    }

    #[test]
    fn reversed_dates_are_an_error_not_a_negative_length() {
        let mut draft = base_draft();
        draft.insert("period_end".into(), DraftValue::Date(date("2023-12-28")));
        let err = run(&draft).unwrap_err();
        assert_eq!(err.code(), "invalid_date_range");
    }

    #[test]
    fn unparseable_end_date_is_invalid_range() {
        let mut draft = base_draft();
        draft.insert("period_end".into(), DraftValue::Text("soon".into()));
        assert!(matches!(
            run(&draft),
            Err(AssemblyError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn entered_menses_length_used_without_end_date() {
        let mut draft = base_draft();
        draft.insert("menses_length".into(), DraftValue::Number(4.0));
        assert_eq!(run(&draft).unwrap().menses_length, 4);

        // Dates win over the entered value.
        draft.insert("period_end".into(), DraftValue::Date(date("2024-01-07")));
        assert_eq!(run(&draft).unwrap().menses_length, 7);
    }

    #[test]
    fn missing_cycle_length_is_required() {
        let mut draft = base_draft();
        draft.remove("cycle_length");
        assert_eq!(
            run(&draft).unwrap_err(),
            AssemblyError::MissingRequired {
                field: "cycle_length".into()
            }
        );
    }

    #[test]
    fn missing_period_start_is_required() {
        let mut draft = base_draft();
        draft.remove("period_start");
        assert_eq!(run(&draft).unwrap_err().code(), "missing_required");
    }

    #[test]
    fn missing_height_falls_back_without_error() {
        let mut draft = base_draft();
        draft.insert("weight_kg".into(), DraftValue::Number(58.5));
        let record = run(&draft).unwrap();
        assert_eq!(record.height_cm, 165);
        assert_eq!(record.weight_kg, 58.5);
    }

    #[test]
    fn legacy_field_names_are_resolved() {
        let mut draft = DraftAnswers::new();
        draft.insert("cycleLength".into(), DraftValue::Text("30".into()));
        draft.insert("lastPeriod".into(), DraftValue::Text("2024-02-10".into()));
        draft.insert("periodEndDate".into(), DraftValue::Text("2024-02-13".into()));
        draft.insert("height".into(), DraftValue::Number(170.0));
        draft.insert("Unusual_Bleeding".into(), DraftValue::Number(0.0));

        let record = run(&draft).unwrap();
        assert_eq!(record.cycle_length, 30);
        assert_eq!(record.period_start_dates, vec![date("2024-02-10")]);
        assert_eq!(record.menses_length, 4);
        assert_eq!(record.height_cm, 170);
        assert!(!record.unusual_bleeding);
    }

    #[test]
    fn existing_start_dates_pass_through_in_order() {
        let mut draft = base_draft();
        draft.insert(
            "period_start_dates".into(),
            DraftValue::Dates(vec![date("2023-11-05"), date("2023-12-03")]),
        );
        let record = run(&draft).unwrap();
        assert_eq!(
            record.period_start_dates,
            vec![date("2023-11-05"), date("2023-12-03"), date("2024-01-01")]
        );

        // Already listed: not duplicated.
        draft.insert("period_start".into(), DraftValue::Date(date("2023-12-03")));
        let record = run(&draft).unwrap();
        assert_eq!(
            record.period_start_dates,
            vec![date("2023-11-05"), date("2023-12-03")]
        );
    }

    #[test]
    fn older_period_start_is_placed_in_date_order() {
        let mut draft = base_draft();
        draft.insert(
            "period_start_dates".into(),
            DraftValue::Dates(vec![date("2024-03-01"), date("2024-04-01")]),
        );
        draft.insert("period_start".into(), DraftValue::Date(date("2024-02-01")));

        let record = run(&draft).unwrap();
        assert_eq!(
            record.period_start_dates,
            vec![date("2024-02-01"), date("2024-03-01"), date("2024-04-01")]
        );
    }

    #[test]
    fn fractional_height_is_rejected() {
        let mut draft = base_draft();
        draft.insert("height".into(), DraftValue::Number(170.5));
        assert_eq!(
            run(&draft).unwrap_err(),
            AssemblyError::InvalidValue {
                field: "height_cm".into()
            }
        );
    }

    #[test]
    fn unusable_values_are_rejected() {
        let mut draft = base_draft();
        draft.insert("height_cm".into(), DraftValue::Number(-3.0));
        assert_eq!(
            run(&draft).unwrap_err(),
            AssemblyError::InvalidValue {
                field: "height_cm".into()
            }
        );

        let mut draft = base_draft();
        draft.insert("cycle_length".into(), DraftValue::Text("long".into()));
        assert_eq!(run(&draft).unwrap_err().code(), "invalid_value");

        let mut draft = base_draft();
        draft.insert("luteal_length".into(), DraftValue::Number(0.0));
        assert_eq!(run(&draft).unwrap_err().code(), "invalid_value");
    }

    #[test]
    fn future_period_start_is_invalid_range() {
        let mut draft = base_draft();
        draft.insert("period_start".into(), DraftValue::Date(date("2024-06-02")));
        assert_eq!(run(&draft).unwrap_err().code(), "invalid_date_range");
    }

    #[test]
    fn assembly_is_deterministic() {
        let mut draft = base_draft();
        draft.insert("period_end".into(), DraftValue::Date(date("2024-01-04")));
        draft.insert("unusual_bleeding".into(), DraftValue::Bool(true));
        draft.insert("medical_conditions".into(), DraftValue::Text("none".into()));

        let a = serde_json::to_vec(&run(&draft).unwrap()).unwrap();
        let b = serde_json::to_vec(&run(&draft.clone()).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn inclusive_days_counts_both_ends() {
        assert_eq!(inclusive_days(date("2024-01-01"), date("2024-01-05")).unwrap(), 5);
        assert_eq!(inclusive_days(date("2024-02-28"), date("2024-03-01")).unwrap(), 3);
        assert!(inclusive_days(date("2024-01-05"), date("2024-01-01")).is_err());
    }
}
