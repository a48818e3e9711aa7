//! Step validation: pure predicates over one step's raw input.
//!
//! A step may only advance when `validate_step` returns `Ok`. The returned
//! values are already typed and ready to be written to the draft.

use chrono::NaiveDate;

use crate::config::{FieldKind, FieldSpec, OnboardingConfig, fields};
use crate::error::{ReasonCode, ValidationFailure};

use super::model::{DraftValue, StepInput};
use super::state::OnboardingStep;

/// Validate the raw input of `step` against the questionnaire table.
///
/// Blank inputs count as absent. Optional fields that are absent produce no
/// value; required ones fail with `missing_field`.
pub fn validate_step(
    step: OnboardingStep,
    input: &StepInput,
    config: &OnboardingConfig,
    today: NaiveDate,
) -> Result<Vec<(String, DraftValue)>, ValidationFailure> {
    let mut values = Vec::new();

    for spec in config.fields_for(step) {
        let raw = input
            .get(&spec.name)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty());

        let Some(raw) = raw else {
            if spec.required {
                return Err(ValidationFailure::new(&spec.name, ReasonCode::MissingField));
            }
            continue;
        };

        let value = parse_field(spec, raw, today)?;
        values.push((spec.name.clone(), value));
    }

    check_period_order(&values)?;
    Ok(values)
}

fn parse_field(
    spec: &FieldSpec,
    raw: &str,
    today: NaiveDate,
) -> Result<DraftValue, ValidationFailure> {
    let fail = |reason| ValidationFailure::new(&spec.name, reason);

    match &spec.kind {
        FieldKind::Choice { truthy, falsy } => {
            if raw.eq_ignore_ascii_case(truthy) {
                Ok(DraftValue::Bool(true))
            } else if raw.eq_ignore_ascii_case(falsy) {
                Ok(DraftValue::Bool(false))
            } else {
                Err(fail(ReasonCode::OutOfRange))
            }
        }
        FieldKind::Integer { min, max } => {
            let n = parse_number(raw).ok_or_else(|| fail(ReasonCode::NotNumeric))?;
            if n < 0.0 || n.fract() != 0.0 {
                return Err(fail(ReasonCode::OutOfRange));
            }
            if n < *min as f64 || n > *max as f64 {
                return Err(fail(ReasonCode::OutOfRange));
            }
            Ok(DraftValue::Number(n))
        }
        FieldKind::Decimal { min, max } => {
            let n = parse_number(raw).ok_or_else(|| fail(ReasonCode::NotNumeric))?;
            if n <= 0.0 || n < *min || n > *max {
                return Err(fail(ReasonCode::OutOfRange));
            }
            Ok(DraftValue::Number(n))
        }
        FieldKind::Date => {
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| fail(ReasonCode::InvalidDate))?;
            if date > today {
                return Err(fail(ReasonCode::OutOfRange));
            }
            Ok(DraftValue::Date(date))
        }
        FieldKind::Text => Ok(DraftValue::Text(raw.to_string())),
    }
}

/// Finite numbers only; "NaN" and "inf" parse as f64 but are not answers.
fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn check_period_order(values: &[(String, DraftValue)]) -> Result<(), ValidationFailure> {
    let find = |name: &str| {
        values
            .iter()
            .find(|(field, _)| field == name)
            .and_then(|(_, v)| v.as_date())
    };

    if let (Some(start), Some(end)) = (find(fields::PERIOD_START), find(fields::PERIOD_END)) {
        if end < start {
            return Err(ValidationFailure::new(
                fields::PERIOD_END,
                ReasonCode::OutOfRange,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn input(pairs: &[(&str, &str)]) -> StepInput {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn validate(step: OnboardingStep, pairs: &[(&str, &str)]) -> Result<Vec<(String, DraftValue)>, ValidationFailure> {
        validate_step(step, &input(pairs), &OnboardingConfig::default(), today())
    }

    #[test]
    fn forced_choice_requires_a_selection() {
        let err = validate(OnboardingStep::Step1, &[("unusual_bleeding", "usual")]).unwrap_err();
        assert_eq!(err, ValidationFailure::new("cycle_regular", ReasonCode::MissingField));

        let ok = validate(
            OnboardingStep::Step1,
            &[("cycle_regular", "No"), ("unusual_bleeding", "Unusual")],
        )
        .unwrap();
        assert_eq!(
            ok,
            vec![
                ("cycle_regular".to_string(), DraftValue::Bool(false)),
                ("unusual_bleeding".to_string(), DraftValue::Bool(true)),
            ]
        );
    }

    #[test]
    fn forced_choice_rejects_unknown_option() {
        let err = validate(
            OnboardingStep::Step1,
            &[("cycle_regular", "maybe"), ("unusual_bleeding", "usual")],
        )
        .unwrap_err();
        assert_eq!(err.reason, ReasonCode::OutOfRange);
    }

    #[test]
    fn numeric_field_rejects_text() {
        let err = validate(
            OnboardingStep::Step2,
            &[("period_start", "2024-05-01"), ("cycle_length", "twenty")],
        )
        .unwrap_err();
        assert_eq!(err, ValidationFailure::new("cycle_length", ReasonCode::NotNumeric));
    }

    #[test]
    fn length_fields_reject_negative_and_fractional() {
        for bad in ["-28", "28.5"] {
            let err = validate(
                OnboardingStep::Step2,
                &[("period_start", "2024-05-01"), ("cycle_length", bad)],
            )
            .unwrap_err();
            assert_eq!(err.reason, ReasonCode::OutOfRange, "input {bad}");
        }
    }

    #[test]
    fn measurements_outside_bounds_are_out_of_range() {
        let err = validate(OnboardingStep::Step3, &[("height_cm", "12")]).unwrap_err();
        assert_eq!(err, ValidationFailure::new("height_cm", ReasonCode::OutOfRange));

        let err = validate(OnboardingStep::Step3, &[("weight_kg", "-60")]).unwrap_err();
        assert_eq!(err.reason, ReasonCode::OutOfRange);
    }

    #[test]
    fn height_is_whole_centimetres() {
        let err = validate(OnboardingStep::Step3, &[("height_cm", "170.5")]).unwrap_err();
        assert_eq!(err, ValidationFailure::new("height_cm", ReasonCode::OutOfRange));

        let values = validate(OnboardingStep::Step3, &[("height_cm", "170")]).unwrap();
        assert_eq!(values, vec![("height_cm".to_string(), DraftValue::Number(170.0))]);
    }

    #[test]
    fn nan_is_not_numeric() {
        let err = validate(OnboardingStep::Step3, &[("weight_kg", "NaN")]).unwrap_err();
        assert_eq!(err.reason, ReasonCode::NotNumeric);
    }

    #[test]
    fn optional_step_passes_empty() {
        let values = validate(OnboardingStep::Step3, &[("height_cm", "   ")]).unwrap();
        assert!(values.is_empty());
        assert!(validate(OnboardingStep::Step4, &[]).unwrap().is_empty());
    }

    #[test]
    fn dates_are_parsed_and_ordered() {
        let values = validate(
            OnboardingStep::Step2,
            &[
                ("period_start", "2024-05-01"),
                ("period_end", "2024-05-05"),
                ("cycle_length", "28"),
            ],
        )
        .unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(
            values[0].1,
            DraftValue::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
        );

        let err = validate(
            OnboardingStep::Step2,
            &[
                ("period_start", "2024-05-05"),
                ("period_end", "2024-05-01"),
                ("cycle_length", "28"),
            ],
        )
        .unwrap_err();
        assert_eq!(err, ValidationFailure::new("period_end", ReasonCode::OutOfRange));
    }

    #[test]
    fn malformed_or_future_dates_fail() {
        let err = validate(
            OnboardingStep::Step2,
            &[("period_start", "05/01/2024"), ("cycle_length", "28")],
        )
        .unwrap_err();
        assert_eq!(err.reason, ReasonCode::InvalidDate);

        let err = validate(
            OnboardingStep::Step2,
            &[("period_start", "2024-07-01"), ("cycle_length", "28")],
        )
        .unwrap_err();
        assert_eq!(err.reason, ReasonCode::OutOfRange);
    }

    #[test]
    fn non_input_steps_have_nothing_to_validate() {
        assert!(validate(OnboardingStep::Submitting, &[("x", "y")]).unwrap().is_empty());
    }
}
