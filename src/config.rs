//! Configuration types.
//!
//! `ClientConfig` covers the transport side and is read from the
//! environment. `OnboardingConfig` is the questionnaire table: which step
//! asks for which field, the accepted ranges, legacy field names and the
//! defaults the assembler falls back on.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::onboarding::state::OnboardingStep;

/// How the prediction endpoint is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionMode {
    /// `GET /predictions/current?target_date=YYYY-MM-DD`
    Dated,
    /// `GET /predict`, always "today".
    Today,
}

impl std::str::FromStr for PredictionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dated" => Ok(Self::Dated),
            "today" => Ok(Self::Today),
            other => Err(ConfigError::InvalidValue {
                key: "PLANHER_PREDICTION_MODE".to_string(),
                message: format!("expected 'dated' or 'today', got '{other}'"),
            }),
        }
    }
}

/// Backend connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend, without a trailing slash.
    pub base_url: String,
    /// Bearer token supplied by the surrounding session layer.
    pub api_token: Option<SecretString>,
    /// Path of the local draft database.
    pub db_path: PathBuf,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Profile creation endpoint path.
    pub profile_path: String,
    pub prediction_mode: PredictionMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_token: None,
            db_path: PathBuf::from("./data/planher.db"),
            request_timeout: Duration::from_secs(10),
            profile_path: "/profiles/me".to_string(),
            prediction_mode: PredictionMode::Dated,
        }
    }
}

impl ClientConfig {
    /// Build config from `PLANHER_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let base_url = std::env::var("PLANHER_API_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);

        let api_token = std::env::var("PLANHER_API_TOKEN")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(SecretString::from);

        let db_path = std::env::var("PLANHER_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let request_timeout = match std::env::var("PLANHER_HTTP_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "PLANHER_HTTP_TIMEOUT_SECS".to_string(),
                    message: format!("'{raw}' is not a whole number of seconds"),
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => defaults.request_timeout,
        };

        let profile_path = std::env::var("PLANHER_PROFILE_PATH").unwrap_or(defaults.profile_path);

        let prediction_mode = match std::env::var("PLANHER_PREDICTION_MODE") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.prediction_mode,
        };

        Ok(Self {
            base_url,
            api_token,
            db_path,
            request_timeout,
            profile_path,
            prediction_mode,
        })
    }
}

// ── Questionnaire table ─────────────────────────────────────────────

/// What kind of value a field accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Forced choice between two labels; stored as a bool (`true` for `truthy`).
    Choice { truthy: String, falsy: String },
    /// Whole number of days or counts. Negative values are never accepted.
    Integer { min: i64, max: i64 },
    /// Measurement with a fractional part allowed.
    Decimal { min: f64, max: f64 },
    /// Calendar date, `YYYY-MM-DD`.
    Date,
    /// Free text.
    Text,
}

/// One input on one step.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    fn new(name: &str, kind: FieldKind, required: bool) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required,
        }
    }
}

/// Values used when the draft has nothing for a field.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDefaults {
    pub height_cm: u32,
    pub weight_kg: f64,
    pub luteal_length: u32,
    /// Only used when neither a date pair nor an entered value exists.
    pub menses_length: u32,
    pub unusual_bleeding: bool,
    pub number_of_peak: u32,
}

impl Default for ProfileDefaults {
    fn default() -> Self {
        Self {
            height_cm: 165,
            weight_kg: 60.0,
            luteal_length: 14,
            menses_length: 5,
            unusual_bleeding: false,
            number_of_peak: 2,
        }
    }
}

/// Field names used by the draft and the assembler.
pub mod fields {
    pub const CYCLE_REGULAR: &str = "cycle_regular";
    pub const UNUSUAL_BLEEDING: &str = "unusual_bleeding";
    pub const PERIOD_START: &str = "period_start";
    pub const PERIOD_END: &str = "period_end";
    pub const PERIOD_START_DATES: &str = "period_start_dates";
    pub const CYCLE_LENGTH: &str = "cycle_length";
    pub const HEIGHT_CM: &str = "height_cm";
    pub const WEIGHT_KG: &str = "weight_kg";
    pub const LUTEAL_LENGTH: &str = "luteal_length";
    pub const MENSES_LENGTH: &str = "menses_length";
    pub const NUMBER_OF_PEAK: &str = "number_of_peak";
    pub const MEDICAL_CONDITIONS: &str = "medical_conditions";
}

/// The onboarding questionnaire as data.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    pub defaults: ProfileDefaults,
    /// `(legacy_name, canonical_name)` pairs consulted when the canonical
    /// name is absent from the draft.
    pub aliases: Vec<(String, String)>,
    steps: Vec<(OnboardingStep, Vec<FieldSpec>)>,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        use fields::*;

        let steps = vec![
            (
                OnboardingStep::Step1,
                vec![
                    FieldSpec::new(
                        CYCLE_REGULAR,
                        FieldKind::Choice {
                            truthy: "yes".into(),
                            falsy: "no".into(),
                        },
                        true,
                    ),
                    FieldSpec::new(
                        UNUSUAL_BLEEDING,
                        FieldKind::Choice {
                            truthy: "unusual".into(),
                            falsy: "usual".into(),
                        },
                        true,
                    ),
                ],
            ),
            (
                OnboardingStep::Step2,
                vec![
                    FieldSpec::new(PERIOD_START, FieldKind::Date, true),
                    FieldSpec::new(PERIOD_END, FieldKind::Date, false),
                    FieldSpec::new(CYCLE_LENGTH, FieldKind::Integer { min: 20, max: 40 }, true),
                ],
            ),
            (
                OnboardingStep::Step3,
                vec![
                    FieldSpec::new(HEIGHT_CM, FieldKind::Integer { min: 100, max: 250 }, false),
                    FieldSpec::new(
                        WEIGHT_KG,
                        FieldKind::Decimal {
                            min: 30.0,
                            max: 200.0,
                        },
                        false,
                    ),
                    FieldSpec::new(LUTEAL_LENGTH, FieldKind::Integer { min: 10, max: 20 }, false),
                    FieldSpec::new(MENSES_LENGTH, FieldKind::Integer { min: 2, max: 10 }, false),
                ],
            ),
            (
                OnboardingStep::Step4,
                vec![FieldSpec::new(MEDICAL_CONDITIONS, FieldKind::Text, false)],
            ),
        ];

        let aliases = [
            ("lastPeriod", PERIOD_START),
            ("periodEndDate", PERIOD_END),
            ("cycleLength", CYCLE_LENGTH),
            ("height", HEIGHT_CM),
            ("weight", WEIGHT_KG),
            ("lutealLength", LUTEAL_LENGTH),
            ("mensesLength", MENSES_LENGTH),
            ("Unusual_Bleeding", UNUSUAL_BLEEDING),
            ("medicalConditions", MEDICAL_CONDITIONS),
        ]
        .into_iter()
        .map(|(alias, canonical)| (alias.to_string(), canonical.to_string()))
        .collect();

        Self {
            defaults: ProfileDefaults::default(),
            aliases,
            steps,
        }
    }
}

impl OnboardingConfig {
    /// Fields asked on a step. Non-input states have none.
    pub fn fields_for(&self, step: OnboardingStep) -> &[FieldSpec] {
        self.steps
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, fields)| fields.as_slice())
            .unwrap_or(&[])
    }

    /// The step that asks for `field`, if any.
    pub fn step_for_field(&self, field: &str) -> Option<OnboardingStep> {
        let canonical = self.canonical_name(field);
        self.steps
            .iter()
            .find(|(_, fields)| fields.iter().any(|f| f.name == canonical))
            .map(|(step, _)| *step)
    }

    /// Legacy names that map onto `canonical`.
    pub fn aliases_of<'a>(&'a self, canonical: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.aliases
            .iter()
            .filter(move |(_, c)| c == canonical)
            .map(|(alias, _)| alias.as_str())
    }

    /// Resolve a possibly-legacy name to the canonical one.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|(alias, _)| alias == name)
            .map(|(_, canonical)| canonical.as_str())
            .unwrap_or(name)
    }
}
