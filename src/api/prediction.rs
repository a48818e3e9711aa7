//! Prediction client: fetches a day's forecast and maps the backend's mood
//! code into display-ready values.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::PredictionMode;
use crate::error::{ApiError, PredictionError};

use super::ApiClient;

const DATED_PATH: &str = "/predictions/current";
const TODAY_PATH: &str = "/predict";
const HISTORY_PATH: &str = "/predictions/history";

/// Stage of the cycle as classified by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePhase {
    Menses,
    Follicular,
    Ovulation,
    Luteal,
    #[serde(rename = "Next Cycle")]
    NextCycle,
}

impl std::str::FromStr for CyclePhase {
    type Err = PredictionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "menses" | "menstrual" => Ok(Self::Menses),
            "follicular" => Ok(Self::Follicular),
            "ovulation" | "ovulatory" => Ok(Self::Ovulation),
            "luteal" => Ok(Self::Luteal),
            "next cycle" => Ok(Self::NextCycle),
            _ => Err(PredictionError::UnrecognizedPhase {
                phase: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Menses => "Menses",
            Self::Follicular => "Follicular",
            Self::Ovulation => "Ovulation",
            Self::Luteal => "Luteal",
            Self::NextCycle => "Next Cycle",
        };
        write!(f, "{s}")
    }
}

/// Mood label and energy level shown for a mood code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MoodForecast {
    pub label: &'static str,
    pub energy_percent: u8,
}

/// The fixed mood table. Codes outside it are a contract error.
pub fn mood_for_code(code: i64) -> Option<MoodForecast> {
    let (label, energy_percent) = match code {
        0 => ("Restful", 25),
        1 => ("Balanced", 60),
        2 => ("Energetic", 90),
        _ => return None,
    };
    Some(MoodForecast {
        label,
        energy_percent,
    })
}

/// A display-ready forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Date the forecast was requested for; `None` means "today" as the
    /// backend sees it.
    pub target_date: Option<NaiveDate>,
    pub day_of_cycle: u32,
    pub cycle_phase: CyclePhase,
    pub mood_code: u8,
    pub mood: MoodForecast,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_period_in_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Response body as the backend sends it.
///
/// Older backends name the mood `predicted_mood` and the score
/// `confidence`. Both spellings may appear in one body; the current name
/// wins.
#[derive(Debug, Deserialize)]
struct RawPrediction {
    day_of_cycle: i64,
    cycle_phase: String,
    #[serde(default)]
    predicted_mood_code: Option<Value>,
    #[serde(default)]
    predicted_mood: Option<Value>,
    #[serde(default)]
    next_period_in_days: Option<i64>,
    #[serde(default)]
    confidence_score: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// History body: one forecast per day the backend could predict.
#[derive(Debug, Deserialize)]
struct RawHistory {
    predictions: Vec<Value>,
}

/// Interpret a forecast body.
///
/// The mood code may be an integer or one of the backend's `low` / `medium`
/// / `high` labels; anything else is `UnrecognizedCode`.
pub fn parse_prediction(
    body: &Value,
    target_date: Option<NaiveDate>,
) -> Result<PredictionResult, PredictionError> {
    let raw: RawPrediction =
        serde_json::from_value(body.clone()).map_err(|e| PredictionError::Malformed {
            reason: e.to_string(),
        })?;

    let day_of_cycle = u32::try_from(raw.day_of_cycle)
        .ok()
        .filter(|d| *d >= 1)
        .ok_or_else(|| PredictionError::Malformed {
            reason: format!("day_of_cycle {} is not a positive day", raw.day_of_cycle),
        })?;

    let cycle_phase: CyclePhase = raw.cycle_phase.parse()?;

    let mood_value = raw
        .predicted_mood_code
        .as_ref()
        .or(raw.predicted_mood.as_ref())
        .ok_or_else(|| PredictionError::Malformed {
            reason: "missing field `predicted_mood_code`".to_string(),
        })?;
    let code = mood_code(mood_value)?;
    let mood = mood_for_code(code).ok_or_else(|| PredictionError::UnrecognizedCode {
        code: code.to_string(),
    })?;

    Ok(PredictionResult {
        target_date,
        day_of_cycle,
        cycle_phase,
        mood_code: code as u8,
        mood,
        next_period_in_days: raw.next_period_in_days,
        confidence: raw.confidence_score.or(raw.confidence),
    })
}

fn mood_code(value: &Value) -> Result<i64, PredictionError> {
    let unrecognized = || PredictionError::UnrecognizedCode {
        code: value.to_string(),
    };
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(unrecognized),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(0),
            "medium" => Ok(1),
            "high" => Ok(2),
            _ => Err(unrecognized()),
        },
        _ => Err(unrecognized()),
    }
}

/// Fetches forecasts. One request per call; no retry or backoff.
pub struct PredictionClient {
    api: Arc<ApiClient>,
    mode: PredictionMode,
}

impl PredictionClient {
    pub fn new(api: Arc<ApiClient>, mode: PredictionMode) -> Self {
        Self { api, mode }
    }

    /// Fetch the forecast for `for_date`, or for today when `None`.
    ///
    /// In `PredictionMode::Today` the backend only knows "today", so
    /// `for_date` is not sent.
    pub async fn fetch_prediction(
        &self,
        for_date: Option<NaiveDate>,
    ) -> Result<PredictionResult, PredictionError> {
        let (path, request) = match self.mode {
            PredictionMode::Dated => {
                let mut request = self.api.get(DATED_PATH);
                if let Some(date) = for_date {
                    request = request.query(&[("target_date", date.format("%Y-%m-%d").to_string())]);
                }
                (DATED_PATH, request)
            }
            PredictionMode::Today => {
                if for_date.is_some() {
                    debug!("Prediction endpoint is undated; requested date not sent");
                }
                (TODAY_PATH, self.api.get(TODAY_PATH))
            }
        };

        let body = self.fetch_json(request, path).await?;
        let result = parse_prediction(&body, for_date);
        if let Err(e) = &result {
            warn!(error = %e, "Prediction response rejected");
        }
        result
    }

    /// Fetch the stored forecasts for every day in `start..=end`.
    ///
    /// Days the backend could not predict are simply absent. One bad entry
    /// rejects the whole history.
    pub async fn fetch_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PredictionResult>, PredictionError> {
        let request = self.api.get(HISTORY_PATH).query(&[
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", end.format("%Y-%m-%d").to_string()),
        ]);
        let body = self.fetch_json(request, HISTORY_PATH).await?;

        let history: RawHistory =
            serde_json::from_value(body).map_err(|e| PredictionError::Malformed {
                reason: e.to_string(),
            })?;

        let results = history
            .predictions
            .iter()
            .map(|entry| {
                let date = history_date(entry)?;
                parse_prediction(entry, Some(date))
            })
            .collect::<Result<Vec<_>, _>>();

        match &results {
            Ok(list) => debug!(%start, %end, count = list.len(), "Prediction history loaded"),
            Err(e) => warn!(error = %e, "Prediction history rejected"),
        }
        results
    }

    async fn fetch_json(
        &self,
        request: reqwest::RequestBuilder,
        path: &str,
    ) -> Result<Value, PredictionError> {
        let response = self.api.send(request, path).await.map_err(|e| match e {
            ApiError::Unauthorized { .. } => PredictionError::Unauthorized,
            other => {
                warn!(error = %other, "Prediction fetch failed");
                PredictionError::Unavailable {
                    reason: other.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Prediction endpoint returned an error");
            return Err(PredictionError::Unavailable {
                reason: format!("prediction endpoint returned {status}"),
            });
        }

        response.json().await.map_err(|e| {
            if e.is_decode() {
                PredictionError::Malformed {
                    reason: e.to_string(),
                }
            } else {
                PredictionError::Unavailable {
                    reason: e.to_string(),
                }
            }
        })
    }
}

fn history_date(entry: &Value) -> Result<NaiveDate, PredictionError> {
    let raw = entry
        .get("date")
        .and_then(Value::as_str)
        .ok_or_else(|| PredictionError::Malformed {
            reason: "history entry without a date".to_string(),
        })?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| PredictionError::Malformed {
        reason: format!("history date {raw:?}: {e}"),
    })
}

/// What the forecast panel should show.
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastState {
    Loading,
    Ready(PredictionResult),
    /// Shown instead of stale or made-up data.
    Unavailable { reason: String },
}

/// Display slot for forecasts with last-request-wins ordering.
///
/// Each refresh takes a ticket. A response is applied only when no later
/// ticket has already been applied, so a slow answer for an old date never
/// replaces a newer one.
pub struct ForecastBoard {
    issued: AtomicU64,
    shown: Mutex<(u64, ForecastState)>,
}

impl Default for ForecastBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ForecastBoard {
    pub fn new() -> Self {
        Self {
            issued: AtomicU64::new(0),
            shown: Mutex::new((0, ForecastState::Loading)),
        }
    }

    /// Fetch a forecast and display it unless a newer one already landed.
    /// Returns whether this response was applied.
    pub async fn refresh(&self, client: &PredictionClient, for_date: Option<NaiveDate>) -> bool {
        let ticket = self.issued.fetch_add(1, Ordering::AcqRel) + 1;

        let next = match client.fetch_prediction(for_date).await {
            Ok(result) => ForecastState::Ready(result),
            Err(e) => ForecastState::Unavailable {
                reason: e.to_string(),
            },
        };

        let mut shown = self.shown.lock().await;
        if ticket < shown.0 {
            debug!(ticket, newest = shown.0, "Discarding stale forecast");
            return false;
        }
        *shown = (ticket, next);
        true
    }

    pub async fn current(&self) -> ForecastState {
        self.shown.lock().await.1.clone()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn body(code: Value) -> Value {
        json!({"day_of_cycle": 9, "cycle_phase": "Follicular", "predicted_mood_code": code})
    }

    #[test]
    fn mood_table() {
        let cases = [(0, "Restful", 25), (1, "Balanced", 60), (2, "Energetic", 90)];
        for (code, label, energy) in cases {
            let result = parse_prediction(&body(json!(code)), None).unwrap();
            assert_eq!(result.mood.label, label);
            assert_eq!(result.mood.energy_percent, energy);
            assert_eq!(result.mood_code as i64, code);
        }
    }

    #[test]
    fn unknown_code_is_an_error_not_a_default() {
        let err = parse_prediction(&body(json!(7)), None).unwrap_err();
        assert_eq!(err, PredictionError::UnrecognizedCode { code: "7".into() });

        let err = parse_prediction(&body(json!(-1)), None).unwrap_err();
        assert!(matches!(err, PredictionError::UnrecognizedCode { .. }));

        let err = parse_prediction(&body(json!(1.5)), None).unwrap_err();
        assert!(matches!(err, PredictionError::UnrecognizedCode { .. }));
    }

    #[test]
    fn legacy_field_name_and_labels_are_accepted() {
        let legacy = json!({"day_of_cycle": 3, "cycle_phase": "Menses", "predicted_mood": 2});
        let result = parse_prediction(&legacy, None).unwrap();
        assert_eq!(result.mood.label, "Energetic");
        assert_eq!(result.cycle_phase, CyclePhase::Menses);

        let labelled = json!({
            "day_of_cycle": 20,
            "cycle_phase": "Luteal",
            "predicted_mood": "medium",
            "next_period_in_days": 8,
            "confidence_score": 0.85
        });
        let result = parse_prediction(&labelled, None).unwrap();
        assert_eq!(result.mood.label, "Balanced");
        assert_eq!(result.next_period_in_days, Some(8));
        assert_eq!(result.confidence, Some(0.85));

        let err = parse_prediction(&body(json!("ecstatic")), None).unwrap_err();
        assert!(matches!(err, PredictionError::UnrecognizedCode { .. }));
    }

    #[test]
    fn current_mood_name_wins_over_legacy_one() {
        let both = json!({
            "day_of_cycle": 14,
            "cycle_phase": "Ovulation",
            "predicted_mood_code": 2,
            "predicted_mood": "low",
            "confidence_score": 0.9,
            "confidence": 0.1
        });
        let result = parse_prediction(&both, None).unwrap();
        assert_eq!(result.mood_code, 2);
        assert_eq!(result.mood.label, "Energetic");
        assert_eq!(result.confidence, Some(0.9));

        let neither = json!({"day_of_cycle": 14, "cycle_phase": "Ovulation"});
        assert!(matches!(
            parse_prediction(&neither, None),
            Err(PredictionError::Malformed { .. })
        ));
    }

    #[test]
    fn history_entries_need_a_date() {
        let date = history_date(&json!({"date": "2024-05-30"})).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 5, 30).unwrap());

        assert!(matches!(
            history_date(&json!({"day_of_cycle": 1})),
            Err(PredictionError::Malformed { .. })
        ));
        assert!(matches!(
            history_date(&json!({"date": "30/05/2024"})),
            Err(PredictionError::Malformed { .. })
        ));
    }

    #[test]
    fn phases_parse_loosely() {
        assert_eq!("Next Cycle".parse::<CyclePhase>().unwrap(), CyclePhase::NextCycle);
        assert_eq!("next_cycle".parse::<CyclePhase>().unwrap(), CyclePhase::NextCycle);
        assert_eq!(" luteal ".parse::<CyclePhase>().unwrap(), CyclePhase::Luteal);
        assert!(matches!(
            "Winter".parse::<CyclePhase>(),
            Err(PredictionError::UnrecognizedPhase { .. })
        ));
    }

    #[test]
    fn day_of_cycle_must_be_positive() {
        let bad = json!({"day_of_cycle": 0, "cycle_phase": "Menses", "predicted_mood_code": 0});
        assert!(matches!(
            parse_prediction(&bad, None),
            Err(PredictionError::Malformed { .. })
        ));
    }

    #[test]
    fn missing_fields_are_malformed() {
        let bad = json!({"cycle_phase": "Menses"});
        assert!(matches!(
            parse_prediction(&bad, None),
            Err(PredictionError::Malformed { .. })
        ));
    }

    #[test]
    fn target_date_is_carried() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let result = parse_prediction(&body(json!(1)), Some(date)).unwrap();
        assert_eq!(result.target_date, Some(date));
    }
}
