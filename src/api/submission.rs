//! Submission client: sends the assembled profile and decides whether the
//! backend really created it.
//!
//! Success needs a positive signal in the body: a `{"status": "success"}`
//! envelope, or an echoed entity carrying an `id`. A bare 2xx is not enough.
//! Only a confirmed success clears the draft; every other outcome leaves it
//! exactly as it was so the user can correct a step and resubmit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::onboarding::model::ProfileRecord;
use crate::store::DraftStore;

use super::ApiClient;

/// What happened to a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The backend confirmed creation; the draft has been cleared.
    Submitted { entity_id: Option<String> },
    /// The backend refused the profile (validation). Draft kept.
    Rejected { reason: String },
    /// No usable answer from the backend. Draft kept; retry is up to the caller.
    TransportFailure { reason: String },
    /// Credentials were refused. Draft kept; the session layer was notified.
    Unauthorized,
    /// Another submission is still pending; nothing was sent.
    AlreadyInFlight,
}

impl SubmissionOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }
}

/// Sends profiles to the backend, one at a time.
pub struct SubmissionClient {
    api: Arc<ApiClient>,
    draft: Arc<DraftStore>,
    path: String,
    in_flight: AtomicBool,
}

impl SubmissionClient {
    pub fn new(api: Arc<ApiClient>, draft: Arc<DraftStore>, path: impl Into<String>) -> Self {
        Self {
            api,
            draft,
            path: path.into(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a submission is currently pending.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// POST `profile` to the profile-creation endpoint.
    ///
    /// Never retries. A call made while another is pending returns
    /// `AlreadyInFlight` without touching the network.
    pub async fn submit(&self, profile: &ProfileRecord) -> SubmissionOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            warn!(endpoint = %self.path, "Submission already in flight, ignoring");
            return SubmissionOutcome::AlreadyInFlight;
        };

        let request_id = Uuid::new_v4();
        info!(endpoint = %self.path, %request_id, "Submitting profile");

        let request = self
            .api
            .post(&self.path)
            .header("X-Request-Id", request_id.to_string())
            .json(profile);

        let response = match self.api.send(request, &self.path).await {
            Ok(response) => response,
            Err(ApiError::Unauthorized { .. }) => return SubmissionOutcome::Unauthorized,
            Err(e) => {
                warn!(%request_id, error = %e, "Profile submission transport failure");
                return SubmissionOutcome::TransportFailure {
                    reason: e.to_string(),
                };
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(text) => serde_json::from_str::<Value>(&text).ok(),
            Err(e) => {
                warn!(%request_id, error = %e, "Failed to read submission response");
                return SubmissionOutcome::TransportFailure {
                    reason: format!("failed to read response: {e}"),
                };
            }
        };

        let outcome = interpret_response(status, body.as_ref());
        match &outcome {
            SubmissionOutcome::Submitted { entity_id } => {
                info!(%request_id, entity_id = ?entity_id, "Profile created");
                // The entity exists server-side, so the outcome stands even if
                // the local clear fails.
                if let Err(e) = self.draft.clear().await {
                    error!(%request_id, error = %e, "Failed to clear draft after submission");
                }
            }
            SubmissionOutcome::Rejected { reason } => {
                warn!(%request_id, %status, %reason, "Profile rejected by backend");
            }
            SubmissionOutcome::TransportFailure { reason } => {
                warn!(%request_id, %status, %reason, "Profile submission failed");
            }
            SubmissionOutcome::Unauthorized | SubmissionOutcome::AlreadyInFlight => {}
        }
        outcome
    }
}

/// Decide the outcome of a profile POST from its status and parsed body.
pub fn interpret_response(status: StatusCode, body: Option<&Value>) -> SubmissionOutcome {
    if status.is_server_error() {
        return SubmissionOutcome::TransportFailure {
            reason: format!("server error {status}"),
        };
    }

    if status.is_client_error() {
        let reason = body
            .and_then(error_message)
            .unwrap_or_else(|| format!("request refused with {status}"));
        return SubmissionOutcome::Rejected { reason };
    }

    if !status.is_success() {
        return SubmissionOutcome::TransportFailure {
            reason: format!("unexpected status {status}"),
        };
    }

    let Some(body) = body else {
        return SubmissionOutcome::Rejected {
            reason: "response body was not JSON".to_string(),
        };
    };

    match body.get("status").and_then(Value::as_str) {
        Some(s) if s.eq_ignore_ascii_case("success") => {
            return SubmissionOutcome::Submitted {
                entity_id: entity_id(body),
            };
        }
        Some(s) if s.eq_ignore_ascii_case("error") => {
            return SubmissionOutcome::Rejected {
                reason: error_message(body).unwrap_or_else(|| "backend reported an error".into()),
            };
        }
        _ => {}
    }

    match entity_id(body) {
        Some(id) => SubmissionOutcome::Submitted {
            entity_id: Some(id),
        },
        None => SubmissionOutcome::Rejected {
            reason: "response carried no success signal".to_string(),
        },
    }
}

fn entity_id(body: &Value) -> Option<String> {
    ["id", "profile_id"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find_map(|v| match v {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
}

/// Pull a readable message out of an error body.
///
/// Handles `{"detail": "..."}`, FastAPI's `{"detail": [{"loc": [..], "msg": ".."}]}`,
/// and `message` / `error` strings.
fn error_message(body: &Value) -> Option<String> {
    if let Some(detail) = body.get("detail") {
        match detail {
            Value::String(s) => return Some(s.clone()),
            Value::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|item| {
                        let msg = item.get("msg").and_then(Value::as_str)?;
                        let field = item
                            .get("loc")
                            .and_then(Value::as_array)
                            .and_then(|loc| loc.last())
                            .and_then(Value::as_str);
                        Some(match field {
                            Some(field) => format!("{field}: {msg}"),
                            None => msg.to_string(),
                        })
                    })
                    .collect();
                if !parts.is_empty() {
                    return Some(parts.join("; "));
                }
            }
            _ => {}
        }
    }

    ["message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(String::from)
}

/// Holds the single-submission slot until dropped.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
