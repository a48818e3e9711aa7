//! Error types for the PlanHer client.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level error type for the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Prediction error: {0}")]
    Prediction(#[from] PredictionError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Draft persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Why a step's input was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    MissingField,
    OutOfRange,
    NotNumeric,
    InvalidDate,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingField => "missing_field",
            Self::OutOfRange => "out_of_range",
            Self::NotNumeric => "not_numeric",
            Self::InvalidDate => "invalid_date",
        };
        write!(f, "{s}")
    }
}

/// A step-level validation failure. Never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationFailure {
    pub field: String,
    pub reason: ReasonCode,
}

impl ValidationFailure {
    pub fn new(field: impl Into<String>, reason: ReasonCode) -> Self {
        Self {
            field: field.into(),
            reason,
        }
    }
}

/// Failures while turning a draft into a `ProfileRecord`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    #[error("missing_required: {field}")]
    MissingRequired { field: String },

    #[error("invalid_date_range: {reason}")]
    InvalidDateRange { reason: String },

    #[error("invalid_value: {field}")]
    InvalidValue { field: String },
}

impl AssemblyError {
    /// Stable code for the error, as reported to callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRequired { .. } => "missing_required",
            Self::InvalidDateRange { .. } => "invalid_date_range",
            Self::InvalidValue { .. } => "invalid_value",
        }
    }
}

/// Low-level HTTP errors shared by the submission and prediction clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("Unauthorized on {endpoint}")]
    Unauthorized { endpoint: String },
}

/// Forecast retrieval failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredictionError {
    #[error("unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("unrecognized_code: {code}")]
    UnrecognizedCode { code: String },

    #[error("unrecognized_phase: {phase}")]
    UnrecognizedPhase { phase: String },

    #[error("malformed response: {reason}")]
    Malformed { reason: String },

    #[error("unauthorized")]
    Unauthorized,
}

/// Onboarding flow misuse (wrong step, terminal state).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OnboardingError {
    #[error("Cannot answer {attempted} while at {current}")]
    WrongStep { current: String, attempted: String },

    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Onboarding already complete")]
    AlreadyComplete,
}

/// Result type alias for the client.
pub type Result<T> = std::result::Result<T, Error>;
