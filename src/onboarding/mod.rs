//! Onboarding flow: a four-step questionnaire that collects cycle and body
//! data, validates each step, keeps the answers in a durable draft and
//! finally submits one assembled profile.

pub mod assembler;
pub mod manager;
pub mod model;
pub mod state;
pub mod validator;

pub use assembler::{assemble, inclusive_days};
pub use manager::{OnboardingManager, OnboardingStatus};
pub use model::{DraftAnswers, DraftValue, ProfileRecord, StepInput};
pub use state::{OnboardingState, OnboardingStep};
pub use validator::validate_step;
