//! PlanHer client core: onboarding, profile submission and cycle forecasts.

pub mod api;
pub mod config;
pub mod error;
pub mod onboarding;
pub mod store;
