//! Core domain types and logic.

pub mod calendar;
pub mod config_validation;
pub mod error;
pub mod frequency;
pub mod lot;
pub mod metrics;
pub mod price;
pub mod simulation;
pub mod strategy;
pub mod sweep;
pub mod transaction;
