//! # roomhub-domain
//!
//! Pure domain model for the roomhub environmental automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Workflows** (trigger → condition → action → delay graphs)
//! - Define **Conditions** (numeric comparisons over sensor values)
//! - Define **Sensor readings** and **Device state** as seen by the engine
//! - Define **Dimmer configs** and the sunrise/sunset curve math
//! - Define **Cron schedules** evaluated in an IANA timezone
//! - Define **Execution outcomes** reported after each run
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod condition;
pub mod cron;
pub mod device;
pub mod dimmer;
pub mod execution;
pub mod sensor;
pub mod workflow;
