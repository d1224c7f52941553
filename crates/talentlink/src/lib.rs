//! Core library for the student placement platform: the allocation ledger
//! keeping project role capacity consistent with approved applications, and
//! the proctored assessment session engine.

pub mod auth;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
