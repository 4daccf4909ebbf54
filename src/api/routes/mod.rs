//! API route handlers

pub mod endpoints;
pub mod health;
pub mod metrics;
pub mod probe;
