//! Endpoint handlers grouped by concern.

pub mod admin;
pub mod system;
