//! Backend REST API access.

pub mod api;
pub mod types;
