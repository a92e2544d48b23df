//! Entity models and DTOs.

pub mod activity;
pub mod endpoint;
pub mod repository;
