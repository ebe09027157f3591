//! Core routing and request pipeline

pub mod client;
pub mod providers;
pub mod rate_limiter;
pub mod registry;
pub mod router;
pub mod types;
