#![recursion_limit = "256"]
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod idempotency;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod services;
