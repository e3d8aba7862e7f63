//! Pet photo analysis lifecycle
//!
//! Creates analysis requests, dispatches them to an external classification
//! worker over a Redis queue, and reconciles the worker's results back into
//! the analysis records (updating the pet's breed when a breed
//! classification completes).

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
