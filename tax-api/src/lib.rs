//! HTTP front end for the taxpayer registry and assessment calculator.

pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod startup;

pub use startup::{AppState, build_registry, build_router, build_state};
