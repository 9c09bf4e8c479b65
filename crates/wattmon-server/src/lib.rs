//! HTTP service tying the pieces together: REST API over the store, the
//! evaluation scheduler, rule building from stored config, and request
//! logging with trace IDs.

pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod rule_builder;
pub mod rule_seed;
pub mod scheduler;
pub mod state;
