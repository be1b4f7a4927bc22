//! Prepaid electricity meter controller.
//!
//! A periodic control loop samples the load, bills the consumed energy
//! against a persisted credit ledger and switches the supply relay, while
//! operator commands arrive over a framed serial line or the HTTP API.

pub mod api;
pub mod auth;
pub mod command;
pub mod config;
pub mod controller;
pub mod domain;
pub mod hardware;
pub mod notify;
pub mod store;
pub mod telemetry;
