//! scalewatchd — the scalewatch daemon.
//!
//! Assembles the decision loop from `scalewatch.toml` and exposes it three
//! ways:
//! - `run`: scheduled cycles for every service plus the REST API
//! - `cycle`: one evaluation, reports on stdout
//! - `secrets`: operator access to the configured secret backend
//!
//! # Usage
//!
//! ```text
//! scalewatchd run --config /etc/scalewatch/scalewatch.toml --port 8440
//! scalewatchd cycle --config scalewatch.toml --service checkout
//! ```

pub mod cli;
pub mod commands;
pub mod wiring;

pub use wiring::{Components, build};
