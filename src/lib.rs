//! birdeval - execution-accuracy evaluation for text-to-SQL predictions.
//!
//! This library exposes the core modules for use in integration tests.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod eval;
pub mod logging;
pub mod split;
