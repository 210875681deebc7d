//! Shared test infrastructure.

pub mod factories;
