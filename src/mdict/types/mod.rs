//! Foundational data structures and the error type.

pub mod error;
pub mod models;
