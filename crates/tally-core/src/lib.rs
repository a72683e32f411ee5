//! Core types and trait definitions for the Tally peer-evaluation service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The aggregation engine in [`aggregate`] is pure: it reduces facts that a
//! store has already fetched into the view models the API returns.

pub mod aggregate;
pub mod error;
pub mod evaluation;
pub mod item;
pub mod member;
pub mod store;

pub use error::{Error, Result};
