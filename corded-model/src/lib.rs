//! Corded Model - Core types shared by the Corded Discord library
#![deny(unsafe_code)]
//!
//! This crate provides the small set of value types both the HTTP and
//! Gateway crates depend on: [`Snowflake`] ids and the [`Intents`] bitmask.

pub mod intents;
pub mod snowflake;

pub use intents::Intents;
pub use snowflake::Snowflake;
