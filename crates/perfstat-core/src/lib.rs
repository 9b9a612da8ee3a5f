//! Core model for perfstat.
//!
//! Holds the per-process time-series [`stat::Stat`], the find-or-create
//! [`registry::StatRegistry`], the shared error type, timestamp parsing,
//! CLI settings and output rendering.

pub mod error;
pub mod formatting;
pub mod registry;
pub mod settings;
pub mod stat;
pub mod time_utils;
