//! Runtime layer for perfstat.
//!
//! Wraps the external converter and sampler processes and exposes the two
//! ingestion strategies: a one-shot counter-log parse and a background live
//! collector that publishes snapshots over a channel.

pub mod converter;
pub mod ingest;
pub mod sampler;
