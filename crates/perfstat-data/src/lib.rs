//! Ingestion layer for perfstat.
//!
//! Parses the two supported sources into [`perfstat_core::stat::Stat`]s:
//! converted counter-log CSV files ([`counter_log`]) and the live
//! `pidstat` feed ([`live`]).

pub mod counter_log;
pub mod lines;
pub mod live;
