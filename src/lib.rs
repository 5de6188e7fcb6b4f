//! Date-scoped cubicle reservations and utilization analytics.
//!
//! The [`engine::Engine`] owns the resource registry, the reservation ledger
//! and the grid date index, persists every change to a write-ahead log and
//! stores generated [`report::UtilizationReport`]s. [`aggregate`] holds the
//! pure aggregation algorithm those reports are built from.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod policy;
pub mod reaper;
pub mod report;
pub mod wal;
