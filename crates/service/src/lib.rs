//! Orchestration surface for Salyq.
//!
//! [`FilingService`] exposes the public operations of the filing
//! pipeline: ingest, parse, engine runs, declaration generation,
//! validation, workflow transitions, and XML projection. Each
//! operation composes the pure core with the repositories; suspension
//! points exist only at the database boundary.

pub mod filing;

pub use filing::{FilingService, ParseSummary};
