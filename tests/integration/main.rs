//! Integration Tests
//!
//! Cross-crate tests through the facade:
//! - scenarios: temporary ids, list changesets and instance loading
//! - workflow: a configured visual model built from container instances

mod scenarios;
mod workflow;
