//! Pentype - typed value model with transactional change tracking
//!
//! Pentype is an in-memory object model of typed values. Edits of complex and
//! list values are staged in changesets, grouped by ambient transactions and
//! applied atomically on commit. Types are resolved from JSON specifications,
//! anonymous types included, synchronously or by loading modules first.
//!
//! # Quick Start
//!
//! ```ignore
//! use pentype::{standard, Loader, Transaction};
//! use serde_json::json;
//!
//! let loader = Loader::global();
//! let people = loader.resolve_type_json(&json!({"props": ["name", "city"]}))?;
//! let ann = people.create(&json!({"name": "Ann"}))?;
//!
//! Transaction::run(|| ann.as_complex().unwrap().set("city", "Lisbon"))?;
//! ```
//!
//! # Architecture
//!
//! - [`pentype_core`]: error taxonomy, primitives and wire keys
//! - [`pentype_model`]: types, values, changesets, transactions and the loader
//! - [`pentype_instances`]: the instances container
//! - [`pentype_visual`]: data tables, visual roles and visual models

pub use pentype_core::wire;
pub use pentype_instances::{
    GetOptions, InstanceEntry, InstanceFilter, InstancesConfig, InstancesContainer,
};
pub use pentype_model::*;
pub use pentype_visual as visual;
