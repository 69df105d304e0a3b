//! Instances container
//!
//! Registry of named singleton instances created by module factories.
//! Registrations come from code, from JSON specifications or from an
//! `instances.toml` file; instances are looked up by id or by type.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod container;

pub use config::{InstanceEntry, InstancesConfig, CONFIG_FILE_NAME};
pub use container::{GetOptions, InstanceFilter, InstancesContainer};
