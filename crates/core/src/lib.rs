//! Core types for the type system
//!
//! This crate defines the foundational pieces used throughout the workspace:
//! - Error: error taxonomy (argument-required, argument-invalid, ...)
//! - Primitive: canonical representation of simple values
//! - wire: reserved keys of the JSON specification format

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod primitive;
pub mod wire;

pub use error::{Error, ErrorKind, Result};
pub use primitive::{Primitive, PrimitiveKind};
