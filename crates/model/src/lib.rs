//! Type system and value model
//!
//! This crate implements the runtime type system:
//! - types: type descriptors, property types and the standard type hierarchy
//! - value: simple, complex and list values
//! - changeset: pending changes of complex and list values
//! - transaction: ambient transactions with will-change / did-change phases
//! - spec: specification contexts (temporary ids of anonymous types)
//! - loader: module loading, type reference and instance resolution
//!
//! Ambient state (the current transaction and specification context) is
//! per thread.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod changeset;
pub mod loader;
pub mod spec;
pub mod transaction;
pub mod types;
pub mod value;

pub use changeset::{
    ChangeObserver, Changeset, ChangesetStatus, Comparer, ComplexChangeset, ListChange,
    ListChangeset, ListSetOptions, Replace,
};
pub use loader::{
    FactoryContext, FactoryFn, FactoryPart, Loader, Module, ModuleLoader, ModuleRegistry,
    TypeReference,
};
pub use spec::{SpecificationContext, SpecificationScope};
pub use transaction::{Transaction, TransactionScope, TransactionStatus};
pub use types::{
    normalize_id, standard, CountRange, PropertyBuilder, PropertyType, StandardTypes, Type,
    TypeBuilder, TypeFamily,
};
pub use value::{Complex, Fragment, InstanceInput, List, Simple, SpecOptions, Value};

// Re-export core types
pub use pentype_core::{Error, ErrorKind, Primitive, PrimitiveKind, Result};
