//! Visual role mapping
//!
//! Declarative constraints layered on top of complex values:
//! - table: the read-only data table contract and an in-memory table
//! - mode: data type and continuity of a way of mapping fields
//! - role: visual roles with modes, field count ranges and visual key
//! - mapping: the mapping and mapping-field types
//! - model: visual model types and validation against a data table

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod mapping;
pub mod mode;
pub mod model;
pub mod role;
pub mod table;

pub use mapping::{mapping_types, normalize_mapping_spec, Mapping, MappingTypes};
pub use mode::Mode;
pub use model::{VisualModel, VisualModelType, VisualModelTypeBuilder};
pub use role::{VisualRole, VisualRoleBuilder};
pub use table::{Column, ColumnType, DataTable, MemoryTable};
