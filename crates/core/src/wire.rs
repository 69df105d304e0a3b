//! Reserved keys of the JSON specification wire format
//!
//! Value specifications:
//!
//! ```text
//! 5                                   bare primitive
//! {"_": "number", "v": 5, "f": "5.0"} typed / formatted primitive
//! {"_": "my/type", "name": "a"}       complex with inline type
//! {"_": ["string"], "d": ["a", "b"]}  list with inline type
//! ```
//!
//! Generic type specifications:
//!
//! ```text
//! {"id": "_:1", "base": "complex", "props": [{"name": "a", "valueType": "string"}]}
//! ```

/// Inline type reference of a value specification
pub const TYPE: &str = "_";
/// Primitive value of a wrapped simple specification
pub const VALUE: &str = "v";
/// Formatted display string of a wrapped simple specification
pub const FORMATTED: &str = "f";
/// Elements of a typed list specification
pub const DATA: &str = "d";

/// Identifier of a type specification
pub const ID: &str = "id";
/// Base type of a type specification
pub const BASE: &str = "base";
/// Element type of a list type specification
pub const OF: &str = "of";
/// Property specifications of a complex type specification
pub const PROPS: &str = "props";
/// Mixin types of a type specification
pub const MIXINS: &str = "mixins";
/// Short alias of a type specification
pub const ALIAS: &str = "alias";
/// Display label
pub const LABEL: &str = "label";
/// Abstract flag of a type specification
pub const IS_ABSTRACT: &str = "isAbstract";
/// Read-only flag
pub const IS_READ_ONLY: &str = "isReadOnly";
/// Entity flag of a type specification
pub const IS_ENTITY: &str = "isEntity";

/// Name of a property specification
pub const NAME: &str = "name";
/// Value type of a property specification
pub const VALUE_TYPE: &str = "valueType";
/// Required flag of a property specification
pub const IS_REQUIRED: &str = "isRequired";
/// Minimum element count of a property specification
pub const COUNT_MIN: &str = "countMin";
/// Maximum element count of a property specification
pub const COUNT_MAX: &str = "countMax";
/// Applicability flag of a property specification
pub const IS_APPLICABLE: &str = "isApplicable";
/// Default value of a property specification
pub const DEFAULT_VALUE: &str = "defaultValue";

/// Prefix of temporary (anonymous) type identifiers
pub const ID_TEMPORARY_PREFIX: &str = "_:";
