//! Property types of complex types
//!
//! A property is a typed slot of a complex value. Its value type is either an
//! element type (the slot holds zero or one value) or a list type (the slot
//! holds a list of elements).
//!
//! ## Dynamic Attributes
//!
//! `is_required`, `count_min`, `count_max`, `is_read_only` and `is_applicable`
//! may be constants or functions of the owning complex value. A subtype that
//! overrides an inherited property adds its evaluators to the inherited ones,
//! and the results are combined monotonically:
//!
//! | attribute | default | combination |
//! |-----------|---------|-------------|
//! | `is_required` | `false` | OR |
//! | `count_min` | `0` | max |
//! | `count_max` | unbounded | min |
//! | `is_read_only` | `false` | OR |
//! | `is_applicable` | `true` | AND |

use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use super::Type;
use crate::value::Complex;

/// Function of the owning complex value
pub type OwnerFn<T> = Arc<dyn Fn(&Complex) -> T + Send + Sync>;

/// One evaluator of a dynamic attribute
#[derive(Clone)]
pub enum Evaluator<T> {
    /// Constant value
    Const(T),
    /// Value computed from the owner
    Dynamic(OwnerFn<T>),
}

impl<T: Copy> Evaluator<T> {
    fn evaluate(&self, owner: &Complex) -> T {
        match self {
            Evaluator::Const(v) => *v,
            Evaluator::Dynamic(f) => f(owner),
        }
    }
}

/// An attribute combining the evaluators of a property and its overrides
#[derive(Clone)]
pub struct DynamicAttribute<T: Copy> {
    default: T,
    combine: fn(T, T) -> T,
    evaluators: Vec<Evaluator<T>>,
}

impl<T: Copy> DynamicAttribute<T> {
    fn new(default: T, combine: fn(T, T) -> T) -> Self {
        Self {
            default,
            combine,
            evaluators: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, evaluator: Evaluator<T>) {
        self.evaluators.push(evaluator);
    }

    /// Evaluate for a given owner
    pub fn evaluate(&self, owner: &Complex) -> T {
        self.evaluators
            .iter()
            .fold(self.default, |acc, e| (self.combine)(acc, e.evaluate(owner)))
    }

    /// The combined value, if every evaluator is a constant
    pub fn constant(&self) -> Option<T> {
        let mut acc = self.default;
        for e in &self.evaluators {
            match e {
                Evaluator::Const(v) => acc = (self.combine)(acc, *v),
                Evaluator::Dynamic(_) => return None,
            }
        }
        Some(acc)
    }

    /// Whether no evaluator was ever specified
    pub fn is_default(&self) -> bool {
        self.evaluators.is_empty()
    }
}

/// Unbounded maximum element count
pub const UNBOUNDED: usize = usize::MAX;

/// Normalized range of element counts accepted by a property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountRange {
    /// Minimum number of elements
    pub min: usize,
    /// Maximum number of elements ([`UNBOUNDED`] when there is no limit)
    pub max: usize,
}

impl CountRange {
    /// Whether a count lies within the range
    pub fn contains(&self, count: usize) -> bool {
        count >= self.min && count <= self.max
    }

    /// Whether the maximum is unbounded
    pub fn is_unbounded(&self) -> bool {
        self.max == UNBOUNDED
    }
}

/// Property of a complex type
#[derive(Clone)]
pub struct PropertyType {
    pub(crate) name: String,
    pub(crate) label: Option<String>,
    pub(crate) value_type: Type,
    pub(crate) default_value: Option<Json>,
    pub(crate) is_required: DynamicAttribute<bool>,
    pub(crate) count_min: DynamicAttribute<usize>,
    pub(crate) count_max: DynamicAttribute<usize>,
    pub(crate) is_read_only: DynamicAttribute<bool>,
    pub(crate) is_applicable: DynamicAttribute<bool>,
    pub(crate) index: usize,
}

impl PropertyType {
    /// Start building a property, or an override of an inherited one
    pub fn builder(name: impl Into<String>) -> PropertyBuilder {
        PropertyBuilder::new(name)
    }

    pub(crate) fn new(name: String, value_type: Type) -> Self {
        Self {
            name,
            label: None,
            value_type,
            default_value: None,
            is_required: DynamicAttribute::new(false, |a, b| a || b),
            count_min: DynamicAttribute::new(0, std::cmp::max),
            count_max: DynamicAttribute::new(UNBOUNDED, std::cmp::min),
            is_read_only: DynamicAttribute::new(false, |a, b| a || b),
            is_applicable: DynamicAttribute::new(true, |a, b| a && b),
            index: 0,
        }
    }

    /// Name of the property
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label of the property, defaulting to its name
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Declared value type
    pub fn value_type(&self) -> &Type {
        &self.value_type
    }

    /// Position of the property within its complex type
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the property holds a list
    pub fn is_list(&self) -> bool {
        self.value_type.is_list()
    }

    /// Type of the elements held by the property
    pub fn element_type(&self) -> Type {
        self.value_type
            .element_type()
            .cloned()
            .unwrap_or_else(|| self.value_type.clone())
    }

    /// Default value specification
    pub fn default_value(&self) -> Option<&Json> {
        self.default_value.as_ref()
    }

    /// Whether a value is required for the given owner
    pub fn is_required(&self, owner: &Complex) -> bool {
        self.is_required.evaluate(owner)
    }

    /// Declared minimum count for the given owner
    pub fn count_min(&self, owner: &Complex) -> usize {
        self.count_min.evaluate(owner)
    }

    /// Declared maximum count for the given owner
    pub fn count_max(&self, owner: &Complex) -> usize {
        self.count_max.evaluate(owner)
    }

    /// Whether the property is read-only for the given owner
    ///
    /// A property holding a read-only list type is always read-only.
    pub fn is_read_only(&self, owner: &Complex) -> bool {
        (self.is_list() && self.value_type.is_read_only()) || self.is_read_only.evaluate(owner)
    }

    /// Whether the property applies to the given owner
    pub fn is_applicable(&self, owner: &Complex) -> bool {
        self.is_applicable.evaluate(owner)
    }

    /// The effective count range for the given owner
    ///
    /// Element properties never accept more than one value; a required
    /// property accepts no fewer than one; the maximum is never below the
    /// minimum.
    pub fn count_range(&self, owner: &Complex) -> CountRange {
        let mut min = self.count_min(owner);
        let mut max = self.count_max(owner);
        if !self.is_list() {
            min = min.min(1);
            max = max.min(1);
        }
        if self.is_required(owner) && min < 1 {
            min = 1;
        }
        if max < min {
            max = min;
        }
        CountRange { min, max }
    }

    /// Raw attributes, for serialization and inspection
    pub fn attributes(&self) -> PropertyAttributes<'_> {
        PropertyAttributes { property: self }
    }
}

impl fmt::Debug for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyType")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .finish()
    }
}

/// Read access to the unevaluated attributes of a property
pub struct PropertyAttributes<'a> {
    property: &'a PropertyType,
}

impl<'a> PropertyAttributes<'a> {
    /// `is_required` attribute
    pub fn is_required(&self) -> &'a DynamicAttribute<bool> {
        &self.property.is_required
    }

    /// `count_min` attribute
    pub fn count_min(&self) -> &'a DynamicAttribute<usize> {
        &self.property.count_min
    }

    /// `count_max` attribute
    pub fn count_max(&self) -> &'a DynamicAttribute<usize> {
        &self.property.count_max
    }

    /// `is_read_only` attribute
    pub fn is_read_only(&self) -> &'a DynamicAttribute<bool> {
        &self.property.is_read_only
    }

    /// `is_applicable` attribute
    pub fn is_applicable(&self) -> &'a DynamicAttribute<bool> {
        &self.property.is_applicable
    }
}

/// Builder of a property, or of an override of an inherited property
///
/// ```ignore
/// let prop = PropertyType::builder("fields")
///     .value_type(list_of_fields)
///     .required(true)
///     .count_max(2);
/// ```
#[derive(Clone)]
pub struct PropertyBuilder {
    pub(crate) name: String,
    pub(crate) label: Option<String>,
    pub(crate) value_type: Option<Type>,
    pub(crate) default_value: Option<Json>,
    pub(crate) is_required: Vec<Evaluator<bool>>,
    pub(crate) count_min: Vec<Evaluator<usize>>,
    pub(crate) count_max: Vec<Evaluator<usize>>,
    pub(crate) is_read_only: Vec<Evaluator<bool>>,
    pub(crate) is_applicable: Vec<Evaluator<bool>>,
}

impl PropertyBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            value_type: None,
            default_value: None,
            is_required: Vec::new(),
            count_min: Vec::new(),
            count_max: Vec::new(),
            is_read_only: Vec::new(),
            is_applicable: Vec::new(),
        }
    }

    /// Name of the property
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the value type
    pub fn value_type(mut self, value_type: Type) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Set the label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the default value specification
    pub fn default_value(mut self, spec: Json) -> Self {
        self.default_value = Some(spec);
        self
    }

    /// Constant `is_required`
    pub fn required(mut self, value: bool) -> Self {
        self.is_required.push(Evaluator::Const(value));
        self
    }

    /// Owner-dependent `is_required`
    pub fn required_when(mut self, f: impl Fn(&Complex) -> bool + Send + Sync + 'static) -> Self {
        self.is_required.push(Evaluator::Dynamic(Arc::new(f)));
        self
    }

    /// Constant `count_min`
    pub fn count_min(mut self, value: usize) -> Self {
        self.count_min.push(Evaluator::Const(value));
        self
    }

    /// Owner-dependent `count_min`
    pub fn count_min_when(mut self, f: impl Fn(&Complex) -> usize + Send + Sync + 'static) -> Self {
        self.count_min.push(Evaluator::Dynamic(Arc::new(f)));
        self
    }

    /// Constant `count_max`
    pub fn count_max(mut self, value: usize) -> Self {
        self.count_max.push(Evaluator::Const(value));
        self
    }

    /// Owner-dependent `count_max`
    pub fn count_max_when(mut self, f: impl Fn(&Complex) -> usize + Send + Sync + 'static) -> Self {
        self.count_max.push(Evaluator::Dynamic(Arc::new(f)));
        self
    }

    /// Constant `is_read_only`
    pub fn read_only(mut self, value: bool) -> Self {
        self.is_read_only.push(Evaluator::Const(value));
        self
    }

    /// Owner-dependent `is_read_only`
    pub fn read_only_when(mut self, f: impl Fn(&Complex) -> bool + Send + Sync + 'static) -> Self {
        self.is_read_only.push(Evaluator::Dynamic(Arc::new(f)));
        self
    }

    /// Constant `is_applicable`
    pub fn applicable(mut self, value: bool) -> Self {
        self.is_applicable.push(Evaluator::Const(value));
        self
    }

    /// Owner-dependent `is_applicable`
    pub fn applicable_when(mut self, f: impl Fn(&Complex) -> bool + Send + Sync + 'static) -> Self {
        self.is_applicable.push(Evaluator::Dynamic(Arc::new(f)));
        self
    }

    /// Apply this builder on top of an inherited property (or a fresh one)
    pub(crate) fn apply_to(self, mut prop: PropertyType) -> PropertyType {
        if let Some(label) = self.label {
            prop.label = Some(label);
        }
        if let Some(value_type) = self.value_type {
            prop.value_type = value_type;
        }
        if let Some(default_value) = self.default_value {
            prop.default_value = Some(default_value);
        }
        for e in self.is_required {
            prop.is_required.push(e);
        }
        for e in self.count_min {
            prop.count_min.push(e);
        }
        for e in self.count_max {
            prop.count_max.push(e);
        }
        for e in self.is_read_only {
            prop.is_read_only.push(e);
        }
        for e in self.is_applicable {
            prop.is_applicable.push(e);
        }
        prop
    }
}
