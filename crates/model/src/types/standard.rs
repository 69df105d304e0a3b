//! Standard types
//!
//! The built-in type tree, created once per process. Each standard type has a
//! permanent id `pentaho/type/<name>` and the short alias `<name>`.

use chrono::DateTime;
use once_cell::sync::Lazy;
use pentype_core::{Primitive, PrimitiveKind};

use super::{RootSpec, Type, TypeFamily};

/// Prefix of the permanent ids of standard types
pub const ID_PREFIX: &str = "pentaho/type/";

/// The standard type tree
pub struct StandardTypes {
    /// Root of every type
    pub instance: Type,
    /// Abstract base of values
    pub value: Type,
    /// Abstract base of list elements
    pub element: Type,
    /// Abstract base of primitive-wrapping types
    pub simple: Type,
    /// Text
    pub string: Type,
    /// IEEE-754 number
    pub number: Type,
    /// true / false
    pub boolean: Type,
    /// UTC date-time
    pub date: Type,
    /// Opaque plain object
    pub object: Type,
    /// Property-bearing values
    pub complex: Type,
    /// Ordered collections of elements
    pub list: Type,
}

static STANDARD: Lazy<StandardTypes> = Lazy::new(StandardTypes::create);

/// The standard types of this process
pub fn standard() -> &'static StandardTypes {
    &STANDARD
}

impl StandardTypes {
    fn create() -> Self {
        let root = |name, base: Option<&Type>, family, is_abstract, primitive| {
            Type::standard_type(RootSpec {
                name,
                base: base.cloned(),
                family,
                is_abstract,
                primitive,
                element_type: None,
            })
        };

        let instance = root("instance", None, TypeFamily::Instance, true, None);
        let value = root("value", Some(&instance), TypeFamily::Value, true, None);
        let element = root("element", Some(&value), TypeFamily::Element, true, None);
        let simple = root("simple", Some(&element), TypeFamily::Simple, true, None);
        let string = root("string", Some(&simple), TypeFamily::Simple, false, Some(PrimitiveKind::String));
        let number = root("number", Some(&simple), TypeFamily::Simple, false, Some(PrimitiveKind::Number));
        let boolean = root("boolean", Some(&simple), TypeFamily::Simple, false, Some(PrimitiveKind::Boolean));
        let date = root("date", Some(&simple), TypeFamily::Simple, false, Some(PrimitiveKind::Date));
        let object = root("object", Some(&simple), TypeFamily::Simple, false, Some(PrimitiveKind::Object));
        let complex = root("complex", Some(&element), TypeFamily::Complex, false, None);
        let list = Type::standard_type(RootSpec {
            name: "list",
            base: Some(value.clone()),
            family: TypeFamily::List,
            is_abstract: false,
            primitive: None,
            element_type: Some(element.clone()),
        });

        Self {
            instance,
            value,
            element,
            simple,
            string,
            number,
            boolean,
            date,
            object,
            complex,
            list,
        }
    }

    /// All standard types, root first
    pub fn all(&self) -> [&Type; 11] {
        [
            &self.instance,
            &self.value,
            &self.element,
            &self.simple,
            &self.string,
            &self.number,
            &self.boolean,
            &self.date,
            &self.object,
            &self.complex,
            &self.list,
        ]
    }

    /// Standard type by permanent id or alias
    pub fn get(&self, id: &str) -> Option<&Type> {
        let id = normalize_id(id);
        self.all().into_iter().find(|t| t.id() == Some(id.as_str()))
    }

    /// Whether the type is one of the inferable wrappers `string`, `number` or `boolean`
    pub(crate) fn is_inferable(&self, ty: &Type) -> bool {
        *ty == self.string || *ty == self.number || *ty == self.boolean
    }

    /// Default standard type of a bare primitive, by kind
    pub(crate) fn for_primitive(&self, value: &Primitive) -> Option<&Type> {
        match value.kind() {
            PrimitiveKind::String => Some(&self.string),
            PrimitiveKind::Number => Some(&self.number),
            PrimitiveKind::Boolean => Some(&self.boolean),
            PrimitiveKind::Date | PrimitiveKind::Object => None,
        }
    }
}

/// Expand the alias of a standard type into its permanent id
///
/// Other ids are returned unchanged.
pub fn normalize_id(id: &str) -> String {
    const ALIASES: [&str; 11] = [
        "instance", "value", "element", "simple", "string", "number", "boolean", "date",
        "object", "complex", "list",
    ];
    if ALIASES.contains(&id) {
        format!("{}{}", ID_PREFIX, id)
    } else {
        id.to_string()
    }
}

/// Default cast of a primitive kind
pub(crate) fn default_cast(kind: PrimitiveKind, value: &Primitive) -> Option<Primitive> {
    match (kind, value) {
        (PrimitiveKind::String, Primitive::Object(_)) => None,
        (PrimitiveKind::String, Primitive::String(_)) => Some(value.clone()),
        (PrimitiveKind::String, other) => Some(Primitive::String(other.to_string())),

        (PrimitiveKind::Number, Primitive::Number(_)) => Some(value.clone()),
        (PrimitiveKind::Number, Primitive::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok().map(Primitive::Number)
        }
        (PrimitiveKind::Number, Primitive::Boolean(b)) => {
            Some(Primitive::Number(if *b { 1.0 } else { 0.0 }))
        }
        (PrimitiveKind::Number, Primitive::Date(d)) => {
            Some(Primitive::Number(d.timestamp_millis() as f64))
        }

        (PrimitiveKind::Boolean, Primitive::Boolean(_)) => Some(value.clone()),
        (PrimitiveKind::Boolean, Primitive::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" => Some(Primitive::Boolean(true)),
            "false" => Some(Primitive::Boolean(false)),
            _ => None,
        },
        (PrimitiveKind::Boolean, Primitive::Number(n)) => {
            Some(Primitive::Boolean(*n != 0.0 && !n.is_nan()))
        }

        (PrimitiveKind::Date, Primitive::Date(_)) => Some(value.clone()),
        (PrimitiveKind::Date, Primitive::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|d| Primitive::Date(d.into())),
        (PrimitiveKind::Date, Primitive::Number(n)) if n.is_finite() => {
            Primitive::date_from_millis(*n as i64)
        }

        (PrimitiveKind::Object, Primitive::Object(_)) => Some(value.clone()),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve_to_permanent_ids() {
        assert_eq!(normalize_id("number"), "pentaho/type/number");
        assert_eq!(normalize_id("my/type"), "my/type");
        let std = standard();
        assert_eq!(std.get("list"), Some(&std.list));
        assert_eq!(std.get("pentaho/type/boolean"), Some(&std.boolean));
        assert!(std.get("pentaho/type/unknown").is_none());
    }

    #[test]
    fn test_abstract_roots() {
        let std = standard();
        assert!(std.instance.is_abstract());
        assert!(std.value.is_abstract());
        assert!(std.element.is_abstract());
        assert!(std.simple.is_abstract());
        assert!(!std.string.is_abstract());
        assert!(!std.complex.is_abstract());
        assert!(!std.list.is_abstract());
        assert_eq!(std.list.element_type(), Some(&std.element));
    }

    #[test]
    fn test_short_id_is_alias() {
        assert_eq!(standard().date.short_id(), Some("date"));
        assert_eq!(standard().date.id(), Some("pentaho/type/date"));
    }

    #[test]
    fn test_default_number_cast() {
        let cast = |p: Primitive| default_cast(PrimitiveKind::Number, &p);
        assert_eq!(cast("12.5".into()), Some(Primitive::from(12.5)));
        assert_eq!(cast(" 3 ".into()), Some(Primitive::from(3)));
        assert_eq!(cast("".into()), None);
        assert_eq!(cast("abc".into()), None);
        assert_eq!(cast(true.into()), Some(Primitive::from(1)));
    }

    #[test]
    fn test_default_boolean_cast() {
        let cast = |p: Primitive| default_cast(PrimitiveKind::Boolean, &p);
        assert_eq!(cast("TRUE".into()), Some(Primitive::from(true)));
        assert_eq!(cast("no".into()), None);
        assert_eq!(cast(0.into()), Some(Primitive::from(false)));
    }

    #[test]
    fn test_default_date_cast() {
        let cast = |p: Primitive| default_cast(PrimitiveKind::Date, &p);
        assert_eq!(
            cast("1970-01-01T00:00:01Z".into()),
            Primitive::date_from_millis(1_000)
        );
        assert_eq!(cast(2_000.into()), Primitive::date_from_millis(2_000));
        assert_eq!(cast("yesterday".into()), None);
    }

    #[test]
    fn test_default_string_cast_rejects_objects() {
        assert_eq!(
            default_cast(PrimitiveKind::String, &Primitive::from(5)),
            Some(Primitive::from("5"))
        );
        let obj = Primitive::Object(Default::default());
        assert_eq!(default_cast(PrimitiveKind::String, &obj), None);
        assert_eq!(default_cast(PrimitiveKind::Object, &obj), Some(obj.clone()));
    }
}
