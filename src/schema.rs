//! Schema derivation without reflection.
//!
//! Tools advertise their parameters and schema-constrained requests advertise
//! their expected result through a [`ParamDescriptor`], a small subset of JSON
//! Schema. Rather than inspecting types at runtime, callers describe the shape
//! of a value once as a [`Shape`] and [`derive`] folds it into a descriptor.
//!
//! ```rust
//! use chat_engine::schema::{derive, Field, Kind, Shape};
//!
//! let person = Shape::record([
//!     Field::required("name", Shape::String),
//!     Field::optional("age", Shape::Integer).describe("Age in years"),
//! ]);
//!
//! let descriptor = derive(&person);
//! assert_eq!(descriptor.kind, Kind::Object);
//! assert_eq!(descriptor.required, vec!["name".to_string()]);
//! ```
//!
//! Types that always have the same shape implement [`Described`], which is
//! what typed tools and [`SchemaDecoder`](crate::SchemaDecoder) rely on.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// The JSON type a descriptor stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

/// Structural descriptor of a value, serialized as JSON Schema.
///
/// `required` only ever names keys of `properties`. Object descriptors are
/// closed (`additionalProperties: false`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    #[serde(rename = "type")]
    pub kind: Kind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, ParamDescriptor>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParamDescriptor>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(
        rename = "additionalProperties",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<bool>,
}

impl ParamDescriptor {
    /// A descriptor of the given kind with nothing else set.
    pub fn of(kind: Kind) -> Self {
        Self {
            kind,
            description: None,
            properties: None,
            items: None,
            required: Vec::new(),
            additional_properties: None,
        }
    }

    /// An object descriptor with no properties.
    pub fn empty_object() -> Self {
        Self {
            properties: Some(BTreeMap::new()),
            additional_properties: Some(false),
            ..Self::of(Kind::Object)
        }
    }

    /// Render as a JSON value, ready to embed in a request.
    pub fn to_value(&self) -> Value {
        // Plain data with string keys, serialization cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Description of the shape of a value.
///
/// `Map` and `Any` have no fixed structure and degrade to an empty object.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    String,
    Integer,
    Number,
    Boolean,
    Array(Box<Shape>),
    Record(Vec<Field>),
    Map,
    Any,
}

impl Shape {
    /// Sequence of `element`.
    pub fn array(element: Shape) -> Self {
        Shape::Array(Box::new(element))
    }

    /// Record with the given fields, in declaration order.
    pub fn record(fields: impl IntoIterator<Item = Field>) -> Self {
        Shape::Record(fields.into_iter().collect())
    }
}

/// One named member of a [`Shape::Record`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub shape: Shape,
    /// Omitted when absent; unmarked fields are required.
    pub optional: bool,
    pub description: Option<String>,
}

impl Field {
    pub fn required(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            optional: false,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            optional: true,
            ..Self::required(name, shape)
        }
    }

    /// Attach a description that is copied onto the field's descriptor.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Derive the descriptor for `shape`.
///
/// Total and deterministic: every finite shape yields a descriptor.
pub fn derive(shape: &Shape) -> ParamDescriptor {
    match shape {
        Shape::String => ParamDescriptor::of(Kind::String),
        Shape::Integer => ParamDescriptor::of(Kind::Integer),
        Shape::Number => ParamDescriptor::of(Kind::Number),
        Shape::Boolean => ParamDescriptor::of(Kind::Boolean),
        Shape::Array(element) => ParamDescriptor {
            items: Some(Box::new(derive(element))),
            ..ParamDescriptor::of(Kind::Array)
        },
        Shape::Record(fields) => {
            let mut properties = BTreeMap::new();
            let mut required: Vec<String> = Vec::new();

            for field in fields {
                let mut child = derive(&field.shape);
                if field.description.is_some() {
                    child.description = field.description.clone();
                }
                properties.insert(field.name.clone(), child);

                if field.optional {
                    required.retain(|name| name != &field.name);
                } else if !required.contains(&field.name) {
                    required.push(field.name.clone());
                }
            }

            ParamDescriptor {
                properties: Some(properties),
                required,
                additional_properties: Some(false),
                ..ParamDescriptor::of(Kind::Object)
            }
        }
        Shape::Map | Shape::Any => ParamDescriptor::empty_object(),
    }
}

/// Types with a fixed, statically known shape.
///
/// ```rust
/// use chat_engine::schema::{Described, Field, Shape};
///
/// struct Weather {
///     city: String,
///     celsius: Option<f64>,
/// }
///
/// impl Described for Weather {
///     fn shape() -> Shape {
///         Shape::record([
///             Field::required("city", String::shape()),
///             Field::optional("celsius", f64::shape()),
///         ])
///     }
/// }
/// ```
pub trait Described {
    fn shape() -> Shape;

    /// Shorthand for `derive(&Self::shape())`.
    fn descriptor() -> ParamDescriptor {
        derive(&Self::shape())
    }
}

macro_rules! described_as {
    ($shape:expr => $($ty:ty),+ $(,)?) => {
        $(
            impl Described for $ty {
                fn shape() -> Shape {
                    $shape
                }
            }
        )+
    };
}

described_as!(Shape::String => String, str, char);
described_as!(Shape::Integer => i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
described_as!(Shape::Number => f32, f64);
described_as!(Shape::Boolean => bool);
described_as!(Shape::Any => Value);
described_as!(Shape::Map => serde_json::Map<String, Value>);

impl<T: Described> Described for Vec<T> {
    fn shape() -> Shape {
        Shape::array(T::shape())
    }
}

impl<T: Described> Described for [T] {
    fn shape() -> Shape {
        Shape::array(T::shape())
    }
}

impl<T: Described + ?Sized> Described for Box<T> {
    fn shape() -> Shape {
        T::shape()
    }
}

// Optionality is a property of the enclosing field, not of the value.
impl<T: Described> Described for Option<T> {
    fn shape() -> Shape {
        T::shape()
    }
}

impl<V, S> Described for HashMap<String, V, S> {
    fn shape() -> Shape {
        Shape::Map
    }
}

impl<V> Described for BTreeMap<String, V> {
    fn shape() -> Shape {
        Shape::Map
    }
}
