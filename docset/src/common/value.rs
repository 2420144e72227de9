use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use itertools::Itertools;
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;

/// Ordered field map backing [Value::Object]. Field iteration order is
/// insertion order, which is contractual for documents.
pub type Object = IndexMap<String, Value>;

/// Compare two floats for equality with NaN-equals-NaN and signed zeroes
/// kept distinct.
#[inline]
fn num_eq_float(a: f64, b: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        return true;
    }
    if a == 0.0 && b == 0.0 {
        return a.is_sign_positive() == b.is_sign_positive();
    }
    a == b
}

/// Compare an integer with a float. Negative zero only equals negative zero.
#[inline]
fn num_eq_mixed(i: i64, f: f64) -> bool {
    if f.is_nan() {
        return false;
    }
    if f == 0.0 && f.is_sign_negative() {
        return false;
    }
    (i as f64) == f
}

/// Compare two floats with a total order. NaN sorts above every other value.
#[inline]
fn num_cmp_float(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

/// A document value: the closed tagged variant every comparison, selection,
/// and update path dispatches on.
///
/// # Variants
/// - `Null`: absence of a value inside a document
/// - `Bool(bool)`: boolean
/// - `Int(i64)` / `Float(f64)`: numbers; the two compare and hash as one
///   numeric type
/// - `String(String)`: text
/// - `DateTime`: a UTC instant, compared by epoch millisecond
/// - `Regex(String)`: a regular expression kept by its source form
/// - `Array(Vec<Value>)`: ordered sequence
/// - `Object`: keyed mapping with contractual insertion order
///
/// # Usage
/// Create values using the `From` impls or the [`val!`](crate::val) and
/// [`doc!`](crate::doc) macros:
/// ```text
/// let v1: Value = 42.into();
/// let v2 = Value::from("hello");
/// let d = doc! { name: "Alice", age: 30 };
/// ```
#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum Value {
    /// Represents a null value.
    #[default]
    Null,
    /// Represents a boolean value.
    Bool(bool),
    /// Represents an integer value.
    Int(i64),
    /// Represents a floating point value.
    Float(f64),
    /// Represents a string value.
    String(String),
    /// Represents a UTC date-time value.
    DateTime(DateTime<Utc>),
    /// Represents a regular expression by its source text.
    Regex(String),
    /// Represents an array value.
    Array(Vec<Value>),
    /// Represents a keyed mapping value.
    Object(Object),
}

/// The type tag of a [Value], computed once via [Value::kind] and switched
/// on wherever behavior is type-directed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    Date,
    Regex,
    Array,
    Object,
}

impl ValueKind {
    /// Stable lowercase name, also used for lexical type-name tiebreaks in
    /// sort comparisons.
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Date => "date",
            ValueKind::Regex => "regexp",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => num_eq_float(*a, *b),
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                num_eq_mixed(*a, *b)
            }
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => {
                a.timestamp_millis() == b.timestamp_millis()
            }
            (Value::Regex(a), Value::Regex(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|bv| v == bv))
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => num_cmp_float(*a, *b),
            (Value::Int(a), Value::Float(b)) => num_cmp_float(*a as f64, *b),
            (Value::Float(a), Value::Int(b)) => num_cmp_float(*a, *b as f64),
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => {
                a.timestamp_millis().cmp(&b.timestamp_millis())
            }
            (Value::Regex(a), Value::Regex(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ordering = x.cmp(y);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Object(a), Value::Object(b)) => {
                let mut a_keys: Vec<&String> = a.keys().collect();
                let mut b_keys: Vec<&String> = b.keys().collect();
                a_keys.sort();
                b_keys.sort();
                let ordering = a_keys.cmp(&b_keys);
                if ordering != Ordering::Equal {
                    return ordering;
                }
                for key in a_keys {
                    let ordering = a[key].cmp(&b[key]);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            }
            // fall back to the lexical order of the type names
            _ => self.kind().name().cmp(other.kind().name()),
        }
    }
}

impl Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind().name().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Float(v) => {
                // Int and Float must hash alike when they compare equal.
                if v.is_nan() {
                    f64::NAN.to_bits().hash(state);
                } else if *v == 0.0 && v.is_sign_negative() {
                    v.to_bits().hash(state);
                } else if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v <= i64::MAX as f64 {
                    (*v as i64).hash(state);
                } else {
                    v.to_bits().hash(state);
                }
            }
            Value::String(v) => v.hash(state),
            Value::DateTime(v) => v.timestamp_millis().hash(state),
            Value::Regex(v) => v.hash(state),
            Value::Array(v) => v.hash(state),
            Value::Object(v) => {
                // Key-set equality is order independent, so hash sorted.
                let mut keys: Vec<&String> = v.keys().collect();
                keys.sort();
                for key in keys {
                    key.hash(state);
                    v[key].hash(state);
                }
            }
        }
    }
}

impl Value {
    /// Returns the type tag of this value.
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Int(_) | Value::Float(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::DateTime(_) => ValueKind::Date,
            Value::Regex(_) => ValueKind::Regex,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Returns the boolean value if the [Value] is [Value::Bool].
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer value if the [Value] is [Value::Int].
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float value if the [Value] is [Value::Float].
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the numeric value of either number variant.
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string slice if the [Value] is [Value::String].
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the date value if the [Value] is [Value::DateTime].
    #[inline]
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::DateTime(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the regex source if the [Value] is [Value::Regex].
    #[inline]
    pub fn as_regex(&self) -> Option<&str> {
        match self {
            Value::Regex(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the array value if the [Value] is [Value::Array].
    #[inline]
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the mutable array value if the [Value] is [Value::Array].
    #[inline]
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the object value if the [Value] is [Value::Object].
    #[inline]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the mutable object value if the [Value] is [Value::Object].
    #[inline]
    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Checks if the [Value] is [Value::Null].
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Checks if the [Value] is [Value::Bool].
    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Checks if the [Value] is a number.
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Checks if the [Value] is [Value::String].
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Checks if the [Value] is [Value::DateTime].
    #[inline]
    pub fn is_date(&self) -> bool {
        matches!(self, Value::DateTime(_))
    }

    /// Checks if the [Value] is [Value::Regex].
    #[inline]
    pub fn is_regex(&self) -> bool {
        matches!(self, Value::Regex(_))
    }

    /// Checks if the [Value] is [Value::Array].
    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Checks if the [Value] is [Value::Object].
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// JavaScript-style truthiness, used by `$exists` operands.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(v) => *v,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0 && !v.is_nan(),
            Value::String(v) => !v.is_empty(),
            _ => true,
        }
    }

    /// Takes the value, replacing it with [Value::Null].
    pub fn take(&mut self) -> Value {
        std::mem::replace(self, Value::Null)
    }

    /// Canonical scalar rendering used to join compound index key parts.
    pub fn to_key_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::String(v) => v.clone(),
            Value::DateTime(v) => v.to_rfc3339(),
            Value::Regex(v) => v.clone(),
            Value::Array(v) => v.iter().map(|e| e.to_key_string()).join(","),
            Value::Object(_) => self.to_string(),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "\"{}\"", v),
            Value::DateTime(v) => write!(f, "\"{}\"", v.to_rfc3339()),
            Value::Regex(v) => write!(f, "/{}/", v),
            Value::Array(v) => {
                write!(f, "[{}]", v.iter().map(|e| e.to_string()).join(", "))
            }
            Value::Object(v) => {
                write!(
                    f,
                    "{{{}}}",
                    v.iter().map(|(k, e)| format!("\"{}\": {}", k, e)).join(", ")
                )
            }
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind(), self)
    }
}

impl From<bool> for Value {
    #[inline]
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i8> for Value {
    #[inline]
    fn from(value: i8) -> Self {
        Value::Int(value as i64)
    }
}

impl From<i16> for Value {
    #[inline]
    fn from(value: i16) -> Self {
        Value::Int(value as i64)
    }
}

impl From<i32> for Value {
    #[inline]
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<i64> for Value {
    #[inline]
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u8> for Value {
    #[inline]
    fn from(value: u8) -> Self {
        Value::Int(value as i64)
    }
}

impl From<u16> for Value {
    #[inline]
    fn from(value: u16) -> Self {
        Value::Int(value as i64)
    }
}

impl From<u32> for Value {
    #[inline]
    fn from(value: u32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<usize> for Value {
    #[inline]
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f32> for Value {
    #[inline]
    fn from(value: f32) -> Self {
        Value::Float(value as f64)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl<T> From<Vec<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(|v| v.into()).collect())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

/// A macro to create a [Value] from a given expression.
///
/// ```rust
/// use docset::common::Value;
/// use docset::val;
///
/// assert_eq!(val!(42), Value::Int(42));
/// assert_eq!(val!("hello"), Value::String("hello".to_string()));
/// ```
#[macro_export]
macro_rules! val {
    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}

/// A macro to create an object [Value] from key/value pairs.
///
/// Nested braces become nested objects, brackets become arrays:
///
/// ```rust
/// use docset::doc;
///
/// let d = doc! {
///     name: "Alice",
///     address: { city: "New York", zip: 10001 },
///     tags: ["admin", "user"]
/// };
/// assert_eq!(d.as_object().unwrap().len(), 3);
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::common::Value::Object($crate::common::Object::new())
    };

    ($($key:tt : $value:tt),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut fields = $crate::common::Object::new();
        $(
            fields.insert(
                stringify!($key).trim_matches('"').to_string(),
                $crate::doc_value!($value),
            );
        )*
        $crate::common::Value::Object(fields)
    }};
}

/// Helper macro converting values for the [doc!](crate::doc) macro.
#[macro_export]
macro_rules! doc_value {
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::doc!($($key : $value),*)
    };

    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}
