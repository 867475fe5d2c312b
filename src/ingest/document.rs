//! Typed, non-panicking access to raw JSON report documents
//!
//! Vendor reports name the same field differently. Every lookup takes an
//! alias chain: the first key present in the object decides the outcome, and
//! a value of the wrong JSON type is reported as such instead of falling
//! through to the next alias.

use serde_json::{Map, Value};
use tracing::warn;

/// Outcome of a typed field lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<T> {
    Present(T),
    Absent,
    WrongType {
        key: &'static str,
        found: &'static str,
    },
}

impl<T> Extracted<T> {
    /// Continue into a nested value. Absent and wrong-type results pass through.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Extracted<U>) -> Extracted<U> {
        match self {
            Extracted::Present(value) => f(value),
            Extracted::Absent => Extracted::Absent,
            Extracted::WrongType { key, found } => Extracted::WrongType { key, found },
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Extracted<U> {
        self.and_then(|value| Extracted::Present(f(value)))
    }

    /// Try another source only when no alias was present at all
    pub fn or_if_absent(self, f: impl FnOnce() -> Extracted<T>) -> Extracted<T> {
        match self {
            Extracted::Absent => f(),
            other => other,
        }
    }

    pub fn present(self) -> Option<T> {
        match self {
            Extracted::Present(value) => Some(value),
            _ => None,
        }
    }
}

impl<T: Default> Extracted<T> {
    /// Collapse to the field's zero value, logging wrong-typed input
    pub fn or_zero(self) -> T {
        match self {
            Extracted::Present(value) => value,
            Extracted::Absent => T::default(),
            Extracted::WrongType { key, found } => {
                warn!(key = key, found = found, "Field has unexpected type, using default");
                T::default()
            }
        }
    }
}

/// Borrowed view over one JSON object
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    inner: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub fn new(inner: &'a Map<String, Value>) -> Self {
        Self { inner }
    }

    /// View a raw value as an object, if it is one
    pub fn from_value(value: &'a Value) -> Option<Self> {
        value.as_object().map(Self::new)
    }

    /// First alias present in the object, with its value
    pub fn lookup(&self, aliases: &[&'static str]) -> Option<(&'static str, &'a Value)> {
        aliases
            .iter()
            .find_map(|key| self.inner.get(*key).map(|value| (*key, value)))
    }

    /// Raw value of the first present alias, whatever its type
    pub fn raw(&self, aliases: &[&'static str]) -> Extracted<&'a Value> {
        match self.lookup(aliases) {
            Some((_, value)) => Extracted::Present(value),
            None => Extracted::Absent,
        }
    }

    pub fn string(&self, aliases: &[&'static str]) -> Extracted<String> {
        self.typed(aliases, |v| v.as_str().map(str::to_string))
    }

    /// Integer count. Integral floats such as `4.0` are accepted, fractions are not.
    pub fn count(&self, aliases: &[&'static str]) -> Extracted<i64> {
        self.typed(aliases, |v| {
            v.as_i64().or_else(|| {
                v.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
        })
    }

    pub fn float(&self, aliases: &[&'static str]) -> Extracted<f64> {
        self.typed(aliases, Value::as_f64)
    }

    pub fn boolean(&self, aliases: &[&'static str]) -> Extracted<bool> {
        self.typed(aliases, Value::as_bool)
    }

    pub fn object(&self, aliases: &[&'static str]) -> Extracted<Fields<'a>> {
        self.typed(aliases, Fields::from_value)
    }

    pub fn array(&self, aliases: &[&'static str]) -> Extracted<&'a Vec<Value>> {
        self.typed(aliases, Value::as_array)
    }

    fn typed<T>(
        &self,
        aliases: &[&'static str],
        convert: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Extracted<T> {
        match self.lookup(aliases) {
            Some((key, value)) => match convert(value) {
                Some(converted) => Extracted::Present(converted),
                None => Extracted::WrongType {
                    key,
                    found: type_name(value),
                },
            },
            None => Extracted::Absent,
        }
    }
}

/// JSON type name for log output
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
