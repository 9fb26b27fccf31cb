//! Ad-hoc conversion of function values to requested Rust types.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{any::TypeId, collections::HashMap, fmt, sync::Arc};

use crate::{error::PlexusError, Result};

type ConvertFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Converts the JSON values flowing through functions into concrete types.
///
/// Conversion first tries plain deserialization. When that fails, the
/// converters registered for the target type are tried in registration
/// order; each may reshape the value into something that deserializes.
/// A converter to `String` is always present, so any output can be
/// requested as a string.
#[derive(Clone)]
pub struct TypeConverter {
    converters: HashMap<TypeId, Vec<ConvertFn>>,
}

impl fmt::Debug for TypeConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeConverter")
            .field("targets", &self.converters.len())
            .finish()
    }
}

impl Default for TypeConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeConverter {
    /// Create a converter with the built-in string conversion.
    #[must_use]
    pub fn new() -> Self {
        let mut converter = Self {
            converters: HashMap::new(),
        };
        converter.register::<String, _>(|value| {
            Some(match value {
                Value::String(s) => Value::String(s.clone()),
                other => Value::String(other.to_string()),
            })
        });
        converter
    }

    /// Register a conversion into `T`.
    pub fn register<T: 'static, F>(&mut self, convert: F)
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.converters
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Arc::new(convert));
    }

    /// Builder style variant of [`TypeConverter::register`].
    #[must_use]
    pub fn with<T: 'static, F>(mut self, convert: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.register::<T, F>(convert);
        self
    }

    /// Combine two converters; converters of `self` are tried first.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (type_id, converters) in &other.converters {
            merged
                .converters
                .entry(*type_id)
                .or_default()
                .extend(converters.iter().cloned());
        }
        merged
    }

    /// Convert `value` into `T`.
    pub fn convert<T: DeserializeOwned + 'static>(&self, value: Value) -> Result<T> {
        let first_error = match serde_json::from_value::<T>(value.clone()) {
            Ok(converted) => return Ok(converted),
            Err(e) => e,
        };

        if let Some(converters) = self.converters.get(&TypeId::of::<T>()) {
            for convert in converters {
                if let Some(candidate) = convert(&value) {
                    if let Ok(converted) = serde_json::from_value::<T>(candidate) {
                        return Ok(converted);
                    }
                }
            }
        }

        Err(PlexusError::conversion(format!(
            "Cannot convert value to {}: {first_error}",
            std::any::type_name::<T>()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Answer {
        text: String,
    }

    #[test]
    fn test_plain_deserialization() {
        let converter = TypeConverter::new();
        let answer: Answer = converter.convert(json!({"text": "hi"})).unwrap();
        assert_eq!(answer.text, "hi");
    }

    #[test]
    fn test_anything_converts_to_string() {
        let converter = TypeConverter::new();
        assert_eq!(converter.convert::<String>(json!(42)).unwrap(), "42");
        assert_eq!(converter.convert::<String>(json!("plain")).unwrap(), "plain");
    }

    #[test]
    fn test_registered_converter_reshapes_value() {
        let converter = TypeConverter::new().with::<Answer, _>(|value| {
            value.as_str().map(|text| json!({ "text": text }))
        });
        let answer: Answer = converter.convert(json!("wrapped")).unwrap();
        assert_eq!(answer, Answer { text: "wrapped".into() });
        assert!(converter.convert::<Answer>(json!(1)).is_err());
    }
}
