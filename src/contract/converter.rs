//! Value converters and the build-time type → converter table.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

use crate::contract::value::{NativeValue, TypeTag};
use crate::errors::{ConfigurationError, ConversionError};

/// Bidirectional mapping between one JSON value and one native value.
///
/// Implementations must be deterministic and free of side effects; a single instance
/// is shared by every method that declares the type.
pub trait ValueConverter: Send + Sync {
    fn to_json(&self, value: &NativeValue) -> Result<Value, ConversionError>;

    fn from_json(&self, value: &Value, declared: &TypeTag) -> Result<NativeValue, ConversionError>;
}

fn rejected(declared: &TypeTag, value: &Value) -> ConversionError {
    ConversionError::new(declared, value.clone())
}

fn rejected_native(declared: &TypeTag, value: &NativeValue) -> ConversionError {
    ConversionError::new(declared, Value::String(format!("<native {}>", value.kind())))
}

#[derive(Debug, Default)]
pub struct UnitConverter;

impl ValueConverter for UnitConverter {
    fn to_json(&self, value: &NativeValue) -> Result<Value, ConversionError> {
        match value {
            NativeValue::Null => Ok(Value::Null),
            other => Err(rejected_native(&TypeTag::Unit, other)),
        }
    }

    fn from_json(&self, value: &Value, declared: &TypeTag) -> Result<NativeValue, ConversionError> {
        match value {
            Value::Null => Ok(NativeValue::Null),
            other => Err(rejected(declared, other)),
        }
    }
}

#[derive(Debug, Default)]
pub struct BoolConverter;

impl ValueConverter for BoolConverter {
    fn to_json(&self, value: &NativeValue) -> Result<Value, ConversionError> {
        match value {
            NativeValue::Bool(value) => Ok(Value::Bool(*value)),
            other => Err(rejected_native(&TypeTag::Bool, other)),
        }
    }

    fn from_json(&self, value: &Value, declared: &TypeTag) -> Result<NativeValue, ConversionError> {
        value
            .as_bool()
            .map(NativeValue::Bool)
            .ok_or_else(|| rejected(declared, value))
    }
}

/// Integral JSON numbers only; `1.5` and `"1"` are rejected.
#[derive(Debug, Default)]
pub struct IntConverter;

impl ValueConverter for IntConverter {
    fn to_json(&self, value: &NativeValue) -> Result<Value, ConversionError> {
        match value {
            NativeValue::Int(value) => Ok(Value::Number((*value).into())),
            other => Err(rejected_native(&TypeTag::Int, other)),
        }
    }

    fn from_json(&self, value: &Value, declared: &TypeTag) -> Result<NativeValue, ConversionError> {
        value
            .as_i64()
            .map(NativeValue::Int)
            .ok_or_else(|| rejected(declared, value))
    }
}

#[derive(Debug, Default)]
pub struct FloatConverter;

impl ValueConverter for FloatConverter {
    fn to_json(&self, value: &NativeValue) -> Result<Value, ConversionError> {
        match value {
            NativeValue::Float(float) => Number::from_f64(*float)
                .map(Value::Number)
                .ok_or_else(|| rejected_native(&TypeTag::Float, value)),
            NativeValue::Int(value) => Ok(Value::Number((*value).into())),
            other => Err(rejected_native(&TypeTag::Float, other)),
        }
    }

    fn from_json(&self, value: &Value, declared: &TypeTag) -> Result<NativeValue, ConversionError> {
        value
            .as_f64()
            .map(NativeValue::Float)
            .ok_or_else(|| rejected(declared, value))
    }
}

#[derive(Debug, Default)]
pub struct TextConverter;

impl ValueConverter for TextConverter {
    fn to_json(&self, value: &NativeValue) -> Result<Value, ConversionError> {
        match value {
            NativeValue::Text(value) => Ok(Value::String(value.clone())),
            other => Err(rejected_native(&TypeTag::Text, other)),
        }
    }

    fn from_json(&self, value: &Value, declared: &TypeTag) -> Result<NativeValue, ConversionError> {
        value
            .as_str()
            .map(|text| NativeValue::Text(text.to_string()))
            .ok_or_else(|| rejected(declared, value))
    }
}

/// RFC 3339 timestamps ending in `Z`. Emitted with at least millisecond precision and
/// as many further digits as the value carries, so nothing is lost on the wire.
#[derive(Debug, Default)]
pub struct TimestampConverter;

impl TimestampConverter {
    fn parse(text: &str) -> Option<DateTime<Utc>> {
        if !text.ends_with('Z') {
            return None;
        }
        let parsed = DateTime::parse_from_rfc3339(text).ok()?;
        if parsed.offset().local_minus_utc() != 0 {
            return None;
        }
        Some(parsed.with_timezone(&Utc))
    }

    fn precision(value: &DateTime<Utc>) -> SecondsFormat {
        match value.timestamp_subsec_nanos() {
            nanos if nanos % 1_000_000 == 0 => SecondsFormat::Millis,
            nanos if nanos % 1_000 == 0 => SecondsFormat::Micros,
            _ => SecondsFormat::Nanos,
        }
    }
}

impl ValueConverter for TimestampConverter {
    fn to_json(&self, value: &NativeValue) -> Result<Value, ConversionError> {
        match value {
            NativeValue::Timestamp(value) => Ok(Value::String(
                value.to_rfc3339_opts(Self::precision(value), true),
            )),
            other => Err(rejected_native(&TypeTag::Timestamp, other)),
        }
    }

    fn from_json(&self, value: &Value, declared: &TypeTag) -> Result<NativeValue, ConversionError> {
        value
            .as_str()
            .and_then(Self::parse)
            .map(NativeValue::Timestamp)
            .ok_or_else(|| rejected(declared, value))
    }
}

#[derive(Debug, Default)]
pub struct JsonConverter;

impl ValueConverter for JsonConverter {
    fn to_json(&self, value: &NativeValue) -> Result<Value, ConversionError> {
        match value {
            NativeValue::Json(value) => Ok(value.clone()),
            other => Err(rejected_native(&TypeTag::Json, other)),
        }
    }

    fn from_json(&self, value: &Value, _declared: &TypeTag) -> Result<NativeValue, ConversionError> {
        Ok(NativeValue::Json(value.clone()))
    }
}

/// Fallback converter for `List(T)`, composed over the converter of `T`.
pub struct ListConverter {
    item_tag: TypeTag,
    item: Arc<dyn ValueConverter>,
}

impl ValueConverter for ListConverter {
    fn to_json(&self, value: &NativeValue) -> Result<Value, ConversionError> {
        match value {
            NativeValue::List(items) => items
                .iter()
                .map(|item| self.item.to_json(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(rejected_native(
                &TypeTag::list_of(self.item_tag.clone()),
                other,
            )),
        }
    }

    fn from_json(&self, value: &Value, declared: &TypeTag) -> Result<NativeValue, ConversionError> {
        let items = value.as_array().ok_or_else(|| rejected(declared, value))?;
        items
            .iter()
            .map(|item| {
                self.item
                    .from_json(item, &self.item_tag)
                    .map_err(|_| rejected(declared, value))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(NativeValue::List)
    }
}

/// Fallback converter for `Nullable(T)`: `null` on either side, otherwise `T`.
pub struct NullableConverter {
    inner_tag: TypeTag,
    inner: Arc<dyn ValueConverter>,
}

impl ValueConverter for NullableConverter {
    fn to_json(&self, value: &NativeValue) -> Result<Value, ConversionError> {
        match value {
            NativeValue::Null => Ok(Value::Null),
            other => self.inner.to_json(other),
        }
    }

    fn from_json(&self, value: &Value, declared: &TypeTag) -> Result<NativeValue, ConversionError> {
        match value {
            Value::Null => Ok(NativeValue::Null),
            other => self
                .inner
                .from_json(other, &self.inner_tag)
                .map_err(|_| rejected(declared, other)),
        }
    }
}

/// Maps declared types to converters. Consulted only while descriptors are built.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    exact: HashMap<TypeTag, Arc<dyn ValueConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        Self::new()
            .with(TypeTag::Unit, UnitConverter)
            .with(TypeTag::Bool, BoolConverter)
            .with(TypeTag::Int, IntConverter)
            .with(TypeTag::Float, FloatConverter)
            .with(TypeTag::Text, TextConverter)
            .with(TypeTag::Timestamp, TimestampConverter)
            .with(TypeTag::Json, JsonConverter)
    }

    pub fn with(mut self, tag: TypeTag, converter: impl ValueConverter + 'static) -> Self {
        self.register(tag, Arc::new(converter));
        self
    }

    /// Registers or replaces the exact converter for `tag`.
    pub fn register(&mut self, tag: TypeTag, converter: Arc<dyn ValueConverter>) {
        self.exact.insert(tag, converter);
    }

    /// Exact match first, then the composite fallbacks for lists and nullables.
    pub fn resolve(&self, tag: &TypeTag) -> Result<Arc<dyn ValueConverter>, ConfigurationError> {
        if let Some(converter) = self.exact.get(tag) {
            return Ok(Arc::clone(converter));
        }

        match tag {
            TypeTag::List(item) => Ok(Arc::new(ListConverter {
                item_tag: (**item).clone(),
                item: self.resolve(item)?,
            })),
            TypeTag::Nullable(inner) => Ok(Arc::new(NullableConverter {
                inner_tag: (**inner).clone(),
                inner: self.resolve(inner)?,
            })),
            _ => Err(ConfigurationError::UnresolvedType {
                type_tag: tag.clone(),
            }),
        }
    }
}
