//! Native side of the contract model: declared type tags, native values and argument slots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::errors::InvocationError;

/// Declared type of a parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Unit,
    Bool,
    Int,
    Float,
    Text,
    /// RFC 3339 UTC timestamp.
    Timestamp,
    /// Opaque JSON passed through untouched.
    Json,
    List(Box<TypeTag>),
    Nullable(Box<TypeTag>),
    /// A user type; needs a converter registered under the same name.
    Named(&'static str),
    /// The ambient cancellation signal. Never read from or written to the wire.
    Cancellation,
}

impl TypeTag {
    pub fn list_of(item: TypeTag) -> Self {
        Self::List(Box::new(item))
    }

    pub fn nullable(inner: TypeTag) -> Self {
        Self::Nullable(Box::new(inner))
    }

    pub fn is_ambient(&self) -> bool {
        matches!(self, Self::Cancellation)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => f.write_str("unit"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Text => f.write_str("string"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::Json => f.write_str("json"),
            Self::List(item) => write!(f, "list<{item}>"),
            Self::Nullable(inner) => write!(f, "{inner}?"),
            Self::Named(name) => f.write_str(name),
            Self::Cancellation => f.write_str("cancellation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    List(Vec<NativeValue>),
    Json(Value),
}

impl NativeValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::List(_) => "list",
            Self::Json(_) => "json",
        }
    }
}

impl From<()> for NativeValue {
    fn from(_: ()) -> Self {
        Self::Null
    }
}

impl From<bool> for NativeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for NativeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for NativeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<DateTime<Utc>> for NativeValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Value> for NativeValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl<T: Into<NativeValue>> From<Vec<T>> for NativeValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<NativeValue>> From<Option<T>> for NativeValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Extracts a Rust value out of a [`NativeValue`].
pub trait FromNative: Sized {
    const EXPECTED: &'static str;

    fn from_native(value: &NativeValue) -> Option<Self>;
}

impl FromNative for bool {
    const EXPECTED: &'static str = "bool";

    fn from_native(value: &NativeValue) -> Option<Self> {
        match value {
            NativeValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl FromNative for i64 {
    const EXPECTED: &'static str = "int";

    fn from_native(value: &NativeValue) -> Option<Self> {
        match value {
            NativeValue::Int(value) => Some(*value),
            _ => None,
        }
    }
}

impl FromNative for f64 {
    const EXPECTED: &'static str = "float";

    fn from_native(value: &NativeValue) -> Option<Self> {
        match value {
            NativeValue::Float(value) => Some(*value),
            NativeValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }
}

impl FromNative for String {
    const EXPECTED: &'static str = "string";

    fn from_native(value: &NativeValue) -> Option<Self> {
        match value {
            NativeValue::Text(value) => Some(value.clone()),
            _ => None,
        }
    }
}

impl FromNative for DateTime<Utc> {
    const EXPECTED: &'static str = "timestamp";

    fn from_native(value: &NativeValue) -> Option<Self> {
        match value {
            NativeValue::Timestamp(value) => Some(*value),
            _ => None,
        }
    }
}

impl FromNative for Value {
    const EXPECTED: &'static str = "json";

    fn from_native(value: &NativeValue) -> Option<Self> {
        match value {
            NativeValue::Json(value) => Some(value.clone()),
            _ => None,
        }
    }
}

impl FromNative for NativeValue {
    const EXPECTED: &'static str = "any";

    fn from_native(value: &NativeValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl<T: FromNative> FromNative for Vec<T> {
    const EXPECTED: &'static str = "list";

    fn from_native(value: &NativeValue) -> Option<Self> {
        match value {
            NativeValue::List(items) => items.iter().map(T::from_native).collect(),
            _ => None,
        }
    }
}

impl<T: FromNative> FromNative for Option<T> {
    const EXPECTED: &'static str = "nullable";

    fn from_native(value: &NativeValue) -> Option<Self> {
        match value {
            NativeValue::Null => Some(None),
            other => T::from_native(other).map(Some),
        }
    }
}

/// One positional argument slot.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(NativeValue),
    /// An optional parameter the caller did not supply. Distinct from an explicit null.
    Missing,
    Cancellation(CancellationToken),
}

impl Arg {
    pub fn value(value: impl Into<NativeValue>) -> Self {
        Self::Value(value.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(left), Self::Value(right)) => left == right,
            (Self::Missing, Self::Missing) => true,
            (Self::Cancellation(left), Self::Cancellation(right)) => {
                left.is_cancelled() == right.is_cancelled()
            }
            _ => false,
        }
    }
}

/// Unmarshaled call arguments, positionally aligned to the method's parameter contracts.
#[derive(Debug, Clone)]
pub struct Arguments {
    method: String,
    names: Vec<String>,
    slots: Vec<Arg>,
    extension_data: Option<Map<String, Value>>,
}

impl Arguments {
    pub(crate) fn new(
        method: impl Into<String>,
        names: Vec<String>,
        slots: Vec<Arg>,
        extension_data: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            method: method.into(),
            names,
            slots,
            extension_data,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Arg] {
        &self.slots
    }

    /// Wire params that matched no parameter, when the method accepts extension data.
    pub fn extension_data(&self) -> Option<&Map<String, Value>> {
        self.extension_data.as_ref()
    }

    pub fn required<T: FromNative>(&self, index: usize) -> Result<T, InvocationError> {
        match self.slots.get(index) {
            Some(Arg::Value(value)) => self.extract(index, value),
            _ => Err(self.mismatch::<T>(index, "missing")),
        }
    }

    /// `None` when the caller omitted the parameter.
    pub fn optional<T: FromNative>(&self, index: usize) -> Result<Option<T>, InvocationError> {
        match self.slots.get(index) {
            Some(Arg::Missing) | None => Ok(None),
            Some(Arg::Value(value)) => self.extract(index, value).map(Some),
            Some(Arg::Cancellation(_)) => Err(self.mismatch::<T>(index, "cancellation")),
        }
    }

    pub fn get_or<T: FromNative>(&self, index: usize, default: T) -> Result<T, InvocationError> {
        Ok(self.optional(index)?.unwrap_or(default))
    }

    /// The ambient token in `index`, or a token that never fires.
    pub fn cancellation(&self, index: usize) -> CancellationToken {
        match self.slots.get(index) {
            Some(Arg::Cancellation(token)) => token.clone(),
            _ => CancellationToken::new(),
        }
    }

    fn extract<T: FromNative>(&self, index: usize, value: &NativeValue) -> Result<T, InvocationError> {
        T::from_native(value).ok_or_else(|| self.mismatch::<T>(index, value.kind()))
    }

    fn mismatch<T: FromNative>(&self, index: usize, found: &str) -> InvocationError {
        let parameter = self
            .names
            .get(index)
            .map(String::as_str)
            .unwrap_or("<out of range>");
        InvocationError::Failed(anyhow::anyhow!(
            "argument {index} ({parameter}) of {} expected {}, found {found}",
            self.method,
            T::EXPECTED
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn arguments(slots: Vec<Arg>) -> Arguments {
        let names = (0..slots.len()).map(|index| format!("p{index}")).collect();
        Arguments::new("test", names, slots, None)
    }

    #[test]
    fn type_tags_render_readable_names() {
        assert_eq!(TypeTag::list_of(TypeTag::Int).to_string(), "list<int>");
        assert_eq!(TypeTag::nullable(TypeTag::Text).to_string(), "string?");
        assert_eq!(TypeTag::Named("point").to_string(), "point");
    }

    #[test]
    fn missing_optional_falls_back_to_caller_default() {
        let args = arguments(vec![Arg::value("Ann"), Arg::Missing]);

        assert_eq!(args.required::<String>(0).expect("name"), "Ann");
        assert!(!args.get_or(1, false).expect("shout default"));
        assert_eq!(args.optional::<bool>(1).expect("shout"), None);
    }

    #[test]
    fn explicit_null_is_not_missing() {
        let args = arguments(vec![Arg::Value(NativeValue::Null)]);

        assert_eq!(args.optional::<Option<i64>>(0).expect("nullable"), Some(None));
        assert!(!args.slots()[0].is_missing());
    }

    #[test]
    fn required_reports_type_mismatch() {
        let args = arguments(vec![Arg::Value(json!({"x": 1}).into())]);

        let err = args.required::<i64>(0).expect_err("json is not int");
        assert!(err.to_string().contains("expected int"));
    }

    #[test]
    fn cancellation_slot_defaults_to_live_token() {
        let args = arguments(vec![Arg::Missing]);

        assert!(!args.cancellation(0).is_cancelled());
    }
}
