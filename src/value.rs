use std::collections::BTreeMap;

use crate::Error;

/// Dynamic value exchanged between mapper methods, parameter objects and rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Resolves a dotted property path (`user.address.city`) inside nested maps.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(self, |current, name| match current {
            Value::Map(entries) => entries.get(name),
            _ => None,
        })
    }

    /// Writes `value` at a dotted property path, creating intermediate maps.
    ///
    /// A null root is promoted to an empty map; any other non-map value on the
    /// path is an error.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), Error> {
        let names: Vec<&str> = path.split('.').collect();
        set_path_in(self, &names, value, path)
    }
}

fn set_path_in(target: &mut Value, names: &[&str], value: Value, path: &str) -> Result<(), Error> {
    if target.is_null() {
        *target = Value::map();
    }
    match target {
        Value::Map(entries) => match names {
            [] => Ok(()),
            [last] => {
                entries.insert(last.to_string(), value);
                Ok(())
            }
            [first, rest @ ..] => {
                let next = entries.entry(first.to_string()).or_default();
                set_path_in(next, rest, value, path)
            }
        },
        other => Err(Error::Message(format!(
            "cannot set property '{}' on a {} value",
            path,
            other.type_name()
        ))),
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident as $cast:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v as $cast)
                }
            }
        )*
    };
}

value_from!(
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    u8 => Int as i64,
    u16 => Int as i64,
    u32 => Int as i64,
    f32 => Float as f64,
    f64 => Float as f64,
);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// One result row as returned by a command cursor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Case-insensitive lookup by column label.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.columns.get(index).map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &(String, Value)> {
        self.columns.iter()
    }

    pub fn into_value(self) -> Value {
        Value::Map(self.columns.into_iter().collect())
    }
}

/// Converts a mapper method argument into a parameter value.
///
/// `merge_value` receives the parameter object after execution so that
/// `&mut` arguments can pick up generated keys.
pub trait ToValue {
    fn to_value(&self) -> Value;

    fn merge_value(&mut self, _value: &Value) -> Result<(), Error> {
        Ok(())
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: ToValue + ?Sized> ToValue for &mut T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }

    fn merge_value(&mut self, value: &Value) -> Result<(), Error> {
        (**self).merge_value(value)
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }

    fn merge_value(&mut self, value: &Value) -> Result<(), Error> {
        *self = value.clone();
        Ok(())
    }
}

macro_rules! to_value_via_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    Value::from(self.clone())
                }
            }
        )*
    };
}

to_value_via_from!(i8, i16, i32, i64, u8, u16, u32, f32, f64, bool, String);

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map(ToValue::to_value).unwrap_or(Value::Null)
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<V: ToValue> ToValue for BTreeMap<String, V> {
    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(name, value)| (name.clone(), value.to_value()))
                .collect(),
        )
    }
}

/// Converts a statement result back into a mapper method's return type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, Error>;
}

fn conversion_error(expected: &str, value: &Value) -> Error {
    Error::Message(format!(
        "cannot convert a {} result into {}",
        value.type_name(),
        expected
    ))
}

/// A single-column row stands in for its only value when a scalar is expected.
fn unwrap_single_column(value: Value) -> Value {
    match value {
        Value::Map(entries) if entries.len() == 1 => {
            entries.into_values().next().unwrap_or(Value::Null)
        }
        other => other,
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, Error> {
        Ok(value)
    }
}

impl FromValue for () {
    fn from_value(_value: Value) -> Result<Self, Error> {
        Ok(())
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, Error> {
        match unwrap_single_column(value) {
            Value::Int(v) => Ok(v),
            Value::Bool(v) => Ok(i64::from(v)),
            other => Err(conversion_error("i64", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, Error> {
        let v = i64::from_value(value)?;
        i32::try_from(v).map_err(|_| Error::Message(format!("{v} does not fit into i32")))
    }
}

impl FromValue for u64 {
    fn from_value(value: Value) -> Result<Self, Error> {
        let v = i64::from_value(value)?;
        u64::try_from(v).map_err(|_| Error::Message(format!("{v} does not fit into u64")))
    }
}

impl FromValue for usize {
    fn from_value(value: Value) -> Result<Self, Error> {
        let v = i64::from_value(value)?;
        usize::try_from(v).map_err(|_| Error::Message(format!("{v} does not fit into usize")))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, Error> {
        match unwrap_single_column(value) {
            Value::Float(v) => Ok(v),
            Value::Int(v) => Ok(v as f64),
            other => Err(conversion_error("f64", &other)),
        }
    }
}

/// Row counts convert to `true` when at least one row was affected.
impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, Error> {
        match unwrap_single_column(value) {
            Value::Bool(v) => Ok(v),
            Value::Int(v) => Ok(v > 0),
            other => Err(conversion_error("bool", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, Error> {
        match unwrap_single_column(value) {
            Value::Text(v) => Ok(v),
            other => Err(conversion_error("String", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(conversion_error("Vec", &other)),
        }
    }
}

impl FromValue for BTreeMap<String, Value> {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Map(entries) => Ok(entries),
            other => Err(conversion_error("map", &other)),
        }
    }
}
