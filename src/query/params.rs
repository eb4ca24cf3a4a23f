//! Deferred query values
//!
//! A `Parameter` is a named or positional slot (`:name`, `:1`) whose
//! value is supplied later through `Bindings`. A `ParameterizedFunction`
//! applies a GQL-style function (`key`, `list`, `datetime`) to arguments
//! that may themselves be parameters.
//!
//! Resolution threads an explicit `UsedParameters` set through every call
//! and hands back the updated set alongside the resolved value.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{NaiveDateTime, TimeZone, Utc};

use crate::model::{Key, KeyId, Value};

use super::errors::{QueryError, QueryResult};

/// Parameter slot identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamKey {
    /// Positional slot `:1`
    Int(i64),
    /// Named slot `:name`
    Name(String),
    /// Byte-string name, treated like `Name`
    Bytes(Vec<u8>),
}

impl ParamKey {
    pub fn is_positional(&self) -> bool {
        matches!(self, ParamKey::Int(_))
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKey::Int(i) => write!(f, "{}", i),
            ParamKey::Name(s) => write!(f, "{}", s),
            ParamKey::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

impl From<i64> for ParamKey {
    fn from(i: i64) -> Self {
        ParamKey::Int(i)
    }
}

impl From<i32> for ParamKey {
    fn from(i: i32) -> Self {
        ParamKey::Int(i as i64)
    }
}

impl From<&str> for ParamKey {
    fn from(s: &str) -> Self {
        ParamKey::Name(s.to_string())
    }
}

impl From<String> for ParamKey {
    fn from(s: String) -> Self {
        ParamKey::Name(s)
    }
}

impl From<Vec<u8>> for ParamKey {
    fn from(b: Vec<u8>) -> Self {
        ParamKey::Bytes(b)
    }
}

/// Values supplied for parameter slots
///
/// Also carries the app and namespace used when a `key` function builds
/// a key.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<ParamKey, Value>,
    app: String,
    namespace: String,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn set(mut self, key: impl Into<ParamKey>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<ParamKey>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &ParamKey) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &ParamKey) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ParamKey> {
        self.values.keys()
    }

    /// App and namespace for keys built by the `key` function
    pub fn scoped(mut self, app: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.app = app.into();
        self.namespace = namespace.into();
        self
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Parameters consumed during a resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedParameters(BTreeSet<ParamKey>);

impl UsedParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the set with `key` marked as used
    pub fn mark(mut self, key: &ParamKey) -> Self {
        self.0.insert(key.clone());
        self
    }

    pub fn contains(&self, key: &ParamKey) -> bool {
        self.0.contains(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamKey> {
        self.0.iter()
    }
}

/// A bound variable in a query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    key: ParamKey,
}

impl Parameter {
    pub fn new(key: impl Into<ParamKey>) -> Self {
        Self { key: key.into() }
    }

    /// Builds a parameter from a dynamically typed key.
    ///
    /// Only integers, strings and bytes are accepted.
    pub fn from_value(key: &Value) -> QueryResult<Self> {
        match key {
            Value::Int(i) => Ok(Self::new(*i)),
            Value::String(s) => Ok(Self::new(s.clone())),
            Value::Bytes(b) => Ok(Self::new(b.clone())),
            other => Err(QueryError::invalid_argument(format!(
                "Parameter key must be an integer or string, not {}",
                other
            ))),
        }
    }

    pub fn key(&self) -> &ParamKey {
        &self.key
    }

    /// Looks up the bound value. No coercion is applied.
    pub fn resolve(&self, bindings: &Bindings, used: UsedParameters) -> QueryResult<(Value, UsedParameters)> {
        let value = bindings
            .get(&self.key)
            .ok_or_else(|| QueryError::UnboundParameter {
                key: self.key.clone(),
            })?;
        Ok((value.clone(), used.mark(&self.key)))
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.key)
    }
}

/// Argument of a parameterized function
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArg {
    Value(Value),
    Deferred(Parameterized),
}

impl From<Value> for FunctionArg {
    fn from(v: Value) -> Self {
        FunctionArg::Value(v)
    }
}

impl From<&str> for FunctionArg {
    fn from(s: &str) -> Self {
        FunctionArg::Value(Value::from(s))
    }
}

impl From<i64> for FunctionArg {
    fn from(i: i64) -> Self {
        FunctionArg::Value(Value::Int(i))
    }
}

impl From<Parameter> for FunctionArg {
    fn from(p: Parameter) -> Self {
        FunctionArg::Deferred(Parameterized::Parameter(p))
    }
}

impl From<ParameterizedFunction> for FunctionArg {
    fn from(f: ParameterizedFunction) -> Self {
        FunctionArg::Deferred(Parameterized::Function(f))
    }
}

/// A function applied once its arguments are bound
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterizedFunction {
    name: String,
    args: Vec<FunctionArg>,
}

impl ParameterizedFunction {
    pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = FunctionArg>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            args: args.into_iter().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[FunctionArg] {
        &self.args
    }

    /// Resolves every argument, then applies the function.
    pub fn resolve(&self, bindings: &Bindings, used: UsedParameters) -> QueryResult<(Value, UsedParameters)> {
        let mut used = used;
        let mut values = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            match arg {
                FunctionArg::Value(v) => values.push(v.clone()),
                FunctionArg::Deferred(p) => {
                    let (v, next) = p.resolve(bindings, used)?;
                    used = next;
                    values.push(v);
                }
            }
        }

        let value = match self.name.as_str() {
            "key" => Self::apply_key(values, bindings)?,
            "list" => Value::List(values),
            "datetime" => Self::apply_datetime(values)?,
            other => return Err(QueryError::UnsupportedFunction(other.to_string())),
        };
        Ok((value, used))
    }

    fn apply_key(values: Vec<Value>, bindings: &Bindings) -> QueryResult<Value> {
        if let [Value::Key(key)] = values.as_slice() {
            return Ok(Value::Key(key.clone()));
        }
        if values.is_empty() || values.len() % 2 != 0 {
            return Err(QueryError::bad_argument(
                "KEY() requires a key or an even number of kind/id arguments",
            ));
        }

        let mut pairs = Vec::with_capacity(values.len() / 2);
        for pair in values.chunks(2) {
            let kind = pair[0].as_str().ok_or_else(|| {
                QueryError::bad_argument(format!("KEY() kind must be a string, not {}", pair[0]))
            })?;
            let id = match &pair[1] {
                Value::Int(i) => KeyId::Int(*i),
                Value::String(s) => KeyId::Name(s.clone()),
                other => {
                    return Err(QueryError::bad_argument(format!(
                        "KEY() id must be an integer or string, not {}",
                        other
                    )))
                }
            };
            pairs.push((kind.to_string(), id));
        }

        let key = Key::new(bindings.app(), pairs).with_namespace(bindings.namespace());
        Ok(Value::Key(key))
    }

    fn apply_datetime(values: Vec<Value>) -> QueryResult<Value> {
        let text = match values.as_slice() {
            [Value::String(s)] => s,
            _ => {
                return Err(QueryError::bad_argument(
                    "DATETIME() requires a single string argument",
                ))
            }
        };
        let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .map_err(|e| QueryError::bad_argument(format!("Invalid DATETIME({:?}): {}", text, e)))?;
        Ok(Value::Timestamp(Utc.from_utc_datetime(&naive)))
    }
}

impl fmt::Display for ParameterizedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name.to_uppercase())?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match arg {
                FunctionArg::Value(v) => write!(f, "{}", v)?,
                FunctionArg::Deferred(p) => write!(f, "{}", p)?,
            }
        }
        write!(f, ")")
    }
}

/// Either kind of deferred value
#[derive(Debug, Clone, PartialEq)]
pub enum Parameterized {
    Parameter(Parameter),
    Function(ParameterizedFunction),
}

impl Parameterized {
    pub fn resolve(&self, bindings: &Bindings, used: UsedParameters) -> QueryResult<(Value, UsedParameters)> {
        match self {
            Parameterized::Parameter(p) => p.resolve(bindings, used),
            Parameterized::Function(f) => f.resolve(bindings, used),
        }
    }
}

impl From<Parameter> for Parameterized {
    fn from(p: Parameter) -> Self {
        Parameterized::Parameter(p)
    }
}

impl From<ParameterizedFunction> for Parameterized {
    fn from(f: ParameterizedFunction) -> Self {
        Parameterized::Function(f)
    }
}

impl fmt::Display for Parameterized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameterized::Parameter(p) => write!(f, "{}", p),
            Parameterized::Function(func) => write!(f, "{}", func),
        }
    }
}
