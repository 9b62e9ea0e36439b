use serde::{Deserialize, Serialize};

use serde_json::{Value, json};

use crate::constraint::Constraint;
use crate::error::{Error, ErrorKind, Result};

const NAME_KEY: &str = "name";
const TYPE_KEY: &str = "type";
const FIXED_KEY: &str = "fixed";
const VALUE_KEY: &str = "value";
const CONSTRAINTS_KEY: &str = "constraints";

fn parameter_error(info: impl Into<std::borrow::Cow<'static, str>>) -> Error {
    Error::new(ErrorKind::Parameter, info)
}

/// Parameter kinds.
///
/// A kind is the type tag of a parameter. Signatures are matched by
/// comparing kinds for identity, never for compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    /// A boolean.
    Bool,
    /// A signed 64-bit integer.
    I64,
    /// An unsigned 64-bit integer.
    U64,
    /// A 64-bit floating point number.
    F64,
    /// A string.
    String,
    /// An array of values.
    Array,
    /// A map of values.
    Object,
    /// Any value.
    Any,
}

impl core::fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.name().fmt(f)
    }
}

impl ParameterKind {
    /// Returns the [`ParameterKind`] name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F64 => "f64",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }

    /// Returns the [`ParameterKind`] associated with the given name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "i64" => Self::I64,
            "u64" => Self::U64,
            "f64" => Self::F64,
            "string" => Self::String,
            "array" => Self::Array,
            "object" => Self::Object,
            "any" => Self::Any,
            _ => return None,
        })
    }

    /// Checks whether a value can be stored into a parameter of this kind.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Bool => value.is_boolean(),
            Self::I64 => value.is_i64(),
            Self::U64 => value.is_u64(),
            Self::F64 => value.is_number(),
            Self::String => value.is_string(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

/// Whether the value of a parameter or an attribute can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modifiable {
    /// The value never changes.
    Fixed,
    /// The value can be updated.
    #[default]
    Updatable,
}

/// A named and typed value slot of a signature.
///
/// A parameter is an immutable template: validating a candidate value
/// returns the value to bind instead of storing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    kind: ParameterKind,
    modifiable: Modifiable,
    value: Value,
    constraints: Vec<Constraint>,
}

impl Parameter {
    /// Creates an updatable [`Parameter`].
    #[must_use]
    #[inline]
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            modifiable: Modifiable::Updatable,
            value: Value::Null,
            constraints: Vec::new(),
        }
    }

    /// Creates a fixed [`Parameter`].
    ///
    /// A fixed parameter accepts every candidate and always binds
    /// its own value.
    #[must_use]
    #[inline]
    pub fn fixed(name: impl Into<String>, kind: ParameterKind, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            modifiable: Modifiable::Fixed,
            value: value.into(),
            constraints: Vec::new(),
        }
    }

    /// Adds a [`Constraint`] to an updatable [`Parameter`].
    ///
    /// Fixed parameters ignore constraints.
    #[must_use]
    #[inline]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        if self.modifiable == Modifiable::Updatable {
            self.constraints.push(constraint);
        }
        self
    }

    /// Adds a sequence of [`Constraint`]s to an updatable [`Parameter`].
    #[must_use]
    #[inline]
    pub fn with_constraints(self, constraints: impl IntoIterator<Item = Constraint>) -> Self {
        constraints
            .into_iter()
            .fold(self, |parameter, constraint| parameter.with_constraint(constraint))
    }

    /// Returns the [`Parameter`] name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the [`ParameterKind`].
    #[must_use]
    pub const fn kind(&self) -> ParameterKind {
        self.kind
    }

    /// Returns the [`Modifiable`] mode.
    #[must_use]
    pub const fn modifiable(&self) -> Modifiable {
        self.modifiable
    }

    /// Returns the [`Constraint`]s.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Returns the value bound before any validation.
    ///
    /// It is the fixed value of a fixed parameter, `null` otherwise.
    #[must_use]
    pub const fn reset_value(&self) -> &Value {
        &self.value
    }

    /// Validates a candidate value and returns the value to bind.
    ///
    /// - A fixed parameter accepts any candidate and binds its fixed value.
    /// - A `null` value or an empty array is accepted unconditionally.
    /// - Any other value must satisfy every constraint and fit the
    ///   parameter kind.
    ///
    /// The return value is [`None`] when the candidate is rejected.
    #[must_use]
    pub fn validate(&self, candidate: &Value) -> Option<Value> {
        if self.modifiable == Modifiable::Fixed {
            return Some(self.value.clone());
        }

        if is_unset(candidate) {
            return Some(candidate.clone());
        }

        (self.constraints.iter().all(|c| c.complies(candidate)) && self.kind.accepts(candidate))
            .then(|| candidate.clone())
    }

    /// Checks whether a candidate value is valid for the [`Parameter`].
    #[must_use]
    #[inline]
    pub fn is_valid(&self, candidate: &Value) -> bool {
        self.validate(candidate).is_some()
    }

    /// Returns the `JSON` description of the [`Parameter`].
    #[must_use]
    pub fn describe(&self) -> Value {
        let mut description = json!({
            NAME_KEY: self.name,
            TYPE_KEY: self.kind,
            FIXED_KEY: self.modifiable == Modifiable::Fixed,
            CONSTRAINTS_KEY: self.constraints.iter().map(Constraint::to_json).collect::<Vec<_>>(),
        });

        if self.modifiable == Modifiable::Fixed
            && let Some(object) = description.as_object_mut()
        {
            let _ = object.insert(VALUE_KEY.into(), self.value.clone());
        }

        description
    }

    /// Builds a [`Parameter`] from its `JSON` description.
    ///
    /// # Errors
    ///
    /// An error is returned when the name or the type is missing or
    /// unknown, or when a constraint description is malformed.
    pub fn from_json(description: &Value) -> Result<Self> {
        let name = description
            .get(NAME_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| parameter_error("Missing parameter name"))?;

        let kind = description
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| parameter_error(format!("Missing type for the `{name}` parameter")))?;
        let kind = ParameterKind::from_name(kind)
            .ok_or_else(|| parameter_error(format!("Unknown parameter type `{kind}`")))?;

        if description
            .get(FIXED_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            let value = description.get(VALUE_KEY).cloned().unwrap_or(Value::Null);
            if !value.is_null() && !kind.accepts(&value) {
                return Err(parameter_error(format!(
                    "The fixed value `{value}` is not a `{kind}` value"
                )));
            }
            return Ok(Self::fixed(name, kind, value));
        }

        let constraints = match description.get(CONSTRAINTS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(constraints)) => constraints
                .iter()
                .map(Constraint::from_json)
                .collect::<Result<_>>()?,
            Some(constraint) => vec![Constraint::from_json(constraint)?],
        };

        Ok(Self::new(name, kind).with_constraints(constraints))
    }
}

// The values a caller passes when it has nothing to provide.
fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(array) => array.is_empty(),
        _ => false,
    }
}
