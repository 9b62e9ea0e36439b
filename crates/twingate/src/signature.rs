use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};

use crate::error::{Error, ErrorKind, Result};
use crate::method::{MethodType, ResponseKind};
use crate::parameter::{Parameter, ParameterKind};

static NEXT_SIGNATURE_ID: AtomicU64 = AtomicU64::new(0);

/// A signature identifier.
///
/// Each signature receives a unique identifier when it is created, so
/// structurally equal signatures can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureId(u64);

impl SignatureId {
    fn next() -> Self {
        Self(NEXT_SIGNATURE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The values bound to the parameters of a signature for a single call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binding(Vec<Value>);

impl Binding {
    /// Creates a [`Binding`] from a sequence of values.
    #[must_use]
    #[inline]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Returns the bound values in parameter order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Returns the bound value at the given index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Returns the number of bound values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks whether no value is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the [`Binding`] and returns its values.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

/// The signature of an access method.
///
/// Two signatures are equal when they share the method name and the
/// sequence of parameter kinds. Parameter names, constraints, and values
/// do not take part in the comparison.
#[derive(Debug)]
pub struct Signature {
    id: SignatureId,
    method: MethodType,
    parameters: Vec<Parameter>,
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other.name(), &other.parameter_kinds())
    }
}

impl Eq for Signature {}

impl Signature {
    /// Creates a [`Signature`] for the given [`MethodType`] and
    /// [`Parameter`]s.
    #[must_use]
    #[inline]
    pub fn new(method: MethodType, parameters: Vec<Parameter>) -> Self {
        Self {
            id: SignatureId::next(),
            method,
            parameters,
        }
    }

    /// Creates a [`Signature`] from a sequence of [`ParameterKind`]s.
    ///
    /// Missing parameter names default to `arg<index>`.
    #[must_use]
    pub fn from_kinds(method: MethodType, kinds: &[ParameterKind], names: &[&str]) -> Self {
        let parameters = kinds
            .iter()
            .enumerate()
            .map(|(index, kind)| match names.get(index) {
                Some(name) => Parameter::new(*name, *kind),
                None => Parameter::new(format!("arg{index}"), *kind),
            })
            .collect();
        Self::new(method, parameters)
    }

    /// Builds a [`Signature`] from its `JSON` description.
    ///
    /// # Errors
    ///
    /// An error is returned when the method type is unknown or when
    /// a parameter description is malformed.
    pub fn from_json(description: &Value) -> Result<Self> {
        let name = description
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::new(ErrorKind::MethodType, "Missing method name"))?;
        let method = MethodType::from_name(name).ok_or_else(|| {
            Error::new(ErrorKind::MethodType, format!("Unknown method type `{name}`"))
        })?;

        let parameters = match description.get("parameters") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(parameters)) => parameters
                .iter()
                .map(Parameter::from_json)
                .collect::<Result<_>>()?,
            Some(_) => {
                return Err(Error::new(
                    ErrorKind::Parameter,
                    "The signature parameters must be an array",
                ));
            }
        };

        Ok(Self::new(method, parameters))
    }

    /// Returns the [`SignatureId`].
    #[must_use]
    pub const fn id(&self) -> SignatureId {
        self.id
    }

    /// Returns the [`MethodType`].
    #[must_use]
    pub const fn method(&self) -> MethodType {
        self.method
    }

    /// Returns the name of the method.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.method.name()
    }

    /// Returns the [`ResponseKind`] of the method.
    #[must_use]
    pub const fn response_kind(&self) -> ResponseKind {
        self.method.response_kind()
    }

    /// Returns the [`Parameter`]s.
    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Returns the [`ParameterKind`]s in parameter order.
    #[must_use]
    pub fn parameter_kinds(&self) -> Vec<ParameterKind> {
        self.parameters.iter().map(Parameter::kind).collect()
    }

    /// Returns the [`Parameter`] at the given index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Parameter> {
        self.parameters.get(index)
    }

    /// Returns the [`Parameter`] with the given name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name() == name)
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Checks whether the signature has no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Checks whether the signature has the given method name and
    /// parameter kinds.
    #[must_use]
    pub fn matches(&self, name: &str, kinds: &[ParameterKind]) -> bool {
        self.name() == name
            && self.parameters.len() == kinds.len()
            && self
                .parameters
                .iter()
                .zip(kinds)
                .all(|(parameter, kind)| parameter.kind() == *kind)
    }

    /// Validates a sequence of values against the parameters and returns
    /// the resulting [`Binding`].
    ///
    /// The return value is [`None`] when the number of values differs from
    /// the number of parameters or when a parameter rejects its value.
    #[must_use]
    pub fn valid_parameters(&self, values: &[Value]) -> Option<Binding> {
        if self.parameters.len() != values.len() {
            return None;
        }

        self.parameters
            .iter()
            .zip(values)
            .map(|(parameter, value)| parameter.validate(value))
            .collect::<Option<Vec<_>>>()
            .map(Binding)
    }

    /// Returns the [`Binding`] of a call that provides no value.
    ///
    /// Fixed parameters bind their value, the others bind `null`.
    #[must_use]
    pub fn default_binding(&self) -> Binding {
        Binding(
            self.parameters
                .iter()
                .map(|p| p.reset_value().clone())
                .collect(),
        )
    }

    /// Returns the `JSON` description of the [`Signature`].
    #[must_use]
    pub fn describe(&self) -> Value {
        json!({
            "name": self.name(),
            "parameters": self.parameters.iter().map(Parameter::describe).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use crate::constraint::Constraint;
    use crate::method::MethodType;
    use crate::parameter::{Parameter, ParameterKind};

    use super::Signature;

    fn get_signature(kinds: &[ParameterKind], names: &[&str]) -> Signature {
        Signature::from_kinds(MethodType::get(), kinds, names)
    }

    #[test]
    fn signature_equality() {
        let first = get_signature(&[ParameterKind::String, ParameterKind::I64], &["a", "b"]);
        let second = get_signature(&[ParameterKind::String, ParameterKind::I64], &["x"]);
        let reversed = get_signature(&[ParameterKind::I64, ParameterKind::String], &["a", "b"]);
        let set = Signature::from_kinds(
            MethodType::set(),
            &[ParameterKind::String, ParameterKind::I64],
            &[],
        );

        assert_eq!(first, second);
        assert_ne!(first.id(), second.id());
        assert_ne!(first, reversed);
        assert_ne!(first, set);
        assert_eq!(second.get(1).unwrap().name(), "arg1");
    }

    #[test]
    fn validation_round_trip() {
        let signature = get_signature(
            &[ParameterKind::Any, ParameterKind::Any, ParameterKind::Any],
            &[],
        );
        let values = vec![json!("dev1"), json!(3.5), json!({"unit": "C"})];

        let binding = signature.valid_parameters(&values).unwrap();
        assert_eq!(binding.values(), values.as_slice());

        // Arity must match.
        assert!(signature.valid_parameters(&values[..2]).is_none());
    }

    #[test]
    fn validation_failure() {
        let signature = Signature::new(
            MethodType::set(),
            vec![
                Parameter::new("attribute", ParameterKind::String),
                Parameter::new("value", ParameterKind::I64).with_constraint(Constraint::greater(0.)),
            ],
        );

        assert!(signature.valid_parameters(&[json!("value"), json!(3)]).is_some());
        assert!(signature.valid_parameters(&[json!("value"), json!(-3)]).is_none());
        assert!(signature.valid_parameters(&[json!(1), json!(3)]).is_none());
    }

    #[test]
    fn default_binding() {
        let signature = Signature::new(
            MethodType::get(),
            vec![
                Parameter::fixed("attribute", ParameterKind::String, "value"),
                Parameter::new("filter", ParameterKind::String),
            ],
        );

        assert_eq!(
            signature.default_binding().into_values(),
            vec![json!("value"), Value::Null]
        );
        assert_eq!(
            signature.get_by_name("filter").unwrap().kind(),
            ParameterKind::String
        );
    }

    #[test]
    fn signature_description() {
        let signature = get_signature(&[ParameterKind::String], &["attribute"]);
        let description = signature.describe();

        assert_eq!(
            description,
            json!({
                "name": "GET",
                "parameters": [{
                    "name": "attribute",
                    "type": "string",
                    "fixed": false,
                    "constraints": [],
                }],
            })
        );
        assert_eq!(Signature::from_json(&description).unwrap(), signature);
        assert!(Signature::from_json(&json!({"name": "PATCH"})).is_err());
    }
}
