use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::method::MethodType;
use crate::parameter::{Parameter, ParameterKind};
use crate::signature::{Binding, Signature};

/// A [`Signature`] with some positions pinned to constants.
///
/// The parameters of the inner signature are the free positions a caller
/// still has to provide. Fixed positions are expressed as indices of the
/// base signature the shortcut ultimately specializes, so a shortcut
/// registered over another shortcut shares the same index space.
#[derive(Debug)]
pub struct Shortcut {
    signature: Signature,
    fixed: BTreeMap<usize, Parameter>,
}

impl PartialEq for Shortcut {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature
    }
}

impl AsRef<Signature> for Shortcut {
    fn as_ref(&self) -> &Signature {
        &self.signature
    }
}

impl Shortcut {
    /// Creates a [`Shortcut`] from its free parameters.
    #[must_use]
    #[inline]
    pub fn new(method: MethodType, parameters: Vec<Parameter>) -> Self {
        Self {
            signature: Signature::new(method, parameters),
            fixed: BTreeMap::new(),
        }
    }

    /// Pins the base signature position `index` to `value`.
    ///
    /// Pinning the same position twice keeps the last value.
    #[must_use]
    #[inline]
    pub fn with_fixed(
        mut self,
        index: usize,
        name: impl Into<String>,
        kind: ParameterKind,
        value: impl Into<Value>,
    ) -> Self {
        let _ = self
            .fixed
            .insert(index, Parameter::fixed(name, kind, value));
        self
    }

    /// Returns the [`Signature`] of the free parameters.
    #[must_use]
    pub const fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Returns the fixed [`Parameter`]s, indexed by base signature position.
    #[must_use]
    pub const fn fixed_parameters(&self) -> &BTreeMap<usize, Parameter> {
        &self.fixed
    }

    /// Builds the values of a call to the base signature.
    ///
    /// `parents` lists the shortcuts traversed from this one towards the
    /// base signature, nearest first. Their fixed values are applied
    /// farthest first, then the shortcut's own ones, so the nearest
    /// definition of a position wins. The remaining positions are filled
    /// in order with the values of `binding`.
    #[must_use]
    pub fn values(&self, binding: &Binding, parents: &[Arc<Shortcut>]) -> Vec<Value> {
        let mut fixed = BTreeMap::new();
        for parent in parents.iter().rev() {
            for (index, parameter) in &parent.fixed {
                let _ = fixed.insert(*index, parameter.reset_value());
            }
        }
        for (index, parameter) in &self.fixed {
            let _ = fixed.insert(*index, parameter.reset_value());
        }

        let mut free = binding.values().iter();
        (0..binding.len() + fixed.len())
            .map(|index| match fixed.get(&index) {
                Some(value) => (*value).clone(),
                None => free.next().cloned().unwrap_or(Value::Null),
            })
            .collect()
    }

    /// Returns the `JSON` description of the [`Shortcut`].
    #[must_use]
    pub fn describe(&self) -> Value {
        let mut description = self.signature.describe();
        if let Some(object) = description.as_object_mut() {
            let fixed = self
                .fixed
                .iter()
                .map(|(index, parameter)| {
                    json!({
                        "index": index,
                        "name": parameter.name(),
                        "value": parameter.reset_value(),
                    })
                })
                .collect::<Vec<_>>();
            let _ = object.insert("fixed".into(), Value::Array(fixed));
        }
        description
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::method::MethodType;
    use crate::parameter::{Parameter, ParameterKind};

    use super::Shortcut;

    #[test]
    fn single_shortcut() {
        let shortcut = Shortcut::new(
            MethodType::get(),
            vec![Parameter::new("filter", ParameterKind::Any)],
        )
        .with_fixed(0, "attribute", ParameterKind::String, "value");

        let binding = shortcut
            .signature()
            .valid_parameters(&[json!("all")])
            .unwrap();
        assert_eq!(
            shortcut.values(&binding, &[]),
            vec![json!("value"), json!("all")]
        );
    }

    #[test]
    fn shortcut_override_layering() {
        // Base signature (a, b, c).
        let first = Arc::new(
            Shortcut::new(
                MethodType::act(),
                vec![
                    Parameter::new("a", ParameterKind::Any),
                    Parameter::new("c", ParameterKind::Any),
                ],
            )
            .with_fixed(1, "b", ParameterKind::String, "X"),
        );
        let second = Shortcut::new(MethodType::act(), vec![Parameter::new("c", ParameterKind::Any)])
            .with_fixed(0, "a", ParameterKind::String, "Y");

        for c in [json!(1), json!("c"), json!({"deep": true})] {
            let binding = second
                .signature()
                .valid_parameters(std::slice::from_ref(&c))
                .unwrap();
            assert_eq!(
                second.values(&binding, &[first.clone()]),
                vec![json!("Y"), json!("X"), c]
            );
        }
    }

    #[test]
    fn nearest_fixed_value_wins() {
        let far = Arc::new(
            Shortcut::new(MethodType::set(), Vec::new())
                .with_fixed(0, "a", ParameterKind::String, "far")
                .with_fixed(1, "b", ParameterKind::String, "far"),
        );
        let near = Arc::new(
            Shortcut::new(MethodType::set(), Vec::new()).with_fixed(1, "b", ParameterKind::String, "near"),
        );
        let shortcut = Shortcut::new(MethodType::set(), Vec::new());

        let binding = shortcut.signature().default_binding();
        assert_eq!(
            shortcut.values(&binding, &[near, far]),
            vec![json!("far"), json!("near")]
        );
    }

    #[test]
    fn shortcut_description() {
        let shortcut = Shortcut::new(MethodType::get(), Vec::new()).with_fixed(
            0,
            "attribute",
            ParameterKind::String,
            "value",
        );

        assert_eq!(
            shortcut.describe(),
            json!({
                "name": "GET",
                "parameters": [],
                "fixed": [{"index": 0, "name": "attribute", "value": "value"}],
            })
        );
    }
}
