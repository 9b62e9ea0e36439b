use std::sync::LazyLock;

use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use serde::{Deserialize, Serialize, Serializer};

use tracing::error;

use crate::error::{Error, ErrorKind, Result};

/// Name of the method reading a resource.
pub const GET: &str = "GET";
/// Name of the method writing a resource.
pub const SET: &str = "SET";
/// Name of the method actuating a resource.
pub const ACT: &str = "ACT";
/// Name of the method subscribing to the changes of a resource.
pub const SUBSCRIBE: &str = "SUBSCRIBE";
/// Name of the method deleting a subscription.
pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
/// Name of the method describing a resource.
pub const DESCRIBE: &str = "DESCRIBE";

const BUILTIN_METHOD_TYPES: &[(&str, ResponseKind)] = &[
    (GET, ResponseKind::Get),
    (SET, ResponseKind::Set),
    (ACT, ResponseKind::Act),
    (SUBSCRIBE, ResponseKind::Subscribe),
    (UNSUBSCRIBE, ResponseKind::Unsubscribe),
    (DESCRIBE, ResponseKind::Describe),
];

static METHOD_TYPES: LazyLock<MethodTypes> = LazyLock::new(MethodTypes::builtin);

/// Response kinds.
///
/// Each kind defines how the values produced by the executors are shaped
/// into the payload of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseKind {
    /// The response of a read.
    Get,
    /// The response of a write.
    Set,
    /// The response of an actuation, listing all triggered values.
    Act,
    /// The response of a subscription.
    Subscribe,
    /// The response of a subscription removal.
    Unsubscribe,
    /// The response of a description.
    Describe,
}

/// A method type.
///
/// Method types are stored in a process-wide registry, initialized on
/// first use and never modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodType {
    name: &'static str,
    ordinal: usize,
    response_kind: ResponseKind,
}

impl core::fmt::Display for MethodType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.name.fmt(f)
    }
}

impl Serialize for MethodType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

impl MethodType {
    /// Returns the `GET` [`MethodType`].
    #[must_use]
    pub fn get() -> Self {
        Self::builtin(GET)
    }

    /// Returns the `SET` [`MethodType`].
    #[must_use]
    pub fn set() -> Self {
        Self::builtin(SET)
    }

    /// Returns the `ACT` [`MethodType`].
    #[must_use]
    pub fn act() -> Self {
        Self::builtin(ACT)
    }

    /// Returns the `SUBSCRIBE` [`MethodType`].
    #[must_use]
    pub fn subscribe() -> Self {
        Self::builtin(SUBSCRIBE)
    }

    /// Returns the `UNSUBSCRIBE` [`MethodType`].
    #[must_use]
    pub fn unsubscribe() -> Self {
        Self::builtin(UNSUBSCRIBE)
    }

    /// Returns the `DESCRIBE` [`MethodType`].
    #[must_use]
    pub fn describe() -> Self {
        Self::builtin(DESCRIBE)
    }

    /// Returns the [`MethodType`] with the given name.
    ///
    /// The return value is [`None`] when no method type with that name
    /// exists.
    #[must_use]
    #[inline]
    pub fn from_name(name: &str) -> Option<Self> {
        METHOD_TYPES.get(name)
    }

    /// Returns all [`MethodType`]s in their registration order.
    pub fn all() -> impl Iterator<Item = Self> {
        METHOD_TYPES.iter()
    }

    /// Returns the [`MethodType`] name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the [`MethodType`] ordinal, its registration position.
    #[must_use]
    pub const fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Returns the [`ResponseKind`] associated with the [`MethodType`].
    #[must_use]
    pub const fn response_kind(&self) -> ResponseKind {
        self.response_kind
    }

    fn builtin(name: &str) -> Self {
        METHOD_TYPES.types[name]
    }
}

/// A registry of [`MethodType`]s.
///
/// Ordinals are assigned in registration order.
#[derive(Debug, Clone, Default)]
pub struct MethodTypes {
    types: IndexMap<&'static str, MethodType, DefaultHashBuilder>,
}

impl MethodTypes {
    /// Creates an empty [`MethodTypes`] registry.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new [`MethodType`].
    ///
    /// # Errors
    ///
    /// An error is returned if a method type with the same name has already
    /// been registered.
    pub fn register(
        &mut self,
        name: &'static str,
        response_kind: ResponseKind,
    ) -> Result<MethodType> {
        if self.types.contains_key(name) {
            return Err(Error::new(
                ErrorKind::MethodType,
                format!("The `{name}` method type is already registered"),
            ));
        }

        let method_type = MethodType {
            name,
            ordinal: self.types.len(),
            response_kind,
        };
        let _ = self.types.insert(name, method_type);

        Ok(method_type)
    }

    /// Returns the [`MethodType`] with the given name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<MethodType> {
        self.types.get(name).copied()
    }

    /// Returns an iterator over all [`MethodType`]s.
    pub fn iter(&self) -> impl Iterator<Item = MethodType> + '_ {
        self.types.values().copied()
    }

    /// Returns the number of registered [`MethodType`]s.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Checks whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn builtin() -> Self {
        let mut types = Self::new();
        for &(name, response_kind) in BUILTIN_METHOD_TYPES {
            if let Err(e) = types.register(name, response_kind) {
                error!("Unable to register a builtin method type: {e}");
            }
        }
        types
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    use super::{BUILTIN_METHOD_TYPES, MethodType, MethodTypes, ResponseKind};

    #[test]
    fn builtin_method_types() {
        for (ordinal, (name, response_kind)) in BUILTIN_METHOD_TYPES.iter().enumerate() {
            let method_type = MethodType::from_name(name).unwrap();
            assert_eq!(method_type.name(), *name);
            assert_eq!(method_type.ordinal(), ordinal);
            assert_eq!(method_type.response_kind(), *response_kind);
        }

        assert_eq!(MethodType::all().count(), BUILTIN_METHOD_TYPES.len());
        assert_eq!(MethodType::act().response_kind(), ResponseKind::Act);
        assert_eq!(MethodType::from_name("PATCH"), None);
    }

    #[test]
    fn duplicate_method_type() {
        let mut types = MethodTypes::new();

        let read = types.register("READ", ResponseKind::Get).unwrap();
        assert_eq!(read.ordinal(), 0);

        let error = types.register("READ", ResponseKind::Get).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MethodType);

        let write = types.register("WRITE", ResponseKind::Set).unwrap();
        assert_eq!(write.ordinal(), 1);
        assert_eq!(types.len(), 2);
    }

    #[test]
    fn serialize_method_type() {
        assert_eq!(
            serde_json::to_value(MethodType::subscribe()).unwrap(),
            serde_json::json!("SUBSCRIBE")
        );
    }
}
