use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use serde_json::{Value, json};

use twingate::parameter::{Modifiable, ParameterKind};

/// Name of the attribute every resource owns.
pub const DEFAULT_ATTRIBUTE: &str = "value";

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// A named and typed value of a resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    name: String,
    #[serde(rename = "type")]
    kind: ParameterKind,
    value: Value,
    timestamp: u64,
    modifiable: Modifiable,
}

impl Attribute {
    /// Creates an [`Attribute`] whose value can be set.
    ///
    /// Its value is `null` until the first update.
    #[must_use]
    #[inline]
    pub fn updatable(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value: Value::Null,
            timestamp: 0,
            modifiable: Modifiable::Updatable,
        }
    }

    /// Creates a read-only [`Attribute`].
    #[must_use]
    #[inline]
    pub fn fixed(name: impl Into<String>, kind: ParameterKind, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            value: value.into(),
            timestamp: now_millis(),
            modifiable: Modifiable::Fixed,
        }
    }

    /// Sets the initial value of an [`Attribute`].
    #[must_use]
    #[inline]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.update(value.into());
        self
    }

    /// Returns the [`Attribute`] name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the [`ParameterKind`] of the value.
    #[must_use]
    pub const fn kind(&self) -> ParameterKind {
        self.kind
    }

    /// Returns the value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the time of the last update, in milliseconds since the
    /// Unix epoch.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Returns the [`Modifiable`] mode.
    #[must_use]
    pub const fn modifiable(&self) -> Modifiable {
        self.modifiable
    }

    /// Checks whether a value fits the [`Attribute`] kind.
    ///
    /// A `null` value is always accepted.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        value.is_null() || self.kind.accepts(value)
    }

    /// Returns the `JSON` payload of a read.
    #[must_use]
    pub fn read(&self) -> Value {
        json!({
            "name": self.name,
            "type": self.kind,
            "value": self.value,
            "timestamp": self.timestamp,
        })
    }

    pub(crate) fn update(&mut self, value: Value) {
        self.value = value;
        self.timestamp = now_millis();
    }
}

/// A notification sent to subscribers when an attribute changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeUpdate {
    path: String,
    attribute: String,
    value: Value,
    timestamp: u64,
}

impl AttributeUpdate {
    pub(crate) fn new(path: &str, attribute: &Attribute) -> Self {
        Self {
            path: path.into(),
            attribute: attribute.name.clone(),
            value: attribute.value.clone(),
            timestamp: attribute.timestamp,
        }
    }

    /// Returns the path of the resource.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the name of the changed attribute.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Returns the new value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the time of the change, in milliseconds since the Unix epoch.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }
}
