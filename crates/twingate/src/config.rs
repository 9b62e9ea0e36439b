use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The order in which pushed results are drained into a response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainOrder {
    /// Results keep the order in which executors pushed them.
    #[default]
    Fifo,
    /// The last pushed result comes first.
    Lifo,
}

/// The configuration of a method registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodConfig {
    exit_on_error: bool,
    drain_order: DrainOrder,
    serialize_invocations: bool,
}

impl Default for MethodConfig {
    fn default() -> Self {
        Self {
            exit_on_error: true,
            drain_order: DrainOrder::Fifo,
            serialize_invocations: false,
        }
    }
}

impl MethodConfig {
    /// Creates a [`MethodConfig`] with the default settings.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a [`MethodConfig`] from a `JSON` document.
    ///
    /// Missing fields keep their default value.
    ///
    /// # Errors
    ///
    /// An error is returned when the document is not a valid configuration.
    pub fn from_json(document: &str) -> Result<Self> {
        serde_json::from_str(document).map_err(Into::into)
    }

    /// Sets whether an executor failure stops the chain.
    #[must_use]
    #[inline]
    pub const fn exit_on_error(mut self, exit_on_error: bool) -> Self {
        self.exit_on_error = exit_on_error;
        self
    }

    /// Sets the [`DrainOrder`] of the results.
    #[must_use]
    #[inline]
    pub const fn drain_order(mut self, drain_order: DrainOrder) -> Self {
        self.drain_order = drain_order;
        self
    }

    /// Sets whether invocations of a registry run one at a time.
    #[must_use]
    #[inline]
    pub const fn serialize_invocations(mut self, serialize_invocations: bool) -> Self {
        self.serialize_invocations = serialize_invocations;
        self
    }

    /// Returns whether an executor failure stops the chain.
    #[must_use]
    pub const fn is_exit_on_error(&self) -> bool {
        self.exit_on_error
    }

    /// Returns the [`DrainOrder`].
    #[must_use]
    pub const fn result_order(&self) -> DrainOrder {
        self.drain_order
    }

    /// Returns whether invocations run one at a time.
    #[must_use]
    pub const fn is_serialized(&self) -> bool {
        self.serialize_invocations
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    use super::{DrainOrder, MethodConfig};

    #[test]
    fn default_config() {
        let config = MethodConfig::default();

        assert!(config.is_exit_on_error());
        assert_eq!(config.result_order(), DrainOrder::Fifo);
        assert!(!config.is_serialized());
    }

    #[test]
    fn json_config() {
        let config = MethodConfig::from_json(r#"{"drain_order": "lifo"}"#).unwrap();
        assert_eq!(
            config,
            MethodConfig::new().drain_order(DrainOrder::Lifo)
        );

        let config = MethodConfig::from_json(
            r#"{"exit_on_error": false, "serialize_invocations": true}"#,
        )
        .unwrap();
        assert!(!config.is_exit_on_error());
        assert!(config.is_serialized());

        assert_eq!(
            MethodConfig::from_json(r#"{"drain_order": "random"}"#)
                .unwrap_err()
                .kind(),
            ErrorKind::Json
        );
    }
}
