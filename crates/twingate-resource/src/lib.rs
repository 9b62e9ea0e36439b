//! Resources of the `twingate` gateway.
//!
//! A resource is a virtualized sensor or actuator endpoint. It owns a set of
//! attributes and exposes them through the access methods of the `twingate`
//! dispatch engine, one method registry per builtin method type.
//!
//! Attribute changes are pushed to subscribers over `tokio` channels, so
//! asynchronous consumers can await them while invocations stay synchronous.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Resource attributes and their change notifications.
pub mod attribute;
/// Resources and their default access methods.
pub mod resource;

mod subscription;
