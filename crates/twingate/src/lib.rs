//! The access-method dispatch engine of the `twingate` gateway.
//!
//! A resource exposes its features through access methods such as `GET`,
//! `SET`, or `ACT`. This crate provides APIs to:
//!
//! - Declare method signatures, ordered lists of typed parameters whose
//!   values can be restricted through constraints.
//! - Specialize a signature through shortcuts, which pin some of its
//!   parameters to constants and can be layered over other shortcuts.
//! - Attach chains of executors to a signature, the units of work run when
//!   the signature is invoked.
//! - Invoke a method with a list of values, resolving the matching
//!   signature and running its chain into a structured response.
//!
//! Signatures are immutable templates: every invocation validates its
//! values into a fresh binding and runs on a snapshot of the executor
//! chain, so a method registry can be shared among threads and invoked
//! concurrently.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Method registry configuration.
pub mod config;
/// Constraints restricting parameter values.
pub mod constraint;
/// Error management.
pub mod error;
/// Executors and their insertion policies.
pub mod executor;
/// Method types.
pub mod method;
/// Signature parameters.
pub mod parameter;
/// The registry of an access method and its dispatch engine.
pub mod registry;
/// Invocation responses and their builder.
pub mod response;
/// Signatures specialized by fixed parameters.
pub mod shortcut;
/// Method signatures and their per-call bindings.
pub mod signature;
