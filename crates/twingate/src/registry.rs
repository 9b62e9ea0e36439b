use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use parking_lot::{Mutex, RwLock};

use serde_json::{Value, json};

use tracing::{debug, warn};

use crate::config::MethodConfig;
use crate::constraint::Constraint;
use crate::error::{Error, Result};
use crate::executor::{ExecutionPolicy, Executor, GuardedExecutor};
use crate::method::MethodType;
use crate::parameter::{Parameter, ParameterKind};
use crate::response::{BAD_REQUEST_ERROR_CODE, NOT_FOUND_ERROR_CODE, Response, ResponseBuilder};
use crate::shortcut::Shortcut;
use crate::signature::{Binding, Signature, SignatureId};

// A panicking executor is recorded as a failure of the call.
fn run_executor(executor: &dyn Executor, builder: &mut ResponseBuilder) -> Result<()> {
    catch_unwind(AssertUnwindSafe(|| executor.execute(builder)))
        .unwrap_or_else(|payload| Err(panic_error(payload.as_ref())))
}

fn panic_error(payload: &(dyn Any + Send)) -> Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".into());
    Error::execution(format!("The executor panicked: {message}"))
}

/// An invocable entry of a [`MethodRegistry`].
#[derive(Debug, Clone)]
pub enum Callable {
    /// A signature owning an executor chain.
    Signature(Arc<Signature>),
    /// A shortcut specializing another entry.
    Shortcut(Arc<Shortcut>),
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl From<Signature> for Callable {
    fn from(signature: Signature) -> Self {
        Self::Signature(Arc::new(signature))
    }
}

impl From<Arc<Signature>> for Callable {
    fn from(signature: Arc<Signature>) -> Self {
        Self::Signature(signature)
    }
}

impl From<Shortcut> for Callable {
    fn from(shortcut: Shortcut) -> Self {
        Self::Shortcut(Arc::new(shortcut))
    }
}

impl From<Arc<Shortcut>> for Callable {
    fn from(shortcut: Arc<Shortcut>) -> Self {
        Self::Shortcut(shortcut)
    }
}

impl Callable {
    /// Returns the [`SignatureId`].
    #[must_use]
    pub fn id(&self) -> SignatureId {
        self.signature().id()
    }

    /// Returns the [`Signature`] a caller has to satisfy.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        match self {
            Self::Signature(signature) => signature,
            Self::Shortcut(shortcut) => shortcut.signature(),
        }
    }

    /// Returns the `JSON` description.
    #[must_use]
    pub fn describe(&self) -> Value {
        match self {
            Self::Signature(signature) => signature.describe(),
            Self::Shortcut(shortcut) => shortcut.describe(),
        }
    }

    fn values(&self, binding: Binding, parents: &[Arc<Shortcut>]) -> Vec<Value> {
        match self {
            Self::Signature(_) => binding.into_values(),
            Self::Shortcut(shortcut) => shortcut.values(&binding, parents),
        }
    }
}

type Resolution = (Vec<Arc<dyn Executor>>, Vec<Arc<Shortcut>>);

struct Chain {
    callable: Callable,
    executors: VecDeque<Arc<dyn Executor>>,
}

struct ShortcutEntry {
    shortcut: Arc<Shortcut>,
    target: Callable,
}

#[derive(Default)]
struct Registrations {
    chains: IndexMap<SignatureId, Chain, DefaultHashBuilder>,
    shortcuts: IndexMap<SignatureId, ShortcutEntry, DefaultHashBuilder>,
}

impl Registrations {
    fn callables(&self) -> impl Iterator<Item = Callable> + '_ {
        self.chains.values().map(|chain| chain.callable.clone()).chain(
            self.shortcuts
                .values()
                .map(|entry| Callable::Shortcut(entry.shortcut.clone())),
        )
    }

    // Direct signatures come first, then shortcuts. The first structural
    // match wins.
    fn find(
        &self,
        name: &str,
        kinds: &[ParameterKind],
        excluded: Option<SignatureId>,
    ) -> Option<Callable> {
        self.callables().find(|callable| {
            Some(callable.id()) != excluded && callable.signature().matches(name, kinds)
        })
    }

    fn max_hops(&self) -> usize {
        self.shortcuts.len() + 1
    }
}

/// The registry of an access method.
///
/// It maps each signature of a method to a chain of [`Executor`]s and each
/// [`Shortcut`] to the entry it specializes. Invocations resolve their
/// target, run the chain on a [`ResponseBuilder`], and always return
/// a [`Response`].
///
/// Registered signatures are immutable templates. Every invocation binds
/// its own values and runs on its own snapshot of the chain, so
/// concurrent invocations never share mutable state.
pub struct MethodRegistry {
    method: MethodType,
    path: String,
    config: MethodConfig,
    pre_executor: Option<Arc<dyn Executor>>,
    post_executor: Option<Arc<dyn Executor>>,
    registrations: RwLock<Registrations>,
    invocation: Mutex<()>,
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("config", &self.config)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl MethodRegistry {
    /// Creates an empty [`MethodRegistry`] for a [`MethodType`].
    #[must_use]
    pub fn new(method: MethodType) -> Self {
        Self {
            method,
            path: String::new(),
            config: MethodConfig::default(),
            pre_executor: None,
            post_executor: None,
            registrations: RwLock::new(Registrations::default()),
            invocation: Mutex::new(()),
        }
    }

    /// Sets the path of the element owning the method.
    #[must_use]
    #[inline]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the [`MethodConfig`].
    #[must_use]
    #[inline]
    pub fn with_config(mut self, config: MethodConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets an [`Executor`] run before the chain of every invocation.
    #[must_use]
    #[inline]
    pub fn with_pre_executor(mut self, executor: impl Executor + 'static) -> Self {
        self.pre_executor = Some(Arc::new(executor));
        self
    }

    /// Sets an [`Executor`] run after the chain of every invocation.
    #[must_use]
    #[inline]
    pub fn with_post_executor(mut self, executor: impl Executor + 'static) -> Self {
        self.post_executor = Some(Arc::new(executor));
        self
    }

    /// Returns the [`MethodType`].
    #[must_use]
    pub const fn method_type(&self) -> MethodType {
        self.method
    }

    /// Returns the path of the element owning the method.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the [`MethodConfig`].
    #[must_use]
    pub const fn config(&self) -> &MethodConfig {
        &self.config
    }

    /// Finds the first entry with the given parameter kinds.
    ///
    /// Direct signatures are scanned before shortcuts, each in
    /// registration order.
    #[must_use]
    pub fn find_signature(&self, kinds: &[ParameterKind]) -> Option<Callable> {
        self.registrations
            .read()
            .find(self.method.name(), kinds, None)
    }

    /// Registers a signature with the given parameter kinds and names.
    ///
    /// When an entry with the same parameter kinds already exists,
    /// that entry is returned instead.
    pub fn add_signature(&self, kinds: &[ParameterKind], names: &[&str]) -> Callable {
        let mut registrations = self.registrations.write();
        if let Some(callable) = registrations.find(self.method.name(), kinds, None) {
            return callable;
        }

        let callable = Callable::from(Signature::from_kinds(self.method, kinds, names));
        Self::insert_chain(&mut registrations, callable.clone());
        callable
    }

    /// Registers a [`Signature`].
    ///
    /// When an entry structurally equal to the signature already exists,
    /// that entry is returned instead. The return value is [`None`] when
    /// the signature belongs to another method.
    pub fn insert_signature(&self, signature: Signature) -> Option<Callable> {
        if signature.method() != self.method {
            warn!(
                "The `{}` signature cannot be registered into the `{}` method",
                signature.name(),
                self.method
            );
            return None;
        }

        let mut registrations = self.registrations.write();
        if let Some(callable) =
            registrations.find(self.method.name(), &signature.parameter_kinds(), None)
        {
            return Some(callable);
        }

        let callable = Callable::from(signature);
        Self::insert_chain(&mut registrations, callable.clone());
        Some(callable)
    }

    /// Adds an [`Executor`] to the chain serving `callable`.
    ///
    /// When `callable` is a shortcut, the executor is added to the chain of
    /// the entry it specializes, and runs only for calls whose parameters
    /// hold the values fixed along the way. An entry without a chain
    /// falls back on a structurally equal entry, or gets a new chain.
    ///
    /// Returns `false` when the executor has not been registered.
    pub fn add_executor(
        &self,
        callable: &Callable,
        executor: impl Executor + 'static,
        policy: ExecutionPolicy,
    ) -> bool {
        self.add_shared_executor(callable, Arc::new(executor), policy)
    }

    /// Adds an [`Executor`] shared with other chains.
    ///
    /// It behaves like [`MethodRegistry::add_executor`].
    pub fn add_shared_executor(
        &self,
        callable: &Callable,
        executor: Arc<dyn Executor>,
        policy: ExecutionPolicy,
    ) -> bool {
        let mut registrations = self.registrations.write();
        self.register_executor(&mut registrations, callable, executor, policy)
    }

    /// Registers a [`Shortcut`] specializing the `base` entry.
    ///
    /// The base must already own a chain or be a registered shortcut,
    /// otherwise nothing is registered and [`None`] is returned.
    pub fn add_shortcut(&self, shortcut: impl Into<Arc<Shortcut>>, base: &Callable) -> Option<Callable> {
        let shortcut = shortcut.into();
        if shortcut.signature().method() != self.method || base.signature().method() != self.method
        {
            warn!(
                "Shortcuts of the `{}` method must specialize a `{}` entry",
                self.method, self.method
            );
            return None;
        }

        let mut registrations = self.registrations.write();
        if !registrations.chains.contains_key(&base.id())
            && !registrations.shortcuts.contains_key(&base.id())
        {
            warn!(
                "Shortcut ignored: the base entry is not registered in the `{}` method",
                self.method
            );
            return None;
        }

        let _ = registrations.shortcuts.insert(
            shortcut.signature().id(),
            ShortcutEntry {
                shortcut: shortcut.clone(),
                target: base.clone(),
            },
        );

        Some(Callable::Shortcut(shortcut))
    }

    /// Invokes the first entry accepting the given values.
    ///
    /// Direct signatures are tried before shortcuts, each in registration
    /// order. A [`NOT_FOUND_ERROR_CODE`] response is returned when no entry
    /// accepts the values.
    #[must_use]
    pub fn invoke(&self, values: &[Value]) -> Response {
        let target = self
            .registrations
            .read()
            .callables()
            .find_map(|callable| {
                callable
                    .signature()
                    .valid_parameters(values)
                    .map(|binding| (callable, binding))
            });

        match target {
            Some((callable, binding)) => self.invoke_bound(&callable, binding),
            None => {
                debug!("No `{}` signature accepts the values {values:?}", self.method);
                self.unknown_signature()
            }
        }
    }

    /// Invokes an entry with its default values.
    ///
    /// Free parameters are bound to `null`.
    #[must_use]
    pub fn invoke_signature(&self, callable: &Callable) -> Response {
        self.invoke_bound(callable, callable.signature().default_binding())
    }

    /// Invokes an entry with a [`Binding`] of its parameters.
    ///
    /// A [`BAD_REQUEST_ERROR_CODE`] response is returned for an entry of
    /// another method, a [`NOT_FOUND_ERROR_CODE`] one when the entry does
    /// not resolve to a chain.
    #[must_use]
    pub fn invoke_bound(&self, callable: &Callable, binding: Binding) -> Response {
        if callable.signature().method() != self.method {
            return Response::error(
                self.method,
                self.path.as_str(),
                BAD_REQUEST_ERROR_CODE,
                format!(
                    "A `{}` signature cannot be invoked through the `{}` method",
                    callable.signature().name(),
                    self.method
                ),
            );
        }

        let _serialized = self.config.is_serialized().then(|| self.invocation.lock());

        let Some((executors, parents)) = self.resolve(callable) else {
            debug!("The `{}` signature does not resolve to a chain", self.method);
            return self.unknown_signature();
        };

        let values = callable.values(binding, &parents);
        let mut builder =
            ResponseBuilder::with_config(self.method, self.path.as_str(), values, &self.config);

        for executor in executors {
            if let Err(e) = run_executor(executor.as_ref(), &mut builder) {
                warn!("An executor of the `{}` method failed: {e}", self.method);
                builder.register_failure(&e);
                if builder.exit_on_error() {
                    break;
                }
            }
        }

        builder.into_response()
    }

    /// Removes every signature and shortcut.
    ///
    /// Any later invocation returns a [`NOT_FOUND_ERROR_CODE`] response.
    pub fn stop(&self) {
        let mut registrations = self.registrations.write();
        registrations.chains.clear();
        registrations.shortcuts.clear();
        debug!("The `{}` method of `{}` has been stopped", self.method, self.path);
    }

    /// Returns every entry, direct signatures first.
    #[must_use]
    pub fn signatures(&self) -> Vec<Callable> {
        self.registrations.read().callables().collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let registrations = self.registrations.read();
        registrations.chains.len() + registrations.shortcuts.len()
    }

    /// Checks whether the registry has no entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the `JSON` description of the method.
    #[must_use]
    pub fn describe(&self) -> Value {
        json!({
            "name": self.method.name(),
            "signatures": self
                .signatures()
                .iter()
                .map(Callable::describe)
                .collect::<Vec<_>>(),
        })
    }

    fn unknown_signature(&self) -> Response {
        Response::error(
            self.method,
            self.path.as_str(),
            NOT_FOUND_ERROR_CODE,
            "Unknown signature",
        )
    }

    fn insert_chain(registrations: &mut Registrations, callable: Callable) {
        let _ = registrations.chains.insert(
            callable.id(),
            Chain {
                callable,
                executors: VecDeque::new(),
            },
        );
    }

    fn register_executor(
        &self,
        registrations: &mut Registrations,
        callable: &Callable,
        executor: Arc<dyn Executor>,
        policy: ExecutionPolicy,
    ) -> bool {
        if callable.signature().method() != self.method {
            warn!(
                "A `{}` executor cannot be registered into the `{}` method",
                callable.signature().name(),
                self.method
            );
            return false;
        }

        let mut fixed = BTreeMap::<usize, Parameter>::new();
        let mut current = callable.clone();
        let mut hops = 0;

        if !registrations.chains.contains_key(&current.id()) {
            while let Some(entry) = registrations.shortcuts.get(&current.id()) {
                // The nearest shortcut pinning a position wins, like in `Shortcut::values`.
                for (index, parameter) in entry.shortcut.fixed_parameters() {
                    let _ = fixed.entry(*index).or_insert_with(|| parameter.clone());
                }
                current = entry.target.clone();
                hops += 1;
                if hops > registrations.max_hops() {
                    warn!("Cyclic shortcuts in the `{}` method", self.method);
                    return false;
                }
            }

            if !registrations.chains.contains_key(&current.id()) {
                let kinds = callable.signature().parameter_kinds();
                if let Some(found) =
                    registrations.find(self.method.name(), &kinds, Some(callable.id()))
                {
                    return self.register_executor(registrations, &found, executor, policy);
                }
                current = callable.clone();
                Self::insert_chain(registrations, current.clone());
            }
        }

        let executor: Arc<dyn Executor> = if fixed.is_empty() {
            executor
        } else {
            let guards = fixed
                .into_iter()
                .map(|(index, parameter)| (index, Constraint::fixed(parameter.reset_value().clone())))
                .collect();
            Arc::new(GuardedExecutor::new(executor, guards))
        };

        let Some(chain) = registrations.chains.get_mut(&current.id()) else {
            return false;
        };
        match policy {
            ExecutionPolicy::After => chain.executors.push_back(executor),
            ExecutionPolicy::Before => chain.executors.push_front(executor),
            ExecutionPolicy::Replace => {
                chain.executors.clear();
                chain.executors.push_back(executor);
            }
        }

        true
    }

    // Returns the chain snapshot and the traversed parent shortcuts.
    fn resolve(&self, callable: &Callable) -> Option<Resolution> {
        let registrations = self.registrations.read();

        let mut parents = Vec::new();
        let mut current = callable.clone();
        let mut hops = 0;
        let chain = loop {
            let Some(entry) = registrations.shortcuts.get(&current.id()) else {
                break registrations.chains.get(&current.id())?;
            };
            match &entry.target {
                Callable::Shortcut(parent) => parents.push(parent.clone()),
                Callable::Signature(_) => break registrations.chains.get(&entry.target.id())?,
            }
            current = entry.target.clone();
            hops += 1;
            if hops > registrations.max_hops() {
                warn!("Cyclic shortcuts in the `{}` method", self.method);
                return None;
            }
        };

        let executors = self
            .pre_executor
            .iter()
            .chain(chain.executors.iter())
            .chain(self.post_executor.iter())
            .cloned()
            .collect();

        Some((executors, parents))
    }
}
