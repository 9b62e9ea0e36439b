use std::sync::{Arc, Weak};

use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use parking_lot::{Mutex, RwLock};

use serde_json::{Value, json};

use tokio::sync::mpsc::Receiver;

use tracing::debug;

use twingate::config::MethodConfig;
use twingate::error::{Error, Result};
use twingate::executor::{ExecutionPolicy, Executor};
use twingate::method::MethodType;
use twingate::parameter::{Modifiable, Parameter, ParameterKind};
use twingate::registry::MethodRegistry;
use twingate::response::{
    BAD_REQUEST_ERROR_CODE, FORBIDDEN_ERROR_CODE, NOT_FOUND_ERROR_CODE, Response,
    ResponseBuilder,
};
use twingate::shortcut::Shortcut;

use crate::attribute::{Attribute, AttributeUpdate, DEFAULT_ATTRIBUTE};
use crate::subscription::Subscriptions;

pub use crate::subscription::SUBSCRIPTION_CAPACITY;

const ATTRIBUTE: &str = "attribute";
const VALUE: &str = "value";
const SUBSCRIPTION_ID: &str = "subscriptionId";

fn fail(builder: &mut ResponseBuilder, status_code: i32, info: String) -> Result<()> {
    builder.set_status_code(status_code);
    Err(Error::execution(info))
}

// Executors only hold a weak reference, the registries belong to the state.
fn executor<F>(state: &Weak<ResourceState>, work: F) -> impl Executor + 'static
where
    F: Fn(&ResourceState, &mut ResponseBuilder) -> Result<()> + Send + Sync + 'static,
{
    let state = state.clone();
    move |builder: &mut ResponseBuilder| -> Result<()> {
        let state = state
            .upgrade()
            .ok_or_else(|| Error::execution("The resource has been dropped"))?;
        work(state.as_ref(), builder)
    }
}

struct ResourceState {
    path: String,
    attributes: RwLock<IndexMap<String, Attribute, DefaultHashBuilder>>,
    subscriptions: Mutex<Subscriptions>,
    methods: IndexMap<&'static str, MethodRegistry, DefaultHashBuilder>,
}

impl ResourceState {
    fn attribute_name(builder: &ResponseBuilder) -> String {
        builder
            .parameter(0)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ATTRIBUTE)
            .to_owned()
    }

    fn read(&self, builder: &mut ResponseBuilder) -> Result<()> {
        let name = Self::attribute_name(builder);
        let Some(payload) = self.attributes.read().get(&name).map(Attribute::read) else {
            return fail(
                builder,
                NOT_FOUND_ERROR_CODE,
                format!("Unknown `{name}` attribute"),
            );
        };

        builder.set_result(payload);
        Ok(())
    }

    fn write(&self, builder: &mut ResponseBuilder) -> Result<()> {
        let name = Self::attribute_name(builder);
        let value = builder.parameter(1).cloned().unwrap_or(Value::Null);

        let update = {
            let mut attributes = self.attributes.write();
            let Some(attribute) = attributes.get_mut(&name) else {
                return fail(
                    builder,
                    NOT_FOUND_ERROR_CODE,
                    format!("Unknown `{name}` attribute"),
                );
            };
            if attribute.modifiable() == Modifiable::Fixed {
                return fail(
                    builder,
                    FORBIDDEN_ERROR_CODE,
                    format!("The `{name}` attribute is read-only"),
                );
            }
            if !attribute.accepts(&value) {
                return fail(
                    builder,
                    BAD_REQUEST_ERROR_CODE,
                    format!("The `{name}` attribute expects a `{}` value", attribute.kind()),
                );
            }

            attribute.update(value);
            builder.set_result(attribute.read());
            AttributeUpdate::new(&self.path, attribute)
        };

        debug!("The `{name}` attribute of `{}` has changed", self.path);
        self.subscriptions.lock().notify(&update);
        Ok(())
    }

    fn subscribe(&self, builder: &mut ResponseBuilder) -> Result<()> {
        let name = Self::attribute_name(builder);
        if !self.attributes.read().contains_key(&name) {
            return fail(
                builder,
                NOT_FOUND_ERROR_CODE,
                format!("Unknown `{name}` attribute"),
            );
        }

        let id = self.subscriptions.lock().subscribe(&name);
        builder.set_result(json!({ SUBSCRIPTION_ID: id }));
        Ok(())
    }

    fn unsubscribe(&self, builder: &mut ResponseBuilder) -> Result<()> {
        let id = builder
            .parameter(0)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        if !self.subscriptions.lock().unsubscribe(&id) {
            return fail(
                builder,
                NOT_FOUND_ERROR_CODE,
                format!("Unknown `{id}` subscription"),
            );
        }

        builder.set_result(json!({ SUBSCRIPTION_ID: id }));
        Ok(())
    }

    fn describe(&self, builder: &mut ResponseBuilder) -> Result<()> {
        let description = json!({
            "path": self.path,
            "attributes": self.attributes.read().values().cloned().collect::<Vec<_>>(),
            "accessMethods": self
                .methods
                .values()
                .map(MethodRegistry::describe)
                .collect::<Vec<_>>(),
        });
        builder.set_result(description);
        Ok(())
    }
}

fn default_attribute_shortcut(method: MethodType, free: Vec<Parameter>) -> Shortcut {
    Shortcut::new(method, free).with_fixed(0, ATTRIBUTE, ParameterKind::String, DEFAULT_ATTRIBUTE)
}

fn register_get(registry: &MethodRegistry, state: &Weak<ResourceState>) {
    let base = registry.add_signature(&[ParameterKind::String], &[ATTRIBUTE]);
    let _ = registry.add_executor(
        &base,
        executor(state, ResourceState::read),
        ExecutionPolicy::After,
    );
    let _ = registry.add_shortcut(
        default_attribute_shortcut(MethodType::get(), Vec::new()),
        &base,
    );
}

fn register_set(registry: &MethodRegistry, state: &Weak<ResourceState>) {
    let base = registry.add_signature(
        &[ParameterKind::String, ParameterKind::Any],
        &[ATTRIBUTE, VALUE],
    );
    let _ = registry.add_executor(
        &base,
        executor(state, ResourceState::write),
        ExecutionPolicy::After,
    );
    let _ = registry.add_shortcut(
        default_attribute_shortcut(
            MethodType::set(),
            vec![Parameter::new(VALUE, ParameterKind::Any)],
        ),
        &base,
    );
}

fn register_subscribe(registry: &MethodRegistry, state: &Weak<ResourceState>) {
    let base = registry.add_signature(&[ParameterKind::String], &[ATTRIBUTE]);
    let _ = registry.add_executor(
        &base,
        executor(state, ResourceState::subscribe),
        ExecutionPolicy::After,
    );
    let _ = registry.add_shortcut(
        default_attribute_shortcut(MethodType::subscribe(), Vec::new()),
        &base,
    );
}

fn register_unsubscribe(registry: &MethodRegistry, state: &Weak<ResourceState>) {
    let base = registry.add_signature(&[ParameterKind::String], &[SUBSCRIPTION_ID]);
    let _ = registry.add_executor(
        &base,
        executor(state, ResourceState::unsubscribe),
        ExecutionPolicy::After,
    );
}

fn register_describe(registry: &MethodRegistry, state: &Weak<ResourceState>) {
    let base = registry.add_signature(&[], &[]);
    let _ = registry.add_executor(
        &base,
        executor(state, ResourceState::describe),
        ExecutionPolicy::After,
    );
}

/// A resource exposing its attributes through access methods.
///
/// A resource owns a [`MethodRegistry`] for each builtin method type and
/// registers their default signatures:
///
/// - `GET(attribute)` and `GET()`, reading an attribute
/// - `SET(attribute, value)` and `SET(value)`, writing an attribute
/// - `SUBSCRIBE(attribute)` and `SUBSCRIBE()`, watching an attribute
/// - `UNSUBSCRIBE(subscriptionId)`, removing a subscription
/// - `DESCRIBE()`, describing the resource
///
/// Calls without an attribute target the [`DEFAULT_ATTRIBUTE`].
/// The `ACT` method has no default signature, its signatures and executors
/// are added through [`Resource::method`].
#[derive(Clone)]
pub struct Resource {
    state: Arc<ResourceState>,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.state.path)
            .field("attributes", &self.state.attributes.read().len())
            .finish_non_exhaustive()
    }
}

impl Resource {
    /// Creates a [`Resource`] whose default attribute holds values of the
    /// given kind.
    #[must_use]
    pub fn new(path: impl Into<String>, kind: ParameterKind) -> Self {
        Self::with_config(path, kind, MethodConfig::default())
    }

    /// Creates a [`Resource`] whose method registries share
    /// a [`MethodConfig`].
    #[must_use]
    pub fn with_config(path: impl Into<String>, kind: ParameterKind, config: MethodConfig) -> Self {
        let path = path.into();

        let state = Arc::new_cyclic(|state: &Weak<ResourceState>| {
            let registry = |method: MethodType| {
                MethodRegistry::new(method)
                    .with_path(path.clone())
                    .with_config(config)
            };

            let get = registry(MethodType::get());
            register_get(&get, state);
            let set = registry(MethodType::set());
            register_set(&set, state);
            let act = registry(MethodType::act());
            let subscribe = registry(MethodType::subscribe());
            register_subscribe(&subscribe, state);
            let unsubscribe = registry(MethodType::unsubscribe());
            register_unsubscribe(&unsubscribe, state);
            let describe = registry(MethodType::describe());
            register_describe(&describe, state);

            let methods = [get, set, act, subscribe, unsubscribe, describe]
                .into_iter()
                .map(|registry| (registry.method_type().name(), registry))
                .collect();

            let mut attributes = IndexMap::default();
            let _ = attributes.insert(
                DEFAULT_ATTRIBUTE.to_owned(),
                Attribute::updatable(DEFAULT_ATTRIBUTE, kind),
            );

            ResourceState {
                path: path.clone(),
                attributes: RwLock::new(attributes),
                subscriptions: Mutex::new(Subscriptions::default()),
                methods,
            }
        });

        Self { state }
    }

    /// Adds an [`Attribute`], replacing an attribute with the same name.
    #[must_use]
    #[inline]
    pub fn with_attribute(self, attribute: Attribute) -> Self {
        let _ = self
            .state
            .attributes
            .write()
            .insert(attribute.name().to_owned(), attribute);
        self
    }

    /// Adds an [`Attribute`].
    ///
    /// Returns `false` if an attribute with the same name already exists.
    pub fn add_attribute(&self, attribute: Attribute) -> bool {
        let mut attributes = self.state.attributes.write();
        if attributes.contains_key(attribute.name()) {
            return false;
        }
        let _ = attributes.insert(attribute.name().to_owned(), attribute);
        true
    }

    /// Returns the resource path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.state.path
    }

    /// Returns a copy of the [`Attribute`] with the given name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<Attribute> {
        self.state.attributes.read().get(name).cloned()
    }

    /// Returns a copy of every [`Attribute`].
    #[must_use]
    pub fn attributes(&self) -> Vec<Attribute> {
        self.state.attributes.read().values().cloned().collect()
    }

    /// Returns the [`MethodRegistry`] of a method type.
    ///
    /// The return value is [`None`] for a method type that is not builtin.
    #[must_use]
    pub fn method(&self, method: MethodType) -> Option<&MethodRegistry> {
        self.state.methods.get(method.name())
    }

    /// Invokes a method with the given values.
    #[must_use]
    pub fn invoke(&self, method: MethodType, values: &[Value]) -> Response {
        match self.method(method) {
            Some(registry) => registry.invoke(values),
            None => Response::error(
                method,
                self.state.path.as_str(),
                NOT_FOUND_ERROR_CODE,
                format!("Unknown `{method}` method"),
            ),
        }
    }

    /// Reads an attribute.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Response {
        self.invoke(MethodType::get(), &[json!(attribute)])
    }

    /// Writes an attribute.
    #[must_use]
    pub fn set(&self, attribute: &str, value: impl Into<Value>) -> Response {
        self.invoke(MethodType::set(), &[json!(attribute), value.into()])
    }

    /// Actuates the resource.
    #[must_use]
    pub fn act(&self, values: &[Value]) -> Response {
        self.invoke(MethodType::act(), values)
    }

    /// Subscribes to the changes of an attribute.
    ///
    /// On success, the receiver of the [`AttributeUpdate`]s is returned
    /// along with the response.
    #[must_use]
    pub fn subscribe(
        &self,
        attribute: &str,
    ) -> (Response, Option<Receiver<AttributeUpdate>>) {
        let response = self.invoke(MethodType::subscribe(), &[json!(attribute)]);
        let receiver = response
            .payload()
            .get(SUBSCRIPTION_ID)
            .and_then(Value::as_str)
            .and_then(|id| self.take_receiver(id));
        (response, receiver)
    }

    /// Takes the receiver of a subscription created through the
    /// `SUBSCRIBE` method.
    ///
    /// Updates are buffered until the receiver is taken. A subscription
    /// buffering more than [`SUBSCRIPTION_CAPACITY`] updates is dropped,
    /// taken or not. The return value is [`None`] for an unknown
    /// subscription or a receiver already taken.
    #[must_use]
    pub fn take_receiver(&self, id: &str) -> Option<Receiver<AttributeUpdate>> {
        self.state.subscriptions.lock().take_receiver(id)
    }

    /// Removes a subscription.
    #[must_use]
    pub fn unsubscribe(&self, id: &str) -> Response {
        self.invoke(MethodType::unsubscribe(), &[json!(id)])
    }

    /// Returns the number of active subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> usize {
        self.state.subscriptions.lock().len()
    }

    /// Describes the resource.
    #[must_use]
    pub fn describe(&self) -> Response {
        self.invoke(MethodType::describe(), &[])
    }

    /// Stops every method registry and closes every subscription.
    pub fn stop(&self) {
        for registry in self.state.methods.values() {
            registry.stop();
        }
        self.state.subscriptions.lock().clear();
        debug!("The `{}` resource has been stopped", self.state.path);
    }
}
