
use serde::Serialize;

use serde_json::{Value, json};

use crate::config::{DrainOrder, MethodConfig};
use crate::error::Error;
use crate::method::{MethodType, ResponseKind};

/// Code of a successful invocation.
pub const NO_ERROR_CODE: i32 = 0;
/// Code of a call that cannot be served by the targeted method.
pub const BAD_REQUEST_ERROR_CODE: i32 = 400;
/// Code of a call to an inaccessible method or a read-only value.
pub const FORBIDDEN_ERROR_CODE: i32 = 403;
/// Code of a call matching no registered signature.
pub const NOT_FOUND_ERROR_CODE: i32 = 404;
/// Code of a failed invocation without a more specific code.
pub const UNKNOWN_ERROR_CODE: i32 = 520;

const TRIGGERED_KEY: &str = "triggered";

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Every executor completed.
    Success,
    /// At least one failure was recorded, or the call could not be resolved.
    Error,
}

/// A failure recorded during an invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionFailure {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
}

impl ExecutionFailure {
    /// Creates an [`ExecutionFailure`] without a trace.
    #[must_use]
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: None,
        }
    }

    // The trace is the backtrace of the place where the error was created.
    fn capture(error: &Error) -> Self {
        Self {
            message: error.to_string(),
            trace: error.backtrace().map(ToString::to_string),
        }
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the stack trace text, if any.
    #[must_use]
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }
}

/// The per-invocation accumulator of results and failures.
///
/// A fresh builder is handed to the executors of every call. Executors
/// read the call parameters, push results, and can set an explicit
/// payload or status code.
#[derive(Debug)]
pub struct ResponseBuilder {
    method: MethodType,
    path: String,
    parameters: Vec<Value>,
    results: Vec<Value>,
    result: Option<Value>,
    failures: Vec<ExecutionFailure>,
    status_code: Option<i32>,
    exit_on_error: bool,
    drain_order: DrainOrder,
}

impl ResponseBuilder {
    /// Creates a [`ResponseBuilder`] for a call with the given parameters.
    #[must_use]
    pub fn new(method: MethodType, path: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self::with_config(method, path, parameters, &MethodConfig::default())
    }

    pub(crate) fn with_config(
        method: MethodType,
        path: impl Into<String>,
        parameters: Vec<Value>,
        config: &MethodConfig,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            parameters,
            results: Vec::new(),
            result: None,
            failures: Vec::new(),
            status_code: None,
            exit_on_error: config.is_exit_on_error(),
            drain_order: config.result_order(),
        }
    }

    /// Returns the [`MethodType`] of the call.
    #[must_use]
    pub const fn method_type(&self) -> MethodType {
        self.method
    }

    /// Returns the path of the invoked element.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the call parameters, in base signature order.
    #[must_use]
    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    /// Returns the call parameter at the given index.
    #[must_use]
    pub fn parameter(&self, index: usize) -> Option<&Value> {
        self.parameters.get(index)
    }

    /// Pushes a result onto the stack.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.results.push(value.into());
    }

    /// Pops the last pushed result.
    pub fn pop(&mut self) -> Option<Value> {
        self.results.pop()
    }

    /// Returns the pushed results, in push order.
    #[must_use]
    pub fn results(&self) -> &[Value] {
        &self.results
    }

    /// Sets the payload of the response explicitly.
    ///
    /// The `ACT` method ignores it and always lists the pushed results.
    pub fn set_result(&mut self, value: impl Into<Value>) {
        self.result = Some(value.into());
    }

    /// Sets the status code of the response.
    pub fn set_status_code(&mut self, status_code: i32) {
        self.status_code = Some(status_code);
    }

    /// Returns whether a failure stops the chain.
    #[must_use]
    pub const fn exit_on_error(&self) -> bool {
        self.exit_on_error
    }

    /// Sets whether a failure stops the chain.
    pub fn set_exit_on_error(&mut self, exit_on_error: bool) {
        self.exit_on_error = exit_on_error;
    }

    /// Returns the failures recorded so far.
    #[must_use]
    pub fn failures(&self) -> &[ExecutionFailure] {
        &self.failures
    }

    pub(crate) fn register_failure(&mut self, error: &Error) {
        self.failures.push(ExecutionFailure::capture(error));
    }

    /// Turns the builder into an immutable [`Response`].
    #[must_use]
    pub fn into_response(self) -> Response {
        let status = if self.failures.is_empty() {
            Status::Success
        } else {
            Status::Error
        };
        let status_code = self.status_code.unwrap_or(match status {
            Status::Success => NO_ERROR_CODE,
            Status::Error => UNKNOWN_ERROR_CODE,
        });

        let payload = match self.method.response_kind() {
            ResponseKind::Act => {
                let mut results = self.results;
                if self.drain_order == DrainOrder::Lifo {
                    results.reverse();
                }
                json!({ TRIGGERED_KEY: results })
            }
            // The top of the stack is the last pushed value.
            _ => self
                .result
                .or_else(|| self.results.last().cloned())
                .unwrap_or(Value::Null),
        };

        Response {
            method: self.method,
            uri: self.path,
            status_code,
            status,
            payload,
            errors: (!self.failures.is_empty()).then_some(self.failures),
        }
    }
}

/// The immutable outcome of an invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(rename = "type")]
    method: MethodType,
    uri: String,
    status_code: i32,
    status: Status,
    #[serde(rename = "response")]
    payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<ExecutionFailure>>,
}

impl Response {
    /// Creates an error [`Response`] produced without running any executor.
    #[must_use]
    pub fn error(
        method: MethodType,
        path: impl Into<String>,
        status_code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            method,
            uri: path.into(),
            status_code,
            status: Status::Error,
            payload: Value::Null,
            errors: Some(vec![ExecutionFailure::new(message)]),
        }
    }

    /// Returns the [`MethodType`] of the call.
    #[must_use]
    pub const fn method_type(&self) -> MethodType {
        self.method
    }

    /// Returns the path of the invoked element.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.uri
    }

    /// Returns the [`Status`].
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Returns the status code.
    #[must_use]
    pub const fn status_code(&self) -> i32 {
        self.status_code
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the recorded failures.
    #[must_use]
    pub fn errors(&self) -> &[ExecutionFailure] {
        self.errors.as_deref().unwrap_or_default()
    }

    /// Checks whether the invocation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Consumes the [`Response`] and returns its payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use std::backtrace::Backtrace;

    use serde_json::json;

    use crate::config::{DrainOrder, MethodConfig};
    use crate::error::Error;
    use crate::method::MethodType;

    use super::{
        FORBIDDEN_ERROR_CODE, NO_ERROR_CODE, NOT_FOUND_ERROR_CODE, Response, ResponseBuilder,
        Status, UNKNOWN_ERROR_CODE,
    };

    const PATH: &str = "/lamp/light/state";

    #[test]
    fn act_payload() {
        let mut builder = ResponseBuilder::new(MethodType::act(), PATH, vec![json!("dev1")]);
        builder.push("first");
        builder.push("second");

        let response = builder.into_response();
        assert!(response.is_success());
        assert_eq!(response.status_code(), NO_ERROR_CODE);
        assert_eq!(
            response.payload(),
            &json!({"triggered": ["first", "second"]})
        );
        assert!(response.errors().is_empty());
    }

    #[test]
    fn lifo_act_payload() {
        let config = MethodConfig::new().drain_order(DrainOrder::Lifo);
        let mut builder = ResponseBuilder::with_config(MethodType::act(), PATH, Vec::new(), &config);
        builder.push("first");
        builder.push("second");

        assert_eq!(
            builder.into_response().payload(),
            &json!({"triggered": ["second", "first"]})
        );
    }

    #[test]
    fn get_payload() {
        let mut builder = ResponseBuilder::new(MethodType::get(), PATH, Vec::new());
        assert_eq!(builder.results().len(), 0);
        builder.push(1);
        builder.push(2);
        assert_eq!(builder.into_response().payload(), &json!(2));

        let mut builder = ResponseBuilder::new(MethodType::get(), PATH, Vec::new());
        builder.push(1);
        builder.set_result(json!({"value": 42}));
        assert_eq!(builder.into_response().payload(), &json!({"value": 42}));

        let builder = ResponseBuilder::new(MethodType::describe(), PATH, Vec::new());
        assert!(builder.into_response().payload().is_null());
    }

    #[test]
    fn failure_response() {
        let mut builder = ResponseBuilder::new(MethodType::set(), PATH, Vec::new());
        builder.register_failure(&Error::execution("Read-only attribute"));

        let response = builder.into_response();
        assert_eq!(response.status(), Status::Error);
        assert_eq!(response.status_code(), UNKNOWN_ERROR_CODE);
        assert_eq!(
            response.errors()[0].message(),
            "Execution: Read-only attribute"
        );

        let mut builder = ResponseBuilder::new(MethodType::set(), PATH, Vec::new());
        builder.set_status_code(FORBIDDEN_ERROR_CODE);
        builder.register_failure(&Error::execution("Read-only attribute"));
        assert_eq!(builder.into_response().status_code(), FORBIDDEN_ERROR_CODE);
    }

    #[test]
    fn failure_trace_comes_from_the_error() {
        let error = Error::execution("Valve stuck").with_backtrace(Backtrace::force_capture());
        let expected = error.backtrace().map(ToString::to_string);
        assert!(expected.is_some());

        let mut builder = ResponseBuilder::new(MethodType::act(), PATH, Vec::new());
        builder.register_failure(&error);
        assert_eq!(builder.failures()[0].trace(), expected.as_deref());

        let mut builder = ResponseBuilder::new(MethodType::act(), PATH, Vec::new());
        builder.register_failure(
            &Error::execution("Valve stuck").with_backtrace(Backtrace::disabled()),
        );
        assert_eq!(builder.failures()[0].trace(), None);
    }

    #[test]
    fn serialize_response() {
        let mut builder = ResponseBuilder::new(MethodType::get(), PATH, Vec::new());
        builder.set_result("on");
        assert_eq!(
            serde_json::to_value(builder.into_response()).unwrap(),
            json!({
                "type": "GET",
                "uri": PATH,
                "statusCode": 0,
                "status": "SUCCESS",
                "response": "on",
            })
        );

        let response = Response::error(
            MethodType::get(),
            PATH,
            NOT_FOUND_ERROR_CODE,
            "Unknown signature",
        );
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({
                "type": "GET",
                "uri": PATH,
                "statusCode": 404,
                "status": "ERROR",
                "response": null,
                "errors": [{"message": "Unknown signature"}],
            })
        );
    }
}
