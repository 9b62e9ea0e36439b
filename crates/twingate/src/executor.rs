use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constraint::Constraint;
use crate::error::Result;
use crate::response::ResponseBuilder;

/// Where an executor is inserted into the chain of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionPolicy {
    /// Runs before the executors already registered.
    Before,
    /// Runs after the executors already registered.
    #[default]
    After,
    /// Replaces every executor already registered.
    Replace,
}

/// A unit of work run when a signature is invoked.
///
/// An executor reads the call parameters from the [`ResponseBuilder`] and
/// pushes its results onto it. Returning an error records a failure in
/// the response.
pub trait Executor: Send + Sync {
    /// Performs the unit of work.
    ///
    /// # Errors
    ///
    /// Any error is recorded as a failure of the invocation.
    fn execute(&self, builder: &mut ResponseBuilder) -> Result<()>;
}

impl<F> Executor for F
where
    F: Fn(&mut ResponseBuilder) -> Result<()> + Send + Sync,
{
    fn execute(&self, builder: &mut ResponseBuilder) -> Result<()> {
        self(builder)
    }
}

// Runs the inner executor only when every guarded parameter matches.
pub(crate) struct GuardedExecutor {
    executor: Arc<dyn Executor>,
    guards: BTreeMap<usize, Constraint>,
}

impl GuardedExecutor {
    pub(crate) const fn new(
        executor: Arc<dyn Executor>,
        guards: BTreeMap<usize, Constraint>,
    ) -> Self {
        Self { executor, guards }
    }

    fn admits(&self, builder: &ResponseBuilder) -> bool {
        self.guards.iter().all(|(index, guard)| {
            builder
                .parameter(*index)
                .is_some_and(|value| guard.complies(value))
        })
    }
}

impl Executor for GuardedExecutor {
    fn execute(&self, builder: &mut ResponseBuilder) -> Result<()> {
        if self.admits(builder) {
            self.executor.execute(builder)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use serde_json::json;

    use crate::constraint::Constraint;
    use crate::error::{Error, Result};
    use crate::method::MethodType;
    use crate::response::ResponseBuilder;

    use super::{ExecutionPolicy, Executor, GuardedExecutor};

    fn builder(parameters: Vec<serde_json::Value>) -> ResponseBuilder {
        ResponseBuilder::new(MethodType::act(), "/sensor/light", parameters)
    }

    #[test]
    fn closure_executor() {
        let executor = |builder: &mut ResponseBuilder| -> Result<()> {
            builder.push(json!("ok"));
            Ok(())
        };

        let mut builder = builder(Vec::new());
        executor.execute(&mut builder).unwrap();
        assert_eq!(builder.pop(), Some(json!("ok")));
    }

    #[test]
    fn guarded_executor() {
        let executor: Arc<dyn Executor> =
            Arc::new(|builder: &mut ResponseBuilder| -> Result<()> {
                builder.push(json!("guarded"));
                Ok(())
            });
        let guards = BTreeMap::from([(0, Constraint::fixed("on"))]);
        let guarded = GuardedExecutor::new(executor, guards);

        let mut matching = builder(vec![json!("on")]);
        guarded.execute(&mut matching).unwrap();
        assert_eq!(matching.pop(), Some(json!("guarded")));

        let mut other = builder(vec![json!("off")]);
        guarded.execute(&mut other).unwrap();
        assert_eq!(other.pop(), None);

        // A missing parameter never satisfies a guard.
        let mut missing = builder(Vec::new());
        guarded.execute(&mut missing).unwrap();
        assert_eq!(missing.pop(), None);
    }

    #[test]
    fn failing_executor() {
        let executor =
            |_: &mut ResponseBuilder| -> Result<()> { Err(Error::execution("Device offline")) };

        let mut builder = builder(Vec::new());
        assert_eq!(
            executor.execute(&mut builder),
            Err(Error::execution("Device offline"))
        );
    }

    #[test]
    fn execution_policy() {
        assert_eq!(ExecutionPolicy::default(), ExecutionPolicy::After);
        assert_eq!(
            serde_json::to_value(ExecutionPolicy::Replace).unwrap(),
            json!("REPLACE")
        );
    }
}
