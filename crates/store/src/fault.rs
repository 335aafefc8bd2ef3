//! Failure injection for the in-memory stores.

use std::fmt;

use tokio::sync::Mutex;

use crate::error::{Result, StoreError};

/// Store operation a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::UpdateStatus => "update_status",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    namespace: Option<String>,
    error: StoreError,
    remaining: Option<usize>,
}

impl Fault {
    fn matches(&self, operation: Operation, namespace: &str) -> bool {
        self.operation == operation
            && self.namespace.as_deref().is_none_or(|ns| ns == namespace)
    }
}

/// Programmable failures consulted before each store operation.
#[derive(Debug, Default)]
pub struct FaultInjector {
    faults: Mutex<Vec<Fault>>,
}

impl FaultInjector {
    /// Create an injector with no faults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every matching operation until cleared.
    ///
    /// `namespace` of `None` matches any namespace.
    pub async fn fail(&self, operation: Operation, namespace: Option<&str>, error: StoreError) {
        self.push(operation, namespace, error, None).await;
    }

    /// Fail the next `times` matching operations.
    pub async fn fail_times(
        &self,
        operation: Operation,
        namespace: Option<&str>,
        error: StoreError,
        times: usize,
    ) {
        if times > 0 {
            self.push(operation, namespace, error, Some(times)).await;
        }
    }

    /// Remove every fault.
    pub async fn clear(&self) {
        self.faults.lock().await.clear();
    }

    /// Return the injected error for this operation, if any.
    ///
    /// # Errors
    ///
    /// Returns the first matching fault's error.
    pub async fn check(&self, operation: Operation, namespace: &str) -> Result<()> {
        let mut faults = self.faults.lock().await;
        let Some(pos) = faults.iter().position(|f| f.matches(operation, namespace)) else {
            return Ok(());
        };

        let Some(fault) = faults.get_mut(pos) else {
            return Ok(());
        };

        let error = fault.error.clone();
        let exhausted = fault.remaining.as_mut().is_some_and(|n| {
            *n = n.saturating_sub(1);
            *n == 0
        });
        if exhausted {
            faults.remove(pos);
        }
        Err(error)
    }

    async fn push(
        &self,
        operation: Operation,
        namespace: Option<&str>,
        error: StoreError,
        remaining: Option<usize>,
    ) {
        self.faults.lock().await.push(Fault {
            operation,
            namespace: namespace.map(str::to_string),
            error,
            remaining,
        });
    }
}
