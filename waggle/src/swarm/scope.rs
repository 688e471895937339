//! Task-scoped execution identifiers.
//!
//! Each `execute` call installs an [`ExecutionScope`] for the duration of its
//! future. Nested swarms (a tool starting another swarm) stack naturally: the
//! inner scope sees the outer swarm id as its parent, and the outer scope is
//! restored when the inner future completes.

/// Identifiers for the current `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionScope {
    /// Unique id of this `execute` call.
    pub execution_id: String,
    /// Id of the executing swarm.
    pub swarm_id: String,
    /// Id of the enclosing swarm, for nested execution.
    pub parent_swarm_id: Option<String>,
}

tokio::task_local! {
    static SCOPE: ExecutionScope;
}

/// The scope installed on the current task, if any.
#[must_use]
pub fn current() -> Option<ExecutionScope> {
    SCOPE.try_with(Clone::clone).ok()
}

/// Run `future` with `scope` installed, restoring the previous scope after.
pub async fn enter<F>(scope: ExecutionScope, future: F) -> F::Output
where
    F: Future,
{
    SCOPE.scope(scope, future).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(id: &str, parent: Option<&str>) -> ExecutionScope {
        ExecutionScope {
            execution_id: format!("exec-{id}"),
            swarm_id: id.to_string(),
            parent_swarm_id: parent.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn scope_is_task_local() {
        assert!(current().is_none());
        enter(scope("outer", None), async {
            let seen = current().expect("scope installed");
            assert_eq!(seen.swarm_id, "outer");
        })
        .await;
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn nested_scopes_restore_outer() {
        enter(scope("outer", None), async {
            let outer = current().expect("outer");
            enter(scope("inner", Some(&outer.swarm_id)), async {
                let inner = current().expect("inner");
                assert_eq!(inner.swarm_id, "inner");
                assert_eq!(inner.parent_swarm_id.as_deref(), Some("outer"));
            })
            .await;
            // Restored after the nested call.
            let restored = current().expect("outer again");
            assert_eq!(restored.swarm_id, "outer");
            assert_eq!(restored.execution_id, outer.execution_id);
        })
        .await;
    }
}
