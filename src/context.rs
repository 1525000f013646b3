//! Execution-scoped context propagation for asynchronous call chains.
//!
//! A request handler establishes a [`QueryContext`] once with
//! [`with_context`]; every query issued while that future (and anything it
//! awaits) runs can recover it through [`current_context`], with no
//! parameter threading in between. Handing work to `tokio::spawn` crosses a
//! task boundary where task-locals do not flow, so the spawned future is
//! wrapped in [`propagate`], which snapshots the association at spawn time.
//!
//! Internally each established scope gets a process-monotonic id, carried in
//! a tokio task-local, keying a single process-wide map of live contexts.
//! The entry is removed when the scope's future completes or is dropped, so
//! the map size always tracks the number of live scopes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;

use crate::tags::{names, TagMap, TagSource};

tokio::task_local! {
    static CURRENT_SCOPE: ScopeId;
}

/// Identifier of one established context scope. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ScopeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

static STORE: Lazy<Mutex<HashMap<ScopeId, Arc<QueryContext>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn store() -> MutexGuard<'static, HashMap<ScopeId, Arc<QueryContext>>> {
    // A poisoned store still holds consistent data; insert/remove/lookup
    // never panic mid-operation.
    STORE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes the scope's entry when the scoped future finishes or is dropped.
struct ScopeGuard(ScopeId);

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        store().remove(&self.0);
    }
}

async fn enter<F: Future>(ctx: Arc<QueryContext>, fut: F) -> F::Output {
    let id = ScopeId::next();
    CURRENT_SCOPE
        .scope(id, async move {
            // Registered before `fut` is first polled, so the association is
            // visible from the child's very first instruction.
            store().insert(id, ctx);
            let _guard = ScopeGuard(id);
            fut.await
        })
        .await
}

/// Run `fut` with `ctx` as the ambient query context.
///
/// Call once per logical request or operation, at its entry point. The
/// association lives exactly as long as `fut`: it is visible from every
/// `.await` point inside, and removed when `fut` returns or is cancelled.
pub async fn with_context<F: Future>(ctx: QueryContext, fut: F) -> F::Output {
    enter(Arc::new(ctx), fut).await
}

/// The context of the currently executing scope, if any.
///
/// Returns `None` outside any [`with_context`] scope (for example at process
/// top level). That is an expected state, not an error.
pub fn current_context() -> Option<Arc<QueryContext>> {
    CURRENT_SCOPE
        .try_with(|id| store().get(id).cloned())
        .ok()
        .flatten()
}

/// Replace the context of the currently executing scope.
///
/// Last write wins. Returns the stored value so the call can be used inline.
/// Outside any scope there is nothing to associate with and the value is
/// returned unregistered.
pub fn set_context(ctx: QueryContext) -> Arc<QueryContext> {
    let ctx = Arc::new(ctx);
    if let Ok(id) = CURRENT_SCOPE.try_with(|id| *id) {
        store().insert(id, Arc::clone(&ctx));
    }
    ctx
}

/// Carry the current context across a task boundary.
///
/// Snapshots the association at the moment `propagate` is called (not when
/// the returned future is first polled) and re-establishes it as a new scope
/// around `fut`:
///
/// ```rust,ignore
/// tokio::spawn(propagate(async move {
///     // current_context() here matches the spawning scope
/// }));
/// ```
///
/// The child scope shares the parent's value (`Arc`, not a deep copy) but
/// has its own lifetime; the parent finishing first does not strip the child
/// of its context. Without a current context, `fut` runs unscoped.
pub fn propagate<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    let inherited = current_context();
    async move {
        match inherited {
            Some(ctx) => enter(ctx, fut).await,
            None => fut.await,
        }
    }
}

/// Number of live context scopes in the process.
///
/// Diagnostic: a steadily growing value while the set of in-flight
/// operations is stable indicates a scope leak.
pub fn active_contexts() -> usize {
    store().len()
}

/// Immutable per-request metadata carried to every query issued within a
/// scope.
///
/// Built once at the request entry point; the canonical fields map onto the
/// tag names in [`crate::tags::names`], and arbitrary extension tags can be
/// attached with [`QueryContext::with_tag`].
///
/// # Example
///
/// ```rust
/// use sea_orm_commenter::QueryContext;
///
/// let ctx = QueryContext::new()
///     .with_traceparent("00-5bd66ef5095369c7b0d1f8f4bd33716a-c532cb4098ac3dd2-01")
///     .with_controller("orders")
///     .with_action("create");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    traceparent: Option<String>,
    tracestate: Option<String>,
    controller: Option<String>,
    action: Option<String>,
    route: Option<String>,
    framework: Option<String>,
    application: Option<String>,
    extra: TagMap,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format a W3C `traceparent` value from raw trace and span identifiers.
    ///
    /// The identifiers are treated as opaque; no span is created or managed
    /// here.
    pub fn w3c_traceparent(trace_id: &str, span_id: &str, sampled: bool) -> String {
        format!("00-{trace_id}-{span_id}-{:02x}", u8::from(sampled))
    }

    pub fn with_traceparent(mut self, value: impl Into<String>) -> Self {
        self.traceparent = Some(value.into());
        self
    }

    pub fn with_tracestate(mut self, value: impl Into<String>) -> Self {
        self.tracestate = Some(value.into());
        self
    }

    pub fn with_controller(mut self, value: impl Into<String>) -> Self {
        self.controller = Some(value.into());
        self
    }

    pub fn with_action(mut self, value: impl Into<String>) -> Self {
        self.action = Some(value.into());
        self
    }

    pub fn with_route(mut self, value: impl Into<String>) -> Self {
        self.route = Some(value.into());
        self
    }

    pub fn with_framework(mut self, value: impl Into<String>) -> Self {
        self.framework = Some(value.into());
        self
    }

    pub fn with_application(mut self, value: impl Into<String>) -> Self {
        self.application = Some(value.into());
        self
    }

    /// Attach a framework-specific extension tag.
    pub fn with_tag(
        mut self,
        name: impl Into<String>,
        value: impl Into<crate::tags::TagValue>,
    ) -> Self {
        self.extra.set(name, value);
        self
    }

    pub fn traceparent(&self) -> Option<&str> {
        self.traceparent.as_deref()
    }

    pub fn tracestate(&self) -> Option<&str> {
        self.tracestate.as_deref()
    }
}

impl TagSource for QueryContext {
    fn tags(&self) -> TagMap {
        let mut tags = self.extra.clone();
        let fields = [
            (names::TRACEPARENT, &self.traceparent),
            (names::TRACESTATE, &self.tracestate),
            (names::CONTROLLER, &self.controller),
            (names::ACTION, &self.action),
            (names::ROUTE, &self.route),
            (names::FRAMEWORK, &self.framework),
            (names::APPLICATION, &self.application),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                tags.set(name, value.as_str());
            }
        }
        tags
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(trace_id: &str) -> QueryContext {
        QueryContext::new().with_traceparent(trace_id)
    }

    #[tokio::test]
    async fn test_no_context_outside_any_scope() {
        let _lock = test_support::lock_scopes().await;
        assert!(current_context().is_none());
    }

    #[tokio::test]
    async fn test_context_visible_across_awaits() {
        let _lock = test_support::lock_scopes().await;

        async fn deeply_nested() -> Option<Arc<QueryContext>> {
            tokio::task::yield_now().await;
            current_context()
        }

        let observed = with_context(ctx("T1"), async {
            tokio::task::yield_now().await;
            deeply_nested().await
        })
        .await;

        assert_eq!(observed.unwrap().traceparent(), Some("T1"));
        assert!(current_context().is_none());
    }

    #[tokio::test]
    async fn test_propagate_into_spawned_task() {
        let _lock = test_support::lock_scopes().await;

        let observed = with_context(ctx("T1"), async {
            let parent = current_context().unwrap();
            let handle = tokio::spawn(propagate(async {
                // Multi-level: a grandchild task inherits through the child.
                tokio::spawn(propagate(async { current_context() }))
                    .await
                    .unwrap()
            }));
            let child = handle.await.unwrap().unwrap();
            // Shared value, not a deep copy.
            assert!(Arc::ptr_eq(&parent, &child));
            child
        })
        .await;

        assert_eq!(observed.traceparent(), Some("T1"));
    }

    #[tokio::test]
    async fn test_spawn_without_propagate_sees_nothing() {
        let _lock = test_support::lock_scopes().await;

        let observed = with_context(ctx("T1"), async {
            tokio::spawn(async { current_context() }).await.unwrap()
        })
        .await;

        assert!(observed.is_none());
    }

    #[tokio::test]
    async fn test_sibling_isolation() {
        let _lock = test_support::lock_scopes().await;

        async fn churn(expected: &str) {
            for _ in 0..32 {
                tokio::task::yield_now().await;
                let seen = current_context().unwrap();
                assert_eq!(seen.traceparent(), Some(expected));
            }
        }

        tokio::join!(
            with_context(ctx("T1"), churn("T1")),
            with_context(ctx("T2"), churn("T2")),
        );
    }

    #[tokio::test]
    async fn test_sibling_without_context_sees_none() {
        let _lock = test_support::lock_scopes().await;

        tokio::join!(
            with_context(ctx("T1"), async {
                tokio::task::yield_now().await;
                assert!(current_context().is_some());
            }),
            async {
                tokio::task::yield_now().await;
                assert!(current_context().is_none());
            },
        );
    }

    #[tokio::test]
    async fn test_set_context_last_write_wins() {
        let _lock = test_support::lock_scopes().await;

        with_context(ctx("T1"), async {
            set_context(ctx("T2"));
            let stored = set_context(ctx("T3"));
            assert_eq!(stored.traceparent(), Some("T3"));
            assert_eq!(current_context().unwrap().traceparent(), Some("T3"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_set_context_outside_scope_registers_nothing() {
        let _lock = test_support::lock_scopes().await;

        let baseline = active_contexts();
        let stored = set_context(ctx("T1"));
        assert_eq!(stored.traceparent(), Some("T1"));
        assert!(current_context().is_none());
        assert_eq!(active_contexts(), baseline);
    }

    #[tokio::test]
    async fn test_entries_are_collected_when_scopes_end() {
        let _lock = test_support::lock_scopes().await;

        let baseline = active_contexts();
        with_context(ctx("T1"), async {
            assert_eq!(active_contexts(), baseline + 1);

            let inside_child = tokio::spawn(propagate(async { active_contexts() }))
                .await
                .unwrap();
            assert_eq!(inside_child, baseline + 2);

            // Child finished; its entry must already be gone.
            assert_eq!(active_contexts(), baseline + 1);
        })
        .await;

        assert_eq!(active_contexts(), baseline);
    }

    #[tokio::test]
    async fn test_interleaved_scopes_stay_isolated_and_collected() {
        let _lock = test_support::lock_scopes().await;

        let baseline = active_contexts();
        let mut handles = Vec::new();
        for n in 0..16 {
            let expected = format!("T{n}");
            handles.push(tokio::spawn(with_context(ctx(&expected), async move {
                for _ in 0..8 {
                    tokio::task::yield_now().await;
                    let own = current_context().unwrap();
                    assert_eq!(own.traceparent(), Some(expected.as_str()));

                    let inherited = tokio::spawn(propagate(async { current_context() }))
                        .await
                        .unwrap()
                        .unwrap();
                    assert_eq!(inherited.traceparent(), Some(expected.as_str()));
                }
            })));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(active_contexts(), baseline);
    }

    #[tokio::test]
    async fn test_cancelled_scope_is_collected() {
        let _lock = test_support::lock_scopes().await;

        let baseline = active_contexts();
        let handle = tokio::spawn(with_context(ctx("T1"), async {
            std::future::pending::<()>().await;
        }));
        tokio::task::yield_now().await;
        handle.abort();
        let _ = handle.await;

        assert_eq!(active_contexts(), baseline);
    }

    #[test]
    fn test_w3c_traceparent_format() {
        let tp = QueryContext::w3c_traceparent(
            "5bd66ef5095369c7b0d1f8f4bd33716a",
            "c532cb4098ac3dd2",
            true,
        );
        assert_eq!(tp, "00-5bd66ef5095369c7b0d1f8f4bd33716a-c532cb4098ac3dd2-01");

        let unsampled = QueryContext::w3c_traceparent("a", "b", false);
        assert!(unsampled.ends_with("-00"));
    }

    #[test]
    fn test_context_tags_cover_canonical_fields() {
        let tags = QueryContext::new()
            .with_traceparent("tp")
            .with_route("/polls/:id")
            .with_tag("job_id", "42")
            .tags();

        assert_eq!(tags.len(), 3);
        assert!(tags.get(names::TRACEPARENT).is_some());
        assert!(tags.get(names::ROUTE).is_some());
        assert!(tags.get("job_id").is_some());
        assert!(tags.get(names::CONTROLLER).is_none());
    }
}
