//! 环境作用域定位（Ambient Scope Locator）
//!
//! 借助 `tokio::task_local!` 将当前作用域绑定到逻辑执行上下文：
//! 被绑定的 future 及其内部任意深度的调用都能找到“我在哪个作用域里”，
//! 而并发执行的兄弟任务各自持有独立绑定，互不可见。
//!
//! 注意：`tokio::spawn` 出去的新任务不会继承绑定，需要时用 [`propagate`]
//! 包装，或在分发时显式给出 `scope_id`。
//!
use crate::error::{DispatchError, DispatchResult};
use crate::id::ScopeId;
use crate::registry::ScopeRegistry;
use std::future::Future;
use std::sync::Arc;

tokio::task_local! {
    static CURRENT: AmbientScope;
}

/// 一次环境绑定：作用域 id 及其所在的注册表
#[derive(Clone, Debug)]
pub struct AmbientScope {
    scope_id: ScopeId,
    registry: Arc<ScopeRegistry>,
}

impl AmbientScope {
    pub fn new(scope_id: ScopeId, registry: Arc<ScopeRegistry>) -> Self {
        Self { scope_id, registry }
    }

    pub fn scope_id(&self) -> &ScopeId {
        &self.scope_id
    }

    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }
}

/// 当前逻辑上下文绑定的作用域 id
pub fn current_scope() -> DispatchResult<ScopeId> {
    CURRENT
        .try_with(|binding| binding.scope_id.clone())
        .map_err(|_| DispatchError::NoActiveScope)
}

pub fn current_binding() -> DispatchResult<AmbientScope> {
    CURRENT
        .try_with(Clone::clone)
        .map_err(|_| DispatchError::NoActiveScope)
}

/// 在给定绑定下执行 future；结束（含取消）后自动恢复外层绑定
pub async fn with_scope<F>(binding: AmbientScope, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(binding, fut).await
}

pub fn sync_with_scope<R>(binding: AmbientScope, f: impl FnOnce() -> R) -> R {
    CURRENT.sync_scope(binding, f)
}

/// 捕获调用处的绑定（若有），使 future 在其他任务中执行时仍分发到同一作用域
pub fn propagate<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let binding = current_binding().ok();
    async move {
        match binding {
            Some(binding) => CURRENT.scope(binding, fut).await,
            None => fut.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn binding(id: &str) -> AmbientScope {
        AmbientScope::new(ScopeId::from(id), Arc::new(ScopeRegistry::new()))
    }

    #[tokio::test]
    async fn unbound_context_reports_no_active_scope() {
        assert!(matches!(
            current_scope(),
            Err(DispatchError::NoActiveScope)
        ));
    }

    #[tokio::test]
    async fn nested_binding_shadows_and_restores() {
        with_scope(binding("outer"), async {
            assert_eq!(current_scope().unwrap().as_str(), "outer");
            with_scope(binding("inner"), async {
                assert_eq!(current_scope().unwrap().as_str(), "inner");
            })
            .await;
            assert_eq!(current_scope().unwrap().as_str(), "outer");
        })
        .await;
        assert!(current_scope().is_err());
    }

    #[tokio::test]
    async fn sync_binding_is_visible_inside_closure() {
        let id = sync_with_scope(binding("sync"), || current_scope().unwrap());
        assert_eq!(id.as_str(), "sync");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_tasks_see_their_own_binding() {
        let mut set = tokio::task::JoinSet::new();
        for i in 0..16u64 {
            set.spawn(with_scope(binding(&i.to_string()), async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                tokio::task::yield_now().await;
                (i, current_scope().unwrap())
            }));
        }
        while let Some(res) = set.join_next().await {
            let (i, seen) = res.unwrap();
            assert_eq!(seen, ScopeId::from(i));
        }
    }

    #[tokio::test]
    async fn spawned_task_needs_propagation() {
        with_scope(binding("parent"), async {
            let plain = tokio::spawn(async { current_scope().is_ok() });
            assert!(!plain.await.unwrap());

            let carried = tokio::spawn(propagate(async { current_scope().unwrap() }));
            assert_eq!(carried.await.unwrap().as_str(), "parent");
        })
        .await;
    }
}
