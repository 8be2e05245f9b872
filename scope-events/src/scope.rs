//! 事件作用域（EventScope）
//!
//! 一个进行中的工作单元对应一个作用域，作用域独占其事件队列。
//! 结束方式有三种，且只会生效一次：
//! - `drain().await`：在分发器跟踪的任务中投递并等待，返回 `DrainReport`；
//!   等待方被取消时投递照常完成；
//! - `close()`：在分发器跟踪的后台任务中投递；
//! - 直接丢弃（例如外层 future 被取消）：等同于 `close()`。
//!
use crate::ambient::{self, AmbientScope};
use crate::config::dispatch_disabled;
use crate::dispatcher::{DrainReport, EventDispatcher};
use crate::error::DispatchResult;
use crate::event::Event;
use crate::id::ScopeId;
use crate::queue::{EventQueue, ScopePhase};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::error;

pub struct EventScope {
    queue: Arc<EventQueue>,
    dispatcher: Arc<EventDispatcher>,
    finished: bool,
}

impl EventScope {
    pub(crate) fn new(queue: Arc<EventQueue>, dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            queue,
            dispatcher,
            finished: false,
        }
    }

    pub fn id(&self) -> &ScopeId {
        self.queue.scope_id()
    }

    pub fn phase(&self) -> ScopePhase {
        self.queue.phase()
    }

    /// 尚未 drain 的事件数
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// 直接向本作用域入队
    pub fn dispatch<P>(&self, name: impl Into<String>, payload: P) -> DispatchResult<()>
    where
        P: Serialize,
    {
        if dispatch_disabled() {
            return Ok(());
        }
        self.queue.push(Event::from_serialize(name, payload)?)
    }

    pub fn ambient(&self) -> AmbientScope {
        AmbientScope::new(self.id().clone(), self.dispatcher.registry().clone())
    }

    /// 以本作用域为环境绑定执行 future
    pub async fn bind<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        ambient::with_scope(self.ambient(), fut).await
    }

    /// 结束作用域并等待全部事件投递完成
    pub async fn drain(mut self) -> DrainReport {
        self.finished = true;
        let Some(events) = self.queue.begin_drain() else {
            return DrainReport::empty(self.id().clone());
        };
        let Ok(runtime) = Handle::try_current() else {
            return self.dispatcher.finish_drain(&self.queue, events).await;
        };

        match self.spawn_drain(&runtime, events).await {
            Ok(report) => report,
            Err(err) => {
                error!(scope_id = %self.id(), %err, "event scope drain task failed");
                self.dispatcher.abandon(&self.queue);
                DrainReport::empty(self.id().clone())
            }
        }
    }

    /// 结束作用域并在后台投递，立即返回
    pub fn close(mut self) {
        self.close_in_background();
    }

    fn close_in_background(&mut self) {
        if std::mem::replace(&mut self.finished, true) {
            return;
        }
        let Some(events) = self.queue.begin_drain() else {
            return;
        };

        match Handle::try_current() {
            Ok(runtime) => {
                self.spawn_drain(&runtime, events);
            }
            Err(_) => {
                error!(
                    scope_id = %self.id(),
                    lost = events.len(),
                    "no async runtime left to drain event scope, events dropped"
                );
                self.dispatcher.abandon(&self.queue);
            }
        }
    }

    fn spawn_drain(&self, runtime: &Handle, events: Vec<Event>) -> JoinHandle<DrainReport> {
        let queue = self.queue.clone();
        let dispatcher = self.dispatcher.clone();
        let task = async move { dispatcher.finish_drain(&queue, events).await };
        runtime.spawn(self.dispatcher.tracker().track_future(task))
    }
}

impl Drop for EventScope {
    fn drop(&mut self) {
        self.close_in_background();
    }
}

impl std::fmt::Debug for EventScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventScope")
            .field("id", self.id())
            .field("phase", &self.phase())
            .field("queued", &self.queued())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DispatcherConfig, DrainMode};
    use crate::error::DispatchError;
    use crate::handler::EventHandler;
    use crate::registry::ScopeRegistry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[async_trait]
    impl EventHandler for Counter {
        fn handler_name(&self) -> &str {
            "counter"
        }
        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn setup() -> (Arc<EventDispatcher>, Arc<Counter>) {
        let counter = Arc::new(Counter::default());
        let dispatcher = Arc::new(
            EventDispatcher::builder()
                .event_handlers(vec![counter.clone()])
                .registry(Arc::new(ScopeRegistry::new()))
                .config(DispatcherConfig {
                    drain_mode: DrainMode::Background,
                    handler_concurrency: 4,
                })
                .build(),
        );
        (dispatcher, counter)
    }

    #[tokio::test]
    async fn phases_follow_lifecycle() {
        let (d, _) = setup();
        let scope = d.enter(ScopeId::from("life")).unwrap();
        assert_eq!(scope.phase(), ScopePhase::Active);

        scope.dispatch("a", ()).unwrap();
        assert_eq!(scope.queued(), 1);

        let queue = scope.queue.clone();
        scope.drain().await;
        assert_eq!(queue.phase(), ScopePhase::Closed);
    }

    #[tokio::test]
    async fn close_drains_in_background() {
        let (d, counter) = setup();
        let scope = d.enter(ScopeId::from("bg")).unwrap();
        for _ in 0..3 {
            scope.dispatch("tick", ()).unwrap();
        }
        scope.close();

        d.flush().await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
        assert!(d.registry().is_empty());
    }

    #[tokio::test]
    async fn dropped_scope_still_drains() {
        let (d, counter) = setup();
        {
            let scope = d.enter(ScopeId::from("dropped")).unwrap();
            scope.dispatch("orphan", ()).unwrap();
        }
        d.flush().await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_into_draining_scope_is_rejected() {
        let (d, _) = setup();
        let scope = d.enter(ScopeId::from("closing")).unwrap();
        let id = scope.id().clone();
        let queue = scope.queue.clone();

        queue.begin_drain();
        let err = d.dispatch_to(&id, "late", ()).unwrap_err();
        assert!(matches!(err, DispatchError::ScopeClosed { .. }));

        // 已进入 Draining 的作用域不会被第二次 drain
        let report = scope.drain().await;
        assert_eq!(report.events, 0);
    }

    #[test]
    fn scope_dropped_without_runtime_is_released() {
        let (d, counter) = setup();
        let scope = d.enter(ScopeId::from("no-rt")).unwrap();
        scope.dispatch("lost", ()).unwrap();
        drop(scope);

        assert!(d.registry().is_empty());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }
}
