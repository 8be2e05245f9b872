//! 事件分发器（EventDispatcher）
//!
//! 在作用域边界上编排“入队 → 结束 → drain”：
//! - `enter`/`run`/`run_in`：创建并登记作用域队列，绑定环境作用域；
//! - `dispatch*`：向作用域队列尾部追加事件，不调用任何处理器；
//! - 作用域结束（无论成功、非成功结果、panic 或被取消）后，按 FIFO 顺序
//!   将全部事件投递给每个处理器，然后注销作用域；
//! - 单次 (事件, 处理器) 失败只记录，不影响其余投递，也不回传给工作单元。
//!
use crate::ambient;
use crate::config::{DispatcherConfig, DrainMode, dispatch_disabled};
use crate::error::{DispatchError, DispatchResult, HandlerError};
use crate::event::Event;
use crate::handler::{EventHandler, HandlerRegistry, RegisteredHandler};
use crate::id::ScopeId;
use crate::queue::EventQueue;
use crate::registry::ScopeRegistry;
use crate::scope::EventScope;
use bon::Builder;
use futures_util::{FutureExt, StreamExt, stream};
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

// 导入由 bon::Builder 生成的 typestate 模块与状态转换别名
use self::event_dispatcher_builder::{IsUnset, SetHandlers, State as BuilderState};

/// EventDispatcher：
/// - 持有构造时注册的处理器（只读，跨作用域共享）
/// - 作用域队列登记在 `registry` 中（默认为进程级注册表）
/// - 后台 drain 与脱离作用域的分发由 `tracker` 跟踪，可通过 `flush` 等待
#[derive(Builder)]
pub struct EventDispatcher {
    #[builder(setters(vis = "pub(crate)"))]
    handlers: HandlerRegistry,
    #[builder(default = ScopeRegistry::global())]
    registry: Arc<ScopeRegistry>,
    #[builder(default)]
    config: DispatcherConfig,
    #[builder(skip)]
    tracker: TaskTracker,
    #[builder(skip)]
    flushing: Mutex<()>,
}

// 受 typestate 限制，`event_handlers(...)` 只能调用一次。
impl<S: BuilderState> EventDispatcherBuilder<S> {
    pub fn event_handlers(
        self,
        handlers: Vec<Arc<dyn EventHandler>>,
    ) -> EventDispatcherBuilder<SetHandlers<S>>
    where
        <S as BuilderState>::Handlers: IsUnset,
    {
        self.handlers(HandlerRegistry::new(handlers))
    }
}

impl EventDispatcher {
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }

    /// 以显式 id 进入作用域；同 id 已存活时返回 `DuplicateScope`
    pub fn enter(self: &Arc<Self>, scope_id: ScopeId) -> DispatchResult<EventScope> {
        let queue = Arc::new(EventQueue::new(scope_id));
        self.registry.register(&queue)?;
        queue.activate();
        debug!(scope_id = %queue.scope_id(), "event scope entered");

        Ok(EventScope::new(queue, self.clone()))
    }

    /// 以自动生成的 id 进入作用域
    pub fn enter_generated(self: &Arc<Self>) -> EventScope {
        loop {
            if let Ok(scope) = self.enter(ScopeId::generate()) {
                return scope;
            }
        }
    }

    /// 在新作用域中执行工作单元，原样返回其结果
    pub async fn run<F>(self: &Arc<Self>, work: F) -> F::Output
    where
        F: Future,
    {
        let scope = self.enter_generated();
        self.complete(scope, work).await
    }

    /// 在显式 id 的作用域中执行工作单元；仅在进入作用域失败时返回错误（此时工作单元不会执行）
    pub async fn run_in<F>(self: &Arc<Self>, scope_id: ScopeId, work: F) -> DispatchResult<F::Output>
    where
        F: Future,
    {
        let scope = self.enter(scope_id)?;
        Ok(self.complete(scope, work).await)
    }

    async fn complete<F>(&self, scope: EventScope, work: F) -> F::Output
    where
        F: Future,
    {
        let outcome = AssertUnwindSafe(scope.bind(work)).catch_unwind().await;

        match self.config.drain_mode {
            DrainMode::Background => scope.close(),
            DrainMode::Inline => {
                scope.drain().await;
            }
        }

        match outcome {
            Ok(output) => output,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// 分发到当前环境作用域（在本分发器的注册表中查找）
    pub fn dispatch<P>(&self, name: impl Into<String>, payload: P) -> DispatchResult<()>
    where
        P: Serialize,
    {
        self.dispatch_with(name, payload, None)
    }

    /// 分发到显式 id 的作用域，不经过环境定位
    pub fn dispatch_to<P>(
        &self,
        scope_id: &ScopeId,
        name: impl Into<String>,
        payload: P,
    ) -> DispatchResult<()>
    where
        P: Serialize,
    {
        self.dispatch_with(name, payload, Some(scope_id))
    }

    pub fn dispatch_with<P>(
        &self,
        name: impl Into<String>,
        payload: P,
        scope_id: Option<&ScopeId>,
    ) -> DispatchResult<()>
    where
        P: Serialize,
    {
        if dispatch_disabled() {
            return Ok(());
        }

        let scope_id = match scope_id {
            Some(id) => id.clone(),
            None => ambient::current_scope()?,
        };
        let queue = self.registry.lookup(&scope_id)?;
        queue.push(Event::from_serialize(name, payload)?)
    }

    /// 不经过作用域，立即在后台任务中将事件投递给全部处理器。
    ///
    /// 适用于作用域之外（例如处理器内部的链式事件）。
    pub fn dispatch_detached<P>(&self, name: impl Into<String>, payload: P) -> DispatchResult<()>
    where
        P: Serialize,
    {
        if dispatch_disabled() {
            return Ok(());
        }

        let event = Event::from_serialize(name, payload)?;
        let runtime = Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;
        let handlers = self.handlers.clone();
        let concurrency = self.config.handler_concurrency;

        runtime.spawn(self.tracker.track_future(async move {
            deliver(&handlers, None, &[event], concurrency).await;
        }));
        Ok(())
    }

    /// 等待所有后台 drain 与脱离作用域的投递完成
    ///
    /// 并发调用按顺序执行：`close → wait → reopen` 不可交错。
    pub async fn flush(&self) {
        let _guard = self.flushing.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// 仍在进行中的后台任务数量
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// 投递已取出的事件，随后关闭并注销作用域
    pub(crate) async fn finish_drain(&self, queue: &Arc<EventQueue>, events: Vec<Event>) -> DrainReport {
        let report = deliver(
            &self.handlers,
            Some(queue.scope_id()),
            &events,
            self.config.handler_concurrency,
        )
        .await;

        queue.finish();
        self.registry.release(queue);
        debug!(
            scope_id = %queue.scope_id(),
            events = report.events,
            deliveries = report.deliveries,
            failed = report.failures.len(),
            "event scope drained"
        );
        report
    }

    /// 放弃 drain（无可用运行时）：关闭并注销作用域
    pub(crate) fn abandon(&self, queue: &Arc<EventQueue>) {
        queue.finish();
        self.registry.release(queue);
    }
}

/// 一次 drain 的结果
#[derive(Clone, Debug, Default)]
pub struct DrainReport {
    /// 脱离作用域的投递为 `None`
    pub scope_id: Option<ScopeId>,
    pub events: usize,
    /// 实际尝试的 (事件, 处理器) 投递次数，含失败
    pub deliveries: usize,
    pub failures: Vec<HandlerError>,
}

impl DrainReport {
    pub(crate) fn empty(scope_id: ScopeId) -> Self {
        Self {
            scope_id: Some(scope_id),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// 每个处理器按 FIFO 顺序消费全部事件；不同处理器之间最多 `concurrency` 个并发。
async fn deliver(
    handlers: &HandlerRegistry,
    scope_id: Option<&ScopeId>,
    events: &[Event],
    concurrency: usize,
) -> DrainReport {
    let mut report = DrainReport {
        scope_id: scope_id.cloned(),
        events: events.len(),
        ..Default::default()
    };
    if events.is_empty() || handlers.is_empty() {
        return report;
    }

    let deliveries: Vec<_> = handlers
        .iter()
        .map(|registered| deliver_one(registered, scope_id, events))
        .collect();
    let per_handler: Vec<(usize, Vec<HandlerError>)> = stream::iter(deliveries)
        .buffered(concurrency.clamp(1, handlers.len()))
        .collect()
        .await;

    for (attempted, failures) in per_handler {
        report.deliveries += attempted;
        report.failures.extend(failures);
    }
    report
}

// 单个处理器按 FIFO 顺序消费其关注的事件，返回尝试次数与失败记录
async fn deliver_one(
    registered: &RegisteredHandler,
    scope_id: Option<&ScopeId>,
    events: &[Event],
) -> (usize, Vec<HandlerError>) {
    let mut attempted = 0;
    let mut failures = Vec::new();

    for event in events {
        if !registered.accepts(event) {
            continue;
        }
        attempted += 1;
        if let Err(err) = invoke(registered.handler.as_ref(), event).await {
            warn!(
                scope_id = ?scope_id,
                handler = %err.handler,
                event = %err.event,
                reason = %err.reason,
                "event handler failed"
            );
            failures.push(err);
        }
    }
    (attempted, failures)
}

async fn invoke(handler: &dyn EventHandler, event: &Event) -> Result<(), HandlerError> {
    let reason = match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => format!("{err:#}"),
        Err(panic) => panic_message(panic.as_ref()),
    };

    Err(HandlerError {
        handler: handler.handler_name().to_string(),
        event: event.name().to_string(),
        reason,
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}
