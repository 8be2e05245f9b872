//! 模拟一条请求处理管线：每个请求在独立作用域中执行，
//! 业务代码只管分发事件，响应返回后由处理器统一消费。
use anyhow::Result as AnyResult;
use async_trait::async_trait;
use dashmap::DashMap;
use scope_events::{
    DispatcherConfig, Event, EventDispatcher, EventHandler, HandledEvents, ScopeId, dispatch,
    dispatch_to,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy)]
enum ShopEvent {
    CartViewed,
    OrderPlaced,
    PaymentFailed,
}

impl From<ShopEvent> for String {
    fn from(event: ShopEvent) -> Self {
        match event {
            ShopEvent::CartViewed => "cart.viewed",
            ShopEvent::OrderPlaced => "order.placed",
            ShopEvent::PaymentFailed => "payment.failed",
        }
        .to_string()
    }
}

#[derive(Serialize)]
struct OrderPlaced {
    order_id: u64,
    amount_cents: i64,
}

#[derive(Debug)]
struct Response {
    status: u16,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("payment gateway unavailable")]
    PaymentGateway,
    #[error(transparent)]
    Dispatch(#[from] scope_events::DispatchError),
}

#[derive(Debug, Clone, Copy)]
enum Route {
    Cart,
    Checkout { order_id: u64 },
    BrokenCheckout { order_id: u64 },
    NotFound,
}

// 传输层之后的业务代码：只分发，不关心由谁处理
async fn handle_request(route: Route) -> Result<Response, AppError> {
    tokio::time::sleep(Duration::from_millis(10)).await;

    match route {
        Route::Cart => {
            dispatch(ShopEvent::CartViewed, ())?;
            Ok(Response { status: 200 })
        }
        Route::Checkout { order_id } => {
            dispatch(ShopEvent::CartViewed, ())?;
            dispatch(
                ShopEvent::OrderPlaced,
                OrderPlaced {
                    order_id,
                    amount_cents: 4_200,
                },
            )?;
            Ok(Response { status: 201 })
        }
        Route::BrokenCheckout { order_id } => {
            dispatch(
                ShopEvent::PaymentFailed,
                serde_json::json!({ "order_id": order_id }),
            )?;
            Err(AppError::PaymentGateway)
        }
        Route::NotFound => Ok(Response { status: 404 }),
    }
}

/// 以日志形式审计全部事件
struct AuditLog;

#[async_trait]
impl EventHandler for AuditLog {
    fn handler_name(&self) -> &str {
        "audit_log"
    }
    async fn handle(&self, event: &Event) -> AnyResult<()> {
        info!(event = event.name(), payload = %serde_json::Value::Object(event.payload().clone()), "audit");
        Ok(())
    }
}

#[derive(Default)]
struct Metrics {
    counts: DashMap<String, usize>,
}

#[async_trait]
impl EventHandler for Metrics {
    fn handler_name(&self) -> &str {
        "metrics"
    }
    async fn handle(&self, event: &Event) -> AnyResult<()> {
        *self.counts.entry(event.name().to_string()).or_default() += 1;
        Ok(())
    }
}

/// 只关心下单事件，且下游偶尔不可用
struct OrderWebhook;

#[async_trait]
impl EventHandler for OrderWebhook {
    fn handler_name(&self) -> &str {
        "order_webhook"
    }
    fn handled_events(&self) -> HandledEvents {
        HandledEvents::One(ShopEvent::OrderPlaced.into())
    }
    async fn handle(&self, event: &Event) -> AnyResult<()> {
        let order_id = event
            .payload()
            .get("order_id")
            .and_then(|v| v.as_u64())
            .unwrap_or_default();
        if order_id % 2 == 0 {
            anyhow::bail!("webhook endpoint returned 503 for order {order_id}");
        }
        info!(order_id, "order webhook delivered");
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("scope_events=debug".parse()?),
        )
        .init();

    let metrics = Arc::new(Metrics::default());
    let dispatcher = Arc::new(
        EventDispatcher::builder()
            .event_handlers(vec![Arc::new(AuditLog), metrics.clone(), Arc::new(OrderWebhook)])
            .config(DispatcherConfig::from_env())
            .build(),
    );

    let routes = [
        Route::Cart,
        Route::Checkout { order_id: 1 },
        Route::Checkout { order_id: 2 },
        Route::BrokenCheckout { order_id: 3 },
        Route::NotFound,
    ];

    let mut requests = Vec::new();
    for route in routes {
        let dispatcher = dispatcher.clone();
        requests.push(tokio::spawn(async move {
            let outcome = dispatcher.run(handle_request(route)).await;
            (route, outcome)
        }));
    }
    for request in requests {
        let (route, outcome) = request.await?;
        match outcome {
            Ok(response) => info!(?route, status = response.status, "request finished"),
            Err(err) => info!(?route, %err, "request failed"),
        }
    }

    // 不经过请求管线：显式 id 进入作用域，分发后显式 drain
    let scope_id = ScopeId::from(1337u64);
    let scope = dispatcher.enter(scope_id.clone())?;
    dispatch_to(&scope_id, ShopEvent::CartViewed, ())?;
    let report = scope.drain().await;
    info!(events = report.events, deliveries = report.deliveries, "explicit scope drained");

    dispatcher.flush().await;

    let mut counts: Vec<(String, usize)> = metrics
        .counts
        .iter()
        .map(|e| (e.key().clone(), *e.value()))
        .collect();
    counts.sort();
    for (name, count) in counts {
        info!(event = %name, count, "metrics");
    }
    Ok(())
}
