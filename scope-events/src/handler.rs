//! 事件处理器（EventHandler）
//!
//! 定义消费事件的处理逻辑与元信息（名称、关注的事件）。
//! 处理器在分发器构造时一次性注册，之后只读，且需可被多个作用域并发调用。
//!
use crate::event::Event;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub enum HandledEvents {
    One(String),
    Many(Vec<String>),
    #[default]
    All,
}

impl HandledEvents {
    pub fn accepts(&self, event_name: &str) -> bool {
        match self {
            Self::All => true,
            Self::One(name) => name == event_name,
            Self::Many(names) => names.iter().any(|n| n == event_name),
        }
    }
}

/// 事件处理器
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于失败记录与日志）
    fn handler_name(&self) -> &str;

    /// 关注的事件；默认接收全部事件
    fn handled_events(&self) -> HandledEvents {
        HandledEvents::All
    }

    /// 处理单个事件
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub(crate) struct RegisteredHandler {
    pub(crate) handler: Arc<dyn EventHandler>,
    interest: HandledEvents,
}

impl RegisteredHandler {
    pub(crate) fn accepts(&self, event: &Event) -> bool {
        self.interest.accepts(event.name())
    }
}

/// 按注册顺序保存的处理器列表
#[derive(Clone, Default)]
pub(crate) struct HandlerRegistry {
    handlers: Vec<RegisteredHandler>,
}

impl HandlerRegistry {
    pub(crate) fn new(handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|handler| RegisteredHandler {
                interest: handler.handled_events(),
                handler,
            })
            .collect();

        Self { handlers }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RegisteredHandler> {
        self.handlers.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
