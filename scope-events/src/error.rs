//! 统一错误定义
//!
//! 分为两类：
//! - `DispatchError`：作用域解析、注册与载荷转换失败，同步返回给调用方；
//! - `HandlerError`：处理器消费事件失败，仅在 drain 内部收集与记录，
//!   不会抛回工作单元的调用方。
//!
use crate::id::ScopeId;
use thiserror::Error;

/// 分发错误（生产者/集成方可见）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DispatchError {
    // --- 作用域解析 ---
    #[error("no active event scope in the current context")]
    NoActiveScope,
    #[error("unknown event scope: {scope_id}")]
    UnknownScope { scope_id: ScopeId },
    #[error("event scope is no longer accepting events: {scope_id}")]
    ScopeClosed { scope_id: ScopeId },

    // --- 作用域生命周期 ---
    #[error("event scope already registered: {scope_id}")]
    DuplicateScope { scope_id: ScopeId },

    // --- 载荷 ---
    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: String },

    // --- 运行时 ---
    #[error("no async runtime available for detached dispatch")]
    NoRuntime,
}

impl DispatchError {
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type DispatchResult<T> = Result<T, DispatchError>;

/// 单次 (事件, 处理器) 投递失败
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("event handler error: handler={handler}, event={event}, reason={reason}")]
pub struct HandlerError {
    pub handler: String,
    pub event: String,
    pub reason: String,
}
