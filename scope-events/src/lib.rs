//! 请求级事件分发（scope-events）
//!
//! 在一个工作单元（例如一次入站请求）的处理过程中，业务代码随时分发带载荷的
//! 命名事件；工作单元结束后（无论成功、返回非成功结果、panic 还是被取消），
//! 一组固定的处理器会按分发顺序消费全部事件，每个 (事件, 处理器) 恰好一次。
//!
//! 组成：
//! - `registry`：进程级 `scope_id → 队列` 查找表；
//! - `ambient`：基于 task-local 的环境作用域定位，免去层层传参；
//! - `dispatcher`/`scope`：作用域进入、入队与结束时的 drain；
//! - `dispatch`：面向生产者的自由函数入口；
//! - `handler`/`event`：处理器与事件契约；
//! - `config`/`error`：配置与错误类型。
//!
//! 典型用法：
//! 1. 用 `EventDispatcher::builder().event_handlers(..)` 构建分发器；
//! 2. 在传输层对每个工作单元调用 `dispatcher.run(work)`；
//! 3. 工作单元内部任意位置调用 `scope_events::dispatch(name, payload)`；
//! 4. 进程退出前调用 `dispatcher.flush()` 等待后台 drain 完成。
//!
pub mod ambient;
pub mod config;
pub mod dispatch;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handler;
pub mod id;
mod queue;
pub mod registry;
pub mod scope;

pub use config::{DispatcherConfig, DrainMode};
pub use dispatch::{dispatch, dispatch_to, dispatch_with};
pub use dispatcher::{DrainReport, EventDispatcher};
pub use error::{DispatchError, DispatchResult, HandlerError};
pub use event::{Event, Payload};
pub use handler::{EventHandler, HandledEvents};
pub use id::ScopeId;
pub use queue::ScopePhase;
pub use registry::ScopeRegistry;
pub use scope::EventScope;
