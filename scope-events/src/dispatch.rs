//! 生产者入口
//!
//! 无需持有分发器即可在调用链任意深度分发事件：
//! - 未给出 `scope_id` 时，通过环境绑定定位作用域及其注册表；
//! - 给出 `scope_id` 时，绕过环境定位，直接在进程级注册表中查找。
//!
//! 解析失败（`NoActiveScope`/`UnknownScope`/`ScopeClosed`）原样返回给调用方。
//!
use crate::ambient;
use crate::config::dispatch_disabled;
use crate::error::DispatchResult;
use crate::event::Event;
use crate::id::ScopeId;
use crate::registry::ScopeRegistry;
use serde::Serialize;

/// 分发到当前环境作用域
pub fn dispatch<P>(name: impl Into<String>, payload: P) -> DispatchResult<()>
where
    P: Serialize,
{
    dispatch_with(name, payload, None)
}

/// 分发到显式 id 的作用域
pub fn dispatch_to<P>(scope_id: &ScopeId, name: impl Into<String>, payload: P) -> DispatchResult<()>
where
    P: Serialize,
{
    dispatch_with(name, payload, Some(scope_id))
}

pub fn dispatch_with<P>(
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

    let queue = match scope_id {
        Some(id) => ScopeRegistry::global().lookup(id)?,
        None => {
            let binding = ambient::current_binding()?;
            binding.registry().lookup(binding.scope_id())?
        }
    };
    queue.push(Event::from_serialize(name, payload)?)
}
