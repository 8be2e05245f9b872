//! 作用域注册表（ScopeRegistry）
//!
//! 进程级的 `scope_id → 队列` 查找表：
//! - `register`：作用域进入时登记，同一 id 同时只能有一条存活队列；
//! - `lookup`：分发时查找，绝不隐式创建；
//! - `unregister`：作用域结束后移除，幂等。
//!
//! 注册表只持有队列的弱引用，队列生命周期完全归属于 `EventScope`。
//!
use crate::error::{DispatchError, DispatchResult};
use crate::id::ScopeId;
use crate::queue::EventQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::{Arc, LazyLock, Weak};

static GLOBAL: LazyLock<Arc<ScopeRegistry>> = LazyLock::new(|| Arc::new(ScopeRegistry::new()));

#[derive(Debug, Default)]
pub struct ScopeRegistry {
    scopes: DashMap<ScopeId, Weak<EventQueue>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级共享实例，未显式指定注册表的分发器与自由函数 `dispatch*` 均使用它
    pub fn global() -> Arc<ScopeRegistry> {
        GLOBAL.clone()
    }

    pub(crate) fn register(&self, queue: &Arc<EventQueue>) -> DispatchResult<()> {
        match self.scopes.entry(queue.scope_id().clone()) {
            Entry::Occupied(mut entry) => {
                // 作用域被放弃且未注销时会留下失效条目，可直接覆盖
                if entry.get().strong_count() > 0 {
                    return Err(DispatchError::DuplicateScope {
                        scope_id: queue.scope_id().clone(),
                    });
                }
                entry.insert(Arc::downgrade(queue));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::downgrade(queue));
            }
        }
        Ok(())
    }

    pub(crate) fn lookup(&self, scope_id: &ScopeId) -> DispatchResult<Arc<EventQueue>> {
        self.scopes
            .get(scope_id)
            .and_then(|weak| weak.upgrade())
            .ok_or_else(|| DispatchError::UnknownScope {
                scope_id: scope_id.clone(),
            })
    }

    /// 仅当条目仍指向该队列（或已失效）时移除，避免误删同 id 的后继作用域
    pub(crate) fn release(&self, queue: &Arc<EventQueue>) -> bool {
        self.scopes
            .remove_if(queue.scope_id(), |_, weak| {
                std::ptr::eq(weak.as_ptr(), Arc::as_ptr(queue)) || weak.strong_count() == 0
            })
            .is_some()
    }

    /// 按 id 移除条目；已不存在时为 no-op，返回是否实际移除
    pub fn unregister(&self, scope_id: &ScopeId) -> bool {
        self.scopes.remove(scope_id).is_some()
    }

    /// 该 id 当前是否有存活队列
    pub fn is_live(&self, scope_id: &ScopeId) -> bool {
        self.lookup(scope_id).is_ok()
    }

    /// 存活作用域数量
    pub fn len(&self) -> usize {
        self.scopes
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 含失效条目在内的原始条目数
    #[cfg(test)]
    pub(crate) fn entries(&self) -> usize {
        self.scopes.len()
    }
}
