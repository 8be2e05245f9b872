//! 作用域事件队列
//!
//! 每个作用域独占一条 FIFO 队列，并以状态机约束其生命周期：
//! `Created → Active → Draining → Closed`。
//! 只有 `Active` 状态接受入队；`Active → Draining` 的转换只会成功一次，
//! 从结构上保证同一作用域不会被 drain 两次。
//!
use crate::error::{DispatchError, DispatchResult};
use crate::event::Event;
use crate::id::ScopeId;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// 作用域所处阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopePhase {
    Created,
    Active,
    Draining,
    Closed,
}

#[derive(Debug)]
struct QueueState {
    phase: ScopePhase,
    events: VecDeque<Event>,
}

#[derive(Debug)]
pub(crate) struct EventQueue {
    scope_id: ScopeId,
    state: Mutex<QueueState>,
}

impl EventQueue {
    pub(crate) fn new(scope_id: ScopeId) -> Self {
        Self {
            scope_id,
            state: Mutex::new(QueueState {
                phase: ScopePhase::Created,
                events: VecDeque::new(),
            }),
        }
    }

    pub(crate) fn scope_id(&self) -> &ScopeId {
        &self.scope_id
    }

    pub(crate) fn phase(&self) -> ScopePhase {
        self.lock().phase
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub(crate) fn activate(&self) {
        let mut state = self.lock();
        if state.phase == ScopePhase::Created {
            state.phase = ScopePhase::Active;
        }
    }

    /// 追加到队尾；非 `Active` 状态拒绝
    pub(crate) fn push(&self, event: Event) -> DispatchResult<()> {
        let mut state = self.lock();
        if state.phase != ScopePhase::Active {
            return Err(DispatchError::ScopeClosed {
                scope_id: self.scope_id.clone(),
            });
        }
        state.events.push_back(event);
        Ok(())
    }

    /// `Active → Draining`，取出全部已入队事件；重复调用返回 `None`
    pub(crate) fn begin_drain(&self) -> Option<Vec<Event>> {
        let mut state = self.lock();
        match state.phase {
            ScopePhase::Created | ScopePhase::Active => {
                state.phase = ScopePhase::Draining;
                Some(state.events.drain(..).collect())
            }
            ScopePhase::Draining | ScopePhase::Closed => None,
        }
    }

    pub(crate) fn finish(&self) {
        self.lock().phase = ScopePhase::Closed;
    }

    // 持锁期间不会 panic，中毒时直接取回内部状态
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
