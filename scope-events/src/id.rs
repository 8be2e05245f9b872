use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// 作用域标识
///
/// 对分发器而言是不透明值：既可由集成方显式给定（数字、字符串），
/// 也可在进入作用域时自动生成（UUID v4）。克隆开销为一次引用计数。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(Arc<str>);

impl ScopeId {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    /// 生成一个进程内唯一的随机标识
    pub fn generate() -> Self {
        Self::from(Uuid::new_v4())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ScopeId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<u64> for ScopeId {
    fn from(value: u64) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Uuid> for ScopeId {
    fn from(value: Uuid) -> Self {
        Self::from(value.to_string())
    }
}
