//! 分发器配置
//!
//! - `DispatcherConfig`：drain 方式与处理器并发度，可从环境变量读取；
//! - 进程级分发开关：`SCOPE_EVENTS_DISABLE_DISPATCH` 为真时所有分发直接丢弃。
//!
use std::str::FromStr;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

pub const DRAIN_MODE_ENV: &str = "SCOPE_EVENTS_DRAIN_MODE";
pub const HANDLER_CONCURRENCY_ENV: &str = "SCOPE_EVENTS_HANDLER_CONCURRENCY";
pub const DISABLE_DISPATCH_ENV: &str = "SCOPE_EVENTS_DISABLE_DISPATCH";

/// 作用域结束时 drain 的执行方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DrainMode {
    /// 在受跟踪的后台任务中 drain，工作单元的结果立即返回
    #[default]
    Background,
    /// drain 完成后才返回工作单元的结果
    Inline,
}

impl FromStr for DrainMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "background" => Ok(Self::Background),
            "inline" => Ok(Self::Inline),
            other => Err(format!("unknown drain mode: {other}")),
        }
    }
}

/// 分发器配置
#[derive(Clone, Copy, Debug)]
pub struct DispatcherConfig {
    pub drain_mode: DrainMode,
    /// 一次 drain 中同时运行的处理器数量（每个处理器内部始终按 FIFO 顺序消费）
    pub handler_concurrency: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            drain_mode: DrainMode::Background,
            handler_concurrency: 8,
        }
    }
}

impl DispatcherConfig {
    /// 从环境变量读取，缺失或非法时回退默认值
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let drain_mode = match lookup(DRAIN_MODE_ENV) {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                warn!(%err, "falling back to default drain mode");
                defaults.drain_mode
            }),
            None => defaults.drain_mode,
        };

        let handler_concurrency = match lookup(HANDLER_CONCURRENCY_ENV) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!(value = %raw, "invalid handler concurrency, using default");
                    defaults.handler_concurrency
                }
            },
            None => defaults.handler_concurrency,
        };

        Self {
            drain_mode,
            handler_concurrency,
        }
    }
}

static DISPATCH_DISABLED: LazyLock<AtomicBool> = LazyLock::new(|| {
    let disabled = std::env::var(DISABLE_DISPATCH_ENV)
        .ok()
        .map(|raw| {
            parse_flag(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unrecognised {DISABLE_DISPATCH_ENV} value, dispatch stays enabled");
                false
            })
        })
        .unwrap_or(false);
    AtomicBool::new(disabled)
});

/// 分发是否已在进程级关闭
pub fn dispatch_disabled() -> bool {
    DISPATCH_DISABLED.load(Ordering::Relaxed)
}

/// 运行时覆盖环境变量的设置
pub fn set_dispatch_disabled(disabled: bool) {
    DISPATCH_DISABLED.store(disabled, Ordering::Relaxed);
}

/// 布尔开关解析：`y/yes/t/true/on/1` 为真，`n/no/f/false/off/0` 为假
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Some(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parse_flag_follows_strtobool() {
        for raw in ["1", "TRUE", "yes", " on ", "t", "Y"] {
            assert_eq!(parse_flag(raw), Some(true), "{raw}");
        }
        for raw in ["0", "false", "No", "off", "f", "n"] {
            assert_eq!(parse_flag(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn missing_env_uses_defaults() {
        let cfg = DispatcherConfig::from_lookup(env(&[]));
        assert_eq!(cfg.drain_mode, DrainMode::Background);
        assert_eq!(cfg.handler_concurrency, 8);
    }

    #[test]
    fn env_overrides_are_applied() {
        let cfg = DispatcherConfig::from_lookup(env(&[
            (DRAIN_MODE_ENV, "Inline"),
            (HANDLER_CONCURRENCY_ENV, "2"),
        ]));
        assert_eq!(cfg.drain_mode, DrainMode::Inline);
        assert_eq!(cfg.handler_concurrency, 2);
    }

    #[test]
    fn invalid_env_values_fall_back() {
        let cfg = DispatcherConfig::from_lookup(env(&[
            (DRAIN_MODE_ENV, "eventually"),
            (HANDLER_CONCURRENCY_ENV, "0"),
        ]));
        assert_eq!(cfg.drain_mode, DrainMode::Background);
        assert_eq!(cfg.handler_concurrency, 8);
    }
}
