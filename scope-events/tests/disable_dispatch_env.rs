//! 分发开关在首次读取时从环境变量初始化，需在独立的测试二进制中先于任何分发设置。
use scope_events::config::{DISABLE_DISPATCH_ENV, dispatch_disabled, set_dispatch_disabled};
use scope_events::{DispatchError, dispatch};

#[test]
fn disable_switch_is_read_from_environment() {
    // 本二进制只有这一个测试，不存在并发读写环境变量
    unsafe { std::env::set_var(DISABLE_DISPATCH_ENV, "yes") };

    assert!(dispatch_disabled());
    assert!(dispatch("outside", ()).is_ok());

    set_dispatch_disabled(false);
    assert!(matches!(
        dispatch("outside", ()),
        Err(DispatchError::NoActiveScope)
    ));
}
