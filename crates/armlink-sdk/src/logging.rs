//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 输出，过滤规则取自 `RUST_LOG`（未设置时为 `info`）。
//! 依赖 `log` 的第三方 crate（如 `tungstenite`）的日志经 `tracing-log` 桥接到同一输出。
//!
//! ```no_run
//! armlink_sdk::init_logger!();
//! // 或者指定默认过滤规则
//! armlink_sdk::init_logger!("armlink_driver=debug,info");
//! ```

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// 默认过滤规则
pub const DEFAULT_FILTER: &str = "info";

/// 使用默认过滤规则初始化日志（重复调用为空操作）
pub fn init_logger() {
    init_logger_with(DEFAULT_FILTER);
}

/// 以 `default_filter` 为默认规则初始化日志；`RUST_LOG` 优先
///
/// 已有全局 subscriber（例如调用方自己安装过）时静默跳过。
pub fn init_logger_with(default_filter: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            return;
        }
        let _ = tracing_log::LogTracer::builder()
            .with_max_level(log::LevelFilter::Trace)
            .init();
    });
}

/// 初始化日志
///
/// - `init_logger!()`：默认规则 `info`
/// - `init_logger!("armlink_driver=debug")`：自定义默认规则
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::logging::init_logger()
    };
    ($filter:expr) => {
        $crate::logging::init_logger_with($filter)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_noop() {
        init_logger();
        init_logger_with("debug");
        crate::init_logger!();
        tracing::info!("logger initialised");
    }
}
