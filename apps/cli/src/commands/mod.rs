//! 命令定义和实现

pub mod config;
pub mod estop;
pub mod monitor;
pub mod send;

pub use config::{CliConfig, ConfigCommand};
pub use estop::EstopCommand;
pub use monitor::MonitorCommand;
pub use send::SendCommand;
