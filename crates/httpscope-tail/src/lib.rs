//! Live file tailing for httpscope
//!
//! This crate watches one or more growing log files, survives truncation and
//! rotation, and forwards every parsed line through a transport.

mod error;
mod monitor;
mod watch;

pub use error::TailError;
pub use monitor::{MonitorConfig, MonitorStats, StopHandle, TailMonitor, TailState};
pub use watch::{
    ChannelWatcher, NotifyWatcher, PollWatcher, WatchEvent, WatchEventKind, WatchSender, WatchSource,
};
