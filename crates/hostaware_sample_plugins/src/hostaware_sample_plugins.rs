//! Hostaware Sample Plugins
//!
//! Builds `libsample.so` with two instances:
//! - `loadavg_collector`: publishes `/proc/loadavg` every second
//! - `loadavg_watch`: subscribes to the collector and publishes whether the
//!   host is busy
//!
//! ```text
//! hostaware-ctl -l libsample.so
//! hostaware-ctl -e loadavg_watch -p threshold=4
//! ```

mod loadavg;
mod watch;

#[cfg(test)]
mod testing;

pub use loadavg::{LoadAvg, LoadAvgCollector};
pub use watch::{BusyState, LoadWatch};

hostaware_types::export_instances!(LoadAvgCollector::new(), LoadWatch::new());
