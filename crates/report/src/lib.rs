//! Run observation and reporting: system sampling during runs and
//! side-by-side comparison of policy metrics.

pub mod comparator;
pub mod error;
pub mod monitor;

pub use comparator::{Criterion, MetricsComparator};
pub use error::ReportError;
pub use monitor::{system_info, CsvMonitor, NullMonitor, Sample, SystemInfo, SystemMonitor};
