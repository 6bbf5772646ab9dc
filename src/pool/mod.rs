mod acquire;
mod registry;

pub use acquire::slow_acquisition_report;
pub(crate) use acquire::{report_slow_acquisition, watch_acquisition};
pub use registry::PoolRegistry;
