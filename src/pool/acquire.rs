use std::fmt::Write;
use std::time::Duration;

use crate::handle::OpenHandleInfo;

/// Await `acquire`, calling `on_slow` once if it has not finished after `timeout`.
///
/// The acquisition itself is never abandoned.
pub(crate) async fn watch_acquisition<F, T>(
    acquire: F,
    timeout: Duration,
    on_slow: impl FnOnce(),
) -> T
where
    F: Future<Output = T>,
{
    tokio::pin!(acquire);
    tokio::select! {
        biased;
        out = &mut acquire => return out,
        () = tokio::time::sleep(timeout) => on_slow(),
    }
    acquire.await
}

/// Text of the slow-checkout warning: how many handles are open and, when traces are
/// enabled, the guid, age, and start stack of each.
#[must_use]
pub fn slow_acquisition_report(
    open: &[OpenHandleInfo],
    timeout: Duration,
    traces: bool,
) -> String {
    let mut report = format!(
        "pool connection not acquired within {}s; {} connection handle(s) open",
        timeout.as_secs(),
        open.len()
    );
    if !traces {
        report.push_str(
            "; enable show_debug_traces or show_connection_left_open_trace to see where \
             open handles were started",
        );
        return report;
    }
    for info in open {
        let _ = write!(
            report,
            "\n[{}] open for {:.2} minutes, started at:\n{}",
            info.guid,
            info.open_minutes(),
            info.start_stack
        );
    }
    report
}

pub(crate) fn report_slow_acquisition(open: &[OpenHandleInfo], timeout: Duration, traces: bool) {
    tracing::warn!(
        open_handles = open.len(),
        timeout_secs = timeout.as_secs(),
        "{}",
        slow_acquisition_report(open, timeout, traces)
    );
}
