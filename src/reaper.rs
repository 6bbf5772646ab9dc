//! Background task that force-closes handles left open too long.

use std::fmt::Write;
use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::context::{ContextInner, DbContext};
use crate::error::SqlSessionError;
use crate::handle::{ConnectionHandle, OpenHandleInfo};

/// How often open handles are inspected.
pub const REAP_INTERVAL: Duration = Duration::from_secs(10);

/// Outcome of one inspection pass.
#[derive(Debug, Clone, Default)]
pub struct ReapReport {
    /// Handles that were force-closed.
    pub closed: Vec<OpenHandleInfo>,
    /// Handles that were open when the pass began.
    pub inspected: usize,
}

/// At most one reaper task per context; reconfiguring replaces the running one.
#[derive(Debug, Default)]
pub struct IdleReaper {
    task: Mutex<Option<JoinHandle<()>>>,
    minutes: Mutex<f64>,
}

impl IdleReaper {
    pub(crate) fn configure(
        &self,
        ctx: Weak<ContextInner>,
        minutes: f64,
    ) -> Result<(), SqlSessionError> {
        let mut task = self.task.lock();
        if let Some(old) = task.take() {
            old.abort();
        }

        if minutes.is_nan() || minutes <= 0.0 {
            *self.minutes.lock() = 0.0;
            tracing::debug!("idle reaper disabled");
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SqlSessionError::Config("idle reaper needs a running tokio runtime".into())
        })?;
        *self.minutes.lock() = minutes;
        *task = Some(runtime.spawn(reap_loop(ctx, minutes)));
        tracing::debug!(minutes, "idle reaper enabled");
        Ok(())
    }

    /// Current threshold in minutes; `0.0` when disabled.
    #[must_use]
    pub fn minutes(&self) -> f64 {
        *self.minutes.lock()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for IdleReaper {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn reap_loop(ctx: Weak<ContextInner>, minutes: f64) {
    let mut ticker = tokio::time::interval_at(Instant::now() + REAP_INTERVAL, REAP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(ctx) = DbContext::upgrade(&ctx) else {
            break;
        };
        let report = reap_once(&ctx, minutes).await;
        log_report(&ctx, &report);
    }
}

/// Close every open handle that has been open longer than `minutes`.
pub(crate) async fn reap_once(ctx: &DbContext, minutes: f64) -> ReapReport {
    let handles = ctx.open_handle_snapshot();
    let mut report = ReapReport {
        inspected: handles.len(),
        ..ReapReport::default()
    };

    for inner in handles {
        let Some(info) = inner.describe() else {
            continue;
        };
        if info.open_minutes() <= minutes {
            continue;
        }
        let handle = ConnectionHandle::from_inner(inner);
        if handle.close_if_guid(&info.guid).await {
            report.closed.push(info);
        }
    }
    report
}

impl ReapReport {
    /// Text of the reaper's log line, or `None` when there is nothing to say or
    /// `show_debug_traces` is off.
    ///
    /// Lists each force-closed handle with its age and start stack; when nothing was
    /// closed but handles remain open, a short "still open" notice instead.
    #[must_use]
    pub fn summary(&self, show_debug_traces: bool) -> Option<String> {
        if !show_debug_traces {
            return None;
        }
        if self.closed.is_empty() {
            return (self.inspected > 0).then(|| {
                format!("{} database connection(s) still open", self.inspected)
            });
        }
        let mut out = format!("{} database connection(s) auto-closed:", self.closed.len());
        for info in &self.closed {
            let _ = write!(
                out,
                "\n[{}] open for {:.2} minutes\n{}",
                info.guid,
                info.open_minutes(),
                info.start_stack
            );
        }
        Some(out)
    }
}

fn log_report(ctx: &DbContext, report: &ReapReport) {
    let Some(text) = report.summary(ctx.config().show_debug_traces) else {
        return;
    };
    if report.closed.is_empty() {
        tracing::info!(open_handles = report.inspected, "{text}");
    } else {
        tracing::warn!(
            closed = report.closed.len(),
            inspected = report.inspected,
            "{text}"
        );
    }
}
