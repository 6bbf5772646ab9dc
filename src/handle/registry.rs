use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::HandleInner;

/// Point-in-time description of an open handle.
#[derive(Debug, Clone)]
pub struct OpenHandleInfo {
    pub guid: String,
    pub open_for: Duration,
    /// Stack captured by `start`; empty unless traces were enabled or the
    /// environment turned backtraces on.
    pub start_stack: String,
}

impl OpenHandleInfo {
    #[must_use]
    pub fn open_minutes(&self) -> f64 {
        self.open_for.as_secs_f64() / 60.0
    }
}

/// Every currently open handle, keyed by guid.
#[derive(Default)]
pub(crate) struct OpenHandles {
    handles: Mutex<HashMap<String, Arc<HandleInner>>>,
}

impl OpenHandles {
    pub(crate) fn insert(&self, guid: String, handle: Arc<HandleInner>) {
        self.handles.lock().insert(guid, handle);
    }

    pub(crate) fn remove(&self, guid: &str) -> bool {
        self.handles.lock().remove(guid).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub(crate) fn contains(&self, guid: &str) -> bool {
        self.handles.lock().contains_key(guid)
    }

    /// Handles to act on outside the lock.
    pub(crate) fn snapshot(&self) -> Vec<Arc<HandleInner>> {
        self.handles.lock().values().cloned().collect()
    }

    pub(crate) fn describe(&self) -> Vec<OpenHandleInfo> {
        self.snapshot()
            .iter()
            .filter_map(|h| h.describe())
            .collect()
    }
}
