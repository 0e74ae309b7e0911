//! `src/sched/admission.rs`
//! ============================================================================
//! # Global Job Admission Controller
//!
//! Caps the total number of concurrently in-flight fetch operations across
//! every directory sharing one registry. Directories denied a slot are
//! recorded in an explicit FIFO and woken in request order as capacity
//! frees.
//!
//! A negative job counter is a scheduler bug, not an environmental
//! condition; `end` asserts rather than recovering.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use crate::model::directory::Directory;
use crate::sched::driver;

/// Process-wide default budget of simultaneously in-flight fetch jobs.
pub const MAX_ASYNC_JOBS: usize = 10;

#[derive(Debug, Default)]
struct AdmissionState {
    in_flight: usize,
    /// Directories waiting for a free slot, in denial order.
    waiting: VecDeque<(u64, Weak<Directory>)>,
    /// Reentrancy guard: waking a directory can trigger further wake-ups.
    waking: bool,
}

#[derive(Debug)]
pub struct AdmissionController {
    state: Mutex<AdmissionState>,
    limit: usize,
}

impl AdmissionController {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(MAX_ASYNC_JOBS)
    }

    /// Controller with a custom budget; property tests use small limits.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        assert!(limit > 0, "admission budget must be positive");
        Self {
            state: Mutex::new(AdmissionState::default()),
            limit,
        }
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.lock().expect("admission state poisoned").in_flight
    }

    #[must_use]
    pub fn available(&self) -> usize {
        let st = self.state.lock().expect("admission state poisoned");
        self.limit - st.in_flight
    }

    /// Claim one budget slot for `directory`. At capacity the directory is
    /// recorded for wake-up and the caller must not start I/O.
    pub(crate) fn try_start(&self, directory: &Arc<Directory>, job: &'static str) -> bool {
        let mut st = self.state.lock().expect("admission state poisoned");

        if st.in_flight >= self.limit {
            let id = directory.id();
            if !st.waiting.iter().any(|(waiting_id, _)| *waiting_id == id) {
                st.waiting.push_back((id, Arc::downgrade(directory)));
            }

            trace!(
                marker = "ADMISSION",
                operation_type = "job_denied",
                job,
                directory = %directory.location().display(),
                in_flight = st.in_flight,
                "Budget exhausted, directory queued for wake-up"
            );
            return false;
        }

        st.in_flight += 1;

        trace!(
            marker = "ADMISSION",
            operation_type = "job_started",
            job,
            directory = %directory.location().display(),
            in_flight = st.in_flight,
            "Admission granted"
        );
        true
    }

    /// Release one budget slot and wake waiters.
    pub(crate) fn end(&self, job: &'static str) {
        {
            let mut st = self.state.lock().expect("admission state poisoned");
            assert!(st.in_flight > 0, "admission counter underflow ending {job}");
            st.in_flight -= 1;

            trace!(
                marker = "ADMISSION",
                operation_type = "job_ended",
                job,
                in_flight = st.in_flight,
                "Admission released"
            );
        }

        self.wake_up();
    }

    /// Schedule re-evaluation for as many waiting directories as there is
    /// spare capacity, oldest first.
    pub(crate) fn wake_up(&self) {
        let woken = {
            let mut st = self.state.lock().expect("admission state poisoned");
            if st.waking {
                return;
            }
            st.waking = true;

            let mut woken = Vec::new();
            let mut free = self.limit.saturating_sub(st.in_flight);

            while free > 0 {
                let Some((_, weak)) = st.waiting.pop_front() else {
                    break;
                };
                if let Some(dir) = weak.upgrade() {
                    woken.push(dir);
                    free -= 1;
                }
                // dead weak refs are simply dropped
            }

            st.waking = false;
            woken
        };

        for dir in woken {
            driver::schedule_evaluate(&dir);
        }
    }

    /// Forget a directory that is being torn down.
    pub(crate) fn forget(&self, directory_id: u64) {
        let mut st = self.state.lock().expect("admission state poisoned");
        st.waiting.retain(|(id, _)| *id != directory_id);
    }

    #[cfg(test)]
    pub(crate) fn waiting_len(&self) -> usize {
        self.state.lock().expect("admission state poisoned").waiting.len()
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new()
    }
}
