//! `src/model/directory.rs`
//! ============================================================================
//! # Directory Model
//!
//! One instance per observed filesystem location (deduplicated by the
//! registry). Owns the file collection, the three work queues, the monitor
//! and ready-callback registries with their incremental request counters,
//! and the single-slot in-flight state for every fetcher class plus the
//! listing enumeration itself.
//!
//! All mutation happens under one mutex with short, non-awaiting critical
//! sections; I/O lives in spawned tasks holding weak back-references, so a
//! directory whose last handle drops tears its in-flight work down instead
//! of being kept alive by it.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use compact_str::CompactString;
use enum_map::EnumMap;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::fs::attributes::{FileAttributes, Request, attributes_to_request};
use crate::fs::decode::ThumbnailDecoder;
use crate::fs::provider::FsProvider;
use crate::model::file_entry::{DeepCountStatus, DeepCounts, FileEntry, FileSnapshot};
use crate::model::monitor::{
    CallbackHandle, ClientId, DirectoryEvent, EventSender, Monitor, ReadyCallback, ReadyFn,
    RequestCounts, counts_add, counts_remove,
};
use crate::plugins::ProviderRegistry;
use crate::sched::admission::AdmissionController;
use crate::sched::driver;
use crate::sched::fetch::{FetchKind, InFlightFetch};
use crate::sched::queues::WorkQueues;

static NEXT_DIRECTORY_ID: AtomicU64 = AtomicU64::new(1);

// ------------------------------------------------------------
// Shared engine services.
// ------------------------------------------------------------

/// The collaborator set every directory works against. Owned by the
/// registry, cloned into each directory.
#[derive(Clone)]
pub struct EngineCtx {
    pub provider: Arc<dyn FsProvider>,
    pub decoder: Arc<dyn ThumbnailDecoder>,
    pub plugins: Arc<ProviderRegistry>,
    pub settings: Arc<Settings>,
    pub admission: Arc<AdmissionController>,
}

// ------------------------------------------------------------
// Evaluation state machine.
// ------------------------------------------------------------

/// Replaces a reentrant "in progress" boolean: evaluation requests arriving
/// while a pass runs coalesce into one re-loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum EvalState {
    #[default]
    Idle,
    Evaluating,
    EvaluatingDirty,
}

// ------------------------------------------------------------
// File-list loading state.
// ------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct InFlightList {
    pub token: CancellationToken,
    pub seq: u64,
}

#[derive(Debug, Default)]
pub(crate) struct FileListState {
    pub up_to_date: bool,
    pub in_flight: Option<InFlightList>,
    /// Set when the enumeration itself failed; cleared by force_reload.
    pub load_error: Option<(ErrorKind, CompactString)>,
}

// ------------------------------------------------------------
// The guarded state.
// ------------------------------------------------------------

pub(crate) struct DirState {
    pub files: IndexMap<CompactString, FileEntry>,
    pub queues: WorkQueues,

    pub monitors: Vec<Monitor>,
    pub callbacks: Vec<ReadyCallback>,
    pub monitor_counts: RequestCounts,
    pub callback_counts: RequestCounts,

    pub slots: EnumMap<FetchKind, Option<InFlightFetch>>,
    pub list: FileListState,

    pub eval: EvalState,
    pub fetch_seq: u64,
}

impl DirState {
    /// O(1): does any subscription want one of these request types?
    pub fn wants_any(&self, request: Request) -> bool {
        request
            .types()
            .any(|ty| self.monitor_counts[ty] + self.callback_counts[ty] > 0)
    }

    pub fn next_seq(&mut self) -> u64 {
        self.fetch_seq += 1;
        self.fetch_seq
    }

    /// Count of truly outstanding async operations for this directory.
    pub fn active_fetches(&self) -> usize {
        self.slots.values().filter(|s| s.is_some()).count()
            + usize::from(self.list.in_flight.is_some())
    }

    /// Cancel one class's in-flight operation: token fired, slot cleared,
    /// budget slot released immediately, partial results discarded.
    pub fn cancel_slot(&mut self, kind: FetchKind, admission: &AdmissionController) -> bool {
        let Some(inflight) = self.slots[kind].take() else {
            return false;
        };
        inflight.token.cancel();

        if kind == FetchKind::DeepCount {
            if let Some(file) = self.files.get_mut(&inflight.file) {
                if file.deep_counts.status == DeepCountStatus::InProgress {
                    file.deep_counts = DeepCounts::default();
                }
            }
        }

        admission.end(kind.label());
        true
    }

    pub fn cancel_list(&mut self, admission: &AdmissionController) -> bool {
        let Some(inflight) = self.list.in_flight.take() else {
            return false;
        };
        inflight.token.cancel();
        admission.end("file-list");
        true
    }

    /// Directory-wide cancel: listing plus every fetcher class.
    pub fn cancel_all(&mut self, admission: &AdmissionController) {
        self.cancel_list(admission);
        for kind in FetchKind::ALL {
            self.cancel_slot(kind, admission);
        }
    }
}

// ------------------------------------------------------------
// Coverage and satisfaction.
// ------------------------------------------------------------

/// Union of the requests wanting `file`, over monitors and still-active
/// callbacks. Directory-wide subscriptions cover the self-entry only for
/// its own item count, and skip hidden/backup files for monitors that do
/// not watch them.
pub(crate) fn wanted_requests(st: &DirState, file: &FileEntry) -> Request {
    let mut wants = Request::empty();

    for monitor in &st.monitors {
        match &monitor.file {
            Some(name) => {
                if *name == file.name {
                    wants |= monitor.request;
                }
            }
            None => {
                if file.is_self {
                    wants |= monitor.request & Request::DIRECTORY_COUNT;
                } else if monitor.watch_hidden || !(file.is_hidden() || file.is_backup()) {
                    wants |= monitor.request;
                }
            }
        }
    }

    for callback in &st.callbacks {
        if !callback.active {
            continue;
        }
        match &callback.file {
            Some(name) => {
                if *name == file.name {
                    wants |= callback.request;
                }
            }
            None => {
                if file.is_self {
                    wants |= callback.request & Request::DIRECTORY_COUNT;
                } else {
                    wants |= callback.request;
                }
            }
        }
    }

    wants
}

/// Synchronous satisfaction check for one request against the current
/// state. No side effects.
pub(crate) fn request_satisfied(st: &DirState, file: Option<&str>, request: Request) -> bool {
    if request.intersects(Request::FILE_LIST) && !st.list.up_to_date {
        return false;
    }

    match file {
        Some(name) => match st.files.get(name) {
            Some(entry) => entry.satisfies(request),
            // File-scoped subscriptions create their entry up front, so an
            // absent name means the entity was swept as gone: resolved.
            None => true,
        },
        None => {
            if !st.list.up_to_date {
                return false;
            }
            let per_file = request & !Request::FILE_LIST;
            if per_file.is_empty() {
                return true;
            }
            st.files.values().all(|entry| {
                if entry.is_gone {
                    return true;
                }
                if entry.is_self {
                    return entry.satisfies(per_file & Request::DIRECTORY_COUNT);
                }
                entry.satisfies(per_file)
            })
        }
    }
}

// ------------------------------------------------------------
// Event emission (always under the state lock, non-blocking sends).
// ------------------------------------------------------------

fn monitor_sees(monitor: &Monitor, file: &FileEntry) -> bool {
    match &monitor.file {
        Some(name) => *name == file.name,
        None => !file.is_self && (monitor.watch_hidden || !(file.is_hidden() || file.is_backup())),
    }
}

pub(crate) fn emit_changed(st: &DirState, names: &[CompactString]) {
    if names.is_empty() {
        return;
    }
    for monitor in &st.monitors {
        let batch: Vec<FileSnapshot> = names
            .iter()
            .filter_map(|name| st.files.get(name))
            .filter(|file| monitor_sees(monitor, file))
            .map(FileEntry::snapshot)
            .collect();
        if !batch.is_empty() {
            let _ = monitor.events.send(DirectoryEvent::FilesChanged(batch));
        }
    }
}

pub(crate) fn emit_added(st: &DirState, names: &[CompactString]) {
    if names.is_empty() {
        return;
    }
    for monitor in &st.monitors {
        if monitor.file.is_some() {
            continue;
        }
        let batch: Vec<FileSnapshot> = names
            .iter()
            .filter_map(|name| st.files.get(name))
            .filter(|file| monitor_sees(monitor, file))
            .map(FileEntry::snapshot)
            .collect();
        if !batch.is_empty() {
            let _ = monitor.events.send(DirectoryEvent::FilesAdded(batch));
        }
    }
}

pub(crate) fn emit_listing_event(st: &DirState, event: &DirectoryEvent) {
    for monitor in &st.monitors {
        if monitor.file.is_none() {
            let _ = monitor.events.send(event.clone());
        }
    }
}

// ------------------------------------------------------------
// Directory – the public handle.
// ------------------------------------------------------------

pub struct Directory {
    id: u64,
    location: Arc<PathBuf>,
    /// Back-reference so `&self` methods can hand strong handles to the
    /// driver and the admission controller.
    weak_self: Weak<Directory>,
    pub(crate) ctx: EngineCtx,
    state: Mutex<DirState>,
}

impl Directory {
    pub(crate) fn new(location: PathBuf, ctx: EngineCtx) -> Arc<Self> {
        let location = Arc::new(location);

        let mut files = IndexMap::new();
        let self_entry = FileEntry::new_self(location.clone());
        files.insert(self_entry.name.clone(), self_entry);

        Arc::new_cyclic(|weak_self| Self {
            id: NEXT_DIRECTORY_ID.fetch_add(1, Ordering::Relaxed),
            location,
            weak_self: weak_self.clone(),
            ctx,
            state: Mutex::new(DirState {
                files,
                queues: WorkQueues::default(),
                monitors: Vec::new(),
                callbacks: Vec::new(),
                monitor_counts: RequestCounts::default(),
                callback_counts: RequestCounts::default(),
                slots: EnumMap::default(),
                list: FileListState::default(),
                eval: EvalState::Idle,
                fetch_seq: 0,
            }),
        })
    }

    #[inline]
    #[must_use]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Strong handle to self. Valid for the whole lifetime of `&self`
    /// except during drop, where nothing calls this.
    fn as_arc(&self) -> Arc<Self> {
        self.weak_self
            .upgrade()
            .expect("directory self-reference invalid outside drop")
    }

    #[must_use]
    pub fn location(&self) -> &Arc<PathBuf> {
        &self.location
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, DirState> {
        self.state.lock().expect("directory state poisoned")
    }

    // ---------------------------------------------------------------
    // Monitors
    // ---------------------------------------------------------------

    /// Add (or replace) a persistent subscription. `file` of `None` watches
    /// the whole listing; such monitors immediately receive the currently
    /// known files and, when the listing is already loaded, a done-loading
    /// event, so late subscribers converge without a reload.
    pub fn monitor_add(
        &self,
        client: ClientId,
        file: Option<&str>,
        watch_hidden: bool,
        attributes: FileAttributes,
        events: EventSender,
    ) {
        let mut request = attributes_to_request(attributes);
        if file.is_none() {
            request |= Request::FILE_LIST;
        }

        {
            let mut st = self.lock_state();

            if let Some(pos) = st
                .monitors
                .iter()
                .position(|m| m.client == client && m.file.as_deref() == file)
            {
                let old = st.monitors.remove(pos);
                counts_remove(&mut st.monitor_counts, old.request);
                debug!(
                    marker = "DIRECTORY",
                    operation_type = "monitor_replaced",
                    directory = %self.location.display(),
                    client = client.0,
                    "Monitor re-added for the same scope, replacing"
                );
            }

            counts_add(&mut st.monitor_counts, request);
            st.monitors.push(Monitor {
                client,
                file: file.map(CompactString::new),
                watch_hidden,
                request,
                events: events.clone(),
            });

            self.enqueue_scope(&mut st, file);

            if file.is_none() {
                let current: Vec<FileSnapshot> = st
                    .files
                    .values()
                    .filter(|f| {
                        f.is_added
                            && !f.is_gone
                            && !f.is_self
                            && (watch_hidden || !(f.is_hidden() || f.is_backup()))
                    })
                    .map(FileEntry::snapshot)
                    .collect();
                if !current.is_empty() {
                    let _ = events.send(DirectoryEvent::FilesAdded(current));
                }
                if st.list.up_to_date {
                    let _ = events.send(DirectoryEvent::DoneLoading);
                }
            }
        }

        driver::evaluate(&self.as_arc());
    }

    /// Remove every subscription owned by `client`.
    pub fn monitor_remove(&self, client: ClientId) {
        {
            let mut st = self.lock_state();
            let mut removed = Vec::new();
            st.monitors.retain(|m| {
                if m.client == client {
                    removed.push(m.request);
                    false
                } else {
                    true
                }
            });
            for request in removed {
                counts_remove(&mut st.monitor_counts, request);
            }
        }

        driver::evaluate(&self.as_arc());
    }

    // ---------------------------------------------------------------
    // Ready callbacks
    // ---------------------------------------------------------------

    /// One-shot request: fires once the attribute set is satisfied for
    /// `file` (or for the whole listing when `file` is `None`).
    ///
    /// A duplicate registration for the same (client, file) while an active
    /// one is pending is rejected with a warning, unless the new
    /// registration carries no callback and merely triggers loading.
    pub fn call_when_ready(
        &self,
        client: ClientId,
        file: Option<&str>,
        attributes: FileAttributes,
        wait_for_listing: bool,
        callback: Option<ReadyFn>,
    ) -> Option<CallbackHandle> {
        let mut request = attributes_to_request(attributes);
        if wait_for_listing || file.is_none() {
            request |= Request::FILE_LIST;
        }

        let handle = {
            let mut st = self.lock_state();

            if callback.is_some()
                && st
                    .callbacks
                    .iter()
                    .any(|c| c.active && c.client == client && c.file.as_deref() == file)
            {
                warn!(
                    marker = "DIRECTORY",
                    operation_type = "callback_conflict",
                    directory = %self.location.display(),
                    client = client.0,
                    file = file.unwrap_or("<listing>"),
                    "Duplicate ready-callback registration rejected"
                );
                return None;
            }

            let handle = CallbackHandle::next();
            counts_add(&mut st.callback_counts, request);
            st.callbacks.push(ReadyCallback {
                handle,
                client,
                file: file.map(CompactString::new),
                request,
                active: true,
                callback,
            });

            self.enqueue_scope(&mut st, file);
            handle
        };

        driver::evaluate(&self.as_arc());
        Some(handle)
    }

    /// Remove a pending callback; it will never fire.
    pub fn cancel_callback(&self, handle: CallbackHandle) {
        {
            let mut st = self.lock_state();
            if let Some(pos) = st.callbacks.iter().position(|c| c.handle == handle) {
                let removed = st.callbacks.remove(pos);
                counts_remove(&mut st.callback_counts, removed.request);
            }
        }

        driver::evaluate(&self.as_arc());
    }

    /// Synchronous poll: would a callback for this request fire right now?
    /// No side effects.
    #[must_use]
    pub fn check_if_ready(&self, file: Option<&str>, attributes: FileAttributes) -> bool {
        let mut request = attributes_to_request(attributes);
        if file.is_none() {
            request |= Request::FILE_LIST;
        }
        let st = self.lock_state();
        request_satisfied(&st, file, request)
    }

    // ---------------------------------------------------------------
    // Reload and teardown
    // ---------------------------------------------------------------

    /// Invalidate the named attribute classes (and the listing) and fetch
    /// them again. Cached failures are cleared; this is the only retry
    /// mechanism.
    pub fn force_reload(&self, attributes: FileAttributes) {
        let request = attributes_to_request(attributes) | Request::FILE_LIST;

        {
            let mut st = self.lock_state();
            let admission = self.ctx.admission.clone();

            st.cancel_list(&admission);
            st.list.up_to_date = false;
            st.list.load_error = None;

            for kind in FetchKind::ALL {
                if kind.request().intersects(request) {
                    st.cancel_slot(kind, &admission);
                }
            }

            let names: Vec<CompactString> = st.files.keys().cloned().collect();
            for name in &names {
                if let Some(file) = st.files.get_mut(name) {
                    file.invalidate(request);
                    if !file.is_self {
                        file.unconfirmed = true;
                    }
                }
            }
            for name in &names {
                st.queues.enqueue_high(name);
            }
        }

        driver::evaluate(&self.as_arc());
    }

    /// Cancel everything in flight for this directory: the listing
    /// enumeration and all fetcher classes. Budget slots are released
    /// immediately; partial results are discarded.
    pub fn cancel(&self) {
        let admission = self.ctx.admission.clone();
        let mut st = self.lock_state();
        st.cancel_all(&admission);
    }

    // ---------------------------------------------------------------
    // Snapshots and introspection
    // ---------------------------------------------------------------

    #[must_use]
    pub fn file_snapshot(&self, name: &str) -> Option<FileSnapshot> {
        let st = self.lock_state();
        st.files.get(name).map(FileEntry::snapshot)
    }

    /// Current listing in insertion order.
    #[must_use]
    pub fn list_snapshots(&self, include_hidden: bool) -> Vec<FileSnapshot> {
        let st = self.lock_state();
        st.files
            .values()
            .filter(|f| {
                f.is_added
                    && !f.is_gone
                    && !f.is_self
                    && (include_hidden || !(f.is_hidden() || f.is_backup()))
            })
            .map(FileEntry::snapshot)
            .collect()
    }

    /// Count of truly outstanding async operations (all classes plus the
    /// listing enumeration).
    #[must_use]
    pub fn active_fetch_count(&self) -> usize {
        self.lock_state().active_fetches()
    }

    /// True when nothing is in flight for this directory.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.active_fetch_count() == 0
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    /// Queue the files a new subscription touches, creating the entry for a
    /// file-scoped subscription on a not-yet-listed name.
    fn enqueue_scope(&self, st: &mut DirState, file: Option<&str>) {
        match file {
            Some(name) => {
                if !st.files.contains_key(name) {
                    let entry = FileEntry::new(name, &self.location);
                    st.files.insert(entry.name.clone(), entry);
                }
                st.queues.enqueue_high(&CompactString::new(name));
            }
            None => {
                let names: Vec<CompactString> = st.files.keys().cloned().collect();
                for name in &names {
                    st.queues.enqueue_high(name);
                }
            }
        }
    }
}

impl Drop for Directory {
    fn drop(&mut self) {
        let admission = self.ctx.admission.clone();
        let st = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        st.cancel_all(&admission);
        admission.forget(self.id);
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("id", &self.id)
            .field("location", &self.location)
            .finish()
    }
}
