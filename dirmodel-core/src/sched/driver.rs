//! `src/sched/driver.rs`
//! ============================================================================
//! # Async State-Change Driver
//!
//! The reentrant-safe core loop. Every external event (monitor added,
//! callback requested, fetch completed, file added or removed) funnels into
//! [`evaluate`], which re-examines the whole directory's pending work:
//! listing start/stop, gone-file sweep, queue promotion, then for each
//! fetcher class a stop-unneeded check followed by an attempt-start on the
//! current queue candidates, then ready-callback satisfaction. The pass
//! repeats until a full iteration changes nothing, so newly started or
//! stopped I/O and newly satisfiable callbacks converge within one
//! synchronous call; the I/O completions themselves arrive later and
//! re-invoke `evaluate`.
//!
//! Ready-callback delivery is deferred to a spawned task, never run inline,
//! so observer code can re-subscribe without reentering the loop.

use std::sync::{Arc, Weak};

use compact_str::{CompactString, ToCompactString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::CoreError;
use crate::fs::attributes::RequestType;
use crate::fs::provider::EntryInfo;
use crate::model::directory::{
    DirState, Directory, EvalState, InFlightList, emit_added, emit_changed, emit_listing_event,
    request_satisfied, wanted_requests,
};
use crate::model::file_entry::FileEntry;
use crate::model::monitor::{DirectoryEvent, ReadyFn, ReadyPayload, counts_remove};
use crate::sched::fetch::{FetchClass, FetchCtx, FetchError, FetchKind, FetchResult, InFlightFetch};
use crate::sched::fetchers::counts::DirectoryCountFetch;
use crate::sched::fetchers::deep_count::DeepCountFetch;
use crate::sched::fetchers::extension::ExtensionFetch;
use crate::sched::fetchers::file_info::FileInfoFetch;
use crate::sched::fetchers::filesystem_info::FilesystemInfoFetch;
use crate::sched::fetchers::link_info::LinkInfoFetch;
use crate::sched::fetchers::mime_list::MimeListFetch;
use crate::sched::fetchers::mount::MountFetch;
use crate::sched::fetchers::thumbnail::ThumbnailFetch;
use crate::sched::fetchers::top_left::TopLeftFetch;
use crate::sched::queues::QueueBand;

/// Entries applied per lock acquisition while a listing streams in.
const LIST_BATCH: usize = 32;

/// Spawn onto the current runtime; outside one (process teardown) the work
/// is dropped, which is fine because nothing async can run there anyway.
fn spawn(fut: impl std::future::Future<Output = ()> + Send + 'static) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(fut);
    }
}

/// Queue an evaluation pass on the runtime.
pub(crate) fn schedule_evaluate(dir: &Arc<Directory>) {
    let dir = dir.clone();
    spawn(async move {
        evaluate(&dir);
    });
}

/// The fixed-point loop. Safe to call from anywhere inside the runtime;
/// concurrent calls coalesce through the eval state machine.
pub(crate) fn evaluate(dir: &Arc<Directory>) {
    let mut st = dir.lock_state();

    match st.eval {
        EvalState::Idle => st.eval = EvalState::Evaluating,
        EvalState::Evaluating | EvalState::EvaluatingDirty => {
            st.eval = EvalState::EvaluatingDirty;
            return;
        }
    }

    loop {
        let mut changed = false;

        changed |= sweep_gone(dir, &mut st);
        changed |= update_file_list(dir, &mut st);
        changed |= promote_queues(&mut st);

        changed |= run_class::<FileInfoFetch>(dir, &mut st);
        changed |= run_class::<LinkInfoFetch>(dir, &mut st);
        changed |= run_class::<DirectoryCountFetch>(dir, &mut st);
        changed |= run_class::<DeepCountFetch>(dir, &mut st);
        changed |= run_class::<MimeListFetch>(dir, &mut st);
        changed |= run_class::<TopLeftFetch>(dir, &mut st);
        changed |= run_class::<ThumbnailFetch>(dir, &mut st);
        changed |= run_class::<MountFetch>(dir, &mut st);
        changed |= run_class::<FilesystemInfoFetch>(dir, &mut st);
        changed |= run_class::<ExtensionFetch>(dir, &mut st);

        changed |= check_ready_callbacks(dir, &mut st);

        if changed {
            continue;
        }
        if st.eval == EvalState::EvaluatingDirty {
            st.eval = EvalState::Evaluating;
            continue;
        }
        st.eval = EvalState::Idle;
        break;
    }
}

// ------------------------------------------------------------
// Gone-file sweep.
// ------------------------------------------------------------

/// Emit removal notifications for files marked gone and drop them from the
/// collection, cancelling any fetch still targeting them.
fn sweep_gone(dir: &Arc<Directory>, st: &mut DirState) -> bool {
    let gone: Vec<CompactString> = st
        .files
        .iter()
        .filter(|(_, f)| f.is_gone && !f.is_self)
        .map(|(name, _)| name.clone())
        .collect();

    if gone.is_empty() {
        return false;
    }

    for kind in FetchKind::ALL {
        let target = st.slots[kind].as_ref().map(|inflight| inflight.file.clone());
        if let Some(name) = target {
            if gone.contains(&name) {
                st.cancel_slot(kind, &dir.ctx.admission);
            }
        }
    }

    emit_changed(st, &gone);

    for name in &gone {
        st.queues.remove(name);
        st.files.shift_remove(name);
    }

    debug!(
        marker = "DIRECTORY",
        operation_type = "gone_sweep",
        directory = %dir.location().display(),
        removed = gone.len(),
        "Swept gone files"
    );

    true
}

// ------------------------------------------------------------
// File-list loading.
// ------------------------------------------------------------

fn list_wanted(st: &DirState) -> bool {
    st.monitor_counts[RequestType::FileList] + st.callback_counts[RequestType::FileList] > 0
}

fn update_file_list(dir: &Arc<Directory>, st: &mut DirState) -> bool {
    if st.list.in_flight.is_some() {
        if !list_wanted(st) {
            st.cancel_list(&dir.ctx.admission);
            return true;
        }
        return false;
    }

    if !list_wanted(st) || st.list.up_to_date {
        return false;
    }

    if !dir.ctx.admission.try_start(dir, "file-list") {
        return false;
    }

    let token = CancellationToken::new();
    let seq = st.next_seq();
    st.list.in_flight = Some(InFlightList {
        token: token.clone(),
        seq,
    });

    // Everything previously known must be re-seen to survive the reload.
    for file in st.files.values_mut() {
        if !file.is_self {
            file.unconfirmed = true;
        }
    }

    let dirw = Arc::downgrade(dir);
    let provider = dir.ctx.provider.clone();
    let location = dir.location().clone();
    spawn(async move {
        run_file_list(dirw, provider, location, token, seq).await;
    });

    true
}

async fn run_file_list(
    dirw: Weak<Directory>,
    provider: Arc<dyn crate::fs::provider::FsProvider>,
    location: Arc<std::path::PathBuf>,
    token: CancellationToken,
    seq: u64,
) {
    let mut rx = match provider.enumerate(&location, token.clone()).await {
        Ok(rx) => rx,
        Err(e) => {
            finish_list_error(&dirw, seq, &e);
            return;
        }
    };

    let mut batch: Vec<EntryInfo> = Vec::with_capacity(LIST_BATCH);
    loop {
        match rx.recv().await {
            Some(Ok(entry)) => {
                batch.push(entry);
                if batch.len() >= LIST_BATCH
                    && !apply_list_batch(&dirw, seq, std::mem::take(&mut batch))
                {
                    return;
                }
            }
            Some(Err(e)) => {
                finish_list_error(&dirw, seq, &e);
                return;
            }
            None => break,
        }
    }

    if token.is_cancelled() {
        return;
    }
    if !apply_list_batch(&dirw, seq, batch) {
        return;
    }
    finish_list_done(&dirw, seq);
}

/// Fold one batch of enumerated entries into the collection. Returns false
/// when the enumeration is stale (directory torn down or reloaded).
fn apply_list_batch(dirw: &Weak<Directory>, seq: u64, batch: Vec<EntryInfo>) -> bool {
    let Some(dir) = dirw.upgrade() else {
        return false;
    };

    {
        let mut st = dir.lock_state();
        match &st.list.in_flight {
            Some(inflight) if inflight.seq == seq => {}
            _ => return false,
        }

        let mut added: Vec<CompactString> = Vec::new();
        let mut confirmed: Vec<CompactString> = Vec::new();

        for entry in batch {
            let name = entry.name.clone();
            if name.is_empty() || name == crate::model::file_entry::SELF_ENTRY_NAME {
                continue;
            }

            match st.files.get_mut(&name) {
                Some(file) => {
                    file.apply_info(entry);
                    if file.is_added {
                        confirmed.push(name.clone());
                    } else {
                        file.is_added = true;
                        added.push(name.clone());
                    }
                }
                None => {
                    let mut file = FileEntry::new(&name, dir.location());
                    file.apply_info(entry);
                    file.is_added = true;
                    st.files.insert(name.clone(), file);
                    added.push(name.clone());
                }
            }

            st.queues.enqueue_high(&name);
        }

        emit_added(&st, &added);
        emit_changed(&st, &confirmed);
    }

    evaluate(&dir);
    true
}

fn finish_list_done(dirw: &Weak<Directory>, seq: u64) {
    let Some(dir) = dirw.upgrade() else {
        return;
    };

    {
        let mut st = dir.lock_state();
        match &st.list.in_flight {
            Some(inflight) if inflight.seq == seq => {}
            _ => return,
        }
        st.list.in_flight = None;
        st.list.up_to_date = true;
        st.list.load_error = None;

        // Unconfirmed files were not re-seen: presumed gone.
        for file in st.files.values_mut() {
            if !file.is_self && file.unconfirmed && !file.is_gone {
                file.mark_gone();
            }
        }
        sweep_gone(&dir, &mut st);

        emit_listing_event(&st, &DirectoryEvent::DoneLoading);
    }

    dir.ctx.admission.end("file-list");
    evaluate(&dir);
}

fn finish_list_error(dirw: &Weak<Directory>, seq: u64, error: &CoreError) {
    let Some(dir) = dirw.upgrade() else {
        return;
    };
    if error.is_cancelled() {
        // The cancel path already cleared the slot and released the budget.
        return;
    }

    {
        let mut st = dir.lock_state();
        match &st.list.in_flight {
            Some(inflight) if inflight.seq == seq => {}
            _ => return,
        }
        st.list.in_flight = None;
        // Terminal for this cycle: an explicit force_reload retries.
        st.list.up_to_date = true;
        st.list.load_error = Some((error.kind(), error.to_compact_string()));

        // Who is gone cannot be determined; keep everything we know.
        for file in st.files.values_mut() {
            file.unconfirmed = false;
        }

        emit_listing_event(
            &st,
            &DirectoryEvent::LoadError {
                kind: error.kind(),
                message: error.to_compact_string(),
            },
        );
        emit_listing_event(&st, &DirectoryEvent::DoneLoading);
    }

    dir.ctx.admission.end("file-list");
    evaluate(&dir);
}

// ------------------------------------------------------------
// Queue promotion.
// ------------------------------------------------------------

/// High-priority work done → low queue → extension queue → out.
fn promote_queues(st: &mut DirState) -> bool {
    let mut changed = false;

    let high: Vec<CompactString> = st.queues.iter(QueueBand::High).cloned().collect();
    for name in high {
        if !st.files.contains_key(&name) {
            st.queues.remove(&name);
            changed = true;
            continue;
        }
        if !is_needy::<FileInfoFetch>(st, &name) && !is_needy::<LinkInfoFetch>(st, &name) {
            st.queues.promote(&name, QueueBand::High, QueueBand::Low);
            changed = true;
        }
    }

    let low: Vec<CompactString> = st.queues.iter(QueueBand::Low).cloned().collect();
    for name in low {
        if !st.files.contains_key(&name) {
            st.queues.remove(&name);
            changed = true;
            continue;
        }
        let still_needed = is_needy::<DirectoryCountFetch>(st, &name)
            || is_needy::<DeepCountFetch>(st, &name)
            || is_needy::<MimeListFetch>(st, &name)
            || is_needy::<TopLeftFetch>(st, &name)
            || is_needy::<ThumbnailFetch>(st, &name)
            || is_needy::<MountFetch>(st, &name)
            || is_needy::<FilesystemInfoFetch>(st, &name);
        if !still_needed {
            st.queues.promote(&name, QueueBand::Low, QueueBand::Extension);
            changed = true;
        }
    }

    let ext: Vec<CompactString> = st.queues.iter(QueueBand::Extension).cloned().collect();
    for name in ext {
        if !st.files.contains_key(&name) || !is_needy::<ExtensionFetch>(st, &name) {
            st.queues.drop_from(&name, QueueBand::Extension);
            changed = true;
        }
    }

    changed
}

// ------------------------------------------------------------
// Needy determination and per-class scheduling.
// ------------------------------------------------------------

/// A file is needy for class X when its data for X is not terminal and at
/// least one active subscription whose scope covers it wants X.
fn is_needy<X: FetchClass>(st: &DirState, name: &CompactString) -> bool {
    // O(1) fast path over the incremental counters.
    if !st.wants_any(X::KIND.request()) {
        return false;
    }

    let Some(file) = st.files.get(name) else {
        return false;
    };
    if file.is_gone {
        return false;
    }

    let wants = wanted_requests(st, file);
    if !wants.intersects(X::KIND.request()) {
        return false;
    }

    X::is_missing(file, wants)
}

fn candidate_ok<X: FetchClass>(st: &DirState, name: &CompactString) -> bool {
    is_needy::<X>(st, name) && st.files.get(name).is_some_and(|file| X::ready(file))
}

/// High-band classes walk the whole queue until something is startable;
/// low/extension classes only ever look at the current head, which is what
/// throttles the expensive classes to one file at a time.
fn pick_candidate<X: FetchClass>(st: &DirState) -> Option<CompactString> {
    match X::KIND.band() {
        QueueBand::High => st
            .queues
            .iter(QueueBand::High)
            .find(|name| candidate_ok::<X>(st, name))
            .cloned(),
        band => {
            let head = st.queues.head(band)?;
            candidate_ok::<X>(st, head).then(|| head.clone())
        }
    }
}

fn run_class<X: FetchClass>(dir: &Arc<Directory>, st: &mut DirState) -> bool {
    let mut changed = false;

    // Stop-if-unneeded: an operation already running is cancelled outright
    // when no subscription wants its result anymore.
    if let Some(name) = st.slots[X::KIND].as_ref().map(|i| i.file.clone()) {
        if !is_needy::<X>(st, &name) {
            st.cancel_slot(X::KIND, &dir.ctx.admission);
            changed = true;
        }
    }

    if st.slots[X::KIND].is_none() {
        if let Some(name) = pick_candidate::<X>(st) {
            changed |= start_fetch::<X>(dir, st, &name);
        }
    }

    changed
}

fn start_fetch<X: FetchClass>(dir: &Arc<Directory>, st: &mut DirState, name: &CompactString) -> bool {
    let wants = {
        let file = st.files.get(name).expect("candidate must exist");
        wanted_requests(st, file)
    };

    // Not-applicable files resolve in place, without I/O or admission.
    {
        let file = st.files.get_mut(name).expect("candidate must exist");
        if X::short_circuit(file, wants) {
            emit_changed(st, std::slice::from_ref(name));
            return true;
        }
    }

    if !dir.ctx.admission.try_start(dir, X::KIND.label()) {
        return false;
    }

    let token = CancellationToken::new();
    let seq = st.next_seq();
    st.slots[X::KIND] = Some(InFlightFetch {
        file: name.clone(),
        token: token.clone(),
        seq,
    });

    let (seed, snapshot) = {
        let file = st.files.get(name).expect("candidate must exist");
        (file.seed(), file.snapshot())
    };

    let ctx = FetchCtx {
        dir: Arc::downgrade(dir),
        location: dir.location().clone(),
        provider: dir.ctx.provider.clone(),
        decoder: dir.ctx.decoder.clone(),
        plugins: dir.ctx.plugins.clone(),
        settings: dir.ctx.settings.get(),
        token,
        seq,
        seed,
        snapshot,
        wants,
    };

    trace!(
        marker = "FETCH",
        operation_type = "fetch_started",
        class = X::KIND.label(),
        directory = %dir.location().display(),
        file = %name,
        "Fetch started"
    );

    let dirw = Arc::downgrade(dir);
    let task_name = name.clone();
    spawn(async move {
        let out = X::fetch(ctx).await;
        finish_fetch::<X>(&dirw, seq, &task_name, out);
    });

    true
}

/// Completion funnel: write the result back (unless the slot was cancelled
/// and reused while we ran), release the budget slot, re-evaluate.
fn finish_fetch<X: FetchClass>(
    dirw: &Weak<Directory>,
    seq: u64,
    name: &CompactString,
    out: FetchResult<X::Output>,
) {
    let Some(dir) = dirw.upgrade() else {
        // Owner torn down mid-flight; teardown already released the budget.
        return;
    };

    {
        let mut st = dir.lock_state();
        match &st.slots[X::KIND] {
            Some(inflight) if inflight.seq == seq => {}
            _ => return,
        }
        st.slots[X::KIND] = None;

        if !matches!(out, Err(FetchError::Cancelled)) {
            if let Some(file) = st.files.get_mut(name) {
                X::apply(file, out);
                let now_gone = file.is_gone;
                // Gone files are announced by the sweep, not here.
                if !now_gone {
                    emit_changed(&st, std::slice::from_ref(name));
                }
            }
        }
    }

    dir.ctx.admission.end(X::KIND.label());
    evaluate(&dir);
}

// ------------------------------------------------------------
// Ready-callback satisfaction and deferred delivery.
// ------------------------------------------------------------

fn check_ready_callbacks(dir: &Arc<Directory>, st: &mut DirState) -> bool {
    let satisfied: Vec<usize> = st
        .callbacks
        .iter()
        .enumerate()
        .filter(|(_, c)| c.active && request_satisfied(st, c.file.as_deref(), c.request))
        .map(|(idx, _)| idx)
        .collect();

    if satisfied.is_empty() {
        return false;
    }

    for idx in satisfied {
        st.callbacks[idx].active = false;
    }

    let dir = dir.clone();
    spawn(async move {
        deliver_ready(dir).await;
    });

    true
}

fn build_payload(st: &DirState, file: Option<&str>) -> ReadyPayload {
    match file {
        Some(name) => ReadyPayload {
            file: st
                .files
                .get(name)
                .filter(|f| !f.is_gone)
                .map(FileEntry::snapshot),
            files: Vec::new(),
        },
        None => ReadyPayload {
            file: None,
            files: st
                .files
                .values()
                .filter(|f| f.is_added && !f.is_gone && !f.is_self)
                .map(FileEntry::snapshot)
                .collect(),
        },
    }
}

/// Runs at the next scheduling point: drains satisfied (inactive) entries,
/// invokes them outside the lock, then re-evaluates since callback side
/// effects may add new subscriptions.
async fn deliver_ready(dir: Arc<Directory>) {
    tokio::task::yield_now().await;

    let fired: Vec<(Option<ReadyFn>, ReadyPayload)> = {
        let mut st = dir.lock_state();
        let mut fired = Vec::new();
        let mut idx = 0;
        while idx < st.callbacks.len() {
            if st.callbacks[idx].active {
                idx += 1;
                continue;
            }
            let mut entry = st.callbacks.remove(idx);
            counts_remove(&mut st.callback_counts, entry.request);
            let payload = build_payload(&st, entry.file.as_deref());
            fired.push((entry.callback.take(), payload));
        }
        fired
    };

    for (callback, payload) in fired {
        if let Some(callback) = callback {
            callback(payload);
        }
    }

    evaluate(&dir);
}

// ============================================================
// Scheduler property and scenario tests.
// ============================================================

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::config::Settings;
    use crate::fs::attributes::FileAttributes;
    use crate::fs::sim::{SimDecoder, SimFs};
    use crate::model::directory::Directory;
    use crate::model::file_entry::{DeepCountStatus, SELF_ENTRY_NAME};
    use crate::model::monitor::{ClientId, DirectoryEvent, EventReceiver};
    use crate::model::registry::DirectoryRegistry;
    use crate::plugins::ProviderRegistry;
    use crate::sched::admission::AdmissionController;

    struct Rig {
        sim: Arc<SimFs>,
        decoder: Arc<SimDecoder>,
        registry: DirectoryRegistry,
    }

    fn rig(limit: usize) -> Rig {
        let sim = Arc::new(SimFs::new());
        let decoder = Arc::new(SimDecoder::new());
        let registry = DirectoryRegistry::with_admission(
            sim.clone(),
            decoder.clone(),
            Arc::new(ProviderRegistry::new()),
            Arc::new(Settings::default()),
            Arc::new(AdmissionController::with_limit(limit)),
        );
        Rig {
            sim,
            decoder,
            registry,
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached within timeout");
    }

    fn drain(rx: &mut EventReceiver) -> Vec<DirectoryEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn added_count(events: &[DirectoryEvent]) -> usize {
        events
            .iter()
            .filter_map(|e| match e {
                DirectoryEvent::FilesAdded(files) => Some(files.len()),
                _ => None,
            })
            .sum()
    }

    fn changed_count(events: &[DirectoryEvent]) -> usize {
        events
            .iter()
            .filter_map(|e| match e {
                DirectoryEvent::FilesChanged(files) => Some(files.len()),
                _ => None,
            })
            .sum()
    }

    fn has_done_loading(events: &[DirectoryEvent]) -> bool {
        events
            .iter()
            .any(|e| matches!(e, DirectoryEvent::DoneLoading))
    }

    async fn load_listing(dir: &Arc<Directory>) -> EventReceiver {
        let (tx, mut rx) = mpsc::unbounded_channel();
        dir.monitor_add(
            ClientId::next(),
            None,
            true,
            FileAttributes::FILE_INFO,
            tx,
        );
        wait_until(|| dir.check_if_ready(None, FileAttributes::FILE_INFO)).await;
        wait_until(|| dir.is_quiescent()).await;
        drain(&mut rx);
        rx
    }

    // --------------------------------------------------------
    // Scenario A: plain file-info listing reaches quiescence.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_scenario_a_listing_with_file_info() {
        let rig = rig(10);
        rig.sim.add_dir("/d");
        rig.sim.add_file("/d/a", 10);
        rig.sim.add_file("/d/b", 20);
        rig.sim.add_file("/d/c", 30);

        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        dir.monitor_add(
            ClientId::next(),
            None,
            false,
            FileAttributes::FILE_INFO,
            tx,
        );

        wait_until(|| dir.check_if_ready(None, FileAttributes::FILE_INFO)).await;
        wait_until(|| dir.is_quiescent()).await;

        let events = drain(&mut rx);
        assert_eq!(added_count(&events), 3);
        assert!(has_done_loading(&events));
        assert_eq!(dir.active_fetch_count(), 0);
        assert_eq!(rig.registry.admission().in_flight(), 0);
        assert_eq!(dir.list_snapshots(true).len(), 3);
    }

    // --------------------------------------------------------
    // Scenario B: thumbnail on a non-image short-circuits.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_scenario_b_thumbnail_short_circuit() {
        let rig = rig(10);
        rig.sim.add_dir("/d");
        rig.sim.add_file_with("/d/a.bin", |info| {
            info.size = 8;
            info.mime_type = Some("application/octet-stream".into());
        });

        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));
        let mut rx = load_listing(&dir).await;

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_cb = fired.clone();
        dir.call_when_ready(
            ClientId::next(),
            Some("a.bin"),
            FileAttributes::THUMBNAIL,
            false,
            Some(Box::new(move |_payload| {
                fired_in_cb.fetch_add(1, Ordering::SeqCst);
            })),
        );

        wait_until(|| fired.load(Ordering::SeqCst) == 1).await;
        wait_until(|| dir.is_quiescent()).await;

        // No decode was ever issued and exactly one change was emitted.
        assert_eq!(rig.decoder.call_count(), 0);
        let events = drain(&mut rx);
        assert_eq!(changed_count(&events), 1);

        let snap = dir.file_snapshot("a.bin").unwrap();
        assert!(snap.thumbnail.is_none());
        assert!(dir.check_if_ready(Some("a.bin"), FileAttributes::THUMBNAIL));
    }

    // --------------------------------------------------------
    // P1: budget invariant under more demand than capacity.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_p1_budget_invariant() {
        let rig = rig(3);
        let mut dirs = Vec::new();
        for i in 0..5 {
            let path = format!("/d{i}");
            rig.sim.add_dir(&path);
            rig.sim.add_file(&format!("{path}/f"), 1);
            dirs.push(rig.registry.get_or_create(&PathBuf::from(&path)));
        }

        rig.sim.gates.enumerate.hold();

        let mut rxs = Vec::new();
        for dir in &dirs {
            let (tx, rx) = mpsc::unbounded_channel();
            dir.monitor_add(ClientId::next(), None, true, FileAttributes::FILE_INFO, tx);
            rxs.push(rx);
        }

        let admission = rig.registry.admission().clone();
        wait_until(|| admission.in_flight() == 3).await;

        // Sample the invariant while work is pending.
        for _ in 0..20 {
            let in_flight = admission.in_flight();
            assert!(in_flight <= 3);
            let outstanding: usize = dirs.iter().map(|d| d.active_fetch_count()).sum();
            assert!(outstanding <= in_flight);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(admission.waiting_len(), 2);

        rig.sim.gates.enumerate.release();

        wait_until(|| dirs.iter().all(|d| d.is_quiescent())).await;
        wait_until(|| admission.in_flight() == 0).await;
        for dir in &dirs {
            assert!(dir.check_if_ready(None, FileAttributes::FILE_INFO));
        }
    }

    // --------------------------------------------------------
    // P2: one in-flight operation per (directory, class).
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_p2_single_slot_per_class() {
        let rig = rig(10);
        rig.sim.add_dir("/d");
        rig.sim.add_file("/d/x", 1);
        rig.sim.add_file("/d/y", 1);

        rig.sim.gates.query.hold();

        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));
        let fired = Arc::new(AtomicUsize::new(0));
        for name in ["x", "y"] {
            let fired_in_cb = fired.clone();
            dir.call_when_ready(
                ClientId::next(),
                Some(name),
                FileAttributes::FILE_INFO,
                false,
                Some(Box::new(move |_| {
                    fired_in_cb.fetch_add(1, Ordering::SeqCst);
                })),
            );
        }

        wait_until(|| dir.active_fetch_count() == 1).await;
        // Both files are queued and needy, yet only one stat query runs.
        for _ in 0..10 {
            assert_eq!(dir.active_fetch_count(), 1);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(rig.sim.counters.query_info.load(Ordering::Relaxed), 1);

        rig.sim.gates.query.release();
        wait_until(|| fired.load(Ordering::SeqCst) == 2).await;
        wait_until(|| dir.is_quiescent()).await;
        assert_eq!(rig.sim.counters.query_info.load(Ordering::Relaxed), 2);
    }

    // --------------------------------------------------------
    // P3: a waiting directory starts as soon as a slot frees.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_p3_wake_on_freed_slot() {
        let rig = rig(1);
        rig.sim.add_dir("/a");
        rig.sim.add_file("/a/f", 1);
        rig.sim.add_dir("/b");
        rig.sim.add_file("/b/g", 1);

        rig.sim.gates.enumerate.hold();

        let dir_a = rig.registry.get_or_create(&PathBuf::from("/a"));
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        dir_a.monitor_add(ClientId::next(), None, true, FileAttributes::FILE_INFO, tx_a);

        let admission = rig.registry.admission().clone();
        wait_until(|| admission.in_flight() == 1).await;

        let dir_b = rig.registry.get_or_create(&PathBuf::from("/b"));
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        dir_b.monitor_add(ClientId::next(), None, true, FileAttributes::FILE_INFO, tx_b);

        wait_until(|| admission.waiting_len() == 1).await;
        assert_eq!(dir_b.active_fetch_count(), 0);

        // Free the slot; no further external stimulus follows.
        rig.sim.gates.enumerate.release();

        wait_until(|| dir_b.check_if_ready(None, FileAttributes::FILE_INFO)).await;
        wait_until(|| dir_a.is_quiescent() && dir_b.is_quiescent()).await;
        assert_eq!(admission.in_flight(), 0);
    }

    // --------------------------------------------------------
    // P4: monitor add is replace-on-add, counters included.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_p4_monitor_add_replaces() {
        let rig = rig(10);
        rig.sim.add_dir("/d");
        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));

        let client = ClientId::next();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        dir.monitor_add(client, None, false, FileAttributes::FILE_INFO, tx1);

        let counts_after_one = dir.lock_state().monitor_counts.clone();

        let (tx2, _rx2) = mpsc::unbounded_channel();
        dir.monitor_add(client, None, false, FileAttributes::FILE_INFO, tx2);

        let st = dir.lock_state();
        assert_eq!(st.monitors.len(), 1);
        assert_eq!(st.monitor_counts, counts_after_one);
    }

    // --------------------------------------------------------
    // P5: ready callbacks fire exactly once and are removed.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_p5_callback_one_shot() {
        let rig = rig(10);
        rig.sim.add_dir("/d");
        rig.sim.add_file("/d/f", 1);

        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_cb = fired.clone();
        dir.call_when_ready(
            ClientId::next(),
            Some("f"),
            FileAttributes::FILE_INFO,
            false,
            Some(Box::new(move |payload| {
                assert!(payload.file.is_some());
                fired_in_cb.fetch_add(1, Ordering::SeqCst);
            })),
        );

        wait_until(|| fired.load(Ordering::SeqCst) == 1).await;
        wait_until(|| dir.is_quiescent()).await;
        assert!(dir.lock_state().callbacks.is_empty());

        // Further evaluation rounds cannot fire it again.
        dir.force_reload(FileAttributes::FILE_INFO);
        wait_until(|| dir.is_quiescent()).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    // --------------------------------------------------------
    // P6: directory-wide cancel releases the budget immediately.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_p6_cancel_releases_budget() {
        let rig = rig(4);
        rig.sim.add_dir("/d");
        rig.sim.add_file("/d/x", 1);

        rig.sim.gates.enumerate.hold();
        rig.sim.gates.query.hold();

        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));
        let (tx, _rx) = mpsc::unbounded_channel();
        dir.monitor_add(ClientId::next(), None, true, FileAttributes::FILE_INFO, tx);
        dir.call_when_ready(
            ClientId::next(),
            Some("x"),
            FileAttributes::FILE_INFO,
            false,
            None,
        );

        let admission = rig.registry.admission().clone();
        // Listing enumeration plus one stat query are both held open.
        wait_until(|| admission.in_flight() == 2).await;
        assert_eq!(dir.active_fetch_count(), 2);

        dir.cancel();

        // Synchronous release, no deferred bookkeeping.
        assert_eq!(admission.in_flight(), 0);
        assert_eq!(dir.active_fetch_count(), 0);

        rig.sim.gates.enumerate.release();
        rig.sim.gates.query.release();
    }

    // --------------------------------------------------------
    // P7: deep counts never cross a filesystem boundary.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_p7_deep_count_filesystem_boundary() {
        let rig = rig(10);
        rig.sim.add_dir("/root");
        rig.sim.add_file("/root/f1", 100);
        rig.sim.add_dir("/root/sub");
        rig.sim.add_file("/root/sub/f2", 200);
        rig.sim.add_dir_with("/root/other", |info| {
            info.filesystem_id = "fsB".into();
        });
        rig.sim.add_file_with("/root/other/f3", |info| {
            info.size = 400;
            info.allocated_size = 400;
            info.filesystem_id = "fsB".into();
        });

        let dir = rig.registry.get_or_create(&PathBuf::from("/root"));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_cb = fired.clone();
        dir.call_when_ready(
            ClientId::next(),
            Some(SELF_ENTRY_NAME),
            FileAttributes::DEEP_COUNTS,
            false,
            Some(Box::new(move |_| {
                fired_in_cb.fetch_add(1, Ordering::SeqCst);
            })),
        );

        wait_until(|| fired.load(Ordering::SeqCst) == 1).await;
        wait_until(|| dir.is_quiescent()).await;

        let snap = dir.file_snapshot(SELF_ENTRY_NAME).unwrap();
        assert_eq!(snap.deep_counts.status, DeepCountStatus::Done);
        // The foreign-filesystem subtree is excluded entirely.
        assert_eq!(snap.deep_counts.directory_count, 1);
        assert_eq!(snap.deep_counts.file_count, 2);
        assert_eq!(snap.deep_counts.total_size, 300);
        assert_eq!(snap.deep_counts.unreadable_count, 0);
    }

    // --------------------------------------------------------
    // P8: hard links count per entry but are sized once.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_p8_deep_count_hard_link_dedup() {
        let rig = rig(10);
        rig.sim.add_dir("/d");
        rig.sim.add_file_with("/d/h1", |info| {
            info.size = 100;
            info.allocated_size = 100;
            info.inode = 7777;
        });
        rig.sim.add_file_with("/d/h2", |info| {
            info.size = 100;
            info.allocated_size = 100;
            info.inode = 7777;
        });
        rig.sim.add_file("/d/f3", 50);

        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));
        dir.call_when_ready(
            ClientId::next(),
            Some(SELF_ENTRY_NAME),
            FileAttributes::DEEP_COUNTS,
            false,
            None,
        );

        wait_until(|| {
            dir.file_snapshot(SELF_ENTRY_NAME)
                .is_some_and(|s| s.deep_counts.status == DeepCountStatus::Done)
        })
        .await;
        wait_until(|| dir.is_quiescent()).await;

        let snap = dir.file_snapshot(SELF_ENTRY_NAME).unwrap();
        assert_eq!(snap.deep_counts.file_count, 3);
        assert_eq!(snap.deep_counts.total_size, 150);
        assert_eq!(snap.deep_counts.on_disk_size, 150);
    }

    // --------------------------------------------------------
    // Scenario C: independent callbacks with nested attribute sets.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_scenario_c_subset_callbacks_fire_independently() {
        let rig = rig(10);
        rig.sim.add_dir("/d");
        rig.sim.add_dir("/d/sub");
        rig.sim.add_file("/d/sub/inner", 5);

        // Shallow count needs an enumeration; hold it so the broader
        // callback stays pending after the narrow one fires.
        rig.sim.gates.enumerate.hold();

        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));
        let narrow_fired = Arc::new(AtomicUsize::new(0));
        let broad_fired = Arc::new(AtomicUsize::new(0));

        let narrow_in_cb = narrow_fired.clone();
        dir.call_when_ready(
            ClientId::next(),
            Some("sub"),
            FileAttributes::FILE_INFO,
            false,
            Some(Box::new(move |_| {
                narrow_in_cb.fetch_add(1, Ordering::SeqCst);
            })),
        );

        let broad_in_cb = broad_fired.clone();
        dir.call_when_ready(
            ClientId::next(),
            Some("sub"),
            FileAttributes::FILE_INFO | FileAttributes::DIRECTORY_ITEM_COUNT,
            false,
            Some(Box::new(move |_| {
                broad_in_cb.fetch_add(1, Ordering::SeqCst);
            })),
        );

        wait_until(|| narrow_fired.load(Ordering::SeqCst) == 1).await;
        assert_eq!(broad_fired.load(Ordering::SeqCst), 0);
        // Firing the narrow one left the broader registration in place.
        assert_eq!(dir.lock_state().callbacks.len(), 1);

        rig.sim.gates.enumerate.release();
        wait_until(|| broad_fired.load(Ordering::SeqCst) == 1).await;
        wait_until(|| dir.is_quiescent()).await;
        assert!(dir.lock_state().callbacks.is_empty());
    }

    // --------------------------------------------------------
    // Reload drops files that were not re-seen.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_reload_removes_unconfirmed_files() {
        let rig = rig(10);
        rig.sim.add_dir("/d");
        rig.sim.add_file("/d/keep", 1);
        rig.sim.add_file("/d/ghost", 1);

        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));
        let mut rx = load_listing(&dir).await;
        assert_eq!(dir.list_snapshots(true).len(), 2);

        rig.sim.remove_entry("/d/ghost");
        dir.force_reload(FileAttributes::FILE_INFO);

        wait_until(|| dir.file_snapshot("ghost").is_none()).await;
        wait_until(|| dir.is_quiescent()).await;

        let events = drain(&mut rx);
        let saw_gone = events.iter().any(|e| match e {
            DirectoryEvent::FilesChanged(files) => {
                files.iter().any(|f| f.name == "ghost" && f.is_gone)
            }
            _ => false,
        });
        assert!(saw_gone, "removal must surface as a gone change event");
        assert_eq!(dir.list_snapshots(true).len(), 1);
    }

    // --------------------------------------------------------
    // A file-scoped request on a vanished entity resolves, not hangs.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_callback_on_missing_file_resolves() {
        let rig = rig(10);
        rig.sim.add_dir("/d");

        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_cb = fired.clone();
        dir.call_when_ready(
            ClientId::next(),
            Some("nope"),
            FileAttributes::FILE_INFO,
            false,
            Some(Box::new(move |payload| {
                assert!(payload.file.is_none());
                fired_in_cb.fetch_add(1, Ordering::SeqCst);
            })),
        );

        wait_until(|| fired.load(Ordering::SeqCst) == 1).await;
        wait_until(|| dir.is_quiescent()).await;
    }

    // --------------------------------------------------------
    // Listing failure: load-error event, consistent partial state.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_load_error_reaches_quiescence() {
        let rig = rig(10);
        rig.sim.add_dir("/e");
        rig.sim.mark_unreadable("/e");

        let dir = rig.registry.get_or_create(&PathBuf::from("/e"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        dir.monitor_add(ClientId::next(), None, true, FileAttributes::FILE_INFO, tx);

        wait_until(|| dir.is_quiescent()).await;

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, DirectoryEvent::LoadError { .. })));
        assert!(has_done_loading(&events));
        assert_eq!(rig.registry.admission().in_flight(), 0);
    }

    // --------------------------------------------------------
    // Stop-if-unneeded: a running fetch dies when interest vanishes.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_unneeded_inflight_work_is_cancelled() {
        let rig = rig(10);
        rig.sim.add_dir("/d");
        rig.sim.add_file("/d/f", 1);

        rig.sim.gates.enumerate.hold();

        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));
        let client = ClientId::next();
        let (tx, _rx) = mpsc::unbounded_channel();
        dir.monitor_add(client, None, true, FileAttributes::FILE_INFO, tx);

        let admission = rig.registry.admission().clone();
        wait_until(|| admission.in_flight() == 1).await;

        dir.monitor_remove(client);

        wait_until(|| admission.in_flight() == 0).await;
        assert_eq!(dir.active_fetch_count(), 0);
        // The listing never completed, so it is still not up to date.
        assert!(!dir.check_if_ready(None, FileAttributes::FILE_INFO));

        rig.sim.gates.enumerate.release();
    }

    // --------------------------------------------------------
    // Thumbnail staleness: cached decode rejected, original accepted.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_stale_cached_thumbnail_falls_back_to_original() {
        let rig = rig(10);
        rig.sim.add_dir("/d");
        rig.sim.add_dir("/thumbs");
        rig.sim.add_file_with("/thumbs/img.png", |info| {
            info.mime_type = Some("image/png".into());
        });
        rig.sim.set_contents("/thumbs/img.png", b"cached-bytes");
        rig.sim.add_file_with("/d/img.png", |info| {
            info.mime_type = Some("image/png".into());
            info.thumbnail_path = Some(PathBuf::from("/thumbs/img.png"));
        });
        rig.sim.set_contents("/d/img.png", b"original-bytes");

        // Decoder reports an embedded mtime that disagrees with the file's.
        rig.decoder.set_embedded_mtime(Some(std::time::UNIX_EPOCH));

        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));
        dir.call_when_ready(
            ClientId::next(),
            Some("img.png"),
            FileAttributes::THUMBNAIL,
            false,
            None,
        );

        wait_until(|| {
            dir.file_snapshot("img.png")
                .is_some_and(|s| s.thumbnail.is_some())
        })
        .await;
        wait_until(|| dir.is_quiescent()).await;

        // Cached decode was stale, so exactly one retry hit the original.
        assert_eq!(rig.decoder.call_count(), 2);
        let st = dir.lock_state();
        let file = st.files.get("img.png").unwrap();
        assert!(file.thumbnail.from_original);
    }

    // --------------------------------------------------------
    // Mount resolution: activation match, shadow skip, root check.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_mount_resolution_skips_shadowed_and_checks_root() {
        use crate::fs::provider::{FileKind, MountInfo};

        let rig = rig(10);
        rig.sim.add_dir("/vol");
        rig.sim.add_file_with("/vol/usb", |info| {
            info.kind = FileKind::Mountable;
        });
        rig.sim.add_dir_with("/vol/mnt", |info| {
            info.is_mountpoint = true;
        });

        // Shadowed mount on the same activation root must lose.
        rig.sim.add_mount(MountInfo {
            name: "shadow".into(),
            root: PathBuf::from("/media/shadow"),
            activation_root: Some(PathBuf::from("/vol/usb")),
            is_shadowed: true,
        });
        rig.sim.add_mount(MountInfo {
            name: "usb".into(),
            root: PathBuf::from("/media/usb"),
            activation_root: Some(PathBuf::from("/vol/usb")),
            is_shadowed: false,
        });
        // Enclosing mount of /vol/mnt whose root differs: rejected.
        rig.sim.add_mount(MountInfo {
            name: "outer".into(),
            root: PathBuf::from("/vol"),
            activation_root: None,
            is_shadowed: false,
        });

        let dir = rig.registry.get_or_create(&PathBuf::from("/vol"));
        dir.call_when_ready(ClientId::next(), Some("usb"), FileAttributes::MOUNT, false, None);
        dir.call_when_ready(ClientId::next(), Some("mnt"), FileAttributes::MOUNT, false, None);

        wait_until(|| dir.check_if_ready(Some("usb"), FileAttributes::MOUNT)).await;
        wait_until(|| dir.check_if_ready(Some("mnt"), FileAttributes::MOUNT)).await;
        wait_until(|| dir.is_quiescent()).await;

        let usb = dir.file_snapshot("usb").unwrap();
        assert_eq!(usb.mount.as_ref().map(|m| m.name.as_str()), Some("usb"));

        let mnt = dir.file_snapshot("mnt").unwrap();
        assert!(mnt.mount.is_none());
    }

    // --------------------------------------------------------
    // Filesystem info flags land on the entry.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_filesystem_info_fetch() {
        use crate::fs::provider::FilesystemInfo;

        let rig = rig(10);
        rig.sim.add_dir("/d");
        rig.sim.add_file("/d/f", 1);
        rig.sim.set_filesystem_info(
            "/d/f",
            FilesystemInfo {
                read_only: true,
                use_preview: false,
            },
        );

        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));
        dir.call_when_ready(
            ClientId::next(),
            Some("f"),
            FileAttributes::FILESYSTEM_INFO,
            false,
            None,
        );

        wait_until(|| dir.check_if_ready(Some("f"), FileAttributes::FILESYSTEM_INFO)).await;
        wait_until(|| dir.is_quiescent()).await;

        let snap = dir.file_snapshot("f").unwrap();
        assert_eq!(
            snap.filesystem,
            Some(FilesystemInfo {
                read_only: true,
                use_preview: false,
            })
        );
    }

    // --------------------------------------------------------
    // Leading text: bounded read for text files only.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_top_left_text_reads_bounded_prefix() {
        let rig = rig(10);
        rig.sim.add_dir("/d");
        rig.sim.add_file_with("/d/notes.txt", |info| {
            info.mime_type = Some("text/plain".into());
        });
        let mut body = String::new();
        for i in 0..100 {
            body.push_str(&format!("line {i}\n"));
        }
        rig.sim.set_contents("/d/notes.txt", body.as_bytes());

        let dir = rig.registry.get_or_create(&PathBuf::from("/d"));
        dir.call_when_ready(
            ClientId::next(),
            Some("notes.txt"),
            FileAttributes::TOP_LEFT_TEXT,
            false,
            None,
        );

        wait_until(|| dir.check_if_ready(Some("notes.txt"), FileAttributes::TOP_LEFT_TEXT)).await;
        wait_until(|| dir.is_quiescent()).await;

        let snap = dir.file_snapshot("notes.txt").unwrap();
        let text = snap.top_left_text.expect("text files yield leading text");
        assert!(text.starts_with("line 0"));
        // Default caps: at most 24 lines from a 1 KiB prefix.
        assert!(text.lines().count() <= 24);
    }

    // --------------------------------------------------------
    // Extension providers run sequentially; one failure is skipped.
    // --------------------------------------------------------
    #[tokio::test]
    async fn test_extension_providers_failure_does_not_block_rest() {
        use crate::error::{CoreError, CoreResult};
        use crate::model::file_entry::FileSnapshot;
        use crate::plugins::{InfoPatch, InfoProvider};
        use tokio_util::sync::CancellationToken;

        struct TagProvider {
            fail: bool,
        }

        #[async_trait::async_trait]
        impl InfoProvider for TagProvider {
            fn name(&self) -> &str {
                "tag"
            }

            async fn update_file_info(
                &self,
                file: &FileSnapshot,
                _token: &CancellationToken,
            ) -> CoreResult<InfoPatch> {
                if self.fail {
                    return Err(CoreError::provider("tag", "simulated failure"));
                }
                Ok(InfoPatch::single("origin", file.name.as_str()))
            }
        }

        let sim = Arc::new(SimFs::new());
        sim.add_dir("/d");
        sim.add_file("/d/f", 1);

        let plugins = Arc::new(ProviderRegistry::new());
        plugins.register(Arc::new(TagProvider { fail: true }));
        plugins.register(Arc::new(TagProvider { fail: false }));

        let registry = DirectoryRegistry::with_admission(
            sim,
            Arc::new(SimDecoder::new()),
            plugins,
            Arc::new(Settings::default()),
            Arc::new(AdmissionController::with_limit(10)),
        );

        let dir = registry.get_or_create(&PathBuf::from("/d"));
        dir.call_when_ready(
            ClientId::next(),
            Some("f"),
            FileAttributes::EXTENSION_INFO,
            false,
            None,
        );

        wait_until(|| dir.check_if_ready(Some("f"), FileAttributes::EXTENSION_INFO)).await;
        wait_until(|| dir.is_quiescent()).await;

        let snap = dir.file_snapshot("f").unwrap();
        assert_eq!(
            snap.extension_attributes,
            vec![("origin".into(), "f".into())]
        );
    }
}
