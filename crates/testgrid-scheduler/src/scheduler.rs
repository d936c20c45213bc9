//! Broadcast scheduler — every admitted worker runs the full suite.
//!
//! Workers join, each reports the collection of test ids it discovered,
//! and once all expected workers have reported, dispatch sends every
//! admitted worker its entire collection. There is no partitioning and
//! no work-stealing; the only hand-off is the one-time transfer of a
//! dead worker's unfinished remainder to a replacement worker with an
//! equal spec and an identical collection.
//!
//! The scheduler performs no I/O and never blocks: it is driven one
//! event at a time by the surrounding session loop, which owns all
//! waiting.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use testgrid_core::{WorkerSpec, collection_diff_report};

use crate::error::{SchedulerError, SchedulerResult};
use crate::handle::{Diagnostics, LogDiagnostics, WorkerHandle};
use crate::policy::AllowList;

/// Per-worker scheduling state, kept in join order.
struct WorkerSlot {
    handle: Arc<dyn WorkerHandle>,
    /// Collection indices this worker still owes. Items are consumed in
    /// order, so the head is the item currently in flight.
    pending: Vec<usize>,
    /// Dispatch already happened; a worker is dispatched at most once.
    started: bool,
    /// The worker's collection counted toward collection completion,
    /// making it eligible for a full-range dispatch. Workers reporting
    /// after completion (replacements) are never enrolled.
    enrolled: bool,
}

/// Unfinished work left behind by a dead worker, awaiting a replacement
/// with an equal spec.
struct OrphanedWork {
    worker_id: String,
    spec: WorkerSpec,
    pending: Vec<usize>,
}

/// Scheduler state and decision logic.
///
/// All state lives in this one owned value; every operation is a
/// synchronous state transition triggered by a single worker lifecycle
/// event or by an explicit dispatch request.
pub struct BroadcastScheduler {
    /// Number of workers that must report a collection before dispatch,
    /// fixed at construction from the pool configuration.
    expected_workers: usize,
    /// Registered workers in join order.
    slots: Vec<WorkerSlot>,
    /// Every collection ever reported, kept across worker death so a
    /// replacement can be checked against its predecessor.
    collections: HashMap<String, Vec<String>>,
    /// Orphaned remainders in death order.
    orphans: Vec<OrphanedWork>,
    /// Monotonic: once every expected worker has reported, this never
    /// resets.
    collection_complete: bool,
    allow_list: AllowList,
    diagnostics: Box<dyn Diagnostics>,
}

impl BroadcastScheduler {
    pub fn new(expected_workers: usize, allow_list: AllowList) -> Self {
        Self {
            expected_workers,
            slots: Vec::new(),
            collections: HashMap::new(),
            orphans: Vec::new(),
            collection_complete: false,
            allow_list,
            diagnostics: Box::new(LogDiagnostics),
        }
    }

    /// Replace the diagnostics sink.
    pub fn with_diagnostics(mut self, diagnostics: Box<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Register a newly connected worker.
    pub fn join(&mut self, handle: Arc<dyn WorkerHandle>) -> SchedulerResult<()> {
        if self.slot_index(handle.id()).is_some() {
            return Err(SchedulerError::AlreadyRegistered(handle.id().to_string()));
        }
        debug!(worker = handle.id(), spec = %handle.spec(), "worker joined");
        self.slots.push(WorkerSlot {
            handle,
            pending: Vec::new(),
            started: false,
            enrolled: false,
        });
        Ok(())
    }

    /// Record the ordered test collection a worker discovered.
    ///
    /// Before collection completion this enrolls the worker for a
    /// full-range dispatch. Afterwards the report can only come from a
    /// replacement: if a dead worker with the same spec left unfinished
    /// work and the collections match element for element, the
    /// replacement inherits that remainder. On any mismatch the
    /// hand-off is refused, the orphan is left in place for a later
    /// replacement, and a diff goes to the diagnostics sink.
    pub fn report_collection(
        &mut self,
        worker_id: &str,
        collection: Vec<String>,
    ) -> SchedulerResult<()> {
        let idx = self
            .slot_index(worker_id)
            .ok_or_else(|| SchedulerError::UnknownWorker(worker_id.to_string()))?;

        if !self.collection_complete {
            self.collections.insert(worker_id.to_string(), collection);
            let slot = &mut self.slots[idx];
            slot.pending.clear();
            slot.enrolled = true;
            if self.collections.len() >= self.expected_workers {
                self.collection_complete = true;
                info!(
                    workers = self.expected_workers,
                    "collection complete on all workers"
                );
            }
            return Ok(());
        }

        let spec = self.slots[idx].handle.spec().clone();
        let claimed = match self.orphans.iter().position(|o| o.spec == spec) {
            Some(pos) => {
                let dead_id = self.orphans[pos].worker_id.clone();
                let dead_collection = self
                    .collections
                    .get(&dead_id)
                    .ok_or_else(|| SchedulerError::MissingCollection(dead_id.clone()))?;
                if dead_collection != &collection {
                    warn!(
                        dead = %dead_id,
                        replacement = worker_id,
                        "replacement collection mismatch, hand-off refused"
                    );
                    let report =
                        collection_diff_report(dead_collection, &collection, &dead_id, worker_id);
                    self.diagnostics.report(&report);
                    None
                } else {
                    Some(pos)
                }
            }
            None => {
                debug!(
                    worker = worker_id,
                    "no orphaned work matches this worker's spec"
                );
                None
            }
        };

        if let Some(pos) = claimed {
            let orphan = self.orphans.remove(pos);
            info!(
                dead = %orphan.worker_id,
                replacement = worker_id,
                items = orphan.pending.len(),
                "replacement inherits orphaned work"
            );
            self.slots[idx].pending = orphan.pending;
        }
        self.collections.insert(worker_id.to_string(), collection);
        Ok(())
    }

    /// Record that a worker finished one collection index.
    pub fn mark_complete(&mut self, worker_id: &str, item_index: usize) -> SchedulerResult<()> {
        let idx = self
            .slot_index(worker_id)
            .ok_or_else(|| SchedulerError::UnknownWorker(worker_id.to_string()))?;
        let slot = &mut self.slots[idx];
        let pos = slot
            .pending
            .iter()
            .position(|&i| i == item_index)
            .ok_or_else(|| SchedulerError::ItemNotPending {
                worker: worker_id.to_string(),
                index: item_index,
            })?;
        slot.pending.remove(pos);
        debug!(
            worker = worker_id,
            index = item_index,
            remaining = slot.pending.len(),
            "item complete"
        );
        Ok(())
    }

    /// Deregister a dead worker.
    ///
    /// Returns the identifier of the item the worker was executing when
    /// it died, if any. Unfinished indices beyond that one are kept
    /// aside for a spec-matching replacement.
    pub fn remove(&mut self, worker_id: &str) -> SchedulerResult<Option<String>> {
        let idx = self
            .slot_index(worker_id)
            .ok_or_else(|| SchedulerError::UnknownWorker(worker_id.to_string()))?;
        let slot = self.slots.remove(idx);
        let mut pending = slot.pending;
        if pending.is_empty() {
            debug!(worker = worker_id, "worker left with nothing outstanding");
            return Ok(None);
        }

        let crash_index = pending.remove(0);
        let collection = self
            .collections
            .get(worker_id)
            .ok_or_else(|| SchedulerError::MissingCollection(worker_id.to_string()))?;
        // Pending indices always lie inside the stored collection.
        let crash_item = collection[crash_index].clone();
        warn!(
            worker = worker_id,
            item = %crash_item,
            "worker died while executing an item"
        );

        if !pending.is_empty() {
            info!(
                worker = worker_id,
                items = pending.len(),
                "keeping orphaned work for a replacement"
            );
            self.orphans.push(OrphanedWork {
                worker_id: worker_id.to_string(),
                spec: slot.handle.spec().clone(),
                pending,
            });
        }
        Ok(Some(crash_item))
    }

    /// Send run commands to every registered worker not yet dispatched.
    ///
    /// May be called repeatedly; previously dispatched workers are left
    /// untouched. Calling before every expected worker has reported its
    /// collection is an error.
    pub fn dispatch(&mut self) -> SchedulerResult<()> {
        if !self.collection_complete {
            return Err(SchedulerError::CollectionIncomplete {
                expected: self.expected_workers,
            });
        }
        for slot in &mut self.slots {
            if slot.started {
                continue;
            }
            let worker_id = slot.handle.id();

            if !self.allow_list.is_allowed(worker_id) {
                info!(worker = worker_id, "worker excluded by allow-list, shutting down");
                slot.handle.shutdown();
                slot.started = true;
                continue;
            }

            if slot.pending.is_empty() {
                if !slot.enrolled {
                    // A replacement that matched no orphan, or a worker
                    // that never reported: it has nothing to run.
                    continue;
                }
                let collection_len = self
                    .collections
                    .get(worker_id)
                    .map(Vec::len)
                    .ok_or_else(|| SchedulerError::MissingCollection(worker_id.to_string()))?;
                slot.pending = (0..collection_len).collect();
                debug!(
                    worker = worker_id,
                    items = collection_len,
                    "dispatching full collection"
                );
                slot.handle.send_run_all();
                slot.handle.shutdown();
            } else {
                // Inherited remainder. No shutdown here: a replacement
                // keeps running until its owed subset drains.
                debug!(
                    worker = worker_id,
                    items = slot.pending.len(),
                    "dispatching inherited remainder"
                );
                slot.handle.send_run_subset(slot.pending.clone());
            }
            slot.started = true;
        }
        Ok(())
    }

    /// True while any registered worker still owes work.
    pub fn has_pending(&self) -> bool {
        self.slots.iter().any(|s| !s.pending.is_empty())
    }

    /// True once the run can finish: all expected collections are in,
    /// no orphaned work is waiting for a replacement, and every worker
    /// is down to at most the one item it is currently executing.
    pub fn tests_finished(&self) -> bool {
        self.collection_complete
            && self.orphans.is_empty()
            && self.slots.iter().all(|s| s.pending.len() < 2)
    }

    /// All expected workers have reported a collection.
    pub fn collection_complete(&self) -> bool {
        self.collection_complete
    }

    /// Registered worker handles in join order.
    pub fn workers(&self) -> Vec<Arc<dyn WorkerHandle>> {
        self.slots.iter().map(|s| Arc::clone(&s.handle)).collect()
    }

    /// Number of workers expected to report a collection.
    pub fn expected_workers(&self) -> usize {
        self.expected_workers
    }

    /// Indices a worker still owes, if it is registered.
    pub fn pending(&self, worker_id: &str) -> Option<&[usize]> {
        self.slot_index(worker_id)
            .map(|idx| self.slots[idx].pending.as_slice())
    }

    /// The collection a worker reported, if any. Collections survive
    /// worker death.
    pub fn collection(&self, worker_id: &str) -> Option<&[String]> {
        self.collections.get(worker_id).map(Vec::as_slice)
    }

    fn slot_index(&self, worker_id: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.handle.id() == worker_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Command {
        RunAll,
        RunSubset(Vec<usize>),
        Shutdown,
    }

    struct RecordingHandle {
        id: String,
        spec: WorkerSpec,
        commands: Mutex<Vec<Command>>,
    }

    impl RecordingHandle {
        fn new(id: &str, spec: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                spec: WorkerSpec::parse(spec).unwrap(),
                commands: Mutex::new(Vec::new()),
            })
        }

        fn commands(&self) -> Vec<Command> {
            self.commands.lock().unwrap().clone()
        }
    }

    impl WorkerHandle for RecordingHandle {
        fn id(&self) -> &str {
            &self.id
        }
        fn spec(&self) -> &WorkerSpec {
            &self.spec
        }
        fn send_run_all(&self) {
            self.commands.lock().unwrap().push(Command::RunAll);
        }
        fn send_run_subset(&self, indices: Vec<usize>) {
            self.commands.lock().unwrap().push(Command::RunSubset(indices));
        }
        fn shutdown(&self) {
            self.commands.lock().unwrap().push(Command::Shutdown);
        }
    }

    #[derive(Default)]
    struct RecordingDiagnostics {
        reports: Mutex<Vec<String>>,
    }

    impl Diagnostics for Arc<RecordingDiagnostics> {
        fn report(&self, message: &str) {
            self.reports.lock().unwrap().push(message.to_string());
        }
    }

    fn items(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    /// Two joined `popen` workers, collections not yet reported.
    fn two_workers() -> (BroadcastScheduler, Arc<RecordingHandle>, Arc<RecordingHandle>) {
        let mut sched = BroadcastScheduler::new(2, AllowList::allow_all());
        let w0 = RecordingHandle::new("w0", "popen");
        let w1 = RecordingHandle::new("w1", "popen");
        sched.join(w0.clone()).unwrap();
        sched.join(w1.clone()).unwrap();
        (sched, w0, w1)
    }

    #[test]
    fn duplicate_join_is_rejected() {
        let (mut sched, _, _) = two_workers();
        let again = RecordingHandle::new("w0", "popen");
        assert!(matches!(
            sched.join(again),
            Err(SchedulerError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn collection_completes_when_all_workers_report() {
        let (mut sched, _, _) = two_workers();
        sched.report_collection("w0", items(&["t1", "t2"])).unwrap();
        assert!(!sched.collection_complete());
        sched.report_collection("w1", items(&["t1", "t2"])).unwrap();
        assert!(sched.collection_complete());
    }

    #[test]
    fn report_from_unknown_worker_fails() {
        let (mut sched, _, _) = two_workers();
        assert!(matches!(
            sched.report_collection("w9", items(&["t1"])),
            Err(SchedulerError::UnknownWorker(_))
        ));
    }

    #[test]
    fn dispatch_before_collection_complete_fails() {
        let (mut sched, _, _) = two_workers();
        sched.report_collection("w0", items(&["t1"])).unwrap();
        assert!(matches!(
            sched.dispatch(),
            Err(SchedulerError::CollectionIncomplete { expected: 2 })
        ));
    }

    #[test]
    fn full_run_without_failures() {
        let (mut sched, w0, w1) = two_workers();
        sched
            .report_collection("w0", items(&["t1", "t2", "t3"]))
            .unwrap();
        sched
            .report_collection("w1", items(&["t1", "t2", "t3"]))
            .unwrap();
        sched.dispatch().unwrap();

        for w in [&w0, &w1] {
            assert_eq!(w.commands(), vec![Command::RunAll, Command::Shutdown]);
        }
        assert_eq!(sched.pending("w0").unwrap(), &[0, 1, 2]);
        assert_eq!(sched.pending("w1").unwrap(), &[0, 1, 2]);
        assert!(sched.has_pending());
        assert!(!sched.tests_finished());

        for index in 0..3 {
            sched.mark_complete("w0", index).unwrap();
            sched.mark_complete("w1", index).unwrap();
        }
        assert!(!sched.has_pending());
        assert!(sched.tests_finished());
    }

    #[test]
    fn dispatch_is_idempotent() {
        let (mut sched, w0, w1) = two_workers();
        sched.report_collection("w0", items(&["t1"])).unwrap();
        sched.report_collection("w1", items(&["t1"])).unwrap();
        sched.dispatch().unwrap();
        let before = (w0.commands().len(), w1.commands().len());
        sched.dispatch().unwrap();
        assert_eq!((w0.commands().len(), w1.commands().len()), before);
    }

    #[test]
    fn one_in_flight_item_is_tolerated_by_tests_finished() {
        let (mut sched, _, _) = two_workers();
        sched
            .report_collection("w0", items(&["t1", "t2", "t3"]))
            .unwrap();
        sched
            .report_collection("w1", items(&["t1", "t2", "t3"]))
            .unwrap();
        sched.dispatch().unwrap();

        for index in 0..2 {
            sched.mark_complete("w0", index).unwrap();
            sched.mark_complete("w1", index).unwrap();
        }
        assert!(sched.has_pending());
        assert!(sched.tests_finished());
    }

    #[test]
    fn completing_unassigned_item_fails() {
        let (mut sched, _, _) = two_workers();
        sched.report_collection("w0", items(&["t1", "t2"])).unwrap();
        sched.report_collection("w1", items(&["t1", "t2"])).unwrap();
        sched.dispatch().unwrap();

        sched.mark_complete("w0", 0).unwrap();
        assert!(matches!(
            sched.mark_complete("w0", 0),
            Err(SchedulerError::ItemNotPending { index: 0, .. })
        ));
        assert!(matches!(
            sched.mark_complete("w9", 1),
            Err(SchedulerError::UnknownWorker(_))
        ));
    }

    #[test]
    fn clean_death_yields_no_crash_item() {
        let (mut sched, _, _) = two_workers();
        sched.report_collection("w0", items(&["t1"])).unwrap();
        sched.report_collection("w1", items(&["t1"])).unwrap();

        assert_eq!(sched.remove("w1").unwrap(), None);
        assert_eq!(sched.workers().len(), 1);
        // The collection outlives the worker.
        assert!(sched.collection("w1").is_some());
    }

    #[test]
    fn removing_twice_fails() {
        let (mut sched, _, _) = two_workers();
        sched.remove("w0").unwrap();
        assert!(matches!(
            sched.remove("w0"),
            Err(SchedulerError::UnknownWorker(_))
        ));
    }

    /// Dispatch, then finish everything except `survivors` on `worker`.
    fn drain_except(sched: &mut BroadcastScheduler, worker: &str, survivors: &[usize]) {
        let pending: Vec<usize> = sched.pending(worker).unwrap().to_vec();
        for index in pending {
            if !survivors.contains(&index) {
                sched.mark_complete(worker, index).unwrap();
            }
        }
    }

    fn suite() -> Vec<String> {
        items(&["t0", "t1", "t2", "t3", "t4"])
    }

    /// Scheduler with w0 dead mid-run: crash item "t2", orphan [3, 4].
    fn crashed_run() -> (BroadcastScheduler, Arc<RecordingHandle>) {
        let (mut sched, _, w1) = two_workers();
        sched.report_collection("w0", suite()).unwrap();
        sched.report_collection("w1", suite()).unwrap();
        sched.dispatch().unwrap();

        drain_except(&mut sched, "w0", &[2, 3, 4]);
        assert_eq!(sched.remove("w0").unwrap(), Some("t2".to_string()));
        (sched, w1)
    }

    #[test]
    fn crash_hands_remainder_to_matching_replacement() {
        let (mut sched, _) = crashed_run();
        assert!(!sched.tests_finished());

        let w2 = RecordingHandle::new("w2", "popen");
        sched.join(w2.clone()).unwrap();
        sched.report_collection("w2", suite()).unwrap();
        assert_eq!(sched.pending("w2").unwrap(), &[3, 4]);

        sched.dispatch().unwrap();
        assert_eq!(w2.commands(), vec![Command::RunSubset(vec![3, 4])]);

        sched.mark_complete("w2", 3).unwrap();
        sched.mark_complete("w2", 4).unwrap();
        drain_except(&mut sched, "w1", &[]);
        assert!(sched.tests_finished());
    }

    #[test]
    fn mismatched_replacement_is_refused_and_reported() {
        let (mut sched, _) = crashed_run();
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        sched = sched.with_diagnostics(Box::new(diagnostics.clone()));

        let mut wrong = suite();
        wrong[1] = "t1-renamed".to_string();
        let w2 = RecordingHandle::new("w2", "popen");
        sched.join(w2.clone()).unwrap();
        sched.report_collection("w2", wrong).unwrap();

        assert!(sched.pending("w2").unwrap().is_empty());
        let reports = diagnostics.reports.lock().unwrap().clone();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].contains("w0"));
        assert!(reports[0].contains("w2"));
        assert!(reports[0].contains("t1-renamed"));

        // The orphan is still claimable by a later, matching replacement.
        let w3 = RecordingHandle::new("w3", "popen");
        sched.join(w3.clone()).unwrap();
        sched.report_collection("w3", suite()).unwrap();
        assert_eq!(sched.pending("w3").unwrap(), &[3, 4]);
    }

    #[test]
    fn replacement_with_different_spec_is_not_matched() {
        let (mut sched, _) = crashed_run();

        let w2 = RecordingHandle::new("w2", "ssh=otherhost");
        sched.join(w2.clone()).unwrap();
        sched.report_collection("w2", suite()).unwrap();

        assert!(sched.pending("w2").unwrap().is_empty());
        sched.dispatch().unwrap();
        assert!(w2.commands().is_empty());
        // Orphan still outstanding, the run cannot finish.
        drain_except(&mut sched, "w1", &[]);
        assert!(!sched.tests_finished());
    }

    #[test]
    fn excluded_worker_is_shut_down_without_work() {
        let mut sched = BroadcastScheduler::new(2, AllowList::from_ids(["w1"]));
        let w1 = RecordingHandle::new("w1", "popen");
        let w2 = RecordingHandle::new("w2", "popen");
        sched.join(w1.clone()).unwrap();
        sched.join(w2.clone()).unwrap();
        sched.report_collection("w1", items(&["t1", "t2"])).unwrap();
        sched.report_collection("w2", items(&["t1", "t2"])).unwrap();
        sched.dispatch().unwrap();

        assert_eq!(w1.commands(), vec![Command::RunAll, Command::Shutdown]);
        assert_eq!(w2.commands(), vec![Command::Shutdown]);
        assert!(sched.pending("w2").unwrap().is_empty());

        sched.mark_complete("w1", 0).unwrap();
        sched.mark_complete("w1", 1).unwrap();
        assert!(sched.tests_finished());
    }

    #[test]
    fn unmatched_replacement_stays_idle() {
        let mut sched = BroadcastScheduler::new(1, AllowList::allow_all());
        let w0 = RecordingHandle::new("w0", "popen");
        sched.join(w0.clone()).unwrap();
        sched.report_collection("w0", items(&["t1", "t2"])).unwrap();
        assert!(sched.collection_complete());

        // Joins after completion with no orphan to claim.
        let w1 = RecordingHandle::new("w1", "popen");
        sched.join(w1.clone()).unwrap();
        sched.report_collection("w1", items(&["t1", "t2"])).unwrap();
        sched.dispatch().unwrap();

        assert_eq!(w0.commands(), vec![Command::RunAll, Command::Shutdown]);
        assert!(w1.commands().is_empty());
        assert!(sched.pending("w1").unwrap().is_empty());
        // Its collection is still recorded.
        assert!(sched.collection("w1").is_some());
    }

    #[test]
    fn crash_with_single_pending_item_leaves_no_orphan() {
        let (mut sched, _, _) = two_workers();
        sched.report_collection("w0", items(&["t1", "t2"])).unwrap();
        sched.report_collection("w1", items(&["t1", "t2"])).unwrap();
        sched.dispatch().unwrap();

        drain_except(&mut sched, "w0", &[1]);
        assert_eq!(sched.remove("w0").unwrap(), Some("t2".to_string()));

        // Nothing was orphaned, so only w1's work is outstanding.
        drain_except(&mut sched, "w1", &[]);
        assert!(sched.tests_finished());
    }
}
