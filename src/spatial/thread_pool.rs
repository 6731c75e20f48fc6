use std::{
    any::Any,
    ops::Range,
    ptr::NonNull,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};

use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;

use super::{
    index::{insert_records, EntityRecord},
    key::{CellKey, CellKeySpace},
};

// -------------------------------------------------------------------------------------------------

/// Command sent from the rebuilding thread to worker threads.
#[derive(Debug, Copy, Clone)]
enum WorkerCommand {
    Insert,
    Shutdown,
}

/// Sent from a worker thread to the rebuilding thread to signal completion.
type WorkerCompletion = Result<(), Box<dyn Any + Send + 'static>>;

// -------------------------------------------------------------------------------------------------

/// A chunk of records which a worker inserts into the shared bucket map.
#[derive(Debug)]
struct WorkerInsertTask {
    records: Option<NonNull<[EntityRecord]>>,
    buckets: Option<NonNull<DashMap<CellKey, Vec<u32>>>>,
    key_space: CellKeySpace,
    range: Range<usize>,
}

impl Default for WorkerInsertTask {
    fn default() -> Self {
        Self {
            records: None,
            buckets: None,
            key_space: CellKeySpace::default(),
            range: 0..0,
        }
    }
}

// SAFETY: WorkerInsertTask contains NonNull pointers but we control their lifetimes.
// The rebuilding thread creates these pointers from references it holds for the whole insert
// phase and waits for all workers to complete before releasing them. Workers only access the
// records immutably and the bucket map via its concurrent, shared reference API.
unsafe impl Send for WorkerInsertTask {}

// -------------------------------------------------------------------------------------------------

/// Per-worker state that only the owning worker and the rebuilding thread access.
#[derive(Debug)]
struct WorkerState {
    /// Current work package
    task: Mutex<WorkerInsertTask>,
    /// Channel to send commands to this worker
    work_sender: Sender<WorkerCommand>,
    /// Channel to receive completion from this worker
    completion_receiver: Receiver<WorkerCompletion>,
}

impl WorkerState {
    fn new() -> (Self, Receiver<WorkerCommand>, Sender<WorkerCompletion>) {
        let (work_sender, work_receiver) = crossbeam_channel::bounded(0);
        let (completion_sender, completion_receiver) = crossbeam_channel::bounded(0);

        let state = Self {
            task: Mutex::new(WorkerInsertTask::default()),
            work_sender,
            completion_receiver,
        };
        (state, work_receiver, completion_sender)
    }

    /// Get worker thread's current work package.
    #[inline(always)]
    fn task(&self) -> MutexGuard<'_, WorkerInsertTask> {
        // a panicking worker leaves a consistent task behind: it never writes to it
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_task(
        &self,
        records: &[EntityRecord],
        buckets: &DashMap<CellKey, Vec<u32>>,
        key_space: CellKeySpace,
        range: Range<usize>,
    ) {
        let mut task = self.task();
        task.records = Some(NonNull::from(records));
        task.buckets = Some(NonNull::from(buckets));
        task.key_space = key_space;
        task.range = range;
    }

    fn clear_task(&self) {
        *self.task() = WorkerInsertTask::default();
    }
}

// -------------------------------------------------------------------------------------------------

/// A thread pool which inserts entity records into a shared bucket map in parallel.
///
/// Worker threads get spawned once at construction time and wait for work until the pool is
/// dropped. Each worker has its own state, so workers never contend for a lock.
pub(crate) struct InsertThreadPool {
    /// Per-worker state
    worker_states: Vec<Arc<WorkerState>>,
    /// Worker thread handles
    worker_threads: Vec<thread::JoinHandle<()>>,
}

impl InsertThreadPool {
    /// Min number of records which get inserted concurrently. Smaller batches get inserted
    /// inline, as waking up the workers would take longer than the insertion itself.
    pub const MIN_CONCURRENT_RECORDS: usize = 512;

    /// Create a new thread pool and spawn `thread_count` worker threads.
    pub fn new(thread_count: usize) -> Self {
        let mut worker_states = Vec::with_capacity(thread_count);
        let mut worker_threads = Vec::with_capacity(thread_count);

        for worker_id in 0..thread_count {
            let (state, work_receiver, completion_sender) = WorkerState::new();
            let worker_state = Arc::new(state);

            let thread_state = Arc::clone(&worker_state);
            let spawn_result = thread::Builder::new()
                .name(format!("grainulator-bucket-worker-{}", worker_id))
                .spawn(move || {
                    let error_sender = completion_sender.clone();
                    if let Err(payload) = std::panic::catch_unwind(move || {
                        Self::run_worker_thread(
                            worker_id,
                            thread_state,
                            work_receiver,
                            completion_sender,
                        )
                    }) {
                        log::error!(
                            "Ouch. Bucket worker thread #{worker_id} panicked: {}",
                            panic_message::panic_message(&payload)
                        );
                        if error_sender.send(Err(payload)).is_err() {
                            log::warn!(
                                "Bucket worker thread #{worker_id} failed to report its panic."
                            );
                        }
                    }
                });
            match spawn_result {
                Ok(handle) => {
                    worker_states.push(worker_state);
                    worker_threads.push(handle);
                }
                Err(err) => {
                    log::error!("Failed to spawn bucket worker thread #{worker_id}: {err}");
                }
            }
        }

        Self {
            worker_states,
            worker_threads,
        }
    }

    /// Number of running worker threads.
    pub fn thread_count(&self) -> usize {
        self.worker_threads.len()
    }

    /// Check if the thread pool should be used for the given number of records.
    pub fn should_use_concurrent_insertion(&self, record_count: usize) -> bool {
        self.thread_count() >= 2 && record_count >= Self::MIN_CONCURRENT_RECORDS
    }

    /// Insert all records into the given bucket map, splitting them into one chunk per worker.
    ///
    /// This is a synchronous, blocking call: it returns once all workers completed. Records of
    /// workers which can't be reached get inserted by the calling thread.
    pub fn insert(
        &self,
        records: &[EntityRecord],
        buckets: &DashMap<CellKey, Vec<u32>>,
        key_space: &CellKeySpace,
    ) {
        let worker_count = self.worker_states.len().max(1);
        let chunk_size = records.len().div_ceil(worker_count);

        // Assign chunks and wake up all workers which have work
        let mut busy_workers = 0;
        for (worker_id, worker_state) in self.worker_states.iter().enumerate() {
            let start = (worker_id * chunk_size).min(records.len());
            let end = (start + chunk_size).min(records.len());
            if start == end {
                break;
            }
            worker_state.set_task(records, buckets, *key_space, start..end);
            if worker_state.work_sender.send(WorkerCommand::Insert).is_ok() {
                busy_workers = worker_id + 1;
            } else {
                log::warn!("Bucket worker thread #{worker_id} is gone. Inserting inline...");
                worker_state.clear_task();
                insert_records(records, start..end, buckets, key_space);
            }
        }

        // Wait for completions
        for (worker_id, worker_state) in self.worker_states[..busy_workers].iter().enumerate() {
            if worker_state.task().range.is_empty() {
                // inserted inline
                continue;
            }
            match worker_state.completion_receiver.recv() {
                Ok(Ok(())) => worker_state.clear_task(),
                Ok(Err(payload)) => {
                    // Forward errors from worker thread to the rebuilding thread
                    panic!(
                        "Bucket worker thread #{worker_id} insertion failed: {}",
                        panic_message::panic_message(&payload)
                    );
                }
                Err(_) => {
                    panic!("Bucket worker thread #{worker_id} unexpectedly got disconnected.");
                }
            }
        }
    }

    fn run_worker_thread(
        worker_id: usize,
        worker_state: Arc<WorkerState>,
        work_receiver: Receiver<WorkerCommand>,
        completion_sender: Sender<WorkerCompletion>,
    ) {
        loop {
            match work_receiver.recv() {
                Ok(WorkerCommand::Insert) => {
                    {
                        let task = worker_state.task();
                        if let (Some(records), Some(buckets)) = (task.records, task.buckets) {
                            // SAFETY: the pointers are valid for the duration of the task.
                            // The rebuilding thread waits for our completion before it releases
                            // the records or touches the bucket map again.
                            let (records, buckets) = unsafe { (records.as_ref(), buckets.as_ref()) };
                            insert_records(records, task.range.clone(), buckets, &task.key_space);
                        }
                    }

                    // NB: Crossbeam allocs here thread local variables once which is just fine.
                    if completion_sender.send(WorkerCompletion::Ok(())).is_err() {
                        log::warn!(
                            "Bucket worker thread #{worker_id} unexpectedly got disconnected."
                        );
                        break;
                    }
                }
                Ok(WorkerCommand::Shutdown) => {
                    log::info!("Bucket worker thread #{worker_id} is shutting down...");
                    break;
                }
                Err(_) => {
                    log::warn!("Bucket worker thread #{worker_id} unexpectedly got disconnected.");
                    break;
                }
            }
        }
    }
}

impl Drop for InsertThreadPool {
    fn drop(&mut self) {
        // Signal shutdown to each worker
        for worker_state in &self.worker_states {
            let _ = worker_state.work_sender.send(WorkerCommand::Shutdown);
        }

        // Wait for all workers to finish
        while let Some(worker) = self.worker_threads.pop() {
            if let Err(payload) = worker.join() {
                log::error!(
                    "Bucket worker thread panicked: {}",
                    panic_message::panic_message(&payload)
                );
            }
        }
    }
}
