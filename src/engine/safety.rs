//! Job safety manager: per-component task fences.
//!
//! The engine never spawns tasks. An external scheduler runs jobs on its own
//! worker pool and hands the engine one [`TaskHandle`] per job: a cheap-clone
//! completion token the engine can store, combine, and block on. This module
//! keeps, per component type, the fences needed to serialize conflicting
//! access:
//!
//! - at most one outstanding **write fence** (the last job that writes the
//!   component's arrays), and
//! - a bounded list of **read fences** (jobs that read them).
//!
//! ## Ordering rules
//!
//! A new reader must depend on the current write fence. A new writer must
//! depend on the current write fence *and* every read fence; once it is
//! registered it becomes the sole fence for the component (it transitively
//! orders everything before it), so the read list is cleared. Keeping this
//! contract is the caller's responsibility: obtain the dependency via
//! [`JobSafetyManager::write_fence`] / [`JobSafetyManager::read_fence`]
//! before scheduling, then register the scheduled job's handle.
//!
//! When the read list is full, the existing fences are combined into a
//! single handle before another is admitted, trading wait granularity for a
//! hard bound on memory.
//!
//! ## Main-thread access
//!
//! Direct (non-job) access to component arrays must first drain the
//! conflicting fences: [`JobSafetyManager::complete_read`] blocks on the
//! write fence, [`JobSafetyManager::complete_write`] on everything. The
//! `assert_no_pending_*` guards report an [`ExecutionError`] instead of
//! blocking and back the debug-build checks on direct column access.
//!
//! ## Two-phase frames
//!
//! Schedulers that gather a job's whole access set before running it use the
//! declaration API: [`declare_reads`](JobSafetyManager::declare_reads) /
//! [`declare_writes`](JobSafetyManager::declare_writes) accumulate the set,
//! [`acquire_combined_dependency`](JobSafetyManager::acquire_combined_dependency)
//! yields one handle covering every conflicting fence, and either
//! [`register_declared`](JobSafetyManager::register_declared) (the job was
//! scheduled) or
//! [`complete_declared_dependencies`](JobSafetyManager::complete_declared_dependencies)
//! (the work ran inline) closes the phase.

use std::sync::{Arc, Condvar, Mutex};

use smallvec::SmallVec;

use crate::engine::error::ExecutionError;
use crate::engine::types::{ComponentID, MAX_READ_FENCES};

enum HandleState {
    Single {
        completed: Mutex<bool>,
        condvar: Condvar,
    },
    // completes when every part completes
    Combined {
        parts: Box<[TaskHandle]>,
    },
}

/// Cheap-clone completion token for one external job (or a combination of
/// several). The engine stores, combines, and waits on handles; the external
/// scheduler calls [`TaskHandle::complete`] when the job finishes.
#[derive(Clone)]
pub struct TaskHandle {
    state: Arc<HandleState>,
}

impl TaskHandle {
    /// A fresh, incomplete handle for a job about to be scheduled.
    pub fn new() -> Self {
        Self {
            state: Arc::new(HandleState::Single {
                completed: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    /// An already-completed handle. Waiting on it returns immediately.
    pub fn completed() -> Self {
        Self {
            state: Arc::new(HandleState::Single {
                completed: Mutex::new(true),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Combines handles into one that completes when all of them have.
    pub fn combine(handles: &[TaskHandle]) -> Self {
        match handles.len() {
            0 => Self::completed(),
            1 => handles[0].clone(),
            _ => Self {
                state: Arc::new(HandleState::Combined {
                    parts: handles.to_vec().into_boxed_slice(),
                }),
            },
        }
    }

    /// Marks the job complete and wakes all waiters. Combined handles cannot
    /// be completed directly; they complete through their parts.
    pub fn complete(&self) {
        match &*self.state {
            HandleState::Single { completed, condvar } => {
                let mut flag = completed.lock().unwrap_or_else(|e| e.into_inner());
                *flag = true;
                condvar.notify_all();
            }
            HandleState::Combined { .. } => {
                debug_assert!(false, "complete() called on a combined handle");
            }
        }
    }

    /// Returns `true` once the job (or every combined part) has completed.
    pub fn is_complete(&self) -> bool {
        match &*self.state {
            HandleState::Single { completed, .. } => {
                *completed.lock().unwrap_or_else(|e| e.into_inner())
            }
            HandleState::Combined { parts } => parts.iter().all(TaskHandle::is_complete),
        }
    }

    /// Blocks the calling thread until the job has completed.
    pub fn wait(&self) {
        match &*self.state {
            HandleState::Single { completed, condvar } => {
                let mut flag = completed.lock().unwrap_or_else(|e| e.into_inner());
                while !*flag {
                    flag = condvar.wait(flag).unwrap_or_else(|e| e.into_inner());
                }
            }
            HandleState::Combined { parts } => {
                for part in parts.iter() {
                    part.wait();
                }
            }
        }
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("complete", &self.is_complete())
            .finish()
    }
}

#[derive(Default)]
struct DependencyRecord {
    write_fence: Option<TaskHandle>,
    read_fences: SmallVec<[TaskHandle; MAX_READ_FENCES]>,
}

/// Per-component fence bookkeeping. One record per registered component
/// type, grown on demand.
#[derive(Default)]
pub struct JobSafetyManager {
    records: Vec<DependencyRecord>,
    declared_reads: Vec<ComponentID>,
    declared_writes: Vec<ComponentID>,
}

impl JobSafetyManager {
    /// Creates a manager with no fences outstanding.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, component_id: ComponentID) -> &mut DependencyRecord {
        let index = component_id as usize;
        if index >= self.records.len() {
            self.records.resize_with(index + 1, DependencyRecord::default);
        }
        &mut self.records[index]
    }

    fn record_ref(&self, component_id: ComponentID) -> Option<&DependencyRecord> {
        self.records.get(component_id as usize)
    }

    /// Fence a new *reading* job of `component_id` must depend on: the
    /// outstanding write fence, if any.
    pub fn read_fence(&self, component_id: ComponentID) -> Option<TaskHandle> {
        self.record_ref(component_id)
            .and_then(|record| record.write_fence.clone())
    }

    /// Fence a new *writing* job of `component_id` must depend on: the
    /// outstanding write fence combined with every read fence.
    pub fn write_fence(&self, component_id: ComponentID) -> TaskHandle {
        let Some(record) = self.record_ref(component_id) else {
            return TaskHandle::completed();
        };
        let mut fences: SmallVec<[TaskHandle; MAX_READ_FENCES]> =
            record.read_fences.clone();
        if let Some(write) = &record.write_fence {
            fences.push(write.clone());
        }
        TaskHandle::combine(&fences)
    }

    /// Registers `handle` as a read fence on `component_id`.
    ///
    /// The caller must have made the job depend on
    /// [`read_fence`](Self::read_fence) before scheduling it. When the
    /// bounded fence list is full, existing fences are combined into one
    /// before `handle` is admitted.
    pub fn add_read_dependency(&mut self, component_id: ComponentID, handle: TaskHandle) {
        let record = self.record(component_id);
        if record.read_fences.len() == MAX_READ_FENCES {
            log::warn!(
                "read fence list for component {} is full; combining {} fences",
                component_id,
                record.read_fences.len()
            );
            let combined = TaskHandle::combine(&record.read_fences);
            record.read_fences.clear();
            record.read_fences.push(combined);
        }
        record.read_fences.push(handle);
    }

    /// Registers `handle` as the write fence on `component_id`, superseding
    /// all prior fences.
    ///
    /// The caller must have made the job depend on
    /// [`write_fence`](Self::write_fence) before scheduling it; the new
    /// handle then transitively orders every cleared fence.
    pub fn add_write_dependency(&mut self, component_id: ComponentID, handle: TaskHandle) {
        let record = self.record(component_id);
        record.write_fence = Some(handle);
        record.read_fences.clear();
    }

    /// Blocks until reading `component_id` on the calling thread is safe:
    /// waits out the outstanding write fence.
    pub fn complete_read(&mut self, component_id: ComponentID) {
        let record = self.record(component_id);
        if let Some(write) = record.write_fence.take() {
            write.wait();
        }
    }

    /// Blocks until writing `component_id` on the calling thread is safe:
    /// waits out the write fence and every read fence.
    pub fn complete_write(&mut self, component_id: ComponentID) {
        let record = self.record(component_id);
        if let Some(write) = record.write_fence.take() {
            write.wait();
        }
        for read in record.read_fences.drain(..) {
            read.wait();
        }
    }

    /// Blocks until every outstanding fence of every component has
    /// completed, then clears them all.
    pub fn complete_all(&mut self) {
        for component_id in 0..self.records.len() {
            self.complete_write(component_id as ComponentID);
        }
    }

    /// Reports an error if a write job on `component_id` is still pending.
    /// Backs the debug guard on direct shared access to component arrays.
    pub fn assert_no_pending_write(
        &self,
        component_id: ComponentID,
    ) -> Result<(), ExecutionError> {
        if let Some(record) = self.record_ref(component_id) {
            if let Some(write) = &record.write_fence {
                if !write.is_complete() {
                    return Err(ExecutionError::PendingWriteFence { component_id });
                }
            }
        }
        Ok(())
    }

    /// Reports an error if any job on `component_id` is still pending.
    /// Backs the debug guard on direct mutable access to component arrays.
    pub fn assert_no_pending_access(
        &self,
        component_id: ComponentID,
    ) -> Result<(), ExecutionError> {
        self.assert_no_pending_write(component_id)?;
        if let Some(record) = self.record_ref(component_id) {
            let pending = record
                .read_fences
                .iter()
                .filter(|fence| !fence.is_complete())
                .count();
            if pending > 0 {
                return Err(ExecutionError::PendingReadFence {
                    component_id,
                    pending,
                });
            }
        }
        Ok(())
    }

    /// Adds components to the read set of the current declaration phase.
    pub fn declare_reads(&mut self, component_ids: &[ComponentID]) {
        self.declared_reads.extend_from_slice(component_ids);
    }

    /// Adds components to the write set of the current declaration phase.
    pub fn declare_writes(&mut self, component_ids: &[ComponentID]) {
        self.declared_writes.extend_from_slice(component_ids);
    }

    /// One handle covering every fence the declared access set conflicts
    /// with: write fences of declared reads, plus write and read fences of
    /// declared writes.
    pub fn acquire_combined_dependency(&self) -> TaskHandle {
        let mut fences: Vec<TaskHandle> = Vec::new();
        for &component_id in &self.declared_reads {
            if let Some(write) = self.read_fence(component_id) {
                fences.push(write);
            }
        }
        for &component_id in &self.declared_writes {
            if let Some(record) = self.record_ref(component_id) {
                if let Some(write) = &record.write_fence {
                    fences.push(write.clone());
                }
                fences.extend(record.read_fences.iter().cloned());
            }
        }
        TaskHandle::combine(&fences)
    }

    /// Closes the declaration phase by registering `handle` as a read fence
    /// on every declared read and the write fence on every declared write.
    pub fn register_declared(&mut self, handle: TaskHandle) {
        let reads = std::mem::take(&mut self.declared_reads);
        let writes = std::mem::take(&mut self.declared_writes);
        for component_id in reads {
            self.add_read_dependency(component_id, handle.clone());
        }
        for component_id in writes {
            self.add_write_dependency(component_id, handle.clone());
        }
    }

    /// Closes the declaration phase by blocking out every conflicting fence,
    /// for work that runs inline on the calling thread.
    pub fn complete_declared_dependencies(&mut self) {
        let reads = std::mem::take(&mut self.declared_reads);
        let writes = std::mem::take(&mut self.declared_writes);
        for component_id in reads {
            self.complete_read(component_id);
        }
        for component_id in writes {
            self.complete_write(component_id);
        }
    }
}
