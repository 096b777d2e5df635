use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use corral::engine::safety::{JobSafetyManager, TaskHandle};
use corral::engine::types::MAX_READ_FENCES;
use corral::ExecutionError;

const COMPONENT: u16 = 0;

#[test]
fn write_fence_blocks_complete_read_until_done() {
    let mut manager = JobSafetyManager::new();
    let write_job = TaskHandle::new();
    manager.add_write_dependency(COMPONENT, write_job.clone());

    let finished = Arc::new(AtomicBool::new(false));
    let finished_in_job = finished.clone();
    let job_handle = write_job.clone();
    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        finished_in_job.store(true, Ordering::SeqCst);
        job_handle.complete();
    });

    // blocks until the writer signals completion
    manager.complete_read(COMPONENT);
    assert!(finished.load(Ordering::SeqCst));
    assert!(write_job.is_complete());
    worker.join().unwrap();
}

#[test]
fn readers_do_not_serialize_against_each_other() {
    let mut manager = JobSafetyManager::new();

    let first_reader = TaskHandle::new();
    let second_reader = TaskHandle::new();
    manager.add_read_dependency(COMPONENT, first_reader.clone());

    // a second reader has nothing to wait on: no write fence is outstanding
    assert!(manager.read_fence(COMPONENT).is_none());
    manager.add_read_dependency(COMPONENT, second_reader.clone());

    // a writer must wait on both readers
    let write_dependency = manager.write_fence(COMPONENT);
    assert!(!write_dependency.is_complete());
    first_reader.complete();
    assert!(!write_dependency.is_complete());
    second_reader.complete();
    assert!(write_dependency.is_complete());
}

#[test]
fn new_reader_depends_on_outstanding_writer() {
    let mut manager = JobSafetyManager::new();
    let write_job = TaskHandle::new();
    manager.add_write_dependency(COMPONENT, write_job.clone());

    let dependency = manager
        .read_fence(COMPONENT)
        .expect("reader must see the write fence");
    assert!(!dependency.is_complete());
    write_job.complete();
    assert!(dependency.is_complete());
}

#[test]
fn aliasing_guards_report_pending_fences() {
    let mut manager = JobSafetyManager::new();
    let write_job = TaskHandle::new();
    manager.add_write_dependency(COMPONENT, write_job.clone());

    assert!(matches!(
        manager.assert_no_pending_write(COMPONENT),
        Err(ExecutionError::PendingWriteFence { .. })
    ));

    write_job.complete();
    assert!(manager.assert_no_pending_write(COMPONENT).is_ok());

    let reader = TaskHandle::new();
    manager.add_read_dependency(COMPONENT, reader.clone());
    assert!(matches!(
        manager.assert_no_pending_access(COMPONENT),
        Err(ExecutionError::PendingReadFence { pending: 1, .. })
    ));
    reader.complete();
    assert!(manager.assert_no_pending_access(COMPONENT).is_ok());
}

#[test]
fn full_read_list_combines_instead_of_growing() {
    let mut manager = JobSafetyManager::new();

    let mut readers = Vec::new();
    for _ in 0..(MAX_READ_FENCES + 4) {
        let reader = TaskHandle::new();
        manager.add_read_dependency(COMPONENT, reader.clone());
        readers.push(reader);
    }

    let write_dependency = manager.write_fence(COMPONENT);
    assert!(!write_dependency.is_complete());
    for reader in &readers {
        reader.complete();
    }
    assert!(write_dependency.is_complete());
}

#[test]
fn combine_completes_only_when_all_parts_do() {
    let parts: Vec<TaskHandle> = (0..3).map(|_| TaskHandle::new()).collect();
    let combined = TaskHandle::combine(&parts);

    assert!(!combined.is_complete());
    parts[0].complete();
    parts[2].complete();
    assert!(!combined.is_complete());
    parts[1].complete();
    assert!(combined.is_complete());

    // degenerate forms
    assert!(TaskHandle::combine(&[]).is_complete());
    let single = TaskHandle::new();
    let alias = TaskHandle::combine(std::slice::from_ref(&single));
    single.complete();
    assert!(alias.is_complete());
}

#[test]
fn declaration_phase_covers_the_whole_access_set() {
    let mut manager = JobSafetyManager::new();
    let position: u16 = 0;
    let velocity: u16 = 1;

    let prior_writer = TaskHandle::new();
    manager.add_write_dependency(position, prior_writer.clone());
    let prior_reader = TaskHandle::new();
    manager.add_read_dependency(velocity, prior_reader.clone());

    manager.declare_reads(&[position]);
    manager.declare_writes(&[velocity]);
    let dependency = manager.acquire_combined_dependency();

    // covers both the write fence (read access) and the read fence (write access)
    assert!(!dependency.is_complete());
    prior_writer.complete();
    assert!(!dependency.is_complete());
    prior_reader.complete();
    assert!(dependency.is_complete());

    // register the new job and verify it becomes the fences
    let job = TaskHandle::new();
    manager.register_declared(job.clone());
    assert!(matches!(
        manager.assert_no_pending_access(position),
        Err(ExecutionError::PendingReadFence { .. })
    ));
    assert!(matches!(
        manager.assert_no_pending_write(velocity),
        Err(ExecutionError::PendingWriteFence { .. })
    ));
    job.complete();
    assert!(manager.assert_no_pending_access(position).is_ok());
    assert!(manager.assert_no_pending_write(velocity).is_ok());
}

#[test]
fn inline_work_drains_declared_dependencies() {
    let mut manager = JobSafetyManager::new();
    let position: u16 = 0;
    let velocity: u16 = 1;

    let prior_writer = TaskHandle::new();
    manager.add_write_dependency(position, prior_writer.clone());
    let prior_reader = TaskHandle::new();
    manager.add_read_dependency(velocity, prior_reader.clone());

    manager.declare_reads(&[position]);
    manager.declare_writes(&[velocity]);

    let finished = Arc::new(AtomicBool::new(false));
    let finished_in_job = finished.clone();
    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        finished_in_job.store(true, Ordering::SeqCst);
        prior_writer.complete();
        prior_reader.complete();
    });

    // blocks on every declared access before the inline work may run
    manager.complete_declared_dependencies();
    assert!(finished.load(Ordering::SeqCst));
    assert!(manager.assert_no_pending_access(position).is_ok());
    assert!(manager.assert_no_pending_access(velocity).is_ok());
    worker.join().unwrap();
}

#[test]
fn complete_all_drains_every_fence() {
    let mut manager = JobSafetyManager::new();
    for component in 0..4u16 {
        let job = TaskHandle::new();
        manager.add_write_dependency(component, job.clone());
        job.complete();
    }
    manager.complete_all();
    for component in 0..4u16 {
        assert!(manager.assert_no_pending_access(component).is_ok());
    }
}

#[test]
fn structural_changes_wait_on_write_fences() {
    use corral::prelude::*;

    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    let mut world = World::new();
    let position = world.register_component::<Position>().unwrap();
    let entity = world.create_entity(&[position]).unwrap();

    let write_job = TaskHandle::new();
    world.add_write_dependency(position, write_job.clone());

    let job_handle = write_job.clone();
    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        job_handle.complete();
    });

    // destroy drains the fence before compacting the chunk
    world.destroy_entity(entity).unwrap();
    assert!(write_job.is_complete());
    worker.join().unwrap();
}
