//! The evaluate/update main loop.
//!
//! The scheduler owns the clock, the arenas, and the two queues, and drives
//! the simulation in two alternating phases:
//!
//! - **Evaluate**: run every ready task until it suspends or completes.
//!   Task code may notify events, register further tasks, or enqueue work;
//!   anything made ready joins the same phase.
//! - **Update**: with the ready queue drained, advance the clock to the
//!   earliest pending event time (asserting it is strictly in the future)
//!   and wake the waiters of every event due at that instant. Events
//!   notified with a zero-cycle delay land one delta later, so all work of
//!   an instant resolves before the cycle advances (the delta-cycle
//!   mechanism).
//!
//! The run ends when both queues are empty. Tasks still suspended at that
//! point are abandoned; a waiter whose event was canceled and never
//! re-notified simply never runs again.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use super::context::ModuleId;
use super::event::{EventId, EventState};
use super::queue::{PendingEventQueue, ReadyQueue};
use super::task::{inert_waker, TaskEntry, TaskId};
use super::time::SimTime;

/// Lifecycle of the scheduler. Transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    /// Created; modules may register tasks.
    Uninitialized,
    /// Seeding the ready queue.
    Initializing,
    /// Seeded, not yet running.
    Initialized,
    /// Inside the main loop.
    Running,
    /// Both queues drained; the run is over.
    Finished,
}

/// Counters accumulated across a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelStats {
    /// Distinct instants the clock advanced to.
    pub instants: u64,
    /// Events fired (waiters woken and dynamic sets cleared).
    pub events_fired: u64,
    /// Task polls performed by the evaluate phase.
    pub polls: u64,
    /// Tasks that ran to completion.
    pub tasks_finished: u64,
}

/// Scheduler state: clock, queues, and the event/task arenas.
pub(crate) struct Scheduler {
    pub(crate) status: SchedulerStatus,
    pub(crate) now: SimTime,
    pub(crate) ready: ReadyQueue,
    pub(crate) pending: PendingEventQueue,
    pub(crate) startup: Vec<TaskId>,
    pub(crate) current_task: Option<TaskId>,
    pub(crate) stats: KernelStats,
    events: Vec<EventState>,
    free_events: Vec<EventId>,
    tasks: Vec<TaskEntry>,
    modules: u32,
}

impl Scheduler {
    pub(crate) fn new() -> Scheduler {
        Scheduler {
            status: SchedulerStatus::Uninitialized,
            now: SimTime::ZERO,
            ready: ReadyQueue::new(),
            pending: PendingEventQueue::new(),
            startup: Vec::new(),
            current_task: None,
            stats: KernelStats::default(),
            events: Vec::new(),
            free_events: Vec::new(),
            tasks: Vec::new(),
            modules: 0,
        }
    }

    // --- arenas ---

    pub(crate) fn alloc_event(&mut self) -> EventId {
        if let Some(id) = self.free_events.pop() {
            let slot = &mut self.events[id.0 as usize];
            *slot = EventState::default();
            slot.handles = 1;
            id
        } else {
            let id = EventId(self.events.len() as u32);
            let mut state = EventState::default();
            state.handles = 1;
            self.events.push(state);
            id
        }
    }

    pub(crate) fn event(&self, id: EventId) -> &EventState {
        &self.events[id.0 as usize]
    }

    pub(crate) fn event_mut(&mut self, id: EventId) -> &mut EventState {
        &mut self.events[id.0 as usize]
    }

    pub(crate) fn release_event_handle(&mut self, id: EventId) {
        let st = self.event_mut(id);
        st.handles = st.handles.saturating_sub(1);
        self.maybe_free_event(id);
    }

    /// Recycle the slot once no handle, waiter entry or pending occurrence
    /// references it. Outstanding `EventId`s never outlive one of those
    /// references, so a freed id cannot be observed stale.
    fn maybe_free_event(&mut self, id: EventId) {
        if self.pending.contains(id) {
            return;
        }
        let st = self.event_mut(id);
        if st.is_unreferenced() {
            *st = EventState::default();
            self.free_events.push(id);
        }
    }

    pub(crate) fn alloc_task(
        &mut self,
        future: Pin<Box<dyn Future<Output = ()>>>,
        module: ModuleId,
    ) -> TaskId {
        let id = TaskId(self.tasks.len() as u32);
        self.tasks.push(TaskEntry {
            future: Some(future),
            finished: false,
            module,
        });
        id
    }

    pub(crate) fn task(&self, id: TaskId) -> &TaskEntry {
        &self.tasks[id.0 as usize]
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> &mut TaskEntry {
        &mut self.tasks[id.0 as usize]
    }

    pub(crate) fn alloc_module(&mut self) -> ModuleId {
        let id = ModuleId(self.modules);
        self.modules += 1;
        id
    }

    // --- event protocol ---

    /// (Re)insert `event` into the pending queue at the absolute time `at`,
    /// replacing any prior occurrence.
    pub(crate) fn schedule_event(&mut self, event: EventId, at: SimTime) {
        log::trace!("notify {:?} at {}", event, at);
        self.pending.schedule(event, at);
        self.event_mut(event).notify_time = Some(at);
    }

    pub(crate) fn cancel_event(&mut self, event: EventId) {
        let removed = self.pending.remove(event);
        self.event_mut(event).notify_time = None;
        if removed {
            log::trace!("canceled pending {:?}", event);
        }
    }

    /// Wake every waiter of a just-popped event and clear its dynamic set.
    fn fire_event(&mut self, event: EventId) {
        let mut waiters = Vec::new();
        {
            let st = self.event_mut(event);
            st.collect_waiters(&mut waiters);
            st.clear_dynamic_waiters();
        }
        log::trace!("fire {:?} at {}, waking {} task(s)", event, self.now, waiters.len());
        for &task in &waiters {
            // A finished task lingering in a static waiter set is a no-op.
            if !self.task(task).finished {
                self.ready.push(task);
            }
        }
        self.stats.events_fired += 1;
        self.maybe_free_event(event);
    }
}

/// Drive a scheduler from initialization to completion.
pub(crate) fn run(kernel: &Rc<RefCell<Scheduler>>) {
    // Initialize: seed the ready queue with every task registered without
    // initial events, in registration order.
    {
        let mut k = kernel.borrow_mut();
        assert!(
            k.status == SchedulerStatus::Uninitialized,
            "scheduler has already been run (status {:?})",
            k.status
        );
        k.status = SchedulerStatus::Initializing;
        let startup = std::mem::take(&mut k.startup);
        log::debug!("seeding {} startup task(s)", startup.len());
        for task in startup {
            k.ready.push(task);
        }
        k.status = SchedulerStatus::Initialized;
        k.status = SchedulerStatus::Running;
    }

    let waker = inert_waker();
    let mut cx = Context::from_waker(&waker);

    loop {
        // Evaluate phase: drain the ready queue, running each task to its
        // next suspension point. All interior borrows are released before a
        // poll so task code can freely call back into the kernel.
        loop {
            let next = kernel.borrow_mut().ready.pop();
            let Some(task) = next else { break };

            let mut fut = {
                let mut k = kernel.borrow_mut();
                if k.task(task).finished {
                    continue;
                }
                let Some(f) = k.task_mut(task).future.take() else {
                    continue;
                };
                k.current_task = Some(task);
                k.stats.polls += 1;
                f
            };

            match fut.as_mut().poll(&mut cx) {
                Poll::Ready(()) => {
                    // Drop the future before re-borrowing: its locals may
                    // hold event handles whose release needs the kernel.
                    drop(fut);
                    let mut k = kernel.borrow_mut();
                    k.current_task = None;
                    k.task_mut(task).finished = true;
                    k.stats.tasks_finished += 1;
                    log::trace!("task {:?} completed", task);
                }
                Poll::Pending => {
                    let mut k = kernel.borrow_mut();
                    k.current_task = None;
                    k.task_mut(task).future = Some(fut);
                }
            }
        }

        // Update phase: advance the clock to the earliest pending event and
        // fire everything due at that instant.
        let mut k = kernel.borrow_mut();
        let Some((at, _)) = k.pending.peek() else {
            k.status = SchedulerStatus::Finished;
            log::debug!("simulation finished at {}", k.now);
            break;
        };
        assert!(
            at > k.now,
            "pending event time {} is not after the clock {}",
            at,
            k.now
        );
        k.now = at;
        k.stats.instants += 1;
        while let Some((t, event)) = k.pending.peek() {
            if t != at {
                break;
            }
            k.pending.pop();
            k.fire_event(event);
        }
    }
}
