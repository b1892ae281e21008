//! Session ownership and the task-facing context.
//!
//! The scheduler state is owned by exactly one [`SimSession`]. Everything
//! else (events, modules, task code, the components built on top) holds a
//! [`SimContext`], a cheap clone with a *weak* back-reference to the
//! session. Task futures are stored inside the scheduler, so if they held
//! strong references the session could never be freed; the weak handle
//! breaks that cycle. Using a context after its session is torn down is a
//! fatal error.
//!
//! ```ignore
//! let session = SimSession::init();
//! let ctx = session.context();
//! let module = Module::new(&ctx);
//! let tick = Event::new(&ctx);
//!
//! let c = ctx.clone();
//! let e = tick.clone();
//! module.register_coroutine(
//!     async move {
//!         e.notify(SimTime::cycles(1));
//!         c.wait(&e).await;
//!     },
//!     &[],
//! );
//!
//! session.run();
//! ```

use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::event::Event;
use super::scheduler::{KernelStats, Scheduler, SchedulerStatus};
use super::task::{TaskId, WaitFuture};
use super::time::SimTime;

/// Index of a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub(crate) u32);

/// Owner of one simulation's entire state.
pub struct SimSession {
    kernel: Rc<RefCell<Scheduler>>,
}

impl SimSession {
    /// Create a fresh session with an uninitialized scheduler.
    pub fn init() -> SimSession {
        SimSession {
            kernel: Rc::new(RefCell::new(Scheduler::new())),
        }
    }

    /// Hand out a context for building modules, events and components.
    pub fn context(&self) -> SimContext {
        SimContext {
            kernel: Rc::downgrade(&self.kernel),
        }
    }

    /// Drive the scheduler from initialization to completion.
    ///
    /// Returns when both the ready queue and the pending-event queue are
    /// empty. Suspended tasks that can never be woken do not keep the run
    /// alive.
    pub fn run(&self) {
        super::scheduler::run(&self.kernel);
    }

    /// Tear the simulation down and start over with a pristine scheduler.
    ///
    /// Every outstanding [`SimContext`], [`Event`] and [`Module`] handle
    /// goes dead; using one afterwards is fatal.
    pub fn reset(&mut self) {
        // Replacing the Rc drops the old kernel wholesale. Task futures are
        // dropped while the strong count is already zero, so event handles
        // they own see a dead weak reference and release nothing.
        self.kernel = Rc::new(RefCell::new(Scheduler::new()));
    }

    /// Current simulated time.
    pub fn sim_time(&self) -> SimTime {
        self.kernel.borrow().now
    }

    /// Current scheduler status.
    pub fn status(&self) -> SchedulerStatus {
        self.kernel.borrow().status
    }

    /// Counters accumulated over the run so far.
    pub fn stats(&self) -> KernelStats {
        self.kernel.borrow().stats
    }
}

/// Cheap handle to the session, usable from task code and components.
#[derive(Clone)]
pub struct SimContext {
    pub(crate) kernel: Weak<RefCell<Scheduler>>,
}

impl SimContext {
    /// Upgrade to the owning session's scheduler. Fatal after teardown.
    pub(crate) fn kernel(&self) -> Rc<RefCell<Scheduler>> {
        match self.kernel.upgrade() {
            Some(k) => k,
            None => panic!("simulation session has been torn down"),
        }
    }

    /// Like `kernel()` but tolerant of teardown, for use in `Drop` impls.
    pub(crate) fn try_kernel(&self) -> Option<Rc<RefCell<Scheduler>>> {
        self.kernel.upgrade()
    }

    pub(crate) fn same_session(&self, other: &SimContext) -> bool {
        Weak::ptr_eq(&self.kernel, &other.kernel)
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.kernel().borrow().now
    }

    /// Suspend the calling task until `event` fires.
    pub fn wait(&self, event: &Event) -> WaitFuture {
        let mut events: SmallVec<[Event; 2]> = SmallVec::new();
        events.push(event.clone());
        WaitFuture::new(self.clone(), events)
    }

    /// Suspend the calling task until any one of `events` fires.
    pub fn wait_any(&self, events: &[&Event]) -> WaitFuture {
        let events: SmallVec<[Event; 2]> = events.iter().map(|e| (*e).clone()).collect();
        WaitFuture::new(self.clone(), events)
    }

    /// Suspend the calling task for `delay`: creates a private event,
    /// notifies it, waits on it.
    pub async fn wait_time(&self, delay: SimTime) {
        let event = Event::new(self);
        event.notify(delay);
        self.wait(&event).await;
    }
}

/// A unit-of-design container. Tasks belong to exactly one module.
pub struct Module {
    ctx: SimContext,
    id: ModuleId,
}

impl Module {
    /// Register a new module with the session behind `ctx`.
    pub fn new(ctx: &SimContext) -> Module {
        let kernel = ctx.kernel();
        let id = kernel.borrow_mut().alloc_module();
        Module {
            ctx: ctx.clone(),
            id,
        }
    }

    /// Bind a task to this module.
    ///
    /// With no `initial_events`, the task is seeded into the ready queue at
    /// startup and runs once from the top. With initial events, the task is
    /// statically bound to them instead: it first runs when one of them
    /// fires, and, since static waiters survive every fire, is woken again on
    /// every subsequent fire.
    ///
    /// Registering while the scheduler is `Running` attaches the task
    /// dynamically: it is pushed straight onto the ready queue and runs
    /// within the current evaluate phase. Registering in any other started
    /// state is a programming error and fatal.
    pub fn register_coroutine(
        &self,
        logic: impl Future<Output = ()> + 'static,
        initial_events: &[&Event],
    ) -> TaskId {
        let kernel = self.ctx.kernel();
        let mut k = kernel.borrow_mut();
        let task = k.alloc_task(Box::pin(logic), self.id);
        for event in initial_events {
            k.event_mut(event.id()).add_static_waiter(task);
        }
        match k.status {
            SchedulerStatus::Uninitialized => {
                if initial_events.is_empty() {
                    k.startup.push(task);
                }
            }
            SchedulerStatus::Running => {
                k.ready.push(task);
            }
            status => panic!(
                "cannot register a task while the scheduler is {status:?}; \
                 dynamic attachment requires a running scheduler"
            ),
        }
        task
    }

    /// Id of this module.
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// The context this module was created from.
    pub fn context(&self) -> &SimContext {
        &self.ctx
    }
}
