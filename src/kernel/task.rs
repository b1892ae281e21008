//! Cooperative tasks.
//!
//! A task is a boxed future owned by the scheduler arena. The async state
//! machine is what preserves a task's locals across suspension points; the
//! only way a task suspends is by awaiting a [`WaitFuture`], which registers
//! it as a dynamic waiter on one or more events and yields to the scheduler.
//!
//! The scheduler alone decides readiness, so wakers are inert: polls happen
//! exactly when the evaluate phase dispatches a ready task.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use smallvec::SmallVec;

use super::context::{ModuleId, SimContext};
use super::event::Event;

/// Arena index of a task.
///
/// Task ids are never recycled: a finished task's id may linger in an
/// event's static waiter set, and waking it must stay a harmless no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u32);

/// Arena-resident state of one task.
pub(crate) struct TaskEntry {
    /// The suspended continuation. `None` while the task is being polled
    /// and after it finishes.
    pub(crate) future: Option<Pin<Box<dyn Future<Output = ()>>>>,
    /// Set once the future returns `Ready`; later wakes are ignored.
    pub(crate) finished: bool,
    /// Owning module.
    pub(crate) module: ModuleId,
}

impl std::fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEntry")
            .field("suspended", &self.future.is_some())
            .field("finished", &self.finished)
            .field("module", &self.module)
            .finish()
    }
}

struct InertWake;

impl Wake for InertWake {
    fn wake(self: Arc<Self>) {}
}

/// Waker handed to task polls. Readiness flows through the ready queue, not
/// through the waker, so waking does nothing.
pub(crate) fn inert_waker() -> Waker {
    Waker::from(Arc::new(InertWake))
}

/// Future returned by the wait primitives.
///
/// First poll: registers the current task in every named event's dynamic
/// waiter set and suspends. Resuming poll: removes the task from *all* of
/// those sets (a multi-event wait is satisfied by whichever event fired
/// first, and the losers must not keep a stale registration) and completes.
pub struct WaitFuture {
    ctx: SimContext,
    events: SmallVec<[Event; 2]>,
    registered: bool,
}

impl WaitFuture {
    pub(crate) fn new(ctx: SimContext, events: SmallVec<[Event; 2]>) -> WaitFuture {
        WaitFuture {
            ctx,
            events,
            registered: false,
        }
    }
}

impl Future for WaitFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let kernel = this.ctx.kernel();
        let mut k = kernel.borrow_mut();
        let task = match k.current_task {
            Some(task) => task,
            None => panic!("wait() may only be awaited from inside a simulation task"),
        };

        if !this.registered {
            assert!(
                !this.events.is_empty(),
                "wait() needs at least one event to wait on"
            );
            this.registered = true;
            for event in &this.events {
                k.event_mut(event.id()).add_dynamic_waiter(task);
            }
            Poll::Pending
        } else {
            for event in &this.events {
                k.event_mut(event.id()).remove_dynamic_waiter(task);
            }
            Poll::Ready(())
        }
    }
}
