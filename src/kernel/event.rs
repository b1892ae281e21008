//! One-shot notification points.
//!
//! An [`Event`] is the only synchronization primitive the kernel knows. It
//! carries two waiter sets:
//!
//! - **static** waiters, bound once at task registration, surviving every
//!   fire of the event;
//! - **dynamic** waiters, registered per suspension and cleared when the
//!   event fires.
//!
//! Event state lives in the scheduler's arena; the public [`Event`] type is
//! a cheap reference-counted handle. Identity is the arena id: two handles
//! compare equal iff they name the same underlying event of the same
//! session. Arena slots are recycled once no handle, no waiter entry and no
//! pending occurrence reference them, so short-lived events created by
//! `wait_time` do not grow the arena without bound.

use super::context::SimContext;
use super::task::TaskId;
use super::time::SimTime;

/// Arena index of an event. Also the tie-breaker in the pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub(crate) u32);

/// Arena-resident state of one event.
#[derive(Debug, Default)]
pub(crate) struct EventState {
    /// Absolute time of the last `notify`, `None` until first notified and
    /// after `cancel`.
    pub(crate) notify_time: Option<SimTime>,
    /// Waiters bound at registration; persist across fires.
    static_waiters: Vec<TaskId>,
    /// Waiters bound per suspension; cleared on every fire.
    dynamic_waiters: Vec<TaskId>,
    /// Live `Event` handles referencing this slot.
    pub(crate) handles: u32,
}

impl EventState {
    pub(crate) fn add_static_waiter(&mut self, task: TaskId) {
        if !self.static_waiters.contains(&task) {
            self.static_waiters.push(task);
        }
    }

    pub(crate) fn add_dynamic_waiter(&mut self, task: TaskId) {
        if !self.dynamic_waiters.contains(&task) {
            self.dynamic_waiters.push(task);
        }
    }

    pub(crate) fn remove_dynamic_waiter(&mut self, task: TaskId) {
        self.dynamic_waiters.retain(|&t| t != task);
    }

    /// Combined waiter set in wake order: static first, then dynamic,
    /// duplicates skipped.
    pub(crate) fn collect_waiters(&self, out: &mut Vec<TaskId>) {
        out.clear();
        for &t in &self.static_waiters {
            out.push(t);
        }
        for &t in &self.dynamic_waiters {
            if !out.contains(&t) {
                out.push(t);
            }
        }
    }

    pub(crate) fn clear_dynamic_waiters(&mut self) {
        self.dynamic_waiters.clear();
    }

    /// True when nothing in the kernel or user code references the slot
    /// (pending-queue membership is checked by the caller).
    pub(crate) fn is_unreferenced(&self) -> bool {
        self.handles == 0 && self.static_waiters.is_empty() && self.dynamic_waiters.is_empty()
    }
}

/// Handle to an event owned by a simulation session.
pub struct Event {
    ctx: SimContext,
    id: EventId,
}

impl Event {
    /// Create a fresh event in the session behind `ctx`.
    pub fn new(ctx: &SimContext) -> Event {
        let kernel = ctx.kernel();
        let id = kernel.borrow_mut().alloc_event();
        Event {
            ctx: ctx.clone(),
            id,
        }
    }

    pub(crate) fn id(&self) -> EventId {
        self.id
    }

    /// Schedule this event to fire at `now + delay`, replacing any pending
    /// occurrence. The absolute time must end up strictly in the future;
    /// notifying with `SimTime::ZERO` mid-run trips the scheduler's
    /// monotonic-clock assertion when the occurrence is popped.
    pub fn notify(&self, delay: SimTime) {
        let kernel = self.ctx.kernel();
        let mut k = kernel.borrow_mut();
        let at = k.now + delay;
        k.schedule_event(self.id, at);
    }

    /// Schedule this event at an absolute time, replacing any pending
    /// occurrence. Kernel-internal: components that track absolute deadlines
    /// (the chunk-memory engine, delayed semaphores) use this to re-arm
    /// without round-tripping through delay arithmetic.
    pub(crate) fn notify_at(&self, at: SimTime) {
        let kernel = self.ctx.kernel();
        kernel.borrow_mut().schedule_event(self.id, at);
    }

    /// Remove the pending occurrence, if any, and forget the notify time.
    ///
    /// Tasks already suspended on this event stay suspended until something
    /// else wakes them; cancellation does not resolve waiters.
    pub fn cancel(&self) {
        let kernel = self.ctx.kernel();
        kernel.borrow_mut().cancel_event(self.id);
    }

    /// True iff the event fired at the current instant. Only meaningful
    /// during the instant of the fire.
    pub fn triggered(&self) -> bool {
        let kernel = self.ctx.kernel();
        let k = kernel.borrow();
        k.event(self.id).notify_time == Some(k.now)
    }
}

impl Clone for Event {
    fn clone(&self) -> Event {
        let kernel = self.ctx.kernel();
        kernel.borrow_mut().event_mut(self.id).handles += 1;
        Event {
            ctx: self.ctx.clone(),
            id: self.id,
        }
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        // The session may already be gone (teardown drops the kernel and
        // everything it owns); a dead weak reference means there is nothing
        // left to release.
        let Some(kernel) = self.ctx.try_kernel() else {
            return;
        };
        if let Ok(mut k) = kernel.try_borrow_mut() {
            k.release_event_handle(self.id);
        };
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Event) -> bool {
        self.id == other.id && self.ctx.same_session(&other.ctx)
    }
}

impl Eq for Event {}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Event").field(&self.id.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waiter_sets_dedup_and_order() {
        let mut st = EventState::default();
        st.add_static_waiter(TaskId(3));
        st.add_static_waiter(TaskId(1));
        st.add_static_waiter(TaskId(3));
        st.add_dynamic_waiter(TaskId(2));
        st.add_dynamic_waiter(TaskId(1)); // also static: woken once

        let mut out = Vec::new();
        st.collect_waiters(&mut out);
        // Static in insertion order, then dynamic, no duplicates.
        assert_eq!(out, vec![TaskId(3), TaskId(1), TaskId(2)]);
    }

    #[test]
    fn test_clear_dynamic_keeps_static() {
        let mut st = EventState::default();
        st.add_static_waiter(TaskId(1));
        st.add_dynamic_waiter(TaskId(2));
        st.clear_dynamic_waiters();

        let mut out = Vec::new();
        st.collect_waiters(&mut out);
        assert_eq!(out, vec![TaskId(1)]);
    }

    #[test]
    fn test_remove_dynamic_waiter() {
        let mut st = EventState::default();
        st.add_dynamic_waiter(TaskId(5));
        st.add_dynamic_waiter(TaskId(6));
        st.remove_dynamic_waiter(TaskId(5));

        let mut out = Vec::new();
        st.collect_waiters(&mut out);
        assert_eq!(out, vec![TaskId(6)]);
    }
}
