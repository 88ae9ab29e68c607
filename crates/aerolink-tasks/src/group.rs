//! # Task Groups
//!
//! Tracks a set of in-flight tasks so an owner can cancel them together,
//! typically when the component that issued them goes away.
//!
//! Tasks are filed under a numeric subset. A task leaves the group on its
//! own as soon as it settles, so the group only ever holds pending work.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::task::{Task, TaskControl};

/// Subset used by [`TaskGroup::add`].
pub const DEFAULT_SUBSET: u32 = 0;

struct Member {
    subset: u32,
    task: Rc<dyn TaskControl>,
}

#[derive(Default)]
struct GroupInner {
    next_id: Cell<u64>,
    members: RefCell<HashMap<u64, Member>>,
}

/// A set of pending tasks, partitioned into subsets.
#[derive(Clone, Default)]
pub struct TaskGroup {
    inner: Rc<GroupInner>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `task` to the default subset.
    pub fn add<T: 'static>(&self, task: &Task<T>) {
        self.add_to_subset(DEFAULT_SUBSET, task);
    }

    /// Adds `task` to `subset`. Already settled tasks are ignored.
    pub fn add_to_subset<T: 'static>(&self, subset: u32, task: &Task<T>) {
        if task.is_complete() {
            return;
        }
        let id = self.inner.next_id.get() + 1;
        self.inner.next_id.set(id);
        self.inner.members.borrow_mut().insert(
            id,
            Member {
                subset,
                task: task.control(),
            },
        );

        let group = Rc::downgrade(&self.inner);
        task.when_complete(move |_| {
            if let Some(group) = group.upgrade() {
                group.members.borrow_mut().remove(&id);
            }
        });
    }

    /// Cancels every pending task of `subset`. Returns how many were canceled.
    pub fn cancel(&self, subset: u32) -> usize {
        self.cancel_where(|member| member.subset == subset)
    }

    /// Cancels every pending task. Returns how many were canceled.
    pub fn cancel_all(&self) -> usize {
        self.cancel_where(|_| true)
    }

    fn cancel_where(&self, filter: impl Fn(&Member) -> bool) -> usize {
        // collected first: settling a task re-enters `members`
        let targets: Vec<Rc<dyn TaskControl>> = self
            .inner
            .members
            .borrow()
            .values()
            .filter(|member| filter(*member))
            .map(|member| Rc::clone(&member.task))
            .collect();

        let canceled = targets.iter().filter(|task| task.cancel()).count();
        if canceled > 0 {
            debug!(canceled, "Task group canceled tasks");
        }
        canceled
    }

    /// True when no task of `subset` is pending.
    pub fn is_complete(&self, subset: u32) -> bool {
        !self
            .inner
            .members
            .borrow()
            .values()
            .any(|member| member.subset == subset && !member.task.is_complete())
    }

    /// True when no task at all is pending.
    pub fn all_complete(&self) -> bool {
        self.inner
            .members
            .borrow()
            .values()
            .all(|member| member.task.is_complete())
    }

    /// Number of pending tasks in the group.
    pub fn len(&self) -> usize {
        self.inner.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
