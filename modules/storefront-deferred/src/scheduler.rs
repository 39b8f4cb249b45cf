//! Cooperative FIFO task queue.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::error::{EngineError, EngineResult};
use crate::traits::{Scheduler, Task};

/// Single-threaded FIFO scheduler.
///
/// `schedule` only enqueues. Tasks run when the embedder drains the queue,
/// so a continuation never runs inside the stack frame that scheduled it.
pub struct TaskQueue {
    tasks: RefCell<VecDeque<Task>>,
    draining: Cell<bool>,
    total_scheduled: Cell<u64>,
    config: QueueConfig,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            tasks: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
            total_scheduled: Cell::new(0),
            config,
        }
    }

    /// Tasks waiting to run.
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Tasks scheduled over the queue's lifetime.
    pub fn total_scheduled(&self) -> u64 {
        self.total_scheduled.get()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Run the oldest task, if any. Returns whether a task ran.
    ///
    /// Refused with [`EngineError::ReentrantDrain`] when called from inside a
    /// running task.
    pub fn run_next(&self) -> EngineResult<bool> {
        if self.draining.replace(true) {
            return Err(EngineError::ReentrantDrain);
        }
        let _reset = DrainGuard(&self.draining);
        Ok(self.pop_and_run())
    }

    fn pop_and_run(&self) -> bool {
        // The borrow must end before the task runs: tasks schedule more tasks.
        let next = self.tasks.borrow_mut().pop_front();
        match next {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks until the queue is empty, including tasks scheduled while
    /// draining. Returns how many ran.
    pub fn run_until_idle(&self) -> EngineResult<usize> {
        if self.draining.replace(true) {
            return Err(EngineError::ReentrantDrain);
        }
        let _reset = DrainGuard(&self.draining);

        let limit = self.config.max_tasks_per_drain;
        let mut ran = 0usize;
        while !self.is_empty() {
            if ran >= limit {
                warn!(limit, pending = self.len(), "Task queue drain limit reached");
                return Err(EngineError::DrainLimitExceeded { limit });
            }
            self.pop_and_run();
            ran += 1;
        }

        if ran > 0 {
            debug!(ran, "Task queue idle");
        }
        Ok(ran)
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task) {
        self.total_scheduled.set(self.total_scheduled.get() + 1);
        self.tasks.borrow_mut().push_back(task);
    }
}

/// Clears the draining flag even if a task panics.
struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn schedule_does_not_run_task() {
        let queue = TaskQueue::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        queue.schedule(Box::new(move || flag.set(true)));

        assert!(!ran.get());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.run_until_idle().unwrap(), 1);
        assert!(ran.get());
        assert!(queue.is_empty());
    }

    #[test]
    fn tasks_run_in_fifo_order() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..5 {
            let log = log.clone();
            queue.schedule(Box::new(move || log.borrow_mut().push(i)));
        }
        queue.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn tasks_scheduled_while_draining_run_after_existing_ones() {
        let queue = Rc::new(TaskQueue::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let (q, l) = (queue.clone(), log.clone());
        queue.schedule(Box::new(move || {
            l.borrow_mut().push("first");
            let l2 = l.clone();
            q.schedule(Box::new(move || l2.borrow_mut().push("nested")));
        }));
        let l = log.clone();
        queue.schedule(Box::new(move || l.borrow_mut().push("second")));

        assert_eq!(queue.run_until_idle().unwrap(), 3);
        assert_eq!(*log.borrow(), vec!["first", "second", "nested"]);
        assert_eq!(queue.total_scheduled(), 3);
    }

    #[test]
    fn drain_limit_stops_runaway_rescheduling() {
        fn reschedule(queue: Rc<TaskQueue>) {
            let q = queue.clone();
            queue.schedule(Box::new(move || reschedule(q)));
        }

        let queue = Rc::new(TaskQueue::with_config(
            QueueConfig::default().with_max_tasks_per_drain(10),
        ));
        reschedule(queue.clone());

        assert_eq!(
            queue.run_until_idle(),
            Err(EngineError::DrainLimitExceeded { limit: 10 })
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn nested_drain_is_refused() {
        let queue = Rc::new(TaskQueue::new());
        let outcome = Rc::new(RefCell::new(None));

        let (q, o) = (queue.clone(), outcome.clone());
        queue.schedule(Box::new(move || {
            *o.borrow_mut() = Some(q.run_until_idle());
        }));
        queue.run_until_idle().unwrap();

        assert_eq!(*outcome.borrow(), Some(Err(EngineError::ReentrantDrain)));
        // The flag is cleared once the outer drain finishes.
        assert_eq!(queue.run_until_idle().unwrap(), 0);
    }

    #[test]
    fn run_next_on_empty_queue_is_false() {
        assert_eq!(TaskQueue::new().run_next(), Ok(false));
    }

    #[test]
    fn run_next_runs_one_task_at_a_time() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..2 {
            let log = log.clone();
            queue.schedule(Box::new(move || log.borrow_mut().push(i)));
        }

        assert_eq!(queue.run_next(), Ok(true));
        assert_eq!(*log.borrow(), vec![0]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn run_next_inside_a_task_is_refused() {
        let queue = Rc::new(TaskQueue::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let outcome = Rc::new(RefCell::new(None));

        let (q, l, o) = (queue.clone(), log.clone(), outcome.clone());
        queue.schedule(Box::new(move || {
            l.borrow_mut().push("outer");
            *o.borrow_mut() = Some(q.run_next());
            l.borrow_mut().push("outer done");
        }));
        let l = log.clone();
        queue.schedule(Box::new(move || l.borrow_mut().push("inner")));

        assert_eq!(queue.run_next(), Ok(true));
        assert_eq!(*outcome.borrow(), Some(Err(EngineError::ReentrantDrain)));
        assert_eq!(*log.borrow(), vec!["outer", "outer done"]);

        // The refused call left the second task queued.
        assert_eq!(queue.run_until_idle(), Ok(1));
        assert_eq!(*log.borrow(), vec!["outer", "outer done", "inner"]);
    }
}
