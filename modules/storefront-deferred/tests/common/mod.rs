//! Shared fixtures for engine tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;
use storefront_deferred::{Callback, Engine, TaskQueue, Thenable};

/// Engine over a shared queue, recording every error passed to the
/// exception handler.
pub struct Harness {
    pub queue: Rc<TaskQueue>,
    pub engine: Engine<Value>,
    pub reported: Rc<RefCell<Vec<Value>>>,
}

impl Harness {
    pub fn new() -> Self {
        let queue = Rc::new(TaskQueue::new());
        let reported = Rc::new(RefCell::new(Vec::new()));
        let sink = reported.clone();
        let engine = Engine::new(queue.clone(), move |err: &Value| {
            sink.borrow_mut().push(err.clone())
        });
        Self {
            queue,
            engine,
            reported,
        }
    }

    /// Drain the queue, returning how many tasks ran.
    pub fn settle(&self) -> usize {
        self.queue.run_until_idle().expect("queue should drain")
    }

    pub fn reported(&self) -> Vec<Value> {
        self.reported.borrow().clone()
    }
}

// ---------------------------------------------------------------------------
// Foreign thenables
// ---------------------------------------------------------------------------

/// Replays a fixed script of settlements, synchronously, when subscribed.
/// Lets tests model misbehaving sources that settle more than once.
pub struct ScriptedThenable {
    pub script: Vec<Result<Value, Value>>,
}

impl ScriptedThenable {
    pub fn new(script: Vec<Result<Value, Value>>) -> Self {
        Self { script }
    }
}

impl Thenable<Value> for ScriptedThenable {
    fn subscribe(
        self: Box<Self>,
        mut on_fulfilled: Callback<Value>,
        mut on_rejected: Callback<Value>,
    ) {
        for step in self.script {
            match step {
                Ok(v) => on_fulfilled(v),
                Err(r) => on_rejected(r),
            }
        }
    }
}

/// Holds on to its callbacks so the test decides when it settles.
#[derive(Clone, Default)]
pub struct ManualThenable {
    callbacks: Rc<RefCell<Option<(Callback<Value>, Callback<Value>)>>>,
}

impl ManualThenable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscribed(&self) -> bool {
        self.callbacks.borrow().is_some()
    }

    pub fn fulfill(&self, value: Value) {
        if let Some((on_fulfilled, _)) = self.callbacks.borrow_mut().as_mut() {
            on_fulfilled(value);
        }
    }

    pub fn reject(&self, reason: Value) {
        if let Some((_, on_rejected)) = self.callbacks.borrow_mut().as_mut() {
            on_rejected(reason);
        }
    }
}

impl Thenable<Value> for ManualThenable {
    fn subscribe(self: Box<Self>, on_fulfilled: Callback<Value>, on_rejected: Callback<Value>) {
        *self.callbacks.borrow_mut() = Some((on_fulfilled, on_rejected));
    }
}
