//! Promise state machine: settlement, adoption, and reaction dispatch.
//!
//! `Pending → Fulfilled | Rejected` directly, or `Pending → Adopting(source)
//! → Fulfilled | Rejected` once the adopted source settles. Terminal states
//! never change. Reactions registered while unsettled are drained exactly
//! once, in registration order, through the engine's scheduler.

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::types::{Handler, HandlerResult, PromiseId, PromiseState, PromiseValue, Resolution};
use crate::traits::{Callback, Thenable};

/// An eventual value or failure. Cloning yields another handle to the same
/// promise.
pub struct Promise<V> {
    cell: Rc<RefCell<PromiseCell<V>>>,
    engine: Engine<V>,
}

struct PromiseCell<V> {
    id: PromiseId,
    state: State<V>,
    reactions: Vec<Reaction<V>>,
}

enum State<V> {
    Pending,
    Adopting(Adoption<V>),
    Fulfilled(V),
    Rejected(V),
}

enum Adoption<V> {
    Promise(Promise<V>),
    Foreign,
}

/// Terminal outcome handed to reactions.
#[derive(Debug, Clone)]
pub(crate) enum Outcome<V> {
    Fulfilled(V),
    Rejected(V),
}

impl<V: PromiseValue> Outcome<V> {
    /// Re-emit this outcome from a handler without touching the
    /// exception hook.
    pub(crate) fn into_resolution(self, engine: &Engine<V>) -> Resolution<V> {
        match self {
            Outcome::Fulfilled(v) => Resolution::Value(v),
            Outcome::Rejected(r) => Resolution::Promise(engine.reject(r)),
        }
    }
}

enum Reaction<V> {
    /// Registered by `then`: run one handler, settle `result` with its output.
    Chain {
        on_fulfilled: Option<Handler<V>>,
        on_rejected: Option<Handler<V>>,
        result: Promise<V>,
    },
    /// An adopting promise waiting on this one.
    Forward(Promise<V>),
    /// A `Thenable` subscriber.
    Notify {
        on_fulfilled: Callback<V>,
        on_rejected: Callback<V>,
    },
}

impl<V: PromiseValue> Reaction<V> {
    fn run(self, outcome: Outcome<V>) {
        match self {
            Reaction::Chain {
                on_fulfilled,
                on_rejected,
                result,
            } => {
                let handler = match outcome {
                    Outcome::Fulfilled(_) => on_fulfilled,
                    Outcome::Rejected(_) => on_rejected,
                };
                result.settle_through(handler, outcome);
            }
            Reaction::Forward(adopter) => adopter.complete(outcome),
            Reaction::Notify {
                mut on_fulfilled,
                mut on_rejected,
            } => match outcome {
                Outcome::Fulfilled(v) => on_fulfilled(v),
                Outcome::Rejected(r) => on_rejected(r),
            },
        }
    }
}

impl<V> Clone for Promise<V> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
            engine: self.engine.clone(),
        }
    }
}

impl<V> Promise<V> {
    pub fn id(&self) -> PromiseId {
        self.cell.borrow().id
    }
}

impl<V: PromiseValue> Promise<V> {
    pub(crate) fn pending(engine: &Engine<V>) -> Self {
        Self::with_state(engine, State::Pending)
    }

    pub(crate) fn settled(engine: &Engine<V>, outcome: Outcome<V>) -> Self {
        let state = match outcome {
            Outcome::Fulfilled(v) => State::Fulfilled(v),
            Outcome::Rejected(r) => State::Rejected(r),
        };
        Self::with_state(engine, state)
    }

    fn with_state(engine: &Engine<V>, state: State<V>) -> Self {
        Self {
            cell: Rc::new(RefCell::new(PromiseCell {
                id: engine.next_id(),
                state,
                reactions: Vec::new(),
            })),
            engine: engine.clone(),
        }
    }

    /// Snapshot of the current state. Adopting promises report `Pending`.
    pub fn state(&self) -> PromiseState<V> {
        match &self.cell.borrow().state {
            State::Pending | State::Adopting(_) => PromiseState::Pending,
            State::Fulfilled(v) => PromiseState::Fulfilled(v.clone()),
            State::Rejected(r) => PromiseState::Rejected(r.clone()),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self.cell.borrow().state,
            State::Fulfilled(_) | State::Rejected(_)
        )
    }

    /// Chain handlers onto this promise. Returns a new promise settled with
    /// the output of whichever handler runs.
    ///
    /// Handlers never run before `then` returns. A missing handler passes the
    /// value or reason through unchanged; a handler returning `Err(e)` rejects
    /// the new promise with `e` and reports `e` to the exception handler.
    pub fn then(&self, on_fulfilled: Option<Handler<V>>, on_rejected: Option<Handler<V>>) -> Promise<V> {
        let result = Promise::pending(&self.engine);
        self.register(Reaction::Chain {
            on_fulfilled,
            on_rejected,
            result: result.clone(),
        });
        result
    }

    /// `then` with only a fulfilment handler.
    pub fn and_then(&self, f: impl FnOnce(V) -> HandlerResult<V> + 'static) -> Promise<V> {
        self.then(Some(Handler::new(f)), None)
    }

    /// `then` with only a rejection handler.
    pub fn or_else(&self, f: impl FnOnce(V) -> HandlerResult<V> + 'static) -> Promise<V> {
        self.then(None, Some(Handler::new(f)))
    }

    /// Transform the fulfilment value with an infallible function.
    pub fn map(&self, f: impl FnOnce(V) -> V + 'static) -> Promise<V> {
        self.and_then(move |v| Ok(Resolution::Value(f(v))))
    }

    /// Run `on_settled` whichever way this promise settles, then forward the
    /// original value or reason.
    ///
    /// If `on_settled` fails, or returns a source that rejects, the returned
    /// promise rejects with that error instead. A source that fulfils is
    /// waited for before the original outcome is forwarded.
    pub fn always(&self, on_settled: impl FnOnce() -> HandlerResult<V> + 'static) -> Promise<V> {
        let slot = Rc::new(RefCell::new(Some(on_settled)));
        let (engine_ok, slot_ok) = (self.engine.clone(), Rc::clone(&slot));
        let engine_err = self.engine.clone();
        self.then(
            Some(Handler::new(move |v| {
                finish_always(&engine_ok, &slot_ok, Outcome::Fulfilled(v))
            })),
            Some(Handler::new(move |r| {
                finish_always(&engine_err, &slot, Outcome::Rejected(r))
            })),
        )
    }

    /// `always` with no callback: a new promise that settles the same way
    /// as this one.
    pub fn passthrough(&self) -> Promise<V> {
        self.then(None, None)
    }

    // -----------------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------------

    /// Whether `resolve`/`reject` were already called. An adopting promise
    /// is resolved but not yet settled.
    pub(crate) fn is_resolved(&self) -> bool {
        !matches!(self.cell.borrow().state, State::Pending)
    }

    /// First call wins; later calls are ignored.
    pub(crate) fn resolve(&self, resolution: Resolution<V>) {
        if self.is_resolved() {
            trace!(promise = %self.id(), "Ignoring resolve of already resolved promise");
            return;
        }
        match resolution {
            Resolution::Value(v) => self.complete(Outcome::Fulfilled(v)),
            Resolution::Promise(source) => self.adopt(source),
            Resolution::Thenable(thenable) => self.adopt_foreign(thenable),
        }
    }

    pub(crate) fn reject_with(&self, reason: V) {
        if self.is_resolved() {
            trace!(promise = %self.id(), "Ignoring reject of already resolved promise");
            return;
        }
        self.complete(Outcome::Rejected(reason));
    }

    /// Move to a terminal state and schedule the queued reactions as one task.
    fn complete(&self, outcome: Outcome<V>) {
        let (id, reactions) = {
            let mut cell = self.cell.borrow_mut();
            if matches!(cell.state, State::Fulfilled(_) | State::Rejected(_)) {
                trace!(promise = %cell.id, "Ignoring settlement of settled promise");
                return;
            }
            cell.state = match &outcome {
                Outcome::Fulfilled(v) => State::Fulfilled(v.clone()),
                Outcome::Rejected(r) => State::Rejected(r.clone()),
            };
            (cell.id, mem::take(&mut cell.reactions))
        };

        debug!(
            promise = %id,
            fulfilled = matches!(outcome, Outcome::Fulfilled(_)),
            reactions = reactions.len(),
            "Promise settled"
        );

        if !reactions.is_empty() {
            self.engine.schedule(Box::new(move || {
                for reaction in reactions {
                    reaction.run(outcome.clone());
                }
            }));
        }
    }

    fn adopt(&self, source: Promise<V>) {
        if let Some(err) = self.adoption_cycle(&source) {
            warn!(error = %err, "Rejecting cyclic adoption");
            self.complete(Outcome::Rejected(V::from_engine_error(&err)));
            return;
        }

        debug!(promise = %self.id(), source = %source.id(), "Promise adopting");
        self.cell.borrow_mut().state = State::Adopting(Adoption::Promise(source.clone()));
        source.register(Reaction::Forward(self.clone()));
    }

    fn adopt_foreign(&self, thenable: Box<dyn Thenable<V>>) {
        debug!(promise = %self.id(), "Promise adopting foreign thenable");
        self.cell.borrow_mut().state = State::Adopting(Adoption::Foreign);

        let on_fulfilled = {
            let adopter = self.clone();
            Box::new(move |v: V| adopter.complete(Outcome::Fulfilled(v))) as Callback<V>
        };
        let on_rejected = {
            let adopter = self.clone();
            Box::new(move |r: V| adopter.complete(Outcome::Rejected(r))) as Callback<V>
        };
        self.engine
            .schedule(Box::new(move || thenable.subscribe(on_fulfilled, on_rejected)));
    }

    /// Walk the chain of promises `source` is adopting; adopting any of them
    /// would never settle.
    fn adoption_cycle(&self, source: &Promise<V>) -> Option<EngineError> {
        let target = self.id();
        let mut current = source.clone();
        loop {
            if Rc::ptr_eq(&current.cell, &self.cell) {
                return Some(EngineError::AdoptionCycle {
                    promise: target,
                    source_id: source.id(),
                });
            }
            let next = match &current.cell.borrow().state {
                State::Adopting(Adoption::Promise(next)) => next.clone(),
                _ => return None,
            };
            current = next;
        }
    }

    // -----------------------------------------------------------------------
    // Reactions
    // -----------------------------------------------------------------------

    fn outcome(&self) -> Option<Outcome<V>> {
        match &self.cell.borrow().state {
            State::Fulfilled(v) => Some(Outcome::Fulfilled(v.clone())),
            State::Rejected(r) => Some(Outcome::Rejected(r.clone())),
            State::Pending | State::Adopting(_) => None,
        }
    }

    /// Queue while unsettled; otherwise schedule right away. Never runs the
    /// reaction synchronously.
    fn register(&self, reaction: Reaction<V>) {
        match self.outcome() {
            Some(outcome) => self.engine.schedule(Box::new(move || reaction.run(outcome))),
            None => self.cell.borrow_mut().reactions.push(reaction),
        }
    }

    /// Settle `self` (a chained result) through an optional handler.
    pub(crate) fn settle_through(&self, handler: Option<Handler<V>>, outcome: Outcome<V>) {
        let Some(handler) = handler else {
            match outcome {
                Outcome::Fulfilled(v) => self.resolve(Resolution::Value(v)),
                Outcome::Rejected(r) => self.reject_with(r),
            }
            return;
        };

        let input = match outcome {
            Outcome::Fulfilled(v) | Outcome::Rejected(v) => v,
        };
        match handler.call(input) {
            Ok(resolution) => self.resolve(resolution),
            Err(err) => {
                self.engine.report(&err);
                self.reject_with(err);
            }
        }
    }
}

fn finish_always<V, F>(engine: &Engine<V>, slot: &RefCell<Option<F>>, outcome: Outcome<V>) -> HandlerResult<V>
where
    V: PromiseValue,
    F: FnOnce() -> HandlerResult<V>,
{
    let Some(on_settled) = slot.borrow_mut().take() else {
        return Ok(outcome.into_resolution(engine));
    };

    match on_settled()? {
        Resolution::Value(_) => Ok(outcome.into_resolution(engine)),
        waited => {
            let forward = engine.clone();
            let settled = engine
                .adapt(waited)
                .and_then(move |_| Ok(outcome.into_resolution(&forward)));
            Ok(Resolution::Promise(settled))
        }
    }
}

impl<V: PromiseValue> Thenable<V> for Promise<V> {
    fn subscribe(self: Box<Self>, on_fulfilled: Callback<V>, on_rejected: Callback<V>) {
        self.register(Reaction::Notify {
            on_fulfilled,
            on_rejected,
        });
    }
}

impl<V: PromiseValue> fmt::Debug for Promise<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
