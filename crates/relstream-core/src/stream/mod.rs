//! Lazy stream builders.
//!
//! A chain of builders shares one [`Pipeline`](crate::pipeline::Pipeline)
//! and one stream set. Appending an operation consumes the builder and
//! records an action descriptor; a terminal operation freezes the pipeline,
//! lets the source decide how much of it to render as SQL, replays the rest
//! in memory and closes every member of the stream set afterwards.
//!
//! A builder may only be linked or consumed once. Appending to a builder
//! that was already consumed is reported by the next terminal operation as
//! [`Error::StreamConsumed`]; calling a second terminal operation on the
//! same builder returns it directly.

mod concat;
mod iter;
mod primitive;
mod reference;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use relstream_types::{Error, Result};

use crate::executor::SqlQuery;
use crate::pipeline::{Action, Pipeline};
use crate::resource::{close_all, first_error, CloseHandler};

pub use concat::concat_and_auto_close;
pub use iter::StreamIter;
pub use primitive::{
    DoubleStream, DoubleSummaryStatistics, IntStream, IntSummaryStatistics, LongStream,
    LongSummaryStatistics, Summable, SummaryStatistics,
};
pub use reference::Stream;

/// Element sequence produced while replaying a pipeline.
pub(crate) type Flow<T> = Box<dyn Iterator<Item = T>>;

/// Builds the element sequence for a frozen pipeline. Returns the flow and
/// the number of leading actions the source already applied.
pub(crate) type Replay<T> = Box<dyn FnOnce(&Pipeline, &ReplayContext) -> Result<(Flow<T>, usize)>>;

/// Renders the statement a pipeline would run, without running it.
pub(crate) type Explain = Rc<dyn Fn(&Pipeline) -> Result<SqlQuery>>;

/// First error raised while a flow was being pulled. Flows stop yielding
/// once they latch an error; the terminal operation reports it.
#[derive(Clone, Default)]
pub(crate) struct ErrorLatch(Rc<RefCell<Option<Error>>>);

impl ErrorLatch {
    pub(crate) fn set(&self, err: Error) {
        let mut slot = self.0.borrow_mut();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub(crate) fn take(&self) -> Option<Error> {
        self.0.borrow_mut().take()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.borrow().is_some()
    }
}

/// What a replaying source can reach: the error latch of the terminal
/// operation and the close handlers of the builder being consumed.
pub(crate) struct ReplayContext {
    latch: ErrorLatch,
    local: Rc<CloseState>,
}

impl ReplayContext {
    pub(crate) fn latch(&self) -> &ErrorLatch {
        &self.latch
    }

    /// Register a resource opened during replay.
    pub(crate) fn on_close(&self, handler: CloseHandler) {
        self.local.push(handler);
    }
}

/// Close handlers registered on one builder.
#[derive(Default)]
pub(crate) struct CloseState {
    closed: Cell<bool>,
    handlers: RefCell<Vec<CloseHandler>>,
}

impl CloseState {
    fn push(&self, handler: CloseHandler) {
        self.handlers.borrow_mut().push(handler);
    }

    fn close(&self) -> Result<()> {
        if self.closed.replace(true) {
            return Ok(());
        }
        let handlers = std::mem::take(&mut *self.handlers.borrow_mut());
        close_all(handlers)
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

/// Closes a builder's own handlers, then every other member of its stream set.
#[derive(Clone)]
pub(crate) struct SetCloser {
    local: Rc<CloseState>,
    set: Rc<RefCell<Vec<Rc<CloseState>>>>,
}

impl SetCloser {
    fn root() -> Self {
        let local = Rc::new(CloseState::default());
        let set = Rc::new(RefCell::new(vec![Rc::clone(&local)]));
        Self { local, set }
    }

    /// A fresh member of the same stream set.
    fn member(&self) -> Self {
        let local = Rc::new(CloseState::default());
        self.set.borrow_mut().push(Rc::clone(&local));
        Self {
            local,
            set: Rc::clone(&self.set),
        }
    }

    pub(crate) fn close(&self) -> Result<()> {
        let mut errors = Vec::new();
        if let Err(err) = self.local.close() {
            errors.push(err);
        }
        let others: Vec<Rc<CloseState>> = self
            .set
            .borrow()
            .iter()
            .filter(|member| !Rc::ptr_eq(member, &self.local))
            .cloned()
            .collect();
        for member in others {
            if let Err(err) = member.close() {
                errors.push(err);
            }
        }
        first_error(errors)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.local.is_closed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Building,
    /// Superseded by a downstream builder or handed to an iterator; closing
    /// is someone else's job.
    Linked,
    Consumed,
}

/// Builder state shared by every stream flavour.
pub(crate) struct Core {
    pipeline: Rc<RefCell<Pipeline>>,
    closer: SetCloser,
    explain: Option<Explain>,
    state: State,
    deferred: Option<Error>,
}

impl Core {
    fn root(explain: Option<Explain>) -> Self {
        Self {
            pipeline: Rc::new(RefCell::new(Pipeline::new())),
            closer: SetCloser::root(),
            explain,
            state: State::Building,
            deferred: None,
        }
    }

    fn defer(&mut self, err: Error) {
        if self.deferred.is_none() {
            self.deferred = Some(err);
        }
    }

    /// Record `action`, returning its index, or defer the failure to the
    /// next terminal operation.
    fn push(&mut self, action: Action) -> Option<usize> {
        if self.state != State::Building {
            self.defer(Error::StreamConsumed);
            return None;
        }
        tracing::trace!(action = action.name(), "appending stream action");
        let pushed = self.pipeline.borrow_mut().push(action);
        match pushed {
            Ok(index) => Some(index),
            Err(err) => {
                self.defer(err);
                None
            }
        }
    }

    /// Hand the chain over to a downstream builder.
    fn link(&mut self) -> Core {
        let mut next = Core {
            pipeline: Rc::clone(&self.pipeline),
            closer: self.closer.member(),
            explain: self.explain.clone(),
            state: State::Building,
            deferred: self.deferred.take(),
        };
        match self.state {
            State::Building => self.state = State::Linked,
            State::Linked | State::Consumed => next.defer(Error::StreamConsumed),
        }
        next
    }

    /// Claim the builder for a terminal operation.
    fn begin(&mut self) -> Result<()> {
        if self.state != State::Building {
            return Err(Error::StreamConsumed);
        }
        self.state = State::Consumed;
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        self.pipeline.borrow_mut().freeze();
        Ok(())
    }

    fn add_close_handler(&mut self, handler: CloseHandler) {
        if self.state == State::Building {
            self.closer.local.push(handler);
        } else {
            self.defer(Error::StreamConsumed);
        }
    }

    fn context(&self) -> ReplayContext {
        ReplayContext {
            latch: ErrorLatch::default(),
            local: Rc::clone(&self.closer.local),
        }
    }

    fn explain(&self) -> Result<Option<SqlQuery>> {
        match &self.explain {
            Some(render) => render(&self.pipeline.borrow()).map(Some),
            None => Ok(None),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.closer.close()
    }

    fn drop_close(&mut self) {
        if self.state == State::Linked || self.closer.is_closed() {
            return;
        }
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "failed to close stream on drop");
        }
    }
}

fn saturating_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn counting(counter: &Rc<Cell<u32>>, fail: bool) -> CloseHandler {
        let counter = Rc::clone(counter);
        Box::new(move || {
            counter.set(counter.get() + 1);
            if fail {
                Err(Error::mapping("close failed"))
            } else {
                Ok(())
            }
        })
    }

    #[test]
    fn set_closer_fans_out_once() {
        let root = SetCloser::root();
        let member = root.member();
        let a = Rc::new(Cell::new(0));
        let b = Rc::new(Cell::new(0));
        root.local.push(counting(&a, false));
        member.local.push(counting(&b, false));

        member.close().unwrap();
        root.close().unwrap();
        member.close().unwrap();
        assert_eq!((a.get(), b.get()), (1, 1));
        assert!(root.is_closed());
    }

    #[test]
    fn set_closer_keeps_first_error_primary() {
        let root = SetCloser::root();
        let member = root.member();
        let a = Rc::new(Cell::new(0));
        let b = Rc::new(Cell::new(0));
        root.local.push(counting(&a, true));
        member.local.push(counting(&b, true));

        let err = member.close().unwrap_err();
        assert_eq!(err.suppressed().len(), 1);
        assert_eq!((a.get(), b.get()), (1, 1));
    }

    #[test]
    fn latch_keeps_first_error() {
        let latch = ErrorLatch::default();
        latch.set(Error::mapping("first"));
        latch.set(Error::mapping("second"));
        assert!(latch.is_set());
        assert!(matches!(latch.take(), Some(Error::Mapping(m)) if m == "first"));
        assert!(latch.take().is_none());
    }

    #[test]
    fn push_records_actions_in_order() {
        let mut core = Core::root(None);
        assert_eq!(core.push(Action::Peek), Some(0));
        assert_eq!(core.push(Action::Limit(2)), Some(1));
        assert_eq!(core.pipeline.borrow().len(), 2);
    }

    #[test]
    fn link_transfers_deferred_errors() {
        let mut core = Core::root(None);
        core.begin().unwrap();
        assert!(core.push(Action::Peek).is_none());
        let mut next = core.link();
        assert!(next.begin().unwrap_err().is_consumed());
    }
}
