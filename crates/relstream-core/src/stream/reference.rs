use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;

use relstream_types::{Error, FieldComparator, FieldPredicate, Result};

use super::{saturating_usize, Core, Explain, Flow, Replay, State};
use crate::executor::SqlQuery;
use crate::pipeline::{Action, ElementKind, Filter, Sort};
use crate::resource::{finish, Close};
use crate::stream::iter::StreamIter;
use crate::stream::primitive::{DoubleStream, IntStream, LongStream};

/// Lazy stream of `T` elements.
///
/// Intermediate operations consume the builder and return the next one.
/// Terminal operations take `&mut self`, run the pipeline and close the
/// stream set; a second terminal call returns [`Error::StreamConsumed`].
/// Dropping a builder that was not linked downstream closes it.
pub struct Stream<T> {
    core: Core,
    replay: Option<Replay<T>>,
}

impl<T: 'static> Stream<T> {
    pub(crate) fn from_source(explain: Option<Explain>, replay: Replay<T>) -> Self {
        Self {
            core: Core::root(explain),
            replay: Some(replay),
        }
    }

    /// In-memory stream over `items`. Nothing is ever rendered as SQL.
    pub fn of<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        let items = items.into_iter();
        Self::from_source(
            None,
            Box::new(move |_, _| Ok((Box::new(items) as Flow<T>, 0))),
        )
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::of(std::iter::empty())
    }

    // ---------------------------------------------------------------------
    // Chaining
    // ---------------------------------------------------------------------

    pub(crate) fn append<F>(mut self, action: Action, apply: F) -> Self
    where
        F: FnOnce(Flow<T>) -> Flow<T> + 'static,
    {
        let Some(index) = self.core.push(action) else {
            return self;
        };
        if let Some(previous) = self.replay.take() {
            self.replay = Some(Box::new(move |pipeline, ctx| {
                let (flow, rendered) = previous(pipeline, ctx)?;
                let flow = if index < rendered { flow } else { apply(flow) };
                Ok((flow, rendered))
            }));
        }
        self
    }

    /// Record a type-changing action and hand the chain to a new builder.
    pub(crate) fn link<U, F>(mut self, action: Action, apply: F) -> Stream<U>
    where
        U: 'static,
        F: FnOnce(Flow<T>) -> Flow<U> + 'static,
    {
        let index = self.core.push(action);
        let core = self.core.link();
        let replay: Option<Replay<U>> = match (index, self.replay.take()) {
            (Some(_), Some(previous)) => Some(Box::new(move |pipeline, ctx| {
                let (flow, rendered) = previous(pipeline, ctx)?;
                Ok((apply(flow), rendered))
            })),
            _ => None,
        };
        Stream { core, replay }
    }

    // ---------------------------------------------------------------------
    // Intermediate operations
    // ---------------------------------------------------------------------

    /// Keep elements matching an arbitrary predicate. Always runs in memory.
    #[must_use]
    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: FnMut(&T) -> bool + 'static,
    {
        self.append(Action::Filter(Filter::Opaque), move |flow| {
            Box::new(flow.filter(predicate))
        })
    }

    /// Keep elements matching a field predicate. Rendered as a WHERE
    /// condition while it is part of the pushdown prefix.
    #[must_use]
    pub fn filter_by(self, predicate: FieldPredicate<T>) -> Self {
        let action = Action::Filter(Filter::Field(predicate.spec().clone()));
        self.append(action, move |flow| {
            Box::new(flow.filter(move |item| predicate.test(item)))
        })
    }

    #[must_use]
    pub fn map<U, F>(self, mapper: F) -> Stream<U>
    where
        U: 'static,
        F: FnMut(T) -> U + 'static,
    {
        self.link(
            Action::Map {
                to: ElementKind::Reference,
            },
            move |flow| Box::new(flow.map(mapper)),
        )
    }

    #[must_use]
    pub fn flat_map<U, I, F>(self, mapper: F) -> Stream<U>
    where
        U: 'static,
        I: IntoIterator<Item = U> + 'static,
        I::IntoIter: 'static,
        F: FnMut(T) -> I + 'static,
    {
        self.link(
            Action::FlatMap {
                to: ElementKind::Reference,
            },
            move |flow| Box::new(flow.flat_map(mapper)),
        )
    }

    #[must_use]
    pub fn map_to_int<F>(self, mapper: F) -> IntStream
    where
        F: FnMut(T) -> i32 + 'static,
    {
        IntStream::from_inner(self.link(Action::Map { to: ElementKind::Int }, move |flow| {
            Box::new(flow.map(mapper))
        }))
    }

    #[must_use]
    pub fn map_to_long<F>(self, mapper: F) -> LongStream
    where
        F: FnMut(T) -> i64 + 'static,
    {
        LongStream::from_inner(self.link(Action::Map { to: ElementKind::Long }, move |flow| {
            Box::new(flow.map(mapper))
        }))
    }

    #[must_use]
    pub fn map_to_double<F>(self, mapper: F) -> DoubleStream
    where
        F: FnMut(T) -> f64 + 'static,
    {
        DoubleStream::from_inner(self.link(
            Action::Map {
                to: ElementKind::Double,
            },
            move |flow| Box::new(flow.map(mapper)),
        ))
    }

    /// Observe each element as it flows past.
    #[must_use]
    pub fn peek<F>(self, observer: F) -> Self
    where
        F: FnMut(&T) + 'static,
    {
        self.append(Action::Peek, move |flow| Box::new(flow.inspect(observer)))
    }

    /// Drop repeated elements, keeping the first occurrence.
    #[must_use]
    pub fn distinct(self) -> Self
    where
        T: Eq + Hash + Clone,
    {
        self.append(Action::Distinct, |flow| {
            let mut seen = HashSet::new();
            Box::new(flow.filter(move |item| seen.insert(item.clone())))
        })
    }

    /// Sort by natural order. Always runs in memory.
    #[must_use]
    pub fn sorted(self) -> Self
    where
        T: Ord,
    {
        self.append(Action::Sorted(Sort::Natural), |flow| {
            let mut items: Vec<T> = flow.collect();
            items.sort();
            Box::new(items.into_iter())
        })
    }

    /// Sort with an arbitrary comparator. Always runs in memory.
    #[must_use]
    pub fn sorted_by<C>(self, mut comparator: C) -> Self
    where
        C: FnMut(&T, &T) -> Ordering + 'static,
    {
        self.append(Action::Sorted(Sort::Opaque), move |flow| {
            let mut items: Vec<T> = flow.collect();
            items.sort_by(&mut comparator);
            Box::new(items.into_iter())
        })
    }

    /// Sort by entity fields. Rendered as ORDER BY while it is part of the
    /// pushdown prefix.
    #[must_use]
    pub fn sorted_by_field(self, comparator: FieldComparator<T>) -> Self {
        self.append(Action::Sorted(Sort::Fields(comparator.specs())), move |flow| {
            let mut items: Vec<T> = flow.collect();
            items.sort_by(|a, b| comparator.compare(a, b));
            Box::new(items.into_iter())
        })
    }

    #[must_use]
    pub fn skip(self, n: u64) -> Self {
        self.append(Action::Skip(n), move |flow| {
            Box::new(flow.skip(saturating_usize(n)))
        })
    }

    #[must_use]
    pub fn limit(self, n: u64) -> Self {
        self.append(Action::Limit(n), move |flow| {
            Box::new(flow.take(saturating_usize(n)))
        })
    }

    /// Hint that the source may execute in parallel.
    #[must_use]
    pub fn parallel(self) -> Self {
        self.core.pipeline.borrow_mut().set_parallel(true);
        self
    }

    #[must_use]
    pub fn sequential(self) -> Self {
        self.core.pipeline.borrow_mut().set_parallel(false);
        self
    }

    #[must_use]
    pub fn unordered(self) -> Self {
        self.core.pipeline.borrow_mut().set_ordered(false);
        self
    }

    #[must_use]
    pub fn is_parallel(&self) -> bool {
        self.core.pipeline.borrow().is_parallel()
    }

    /// Run `handler` when the stream set is closed.
    #[must_use]
    pub fn on_close<F>(mut self, handler: F) -> Self
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        self.core.add_close_handler(Box::new(handler));
        self
    }

    // ---------------------------------------------------------------------
    // Terminal operations
    // ---------------------------------------------------------------------

    fn open(&mut self) -> Result<(Flow<T>, super::ErrorLatch)> {
        let replay = self.replay.take().ok_or(Error::StreamConsumed)?;
        let ctx = self.core.context();
        let pipeline = self.core.pipeline.borrow();
        let (flow, rendered) = replay(&pipeline, &ctx)?;
        tracing::trace!(actions = pipeline.len(), rendered, "stream replayed");
        Ok((flow, ctx.latch().clone()))
    }

    pub(crate) fn terminate<R, F>(&mut self, op: F) -> Result<R>
    where
        F: FnOnce(Flow<T>) -> R,
    {
        self.core.begin()?;
        let outcome = self.open().and_then(|(flow, latch)| {
            let out = op(flow);
            latch.take().map_or(Ok(out), Err)
        });
        let closed = self.core.close();
        finish(outcome, closed)
    }

    /// # Errors
    ///
    /// Returns [`Error::StreamConsumed`] when the builder was already linked
    /// or consumed, or the first fetch, mapping or close failure.
    pub fn for_each<F>(&mut self, action: F) -> Result<()>
    where
        F: FnMut(T),
    {
        self.terminate(|flow| flow.for_each(action))
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn to_vec(&mut self) -> Result<Vec<T>> {
        self.terminate(Iterator::collect)
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn collect<C>(&mut self) -> Result<C>
    where
        C: FromIterator<T>,
    {
        self.terminate(Iterator::collect)
    }

    /// Count the elements. The sequence is materialized; no `COUNT(*)`
    /// statement is issued.
    ///
    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn count(&mut self) -> Result<u64> {
        self.terminate(|flow| flow.fold(0_u64, |n, _| n + 1))
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn reduce<F>(&mut self, accumulator: F) -> Result<Option<T>>
    where
        F: FnMut(T, T) -> T,
    {
        self.terminate(|flow| flow.reduce(accumulator))
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn fold<A, F>(&mut self, identity: A, accumulator: F) -> Result<A>
    where
        F: FnMut(A, T) -> A,
    {
        self.terminate(|flow| flow.fold(identity, accumulator))
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn min_by<C>(&mut self, mut comparator: C) -> Result<Option<T>>
    where
        C: FnMut(&T, &T) -> Ordering,
    {
        self.terminate(|flow| flow.min_by(|a, b| comparator(a, b)))
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn max_by<C>(&mut self, mut comparator: C) -> Result<Option<T>>
    where
        C: FnMut(&T, &T) -> Ordering,
    {
        self.terminate(|flow| flow.max_by(|a, b| comparator(a, b)))
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn min(&mut self) -> Result<Option<T>>
    where
        T: Ord,
    {
        self.terminate(Iterator::min)
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn max(&mut self) -> Result<Option<T>>
    where
        T: Ord,
    {
        self.terminate(Iterator::max)
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn any_match<P>(&mut self, predicate: P) -> Result<bool>
    where
        P: FnMut(T) -> bool,
    {
        self.terminate(|mut flow| flow.any(predicate))
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn all_match<P>(&mut self, predicate: P) -> Result<bool>
    where
        P: FnMut(T) -> bool,
    {
        self.terminate(|mut flow| flow.all(predicate))
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn none_match<P>(&mut self, mut predicate: P) -> Result<bool>
    where
        P: FnMut(T) -> bool,
    {
        self.terminate(|mut flow| !flow.any(|item| predicate(item)))
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn find_first(&mut self) -> Result<Option<T>> {
        self.terminate(|mut flow| flow.next())
    }

    /// Any element; streams are evaluated sequentially, so this is the first.
    ///
    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn find_any(&mut self) -> Result<Option<T>> {
        self.find_first()
    }

    /// Hand the elements to a pull iterator. Unlike the other terminal
    /// operations this does not close the stream: the returned iterator
    /// does, when closed explicitly or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamConsumed`] for a builder already linked or
    /// consumed, or the failure raised while opening the source.
    pub fn iter(&mut self) -> Result<StreamIter<T>> {
        self.core.begin()?;
        match self.open() {
            Ok((flow, latch)) => {
                self.core.state = State::Linked;
                Ok(StreamIter::new(flow, latch, self.core.closer.clone()))
            }
            Err(err) => {
                let closed = self.core.close();
                finish(Err(err), closed)
            }
        }
    }

    /// The statement the source would run for the current pipeline, or
    /// `None` for in-memory sources.
    ///
    /// # Errors
    ///
    /// Returns the rendering failure for malformed predicates.
    pub fn explain(&self) -> Result<Option<SqlQuery>> {
        self.core.explain()
    }

    pub(crate) fn closer(&self) -> super::SetCloser {
        self.core.closer.clone()
    }
}

impl<T: 'static> FromIterator<T> for Stream<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::of(iter.into_iter().collect::<Vec<T>>())
    }
}

impl<T> Close for Stream<T> {
    /// Close this builder's handlers and every other member of its stream
    /// set. Idempotent.
    fn close(&mut self) -> Result<()> {
        self.core.close()
    }
}

impl<T> Drop for Stream<T> {
    fn drop(&mut self) {
        self.core.drop_close();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;

    fn close_counter(counter: &Rc<Cell<u32>>) -> impl FnOnce() -> Result<()> + 'static {
        let counter = Rc::clone(counter);
        move || {
            counter.set(counter.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn applies_actions_in_memory() {
        let result = Stream::of(1..=10)
            .filter(|n| n % 2 == 0)
            .map(|n| n * 10)
            .skip(1)
            .limit(2)
            .to_vec()
            .unwrap();
        assert_eq!(result, vec![40, 60]);
    }

    #[test]
    fn second_terminal_is_rejected() {
        let mut stream = Stream::of(vec![1, 2, 3]);
        assert_eq!(stream.count().unwrap(), 3);
        assert!(stream.count().unwrap_err().is_consumed());
        assert!(stream.to_vec().unwrap_err().is_consumed());
    }

    #[test]
    fn terminal_closes_handlers_once() {
        let counter = Rc::new(Cell::new(0));
        let mut stream = Stream::of(vec!["a", "b"]).on_close(close_counter(&counter));
        assert_eq!(stream.find_first().unwrap(), Some("a"));
        assert_eq!(counter.get(), 1);
        stream.close().unwrap();
        drop(stream);
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn close_fans_out_to_upstream_builders() {
        let upstream = Rc::new(Cell::new(0));
        let downstream = Rc::new(Cell::new(0));
        let mut stream = Stream::of(vec![1, 2])
            .on_close(close_counter(&upstream))
            .map(|n| n.to_string())
            .on_close(close_counter(&downstream));
        stream.close().unwrap();
        assert_eq!((upstream.get(), downstream.get()), (1, 1));
    }

    #[test]
    fn drop_closes_unconsumed_builder() {
        let counter = Rc::new(Cell::new(0));
        {
            let _stream = Stream::of(vec![1]).on_close(close_counter(&counter)).limit(1);
        }
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn sorted_and_distinct() {
        let values = Stream::of(vec![3, 1, 3, 2, 1]).distinct().sorted().to_vec().unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn peek_sees_only_pulled_elements() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let first = Stream::of(vec![5, 6, 7])
            .peek(move |n| sink.borrow_mut().push(*n))
            .find_first()
            .unwrap();
        assert_eq!(first, Some(5));
        assert_eq!(*seen.borrow(), vec![5]);
    }

    #[test]
    fn in_memory_source_explains_nothing() {
        let stream = Stream::of(vec![1]).limit(1);
        assert_eq!(stream.explain().unwrap(), None);
    }

    #[test]
    fn parallel_flag_round_trips() {
        let stream = Stream::of(vec![1]).parallel();
        assert!(stream.is_parallel());
        let stream = stream.sequential();
        assert!(!stream.is_parallel());
    }

    #[test]
    fn close_failure_is_reported_after_success() {
        let mut stream = Stream::of(vec![1, 2]).on_close(|| Err(Error::mapping("close failed")));
        let err = stream.count().unwrap_err();
        assert!(matches!(err, Error::Mapping(m) if m == "close failed"));
    }

    #[test]
    fn fold_reduce_and_matches() {
        assert_eq!(Stream::of(1..=4).fold(0, |a, n| a + n).unwrap(), 10);
        assert_eq!(Stream::of(1..=4).reduce(|a, b| a * b).unwrap(), Some(24));
        assert!(Stream::of(1..=4).any_match(|n| n == 3).unwrap());
        assert!(Stream::of(1..=4).all_match(|n| n > 0).unwrap());
        assert!(Stream::of(1..=4).none_match(|n| n > 4).unwrap());
        assert_eq!(Stream::of(vec!["bb", "a"]).min().unwrap(), Some("a"));
        assert_eq!(
            Stream::of(vec!["bb", "a"]).max_by(|a, b| a.len().cmp(&b.len())).unwrap(),
            Some("bb")
        );
    }

    #[test]
    fn flat_map_and_collect() {
        let words: HashSet<char> = Stream::of(vec!["ab", "bc"])
            .flat_map(|w| w.chars().collect::<Vec<_>>())
            .collect()
            .unwrap();
        assert_eq!(words.len(), 3);
    }
}
