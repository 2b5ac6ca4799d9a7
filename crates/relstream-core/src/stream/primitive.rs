//! Primitive-element streams.
//!
//! [`IntStream`], [`LongStream`] and [`DoubleStream`] wrap a [`Stream`] of
//! their primitive and add numeric terminal operations. They share the
//! builder state machine and closing behaviour of the wrapped stream.

use relstream_types::Result;

use super::{Flow, Stream, StreamIter};
use crate::pipeline::{Action, ElementKind, Sort};
use crate::resource::Close;

/// Numeric element that can be summarised.
pub trait Summable: Copy + PartialOrd + 'static {
    type Sum: Copy + Default + PartialEq + std::fmt::Debug;

    fn accumulate(sum: Self::Sum, value: Self) -> Self::Sum;

    fn mean(sum: Self::Sum, count: u64) -> f64;
}

impl Summable for i32 {
    type Sum = i64;

    fn accumulate(sum: i64, value: i32) -> i64 {
        sum.wrapping_add(i64::from(value))
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(sum: i64, count: u64) -> f64 {
        sum as f64 / count as f64
    }
}

impl Summable for i64 {
    type Sum = i64;

    fn accumulate(sum: i64, value: i64) -> i64 {
        sum.wrapping_add(value)
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(sum: i64, count: u64) -> f64 {
        sum as f64 / count as f64
    }
}

impl Summable for f64 {
    type Sum = f64;

    fn accumulate(sum: f64, value: f64) -> f64 {
        sum + value
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(sum: f64, count: u64) -> f64 {
        sum / count as f64
    }
}

/// Count, sum, minimum and maximum of a numeric stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryStatistics<N: Summable> {
    count: u64,
    sum: N::Sum,
    min: Option<N>,
    max: Option<N>,
}

pub type IntSummaryStatistics = SummaryStatistics<i32>;
pub type LongSummaryStatistics = SummaryStatistics<i64>;
pub type DoubleSummaryStatistics = SummaryStatistics<f64>;

impl<N: Summable> Default for SummaryStatistics<N> {
    fn default() -> Self {
        Self {
            count: 0,
            sum: N::Sum::default(),
            min: None,
            max: None,
        }
    }
}

impl<N: Summable> SummaryStatistics<N> {
    pub fn accept(&mut self, value: N) {
        self.count += 1;
        self.sum = N::accumulate(self.sum, value);
        if self.min.map_or(true, |min| value < min) {
            self.min = Some(value);
        }
        if self.max.map_or(true, |max| value > max) {
            self.max = Some(value);
        }
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn sum(&self) -> N::Sum {
        self.sum
    }

    #[must_use]
    pub fn min(&self) -> Option<N> {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> Option<N> {
        self.max
    }

    /// Arithmetic mean, `None` for an empty stream.
    #[must_use]
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| N::mean(self.sum, self.count))
    }
}

macro_rules! primitive_stream {
    ($(#[$doc:meta])* $name:ident, $prim:ty, $kind:expr) => {
        $(#[$doc])*
        pub struct $name {
            inner: Stream<$prim>,
        }

        impl $name {
            pub(crate) fn from_inner(inner: Stream<$prim>) -> Self {
                Self { inner }
            }

            /// In-memory stream over `values`.
            pub fn of<I>(values: I) -> Self
            where
                I: IntoIterator<Item = $prim>,
                I::IntoIter: 'static,
            {
                Self::from_inner(Stream::of(values))
            }

            #[must_use]
            pub fn filter<P>(self, predicate: P) -> Self
            where
                P: FnMut(&$prim) -> bool + 'static,
            {
                Self::from_inner(self.inner.filter(predicate))
            }

            #[must_use]
            pub fn map<F>(self, mapper: F) -> Self
            where
                F: FnMut($prim) -> $prim + 'static,
            {
                Self::from_inner(
                    self.inner
                        .append(Action::Map { to: $kind }, move |flow| Box::new(flow.map(mapper))),
                )
            }

            #[must_use]
            pub fn map_to_obj<U, F>(self, mapper: F) -> Stream<U>
            where
                U: 'static,
                F: FnMut($prim) -> U + 'static,
            {
                self.inner.map(mapper)
            }

            #[must_use]
            pub fn flat_map<I, F>(self, mapper: F) -> Self
            where
                I: IntoIterator<Item = $prim> + 'static,
                I::IntoIter: 'static,
                F: FnMut($prim) -> I + 'static,
            {
                Self::from_inner(self.inner.append(Action::FlatMap { to: $kind }, move |flow| {
                    Box::new(flow.flat_map(mapper))
                }))
            }

            #[must_use]
            pub fn peek<F>(self, observer: F) -> Self
            where
                F: FnMut(&$prim) + 'static,
            {
                Self::from_inner(self.inner.peek(observer))
            }

            #[must_use]
            pub fn skip(self, n: u64) -> Self {
                Self::from_inner(self.inner.skip(n))
            }

            #[must_use]
            pub fn limit(self, n: u64) -> Self {
                Self::from_inner(self.inner.limit(n))
            }

            /// Box the elements into a reference stream.
            #[must_use]
            pub fn boxed(self) -> Stream<$prim> {
                self.inner
                    .link(Action::BoxTo(ElementKind::Reference), |flow| flow)
            }

            #[must_use]
            pub fn parallel(self) -> Self {
                Self::from_inner(self.inner.parallel())
            }

            #[must_use]
            pub fn sequential(self) -> Self {
                Self::from_inner(self.inner.sequential())
            }

            #[must_use]
            pub fn unordered(self) -> Self {
                Self::from_inner(self.inner.unordered())
            }

            #[must_use]
            pub fn is_parallel(&self) -> bool {
                self.inner.is_parallel()
            }

            #[must_use]
            pub fn on_close<F>(self, handler: F) -> Self
            where
                F: FnOnce() -> Result<()> + 'static,
            {
                Self::from_inner(self.inner.on_close(handler))
            }

            /// # Errors
            ///
            /// Returns [`Error::StreamConsumed`](relstream_types::Error::StreamConsumed)
            /// for a builder already linked or consumed, or the first fetch,
            /// mapping or close failure.
            pub fn for_each<F>(&mut self, action: F) -> Result<()>
            where
                F: FnMut($prim),
            {
                self.inner.for_each(action)
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn to_vec(&mut self) -> Result<Vec<$prim>> {
                self.inner.to_vec()
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn count(&mut self) -> Result<u64> {
                self.inner.count()
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn reduce<F>(&mut self, accumulator: F) -> Result<Option<$prim>>
            where
                F: FnMut($prim, $prim) -> $prim,
            {
                self.inner.reduce(accumulator)
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn fold<F>(&mut self, identity: $prim, accumulator: F) -> Result<$prim>
            where
                F: FnMut($prim, $prim) -> $prim,
            {
                self.inner.fold(identity, accumulator)
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn sum(&mut self) -> Result<<$prim as Summable>::Sum> {
                self.inner
                    .fold(<$prim as Summable>::Sum::default(), <$prim as Summable>::accumulate)
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn summary_statistics(&mut self) -> Result<SummaryStatistics<$prim>> {
                self.inner.fold(SummaryStatistics::default(), |mut stats, value| {
                    stats.accept(value);
                    stats
                })
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn average(&mut self) -> Result<Option<f64>> {
                Ok(self.summary_statistics()?.average())
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn any_match<P>(&mut self, predicate: P) -> Result<bool>
            where
                P: FnMut($prim) -> bool,
            {
                self.inner.any_match(predicate)
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn all_match<P>(&mut self, predicate: P) -> Result<bool>
            where
                P: FnMut($prim) -> bool,
            {
                self.inner.all_match(predicate)
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn none_match<P>(&mut self, predicate: P) -> Result<bool>
            where
                P: FnMut($prim) -> bool,
            {
                self.inner.none_match(predicate)
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn find_first(&mut self) -> Result<Option<$prim>> {
                self.inner.find_first()
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn find_any(&mut self) -> Result<Option<$prim>> {
                self.inner.find_any()
            }

            /// # Errors
            ///
            /// See [`Stream::iter`].
            pub fn iter(&mut self) -> Result<StreamIter<$prim>> {
                self.inner.iter()
            }
        }

        impl Close for $name {
            fn close(&mut self) -> Result<()> {
                self.inner.close()
            }
        }
    };
}

primitive_stream!(
    /// Stream of `i32` elements.
    IntStream,
    i32,
    ElementKind::Int
);

primitive_stream!(
    /// Stream of `i64` elements.
    LongStream,
    i64,
    ElementKind::Long
);

primitive_stream!(
    /// Stream of `f64` elements.
    DoubleStream,
    f64,
    ElementKind::Double
);

macro_rules! integral_ops {
    ($name:ident, $prim:ty) => {
        impl $name {
            /// Half-open range `start..end`.
            #[must_use]
            pub fn range(start: $prim, end: $prim) -> Self {
                Self::of(start..end)
            }

            #[must_use]
            pub fn distinct(self) -> Self {
                Self::from_inner(self.inner.distinct())
            }

            #[must_use]
            pub fn sorted(self) -> Self {
                Self::from_inner(self.inner.sorted())
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn min(&mut self) -> Result<Option<$prim>> {
                self.inner.min()
            }

            /// # Errors
            ///
            /// See [`for_each`](Self::for_each).
            pub fn max(&mut self) -> Result<Option<$prim>> {
                self.inner.max()
            }

            #[must_use]
            #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
            pub fn as_double_stream(self) -> DoubleStream {
                DoubleStream::from_inner(self.inner.link(
                    Action::Map {
                        to: ElementKind::Double,
                    },
                    |flow| Box::new(flow.map(|v| v as f64)),
                ))
            }

            #[must_use]
            pub fn map_to_double<F>(self, mapper: F) -> DoubleStream
            where
                F: FnMut($prim) -> f64 + 'static,
            {
                DoubleStream::from_inner(self.inner.link(
                    Action::Map {
                        to: ElementKind::Double,
                    },
                    move |flow| Box::new(flow.map(mapper)),
                ))
            }
        }
    };
}

integral_ops!(IntStream, i32);
integral_ops!(LongStream, i64);

impl IntStream {
    #[must_use]
    pub fn as_long_stream(self) -> LongStream {
        LongStream::from_inner(
            self.inner
                .link(Action::Map { to: ElementKind::Long }, |flow| {
                    Box::new(flow.map(i64::from))
                }),
        )
    }

    #[must_use]
    pub fn map_to_long<F>(self, mapper: F) -> LongStream
    where
        F: FnMut(i32) -> i64 + 'static,
    {
        LongStream::from_inner(
            self.inner
                .link(Action::Map { to: ElementKind::Long }, move |flow| {
                    Box::new(flow.map(mapper))
                }),
        )
    }
}

impl LongStream {
    #[must_use]
    pub fn map_to_int<F>(self, mapper: F) -> IntStream
    where
        F: FnMut(i64) -> i32 + 'static,
    {
        IntStream::from_inner(
            self.inner
                .link(Action::Map { to: ElementKind::Int }, move |flow| {
                    Box::new(flow.map(mapper))
                }),
        )
    }
}

impl DoubleStream {
    /// Drop repeated values, comparing bit patterns.
    #[must_use]
    pub fn distinct(self) -> Self {
        Self::from_inner(self.inner.append(Action::Distinct, |flow| {
            let mut seen = std::collections::HashSet::new();
            Box::new(flow.filter(move |v: &f64| seen.insert(v.to_bits())))
        }))
    }

    /// Sort ascending by IEEE total order.
    #[must_use]
    pub fn sorted(self) -> Self {
        Self::from_inner(self.inner.append(Action::Sorted(Sort::Natural), |flow| {
            let mut values: Vec<f64> = flow.collect();
            values.sort_by(f64::total_cmp);
            Box::new(values.into_iter()) as Flow<f64>
        }))
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn min(&mut self) -> Result<Option<f64>> {
        self.inner.reduce(f64::min)
    }

    /// # Errors
    ///
    /// See [`for_each`](Self::for_each).
    pub fn max(&mut self) -> Result<Option<f64>> {
        self.inner.reduce(f64::max)
    }

    #[must_use]
    pub fn map_to_int<F>(self, mapper: F) -> IntStream
    where
        F: FnMut(f64) -> i32 + 'static,
    {
        IntStream::from_inner(
            self.inner
                .link(Action::Map { to: ElementKind::Int }, move |flow| {
                    Box::new(flow.map(mapper))
                }),
        )
    }

    #[must_use]
    pub fn map_to_long<F>(self, mapper: F) -> LongStream
    where
        F: FnMut(f64) -> i64 + 'static,
    {
        LongStream::from_inner(
            self.inner
                .link(Action::Map { to: ElementKind::Long }, move |flow| {
                    Box::new(flow.map(mapper))
                }),
        )
    }
}
