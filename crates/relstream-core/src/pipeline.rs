//! Recorded stream actions.
//!
//! Every intermediate operation appended to a stream builder is recorded as
//! an [`Action`] descriptor in the shared [`Pipeline`]. The descriptors are
//! what the terminator inspects when deciding how much of the pipeline can
//! be rendered as SQL; the behaviour itself lives in closures held by the
//! builders and is only invoked for the part that falls back to memory.

use relstream_types::{Error, OrderSpec, PredicateSpec, Result};

/// Element type a stream carries after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Reference,
    Int,
    Long,
    Double,
}

/// A filter step.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Structural predicate on a field of the source entity.
    Field(PredicateSpec),
    /// Arbitrary closure; never rendered.
    Opaque,
}

/// A sort step.
#[derive(Debug, Clone, PartialEq)]
pub enum Sort {
    /// Natural ordering of the element type.
    Natural,
    /// Structural comparator over source entity fields, most significant key first.
    Fields(Vec<OrderSpec>),
    /// Arbitrary comparator; never rendered.
    Opaque,
}

/// Descriptor of one intermediate operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Filter(Filter),
    Map { to: ElementKind },
    FlatMap { to: ElementKind },
    Peek,
    Distinct,
    Sorted(Sort),
    Skip(u64),
    Limit(u64),
    BoxTo(ElementKind),
}

impl Action {
    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Filter(_) => "filter",
            Self::Map { .. } => "map",
            Self::FlatMap { .. } => "flat_map",
            Self::Peek => "peek",
            Self::Distinct => "distinct",
            Self::Sorted(_) => "sorted",
            Self::Skip(_) => "skip",
            Self::Limit(_) => "limit",
            Self::BoxTo(_) => "boxed",
        }
    }
}

/// The ordered action list shared by every builder of one stream chain,
/// plus the execution hints set on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    actions: Vec<Action>,
    parallel: bool,
    ordered: bool,
    frozen: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            parallel: false,
            ordered: true,
            frozen: false,
        }
    }

    /// Append an action and return its index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamConsumed`] once the pipeline has been handed to
    /// a terminal operation.
    pub fn push(&mut self, action: Action) -> Result<usize> {
        if self.frozen {
            return Err(Error::StreamConsumed);
        }
        self.actions.push(action);
        Ok(self.actions.len() - 1)
    }

    /// Stop accepting actions. Called when a terminal operation starts.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    #[must_use]
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn set_ordered(&mut self, ordered: bool) {
        self.ordered = ordered;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relstream_types::{Direction, PredicateOp, Value};

    #[test]
    fn push_returns_indices_in_order() {
        let mut pipeline = Pipeline::new();
        assert_eq!(pipeline.push(Action::Skip(2)).unwrap(), 0);
        assert_eq!(pipeline.push(Action::Limit(5)).unwrap(), 1);
        assert_eq!(pipeline.actions(), &[Action::Skip(2), Action::Limit(5)]);
    }

    #[test]
    fn frozen_pipeline_rejects_actions() {
        let mut pipeline = Pipeline::new();
        pipeline.push(Action::Peek).unwrap();
        pipeline.freeze();
        let err = pipeline.push(Action::Distinct).unwrap_err();
        assert!(err.is_consumed());
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn defaults_are_sequential_and_ordered() {
        let mut pipeline = Pipeline::default();
        assert!(!pipeline.is_parallel());
        assert!(pipeline.is_ordered());
        pipeline.set_parallel(true);
        pipeline.set_ordered(false);
        assert!(pipeline.is_parallel());
        assert!(!pipeline.is_ordered());
    }

    #[test]
    fn descriptors_keep_structure() {
        let filter = Action::Filter(Filter::Field(PredicateSpec::new(
            "rating",
            PredicateOp::Equal,
            vec![Value::from("G")],
        )));
        let sort = Action::Sorted(Sort::Fields(vec![OrderSpec::new("title", Direction::Asc)]));
        assert_eq!(filter.name(), "filter");
        assert_eq!(sort.name(), "sorted");
        assert_ne!(Action::Sorted(Sort::Natural), Action::Sorted(Sort::Opaque));
    }
}
