//! Typed entity fields.
//!
//! A [`Field`] pairs a column name with an accessor on the entity type. The
//! predicates and comparators it builds stay structural, so the stream
//! terminator can render them as SQL, while still being evaluable in memory
//! through the accessor once a pipeline has fallen back.

use std::cmp::Ordering;
use std::fmt;

use crate::entity::Entity;
use crate::predicate::{Direction, Inclusion, OrderSpec, PredicateOp, PredicateSpec};
use crate::table::ColumnRef;
use crate::value::Value;

/// Column accessor on entity type `E`.
pub struct Field<E> {
    column: &'static str,
    getter: fn(&E) -> Value,
}

impl<E> Clone for Field<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Field<E> {}

impl<E> fmt::Debug for Field<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.column).finish()
    }
}

impl<E> Field<E> {
    pub const fn new(column: &'static str, getter: fn(&E) -> Value) -> Self {
        Self { column, getter }
    }

    #[must_use]
    pub fn column(&self) -> &'static str {
        self.column
    }

    /// Read this field from an entity.
    pub fn get(&self, entity: &E) -> Value {
        (self.getter)(entity)
    }

    fn predicate(self, op: PredicateOp, operands: Vec<Value>) -> FieldPredicate<E> {
        FieldPredicate {
            field: self,
            spec: PredicateSpec::new(self.column, op, operands),
        }
    }

    #[must_use]
    pub fn equal(self, value: impl Into<Value>) -> FieldPredicate<E> {
        self.predicate(PredicateOp::Equal, vec![value.into()])
    }

    #[must_use]
    pub fn not_equal(self, value: impl Into<Value>) -> FieldPredicate<E> {
        self.predicate(PredicateOp::NotEqual, vec![value.into()])
    }

    #[must_use]
    pub fn less_than(self, value: impl Into<Value>) -> FieldPredicate<E> {
        self.predicate(PredicateOp::LessThan, vec![value.into()])
    }

    #[must_use]
    pub fn less_or_equal(self, value: impl Into<Value>) -> FieldPredicate<E> {
        self.predicate(PredicateOp::LessOrEqual, vec![value.into()])
    }

    #[must_use]
    pub fn greater_than(self, value: impl Into<Value>) -> FieldPredicate<E> {
        self.predicate(PredicateOp::GreaterThan, vec![value.into()])
    }

    #[must_use]
    pub fn greater_or_equal(self, value: impl Into<Value>) -> FieldPredicate<E> {
        self.predicate(PredicateOp::GreaterOrEqual, vec![value.into()])
    }

    /// Half-open range `[start, end)`.
    #[must_use]
    pub fn between(self, start: impl Into<Value>, end: impl Into<Value>) -> FieldPredicate<E> {
        self.between_with(start, end, Inclusion::default())
    }

    #[must_use]
    pub fn between_with(
        self,
        start: impl Into<Value>,
        end: impl Into<Value>,
        inclusion: Inclusion,
    ) -> FieldPredicate<E> {
        let mut p = self.predicate(PredicateOp::Between, vec![start.into(), end.into()]);
        p.spec.inclusion = inclusion;
        p
    }

    #[must_use]
    pub fn not_between(
        self,
        start: impl Into<Value>,
        end: impl Into<Value>,
        inclusion: Inclusion,
    ) -> FieldPredicate<E> {
        let mut p = self.predicate(PredicateOp::NotBetween, vec![start.into(), end.into()]);
        p.spec.inclusion = inclusion;
        p
    }

    #[must_use]
    pub fn in_<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> FieldPredicate<E> {
        self.predicate(PredicateOp::In, values.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn not_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> FieldPredicate<E> {
        self.predicate(PredicateOp::NotIn, values.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn is_null(self) -> FieldPredicate<E> {
        self.predicate(PredicateOp::IsNull, Vec::new())
    }

    #[must_use]
    pub fn is_not_null(self) -> FieldPredicate<E> {
        self.predicate(PredicateOp::IsNotNull, Vec::new())
    }

    #[must_use]
    pub fn starts_with(self, prefix: &str) -> FieldPredicate<E> {
        self.predicate(PredicateOp::StartsWith, vec![prefix.into()])
    }

    #[must_use]
    pub fn ends_with(self, suffix: &str) -> FieldPredicate<E> {
        self.predicate(PredicateOp::EndsWith, vec![suffix.into()])
    }

    #[must_use]
    pub fn contains(self, needle: &str) -> FieldPredicate<E> {
        self.predicate(PredicateOp::Contains, vec![needle.into()])
    }

    #[must_use]
    pub fn asc(self) -> FieldComparator<E> {
        FieldComparator {
            keys: vec![(self, Direction::Asc)],
        }
    }

    #[must_use]
    pub fn desc(self) -> FieldComparator<E> {
        FieldComparator {
            keys: vec![(self, Direction::Desc)],
        }
    }
}

impl<E: Entity> Field<E> {
    /// This field qualified by its entity's table.
    #[must_use]
    pub fn column_ref(&self) -> ColumnRef {
        ColumnRef::new(E::table().id.clone(), self.column)
    }
}

/// Structural predicate on one field of `E`.
pub struct FieldPredicate<E> {
    field: Field<E>,
    spec: PredicateSpec,
}

impl<E> Clone for FieldPredicate<E> {
    fn clone(&self) -> Self {
        Self {
            field: self.field,
            spec: self.spec.clone(),
        }
    }
}

impl<E> fmt::Debug for FieldPredicate<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldPredicate").field(&self.spec).finish()
    }
}

impl<E> FieldPredicate<E> {
    #[must_use]
    pub fn spec(&self) -> &PredicateSpec {
        &self.spec
    }

    #[must_use]
    pub fn field(&self) -> Field<E> {
        self.field
    }

    /// Evaluate in memory through the field accessor.
    pub fn test(&self, entity: &E) -> bool {
        self.spec.test(&self.field.get(entity))
    }
}

/// Structural comparator over one or more fields of `E`.
pub struct FieldComparator<E> {
    keys: Vec<(Field<E>, Direction)>,
}

impl<E> Clone for FieldComparator<E> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
        }
    }
}

impl<E> fmt::Debug for FieldComparator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.specs()).finish()
    }
}

impl<E> FieldComparator<E> {
    /// Break ties with `next`.
    #[must_use]
    pub fn then(mut self, next: FieldComparator<E>) -> Self {
        self.keys.extend(next.keys);
        self
    }

    #[must_use]
    pub fn reversed(mut self) -> Self {
        for (_, direction) in &mut self.keys {
            *direction = direction.reversed();
        }
        self
    }

    /// Renderable sort keys, most significant first.
    #[must_use]
    pub fn specs(&self) -> Vec<OrderSpec> {
        self.keys
            .iter()
            .map(|(field, direction)| OrderSpec::new(field.column(), *direction))
            .collect()
    }

    pub fn compare(&self, a: &E, b: &E) -> Ordering {
        self.keys
            .iter()
            .map(|(field, direction)| {
                let ord = field.get(a).order_cmp(&field.get(b));
                match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Film {
        title: String,
        length: Option<i64>,
    }

    const TITLE: Field<Film> = Field::new("title", |f| Value::from(f.title.as_str()));
    const LENGTH: Field<Film> = Field::new("length", |f| Value::from(f.length));

    fn film(title: &str, length: Option<i64>) -> Film {
        Film {
            title: title.to_string(),
            length,
        }
    }

    #[test]
    fn predicate_spec_carries_column_and_operands() {
        let p = LENGTH.between(60, 120);
        assert_eq!(p.spec().column, "length");
        assert_eq!(p.spec().op, PredicateOp::Between);
        assert_eq!(p.spec().operands, vec![Value::from(60), Value::from(120)]);
    }

    #[test]
    fn predicate_tests_through_accessor() {
        let p = TITLE.in_(["ALIEN", "BIRDS"]);
        assert!(p.test(&film("ALIEN", None)));
        assert!(!p.test(&film("CLUE", None)));
        assert!(!LENGTH.greater_than(10).test(&film("X", None)));
    }

    #[test]
    fn comparator_chains_and_reverses() {
        let cmp = LENGTH.desc().then(TITLE.asc());
        let mut films = vec![
            film("B", Some(90)),
            film("A", Some(90)),
            film("C", Some(120)),
            film("D", None),
        ];
        films.sort_by(|a, b| cmp.compare(a, b));
        let titles: Vec<&str> = films.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "A", "B", "D"]);

        let specs = cmp.reversed().specs();
        assert_eq!(specs[0], OrderSpec::new("length", Direction::Asc));
        assert_eq!(specs[1], OrderSpec::new("title", Direction::Desc));
    }
}
