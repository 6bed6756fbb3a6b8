//! Equality predicates deciding whether a write is a real change.

use std::rc::Rc;

/// Predicate comparing the current value with a candidate one.
///
/// Returning `true` means "equal": the write is dropped without bumping the
/// node's version or notifying anything downstream.
pub type EqualFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// `PartialEq`-based equality, the default for every node.
pub fn default_equal<T: PartialEq + 'static>() -> EqualFn<T> {
    Rc::new(|a: &T, b: &T| a == b)
}

/// Treat every write as a change.
pub fn never_equal<T: 'static>() -> EqualFn<T> {
    Rc::new(|_: &T, _: &T| false)
}
