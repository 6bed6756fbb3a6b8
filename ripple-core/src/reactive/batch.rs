//! Scoping primitives: batching writes and reading without tracking.

use super::context::ReactiveContext;
use super::runtime::BatchScope;

/// Run `f` with effect runs deferred until it returns.
///
/// Batches nest; only the outermost one flushes. An effect reached several
/// times inside a batch runs once, after every write has been applied. The
/// value returned by `f` is passed through.
///
/// # Example
///
/// ```rust
/// use ripple_core::{batch, Effect, Signal};
///
/// let x = Signal::new(0);
/// let effect = Effect::new({
///     let x = x.clone();
///     move || {
///         x.get();
///     }
/// });
///
/// batch(|| {
///     x.set(1);
///     x.set(2);
/// });
/// assert_eq!(effect.run_count(), 2);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _scope = BatchScope::enter();
    f()
}

/// Run `f` without recording any read as a dependency of the enclosing
/// computed value or effect.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _untracked = ReactiveContext::untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Runtime, Signal};

    #[test]
    fn batch_returns_value() {
        assert_eq!(batch(|| 7), 7);
        assert!(!Runtime::is_batching());
    }

    #[test]
    fn nested_batches_flush_at_outermost_exit() {
        let x = Signal::new(0);
        let effect = Effect::new({
            let x = x.clone();
            move || {
                x.get();
            }
        });

        batch(|| {
            x.set(1);
            batch(|| x.set(2));
            assert!(Runtime::is_batching());
            assert_eq!(effect.run_count(), 1);
        });

        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn reads_inside_batch_see_latest_values() {
        let x = Signal::new(1);
        batch(|| {
            x.set(5);
            assert_eq!(x.get(), 5);
        });
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let tracked = Signal::new(0);
        let hidden = Signal::new(0);
        let effect = Effect::new({
            let (tracked, hidden) = (tracked.clone(), hidden.clone());
            move || {
                tracked.get();
                untracked(|| hidden.get());
            }
        });

        hidden.set(1);
        assert_eq!(effect.run_count(), 1);
        assert_eq!(effect.dependency_count(), 1);

        tracked.set(1);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn panicking_batch_keeps_writes_queued() {
        let x = Signal::new(0);
        let effect = Effect::new({
            let x = x.clone();
            move || {
                x.get();
            }
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            batch(|| {
                x.set(1);
                panic!("batch body failed");
            })
        }));
        assert!(result.is_err());
        assert!(!Runtime::is_batching());
        assert_eq!(effect.run_count(), 1);

        // The next write outside a batch flushes everything
        x.set(2);
        assert_eq!(effect.run_count(), 2);
    }
}
