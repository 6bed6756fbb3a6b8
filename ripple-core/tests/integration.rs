//! Integration Tests for Reactive System
//!
//! These tests verify that signals, computed values, and effects work
//! together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ripple_core::{
    batch, untracked, Computed, DirtyState, Effect, EqualFn, OnCleanup, ReactiveError, Runtime,
    RuntimeConfig, Signal,
};

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

/// Test that a sum is computed once per distinct input combination.
#[test]
fn computed_sum_is_memoized() {
    let x = Signal::new(10);
    let y = Signal::new(20);
    let calls = counter();

    let sum = Computed::new({
        let (x, y, calls) = (x.clone(), y.clone(), calls.clone());
        move || {
            calls.set(calls.get() + 1);
            x.get() + y.get()
        }
    });

    assert_eq!(sum.get(), 30);
    assert_eq!(sum.get(), 30);
    assert_eq!(calls.get(), 1);

    x.set(15);
    assert_eq!(sum.get(), 35);
    assert_eq!(calls.get(), 2);
}

/// Test that writes inside a batch run a subscribed effect once, with the
/// final value.
#[test]
fn batch_runs_effect_once_with_final_value() {
    let x = Signal::new(0);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let effect = Effect::new({
        let (x, seen) = (x.clone(), seen.clone());
        move || seen.borrow_mut().push(x.get())
    });

    batch(|| {
        x.set(1);
        x.set(2);
    });

    assert_eq!(*seen.borrow(), vec![0, 2]);
    assert_eq!(effect.run_count(), 2);
}

/// Test that an effect never observes half of a batch.
#[test]
fn batch_is_glitch_free() {
    let first = Signal::new(String::from("Ada"));
    let last = Signal::new(String::from("Lovelace"));
    let full = Computed::new({
        let (first, last) = (first.clone(), last.clone());
        move || format!("{} {}", first.get(), last.get())
    });
    let seen = Rc::new(RefCell::new(Vec::new()));

    let _effect = Effect::new({
        let (full, seen) = (full.clone(), seen.clone());
        move || seen.borrow_mut().push(full.get())
    });

    batch(|| {
        first.set(String::from("Grace"));
        last.set(String::from("Hopper"));
    });

    assert_eq!(*seen.borrow(), ["Ada Lovelace", "Grace Hopper"]);
}

/// Test that a diamond-shaped graph runs its effect once per change.
#[test]
fn diamond_runs_effect_once() {
    let source = Signal::new(1);
    let left = Computed::new({
        let source = source.clone();
        move || source.get() + 1
    });
    let right = Computed::new({
        let source = source.clone();
        move || source.get() * 10
    });
    let seen = Rc::new(RefCell::new(Vec::new()));

    let effect = Effect::new({
        let (left, right, seen) = (left.clone(), right.clone(), seen.clone());
        move || seen.borrow_mut().push(left.get() + right.get())
    });

    source.set(2);
    assert_eq!(*seen.borrow(), vec![12, 23]);
    assert_eq!(effect.run_count(), 2);
}

/// Test that an effect reading a signal and a value derived from it runs
/// once per change.
#[test]
fn mixed_direct_and_derived_reads_run_once() {
    let price = Signal::new(10);
    let with_tax = Computed::new({
        let price = price.clone();
        move || price.get() * 12 / 10
    });
    let seen = Rc::new(RefCell::new(Vec::new()));

    let effect = Effect::new({
        let (price, with_tax, seen) = (price.clone(), with_tax.clone(), seen.clone());
        move || seen.borrow_mut().push((price.get(), with_tax.get()))
    });

    price.set(20);
    price.set(30);

    assert_eq!(*seen.borrow(), vec![(10, 12), (20, 24), (30, 36)]);
    assert_eq!(effect.run_count(), 3);
}

/// Test that every level of a chain computes once per change.
#[test]
fn cascading_chain_computes_each_level_once() {
    let base = Signal::new(1);
    let calls = [counter(), counter(), counter()];

    let a = Computed::new({
        let (base, calls) = (base.clone(), calls[0].clone());
        move || {
            calls.set(calls.get() + 1);
            base.get() + 1
        }
    });
    let b = Computed::new({
        let (a, calls) = (a.clone(), calls[1].clone());
        move || {
            calls.set(calls.get() + 1);
            a.get() * 2
        }
    });
    let c = Computed::new({
        let (b, calls) = (b.clone(), calls[2].clone());
        move || {
            calls.set(calls.get() + 1);
            b.get() - 3
        }
    });
    let _effect = Effect::new({
        let c = c.clone();
        move || {
            c.get();
        }
    });

    base.set(5);
    assert_eq!(c.get(), 9);
    assert_eq!(
        calls.iter().map(|calls| calls.get()).collect::<Vec<_>>(),
        vec![2, 2, 2]
    );
}

/// Test that an equal write changes nothing downstream.
#[test]
fn equal_write_is_suppressed() {
    let source = Signal::new(3);
    let calls = counter();
    let doubled = Computed::new({
        let (source, calls) = (source.clone(), calls.clone());
        move || {
            calls.set(calls.get() + 1);
            source.get() * 2
        }
    });
    let effect = Effect::new({
        let doubled = doubled.clone();
        move || {
            doubled.get();
        }
    });

    source.set(3);
    assert_eq!(source.version(), 0);
    assert_eq!(doubled.state(), DirtyState::Clean);
    assert_eq!(calls.get(), 1);
    assert_eq!(effect.run_count(), 1);
}

/// Test that a computed with custom equality stops propagation.
#[test]
fn custom_equality_on_computed_stops_propagation() {
    let celsius = Signal::new(20.0_f64);
    let rounded: EqualFn<f64> = Rc::new(|a: &f64, b: &f64| a.round() == b.round());
    let fahrenheit = Computed::builder({
        let celsius = celsius.clone();
        move || celsius.get() * 9.0 / 5.0 + 32.0
    })
    .equal(rounded)
    .build();

    let effect = Effect::new({
        let fahrenheit = fahrenheit.clone();
        move || {
            fahrenheit.get();
        }
    });

    celsius.set(20.1);
    assert_eq!(effect.run_count(), 1);

    celsius.set(25.0);
    assert_eq!(effect.run_count(), 2);
}

/// Test that conditional reads rebuild the dependency set.
#[test]
fn effect_stops_reacting_to_untaken_branch() {
    let show_detail = Signal::new(true);
    let detail = Signal::new(String::from("v1"));
    let seen = Rc::new(RefCell::new(Vec::new()));

    let effect = Effect::new({
        let (show_detail, detail, seen) = (show_detail.clone(), detail.clone(), seen.clone());
        move || {
            let line = if show_detail.get() {
                detail.get()
            } else {
                String::from("hidden")
            };
            seen.borrow_mut().push(line);
        }
    });

    detail.set(String::from("v2"));
    show_detail.set(false);
    detail.set(String::from("v3"));
    detail.set(String::from("v4"));

    assert_eq!(*seen.borrow(), ["v1", "v2", "hidden"]);
    assert_eq!(effect.dependency_count(), 1);
    assert_eq!(detail.subscriber_count(), 0);
}

/// Test that two computed values reading each other report a cycle.
#[test]
fn mutual_recursion_is_reported_as_cycle() {
    let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
    let a = Computed::new({
        let slot = slot.clone();
        move || slot.borrow().as_ref().map_or(0, |b| b.get() + 1)
    });
    let b = Computed::new({
        let a = a.clone();
        move || a.get() + 1
    });
    *slot.borrow_mut() = Some(b.clone());

    assert!(matches!(a.try_get(), Err(ReactiveError::Cycle(_))));
    slot.borrow_mut().take();
}

/// Test that a panicking effect does not stop the others.
#[test]
fn effect_panic_is_isolated() {
    let trigger = Signal::new(0);
    let healthy_runs = counter();

    let failing = Effect::new({
        let trigger = trigger.clone();
        move || {
            if trigger.get() > 0 {
                panic!("downstream system unavailable");
            }
        }
    });
    let healthy = Effect::new({
        let (trigger, healthy_runs) = (trigger.clone(), healthy_runs.clone());
        move || {
            trigger.get();
            healthy_runs.set(healthy_runs.get() + 1);
        }
    });

    trigger.set(1);
    assert_eq!(failing.run_count(), 2);
    assert_eq!(healthy.run_count(), 2);
    assert_eq!(healthy_runs.get(), 2);
}

/// Test that a cleanup sees the run it belongs to and runs once on dispose.
#[test]
fn cleanup_lifecycle() {
    let room = Signal::new("lobby");
    let log = Rc::new(RefCell::new(Vec::new()));

    let effect = Effect::with_cleanup({
        let (room, log) = (room.clone(), log.clone());
        move |on_cleanup: &OnCleanup| {
            let current = room.get();
            log.borrow_mut().push(format!("join {current}"));
            let log = log.clone();
            on_cleanup.register(move || log.borrow_mut().push(format!("leave {current}")));
        }
    });

    room.set("kitchen");
    effect.dispose();
    effect.dispose();
    drop(effect);

    assert_eq!(
        *log.borrow(),
        ["join lobby", "leave lobby", "join kitchen", "leave kitchen"]
    );
}

/// Test that effects that keep re-triggering each other are cut off.
#[test]
fn runaway_effects_hit_flush_limit() {
    Runtime::configure(RuntimeConfig {
        max_flush_iterations: 10,
        ..RuntimeConfig::default()
    });

    let ping = Signal::new(0_u64);
    let pong = Signal::new(0_u64);
    let _forward = Effect::new({
        let (ping, pong) = (ping.clone(), pong.clone());
        move || pong.set(ping.get() + 1)
    });
    let _back = Effect::new({
        let (ping, pong) = (ping.clone(), pong.clone());
        move || ping.set(pong.get() + 1)
    });

    // The loop was dropped instead of spinning forever
    assert_eq!(Runtime::pending_effects(), 0);
    assert!(ping.get_untracked() < 100);
    assert!(!Runtime::is_batching());

    Runtime::configure(RuntimeConfig::default());
}

/// Test that untracked reads never become dependencies.
#[test]
fn untracked_scope_hides_reads() {
    let tracked = Signal::new(1);
    let config = Signal::new(10);
    let calls = counter();

    let scaled = Computed::new({
        let (tracked, config, calls) = (tracked.clone(), config.clone(), calls.clone());
        move || {
            calls.set(calls.get() + 1);
            tracked.get() * untracked(|| config.get())
        }
    });

    assert_eq!(scaled.get(), 10);
    config.set(20);
    assert_eq!(scaled.get(), 10);
    assert_eq!(calls.get(), 1);

    tracked.set(2);
    assert_eq!(scaled.get(), 40);
}

/// Test that dropping every handle removes nodes from the runtime.
#[test]
fn dropped_nodes_leave_the_graph() {
    let before = Runtime::node_count();
    {
        let source = Signal::new(1);
        let derived = Computed::new({
            let source = source.clone();
            move || source.get() + 1
        });
        let _effect = Effect::new({
            let derived = derived.clone();
            move || {
                derived.get();
            }
        });
        assert_eq!(Runtime::node_count(), before + 3);
        assert_eq!(source.subscriber_count(), 1);
    }
    assert_eq!(Runtime::node_count(), before);
}

/// Test the tracking state seen from inside and outside a computation.
#[test]
fn runtime_reports_tracking_state() {
    assert!(!Runtime::is_tracking());

    let inside = Rc::new(Cell::new(false));
    let _effect = Effect::new({
        let inside = inside.clone();
        move || inside.set(Runtime::is_tracking())
    });

    assert!(inside.get());
    assert!(!Runtime::is_tracking());
}
