use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::rc::{Rc, Weak};

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::loader::{erase_loader, LoaderArgs, LoaderFn};
use super::status::{ResourceSnapshot, ResourceStatus};
use crate::error::{BoxError, LoadError, ReactiveError};
use crate::reactive::{batch, never_equal, spawn_local, untracked, Computed, Effect, Signal};

/// The load currently in flight.
struct InFlight {
    id: u64,
    token: CancellationToken,
}

struct ResourceInner<P: 'static, T: 'static> {
    params: Computed<Option<P>>,
    status: Signal<ResourceStatus>,
    value: Signal<Option<T>>,
    error: Signal<Option<LoadError>>,
    previous_status: Cell<ResourceStatus>,
    loader: LoaderFn<P, T>,
    in_flight: RefCell<Option<InFlight>>,
    next_load: Cell<u64>,
    driver: RefCell<Option<Effect>>,
    destroyed: Cell<bool>,
}

/// An async value loaded from reactive params.
///
/// Whenever the params change, the in-flight load is cancelled and a new
/// one starts. A load's result is applied only if that load is still the
/// current one when it completes, so a slow, superseded load can never
/// overwrite a newer result.
///
/// Status, value and error are signals: reading them inside a computed
/// value or effect subscribes to them.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Resource, ResourceStatus, Signal};
/// use tokio::task::LocalSet;
///
/// # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # rt.block_on(LocalSet::new().run_until(async {
/// let user_id = Signal::new(1_u32);
/// let user = Resource::new(
///     {
///         let user_id = user_id.clone();
///         move || Some(user_id.get())
///     },
///     |args| async move { Ok::<_, std::io::Error>(format!("user {}", args.params)) },
/// )
/// .unwrap();
///
/// assert_eq!(user.status(), ResourceStatus::Loading);
/// tokio::task::yield_now().await;
/// assert_eq!(user.value().as_deref(), Some("user 1"));
/// # }));
/// ```
pub struct Resource<P: 'static, T: 'static> {
    inner: Rc<ResourceInner<P, T>>,
}

impl<P, T> Resource<P, T>
where
    P: Clone + PartialEq + 'static,
    T: Clone + 'static,
{
    /// Create a resource and start its first load.
    ///
    /// `params` is tracked like a computed value; returning `None` keeps the
    /// resource idle without calling `loader`. Loads are spawned with
    /// [`tokio::task::spawn_local`], so the resource must be created inside a
    /// [`LocalSet`](tokio::task::LocalSet); a load started without one fails
    /// with [`ReactiveError::NoLocalSet`] as its error.
    ///
    /// Fails with [`ReactiveError::NoAsyncContext`] outside a tokio runtime.
    pub fn new<F, L, Fut, E>(params: F, loader: L) -> Result<Self, ReactiveError>
    where
        F: Fn() -> Option<P> + 'static,
        L: Fn(LoaderArgs<P>) -> Fut + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
        E: Into<BoxError>,
    {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ReactiveError::NoAsyncContext);
        }

        let inner = Rc::new(ResourceInner {
            params: Computed::new(params),
            status: Signal::new(ResourceStatus::Idle),
            value: Signal::with_equality(None, never_equal()),
            error: Signal::with_equality(None, never_equal()),
            previous_status: Cell::new(ResourceStatus::Idle),
            loader: erase_loader(loader),
            in_flight: RefCell::new(None),
            next_load: Cell::new(0),
            driver: RefCell::new(None),
            destroyed: Cell::new(false),
        });

        let weak = Rc::downgrade(&inner);
        let driver = Effect::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let params = inner.params.try_get();
            untracked(|| ResourceInner::on_params(&inner, params));
        });
        *inner.driver.borrow_mut() = Some(driver);

        Ok(Self { inner })
    }

    /// Current value, tracked.
    pub fn value(&self) -> Option<T> {
        self.inner.value.get()
    }

    /// Error of the latest failed load, tracked.
    pub fn error(&self) -> Option<LoadError> {
        self.inner.error.get()
    }

    /// Current status, tracked.
    pub fn status(&self) -> ResourceStatus {
        self.inner.status.get()
    }

    /// Status before the latest transition.
    pub fn previous_status(&self) -> ResourceStatus {
        self.inner.previous_status.get()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.status.with(ResourceStatus::is_loading)
    }

    pub fn has_value(&self) -> bool {
        self.inner.value.with(Option::is_some)
    }

    /// Status, value and error read together.
    pub fn snapshot(&self) -> ResourceSnapshot<T> {
        ResourceSnapshot {
            status: self.status(),
            value: self.value(),
            error: self.error(),
        }
    }

    /// Restart the load for the current params, keeping the current value
    /// visible while it runs.
    ///
    /// Returns `false` without doing anything when the resource is idle, is
    /// already loading for the first time, or has been destroyed.
    pub fn reload(&self) -> bool {
        let inner = &self.inner;
        if inner.destroyed.get() {
            return false;
        }
        if matches!(
            inner.status.get_untracked(),
            ResourceStatus::Idle | ResourceStatus::Loading
        ) {
            return false;
        }
        let Ok(Some(params)) = untracked(|| inner.params.try_get()) else {
            return false;
        };
        ResourceInner::start_load(inner, params, ResourceStatus::Reloading);
        true
    }

    /// Replace the value locally, cancelling any in-flight load.
    pub fn set(&self, value: T) {
        let inner = &self.inner;
        inner.cancel_in_flight();
        batch(|| {
            inner.value.set(Some(value));
            inner.clear_error();
            inner.set_status(ResourceStatus::Local);
        });
    }

    /// Replace the value with a function of the current one.
    pub fn update(&self, f: impl FnOnce(Option<&T>) -> T) {
        let next = untracked(|| self.inner.value.with_untracked(|value| f(value.as_ref())));
        self.set(next);
    }

    /// Cancel any in-flight load and stop tracking params.
    ///
    /// Calling this twice is a no-op.
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.destroyed.replace(true) {
            return;
        }
        inner.cancel_in_flight();
        if let Some(driver) = inner.driver.borrow_mut().take() {
            driver.dispose();
        }
        debug!("resource destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }
}

impl<P, T> ResourceInner<P, T>
where
    P: Clone + PartialEq + 'static,
    T: Clone + 'static,
{
    fn on_params(this: &Rc<Self>, params: Result<Option<P>, ReactiveError>) {
        if this.destroyed.get() {
            return;
        }
        match params {
            Ok(Some(params)) => Self::start_load(this, params, ResourceStatus::Loading),
            Ok(None) => {
                this.cancel_in_flight();
                batch(|| {
                    this.set_status(ResourceStatus::Idle);
                    this.clear_value();
                    this.clear_error();
                });
            }
            Err(err) => {
                this.cancel_in_flight();
                debug!(error = %err, "resource params failed");
                batch(|| {
                    this.error.set(Some(LoadError::from(err)));
                    this.set_status(ResourceStatus::Error);
                });
            }
        }
    }

    fn start_load(this: &Rc<Self>, params: P, status: ResourceStatus) {
        this.cancel_in_flight();

        let id = this.next_load.get() + 1;
        this.next_load.set(id);
        let token = CancellationToken::new();
        *this.in_flight.borrow_mut() = Some(InFlight {
            id,
            token: token.clone(),
        });

        let previous_status = this.status.get_untracked();
        batch(|| {
            this.set_status(status);
            this.clear_error();
            if status == ResourceStatus::Loading {
                this.clear_value();
            }
        });
        debug!(load = id, %status, "resource load started");

        let args = LoaderArgs {
            params,
            previous_status,
            cancellation: token.clone(),
        };
        let loader = Rc::clone(&this.loader);
        let weak = Rc::downgrade(this);
        let task_token = token.clone();
        // The loader is called from inside the task, so a panic before its
        // future exists is caught like one during the load
        let spawned = spawn_local(async move {
            let load = async move { untracked(|| (*loader)(args)).await };
            let outcome = match AssertUnwindSafe(load).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(LoadError::from_panic(payload)),
            };
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.commit(id, &task_token, outcome);
            }
        });
        if let Err(err) = spawned {
            this.commit(id, &token, Err(LoadError::from(err)));
        }
    }

    fn commit(&self, id: u64, token: &CancellationToken, outcome: Result<T, LoadError>) {
        let current = self.in_flight.borrow().as_ref().map(|load| load.id);
        if current != Some(id) || token.is_cancelled() {
            trace!(load = id, "superseded load discarded");
            return;
        }
        self.in_flight.borrow_mut().take();

        match outcome {
            Ok(value) => {
                debug!(load = id, "resource resolved");
                batch(|| {
                    self.value.set(Some(value));
                    self.clear_error();
                    self.set_status(ResourceStatus::Resolved);
                });
            }
            Err(err) => {
                debug!(load = id, error = %err, "resource load failed");
                batch(|| {
                    self.error.set(Some(err));
                    self.set_status(ResourceStatus::Error);
                });
            }
        }
    }
}

impl<P: 'static, T: 'static> ResourceInner<P, T> {
    fn cancel_in_flight(&self) {
        if let Some(load) = self.in_flight.borrow_mut().take() {
            trace!(load = load.id, "cancelling in-flight load");
            load.token.cancel();
        }
    }

    fn set_status(&self, next: ResourceStatus) {
        let current = self.status.get_untracked();
        if current != next {
            self.previous_status.set(current);
            self.status.set(next);
        }
    }

    fn clear_value(&self) {
        if self.value.with_untracked(Option::is_some) {
            self.value.set(None);
        }
    }

    fn clear_error(&self) {
        if self.error.with_untracked(Option::is_some) {
            self.error.set(None);
        }
    }
}

impl<P: 'static, T: 'static> Drop for ResourceInner<P, T> {
    fn drop(&mut self) {
        self.cancel_in_flight();
    }
}

impl<P: 'static, T: 'static> Clone for Resource<P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: 'static, T: Debug + 'static> Debug for Resource<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("status", &self.inner.status.get_untracked())
            .field("value", &self.inner.value)
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}
