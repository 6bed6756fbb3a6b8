use std::future::Future;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use super::status::ResourceStatus;
use crate::error::{BoxError, LoadError};

/// What a loader receives for one load.
#[derive(Debug, Clone)]
pub struct LoaderArgs<P> {
    /// The params that triggered this load.
    pub params: P,
    /// Status of the resource just before this load started.
    pub previous_status: ResourceStatus,
    /// Cancelled as soon as the load is superseded, the value is set
    /// locally, or the resource is destroyed.
    pub cancellation: CancellationToken,
}

pub(crate) type LoaderFn<P, T> =
    Rc<dyn Fn(LoaderArgs<P>) -> LocalBoxFuture<'static, Result<T, LoadError>>>;

/// Erase a user loader into the shared form stored by the resource.
pub(crate) fn erase_loader<P, T, E, F, Fut>(loader: F) -> LoaderFn<P, T>
where
    P: 'static,
    T: 'static,
    E: Into<BoxError>,
    F: Fn(LoaderArgs<P>) -> Fut + 'static,
    Fut: Future<Output = Result<T, E>> + 'static,
{
    Rc::new(move |args| {
        let load = loader(args);
        async move { load.await.map_err(LoadError::new) }.boxed_local()
    })
}
