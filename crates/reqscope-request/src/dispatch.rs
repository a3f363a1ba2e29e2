//! RequestFactory: creates request contexts and drives handlers to completion.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use reqscope_context::ContextRef;
use reqscope_process::{ProcessError, ProcessTracker};
use tracing::{Instrument, error, info_span};

use crate::context::RequestContext;
use crate::factory::{RequestFinisher, new_request_context};
use crate::store::panic_message;

/// Owns the injected process tracker and builds request contexts on it.
#[derive(Clone)]
pub struct RequestFactory {
    tracker: Arc<dyn ProcessTracker>,
}

impl RequestFactory {
    pub fn new(tracker: Arc<dyn ProcessTracker>) -> Self {
        Self { tracker }
    }

    /// See [`new_request_context`].
    pub fn create(
        &self,
        parent: ContextRef,
        description: &str,
    ) -> Result<(Arc<RequestContext>, RequestFinisher), ProcessError> {
        new_request_context(self.tracker.as_ref(), parent, description)
    }

    /// Run `handler` as one request.
    ///
    /// The request is finished exactly once however the handler ends: on
    /// return, on panic (the panic is re-raised after cleanup), or when the
    /// future returned here is dropped before completion.
    pub async fn run<F, Fut, T>(
        &self,
        parent: ContextRef,
        description: &str,
        handler: F,
    ) -> Result<T, ProcessError>
    where
        F: FnOnce(Arc<RequestContext>) -> Fut,
        Fut: Future<Output = T>,
    {
        let (ctx, finisher) = self.create(parent, description)?;
        let span = info_span!("request", pid = %finisher.pid(), description);

        let outcome = AssertUnwindSafe(handler(ctx))
            .catch_unwind()
            .instrument(span)
            .await;
        finisher.finish();

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => {
                error!("Request handler panicked: {}", panic_message(panic.as_ref()));
                std::panic::resume_unwind(panic)
            }
        }
    }
}

impl std::fmt::Debug for RequestFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestFactory").finish_non_exhaustive()
    }
}
