//! First-class pipeline runner.
//!
//! Each HTTP flow is an ordered list of steps over one mutable request
//! context. A step either continues the chain, finishes it with a response,
//! or fails; failures short-circuit the remaining steps and dispatch to the
//! designated error step, which still runs its own side effects (such as
//! re-minting a CSRF token) before the response is produced.

use axum::response::Response;
use std::future::Future;
use std::pin::Pin;

use super::error::AuthError;

/// Outcome of a single step.
pub(crate) enum Flow {
    /// Proceed with the next step.
    Continue,
    /// Terminate the chain with this response.
    Done(Response),
}

pub(crate) type StepResult = Result<Flow, AuthError>;

pub(crate) type StepFuture<'a> = Pin<Box<dyn Future<Output = StepResult> + Send + 'a>>;

/// One pipeline step, borrowing the request context for its lifetime.
pub(crate) type Step<C> = for<'a> fn(&'a mut C) -> StepFuture<'a>;

/// Terminal error step, responsible for producing the response.
pub(crate) type ErrorStep<C> = fn(&mut C, AuthError) -> Response;

pub(crate) struct Chain<C: 'static> {
    steps: &'static [Step<C>],
    on_error: ErrorStep<C>,
}

impl<C: Send> Chain<C> {
    pub(crate) const fn new(steps: &'static [Step<C>], on_error: ErrorStep<C>) -> Self {
        Self { steps, on_error }
    }

    pub(crate) async fn run(&self, cx: &mut C) -> Response {
        for step in self.steps {
            match step(cx).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Done(response)) => return response,
                Err(err) => return (self.on_error)(cx, err),
            }
        }
        // A chain must end in a terminal step; reaching this point is a bug.
        (self.on_error)(cx, AuthError::server_error("pipeline ended without a response"))
    }
}
