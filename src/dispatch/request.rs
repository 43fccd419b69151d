use async_trait::async_trait;

use crate::error::PipelineError;

/// A command or query routed to exactly one handler.
///
/// `NAME` is the stable tag used in logs, metrics and routing errors.
pub trait Request: Send + 'static {
    type Response: Send + 'static;

    const NAME: &'static str;
}

/// Handles one request type. Whatever it returns, success or error, is
/// handed back to the caller of `Dispatcher::send` unchanged.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync {
    async fn handle(&self, request: R) -> Result<R::Response, PipelineError>;
}
