use super::error::Result;
use super::request::Request;
use super::response::Response;
use futures::future::BoxFuture;
use serde_json::Value as JsonValue;
use std::future::Future;

/// A route handler or middleware stage
///
/// Implemented for any `Fn(Request, Response) -> impl Future<Output =
/// Result<()>>`. A stage stops the chain by ending the response.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request, res: Response) -> BoxFuture<'static, Result<()>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, req: Request, res: Response) -> BoxFuture<'static, Result<()>> {
        Box::pin(self(req, res))
    }
}

/// Computes one named context field for a request
pub trait Provider: Send + Sync + 'static {
    fn provide(&self, req: Request) -> BoxFuture<'static, Result<JsonValue>>;
}

impl<F, Fut> Provider for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JsonValue>> + Send + 'static,
{
    fn provide(&self, req: Request) -> BoxFuture<'static, Result<JsonValue>> {
        Box::pin(self(req))
    }
}
