use super::error::Result;
use super::handler::Handler;
use super::request::Request;
use super::response::Response;
use futures::future::BoxFuture;
use http::{Method, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-method handlers of one API node
///
/// Dispatch picks the handler for the request method, else the `any`
/// handler, else a 404 writer.
#[derive(Clone, Default)]
pub struct Methods {
    by_method: HashMap<Method, Arc<dyn Handler>>,
    any: Option<Arc<dyn Handler>>,
}

impl Methods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, method: Method, handler: Arc<dyn Handler>) -> Self {
        self.by_method.insert(method, handler);
        self
    }

    pub fn any(mut self, handler: Arc<dyn Handler>) -> Self {
        self.any = Some(handler);
        self
    }

    /// Overlay `other`; its handlers win
    pub fn merge(mut self, other: Methods) -> Self {
        self.by_method.extend(other.by_method);
        if other.any.is_some() {
            self.any = other.any;
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty() && self.any.is_none()
    }

    pub fn select(&self, method: &Method) -> Arc<dyn Handler> {
        self.by_method
            .get(method)
            .or(self.any.as_ref())
            .cloned()
            .unwrap_or_else(|| Arc::new(not_found))
    }
}

impl Handler for Methods {
    fn call(&self, req: Request, res: Response) -> BoxFuture<'static, Result<()>> {
        self.select(&req.method).call(req, res)
    }
}

impl std::fmt::Debug for Methods {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Methods")
            .field("methods", &self.by_method.keys().collect::<Vec<_>>())
            .field("any", &self.any.is_some())
            .finish()
    }
}

/// Ends the response with 404
pub async fn not_found(_req: Request, res: Response) -> Result<()> {
    res.status(StatusCode::NOT_FOUND).end();
    Ok(())
}
