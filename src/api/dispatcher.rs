use super::ApiConfig;
use super::api_map::{ApiNode, handle_with_api_map};
use super::error::ApiError;
use super::request::{QueryValue, Request};
use super::response::{Response, ResponseState};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, error};

/// Boundary between transport and the API map
///
/// Every request ends in a `ResponseState`: unhandled paths become 404 and
/// handler errors become the status of the error, with an `ErrorResponse`
/// body unless the handler already ended the response.
#[derive(Debug)]
pub struct Dispatcher {
    api: ApiNode,
    config: ApiConfig,
}

impl Dispatcher {
    pub fn new(api: ApiNode) -> Self {
        Self::with_config(api, ApiConfig::default())
    }

    pub fn with_config(api: ApiNode, config: ApiConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub async fn dispatch(&self, req: Request) -> ResponseState {
        self.dispatch_with(req, &BTreeMap::new()).await
    }

    /// Dispatch with extra query entries visible to the handler
    pub async fn dispatch_with(
        &self,
        req: Request,
        query_mixin: &BTreeMap<String, QueryValue>,
    ) -> ResponseState {
        let started = Instant::now();
        let method = req.method.clone();
        let path = req.path.clone();
        let res = Response::new();

        match handle_with_api_map(&self.api, req, res.clone(), query_mixin, &self.config).await {
            Ok(true) => {}
            Ok(false) => write_error(&res, &ApiError::NotFound(path.clone())),
            Err(err) => {
                error!(%method, %path, error = %err, "request failed");
                write_error(&res, &err);
            }
        }

        let state = res.snapshot();
        debug!(
            %method,
            %path,
            status = state.status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request dispatched"
        );
        state
    }
}

fn write_error(res: &Response, err: &ApiError) {
    if res.is_ended() {
        return;
    }
    if res.status(err.status()).json(&err.to_response()).is_err() {
        res.end();
    }
}
