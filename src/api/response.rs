use http::StatusCode;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(JsonValue),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseState {
    pub status: StatusCode,
    pub body: Body,
    pub ended: bool,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            body: Body::Empty,
            ended: false,
        }
    }
}

/// Response sink shared by every stage of one request
///
/// The first `end`/`json` wins; later writes are ignored. A stage that ends
/// the response stops the middleware chain.
#[derive(Debug, Clone, Default)]
pub struct Response {
    state: Arc<Mutex<ResponseState>>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ResponseState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self, status: StatusCode) -> &Self {
        let mut state = self.lock();
        if !state.ended {
            state.status = status;
        }
        self
    }

    /// Write `value` as the JSON body and end the response
    pub fn json<T: Serialize>(&self, value: &T) -> serde_json::Result<()> {
        let body = serde_json::to_value(value)?;
        self.finish(Body::Json(body));
        Ok(())
    }

    pub fn end(&self) {
        self.finish(Body::Empty);
    }

    pub fn end_with(&self, text: impl Into<String>) {
        self.finish(Body::Text(text.into()));
    }

    fn finish(&self, body: Body) {
        let mut state = self.lock();
        if !state.ended {
            state.body = body;
            state.ended = true;
        }
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    pub fn snapshot(&self) -> ResponseState {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_end_wins() {
        let res = Response::new();
        res.status(StatusCode::CREATED).json(&json!({"id": "s1"})).unwrap();
        res.status(StatusCode::NOT_FOUND).end();

        let state = res.snapshot();
        assert!(state.ended);
        assert_eq!(state.status, StatusCode::CREATED);
        assert_eq!(state.body, Body::Json(json!({"id": "s1"})));
    }

    #[test]
    fn test_clones_share_state() {
        let res = Response::new();
        let stage = res.clone();
        stage.status(StatusCode::FORBIDDEN).end_with("not authorized");

        assert!(res.is_ended());
        assert_eq!(res.snapshot().body, Body::Text("not authorized".into()));
    }
}
