//! HTTP adapter
//!
//! Serves a `Dispatcher` through axum: every method and path goes to one
//! fallback handler that converts the axum request into an API `Request`
//! and the resulting `ResponseState` back into an axum response.

use crate::api::{ApiError, Body as ApiBody, Dispatcher, Request, ResponseState};
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::Value as JsonValue;
use std::sync::Arc;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_response())).into_response()
    }
}

impl IntoResponse for ResponseState {
    fn into_response(self) -> Response {
        match self.body {
            ApiBody::Empty => self.status.into_response(),
            ApiBody::Json(value) => (self.status, Json(value)).into_response(),
            ApiBody::Text(text) => (self.status, text).into_response(),
        }
    }
}

/// Router sending every request to `dispatcher`
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new().fallback(dispatch).with_state(dispatcher)
}

async fn dispatch(
    State(dispatcher): State<Arc<Dispatcher>>,
    method: Method,
    uri: Uri,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    let body = if body.is_empty() {
        JsonValue::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(body) => body,
            Err(err) => return ApiError::from(err).into_response(),
        }
    };

    let req = Request::new(method, uri.path())
        .with_query_pairs(query)
        .with_body(body);
    dispatcher.dispatch(req).await.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiNode;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn app() -> Router {
        let echo = ApiNode::new().any(|req: crate::api::Request, res: crate::api::Response| async move {
            res.json(&json!({
                "method": req.method.as_str(),
                "query": req.query,
                "body": req.body,
            }))?;
            Ok(())
        });
        let item = ApiNode::new().get(|req: crate::api::Request, res: crate::api::Response| async move {
            res.json(&json!({"id": req.require_param("id")?}))?;
            Ok(())
        });

        let api = ApiNode::new()
            .route("echo", echo)
            .route("r", ApiNode::new().route("[id]", item));
        router(Arc::new(Dispatcher::new(api)))
    }

    async fn decode_json(response: Response) -> JsonValue {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn test_request_reaches_dispatcher() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .method(Method::POST)
                    .uri("/echo?tag=a&tag=b&q=1")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"title":"A"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            decode_json(response).await,
            json!({
                "method": "POST",
                "query": {"tag": ["a", "b"], "q": "1", "path": []},
                "body": {"title": "A"},
            })
        );
    }

    #[tokio::test]
    async fn test_encoded_segments_bind_decoded_params() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/r/R%201")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(decode_json(response).await, json!({"id": "R 1"}));
    }

    #[tokio::test]
    async fn test_unknown_path_and_bad_body() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/nowhere")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .method(Method::POST)
                    .uri("/echo")
                    .body(Body::from("{not json"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(decode_json(response).await["code"], "bad_request");
    }
}
