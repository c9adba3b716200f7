use http::{Method, StatusCode};
use kvscheme::api::{
    ApiConfig, ApiNode, Body, Check, Dispatcher, Middleware, Request, Response, ResponseState,
    hash_list, require_context, role_context,
};
use kvscheme::schema::{fields, hash, range, set};
use kvscheme::{Client, ContainerOps, Cx, RangeNode, Schema};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn rooms_schema() -> Arc<Schema> {
    Arc::new(
        Schema::define(fields([(
            "rooms",
            set([fields([("stories", range([hash([])]))])]),
        )]))
        .expect("valid schema"),
    )
}

fn stories_of(schema: &Schema, room: &str) -> kvscheme::Result<RangeNode> {
    schema
        .field("rooms")?
        .into_set()?
        .item(room)
        .field("stories")?
        .into_range()
}

fn stories_api(cx: Cx, schema: Arc<Schema>) -> ApiNode {
    let stories = hash_list(
        cx,
        move |req: &Request| Ok(stories_of(&schema, req.require_param("room")?)?),
        "[story]",
    )
    .expect("valid item segment");

    ApiNode::new().route(
        "rooms",
        ApiNode::new().route("[room]", ApiNode::new().route("stories", stories)),
    )
}

fn json_body(state: &ResponseState) -> JsonValue {
    match &state.body {
        Body::Json(value) => value.clone(),
        other => panic!("expected a JSON body, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stories_end_to_end() {
    let client = Client::memory().await.unwrap();
    let cx = client.cx();
    let schema = rooms_schema();
    let dispatcher = Dispatcher::new(stories_api(client.cx(), Arc::clone(&schema)));

    let created = dispatcher
        .dispatch(
            Request::new(Method::POST, "/rooms/R1/stories")
                .with_body(json!({"id": "s1", "title": "A"})),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(json_body(&created), json!({"id": "s1"}));

    let listed = dispatcher
        .dispatch(Request::new(Method::GET, "/rooms/R1/stories"))
        .await;
    assert_eq!(json_body(&listed), json!([{"id": "s1", "title": "A"}]));

    let item = dispatcher
        .dispatch(Request::new(Method::GET, "/rooms/R1/stories/s1"))
        .await;
    assert_eq!(json_body(&item), json!({"id": "s1", "title": "A"}));

    let deleted = dispatcher
        .dispatch(Request::new(Method::DELETE, "/rooms/R1/stories/s1"))
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let listed = dispatcher
        .dispatch(Request::new(Method::GET, "/rooms/R1/stories"))
        .await;
    assert_eq!(json_body(&listed), json!([]));

    let story = stories_of(&schema, "R1").unwrap().item("s1");
    assert_eq!(story.path(), "rooms:R1:stories:s1");
    assert!(!story.exists(&cx).await.unwrap());

    let missing = dispatcher
        .dispatch(Request::new(Method::GET, "/rooms/R1/stories/s1"))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_created_items_get_generated_ids_and_updates() {
    let client = Client::memory().await.unwrap();
    let dispatcher = Dispatcher::new(stories_api(client.cx(), rooms_schema()));

    let created = dispatcher
        .dispatch(Request::new(Method::POST, "/rooms/R2/stories").with_body(json!({"title": "B"})))
        .await;
    let id = json_body(&created)["id"]
        .as_str()
        .expect("generated id")
        .to_string();
    assert_eq!(id.len(), 36);

    let updated = dispatcher
        .dispatch(
            Request::new(Method::PUT, &format!("/rooms/R2/stories/{}", id))
                .with_body(json!({"title": "B2", "points": 3})),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);

    let item = dispatcher
        .dispatch(Request::new(Method::GET, &format!("/rooms/R2/stories/{}", id)))
        .await;
    assert_eq!(json_body(&item), json!({"id": id, "title": "B2", "points": "3"}));

    let rejected = dispatcher
        .dispatch(Request::new(Method::POST, "/rooms/R2/stories").with_body(json!("nope")))
        .await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_role_guard_over_a_subtree() {
    let admin_only = ApiNode::new()
        .context("roles", |req: Request| async move {
            let roles = req.param("as").map(|role| vec![role.to_string()]).unwrap_or_default();
            Ok(json!(roles))
        })
        .context("admin", role_context("admin"))
        .inherited(require_context(["admin"]))
        .get(|_req: Request, res: Response| async move {
            res.json(&json!({"secret": 42}))?;
            Ok(())
        });
    let dispatcher = Dispatcher::new(ApiNode::new().route("admin", admin_only));

    let denied = dispatcher
        .dispatch(Request::new(Method::GET, "/admin").with_query("as", "reader"))
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.body, Body::Text("not authorized".into()));

    let allowed = dispatcher
        .dispatch(Request::new(Method::GET, "/admin").with_query("as", "admin"))
        .await;
    assert_eq!(allowed.status, StatusCode::OK);
    assert_eq!(json_body(&allowed), json!({"secret": 42}));
}

#[tokio::test]
async fn test_handler_invocations_are_bounded_by_fields_read() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let provided = Arc::new(AtomicUsize::new(0));
    let provider_calls = Arc::clone(&provided);

    let api = ApiNode::new()
        .context("user", move |_req: Request| {
            provider_calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(json!("ann")) }
        })
        .context("greeting", |req: Request| async move {
            let user = req.context().get("user")?;
            Ok(json!(format!("hi {}", user.as_str().unwrap_or_default())))
        })
        .get(move |req: Request, res: Response| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let user = req.context().get("user")?;
                let greeting = req.context().get("greeting")?;
                res.json(&json!({"user": user, "greeting": greeting}))?;
                Ok(())
            }
        });
    let dispatcher = Dispatcher::new(api);

    let first = dispatcher.dispatch(Request::new(Method::GET, "/")).await;
    assert_eq!(json_body(&first), json!({"user": "ann", "greeting": "hi ann"}));
    assert_eq!(calls.swap(0, Ordering::SeqCst), 3);
    assert_eq!(provided.swap(0, Ordering::SeqCst), 1);

    // learned needs are resolved up front on later requests
    dispatcher.dispatch(Request::new(Method::GET, "/")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(provided.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failing_provider_becomes_500() {
    let api = ApiNode::new()
        .context("user", |_req: Request| async {
            Err(kvscheme::ApiError::Internal("directory down".into()))
        })
        .get(|req: Request, res: Response| async move {
            res.json(&req.context().get("user")?)?;
            Ok(())
        });
    let state = Dispatcher::new(api)
        .dispatch(Request::new(Method::GET, "/"))
        .await;

    assert_eq!(state.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json_body(&state)["error"]
        .as_str()
        .unwrap()
        .contains("directory down"));
}

#[tokio::test]
async fn test_context_passes_are_bounded() {
    let mut api = ApiNode::new();
    for i in 0..4 {
        api = api.context(format!("f{}", i), |_req: Request| async { Ok(json!(1)) });
    }
    let api = api.get(|req: Request, res: Response| async move {
        for i in 0..4 {
            req.context().get(&format!("f{}", i))?;
        }
        res.end();
        Ok(())
    });
    let dispatcher = Dispatcher::with_config(api, ApiConfig::default().max_context_passes(2));

    let state = dispatcher.dispatch(Request::new(Method::GET, "/")).await;
    assert_eq!(state.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_method_scoped_middleware_and_predicates() {
    let api = ApiNode::new()
        .context("owner", |req: Request| async move {
            Ok(json!(req.param("user") == Some("ann")))
        })
        .mixin_with(
            Middleware::new(require_context([Check::predicate(|context| {
                Ok(context.get("owner")? == json!(true))
            })]))
            .for_method(Method::DELETE),
        )
        .get(|_req: Request, res: Response| async move {
            res.end_with("read");
            Ok(())
        })
        .delete(|_req: Request, res: Response| async move {
            res.status(StatusCode::NO_CONTENT).end();
            Ok(())
        });
    let dispatcher = Dispatcher::new(api);

    let read = dispatcher
        .dispatch(Request::new(Method::GET, "/").with_query("user", "bob"))
        .await;
    assert_eq!(read.body, Body::Text("read".into()));

    let denied = dispatcher
        .dispatch(Request::new(Method::DELETE, "/").with_query("user", "bob"))
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let deleted = dispatcher
        .dispatch(Request::new(Method::DELETE, "/").with_query("user", "ann"))
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
}
