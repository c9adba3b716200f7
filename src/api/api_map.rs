use super::ApiConfig;
use super::compose::{Composed, Middleware};
use super::error::Result;
use super::handler::{Handler, Provider};
use super::methods::Methods;
use super::navigate::{Param, PathMap, navigate};
use super::request::{QueryValue, Request};
use super::response::Response;
use http::Method;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One node of an API map
///
/// Child routes are keyed by a literal segment, `[name]` (binds one
/// segment) or `[...name]` (binds the rest of the path). A literal segment
/// starting with `$`, `[` or `/` must be registered with a leading `/`.
///
/// Inherited middleware applies to this node and every node below it;
/// mixins apply only to the handlers of this node. Context providers
/// declared on a node are visible to everything below it, a deeper
/// declaration of the same name wins.
#[derive(Default)]
pub struct ApiNode {
    methods: Methods,
    needs: BTreeSet<String>,
    context: BTreeMap<String, Arc<dyn Provider>>,
    inherited: Vec<Middleware>,
    mixins: Vec<Middleware>,
    routes: BTreeMap<String, ApiNode>,
    /// Composed chains of this node as a terminal, one per config
    composed: Mutex<HashMap<ApiConfig, Composed>>,
}

impl ApiNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method<F, Fut>(mut self, method: Method, handler: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.methods = self.methods.on(method, Arc::new(handler));
        self
    }

    pub fn get<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.method(Method::GET, handler)
    }

    pub fn post<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.method(Method::POST, handler)
    }

    pub fn put<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.method(Method::PUT, handler)
    }

    pub fn patch<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.method(Method::PATCH, handler)
    }

    pub fn delete<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.method(Method::DELETE, handler)
    }

    /// Handler for methods without their own handler
    pub fn any<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.methods = self.methods.any(Arc::new(handler));
        self
    }

    /// Context fields resolved before this node's handlers run
    pub fn needs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.needs.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare context field `name`
    pub fn context<F, Fut>(mut self, name: impl Into<String>, provider: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue>> + Send + 'static,
    {
        self.context.insert(name.into(), Arc::new(provider));
        self
    }

    pub fn inherited<F, Fut>(self, middleware: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.inherited_with(Middleware::new(middleware))
    }

    /// Inherited middleware that only runs for `method`
    pub fn inherited_for<F, Fut>(self, method: Method, middleware: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.inherited_with(Middleware::new(middleware).for_method(method))
    }

    pub fn inherited_with(mut self, middleware: Middleware) -> Self {
        self.inherited.push(middleware);
        self
    }

    pub fn mixin<F, Fut>(self, middleware: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.mixin_with(Middleware::new(middleware))
    }

    pub fn mixin_for<F, Fut>(self, method: Method, middleware: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.mixin_with(Middleware::new(middleware).for_method(method))
    }

    pub fn mixin_with(mut self, middleware: Middleware) -> Self {
        self.mixins.push(middleware);
        self
    }

    /// Attach `node` under `segment`, merging with an existing route
    pub fn route(mut self, segment: impl Into<String>, node: ApiNode) -> Self {
        let segment = segment.into();
        let node = match self.routes.remove(&segment) {
            Some(existing) => existing.merge(node),
            None => node,
        };
        self.routes.insert(segment, node);
        self
    }

    /// Overlay `other` onto this node; `other` wins on handler and
    /// provider clashes, middleware lists are concatenated
    pub fn merge(mut self, other: ApiNode) -> Self {
        self.methods = self.methods.merge(other.methods);
        self.needs.extend(other.needs);
        self.context.extend(other.context);
        self.inherited.extend(other.inherited);
        self.mixins.extend(other.mixins);
        for (segment, node) in other.routes {
            self = self.route(segment, node);
        }
        self.composed = Mutex::default();
        self
    }

    pub fn has_handlers(&self) -> bool {
        !self.methods.is_empty()
    }

    /// Chain for this node as the terminal of `visited`
    ///
    /// Cached per `config` so learned needs survive across requests while a
    /// dispatcher with other limits gets its own chain.
    fn composed(&self, visited: &[&ApiNode], config: &ApiConfig) -> Composed {
        match self.composed.lock() {
            Ok(mut cache) => cache
                .entry(config.clone())
                .or_insert_with(|| self.build_chain(visited, config))
                .clone(),
            Err(_) => self.build_chain(visited, config),
        }
    }

    fn build_chain(&self, visited: &[&ApiNode], config: &ApiConfig) -> Composed {
        let mut providers = BTreeMap::new();
        let mut stages = Vec::new();
        for node in visited {
            providers.extend(
                node.context
                    .iter()
                    .map(|(name, provider)| (name.clone(), Arc::clone(provider))),
            );
            stages.extend(node.inherited.iter().cloned());
        }
        stages.extend(self.mixins.iter().cloned());

        let handler: Arc<dyn Handler> = Arc::new(self.methods.clone());
        stages.push(Middleware::from_handler(handler).needs(self.needs.iter().cloned()));

        Composed::new(providers, stages, config.clone())
    }
}

impl PathMap for ApiNode {
    fn entry(&self, key: &str) -> Option<&Self> {
        self.routes.get(key)
    }

    fn entry_keys(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    fn is_traversable(&self) -> bool {
        !self.routes.is_empty()
    }
}

impl std::fmt::Debug for ApiNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiNode")
            .field("methods", &self.methods)
            .field("context", &self.context.keys().collect::<Vec<_>>())
            .field("inherited", &self.inherited.len())
            .field("mixins", &self.mixins.len())
            .field("routes", &self.routes)
            .finish()
    }
}

/// Route `req` through `api`
///
/// Returns `false` when navigation ends on a node without handlers. The
/// handler sees `query_mixin`, then the path parameters, then `path` (the
/// unconsumed segments) layered over the request's own query.
pub async fn handle_with_api_map(
    api: &ApiNode,
    req: Request,
    res: Response,
    query_mixin: &BTreeMap<String, QueryValue>,
    config: &ApiConfig,
) -> Result<bool> {
    let segments = req.segments();
    let mut visited = Vec::new();
    let nav = navigate(api, &segments, |node, _terminal| visited.push(node));

    let node = nav.node;
    if !node.has_handlers() {
        debug!(path = %req.path, "no handler");
        return Ok(false);
    }

    let mut req = req;
    req.query
        .extend(query_mixin.iter().map(|(name, value)| (name.clone(), value.clone())));
    for (name, param) in nav.params {
        let value = match param {
            Param::Segment(segment) => QueryValue::One(segment),
            Param::Rest(segments) => QueryValue::Many(segments),
        };
        req.query.insert(name, value);
    }
    req.query
        .insert("path".into(), QueryValue::Many(nav.remaining));

    node.composed(&visited, config).run(req, res).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::response::Body;
    use http::StatusCode;
    use serde_json::json;

    async fn call(api: &ApiNode, method: Method, path: &str) -> (bool, StatusCode, Body) {
        let res = Response::new();
        let handled = handle_with_api_map(
            api,
            Request::new(method, path),
            res.clone(),
            &BTreeMap::new(),
            &ApiConfig::default(),
        )
        .await
        .unwrap();
        let state = res.snapshot();
        (handled, state.status, state.body)
    }

    fn echo_query() -> ApiNode {
        ApiNode::new().get(|req: Request, res: Response| async move {
            res.json(&req.query)?;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_params_and_remaining_path_reach_the_handler() {
        let api = ApiNode::new().route(
            "rooms",
            ApiNode::new().route("[room]", ApiNode::new().route("files", echo_query())),
        );

        let (handled, _, body) = call(&api, Method::GET, "/rooms/R1/files").await;
        assert!(handled);
        assert_eq!(body, Body::Json(json!({"room": "R1", "path": []})));
    }

    #[tokio::test]
    async fn test_unhandled_paths_report_false() {
        let api = ApiNode::new().route("rooms", ApiNode::new());
        assert!(!call(&api, Method::GET, "/rooms").await.0);
        assert!(!call(&api, Method::GET, "/elsewhere").await.0);
    }

    #[tokio::test]
    async fn test_leaf_handler_receives_extra_segments() {
        let api = ApiNode::new().route("files", echo_query());

        let (_, _, body) = call(&api, Method::GET, "/files/a/b").await;
        assert_eq!(body, Body::Json(json!({"path": ["a", "b"]})));
    }

    #[tokio::test]
    async fn test_inherited_applies_below_mixin_only_alongside() {
        let guard = |_req: Request, res: Response| async move {
            res.status(StatusCode::FORBIDDEN).end();
            Ok(())
        };
        let ok = |_req: Request, res: Response| async move {
            res.end_with("ok");
            Ok(())
        };

        let api = ApiNode::new()
            .route(
                "admin",
                ApiNode::new()
                    .inherited(guard)
                    .get(ok)
                    .route("deep", ApiNode::new().get(ok)),
            )
            .route(
                "shop",
                ApiNode::new()
                    .mixin(guard)
                    .get(ok)
                    .route("open", ApiNode::new().get(ok)),
            );

        assert_eq!(call(&api, Method::GET, "/admin").await.1, StatusCode::FORBIDDEN);
        assert_eq!(call(&api, Method::GET, "/admin/deep").await.1, StatusCode::FORBIDDEN);
        assert_eq!(call(&api, Method::GET, "/shop").await.1, StatusCode::FORBIDDEN);
        assert_eq!(
            call(&api, Method::GET, "/shop/open").await.2,
            Body::Text("ok".into())
        );
    }

    #[tokio::test]
    async fn test_deeper_context_overrides() {
        let api = ApiNode::new()
            .context("who", |_req: Request| async { Ok(json!("root")) })
            .route(
                "inner",
                ApiNode::new()
                    .context("who", |_req: Request| async { Ok(json!("inner")) })
                    .get(|req: Request, res: Response| async move {
                        res.json(&req.context().get("who")?)?;
                        Ok(())
                    }),
            );

        let (_, _, body) = call(&api, Method::GET, "/inner").await;
        assert_eq!(body, Body::Json(json!("inner")));
    }

    #[tokio::test]
    async fn test_routes_merge() {
        let api = ApiNode::new()
            .route("a", ApiNode::new().get(|_req: Request, res: Response| async move {
                res.end_with("get");
                Ok(())
            }))
            .route("a", ApiNode::new().post(|_req: Request, res: Response| async move {
                res.end_with("post");
                Ok(())
            }));

        assert_eq!(call(&api, Method::GET, "/a").await.2, Body::Text("get".into()));
        assert_eq!(call(&api, Method::POST, "/a").await.2, Body::Text("post".into()));
        assert_eq!(call(&api, Method::PUT, "/a").await.1, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_each_config_gets_its_own_chain() {
        let api = ApiNode::new()
            .context("who", |_req: Request| async { Ok(json!("ann")) })
            .get(|req: Request, res: Response| async move {
                res.json(&req.context().get("who")?)?;
                Ok(())
            });
        let run = |config: ApiConfig| {
            let api = &api;
            async move {
                handle_with_api_map(
                    api,
                    Request::new(Method::GET, "/"),
                    Response::new(),
                    &BTreeMap::new(),
                    &config,
                )
                .await
            }
        };

        // the default chain learns "who" and needs two passes once
        assert!(run(ApiConfig::default()).await.unwrap());
        assert!(run(ApiConfig::default()).await.unwrap());

        // a single-pass config does not reuse the chain that learned it
        let err = run(ApiConfig::default().max_context_passes(1))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::api::ApiError::ContextPasses { limit: 1 }));
    }
}
