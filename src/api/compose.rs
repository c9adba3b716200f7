use super::ApiConfig;
use super::context::{Context, ProviderEntry, Providers, with_context};
use super::error::Result;
use super::handler::{Handler, Provider};
use super::request::Request;
use super::response::Response;
use futures::future::BoxFuture;
use http::Method;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One stage of a composed handler chain
#[derive(Clone)]
pub struct Middleware {
    handler: Arc<dyn Handler>,
    method: Option<Method>,
    needs: BTreeSet<String>,
}

impl Middleware {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::from_handler(Arc::new(handler))
    }

    pub fn from_handler(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            method: None,
            needs: BTreeSet::new(),
        }
    }

    /// Run this stage only for `method`
    pub fn for_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Context fields resolved before the first invocation
    pub fn needs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.needs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn applies_to(&self, method: &Method) -> bool {
        self.method.as_ref().is_none_or(|only| only == method)
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware")
            .field("method", &self.method)
            .field("needs", &self.needs)
            .finish()
    }
}

struct Stage {
    middleware: Middleware,
    learned: Mutex<HashMap<Method, BTreeSet<String>>>,
}

impl Stage {
    fn new(middleware: Middleware) -> Self {
        Self {
            middleware,
            learned: Mutex::new(HashMap::new()),
        }
    }

    fn needs_for(&self, method: &Method) -> BTreeSet<String> {
        let mut needs = self.middleware.needs.clone();
        if let Ok(learned) = self.learned.lock() {
            if let Some(fields) = learned.get(method) {
                needs.extend(fields.iter().cloned());
            }
        }
        needs
    }

    fn learn(&self, method: &Method, name: &str) {
        if let Ok(mut learned) = self.learned.lock() {
            learned
                .entry(method.clone())
                .or_default()
                .insert(name.to_string());
        }
    }

    async fn run(&self, req: &Request, res: &Response, config: &ApiConfig) -> Result<()> {
        let method = req.method.clone();
        with_context(
            req,
            self.needs_for(&method),
            &[],
            config,
            |name| self.learn(&method, name),
            || self.middleware.handler.call(req.clone(), res.clone()),
        )
        .await
    }
}

struct ComposedInner {
    providers: Providers,
    stages: Vec<Stage>,
    config: ApiConfig,
}

/// Handler chain sharing one set of context providers
///
/// Stages run in order until one ends the response. Context fields each
/// stage needed are remembered per HTTP method, so later requests resolve
/// them up front instead of re-invoking the stage.
#[derive(Clone)]
pub struct Composed {
    inner: Arc<ComposedInner>,
}

impl Composed {
    pub fn new(
        providers: BTreeMap<String, Arc<dyn Provider>>,
        stages: Vec<Middleware>,
        config: ApiConfig,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|(name, provider)| (name, Arc::new(ProviderEntry::new(provider))))
            .collect();

        Self {
            inner: Arc::new(ComposedInner {
                providers: Arc::new(providers),
                stages: stages.into_iter().map(Stage::new).collect(),
                config,
            }),
        }
    }

    pub async fn run(&self, req: Request, res: Response) -> Result<()> {
        let inner = &self.inner;
        let req = req.with_context(Context::new(Arc::clone(&inner.providers)));

        for (index, stage) in inner.stages.iter().enumerate() {
            if res.is_ended() {
                debug!(stage = index, "response ended, chain stopped");
                break;
            }
            if !stage.middleware.applies_to(&req.method) {
                continue;
            }
            stage.run(&req, &res, &inner.config).await?;
        }
        Ok(())
    }
}

impl Handler for Composed {
    fn call(&self, req: Request, res: Response) -> BoxFuture<'static, Result<()>> {
        let this = self.clone();
        Box::pin(async move { this.run(req, res).await })
    }
}

impl std::fmt::Debug for Composed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composed")
            .field("providers", &self.inner.providers.keys().collect::<Vec<_>>())
            .field("stages", &self.inner.stages.len())
            .finish()
    }
}

/// Compose `stages` over `providers` with default limits
pub fn compose(providers: BTreeMap<String, Arc<dyn Provider>>, stages: Vec<Middleware>) -> Composed {
    Composed::new(providers, stages, ApiConfig::default())
}
