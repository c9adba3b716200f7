use super::ApiConfig;
use super::error::{ApiError, Result};
use super::handler::Provider;
use super::request::Request;
use async_recursion::async_recursion;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::debug;

type Resolved = std::result::Result<JsonValue, String>;

/// A named provider plus the context fields it was seen to need
pub(crate) struct ProviderEntry {
    provider: Arc<dyn Provider>,
    learned: Mutex<BTreeSet<String>>,
}

impl ProviderEntry {
    pub(crate) fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            learned: Mutex::new(BTreeSet::new()),
        }
    }

    fn learned(&self) -> BTreeSet<String> {
        self.learned
            .lock()
            .map(|learned| learned.clone())
            .unwrap_or_default()
    }

    fn learn(&self, name: &str) {
        if let Ok(mut learned) = self.learned.lock() {
            learned.insert(name.to_string());
        }
    }
}

pub(crate) type Providers = Arc<BTreeMap<String, Arc<ProviderEntry>>>;

#[derive(Default)]
struct ContextState {
    providers: Providers,
    cells: Mutex<HashMap<String, Arc<OnceCell<Resolved>>>>,
}

/// Per-request context fields
///
/// Each field is computed by its provider at most once per request.
/// Reading a field that is not computed yet fails with
/// `ApiError::NotReady`; propagate it with `?` and the composer resolves
/// the field and calls the handler again.
#[derive(Clone, Default)]
pub struct Context {
    state: Arc<ContextState>,
}

impl Context {
    pub(crate) fn new(providers: Providers) -> Self {
        Self {
            state: Arc::new(ContextState {
                providers,
                cells: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Declared field names
    pub fn names(&self) -> Vec<&str> {
        self.state.providers.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Result<JsonValue> {
        self.entry(name)?;
        match self.cell(name)?.get() {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(message)) => Err(ApiError::Provider {
                name: name.to_string(),
                message: message.clone(),
            }),
            None => Err(ApiError::NotReady(name.to_string())),
        }
    }

    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        Ok(serde_json::from_value(self.get(name)?)?)
    }

    pub fn is_resolved(&self, name: &str) -> bool {
        self.cell(name)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    fn entry(&self, name: &str) -> Result<&Arc<ProviderEntry>> {
        self.state
            .providers
            .get(name)
            .ok_or_else(|| ApiError::UnknownContext(name.to_string()))
    }

    fn cell(&self, name: &str) -> Result<Arc<OnceCell<Resolved>>> {
        let mut cells = self
            .state
            .cells
            .lock()
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        Ok(Arc::clone(cells.entry(name.to_string()).or_default()))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resolved: Vec<&str> = self
            .names()
            .into_iter()
            .filter(|name| self.is_resolved(name))
            .collect();
        f.debug_struct("Context")
            .field("fields", &self.names())
            .field("resolved", &resolved)
            .finish()
    }
}

/// Call `invoke` until it completes without hitting an unresolved field
///
/// Fields in `needs` are resolved concurrently before every call. Each
/// `NotReady(name)` adds `name` to `needs`, reports it through `learn`, and
/// triggers one more pass, up to `config.max_context_passes` calls.
pub(crate) async fn with_context<T, L, F, Fut>(
    req: &Request,
    mut needs: BTreeSet<String>,
    chain: &[String],
    config: &ApiConfig,
    mut learn: L,
    mut invoke: F,
) -> Result<T>
where
    L: FnMut(&str),
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for pass in 1..=config.max_context_passes {
        try_join_all(needs.iter().map(|name| resolve(req, name, chain, config))).await?;

        match invoke().await {
            Err(ApiError::NotReady(name)) => {
                debug!(field = %name, pass, "context field needed");
                if !needs.insert(name.clone()) {
                    return Err(ApiError::Internal(format!(
                        "context field '{}' still unresolved after resolution",
                        name
                    )));
                }
                learn(&name);
            }
            result => return result,
        }
    }

    Err(ApiError::ContextPasses {
        limit: config.max_context_passes,
    })
}

/// Compute field `name` for this request unless already computed
///
/// Provider failures are cached and surface when the field is read.
/// `chain` holds the providers currently being computed above this one.
#[async_recursion]
async fn resolve(req: &Request, name: &str, chain: &[String], config: &ApiConfig) -> Result<()> {
    let context = req.context();
    let entry = Arc::clone(context.entry(name)?);
    if chain.iter().any(|pending| pending == name) {
        return Err(ApiError::ContextCycle(name.to_string()));
    }

    let cell = context.cell(name)?;
    if cell.initialized() {
        return Ok(());
    }

    let mut chain = chain.to_vec();
    chain.push(name.to_string());

    cell.get_or_init(|| async move {
        let run = with_context(
            req,
            entry.learned(),
            &chain,
            config,
            |dependency| entry.learn(dependency),
            || entry.provider.provide(req.clone()),
        );

        match tokio::time::timeout(config.provider_timeout, run).await {
            Ok(Ok(value)) => {
                debug!(field = %name, "context field resolved");
                Ok(value)
            }
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(ApiError::ContextTimeout(name.to_string()).to_string()),
        }
    })
    .await;

    Ok(())
}

/// JavaScript-style truthiness, used by context guards
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}
