use super::context::{Context, is_truthy};
use super::error::Result;
use super::request::Request;
use super::response::Response;
use futures::future::BoxFuture;
use http::StatusCode;
use serde_json::Value as JsonValue;
use std::sync::Arc;

type Predicate = Arc<dyn Fn(&Context) -> Result<bool> + Send + Sync>;

/// One condition checked by `require_context`
#[derive(Clone)]
pub enum Check {
    /// Context field that must be truthy
    Field(String),
    Predicate(Predicate),
}

impl Check {
    pub fn predicate<F>(check: F) -> Self
    where
        F: Fn(&Context) -> Result<bool> + Send + Sync + 'static,
    {
        Check::Predicate(Arc::new(check))
    }

    fn passes(&self, context: &Context) -> Result<bool> {
        match self {
            Check::Field(name) => Ok(is_truthy(&context.get(name)?)),
            Check::Predicate(check) => check(context),
        }
    }
}

impl From<&str> for Check {
    fn from(name: &str) -> Self {
        Check::Field(name.to_string())
    }
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Check::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Check::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Middleware ending the request with 403 unless every check passes
pub fn require_context<I, C>(
    checks: I,
) -> impl Fn(Request, Response) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static
where
    I: IntoIterator<Item = C>,
    C: Into<Check>,
{
    let checks: Arc<[Check]> = checks.into_iter().map(Into::into).collect();

    move |req: Request, res: Response| {
        let checks = Arc::clone(&checks);
        Box::pin(async move {
            for check in checks.iter() {
                if !check.passes(req.context())? {
                    res.status(StatusCode::FORBIDDEN).end_with("not authorized");
                    return Ok(());
                }
            }
            Ok(())
        })
    }
}

/// Provider answering whether the `roles` context field contains `role`
pub fn role_context(
    role: impl Into<String>,
) -> impl Fn(Request) -> BoxFuture<'static, Result<JsonValue>> + Send + Sync + 'static {
    let role: Arc<str> = role.into().into();

    move |req: Request| {
        let role = Arc::clone(&role);
        Box::pin(async move {
            let roles = req.context().get("roles")?;
            let granted = roles
                .as_array()
                .is_some_and(|roles| roles.iter().any(|r| r.as_str() == Some(&*role)));
            Ok(JsonValue::Bool(granted))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::api::compose::{Middleware, compose};
    use crate::api::handler::Provider;
    use crate::api::response::Body;
    use http::Method;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn providers(roles: JsonValue) -> BTreeMap<String, Arc<dyn Provider>> {
        let mut providers: BTreeMap<String, Arc<dyn Provider>> = BTreeMap::new();
        providers.insert(
            "roles".into(),
            Arc::new(move |_req: Request| {
                let roles = roles.clone();
                async move { Ok::<_, ApiError>(roles) }
            }),
        );
        providers.insert("admin".into(), Arc::new(role_context("admin")));
        providers
    }

    async fn run(roles: JsonValue, checks: Vec<Check>) -> (StatusCode, Body) {
        let composed = compose(
            providers(roles),
            vec![
                Middleware::new(require_context(checks)),
                Middleware::new(|_req: Request, res: Response| async move {
                    res.end_with("secret");
                    Ok(())
                }),
            ],
        );
        let res = Response::new();
        composed
            .run(Request::new(Method::GET, "/"), res.clone())
            .await
            .unwrap();
        let state = res.snapshot();
        (state.status, state.body)
    }

    #[tokio::test]
    async fn test_role_guard() {
        let (status, body) = run(json!(["admin"]), vec!["admin".into()]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Body::Text("secret".into()));

        let (status, body) = run(json!(["reader"]), vec!["admin".into()]).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, Body::Text("not authorized".into()));
    }

    #[tokio::test]
    async fn test_predicate_check() {
        let many_roles = Check::predicate(|context| {
            Ok(context
                .get("roles")?
                .as_array()
                .is_some_and(|roles| roles.len() > 1))
        });

        let (status, _) = run(json!(["a", "b"]), vec![many_roles.clone()]).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = run(json!(["a"]), vec![many_roles]).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
