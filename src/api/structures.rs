use super::api_map::ApiNode;
use super::error::{ApiError, Result};
use super::request::Request;
use super::response::Response;
use crate::schema::{ContainerOps, HashNode, Ops, RangeNode};
use crate::transaction::Cx;
use http::StatusCode;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

lazy_static! {
    static ref PARAM_SEGMENT: Regex =
        Regex::new(r"^\[([A-Za-z_$][A-Za-z0-9_$]*)\]$").expect("param segment pattern");
}

/// REST routes over a range of hashes
///
/// `list_for` picks the range for a request (usually from path parameters
/// bound above this node). `param` is the item segment, e.g. `"[story]"`.
///
/// - `GET /`: every item as `[{id, ...fields}]`
/// - `POST /`: create an item from the body; `id` is taken from the body or
///   generated, and `{id}` is returned with 201
/// - `GET /[param]`: one item, 404 when not listed
/// - `PUT /[param]`: write the body fields into an existing item
/// - `DELETE /[param]`: delete the item, 204
pub fn hash_list<L>(cx: Cx, list_for: L, param: &str) -> Result<ApiNode>
where
    L: Fn(&Request) -> Result<RangeNode> + Send + Sync + 'static,
{
    let name: Arc<str> = PARAM_SEGMENT
        .captures(param)
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str().into())
        .ok_or_else(|| ApiError::BadRequest(format!("invalid item segment '{}'", param)))?;
    let lists = Lists {
        cx,
        list_for: Arc::new(list_for),
    };

    let item = ApiNode::new()
        .get(lists.item_handler(&name, |cx, _req, res, item| async move {
            let mut body = Map::new();
            body.insert("id".into(), JsonValue::String(item.key().to_string()));
            for (field, value) in item.get_all(&cx).await? {
                body.insert(field, JsonValue::String(value));
            }
            res.json(&body)?;
            Ok(())
        }))
        .put(lists.item_handler(&name, |cx, req, res, item| async move {
            let mut fields = body_fields(&req.body)?;
            fields.remove("id");
            item.set(&cx, fields).await?;
            res.json(&serde_json::json!({ "id": item.key() }))?;
            Ok(())
        }))
        .delete(lists.item_handler(&name, |cx, _req, res, item| async move {
            item.delete(&cx).await?;
            res.status(StatusCode::NO_CONTENT).end();
            Ok(())
        }));

    let list = {
        let lists = lists.clone();
        move |req: Request, res: Response| {
            let cx = lists.cx.clone();
            let list = (lists.list_for)(&req);
            async move {
                let items = list?.items(&cx).await?;
                res.json(&items)?;
                Ok(())
            }
        }
    };

    let create = {
        let lists = lists.clone();
        move |req: Request, res: Response| {
            let cx = lists.cx.clone();
            let list = (lists.list_for)(&req);
            async move {
                let list = list?;
                let id = match req.body.get("id") {
                    Some(JsonValue::String(id)) if !id.is_empty() => id.clone(),
                    Some(JsonValue::Number(id)) => id.to_string(),
                    _ => Uuid::new_v4().to_string(),
                };
                let mut fields = body_fields(&req.body)?;
                fields.remove("id");

                let item = list.item(&id).into_hash()?;
                if fields.is_empty() {
                    list.add(&cx, &id).await?;
                } else {
                    item.set(&cx, fields).await?;
                }

                res.status(StatusCode::CREATED)
                    .json(&serde_json::json!({ "id": id }))?;
                Ok(())
            }
        }
    };

    Ok(ApiNode::new()
        .get(list)
        .post(create)
        .route(param, item))
}

struct Lists<L> {
    cx: Cx,
    list_for: Arc<L>,
}

impl<L> Clone for Lists<L> {
    fn clone(&self) -> Self {
        Self {
            cx: self.cx.clone(),
            list_for: Arc::clone(&self.list_for),
        }
    }
}

impl<L> Lists<L>
where
    L: Fn(&Request) -> Result<RangeNode> + Send + Sync + 'static,
{
    /// Handler resolving the listed item named by `param` before `run`
    fn item_handler<F, Fut>(
        &self,
        param: &Arc<str>,
        run: F,
    ) -> impl Fn(Request, Response) -> futures::future::BoxFuture<'static, Result<()>>
    + Send
    + Sync
    + 'static
    where
        F: Fn(Cx, Request, Response, HashNode) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let lists = self.clone();
        let param = Arc::clone(param);
        let run = Arc::new(run);

        move |req: Request, res: Response| {
            let cx = lists.cx.clone();
            let list = (lists.list_for)(&req);
            let param = Arc::clone(&param);
            let run = Arc::clone(&run);
            Box::pin(async move {
                let list = list?;
                let id = req.require_param(&param)?.to_string();
                if list.position(&cx, &id).await?.is_none() {
                    return Err(ApiError::NotFound(format!("{}:{}", list.path(), id)));
                }
                let item = list.item(&id).into_hash()?;
                run(cx, req, res, item).await
            })
        }
    }
}

/// Body object as string fields; JSON strings are stored as-is, other
/// values as their JSON text, `null` is skipped
fn body_fields(body: &JsonValue) -> Result<BTreeMap<String, String>> {
    let JsonValue::Object(object) = body else {
        return Err(ApiError::BadRequest("expected a JSON object body".into()));
    };

    Ok(object
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(field, value)| {
            let value = match value {
                JsonValue::String(text) => text.clone(),
                other => other.to_string(),
            };
            (field.clone(), value)
        })
        .collect())
}
