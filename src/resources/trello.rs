//! Trello REST 后端
//!
//! 字段以查询参数发送（与 Trello 官方客户端一致）：嵌套 prefs 在创建时展开为 `prefs_x`，
//! 更新时展开为 `prefs/x`；数组以逗号拼接。凭据在启动时从环境变量读取。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::config::BackendSection;
use crate::resources::backend::{BackendError, Fields, ResourceBackend};
use crate::resources::{ListScope, Parent, ResourceKind, ResourceRef};

pub struct TrelloBackend {
    http: reqwest::Client,
    base_url: String,
    key: String,
    token: String,
}

fn collection(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Board => "boards",
        ResourceKind::List => "lists",
        ResourceKind::Card => "cards",
        ResourceKind::Label => "labels",
        ResourceKind::Attachment => "attachments",
        ResourceKind::Checklist => "checklists",
        ResourceKind::CheckItem => "checkItems",
        ResourceKind::Workspace => "organizations",
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Op {
    Create,
    Update,
}

/// 把字段展开为查询参数
fn to_query(fields: &Fields, op: Op) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (key, value) in fields {
        match value {
            Value::Object(nested) => {
                let sep = if op == Op::Create { "_" } else { "/" };
                for (k, v) in nested {
                    out.push((format!("{key}{sep}{k}"), scalar(v)));
                }
            }
            other => out.push((key.clone(), scalar(other))),
        }
    }
    out
}

fn scalar(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

impl TrelloBackend {
    pub fn new(base_url: &str, key: &str, token: &str, timeout: Duration) -> Result<Self, BackendError> {
        if key.is_empty() || token.is_empty() {
            return Err(BackendError::Unavailable(
                "Trello API key and token are required".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            token: token.to_string(),
        })
    }

    /// 从 [backend] 配置与环境变量创建
    pub fn from_config(cfg: &BackendSection) -> Result<Self, BackendError> {
        let key = std::env::var(&cfg.api_key_env).unwrap_or_default();
        let token = std::env::var(&cfg.api_token_env).unwrap_or_default();
        Self::new(
            &cfg.base_url,
            &key,
            &token,
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    /// 单个资源的路径；附件与清单项必须经由父资源访问
    fn item_path(&self, target: &ResourceRef) -> Result<String, BackendError> {
        match (target.kind, &target.parent) {
            (ResourceKind::Attachment, Some(p)) => {
                Ok(format!("/cards/{}/attachments/{}", p.id, target.id))
            }
            (ResourceKind::CheckItem, Some(p)) if p.kind == ResourceKind::Card => {
                Ok(format!("/cards/{}/checkItem/{}", p.id, target.id))
            }
            (ResourceKind::CheckItem, Some(p)) => {
                Ok(format!("/checklists/{}/checkItems/{}", p.id, target.id))
            }
            (ResourceKind::Attachment | ResourceKind::CheckItem, None) => Err(BackendError::Rejected(
                format!("a parent id is required to address a {}", target.kind.label()),
            )),
            (kind, _) => Ok(format!("/{}/{}", collection(kind), target.id)),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: Vec<(String, String)>,
        what: &str,
    ) -> Result<Value, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .request(method.clone(), &url)
            .query(&[("key", self.key.as_str()), ("token", self.token.as_str())])
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, %method, path, "Trello request failed");
                BackendError::Unavailable(format!("Trello request failed: {e}"))
            })?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<Value>()
                .await
                .map_err(|e| BackendError::Unavailable(format!("Malformed Trello response: {e}")));
        }

        let body = resp.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        tracing::warn!(%status, %method, path, body = %snippet, "Trello returned an error");
        Err(match status {
            StatusCode::NOT_FOUND => BackendError::NotFound(format!("The requested {what} does not exist")),
            StatusCode::BAD_REQUEST => BackendError::Rejected(format!("Trello rejected the request: {snippet}")),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                BackendError::Unavailable(format!("Trello denied access ({status})"))
            }
            _ => BackendError::Unavailable(format!("Trello returned {status}")),
        })
    }
}

#[async_trait]
impl ResourceBackend for TrelloBackend {
    fn name(&self) -> &str {
        "trello"
    }

    async fn create(
        &self,
        kind: ResourceKind,
        parent: Option<&Parent>,
        fields: Fields,
    ) -> Result<Value, BackendError> {
        let mut query = to_query(&fields, Op::Create);
        let path = match (kind, parent) {
            (ResourceKind::Attachment, Some(p)) => format!("/cards/{}/attachments", p.id),
            (ResourceKind::CheckItem, Some(p)) => format!("/checklists/{}/checkItems", p.id),
            (_, Some(p)) => {
                query.push((p.kind.link_field().to_string(), p.id.clone()));
                format!("/{}", collection(kind))
            }
            (_, None) => {
                if let Some(expected) = kind.required_parent() {
                    return Err(BackendError::Rejected(format!(
                        "{} is required to create a {}",
                        expected.link_field(),
                        kind.label()
                    )));
                }
                format!("/{}", collection(kind))
            }
        };
        self.send(Method::POST, &path, query, kind.label()).await
    }

    async fn get(&self, target: &ResourceRef) -> Result<Value, BackendError> {
        let path = self.item_path(target)?;
        self.send(Method::GET, &path, Vec::new(), target.kind.label()).await
    }

    async fn update(&self, target: &ResourceRef, fields: Fields) -> Result<Value, BackendError> {
        let path = self.item_path(target)?;
        let query = to_query(&fields, Op::Update);
        self.send(Method::PUT, &path, query, target.kind.label()).await
    }

    async fn delete(&self, target: &ResourceRef) -> Result<(), BackendError> {
        let path = self.item_path(target)?;
        self.send(Method::DELETE, &path, Vec::new(), target.kind.label())
            .await
            .map(|_| ())
    }

    async fn list(&self, kind: ResourceKind, scope: &ListScope) -> Result<Vec<Value>, BackendError> {
        let (path, filter) = match scope {
            ListScope::Mine { filter } => (format!("/members/me/{}", collection(kind)), filter),
            ListScope::Under { parent, filter } => (
                format!("/{}/{}/{}", collection(parent.kind), parent.id, collection(kind)),
                filter,
            ),
        };
        let query = vec![("filter".to_string(), filter.clone())];
        match self.send(Method::GET, &path, query, kind.label()).await? {
            Value::Array(items) => Ok(items),
            other => Err(BackendError::Unavailable(format!(
                "Expected a list from Trello, got {}",
                match other {
                    Value::Object(_) => "an object",
                    _ => "a scalar",
                }
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_prefs_flattening_differs_for_create_and_update() {
        let f = fields(json!({"name": "X", "prefs": {"background": "green"}}));
        let create = to_query(&f, Op::Create);
        assert!(create.contains(&("prefs_background".to_string(), "green".to_string())));
        let update = to_query(&f, Op::Update);
        assert!(update.contains(&("prefs/background".to_string(), "green".to_string())));
        assert!(update.contains(&("name".to_string(), "X".to_string())));
    }

    #[test]
    fn test_arrays_are_comma_joined() {
        let f = fields(json!({"idLabels": ["a", "b"], "closed": true, "due": null}));
        let q = to_query(&f, Op::Update);
        assert!(q.contains(&("idLabels".to_string(), "a,b".to_string())));
        assert!(q.contains(&("closed".to_string(), "true".to_string())));
        assert!(q.contains(&("due".to_string(), String::new())));
    }

    #[test]
    fn test_item_paths() {
        let b = TrelloBackend::new("https://api.trello.com/1/", "k", "t", Duration::from_secs(1)).unwrap();
        let board = ResourceRef::new(ResourceKind::Board, "b1");
        assert_eq!(b.item_path(&board).unwrap(), "/boards/b1");

        let item = ResourceRef::new(ResourceKind::CheckItem, "i1")
            .under(Parent::new(ResourceKind::Checklist, "c1"));
        assert_eq!(b.item_path(&item).unwrap(), "/checklists/c1/checkItems/i1");

        let item = ResourceRef::new(ResourceKind::CheckItem, "i1")
            .under(Parent::new(ResourceKind::Card, "k1"));
        assert_eq!(b.item_path(&item).unwrap(), "/cards/k1/checkItem/i1");

        let orphan = ResourceRef::new(ResourceKind::Attachment, "a1");
        assert!(b.item_path(&orphan).is_err());
    }

    #[test]
    fn test_missing_credentials() {
        assert!(TrelloBackend::new("https://x", "", "t", Duration::from_secs(1)).is_err());
    }
}
