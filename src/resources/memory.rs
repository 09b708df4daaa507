//! 进程内资源后端
//!
//! 默认后端，也是测试使用的后端。行为尽量贴近 Trello：24 位十六进制 id、更新时深度合并嵌套对象、
//! 创建看板时可带默认列表与默认标签、删除看板级联删除其下所有资源。

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::resources::backend::{BackendError, Fields, ResourceBackend};
use crate::resources::{ListScope, Parent, ResourceKind, ResourceRef};

const DEFAULT_LISTS: [&str; 3] = ["To Do", "Doing", "Done"];
const DEFAULT_LABEL_COLORS: [&str; 6] = ["green", "yellow", "orange", "red", "purple", "blue"];
/// 创建选项，不作为字段保存
const CREATE_OPTIONS: [&str; 3] = ["defaultLists", "defaultLabels", "defaultCards"];
/// 子资源从父记录继承的关联字段
const INHERITED_LINKS: [&str; 4] = ["idBoard", "idList", "idCard", "idChecklist"];
/// 级联删除时检查的关联字段；删除工作区带走其下看板
const LINK_FIELDS: [&str; 5] = ["idOrganization", "idBoard", "idList", "idCard", "idChecklist"];

struct Record {
    kind: ResourceKind,
    seq: u64,
    data: Fields,
}

#[derive(Default)]
struct Store {
    records: HashMap<String, Record>,
    next_seq: u64,
}

impl Store {
    fn find(&self, kind: ResourceKind, id: &str) -> Result<&Record, BackendError> {
        self.records
            .get(id)
            .filter(|r| r.kind == kind)
            .ok_or_else(|| not_found(kind, id))
    }

    fn insert(&mut self, kind: ResourceKind, data: Fields) -> Value {
        let id = data
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.next_seq += 1;
        let seq = self.next_seq;
        let out = Value::Object(data.clone());
        self.records.insert(id, Record { kind, seq, data });
        out
    }

    /// 按创建顺序列出满足条件的记录
    fn collect<F>(&self, pred: F) -> Vec<Value>
    where
        F: Fn(&Record) -> bool,
    {
        let mut hits: Vec<&Record> = self.records.values().filter(|r| pred(r)).collect();
        hits.sort_by_key(|r| r.seq);
        hits.into_iter().map(|r| Value::Object(r.data.clone())).collect()
    }

    /// 清单附带其清单项
    fn render(&self, record: &Record) -> Value {
        let mut data = record.data.clone();
        if record.kind == ResourceKind::Checklist {
            let id = data.get("id").cloned().unwrap_or(Value::Null);
            let items = self.collect(|r| {
                r.kind == ResourceKind::CheckItem && r.data.get("idChecklist") == Some(&id)
            });
            data.insert("checkItems".to_string(), Value::Array(items));
        }
        Value::Object(data)
    }
}

fn not_found(kind: ResourceKind, id: &str) -> BackendError {
    BackendError::NotFound(format!("The requested {} '{}' does not exist", kind.label(), id))
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..24].to_string()
}

fn deep_merge(target: &mut Fields, patch: Fields) {
    for (key, value) in patch {
        if let Value::Object(p) = value {
            if let Some(Value::Object(t)) = target.get_mut(&key) {
                deep_merge(t, p);
                continue;
            }
            target.insert(key, Value::Object(p));
        } else {
            target.insert(key, value);
        }
    }
}

fn defaults(kind: ResourceKind, id: &str) -> Fields {
    let v = match kind {
        ResourceKind::Board => json!({
            "name": "",
            "desc": "",
            "closed": false,
            "starred": false,
            "url": format!("https://trello.com/b/{}", &id[..8]),
            "dateLastActivity": chrono::Utc::now().to_rfc3339(),
            "prefs": {
                "permissionLevel": "private",
                "background": "blue",
                "backgroundBrightness": "dark"
            }
        }),
        ResourceKind::List => json!({"name": "", "closed": false}),
        ResourceKind::Card => json!({
            "name": "",
            "desc": "",
            "closed": false,
            "due": null,
            "dueComplete": false,
            "idLabels": [],
            "url": format!("https://trello.com/c/{}", &id[..8]),
        }),
        ResourceKind::Label => json!({"name": "", "color": null}),
        ResourceKind::Attachment => json!({"name": "", "url": ""}),
        ResourceKind::Checklist => json!({"name": ""}),
        ResourceKind::CheckItem => json!({"name": "", "state": "incomplete"}),
        ResourceKind::Workspace => json!({"name": "", "displayName": "", "desc": "", "website": null}),
    };
    let mut fields = match v {
        Value::Object(m) => m,
        _ => Fields::new(),
    };
    fields.insert("id".to_string(), Value::String(id.to_string()));
    fields
}

fn matches_filter(data: &Fields, filter: &str) -> bool {
    let flag = |k: &str| data.get(k).and_then(Value::as_bool).unwrap_or(false);
    match filter {
        "open" => !flag("closed"),
        "closed" => flag("closed"),
        "starred" => flag("starred"),
        "unstarred" => !flag("starred"),
        "none" => false,
        _ => true,
    }
}

/// 进程内后端
#[derive(Default)]
pub struct MemoryBackend {
    store: RwLock<Store>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前保存的记录数
    pub async fn len(&self) -> usize {
        self.store.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ResourceBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(
        &self,
        kind: ResourceKind,
        parent: Option<&Parent>,
        mut fields: Fields,
    ) -> Result<Value, BackendError> {
        let mut store = self.store.write().await;

        let mut inherited = Fields::new();
        match (kind.required_parent(), parent) {
            (Some(expected), Some(p)) if p.kind == expected => {
                let parent_rec = store.find(p.kind, &p.id)?;
                inherited.insert(p.kind.link_field().to_string(), json!(p.id));
                // 卡片、清单等记住所在看板，便于级联删除与按看板列出
                for link in INHERITED_LINKS {
                    if let Some(v) = parent_rec.data.get(link) {
                        inherited.entry(link.to_string()).or_insert_with(|| v.clone());
                    }
                }
            }
            (Some(expected), _) => {
                return Err(BackendError::Rejected(format!(
                    "{} is required to create a {}",
                    expected.link_field(),
                    kind.label()
                )));
            }
            (None, Some(p)) if p.kind == ResourceKind::Workspace => {
                store.find(p.kind, &p.id)?;
                inherited.insert("idOrganization".to_string(), json!(p.id));
            }
            (None, _) => {}
        }

        let with_lists = fields
            .get("defaultLists")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let with_labels = fields
            .get("defaultLabels")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        for opt in CREATE_OPTIONS {
            fields.remove(opt);
        }
        fields.remove("id");

        let id = new_id();
        let mut data = defaults(kind, &id);
        deep_merge(&mut data, inherited);
        deep_merge(&mut data, fields);
        let created = store.insert(kind, data);

        if kind == ResourceKind::Board {
            if with_lists {
                for (pos, name) in DEFAULT_LISTS.iter().enumerate() {
                    let list_id = new_id();
                    let mut list = defaults(ResourceKind::List, &list_id);
                    list.insert("name".to_string(), json!(name));
                    list.insert("idBoard".to_string(), json!(id));
                    list.insert("pos".to_string(), json!((pos + 1) * 16384));
                    store.insert(ResourceKind::List, list);
                }
            }
            if with_labels {
                for color in DEFAULT_LABEL_COLORS {
                    let mut label = defaults(ResourceKind::Label, &new_id());
                    label.insert("color".to_string(), json!(color));
                    label.insert("idBoard".to_string(), json!(id));
                    store.insert(ResourceKind::Label, label);
                }
            }
        }

        Ok(created)
    }

    async fn get(&self, target: &ResourceRef) -> Result<Value, BackendError> {
        let store = self.store.read().await;
        let record = store.find(target.kind, &target.id)?;
        Ok(store.render(record))
    }

    async fn update(&self, target: &ResourceRef, mut fields: Fields) -> Result<Value, BackendError> {
        let mut store = self.store.write().await;
        store.find(target.kind, &target.id)?;
        fields.remove("id");

        // 卡片换列表时同步所属看板
        if target.kind == ResourceKind::Card {
            if let Some(list_id) = fields.get("idList").and_then(Value::as_str) {
                let list = store.find(ResourceKind::List, list_id)?;
                if let Some(board) = list.data.get("idBoard").cloned() {
                    fields.insert("idBoard".to_string(), board);
                }
            }
        }

        let record = store
            .records
            .get_mut(&target.id)
            .ok_or_else(|| not_found(target.kind, &target.id))?;
        deep_merge(&mut record.data, fields);
        if record.kind == ResourceKind::Board {
            record.data.insert(
                "dateLastActivity".to_string(),
                json!(chrono::Utc::now().to_rfc3339()),
            );
        }
        let record = store.find(target.kind, &target.id)?;
        Ok(store.render(record))
    }

    async fn delete(&self, target: &ResourceRef) -> Result<(), BackendError> {
        let mut store = self.store.write().await;
        store.find(target.kind, &target.id)?;

        let mut doomed = vec![target.id.clone()];
        let mut i = 0;
        while i < doomed.len() {
            let current = Value::String(doomed[i].clone());
            let children: Vec<String> = store
                .records
                .iter()
                .filter(|(id, r)| {
                    !doomed.contains(*id)
                        && LINK_FIELDS.iter().any(|f| r.data.get(*f) == Some(&current))
                })
                .map(|(id, _)| id.clone())
                .collect();
            doomed.extend(children);
            i += 1;
        }
        for id in &doomed {
            store.records.remove(id);
        }
        tracing::debug!(kind = target.kind.label(), id = %target.id, removed = doomed.len(), "Deleted resource");
        Ok(())
    }

    async fn list(&self, kind: ResourceKind, scope: &ListScope) -> Result<Vec<Value>, BackendError> {
        let store = self.store.read().await;
        let filter = scope.filter();
        match scope {
            ListScope::Mine { .. } => Ok(store.collect(|r| r.kind == kind && matches_filter(&r.data, filter))),
            ListScope::Under { parent, .. } => {
                store.find(parent.kind, &parent.id)?;
                let link = parent.kind.link_field();
                let parent_id = Value::String(parent.id.clone());
                Ok(store.collect(|r| {
                    r.kind == kind
                        && r.data.get(link) == Some(&parent_id)
                        && matches_filter(&r.data, filter)
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(v: Value) -> Fields {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn id_of(v: &Value) -> String {
        v["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_create_board_with_defaults() {
        let backend = MemoryBackend::new();
        let board = backend
            .create(ResourceKind::Board, None, fields(json!({"name": "Roadmap"})))
            .await
            .unwrap();

        let id = id_of(&board);
        assert_eq!(id.len(), 24);
        assert_eq!(board["name"], "Roadmap");
        assert_eq!(board["prefs"]["permissionLevel"], "private");
        assert!(board.get("defaultLists").is_none());

        let parent = Parent::new(ResourceKind::Board, &id);
        let scope = ListScope::Under { parent, filter: "all".into() };
        let lists = backend.list(ResourceKind::List, &scope).await.unwrap();
        let names: Vec<_> = lists.iter().map(|l| l["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["To Do", "Doing", "Done"]);
        assert_eq!(backend.list(ResourceKind::Label, &scope).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_update_deep_merges_prefs() {
        let backend = MemoryBackend::new();
        let board = backend
            .create(
                ResourceKind::Board,
                None,
                fields(json!({"name": "A", "defaultLists": false, "defaultLabels": false})),
            )
            .await
            .unwrap();
        let target = ResourceRef::new(ResourceKind::Board, id_of(&board));

        let updated = backend
            .update(&target, fields(json!({"desc": "new", "prefs": {"background": "green"}})))
            .await
            .unwrap();
        assert_eq!(updated["name"], "A");
        assert_eq!(updated["desc"], "new");
        assert_eq!(updated["prefs"]["background"], "green");
        assert_eq!(updated["prefs"]["permissionLevel"], "private");
    }

    #[tokio::test]
    async fn test_child_requires_existing_parent() {
        let backend = MemoryBackend::new();
        let err = backend
            .create(ResourceKind::List, None, fields(json!({"name": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));

        let missing = Parent::new(ResourceKind::Board, "aaaaaaaaaaaaaaaaaaaaaaaa");
        let err = backend
            .create(ResourceKind::List, Some(&missing), fields(json!({"name": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_board_cascades() {
        let backend = MemoryBackend::new();
        let board = backend
            .create(ResourceKind::Board, None, fields(json!({"name": "B"})))
            .await
            .unwrap();
        let board_id = id_of(&board);
        let scope = ListScope::Under {
            parent: Parent::new(ResourceKind::Board, &board_id),
            filter: "all".into(),
        };
        let list_id = id_of(&backend.list(ResourceKind::List, &scope).await.unwrap()[0]);
        let card = backend
            .create(
                ResourceKind::Card,
                Some(&Parent::new(ResourceKind::List, &list_id)),
                fields(json!({"name": "task"})),
            )
            .await
            .unwrap();
        assert_eq!(card["idBoard"], json!(board_id));

        backend
            .delete(&ResourceRef::new(ResourceKind::Board, &board_id))
            .await
            .unwrap();
        assert!(backend.is_empty().await);

        let err = backend
            .get(&ResourceRef::new(ResourceKind::Card, id_of(&card)))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_workspace_cascades_to_boards() {
        let backend = MemoryBackend::new();
        let workspace = backend
            .create(ResourceKind::Workspace, None, fields(json!({"displayName": "Team"})))
            .await
            .unwrap();
        let ws_id = id_of(&workspace);
        let board = backend
            .create(
                ResourceKind::Board,
                Some(&Parent::new(ResourceKind::Workspace, &ws_id)),
                fields(json!({"name": "Inside"})),
            )
            .await
            .unwrap();
        assert_eq!(board["idOrganization"], json!(ws_id));
        let outside = backend
            .create(ResourceKind::Board, None, fields(json!({"name": "Outside"})))
            .await
            .unwrap();

        let lists = backend
            .list(
                ResourceKind::List,
                &ListScope::Under {
                    parent: Parent::new(ResourceKind::Board, id_of(&board)),
                    filter: "all".into(),
                },
            )
            .await
            .unwrap();
        assert!(lists[0].get("idOrganization").is_none());

        backend
            .delete(&ResourceRef::new(ResourceKind::Workspace, &ws_id))
            .await
            .unwrap();
        let err = backend
            .get(&ResourceRef::new(ResourceKind::Board, id_of(&board)))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
        let list_err = backend
            .get(&ResourceRef::new(ResourceKind::List, id_of(&lists[0])))
            .await
            .unwrap_err();
        assert!(matches!(list_err, BackendError::NotFound(_)));
        assert!(backend
            .get(&ResourceRef::new(ResourceKind::Board, id_of(&outside)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_list_filters_and_kind_isolation() {
        let backend = MemoryBackend::new();
        let opts = json!({"defaultLists": false, "defaultLabels": false});
        let mut a = fields(opts.clone());
        a.insert("name".into(), json!("open one"));
        let mut b = fields(opts);
        b.insert("name".into(), json!("closed one"));
        b.insert("closed".into(), json!(true));
        let first = backend.create(ResourceKind::Board, None, a).await.unwrap();
        backend.create(ResourceKind::Board, None, b).await.unwrap();

        let list = |f: &str| ListScope::Mine { filter: f.to_string() };
        assert_eq!(backend.list(ResourceKind::Board, &list("all")).await.unwrap().len(), 2);
        assert_eq!(backend.list(ResourceKind::Board, &list("open")).await.unwrap().len(), 1);
        assert_eq!(backend.list(ResourceKind::Board, &list("closed")).await.unwrap().len(), 1);
        assert!(backend.list(ResourceKind::Board, &list("none")).await.unwrap().is_empty());

        // 同一个 id 按错误种类查找视为不存在
        let err = backend
            .get(&ResourceRef::new(ResourceKind::List, id_of(&first)))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_checklist_renders_items() {
        let backend = MemoryBackend::new();
        let board = backend
            .create(ResourceKind::Board, None, fields(json!({"name": "B"})))
            .await
            .unwrap();
        let list = backend
            .create(
                ResourceKind::List,
                Some(&Parent::new(ResourceKind::Board, id_of(&board))),
                fields(json!({"name": "L"})),
            )
            .await
            .unwrap();
        let card = backend
            .create(
                ResourceKind::Card,
                Some(&Parent::new(ResourceKind::List, id_of(&list))),
                fields(json!({"name": "C"})),
            )
            .await
            .unwrap();
        let checklist = backend
            .create(
                ResourceKind::Checklist,
                Some(&Parent::new(ResourceKind::Card, id_of(&card))),
                fields(json!({"name": "Steps"})),
            )
            .await
            .unwrap();
        backend
            .create(
                ResourceKind::CheckItem,
                Some(&Parent::new(ResourceKind::Checklist, id_of(&checklist))),
                fields(json!({"name": "one"})),
            )
            .await
            .unwrap();

        let got = backend
            .get(&ResourceRef::new(ResourceKind::Checklist, id_of(&checklist)))
            .await
            .unwrap();
        assert_eq!(got["checkItems"][0]["name"], "one");
        assert_eq!(got["checkItems"][0]["state"], "incomplete");
        assert_eq!(got["idBoard"], board["id"]);
    }
}
