//! 看板：强类型模型、创建/更新输入与列表过滤器
//!
//! HTTP 路由与看板工具共用这些类型。输入同时接受扁平的 `prefs_*` 字段（Trello 查询参数风格）
//! 与嵌套的 `prefs` 对象，落到后端前统一转换为嵌套形状。

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::core::AppError;
use crate::resources::backend::Fields;

fn null_to_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Option::unwrap_or_default)
}

/// 看板可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Private,
    Public,
    Org,
    Enterprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Brightness {
    Dark,
    Light,
}

/// 返回给客户端的 prefs（后端其余偏好字段被忽略）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardPrefs {
    #[serde(default)]
    pub permission_level: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub background_brightness: Option<String>,
}

/// 看板
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub desc: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub closed: bool,
    #[serde(default, deserialize_with = "null_to_default")]
    pub starred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_last_activity: Option<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub prefs: BoardPrefs,
}

impl Board {
    /// 从后端记录解析；缺 id 视为后端响应异常
    pub fn from_record(record: Value) -> Result<Self, AppError> {
        serde_json::from_value(record)
            .map_err(|e| AppError::Upstream(format!("malformed board record: {e}")))
    }
}

/// 嵌套形式的 prefs 输入
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrefsInput {
    #[serde(default)]
    pub permission_level: Option<PermissionLevel>,
    /// 颜色名（blue、green……）或自定义背景 id
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub background_brightness: Option<Brightness>,
}

/// 创建看板
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardCreate {
    /// 看板名称（必填，非空）
    pub name: String,
    #[serde(default, alias = "description")]
    pub desc: Option<String>,
    /// 是否创建 To Do / Doing / Done 三个默认列表（默认 true）
    #[serde(default)]
    pub default_lists: Option<bool>,
    #[serde(default)]
    pub default_labels: Option<bool>,
    #[serde(default)]
    pub default_cards: Option<bool>,
    #[serde(default, alias = "organizationId", alias = "workspaceId")]
    pub id_organization: Option<String>,
    #[serde(default, rename = "prefs_permissionLevel", alias = "visibility")]
    pub permission_level: Option<PermissionLevel>,
    #[serde(default, rename = "prefs_background", alias = "background")]
    pub background: Option<String>,
    #[serde(default, rename = "prefs_backgroundBrightness")]
    pub background_brightness: Option<Brightness>,
    #[serde(default)]
    pub prefs: Option<PrefsInput>,
}

/// 部分更新：只有出现的字段会被修改
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "description")]
    pub desc: Option<String>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default)]
    pub starred: Option<bool>,
    #[serde(default, alias = "organizationId", alias = "workspaceId")]
    pub id_organization: Option<String>,
    #[serde(default, rename = "prefs_permissionLevel", alias = "visibility")]
    pub permission_level: Option<PermissionLevel>,
    #[serde(default, rename = "prefs_background", alias = "background")]
    pub background: Option<String>,
    #[serde(default, rename = "prefs_backgroundBrightness")]
    pub background_brightness: Option<Brightness>,
    #[serde(default)]
    pub prefs: Option<PrefsInput>,
}

/// 扁平字段优先，其次嵌套 prefs
fn prefs_fields(
    level: Option<PermissionLevel>,
    background: Option<String>,
    brightness: Option<Brightness>,
    nested: Option<&PrefsInput>,
) -> Fields {
    let mut prefs = Fields::new();
    let level = level.or(nested.and_then(|p| p.permission_level));
    let background = background
        .filter(|b| !b.trim().is_empty())
        .or_else(|| nested.and_then(|p| p.background.clone()));
    let brightness = brightness.or(nested.and_then(|p| p.background_brightness));
    if let Some(v) = level {
        prefs.insert("permissionLevel".into(), json!(v));
    }
    if let Some(v) = background {
        prefs.insert("background".into(), json!(v));
    }
    if let Some(v) = brightness {
        prefs.insert("backgroundBrightness".into(), json!(v));
    }
    prefs
}

impl BoardCreate {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::invalid("Board name is required"));
        }
        if self.name.chars().count() > 16384 {
            return Err(AppError::invalid("Board name is too long"));
        }
        Ok(())
    }

    /// 转为后端字段（规范形状）
    pub fn into_fields(self) -> Fields {
        let mut f = Fields::new();
        f.insert("name".into(), json!(self.name.trim()));
        if let Some(desc) = &self.desc {
            f.insert("desc".into(), json!(desc));
        }
        f.insert("defaultLists".into(), json!(self.default_lists.unwrap_or(true)));
        f.insert("defaultLabels".into(), json!(self.default_labels.unwrap_or(true)));
        if let Some(cards) = self.default_cards {
            f.insert("defaultCards".into(), json!(cards));
        }
        // idOrganization 作为父资源传给后端
        let prefs = prefs_fields(
            self.permission_level,
            self.background.clone(),
            self.background_brightness,
            self.prefs.as_ref(),
        );
        if !prefs.is_empty() {
            f.insert("prefs".into(), Value::Object(prefs));
        }
        f
    }
}

impl BoardUpdate {
    /// 转为后端字段；没有任何可更新字段时报 InvalidInput
    pub fn into_fields(self) -> Result<Fields, AppError> {
        let mut f = Fields::new();
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(AppError::invalid("Board name must not be empty"));
            }
            f.insert("name".into(), json!(name.trim()));
        }
        if let Some(desc) = &self.desc {
            f.insert("desc".into(), json!(desc));
        }
        if let Some(closed) = self.closed {
            f.insert("closed".into(), json!(closed));
        }
        if let Some(starred) = self.starred {
            f.insert("starred".into(), json!(starred));
        }
        if let Some(org) = &self.id_organization {
            f.insert("idOrganization".into(), json!(org));
        }
        let prefs = prefs_fields(
            self.permission_level,
            self.background.clone(),
            self.background_brightness,
            self.prefs.as_ref(),
        );
        if !prefs.is_empty() {
            f.insert("prefs".into(), Value::Object(prefs));
        }
        if f.is_empty() {
            return Err(AppError::invalid(
                "At least one updatable field (name, desc, closed, prefs_*) is required",
            ));
        }
        Ok(f)
    }
}

/// 看板列表过滤器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BoardFilter {
    #[default]
    All,
    Closed,
    None,
    Open,
    Starred,
    Unstarred,
}

impl BoardFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            BoardFilter::All => "all",
            BoardFilter::Closed => "closed",
            BoardFilter::None => "none",
            BoardFilter::Open => "open",
            BoardFilter::Starred => "starred",
            BoardFilter::Unstarred => "unstarred",
        }
    }

    /// 宽松解析：无法识别的值回落到 All（读路径优先可用），并返回是否发生了回落
    pub fn parse_lenient(raw: Option<&str>) -> (Self, bool) {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return (BoardFilter::All, false);
        };
        match raw.to_ascii_lowercase().as_str() {
            "all" => (BoardFilter::All, false),
            "closed" => (BoardFilter::Closed, false),
            "none" => (BoardFilter::None, false),
            "open" => (BoardFilter::Open, false),
            "starred" => (BoardFilter::Starred, false),
            "unstarred" => (BoardFilter::Unstarred, false),
            _ => (BoardFilter::All, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_accepts_flat_prefs() {
        let input: BoardCreate = serde_json::from_value(json!({
            "name": " Sprint ",
            "desc": "d",
            "defaultLists": false,
            "prefs_permissionLevel": "private",
            "prefs_background": "blue",
            "prefs_backgroundBrightness": "light"
        }))
        .unwrap();
        input.validate().unwrap();
        let f = input.into_fields();
        assert_eq!(f["name"], "Sprint");
        assert_eq!(f["defaultLists"], false);
        assert_eq!(f["defaultLabels"], true);
        assert_eq!(
            f["prefs"],
            json!({"permissionLevel": "private", "background": "blue", "backgroundBrightness": "light"})
        );
    }

    #[test]
    fn test_create_type_checks_but_allows_custom_background() {
        let custom: BoardCreate = serde_json::from_value(json!({
            "name": "x",
            "prefs_background": "5f1a2b3c4d5e6f7a8b9c0d1e"
        }))
        .unwrap();
        let f = custom.into_fields();
        assert_eq!(f["prefs"]["background"], "5f1a2b3c4d5e6f7a8b9c0d1e");

        let magenta: BoardCreate =
            serde_json::from_value(json!({"name": "x", "prefs_background": "magenta"})).unwrap();
        assert_eq!(magenta.into_fields()["prefs"]["background"], "magenta");

        let wrong_type: Result<BoardCreate, _> =
            serde_json::from_value(json!({"name": "x", "prefs_background": 7}));
        assert!(wrong_type.is_err());

        let bad_level: Result<BoardCreate, _> =
            serde_json::from_value(json!({"name": "x", "prefs_permissionLevel": "everyone"}));
        assert!(bad_level.is_err());

        let blank: BoardCreate = serde_json::from_value(json!({"name": "  "})).unwrap();
        assert!(blank.validate().is_err());

        let missing: Result<BoardCreate, _> = serde_json::from_value(json!({"desc": "no name"}));
        assert!(missing.is_err());
    }

    #[test]
    fn test_update_requires_some_field() {
        let empty: BoardUpdate = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(empty.into_fields(), Err(AppError::InvalidInput(_))));

        let nested: BoardUpdate =
            serde_json::from_value(json!({"prefs": {"permissionLevel": "org"}})).unwrap();
        let f = nested.into_fields().unwrap();
        assert_eq!(f["prefs"]["permissionLevel"], "org");
    }

    #[test]
    fn test_filter_falls_back() {
        assert_eq!(BoardFilter::parse_lenient(Some("OPEN")), (BoardFilter::Open, false));
        assert_eq!(BoardFilter::parse_lenient(Some("bogus")), (BoardFilter::All, true));
        assert_eq!(BoardFilter::parse_lenient(None), (BoardFilter::All, false));
    }

    #[test]
    fn test_board_tolerates_nulls() {
        let b = Board::from_record(json!({
            "id": "5f1a2b3c4d5e6f7a8b9c0d1e",
            "name": "X",
            "desc": null,
            "prefs": {"permissionLevel": "org", "backgroundImage": null}
        }))
        .unwrap();
        assert_eq!(b.desc, "");
        assert_eq!(b.prefs.permission_level.as_deref(), Some("org"));
        assert!(Board::from_record(json!({"name": "no id"})).is_err());
    }
}
