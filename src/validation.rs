//! 请求体校验
//!
//! 在任何昂贵操作（限流计数、模型调用、后端请求）之前把原始请求体变成强类型值；
//! 失败时返回 InvalidInput，消息指出第一处结构性错误。

use axum::http::{header, HeaderMap};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::chat::{ChatRequest, MessagePart, Role};
use crate::core::AppError;
use crate::forms::{FormAction, ResourceType};

/// 非空字符串校验
pub trait ValidateNonEmpty {
    fn validate_non_empty(&self, field_name: &str) -> Result<(), AppError>;
}

impl ValidateNonEmpty for str {
    fn validate_non_empty(&self, field_name: &str) -> Result<(), AppError> {
        if self.trim().is_empty() {
            return Err(AppError::invalid(format!("{field_name} must not be empty")));
        }
        Ok(())
    }
}

impl ValidateNonEmpty for String {
    fn validate_non_empty(&self, field_name: &str) -> Result<(), AppError> {
        self.as_str().validate_non_empty(field_name)
    }
}

impl<T: ValidateNonEmpty> ValidateNonEmpty for Option<T> {
    fn validate_non_empty(&self, field_name: &str) -> Result<(), AppError> {
        match self {
            Some(value) => value.validate_non_empty(field_name),
            None => Err(AppError::invalid(format!("{field_name} is required"))),
        }
    }
}

/// 检查 Content-Type 并把请求体解析为 JSON 对象
pub fn parse_json_body(headers: &HeaderMap, body: &[u8]) -> Result<Value, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if essence != "application/json" {
        let shown = if content_type.is_empty() {
            "none".to_string()
        } else {
            content_type.to_string()
        };
        return Err(AppError::UnsupportedMediaType(format!(
            "Content-Type must be application/json (got {shown})"
        )));
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::invalid("Request body is required"));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::invalid(format!("Malformed JSON body: {e}")))?;
    if !value.is_object() {
        return Err(AppError::invalid("Request body must be a JSON object"));
    }
    Ok(value)
}

/// 把已解析的 JSON 反序列化为目标类型，serde 的错误信息即第一处违例
pub fn parse_body<T: DeserializeOwned>(value: Value) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(|e| AppError::invalid(e.to_string()))
}

fn object<'a>(v: &'a Value, path: &str) -> Result<&'a Map<String, Value>, AppError> {
    v.as_object()
        .ok_or_else(|| AppError::invalid(format!("{path} must be an object")))
}

fn string_field<'a>(obj: &'a Map<String, Value>, key: &str, path: &str) -> Result<&'a str, AppError> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(AppError::invalid(format!("{path}.{key} is required"))),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(AppError::invalid(format!("{path}.{key} must be a string"))),
    }
}

fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

/// 校验 POST /api/chat 请求体
///
/// 逐条检查 messages：role 合法、parts 非空、part 类型可识别且带齐该类型的必填字段；
/// tool-result 必须对应此前出现过的 tool-call（有 toolCallId 时按 id，否则按工具名）。
pub fn validate_chat_request(body: &Value) -> Result<ChatRequest, AppError> {
    let root = object(body, "body")?;
    let messages = match root.get("messages") {
        None | Some(Value::Null) => return Err(AppError::invalid("messages is required")),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(AppError::invalid("messages must be an array")),
    };
    if messages.is_empty() {
        return Err(AppError::invalid("messages must contain at least one message"));
    }

    // 尚未得到结果的 tool-call：(toolCallId, toolName)
    let mut open_calls: Vec<(Option<String>, String)> = Vec::new();

    for (i, message) in messages.iter().enumerate() {
        let path = format!("messages[{i}]");
        let m = object(message, &path)?;

        let role = string_field(m, "role", &path)?;
        if !Role::ALL.contains(&role) {
            return Err(AppError::invalid(format!(
                "{path}.role must be one of {}",
                Role::ALL.join(", ")
            )));
        }

        let parts = match m.get("parts") {
            None | Some(Value::Null) => return Err(AppError::invalid(format!("{path}.parts is required"))),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(AppError::invalid(format!("{path}.parts must be an array"))),
        };
        if parts.is_empty() {
            return Err(AppError::invalid(format!("{path}.parts must not be empty")));
        }

        for (j, part) in parts.iter().enumerate() {
            let ppath = format!("{path}.parts[{j}]");
            let p = object(part, &ppath)?;
            let ty = string_field(p, "type", &ppath)?;
            match ty {
                "text" => {
                    string_field(p, "text", &ppath)?.validate_non_empty(&format!("{ppath}.text"))?;
                }
                "tool-call" => {
                    let name = string_field(p, "toolName", &ppath)?;
                    name.validate_non_empty(&format!("{ppath}.toolName"))?;
                    if let Some(args) = present(p, "args") {
                        if !args.is_object() {
                            return Err(AppError::invalid(format!("{ppath}.args must be an object")));
                        }
                    }
                    let id = match present(p, "toolCallId") {
                        Some(_) => Some(string_field(p, "toolCallId", &ppath)?.to_string()),
                        None => None,
                    };
                    open_calls.push((id, name.to_string()));
                }
                "tool-result" => {
                    let name = string_field(p, "toolName", &ppath)?;
                    name.validate_non_empty(&format!("{ppath}.toolName"))?;
                    let has_result = present(p, "result").is_some();
                    let has_error = present(p, "error").is_some();
                    if has_result == has_error {
                        return Err(AppError::invalid(format!(
                            "{ppath} must carry exactly one of result or error"
                        )));
                    }
                    let id = match present(p, "toolCallId") {
                        Some(_) => Some(string_field(p, "toolCallId", &ppath)?),
                        None => None,
                    };
                    let matched = open_calls.iter().position(|(call_id, call_name)| match id {
                        Some(id) => call_id.as_deref() == Some(id),
                        None => call_name == name,
                    });
                    match matched {
                        Some(pos) => {
                            open_calls.remove(pos);
                        }
                        None => {
                            return Err(AppError::invalid(format!(
                                "{ppath} does not follow a matching tool-call for {name}"
                            )))
                        }
                    }
                }
                other => {
                    return Err(AppError::invalid(format!(
                        "{ppath}.type '{other}' is not one of {}",
                        MessagePart::TYPES.join(", ")
                    )))
                }
            }
        }
    }

    parse_body(body.clone())
}

/// POST /api/ui/generate-form 请求体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormRequest {
    pub resource_type: ResourceType,
    pub action: FormAction,
}

/// resourceType 与 action 必须存在且落在枚举内；null 视为缺失
pub fn validate_form_request(body: &Value) -> Result<FormRequest, AppError> {
    let root = object(body, "body")?;
    let resource_type = string_field(root, "resourceType", "body")?;
    let resource_type = ResourceType::parse(resource_type).ok_or_else(|| {
        AppError::invalid(format!(
            "resourceType '{resource_type}' is not one of {}",
            ResourceType::NAMES.join(", ")
        ))
    })?;
    let action = string_field(root, "action", "body")?;
    let action = FormAction::parse(action).ok_or_else(|| {
        AppError::invalid(format!(
            "action '{action}' is not one of {}",
            FormAction::NAMES.join(", ")
        ))
    })?;
    Ok(FormRequest {
        resource_type,
        action,
    })
}

/// POST|GET /api/trello 的 {operation, params}
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    pub operation: String,
    pub params: Value,
}

/// operation 必须是已注册的工具名；params 缺省为空对象，存在时必须是对象
pub fn validate_operation_request(body: &Value, known: &[String]) -> Result<OperationRequest, AppError> {
    let root = object(body, "body")?;
    let operation = string_field(root, "operation", "body")?.trim();
    operation.validate_non_empty("body.operation")?;
    if !known.iter().any(|name| name == operation) {
        return Err(AppError::invalid(format!("Invalid operation: {operation}")));
    }
    let params = match present(root, "params") {
        None => Value::Object(Map::new()),
        Some(v @ Value::Object(_)) => v.clone(),
        Some(_) => return Err(AppError::invalid("body.params must be an object")),
    };
    Ok(OperationRequest {
        operation: operation.to_string(),
        params,
    })
}

/// 查询串形式的操作请求：operation 之外的键都进入 params，含逗号的值拆成数组
pub fn operation_from_query<'a, I>(pairs: I) -> Value
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut root = Map::new();
    let mut params = Map::new();
    for (key, value) in pairs {
        if key == "operation" {
            root.insert(key.to_string(), Value::String(value.to_string()));
        } else if value.contains(',') {
            let parts = value.split(',').map(|p| Value::String(p.trim().to_string())).collect();
            params.insert(key.to_string(), Value::Array(parts));
        } else {
            params.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    root.insert("params".to_string(), Value::Object(params));
    Value::Object(root)
}
