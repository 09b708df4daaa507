//! 工具参数 JSON Schema 生成（schemars）
//!
//! 参数类型即是校验规则：同一个 struct 既用于 serde 反序列化，也用于导出给模型的 schema。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde_json::Value;

/// 返回参数类型 A 的 JSON Schema；子 schema 内联，便于模型直接阅读
pub fn schema_value<A: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let schema = settings.into_generator().into_root_schema_for::<A>();
    serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}
