//! 工具参数 JSON Schema（schemars 从参数结构体自动生成）
//!
//! 生成结果同时用于能力描述表与注册表的参数校验，两者不会不同步。

use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

/// 生成参数 schema，去掉对模型无用的 `$schema` / `title`
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| empty_object_schema());
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// 无参数工具的 schema
pub fn empty_object_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// 按 schema 校验参数：必填项、未声明的参数（additionalProperties=false 时）、基础类型
pub fn validate_arguments(schema: &Value, args: &Map<String, Value>) -> Result<(), String> {
    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(name) {
                return Err(format!("missing required parameter `{name}`"));
            }
        }
    }

    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
    for (name, value) in args {
        match properties.and_then(|p| p.get(name)) {
            Some(prop) => {
                if !type_matches(prop.get("type"), value) {
                    let expected = prop.get("type").map(|t| t.to_string()).unwrap_or_default();
                    return Err(format!("parameter `{name}` must be of type {expected}"));
                }
            }
            None if closed => return Err(format!("unexpected parameter `{name}`")),
            None => {}
        }
    }
    Ok(())
}

fn type_matches(declared: Option<&Value>, value: &Value) -> bool {
    match declared {
        Some(Value::String(t)) => json_type_is(t, value),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| json_type_is(t, value)),
        _ => true,
    }
}

fn json_type_is(t: &str, value: &Value) -> bool {
    match t {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}
