//! Responses API 客户端
//!
//! 通过 reqwest 调用任意兼容 `/responses` 的端点（可配置 base_url）。
//! 这里是唯一接触原始 output items 的地方：decode_response 把 function_call / tool_call / message /
//! output_text 等形态一次性归一化为 ConversationItem，核心层不再检查服务特有的结构。

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use serde_json::{json, Map, Value};

use crate::llm::{ModelError, ModelRequest, ModelResponse, ModelService, ModelStream, StreamEvent};
use crate::memory::ConversationItem;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Responses API 客户端：持有 HTTP 客户端、端点、模型名与 API Key
pub struct ResponsesClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ResponsesClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        Self {
            http: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &ModelRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "input": request.input.iter().map(encode_item).collect::<Vec<_>>(),
        });
        if let Some(tools) = &request.tools {
            body["tools"] = json!(tools);
            body["tool_choice"] = json!(request.tool_choice);
        }
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ModelError> {
        let resp = self
            .http
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ModelService for ResponsesClient {
    async fn respond(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let body = self.request_body(request, false);
        tracing::debug!(model = %self.model, items = request.input.len(), "responses request");
        let resp = self.post(&body).await?;
        let value: Value = resp
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;
        Ok(decode_response(&value))
    }

    async fn respond_stream(&self, request: &ModelRequest) -> Result<ModelStream, ModelError> {
        let body = self.request_body(request, true);
        let resp = self.post(&body).await?;
        Ok(sse_events(resp.bytes_stream()))
    }
}

/// ConversationItem -> Responses API input item
///
/// function_call 只回放 call_id，不带服务端 item id（与之配对的 reasoning 条目在解码时已丢弃）。
fn encode_item(item: &ConversationItem) -> Value {
    match item {
        ConversationItem::Message { role, content } => json!({
            "role": role.as_str(),
            "content": content,
        }),
        ConversationItem::ToolCall {
            name,
            arguments,
            call_id,
            ..
        } => json!({
            "type": "function_call",
            "name": name,
            "arguments": arguments,
            "call_id": call_id,
        }),
        ConversationItem::ToolOutput { call_id, output } => json!({
            "type": "function_call_output",
            "call_id": call_id,
            "output": output,
        }),
    }
}

/// 原始响应 -> ModelResponse；无法识别的 item（如 reasoning）被忽略
pub fn decode_response(value: &Value) -> ModelResponse {
    let output = value
        .get("output")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(normalize_item).collect())
        .unwrap_or_default();
    ModelResponse::new(output)
}

fn normalize_item(item: &Value) -> Option<ConversationItem> {
    match item.get("type").and_then(Value::as_str) {
        Some("function_call" | "tool_call") => Some(normalize_tool_call(item)),
        Some("message" | "output_text") => {
            let parts = text_parts(item.get("content").or_else(|| item.get("text")));
            let text: Vec<&str> = parts.iter().map(String::as_str).filter(|s| !s.trim().is_empty()).collect();
            Some(ConversationItem::assistant(text.join("\n")))
        }
        other => {
            tracing::debug!(item_type = ?other, "skipping unrecognized output item");
            None
        }
    }
}

fn normalize_tool_call(item: &Value) -> ConversationItem {
    let function = item.get("function").and_then(Value::as_object);
    let name = str_field(item, "name")
        .or_else(|| function.and_then(|f| f.get("name")).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();
    let arguments = item
        .get("arguments")
        .filter(|v| !v.is_null())
        .or_else(|| function.and_then(|f| f.get("arguments")))
        .map(arguments_text)
        .unwrap_or_else(|| "{}".to_string());

    ConversationItem::ToolCall {
        name,
        arguments,
        call_id: str_field(item, "call_id").map(String::from),
        item_id: str_field(item, "id").map(String::from),
    }
}

/// 参数可能是 JSON 文本，也可能已被解码为对象
fn arguments_text(v: &Value) -> String {
    match v {
        Value::String(s) if s.trim().is_empty() => "{}".to_string(),
        Value::String(s) => s.clone(),
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

fn str_field<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn text_parts(content: Option<&Value>) -> Vec<String> {
    match content {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => text_of_part(obj),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn text_of_part(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("type").and_then(Value::as_str) {
        Some("output_text" | "text") => Some(
            obj.get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        _ => None,
    }
}

struct SseState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamEvent, ModelError>>,
    finished: bool,
}

impl<S> SseState<S> {
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(data) = line.trim_end().strip_prefix("data:") {
                if let Some(event) = parse_sse_data(data.trim()) {
                    self.pending.push_back(event);
                }
            }
        }
    }
}

/// 把 SSE 字节流解析为 StreamEvent 流
fn sse_events<S, B>(bytes: S) -> ModelStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((event, st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    st.buffer.extend_from_slice(chunk.as_ref());
                    st.drain_lines();
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(ModelError::Stream(e.to_string())), st));
                }
                None => {
                    st.finished = true;
                    st.buffer.push(b'\n');
                    st.drain_lines();
                }
            }
        }
    }))
}

fn parse_sse_data(data: &str) -> Option<Result<StreamEvent, ModelError>> {
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(ModelError::Decode(e.to_string()))),
    };
    match value.get("type").and_then(Value::as_str) {
        Some("response.output_text.delta") => {
            let delta = value.get("delta").and_then(Value::as_str).unwrap_or_default();
            (!delta.is_empty()).then(|| Ok(StreamEvent::TextDelta(delta.to_string())))
        }
        Some("response.completed" | "response.done") => {
            let response = value.get("response").unwrap_or(&Value::Null);
            Some(Ok(StreamEvent::Completed(decode_response(response))))
        }
        Some("error" | "response.failed") => {
            let message = value
                .pointer("/error/message")
                .or_else(|| value.pointer("/response/error/message"))
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("stream failed");
            Some(Err(ModelError::Stream(message.to_string())))
        }
        _ => None,
    }
}
