//! 可观测性：日志订阅初始化与 Tracer 协作方
//!
//! Tracer 只追加、即发即弃；核心层不读取它的返回值。

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::core::AgentError;

/// 初始化日志：默认 info，可通过 RUST_LOG 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// 单条追踪事件
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub data: Value,
}

/// Tracer 协作方
pub trait Tracer: Send + Sync {
    fn log(&self, kind: &str, data: Value);
}

/// 丢弃所有事件
#[derive(Debug, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn log(&self, _kind: &str, _data: Value) {}
}

/// 转发到 tracing（debug 级别）
#[derive(Debug, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn log(&self, kind: &str, data: Value) {
        tracing::debug!(kind, data = %data, "trace");
    }
}

/// 内存 Tracer：保存全部事件，供 demo 打印与测试断言
#[derive(Debug, Default)]
pub struct MemoryTracer {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    /// 指定 kind 的全部事件数据
    pub fn data_of(&self, kind: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.data)
            .collect()
    }

    /// 所有 fallback 事件里的 error 标签（按发生顺序）
    pub fn fallbacks(&self) -> Vec<String> {
        self.data_of("fallback")
            .iter()
            .filter_map(|d| d.get("error").and_then(Value::as_str).map(String::from))
            .collect()
    }

    pub fn tail(&self, n: usize) -> Vec<TraceEvent> {
        let events = self.events();
        let start = events.len().saturating_sub(n);
        events[start..].to_vec()
    }

    pub fn dump_json(&self) -> String {
        serde_json::to_string_pretty(&self.events()).unwrap_or_else(|_| "[]".to_string())
    }
}

impl Tracer for MemoryTracer {
    fn log(&self, kind: &str, data: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(TraceEvent {
                timestamp: Utc::now(),
                kind: kind.to_string(),
                data,
            });
        }
    }
}

/// 记录一次降级：tracing warn + `fallback` 追踪事件（error 为错误标签）
pub fn record_fallback(tracer: &dyn Tracer, stage: &str, err: &AgentError) {
    tracing::warn!(stage, error = err.tag(), detail = %err, "fallback");
    tracer.log(
        "fallback",
        json!({"stage": stage, "error": err.tag(), "detail": err.to_string()}),
    );
}

/// 截断到指定字符数（按字符而非字节，避免切断多字节字符）
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}
