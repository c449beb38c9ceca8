//! Router：判断请求走直接回答还是工具执行
//!
//! 调用一次模型（不带工具），期望得到 `{"route", "tools", "reason"}` JSON。
//! 任何解析失败都回退到 `react` 路线，保证流程不中断。

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::AgentError;
use crate::llm::{ModelRequest, ModelService};
use crate::memory::ConversationItem;
use crate::observability::{preview, record_fallback, Tracer};
use crate::react::parse::extract_json_object;
use crate::react::prompts::router_system;

pub const NO_REASON: &str = "no reason provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// 不需要工具，直接回答
    Direct,
    /// 进入 ReAct 工具循环
    React,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Direct => "direct",
            Route::React => "react",
        }
    }
}

/// 路由结果；tools 只包含已注册的工具名
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    pub route: Route,
    pub tools: BTreeSet<String>,
    pub reason: String,
}

impl RouteDecision {
    /// 解析失败时的默认决策
    pub fn fallback() -> Self {
        Self {
            route: Route::React,
            tools: BTreeSet::new(),
            reason: NO_REASON.to_string(),
        }
    }
}

/// 解析路由 JSON。route 缺失或非法视为整体失败；未知工具名丢弃
pub fn parse_decision(raw: &str, known_tools: &[String]) -> Result<RouteDecision, AgentError> {
    let obj = extract_json_object(raw)
        .ok_or_else(|| AgentError::RouterDecode(format!("no JSON object in: {}", preview(raw, 120))))?;

    let route = match obj.get("route").and_then(Value::as_str).map(str::trim) {
        Some("direct") => Route::Direct,
        Some("react") => Route::React,
        other => {
            return Err(AgentError::RouterDecode(format!(
                "invalid route: {}",
                other.unwrap_or("<missing>")
            )))
        }
    };

    Ok(RouteDecision {
        route,
        tools: known_subset(&obj, known_tools),
        reason: reason_of(&obj),
    })
}

fn known_subset(obj: &Map<String, Value>, known_tools: &[String]) -> BTreeSet<String> {
    let Some(list) = obj.get("tools").and_then(Value::as_array) else {
        return BTreeSet::new();
    };
    list.iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|name| known_tools.iter().any(|k| k == name))
        .map(String::from)
        .collect()
}

fn reason_of(obj: &Map<String, Value>) -> String {
    obj.get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(NO_REASON)
        .to_string()
}

pub struct Router {
    model: Arc<dyn ModelService>,
    known_tools: Vec<String>,
    tracer: Arc<dyn Tracer>,
}

impl Router {
    pub fn new(model: Arc<dyn ModelService>, known_tools: Vec<String>, tracer: Arc<dyn Tracer>) -> Self {
        Self {
            model,
            known_tools,
            tracer,
        }
    }

    /// 总是返回一个决策；模型失败或输出畸形时使用 [`RouteDecision::fallback`]
    pub async fn decide(&self, query: &str) -> RouteDecision {
        let request = ModelRequest::without_tools(vec![
            ConversationItem::system(router_system(&self.known_tools)),
            ConversationItem::user(query),
        ]);

        let decision = match self.model.respond(&request).await {
            Ok(response) => {
                let raw = response.collect_text();
                self.tracer.log("router.raw", json!({ "text": preview(&raw, 500) }));
                match parse_decision(&raw, &self.known_tools) {
                    Ok(d) => d,
                    Err(e) => {
                        record_fallback(self.tracer.as_ref(), "router", &e);
                        RouteDecision::fallback()
                    }
                }
            }
            Err(e) => {
                record_fallback(self.tracer.as_ref(), "router", &AgentError::ModelService(e));
                RouteDecision::fallback()
            }
        };

        tracing::info!(route = decision.route.as_str(), tools = ?decision.tools, "route decided");
        self.tracer.log(
            "router.decision",
            json!({
                "route": decision.route.as_str(),
                "tools": decision.tools,
                "reason": decision.reason,
            }),
        );
        decision
    }
}
