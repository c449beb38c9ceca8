//! Executor：有界 ReAct 循环
//!
//! 每一步把完整对话快照连同工具表发给模型：
//! - 有工具调用：原样追加调用项，按顺序执行工具，每个结果以 tool_output 追加（call_id 对应）
//! - 只有文本：作为最终答案返回
//! - 二者皆无：立即结束并返回兜底文本
//!
//! 步数用尽同样返回兜底文本。模型调用失败以 Err 返回，由状态机转入 STOP。

use futures_util::StreamExt;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::core::AgentError;
use crate::llm::{ModelError, ModelRequest, ModelResponse, ModelService, StreamEvent};
use crate::memory::{ConversationItem, ConversationLog};
use crate::observability::{preview, record_fallback, Tracer};
use crate::react::events::ReactEvent;
use crate::react::parse::parse_arguments;
use crate::react::planner::{render_plan, PlanStep};
use crate::react::prompts::EXECUTOR_SYSTEM;
use crate::tools::ToolRegistry;

/// 步数用尽或模型给出空响应时的答案
pub const MAX_STEPS_FALLBACK: &str = "reached maximum steps without a final answer.";

const OBSERVATION_PREVIEW_CHARS: usize = 300;

/// 单次模型响应的分类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// 至少一个工具调用（同时出现的文本忽略）
    ToolCalls,
    /// 非空文本，没有工具调用
    FinalText(String),
    /// 既无工具调用也无文本
    Degenerate,
}

pub fn classify_response(response: &ModelResponse) -> StepOutcome {
    if !response.tool_calls().is_empty() {
        return StepOutcome::ToolCalls;
    }
    let text = response.collect_text();
    if text.is_empty() {
        StepOutcome::Degenerate
    } else {
        StepOutcome::FinalText(text)
    }
}

/// 循环结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    FinalText,
    BudgetExhausted,
    EmptyResponse,
}

impl LoopExit {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopExit::FinalText => "final_text",
            LoopExit::BudgetExhausted => "budget_exhausted",
            LoopExit::EmptyResponse => "empty_response",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub answer: String,
    pub exit: LoopExit,
    /// 实际发起的模型请求数
    pub steps: usize,
    /// 本次执行的对话记录（不含最终答案）
    pub log: ConversationLog,
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub max_tool_steps: usize,
    /// 以流式方式请求模型，文本增量通过 MessageChunk 事件转发
    pub stream: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_tool_steps: 10,
            stream: false,
        }
    }
}

/// 为缺少 call_id 的工具调用补齐 id：call_id -> item_id -> `call_{step}_{index}`
pub fn resolve_call_ids(output: &mut [ConversationItem], step: usize) {
    let mut index = 0;
    for item in output.iter_mut() {
        if let ConversationItem::ToolCall { call_id, item_id, .. } = item {
            let has_id = call_id.as_deref().is_some_and(|id| !id.trim().is_empty());
            if !has_id {
                let fallback = item_id
                    .as_deref()
                    .filter(|id| !id.trim().is_empty())
                    .map(String::from)
                    .unwrap_or_else(|| format!("call_{step}_{index}"));
                *call_id = Some(fallback);
            }
            index += 1;
        }
    }
}

fn send_event(tx: &Option<&UnboundedSender<ReactEvent>>, ev: ReactEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

pub struct Executor<'a> {
    model: &'a dyn ModelService,
    registry: &'a ToolRegistry,
    tracer: &'a dyn Tracer,
    config: ExecutorConfig,
    system_prompt: &'a str,
    event_tx: Option<&'a UnboundedSender<ReactEvent>>,
}

impl<'a> Executor<'a> {
    pub fn new(
        model: &'a dyn ModelService,
        registry: &'a ToolRegistry,
        tracer: &'a dyn Tracer,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            model,
            registry,
            tracer,
            config,
            system_prompt: EXECUTOR_SYSTEM,
            event_tx: None,
        }
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_system_prompt(mut self, prompt: &'a str) -> Self {
        self.system_prompt = prompt;
        self
    }

    /// 初始对话：system 指令、可选的计划指引（developer）、用户请求
    pub fn seed_log(&self, query: &str, plan: &[PlanStep]) -> ConversationLog {
        let mut log = ConversationLog::new();
        log.append(ConversationItem::system(self.system_prompt));
        if !plan.is_empty() {
            log.append(ConversationItem::developer(render_plan(plan)));
        }
        log.append(ConversationItem::user(query));
        log
    }

    pub async fn execute(&self, query: &str, plan: &[PlanStep]) -> Result<ExecutionOutcome, AgentError> {
        let budget = self.config.max_tool_steps;
        let mut log = self.seed_log(query, plan);
        let tools = self.registry.specs();

        for step in 0..budget {
            send_event(&self.event_tx, ReactEvent::StepUpdate {
                step: step + 1,
                max_steps: budget,
            });
            self.tracer.log(
                "executor.llm.request",
                json!({ "step": step, "items": log.len(), "stream": self.config.stream }),
            );

            let request = ModelRequest::with_tools(log.snapshot(), tools.clone());
            let response = match self.request(&request).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(step, error = %e, "model request failed");
                    send_event(&self.event_tx, ReactEvent::Error { text: e.to_string() });
                    return Err(AgentError::ModelService(e));
                }
            };

            match classify_response(&response) {
                StepOutcome::ToolCalls => {
                    let mut output = response.output;
                    resolve_call_ids(&mut output, step);
                    let calls = pending_calls(&output);
                    self.tracer.log(
                        "executor.tool_calls",
                        json!({ "step": step, "calls": calls.iter().map(|c| &c.name).collect::<Vec<_>>() }),
                    );
                    log.append_all(output);

                    for call in calls {
                        let observation = self.run_tool(&call).await;
                        log.append(ConversationItem::tool_output(call.call_id, observation));
                    }
                }
                StepOutcome::FinalText(text) => {
                    self.tracer.log("executor.text", json!({ "step": step, "text": preview(&text, 500) }));
                    if !self.config.stream {
                        send_event(&self.event_tx, ReactEvent::MessageChunk { text: text.clone() });
                    }
                    send_event(&self.event_tx, ReactEvent::MessageDone);
                    return Ok(ExecutionOutcome {
                        answer: text,
                        exit: LoopExit::FinalText,
                        steps: step + 1,
                        log,
                    });
                }
                StepOutcome::Degenerate => {
                    let err = AgentError::EmptyModelResponse { step };
                    record_fallback(self.tracer, "executor", &err);
                    self.fallback_event(&err);
                    self.tracer.log("executor.stop", json!({ "reason": LoopExit::EmptyResponse.as_str() }));
                    return Ok(ExecutionOutcome {
                        answer: MAX_STEPS_FALLBACK.to_string(),
                        exit: LoopExit::EmptyResponse,
                        steps: step + 1,
                        log,
                    });
                }
            }
        }

        let err = AgentError::StepBudgetExceeded { budget };
        record_fallback(self.tracer, "executor", &err);
        self.fallback_event(&err);
        self.tracer.log("executor.stop", json!({ "reason": LoopExit::BudgetExhausted.as_str() }));
        Ok(ExecutionOutcome {
            answer: MAX_STEPS_FALLBACK.to_string(),
            exit: LoopExit::BudgetExhausted,
            steps: budget,
            log,
        })
    }

    /// 单次模型请求；流式模式下转发文本增量，流在 Completed 前结束视为失败
    async fn request(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        if !self.config.stream {
            return self.model.respond(request).await;
        }
        let mut stream = self.model.respond_stream(request).await?;
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta(text) => {
                    if !text.is_empty() {
                        send_event(&self.event_tx, ReactEvent::MessageChunk { text });
                    }
                }
                StreamEvent::Completed(response) => return Ok(response),
            }
        }
        Err(ModelError::StreamIncomplete)
    }

    async fn run_tool(&self, call: &PendingCall) -> String {
        let args = match parse_arguments(&call.arguments) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "undecodable tool arguments, using {{}}");
                self.tracer.log(
                    "tool.args_invalid",
                    json!({ "name": call.name, "call_id": call.call_id, "error": e }),
                );
                Map::new()
            }
        };

        self.tracer.log(
            "tool.call",
            json!({ "name": call.name, "call_id": call.call_id, "args": Value::Object(args.clone()) }),
        );
        send_event(&self.event_tx, ReactEvent::ToolCall {
            tool: call.name.clone(),
            args: Value::Object(args.clone()),
        });

        let observation = self.registry.dispatch(&call.name, args).await;

        self.tracer.log(
            "tool.result",
            json!({ "name": call.name, "call_id": call.call_id, "output": preview(&observation, 1000) }),
        );
        send_event(&self.event_tx, ReactEvent::Observation {
            tool: call.name.clone(),
            preview: preview(&observation, OBSERVATION_PREVIEW_CHARS),
        });
        observation
    }

    fn fallback_event(&self, err: &AgentError) {
        send_event(&self.event_tx, ReactEvent::Fallback {
            stage: "executor".to_string(),
            error: err.tag().to_string(),
        });
    }
}

/// 已补齐 call_id 的待执行调用
#[derive(Debug, Clone)]
struct PendingCall {
    name: String,
    arguments: String,
    call_id: String,
}

fn pending_calls(output: &[ConversationItem]) -> Vec<PendingCall> {
    output
        .iter()
        .filter_map(|item| match item {
            ConversationItem::ToolCall {
                name,
                arguments,
                call_id,
                ..
            } => Some(PendingCall {
                name: name.clone(),
                arguments: arguments.clone(),
                call_id: call_id.clone().unwrap_or_default(),
            }),
            _ => None,
        })
        .collect()
}
