//! Headless Agent 运行时
//!
//! 从配置构建模型服务、工具注册表与编排器，供 demo 二进制或其他宿主调用。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{load_config, AppConfig};
use crate::core::{AgentConfig, AgentError, Orchestrator, RunOutcome};
use crate::llm::{MockModelService, ModelService, ResponsesClient};
use crate::observability::{record_fallback, Tracer};
use crate::react::ReactEvent;
use crate::tools::default_registry;

/// 根据配置选择模型后端：有 API Key 时走 Responses API，否则使用 Mock
pub fn create_model_from_config(cfg: &AppConfig) -> Arc<dyn ModelService> {
    match cfg.llm.resolved_api_key() {
        Some(key) => {
            tracing::info!("Using Responses API ({})", cfg.llm.model);
            Arc::new(ResponsesClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(&key),
            ))
        }
        None => {
            tracing::warn!("No API key set, using Mock model service");
            Arc::new(MockModelService::default())
        }
    }
}

/// 按配置组装编排器（calculator + lookup_doc）
pub fn create_agent_from_config(cfg: &AppConfig, tracer: Arc<dyn Tracer>) -> Orchestrator {
    let registry = default_registry().with_timeout(cfg.tools.tool_timeout());
    Orchestrator::new(
        create_model_from_config(cfg),
        Arc::new(registry),
        tracer,
        AgentConfig::from(cfg),
    )
}

/// 加载配置并创建编排器；配置加载失败时记录 config 降级并使用默认值
pub fn create_agent(config_path: Option<PathBuf>, tracer: Arc<dyn Tracer>) -> Orchestrator {
    let cfg = match load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            let err = AgentError::ConfigError(e.to_string());
            tracing::warn!("{}, using defaults", err);
            record_fallback(tracer.as_ref(), "config", &err);
            AppConfig::default()
        }
    };
    create_agent_from_config(&cfg, tracer)
}

/// 处理单条用户消息，返回最终答案
pub async fn process_message(orchestrator: &Orchestrator, user_input: &str) -> String {
    orchestrator.run(user_input).await.answer
}

/// 流式处理：事件推送到返回的接收端，运行结束后通道关闭
pub fn process_message_stream(
    orchestrator: Arc<Orchestrator>,
    user_input: String,
) -> (
    mpsc::UnboundedReceiver<ReactEvent>,
    tokio::task::JoinHandle<RunOutcome>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move { orchestrator.run_with_events(&user_input, tx).await });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{MemoryTracer, NoopTracer};
    use std::io::Write;

    #[tokio::test]
    async fn test_agent_without_key_still_answers() {
        // Mock 对所有请求返回空响应：路由与规划降级，执行阶段遇到空响应结束
        let orch = Orchestrator::new(
            Arc::new(MockModelService::default()),
            Arc::new(default_registry()),
            Arc::new(NoopTracer),
            AgentConfig::from(&AppConfig::default()),
        );
        let answer = process_message(&orch, "2+2").await;
        assert_eq!(answer, crate::react::MAX_STEPS_FALLBACK);
    }

    #[test]
    fn test_bad_config_records_fallback() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[agent]\nmax_tool_steps = \"many\"\n").unwrap();

        let tracer = Arc::new(MemoryTracer::new());
        let _orch = create_agent(Some(file.path().to_path_buf()), tracer.clone());

        assert_eq!(tracer.fallbacks(), vec!["config".to_string()]);
        let data = tracer.data_of("fallback");
        assert_eq!(data[0]["stage"], "config");
    }

    #[tokio::test]
    async fn test_process_message_stream_closes_channel() {
        let orch = Arc::new(Orchestrator::new(
            Arc::new(MockModelService::new(vec![
                crate::llm::ModelResponse::text(r#"{"route":"direct"}"#),
                crate::llm::ModelResponse::text("hi there"),
            ])),
            Arc::new(default_registry()),
            Arc::new(NoopTracer),
            AgentConfig::default(),
        ));
        let (mut rx, handle) = process_message_stream(orch, "hello".to_string());

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.answer, "hi there");
        assert_eq!(events.last(), Some(&ReactEvent::StateChanged { state: "FINAL".to_string() }));
    }
}
