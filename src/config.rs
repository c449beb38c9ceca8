//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FSM_AGENT__*` 覆盖
//! （双下划线表示嵌套，如 `FSM_AGENT__AGENT__MAX_TOOL_STEPS=5`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
}

/// [agent] 段：执行步数、是否规划、是否流式
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 执行阶段最多的模型请求次数
    pub max_tool_steps: usize,
    pub enable_planner: bool,
    pub stream: bool,
    /// 计划步数上限（1..=6）
    pub max_plan_steps: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_tool_steps: 10,
            enable_planner: true,
            stream: false,
            max_plan_steps: 6,
        }
    }
}

/// [llm] 段：模型、端点、密钥与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读取环境变量 OPENAI_API_KEY
    pub api_key: Option<String>,
    /// 单次模型请求超时（秒），0 表示不限
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-mini".to_string(),
            base_url: None,
            api_key: None,
            request_timeout_secs: 60,
        }
    }
}

impl LlmSection {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// 配置中的 key 优先，其次 OPENAI_API_KEY
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self { tool_timeout_secs: 30 }
    }
}

impl ToolsSection {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs.max(1))
    }
}

/// 加载配置：config/default.toml（若存在）-> 指定文件 -> 环境变量
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FSM_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_tool_steps, 10);
        assert!(cfg.agent.enable_planner);
        assert!(!cfg.agent.stream);
        assert_eq!(cfg.llm.model, "gpt-4.1-mini");
        assert_eq!(cfg.llm.request_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(cfg.tools.tool_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_from_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[agent]\nmax_tool_steps = 3\nenable_planner = false\n\n[llm]\nmodel = \"test-model\"\nrequest_timeout_secs = 0\n"
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.agent.max_tool_steps, 3);
        assert!(!cfg.agent.enable_planner);
        assert_eq!(cfg.agent.max_plan_steps, 6);
        assert_eq!(cfg.llm.model, "test-model");
        assert_eq!(cfg.llm.request_timeout(), None);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = load_config(Some(PathBuf::from("/nonexistent/fsm-agent.toml"))).unwrap();
        assert_eq!(cfg.agent.max_tool_steps, 10);
    }
}
