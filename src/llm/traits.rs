//! 模型服务抽象
//!
//! 所有后端（Responses API / Mock）实现 ModelService：respond（一次性）、respond_stream（增量输出）。
//! TimeoutModelService 为每次调用加超时。

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use thiserror::Error;

use crate::llm::{ModelRequest, ModelResponse, StreamEvent};

/// 流式响应
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ModelError>> + Send>>;

/// 模型服务调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("stream ended without a completed response")]
    StreamIncomplete,
}

/// 模型服务 trait：每次运行显式传入句柄，不依赖全局客户端
#[async_trait]
pub trait ModelService: Send + Sync {
    /// 一次性请求 / 响应
    async fn respond(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError>;

    /// 流式请求：默认退化为 respond，文本作为单个增量给出
    async fn respond_stream(&self, request: &ModelRequest) -> Result<ModelStream, ModelError> {
        let response = self.respond(request).await?;
        Ok(completed_as_stream(response))
    }
}

/// 把完整响应包装成「一个文本增量 + Completed」的流
pub fn completed_as_stream(response: ModelResponse) -> ModelStream {
    let mut events = Vec::with_capacity(2);
    let text = response.collect_text();
    if !text.is_empty() {
        events.push(Ok(StreamEvent::TextDelta(text)));
    }
    events.push(Ok(StreamEvent::Completed(response)));
    Box::pin(stream::iter(events))
}

/// 超时装饰器：respond 整体限时；流式调用限制建立连接与相邻两个事件之间的间隔
pub struct TimeoutModelService {
    inner: Arc<dyn ModelService>,
    timeout: Duration,
}

impl TimeoutModelService {
    pub fn new(inner: Arc<dyn ModelService>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl ModelService for TimeoutModelService {
    async fn respond(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        tokio::time::timeout(self.timeout, self.inner.respond(request))
            .await
            .map_err(|_| ModelError::Timeout(self.timeout))?
    }

    async fn respond_stream(&self, request: &ModelRequest) -> Result<ModelStream, ModelError> {
        let limit = self.timeout;
        let inner = tokio::time::timeout(limit, self.inner.respond_stream(request))
            .await
            .map_err(|_| ModelError::Timeout(limit))??;

        let guarded = stream::unfold(Some(inner), move |state| async move {
            let mut inner = state?;
            match tokio::time::timeout(limit, inner.next()).await {
                Ok(Some(item)) => Some((item, Some(inner))),
                Ok(None) => None,
                Err(_) => Some((Err(ModelError::Timeout(limit)), None)),
            }
        });
        Ok(Box::pin(guarded))
    }
}
