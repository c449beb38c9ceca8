//! Mock 模型服务（用于测试，无需 API）
//!
//! 按脚本顺序返回预置响应，并记录收到的每个请求，便于断言上下文前缀、工具关联等性质。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{
    completed_as_stream, ModelError, ModelRequest, ModelResponse, ModelService, ModelStream,
    StreamEvent,
};

/// 脚本化的 Mock：脚本耗尽后若设置了 repeat 则一直返回它，否则返回空响应
#[derive(Debug, Default)]
pub struct MockModelService {
    script: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    repeat: Option<ModelResponse>,
    requests: Mutex<Vec<ModelRequest>>,
    delay: Option<Duration>,
    /// 流式模式下按多少个字符切分文本增量
    chunk_chars: Option<usize>,
    /// 流式模式下丢弃 Completed 事件，模拟中途断开
    truncate_streams: bool,
}

impl MockModelService {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self::from_results(responses.into_iter().map(Ok).collect())
    }

    pub fn from_results(results: Vec<Result<ModelResponse, ModelError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    /// 每次都返回同一个响应
    pub fn repeating(response: ModelResponse) -> Self {
        Self::default().with_repeat(response)
    }

    /// 脚本耗尽后返回的响应（默认空响应）
    pub fn with_repeat(mut self, response: ModelResponse) -> Self {
        self.repeat = Some(response);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_stream_chunks(mut self, chars: usize) -> Self {
        self.chunk_chars = Some(chars.max(1));
        self
    }

    pub fn with_truncated_streams(mut self) -> Self {
        self.truncate_streams = true;
        self
    }

    /// 已收到的请求（按到达顺序）
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    fn next_reply(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(reply) => reply,
            None => Ok(self.repeat.clone().unwrap_or_default()),
        }
    }
}

#[async_trait]
impl ModelService for MockModelService {
    async fn respond(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.next_reply(request)
    }

    async fn respond_stream(&self, request: &ModelRequest) -> Result<ModelStream, ModelError> {
        let response = self.respond(request).await?;
        if self.chunk_chars.is_none() && !self.truncate_streams {
            return Ok(completed_as_stream(response));
        }

        let size = self.chunk_chars.unwrap_or(usize::MAX);
        let chars: Vec<char> = response.collect_text().chars().collect();
        let mut events: Vec<Result<StreamEvent, ModelError>> = chars
            .chunks(size.min(chars.len().max(1)))
            .map(|c| Ok(StreamEvent::TextDelta(c.iter().collect())))
            .collect();
        if !self.truncate_streams {
            events.push(Ok(StreamEvent::Completed(response)));
        }
        Ok(Box::pin(stream::iter(events)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_script_then_empty() {
        let mock = MockModelService::new(vec![ModelResponse::text("one")]);
        let req = ModelRequest::without_tools(vec![]);
        assert_eq!(mock.respond(&req).await.unwrap().collect_text(), "one");
        assert_eq!(mock.respond(&req).await.unwrap(), ModelResponse::empty());
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_chunked_stream() {
        let mock = MockModelService::new(vec![ModelResponse::text("abcdef")]).with_stream_chunks(4);
        let events: Vec<_> = mock
            .respond_stream(&ModelRequest::without_tools(vec![]))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(events[0], Ok(StreamEvent::TextDelta("abcd".into())));
        assert_eq!(events[1], Ok(StreamEvent::TextDelta("ef".into())));
        assert!(matches!(events[2], Ok(StreamEvent::Completed(_))));
    }
}
