//! 模型服务层：协作方抽象与实现（Responses API / Mock）

pub mod mock;
pub mod openai;
pub mod traits;
pub mod types;

pub use mock::MockModelService;
pub use openai::ResponsesClient;
pub use traits::{completed_as_stream, ModelError, ModelService, ModelStream, TimeoutModelService};
pub use types::{ModelRequest, ModelResponse, StreamEvent, ToolChoice, ToolSpec};
