//! 记忆层：单次运行内的对话日志（长期记忆 / 摘要压缩不在此实现）

pub mod conversation;

pub use conversation::{ConversationItem, ConversationLog, Role};
