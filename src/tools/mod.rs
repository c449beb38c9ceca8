//! 工具箱：注册表、结构化结果、calculator 与 lookup_doc

pub mod calculator;
pub mod knowledge;
pub mod registry;
pub mod result;
pub mod schema;

pub use calculator::{evaluate, CalcError, CalculatorTool, Number};
pub use knowledge::LookupDocTool;
pub use registry::{Tool, ToolRegistry};
pub use result::{ToolFault, ToolResult};
pub use schema::parameters_schema_for;

/// 默认工具集：calculator + lookup_doc
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CalculatorTool);
    registry.register(LookupDocTool);
    registry
}
