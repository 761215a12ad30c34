//! Clinical data tools: the closed [`ToolName`] registry, keyword-driven
//! tool selection, and the file-backed implementations that read patient
//! data from a directory tree.

pub mod file;
pub mod mock;
pub mod registry;
pub mod select;

pub use file::{register_file_tools, DataDirs};
pub use registry::{Tool, ToolInput, ToolName, ToolRegistry};
pub use select::{prioritize, select_tools, SelectorConfig};
