//! Markdown tool-use parsing and built-in tool implementations for Tandem.

pub mod browse;
pub mod parse;
pub mod registry;
pub mod save;
pub mod shell;

pub use browse::BrowseTool;
pub use parse::parse_tool_uses;
pub use registry::ToolRegistry;
pub use save::{SaveMode, SaveTool};
pub use shell::ShellTool;

use std::path::{Path, PathBuf};

/// Resolve a tool path argument against the working directory, expanding `~/`.
pub(crate) fn resolve_path(raw: &str, cwd: &Path) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    cwd.join(raw)
}
