//! Per-conversation workspace directory and the prompt describing it.
//!
//! A conversation may own a `workspace/` directory next to its log. When it
//! exists it is always used; asking for a different directory is an error.
//! Otherwise the requested directory (or the current one) must exist.

use std::path::{Path, PathBuf};
use tandem_session::{ConversationLog, LogError};
use tandem_types::{FENCE, Message, Role};
use thiserror::Error;

/// Name of the workspace directory inside a conversation directory.
pub const WORKSPACE_DIR: &str = "workspace";

/// Requested workspace that means "create one inside the conversation".
pub const LOG_WORKSPACE: &str = "@log";

/// Listed entries beyond this are summarised.
const MAX_ENTRIES: usize = 100;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Workspace already exists in {existing}, won't override with {requested}")]
    Conflict { existing: PathBuf, requested: PathBuf },

    #[error("Workspace path {0} does not exist")]
    Missing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pick the workspace for the conversation stored in `conversation_dir`.
///
/// Relative `requested` paths resolve against `cwd`.
pub async fn resolve_workspace(
    conversation_dir: &Path,
    requested: Option<&Path>,
    cwd: &Path,
) -> Result<PathBuf, WorkspaceError> {
    let log_workspace = conversation_dir.join(WORKSPACE_DIR);
    let wants_log = requested.is_some_and(|p| p == Path::new(LOG_WORKSPACE));

    if log_workspace.is_dir() {
        if let Some(requested) = requested.filter(|_| !wants_log) {
            let requested = cwd.join(requested);
            if !same_dir(&requested, &log_workspace).await {
                return Err(WorkspaceError::Conflict {
                    existing: log_workspace,
                    requested,
                });
            }
        }
        return Ok(log_workspace);
    }

    if wants_log {
        tokio::fs::create_dir_all(&log_workspace).await?;
        tracing::debug!("Created workspace {}", log_workspace.display());
        return Ok(log_workspace);
    }

    let workspace = requested.map_or_else(|| cwd.to_path_buf(), |p| cwd.join(p));
    if !workspace.is_dir() {
        return Err(WorkspaceError::Missing(workspace));
    }
    Ok(workspace)
}

async fn same_dir(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Describe the top level of `workspace`, honouring simple `.gitignore`
/// entries. `None` when there is nothing to list.
pub async fn workspace_prompt(workspace: &Path) -> Option<String> {
    let ignore = read_gitignore(workspace).await;
    let mut entries = match tokio::fs::read_dir(workspace).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to list workspace {}: {}", workspace.display(), e);
            return None;
        }
    };

    let mut names = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == ".git" || ignore.iter().any(|pattern| matches_ignore(pattern, &name)) {
            continue;
        }
        let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
        names.push(if is_dir { format!("{name}/") } else { name });
    }
    if names.is_empty() {
        return None;
    }
    names.sort();

    let mut tree = String::from("./\n");
    for name in names.iter().take(MAX_ENTRIES) {
        tree.push_str(&format!("  {name}\n"));
    }
    if names.len() > MAX_ENTRIES {
        tree.push_str(&format!("  ... {} more\n", names.len() - MAX_ENTRIES));
    }
    Some(format!("## Workspace structure\n\n{FENCE}tree\n{tree}{FENCE}"))
}

async fn read_gitignore(workspace: &Path) -> Vec<String> {
    let Ok(text) = tokio::fs::read_to_string(workspace.join(".gitignore")).await else {
        return Vec::new();
    };
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
        .map(|l| l.trim_matches('/').to_string())
        .filter(|l| !l.is_empty() && !l.contains('/'))
        .collect()
}

/// Exact names and `*suffix` patterns.
fn matches_ignore(pattern: &str, name: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) => !suffix.contains('*') && name.ends_with(suffix),
        None => pattern == name,
    }
}

/// Append the workspace prompt as a hidden, quiet system message.
///
/// Skipped once the user has spoken or when the same prompt is already in
/// the log (a resumed conversation). Returns whether a message was added.
pub async fn add_workspace_prompt(
    log: &mut ConversationLog,
    workspace: &Path,
) -> Result<bool, LogError> {
    if log.messages().iter().any(|m| m.role == Role::User) {
        return Ok(false);
    }
    let Some(prompt) = workspace_prompt(workspace).await else {
        return Ok(false);
    };
    if log.messages().iter().any(|m| m.content == prompt) {
        return Ok(false);
    }
    log.append(Message::system(prompt).with_hide(true).with_quiet(true))
        .await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn existing_log_workspace_wins() {
        let tmp = TempDir::new().unwrap();
        let conv = tmp.path().join("conv");
        std::fs::create_dir_all(conv.join(WORKSPACE_DIR)).unwrap();

        let ws = resolve_workspace(&conv, None, tmp.path()).await.unwrap();
        assert_eq!(ws, conv.join(WORKSPACE_DIR));

        let same = resolve_workspace(&conv, Some(Path::new("conv/workspace")), tmp.path())
            .await
            .unwrap();
        assert_eq!(same, conv.join(WORKSPACE_DIR));
    }

    #[tokio::test]
    async fn different_workspace_conflicts_with_log_workspace() {
        let tmp = TempDir::new().unwrap();
        let conv = tmp.path().join("conv");
        std::fs::create_dir_all(conv.join(WORKSPACE_DIR)).unwrap();
        std::fs::create_dir(tmp.path().join("elsewhere")).unwrap();

        let result = resolve_workspace(&conv, Some(Path::new("elsewhere")), tmp.path()).await;
        assert!(matches!(result, Err(WorkspaceError::Conflict { .. })));
    }

    #[tokio::test]
    async fn requested_workspace_must_exist() {
        let tmp = TempDir::new().unwrap();
        let conv = tmp.path().join("conv");

        let result = resolve_workspace(&conv, Some(Path::new("missing")), tmp.path()).await;
        assert!(matches!(result, Err(WorkspaceError::Missing(_))));

        let ws = resolve_workspace(&conv, None, tmp.path()).await.unwrap();
        assert_eq!(ws, tmp.path());
    }

    #[tokio::test]
    async fn log_marker_creates_workspace() {
        let tmp = TempDir::new().unwrap();
        let conv = tmp.path().join("conv");
        std::fs::create_dir(&conv).unwrap();

        let ws = resolve_workspace(&conv, Some(Path::new(LOG_WORKSPACE)), tmp.path())
            .await
            .unwrap();
        assert_eq!(ws, conv.join(WORKSPACE_DIR));
        assert!(ws.is_dir());
    }

    #[tokio::test]
    async fn prompt_lists_top_level_and_skips_ignored() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("src")).unwrap();
        std::fs::create_dir(tmp.path().join("target")).unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        std::fs::write(tmp.path().join("Cargo.toml"), "").unwrap();
        std::fs::write(tmp.path().join("debug.log"), "").unwrap();
        std::fs::write(tmp.path().join(".gitignore"), "# build\n/target/\n*.log\n").unwrap();

        let prompt = workspace_prompt(tmp.path()).await.unwrap();
        assert_eq!(
            prompt,
            "## Workspace structure\n\n```tree\n./\n  .gitignore\n  Cargo.toml\n  src/\n```"
        );
    }

    #[tokio::test]
    async fn empty_workspace_has_no_prompt() {
        let tmp = TempDir::new().unwrap();
        assert!(workspace_prompt(tmp.path()).await.is_none());
    }

    #[tokio::test]
    async fn prompt_added_once_and_only_before_user_input() {
        let tmp = TempDir::new().unwrap();
        let ws = tmp.path().join("ws");
        std::fs::create_dir(&ws).unwrap();
        std::fs::write(ws.join("README.md"), "hi").unwrap();
        let logs = tmp.path().join("logs");

        let mut log = ConversationLog::create(&logs, "fresh", vec![Message::system("sys")])
            .await
            .unwrap();
        assert!(add_workspace_prompt(&mut log, &ws).await.unwrap());
        let added = log.last().unwrap();
        assert!(added.hide && added.quiet);
        assert!(added.content.contains("README.md"));

        let mut resumed = ConversationLog::load("fresh", &logs, Vec::new()).await.unwrap();
        assert!(!add_workspace_prompt(&mut resumed, &ws).await.unwrap());
        assert_eq!(resumed.len(), 2);

        let mut spoken = ConversationLog::create(&logs, "spoken", Vec::new()).await.unwrap();
        spoken.append(Message::user("hello")).await.unwrap();
        assert!(!add_workspace_prompt(&mut spoken, &ws).await.unwrap());
        assert_eq!(spoken.len(), 1);
    }
}
