//! Append-only conversation log backed by a JSON-lines file.

use crate::error::LogError;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tandem_types::{Message, MessageSink, NullSink, Role, shorten};

/// Canonical file name inside a conversation directory.
pub const CONVERSATION_FILE: &str = "conversation.jsonl";

/// Command message that `undo` discards from the tail.
const UNDO_COMMAND: &str = "/undo";

/// Width of the per-message summary printed by `undo`.
const UNDO_SUMMARY_WIDTH: usize = 50;

/// An ordered conversation persisted as one JSON object per line.
///
/// Every mutating call rewrites the whole file through a temporary sibling
/// and a rename, so the file on disk always matches `messages()`. A failed
/// write rolls the in-memory change back before the error is returned.
pub struct ConversationLog {
    messages: Vec<Message>,
    path: PathBuf,
    sink: Arc<dyn MessageSink>,
}

/// Listing entry for a stored conversation.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub name: String,
    pub path: PathBuf,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub messages: usize,
}

impl ConversationLog {
    /// Load a conversation from `location`.
    ///
    /// `location` is tried as a literal file path first, then as a
    /// conversation name under `logs_dir`. An empty file is seeded with
    /// `initial`, which is not written until the first mutation.
    pub async fn load(
        location: impl AsRef<Path>,
        logs_dir: &Path,
        initial: Vec<Message>,
    ) -> Result<Self, LogError> {
        let location = location.as_ref();
        let path = if location.is_file() {
            location.to_path_buf()
        } else {
            logs_dir.join(location).join(CONVERSATION_FILE)
        };
        if !path.is_file() {
            return Err(LogError::NotFound { path });
        }

        let mut messages = read_messages(&path).await?;
        if messages.is_empty() {
            messages = initial;
        }
        tracing::debug!("Loaded {} messages from {}", messages.len(), path.display());
        Ok(Self {
            messages,
            path,
            sink: Arc::new(NullSink),
        })
    }

    /// Create a new, empty conversation `<logs_dir>/<name>/conversation.jsonl`.
    pub async fn create(
        logs_dir: &Path,
        name: &str,
        initial: Vec<Message>,
    ) -> Result<Self, LogError> {
        validate_name(name)?;
        let dir = logs_dir.join(name);
        let path = dir.join(CONVERSATION_FILE);
        if path.exists() {
            return Err(LogError::AlreadyExists { path });
        }
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&path, "").await?;
        Ok(Self {
            messages: initial,
            path,
            sink: Arc::new(NullSink),
        })
    }

    /// Load `name` if it exists, otherwise create it under `logs_dir`.
    pub async fn load_or_create(
        logs_dir: &Path,
        name: &str,
        initial: Vec<Message>,
    ) -> Result<Self, LogError> {
        match Self::load(name, logs_dir, initial.clone()).await {
            Err(LogError::NotFound { .. }) => Self::create(logs_dir, name, initial).await,
            other => other,
        }
    }

    /// Route appended messages and notices to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sink(&self) -> &Arc<dyn MessageSink> {
        &self.sink
    }

    /// Conversation name: the directory name for canonical logs, else the file stem.
    pub fn name(&self) -> String {
        let named = if self.is_canonical() {
            self.path.parent().and_then(Path::file_name)
        } else {
            self.path.file_stem()
        };
        named
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Push a message, persist, and show it unless it is quiet.
    pub async fn append(&mut self, msg: Message) -> Result<(), LogError> {
        self.messages.push(msg);
        if let Err(e) = self.write().await {
            self.messages.pop();
            return Err(e);
        }
        if let Some(msg) = self.messages.last() {
            if !msg.quiet {
                self.sink.show(msg);
            }
        }
        Ok(())
    }

    /// Overwrite the message at `index` and persist.
    pub async fn replace(&mut self, index: usize, msg: Message) -> Result<(), LogError> {
        let len = self.messages.len();
        let slot = self
            .messages
            .get_mut(index)
            .ok_or(LogError::OutOfRange { index, len })?;
        let previous = std::mem::replace(slot, msg);
        if let Err(e) = self.write().await {
            self.messages[index] = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Remove the last message and persist.
    pub async fn pop(&mut self) -> Result<Option<Message>, LogError> {
        let Some(popped) = self.messages.pop() else {
            return Ok(None);
        };
        if let Err(e) = self.write().await {
            self.messages.push(popped);
            return Err(e);
        }
        Ok(Some(popped))
    }

    /// Persist the whole sequence (atomic write: .tmp → fsync → rename).
    pub async fn write(&self) -> Result<(), LogError> {
        let mut data = String::new();
        for msg in &self.messages {
            data.push_str(&serde_json::to_string(msg)?);
            data.push('\n');
        }
        let tmp_path = self.path.with_extension("jsonl.tmp");
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(data.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Remove the last `n` messages, returning them oldest first.
    ///
    /// A trailing `/undo` command message is discarded first and is not
    /// counted. On an empty log a notice is emitted and nothing is removed.
    pub async fn undo(&mut self, n: usize) -> Result<Vec<Message>, LogError> {
        let command = if self.messages.last().is_some_and(is_undo_command) {
            self.messages.pop()
        } else {
            None
        };

        if self.messages.is_empty() {
            self.sink.notice("Nothing to undo.");
            if command.is_some() {
                if let Err(e) = self.write().await {
                    self.messages.extend(command);
                    return Err(e);
                }
            }
            return Ok(Vec::new());
        }

        let keep = self.messages.len().saturating_sub(n);
        let removed = self.messages.split_off(keep);
        if let Err(e) = self.write().await {
            self.messages.extend(removed);
            self.messages.extend(command);
            return Err(e);
        }

        self.sink.notice("Undoing messages:");
        for msg in removed.iter().rev() {
            self.sink.notice(&format!(
                "  {}: {}",
                msg.role,
                shorten(msg.content.trim(), UNDO_SUMMARY_WIDTH)
            ));
        }
        Ok(removed)
    }

    /// Move the backing file to a sibling location called `name`.
    ///
    /// For a canonical `conversation.jsonl` the conversation directory is
    /// renamed; any other file is renamed to `<name>.jsonl` beside itself.
    pub async fn rename(&mut self, name: &str) -> Result<(), LogError> {
        validate_name(name)?;
        let target = self.sibling_path(name);
        if self.is_canonical() {
            let (Some(from), Some(to)) = (self.path.parent(), target.parent()) else {
                return Err(LogError::InvalidName { name: name.into() });
            };
            if to.exists() {
                return Err(LogError::AlreadyExists { path: to.to_path_buf() });
            }
            tokio::fs::rename(from, to).await?;
        } else {
            if target.exists() {
                return Err(LogError::AlreadyExists { path: target });
            }
            tokio::fs::rename(&self.path, &target).await?;
        }
        tracing::debug!("Renamed {} to {}", self.path.display(), target.display());
        self.path = target;
        Ok(())
    }

    /// Write the current state to a new sibling location and switch to it.
    ///
    /// The previous file is left untouched.
    pub async fn fork(&mut self, name: &str) -> Result<(), LogError> {
        validate_name(name)?;
        let target = self.sibling_path(name);
        if target.exists() {
            return Err(LogError::AlreadyExists { path: target });
        }
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let previous = std::mem::replace(&mut self.path, target);
        if let Err(e) = self.write().await {
            self.path = previous;
            return Err(e);
        }
        tracing::debug!("Forked {} to {}", previous.display(), self.path.display());
        Ok(())
    }

    /// Inner text of the last paired code block in the most recent message
    /// that has one.
    pub fn get_last_code_block(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(Message::last_code_block)
    }

    /// Show the conversation, skipping hidden messages unless `show_hidden`.
    pub fn print(&self, show_hidden: bool) {
        for msg in self.messages.iter().filter(|m| show_hidden || !m.hide) {
            self.sink.show(msg);
        }
    }

    fn is_canonical(&self) -> bool {
        self.path.file_name().is_some_and(|n| n == CONVERSATION_FILE)
    }

    fn sibling_path(&self, name: &str) -> PathBuf {
        if self.is_canonical() {
            let logs_dir = self
                .path
                .parent()
                .and_then(Path::parent)
                .unwrap_or_else(|| Path::new("."));
            logs_dir.join(name).join(CONVERSATION_FILE)
        } else {
            let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
            dir.join(format!("{name}.jsonl"))
        }
    }
}

/// List the conversations under `logs_dir`, oldest modification first.
///
/// Entries that cannot be read or parsed are logged and skipped.
pub async fn list_conversations(logs_dir: &Path) -> Result<Vec<ConversationSummary>, LogError> {
    let mut summaries = Vec::new();
    if !logs_dir.is_dir() {
        return Ok(summaries);
    }

    let mut entries = tokio::fs::read_dir(logs_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path().join(CONVERSATION_FILE);
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Failed to stat conversation {}: {}", name, e);
                continue;
            }
        };
        let messages = match read_messages(&path).await {
            Ok(msgs) => msgs.len(),
            Err(e) => {
                tracing::warn!("Failed to read conversation {}: {}", name, e);
                continue;
            }
        };
        let modified: DateTime<Utc> = metadata.modified().map(Into::into).unwrap_or_default();
        let created = metadata.created().map(Into::into).unwrap_or(modified);
        summaries.push(ConversationSummary {
            name,
            path,
            created,
            modified,
            messages,
        });
    }

    summaries.sort_by(|a, b| a.modified.cmp(&b.modified));
    Ok(summaries)
}

/// `/undo` alone or followed by whitespace; `/undocumented` is ordinary text.
fn is_undo_command(msg: &Message) -> bool {
    msg.role == Role::User
        && msg
            .content
            .strip_prefix(UNDO_COMMAND)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

async fn read_messages(path: &Path) -> Result<Vec<Message>, LogError> {
    let data = tokio::fs::read_to_string(path).await?;
    let mut messages = Vec::new();
    for (i, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let msg = serde_json::from_str(line).map_err(|source| LogError::Corrupt {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        messages.push(msg);
    }
    Ok(messages)
}

fn validate_name(name: &str) -> Result<(), LogError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_whitespace);
    if invalid {
        return Err(LogError::InvalidName { name: name.into() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSink {
        shown: Mutex<Vec<String>>,
        notices: Mutex<Vec<String>>,
    }

    impl MessageSink for RecordingSink {
        fn show(&self, message: &Message) {
            self.shown.lock().unwrap().push(message.content.clone());
        }

        fn notice(&self, text: &str) {
            self.notices.lock().unwrap().push(text.to_string());
        }
    }

    async fn new_log(tmp: &TempDir) -> ConversationLog {
        ConversationLog::create(tmp.path(), "test-conv", Vec::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn load_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = ConversationLog::load("nope", tmp.path(), Vec::new()).await;
        assert!(matches!(result, Err(LogError::NotFound { .. })));
    }

    #[tokio::test]
    async fn empty_file_is_seeded_but_not_written() {
        let tmp = TempDir::new().unwrap();
        let log = ConversationLog::create(tmp.path(), "seeded", vec![Message::system("sys")])
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        let on_disk = std::fs::read_to_string(log.path()).unwrap();
        assert!(on_disk.is_empty());

        let reloaded = ConversationLog::load("seeded", tmp.path(), vec![Message::system("again")])
            .await
            .unwrap();
        assert_eq!(reloaded.messages()[0].content, "again");
    }

    #[tokio::test]
    async fn load_prefers_literal_path() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("direct.jsonl");
        let line = serde_json::to_string(&Message::user("hi")).unwrap();
        std::fs::write(&file, format!("{line}\n")).unwrap();

        let log = ConversationLog::load(&file, Path::new("/nonexistent"), Vec::new())
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.name(), "direct");
    }

    #[tokio::test]
    async fn corrupt_line_fails_load() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("bad.jsonl");
        let line = serde_json::to_string(&Message::user("ok")).unwrap();
        std::fs::write(&file, format!("{line}\n{{not json\n")).unwrap();

        let result = ConversationLog::load(&file, tmp.path(), Vec::new()).await;
        match result {
            Err(LogError::Corrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected Corrupt, got {:?}", other.map(|l| l.len())),
        }
    }

    #[tokio::test]
    async fn create_twice_is_already_exists() {
        let tmp = TempDir::new().unwrap();
        new_log(&tmp).await;
        let again = ConversationLog::create(tmp.path(), "test-conv", Vec::new()).await;
        assert!(matches!(again, Err(LogError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn append_persists_and_respects_quiet() {
        let tmp = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut log = new_log(&tmp).await.with_sink(sink.clone());

        log.append(Message::user("loud")).await.unwrap();
        log.append(Message::assistant("hush").with_quiet(true))
            .await
            .unwrap();

        assert_eq!(*sink.shown.lock().unwrap(), vec!["loud".to_string()]);
        let lines = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(lines.lines().count(), 2);
        assert!(!log.path().with_extension("jsonl.tmp").exists());
    }

    #[tokio::test]
    async fn replace_overwrites_position() {
        let tmp = TempDir::new().unwrap();
        let mut log = new_log(&tmp).await;
        log.append(Message::user("a")).await.unwrap();
        log.replace(0, Message::user("b")).await.unwrap();
        assert_eq!(log.messages()[0].content, "b");

        let err = log.replace(5, Message::user("c")).await;
        assert!(matches!(err, Err(LogError::OutOfRange { index: 5, len: 1 })));
    }

    #[tokio::test]
    async fn undo_removes_last_message() {
        let tmp = TempDir::new().unwrap();
        let mut log = new_log(&tmp).await;
        log.append(Message::user("one")).await.unwrap();
        log.append(Message::assistant("two")).await.unwrap();

        let removed = log.undo(1).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].content, "two");
        assert_eq!(log.len(), 1);

        let reloaded = ConversationLog::load(log.path(), tmp.path(), Vec::new())
            .await
            .unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn undo_discards_trailing_command() {
        let tmp = TempDir::new().unwrap();
        let mut log = new_log(&tmp).await;
        log.append(Message::user("one")).await.unwrap();
        log.append(Message::assistant("two")).await.unwrap();
        log.append(Message::user("/undo 2")).await.unwrap();

        let removed = log.undo(2).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn undo_keeps_text_that_only_starts_like_the_command() {
        let tmp = TempDir::new().unwrap();
        let mut log = new_log(&tmp).await;
        log.append(Message::user("a")).await.unwrap();
        log.append(Message::assistant("b")).await.unwrap();
        log.append(Message::user("/undocumented flags?")).await.unwrap();

        let removed = log.undo(1).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].content, "/undocumented flags?");
    }

    #[test]
    fn undo_command_detection() {
        assert!(is_undo_command(&Message::user("/undo")));
        assert!(is_undo_command(&Message::user("/undo 3")));
        assert!(!is_undo_command(&Message::user("/undone")));
        assert!(!is_undo_command(&Message::assistant("/undo")));
    }

    #[tokio::test]
    async fn failed_append_leaves_memory_matching_disk() {
        let tmp = TempDir::new().unwrap();
        let mut log = new_log(&tmp).await;
        log.append(Message::user("one")).await.unwrap();
        std::fs::remove_dir_all(log.path().parent().unwrap()).unwrap();

        let result = log.append(Message::user("two")).await;
        assert!(matches!(result, Err(LogError::Io(_))));
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().unwrap().content, "one");
    }

    #[tokio::test]
    async fn failed_undo_restores_messages() {
        let tmp = TempDir::new().unwrap();
        let mut log = new_log(&tmp).await;
        log.append(Message::user("one")).await.unwrap();
        log.append(Message::assistant("two")).await.unwrap();
        log.append(Message::user("/undo")).await.unwrap();
        let before = log.messages().to_vec();
        std::fs::remove_dir_all(log.path().parent().unwrap()).unwrap();

        assert!(log.undo(1).await.is_err());
        assert_eq!(log.messages(), &before[..]);
    }

    #[tokio::test]
    async fn failed_replace_and_pop_roll_back() {
        let tmp = TempDir::new().unwrap();
        let mut log = new_log(&tmp).await;
        log.append(Message::user("keep")).await.unwrap();
        std::fs::remove_dir_all(log.path().parent().unwrap()).unwrap();

        assert!(log.replace(0, Message::user("changed")).await.is_err());
        assert_eq!(log.messages()[0].content, "keep");
        assert!(log.pop().await.is_err());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn undo_on_empty_log_reports_nothing() {
        let tmp = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut log = new_log(&tmp).await.with_sink(sink.clone());

        let removed = log.undo(1).await.unwrap();
        assert!(removed.is_empty());
        assert!(log.is_empty());
        assert_eq!(*sink.notices.lock().unwrap(), vec!["Nothing to undo.".to_string()]);
    }

    #[tokio::test]
    async fn undo_more_than_len_clears_log() {
        let tmp = TempDir::new().unwrap();
        let mut log = new_log(&tmp).await;
        log.append(Message::user("only")).await.unwrap();
        let removed = log.undo(10).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn rename_moves_conversation_dir() {
        let tmp = TempDir::new().unwrap();
        let mut log = new_log(&tmp).await;
        log.append(Message::user("hi")).await.unwrap();

        log.rename("renamed").await.unwrap();
        assert_eq!(log.path(), tmp.path().join("renamed").join(CONVERSATION_FILE));
        assert_eq!(log.name(), "renamed");
        assert!(!tmp.path().join("test-conv").exists());

        log.append(Message::assistant("still here")).await.unwrap();
        let reloaded = ConversationLog::load("renamed", tmp.path(), Vec::new())
            .await
            .unwrap();
        assert_eq!(reloaded.len(), 2);
    }

    #[tokio::test]
    async fn rename_refuses_existing_target() {
        let tmp = TempDir::new().unwrap();
        ConversationLog::create(tmp.path(), "taken", Vec::new())
            .await
            .unwrap();
        let mut log = new_log(&tmp).await;
        let result = log.rename("taken").await;
        assert!(matches!(result, Err(LogError::AlreadyExists { .. })));
        assert_eq!(log.name(), "test-conv");
    }

    #[tokio::test]
    async fn rename_rejects_path_like_names() {
        let tmp = TempDir::new().unwrap();
        let mut log = new_log(&tmp).await;
        assert!(matches!(
            log.rename("../escape").await,
            Err(LogError::InvalidName { .. })
        ));
    }

    #[tokio::test]
    async fn fork_leaves_original_untouched() {
        let tmp = TempDir::new().unwrap();
        let mut log = new_log(&tmp).await;
        log.append(Message::user("shared")).await.unwrap();
        let original = log.path().to_path_buf();

        log.fork("branch").await.unwrap();
        log.append(Message::assistant("only in branch")).await.unwrap();

        let old = std::fs::read_to_string(&original).unwrap();
        assert_eq!(old.lines().count(), 1);
        let new = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(new.lines().count(), 2);
    }

    #[tokio::test]
    async fn last_code_block_scans_from_tail() {
        let tmp = TempDir::new().unwrap();
        let mut log = new_log(&tmp).await;
        log.append(Message::assistant("```shell\nls\n```")).await.unwrap();
        log.append(Message::user("thanks")).await.unwrap();
        assert_eq!(log.get_last_code_block(), Some("ls\n"));
    }

    #[tokio::test]
    async fn print_skips_hidden_unless_requested() {
        let tmp = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut log = new_log(&tmp).await.with_sink(sink.clone());
        log.append(Message::system("secret").with_hide(true).with_quiet(true))
            .await
            .unwrap();
        log.append(Message::user("visible").with_quiet(true))
            .await
            .unwrap();

        log.print(false);
        assert_eq!(*sink.shown.lock().unwrap(), vec!["visible".to_string()]);
        sink.shown.lock().unwrap().clear();
        log.print(true);
        assert_eq!(sink.shown.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_conversations_sorted_and_counts() {
        let tmp = TempDir::new().unwrap();
        let mut first = ConversationLog::create(tmp.path(), "first", Vec::new())
            .await
            .unwrap();
        first.append(Message::user("a")).await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let mut second = ConversationLog::create(tmp.path(), "second", Vec::new())
            .await
            .unwrap();
        second.append(Message::user("b")).await.unwrap();
        second.append(Message::assistant("c")).await.unwrap();
        std::fs::create_dir(tmp.path().join("not-a-conversation")).unwrap();

        let list = list_conversations(tmp.path()).await.unwrap();
        let names: Vec<_> = list.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(list[1].messages, 2);
    }

    #[tokio::test]
    async fn list_conversations_missing_dir_is_empty() {
        let list = list_conversations(Path::new("/definitely/not/here"))
            .await
            .unwrap();
        assert!(list.is_empty());
    }
}
