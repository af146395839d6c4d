//! Fold files and URLs mentioned in user text into the message.
//!
//! The pipeline is tokenize → classify → resolve. Tokens come from the
//! message text with fenced code blocks removed. A token is a candidate when
//! it looks like a path or URL, or when its first path segment names an
//! entry of the working directory. Text files are appended as fenced blocks
//! labelled with the token, images and PDFs are attached to `files`, and
//! URLs are fetched through the configured [`UrlFetcher`].

use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tandem_types::{Message, Role, UrlFetcher, codeblock};

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?\n```").expect("valid code block regex"));

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://[^/\s?#]+").expect("valid url regex")
});

/// Attachable non-text file extensions.
const ATTACHABLE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "pdf"];

/// Path prefixes that always make a token a candidate.
const PATH_PREFIXES: &[&str] = &["/", "~/", "./"];

/// Environment for resolving candidates.
pub struct IncludeContext<'a> {
    /// Directory that is listed for bare names and used for relative paths.
    pub cwd: &'a Path,
    /// Attached files are stored relative to this directory when under it.
    pub workspace: Option<&'a Path>,
    /// Registered command names; tokens like `/undo` are never paths.
    pub commands: &'a [&'a str],
    pub fetcher: Option<&'a dyn UrlFetcher>,
}

enum Resolved {
    Text(Vec<String>),
    File(PathBuf),
    Nothing,
}

/// Return a copy of `msg` with referenced file and URL contents included.
///
/// Only user messages are processed. Resolution failures are logged and
/// skipped; they never fail the call.
pub async fn include_paths(msg: &Message, ctx: &IncludeContext<'_>) -> Message {
    if msg.role != Role::User {
        return msg.clone();
    }

    let listing = list_dir(ctx.cwd).await;
    let stripped = CODE_BLOCK.replace_all(&msg.content, "");

    let mut append = String::new();
    let mut files = Vec::new();
    for token in tokenize(&stripped) {
        if !is_candidate(token, &listing) || is_command(token, ctx.commands) {
            continue;
        }
        tracing::debug!("Potential path/url: {token}");
        match resolve(token, ctx).await {
            Resolved::Text(blocks) => {
                for block in blocks {
                    append.push_str("\n\n");
                    append.push_str(&block);
                }
            }
            Resolved::File(path) => files.push(path),
            Resolved::Nothing => {}
        }
    }

    let mut out = msg.clone();
    if !files.is_empty() {
        out.files.extend(files);
    }
    if !append.is_empty() {
        out.content.push_str(&append);
    }
    out
}

/// Split on whitespace and backticks, strip wrapping backticks and one trailing `?`.
fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == '`')
        .map(|word| {
            let word = word.trim_matches('`');
            word.strip_suffix('?').unwrap_or(word)
        })
        .filter(|word| !word.is_empty())
}

fn is_candidate(token: &str, listing: &HashSet<String>) -> bool {
    PATH_PREFIXES.iter().any(|p| token.starts_with(p))
        || token.starts_with("http")
        || token
            .split('/')
            .next()
            .is_some_and(|first| listing.contains(first))
}

fn is_command(token: &str, commands: &[&str]) -> bool {
    commands
        .iter()
        .any(|cmd| token.strip_prefix('/').is_some_and(|rest| rest.starts_with(cmd)))
}

fn is_url(word: &str) -> bool {
    URL.is_match(word)
}

async fn resolve(token: &str, ctx: &IncludeContext<'_>) -> Resolved {
    let path = expand(token, ctx.cwd);
    if path.is_file() {
        return match read_text(&path).await {
            Some(text) => Resolved::Text(vec![codeblock(token, &text)]),
            None if is_attachable(&path) => Resolved::File(relative_to_workspace(path, ctx)),
            None => Resolved::Nothing,
        };
    }

    // One level of word splitting: inline existing text files and fetch URLs.
    let mut blocks = Vec::new();
    let mut urls = Vec::new();
    for word in token.split_whitespace() {
        let path = expand(word, ctx.cwd);
        if path.is_file() {
            if let Some(text) = read_text(&path).await {
                blocks.push(codeblock(word, &text));
            }
        } else if is_url(word) {
            urls.push(word);
        }
    }

    if !urls.is_empty() {
        match ctx.fetcher {
            None => tracing::warn!("URL fetching not available, skipping {}", urls.join(", ")),
            Some(fetcher) => {
                for url in urls {
                    match fetcher.fetch(url).await {
                        Ok(text) => blocks.push(codeblock(url, &text)),
                        Err(e) => tracing::warn!("Failed to read URL {url}: {e}"),
                    }
                }
            }
        }
    }

    if blocks.is_empty() {
        Resolved::Nothing
    } else {
        Resolved::Text(blocks)
    }
}

/// Read `path` as UTF-8 text. `None` for binary content or I/O failures.
async fn read_text(path: &Path) -> Option<String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8(bytes).ok(),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            None
        }
    }
}

fn expand(token: &str, cwd: &Path) -> PathBuf {
    if let Some(rest) = token.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    cwd.join(token)
}

fn is_attachable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ATTACHABLE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn relative_to_workspace(path: PathBuf, ctx: &IncludeContext<'_>) -> PathBuf {
    match ctx.workspace.and_then(|ws| path.strip_prefix(ws).ok()) {
        Some(rel) => rel.to_path_buf(),
        None => path,
    }
}

async fn list_dir(dir: &Path) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to list {}: {}", dir.display(), e);
            return names;
        }
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        names.insert(entry.file_name().to_string_lossy().into_owned());
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use tandem_types::ToolError;
    use tempfile::TempDir;

    const COMMANDS: &[&str] = &["undo", "log", "exit"];

    struct StubFetcher {
        requested: Mutex<Vec<String>>,
        fail: bool,
    }

    impl StubFetcher {
        fn new(fail: bool) -> Self {
            Self {
                requested: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    impl UrlFetcher for StubFetcher {
        fn fetch<'a>(
            &'a self,
            url: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>> {
            self.requested.lock().unwrap().push(url.to_string());
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(ToolError::Fetch {
                        url: url.to_string(),
                        message: "connection refused".into(),
                    })
                } else {
                    Ok(format!("page at {url}"))
                }
            })
        }
    }

    fn ctx<'a>(dir: &'a Path, fetcher: Option<&'a dyn UrlFetcher>) -> IncludeContext<'a> {
        IncludeContext {
            cwd: dir,
            workspace: Some(dir),
            commands: COMMANDS,
            fetcher,
        }
    }

    #[tokio::test]
    async fn includes_text_file_contents() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "hello").unwrap();

        let msg = Message::user("summarize ./notes.txt");
        let out = include_paths(&msg, &ctx(tmp.path(), None)).await;
        assert_eq!(out.content, "summarize ./notes.txt\n\n```./notes.txt\nhello\n```");
        assert_eq!(msg.content, "summarize ./notes.txt");
    }

    #[tokio::test]
    async fn bare_names_from_cwd_listing_and_trailing_question_mark() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src").join("main.rs"), "fn main() {}").unwrap();

        let msg = Message::user("what does `src/main.rs` do?");
        let out = include_paths(&msg, &ctx(tmp.path(), None)).await;
        assert!(out.content.ends_with("\n\n```src/main.rs\nfn main() {}\n```"));
    }

    #[tokio::test]
    async fn paths_inside_code_blocks_are_ignored() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "hello").unwrap();

        let msg = Message::user("example:\n```sh\ncat ./notes.txt\n```\nthat's all");
        let out = include_paths(&msg, &ctx(tmp.path(), None)).await;
        assert_eq!(out.content, msg.content);
    }

    #[tokio::test]
    async fn images_are_attached_not_inlined() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("shot.png"), [0x89, 0x50, 0x4e, 0x47, 0xff, 0xfe]).unwrap();

        let msg = Message::user("look at ./shot.png");
        let out = include_paths(&msg, &ctx(tmp.path(), None)).await;
        assert_eq!(out.content, msg.content);
        assert_eq!(out.files, vec![PathBuf::from("shot.png")]);
    }

    #[tokio::test]
    async fn unsupported_binary_is_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let msg = Message::user("./blob.bin");
        let out = include_paths(&msg, &ctx(tmp.path(), None)).await;
        assert_eq!(out, msg);
    }

    #[tokio::test]
    async fn command_tokens_are_not_paths() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("undo"), "not me").unwrap();

        let msg = Message::user("/undo 2");
        let out = include_paths(&msg, &ctx(tmp.path(), None)).await;
        assert_eq!(out, msg);
    }

    #[tokio::test]
    async fn urls_go_through_fetcher() {
        let tmp = TempDir::new().unwrap();
        let fetcher = StubFetcher::new(false);

        let msg = Message::user("read https://example.com/docs please");
        let out = include_paths(&msg, &ctx(tmp.path(), Some(&fetcher))).await;
        assert!(out.content.ends_with(
            "\n\n```https://example.com/docs\npage at https://example.com/docs\n```"
        ));
        assert_eq!(fetcher.requested.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let fetcher = StubFetcher::new(true);

        let msg = Message::user("https://example.com");
        let out = include_paths(&msg, &ctx(tmp.path(), Some(&fetcher))).await;
        assert_eq!(out, msg);
    }

    #[tokio::test]
    async fn urls_without_fetcher_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let msg = Message::user("https://example.com");
        let out = include_paths(&msg, &ctx(tmp.path(), None)).await;
        assert_eq!(out, msg);
    }

    #[tokio::test]
    async fn non_user_messages_pass_through() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "hello").unwrap();
        let msg = Message::assistant("see ./notes.txt");
        let out = include_paths(&msg, &ctx(tmp.path(), None)).await;
        assert_eq!(out, msg);
    }

    #[test]
    fn tokenizer_strips_backticks_and_question_mark() {
        let tokens: Vec<&str> = tokenize("is `./a.txt`? or ./b.md??").collect();
        assert_eq!(tokens, vec!["is", "./a.txt", "or", "./b.md?"]);
    }

    #[test]
    fn url_detection_requires_scheme_and_host() {
        assert!(is_url("https://example.com/path"));
        assert!(is_url("ftp://host"));
        assert!(!is_url("http"));
        assert!(!is_url("https://"));
        assert!(!is_url("example.com"));
    }
}
