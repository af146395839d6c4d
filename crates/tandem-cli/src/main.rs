//! Tandem CLI: a pair-programming assistant in the terminal.

mod display;
mod prompt;

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tandem_api::AnthropicBackend;
use tandem_config::{CliOverrides, TandemConfig};
use tandem_core::{
    Chat, ChatOptions, InterruptController, add_workspace_prompt, initial_prompt,
    resolve_workspace,
};
use tandem_session::{ContextPreparer, ConversationLog, generate_name, list_conversations};
use tandem_tools::{BrowseTool, ToolRegistry};
use tandem_types::{AutoConfirm, Confirm, Message, TandemError, ToolEngine, ToolFormat, codeblock};

/// Exit code used when Ctrl-C terminates the program.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "tandem", version, about = "A pair-programming assistant for the terminal")]
struct Cli {
    /// Prompts to send. Separate multiple prompts with a lone `-`.
    prompts: Vec<String>,

    /// Name of the conversation to create or continue
    #[arg(long, conflicts_with = "resume")]
    name: Option<String>,

    /// Resume a conversation by name (the most recent one if no name is given)
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    resume: Option<String>,

    /// Model to use
    #[arg(long)]
    model: Option<String>,

    /// Workspace directory (`@log` creates one inside the conversation directory)
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Exit once the given prompts are answered
    #[arg(long)]
    non_interactive: bool,

    /// Run tools without asking for confirmation
    #[arg(long)]
    no_confirm: bool,

    /// Wait for complete responses instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Show hidden messages (system prompt) when printing the conversation
    #[arg(long)]
    show_hidden: bool,

    /// How tools are offered to the model: markdown or tool
    #[arg(long)]
    tool_format: Option<ToolFormat>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,

    /// API key (overrides ANTHROPIC_API_KEY)
    #[arg(long)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = TandemConfig::load(CliOverrides {
        api_key: cli.api_key.clone(),
        model: cli.model.clone(),
        stream: cli.no_stream.then_some(false),
        no_confirm: cli.no_confirm.then_some(true),
        tool_format: cli.tool_format,
    })
    .map_err(TandemError::from)?;

    let cwd = std::env::current_dir().context("Failed to read the current directory")?;

    let mut prompts = split_prompts(&cli.prompts);
    let mut interactive = !cli.non_interactive;
    if !io::stdin().is_terminal() {
        let mut piped = String::new();
        io::stdin()
            .read_to_string(&mut piped)
            .context("Failed to read piped input")?;
        if !piped.trim().is_empty() {
            attach_piped(&mut prompts, &piped);
        }
        interactive = false;
    }

    let browse = Arc::new(BrowseTool::new().context("Failed to create HTTP client")?);
    let mut registry = ToolRegistry::with_builtins(&cwd);
    registry.register(browse.clone());

    let initial = initial_prompt(&registry.specs(), config.tool_format);
    let sink = Arc::new(display::TerminalSink);
    // Absolute, since the process moves into the workspace below.
    let logs_dir = cwd.join(&config.logs_dir);
    let mut log = open_log(&cli, &logs_dir, initial)
        .await?
        .with_sink(sink);

    let conversation_dir = log.path().parent().unwrap_or(&cwd).to_path_buf();
    let workspace = resolve_workspace(&conversation_dir, cli.workspace.as_deref(), &cwd).await?;
    std::env::set_current_dir(&workspace)
        .with_context(|| format!("Failed to enter workspace {}", workspace.display()))?;
    tracing::debug!("Using workspace {}", workspace.display());
    registry.set_cwd(&workspace);
    let tools = Arc::new(registry);
    add_workspace_prompt(&mut log, &workspace).await?;

    let backend = AnthropicBackend::new(&config.api_key, &config.api_base_url)
        .context("Failed to create API client")?
        .with_max_tokens(config.max_tokens)
        .with_file_root(&workspace)
        .with_on_delta(display::stream_printer());

    let interrupt = InterruptController::new();
    spawn_ctrl_c_listener(interrupt.clone());

    let confirm: Arc<dyn Confirm> = if config.no_confirm || !interactive {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(prompt::TerminalConfirm)
    };

    let options = ChatOptions {
        model: config.model.clone(),
        stream: config.stream,
        interactive,
        tool_format: config.tool_format,
        workspace: Some(workspace.clone()),
        cwd: workspace,
    };
    let mut chat = Chat::new(Arc::new(backend), tools, options)
        .with_interrupt(interrupt)
        .with_confirm(confirm)
        .with_input(Box::new(prompt::StdinInput))
        .with_fetcher(browse);
    if let Some(budget) = config.context_budget {
        chat = chat.with_preparer(ContextPreparer::new(budget));
    }

    eprintln!(
        "tandem v{} (model: {}, conversation: {})",
        env!("CARGO_PKG_VERSION"),
        config.model,
        log.name()
    );
    if cli.resume.is_some() && !log.is_empty() {
        log.print(cli.show_hidden);
    }
    if interactive {
        eprintln!("Type /help for commands. Press Ctrl+D to exit.\n");
    }

    let prompts = prompts.into_iter().map(Message::user).collect();
    chat.run(&mut log, prompts)
        .await
        .context("Conversation failed")?;
    eprintln!("{}", display::dim(&format!("Conversation saved to {}", log.path().display())));
    Ok(())
}

/// Resolve which conversation to open from `--resume` / `--name`.
async fn open_log(cli: &Cli, logs_dir: &Path, initial: Vec<Message>) -> Result<ConversationLog> {
    match (&cli.resume, &cli.name) {
        (Some(name), _) if name.is_empty() => {
            let latest = list_conversations(logs_dir)
                .await?
                .pop()
                .context("No conversations to resume")?;
            Ok(ConversationLog::load(&latest.path, logs_dir, initial).await?)
        }
        (Some(name), _) => ConversationLog::load(name, logs_dir, initial)
            .await
            .with_context(|| format!("Failed to resume conversation '{name}'")),
        (None, Some(name)) => Ok(ConversationLog::load_or_create(logs_dir, name, initial).await?),
        (None, None) => {
            for _ in 0..5 {
                match ConversationLog::create(logs_dir, &generate_name(), initial.clone()).await {
                    Err(tandem_session::LogError::AlreadyExists { .. }) => continue,
                    other => return Ok(other?),
                }
            }
            bail!("Could not find a free conversation name in {}", logs_dir.display())
        }
    }
}

/// Ctrl-C cancels the running cycle; when nothing is running it exits.
fn spawn_ctrl_c_listener(interrupt: InterruptController) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !interrupt.interrupt() {
                eprintln!();
                std::process::exit(EXIT_INTERRUPTED);
            }
            tracing::debug!("Interrupt delivered to the running cycle");
        }
    });
}

/// Group command-line words into prompts, split at each lone `-`.
fn split_prompts(args: &[String]) -> Vec<String> {
    args.split(|a| a == "-")
        .map(|words| words.join(" "))
        .filter(|p| !p.trim().is_empty())
        .collect()
}

/// Attach piped stdin to the first prompt, or make it the only prompt.
fn attach_piped(prompts: &mut Vec<String>, piped: &str) {
    let block = codeblock("stdin", piped.trim_end());
    match prompts.first_mut() {
        Some(first) => {
            first.push_str("\n\n");
            first.push_str(&block);
        }
        None => prompts.push(block),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn prompts_split_on_lone_dash() {
        let prompts = split_prompts(&args(&["write", "a", "poem", "-", "now", "save", "it"]));
        assert_eq!(prompts, ["write a poem", "now save it"]);
    }

    #[test]
    fn empty_groups_dropped() {
        assert_eq!(split_prompts(&args(&["-", "hi", "-"])), ["hi"]);
        assert!(split_prompts(&[]).is_empty());
    }

    #[test]
    fn piped_input_attached_to_first_prompt() {
        let mut prompts = vec!["explain this".to_string(), "then fix it".to_string()];
        attach_piped(&mut prompts, "error: boom\n");
        assert_eq!(prompts[0], "explain this\n\n```stdin\nerror: boom\n```");
        assert_eq!(prompts[1], "then fix it");

        let mut none = Vec::new();
        attach_piped(&mut none, "data");
        assert_eq!(none, ["```stdin\ndata\n```"]);
    }

    #[test]
    fn cli_parses_resume_without_name() {
        let cli = Cli::try_parse_from(["tandem", "--resume"]).unwrap();
        assert_eq!(cli.resume.as_deref(), Some(""));
        let cli = Cli::try_parse_from(["tandem", "--tool-format", "tool", "hi"]).unwrap();
        assert_eq!(cli.tool_format, Some(ToolFormat::Tool));
        assert_eq!(cli.prompts, ["hi"]);
    }
}
