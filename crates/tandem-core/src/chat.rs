//! The conversation loop: decide whose turn it is, call the model, run tools.

use crate::commands::{CommandOutcome, CommandRegistry};
use crate::error::ChatError;
use crate::include::{IncludeContext, include_paths};
use crate::input::{InputError, InputSource, QueuedInput};
use crate::interrupt::{Armed, InterruptController};
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tandem_session::{ContextPreparer, ContextTracker, ConversationLog};
use tandem_types::provider::{GenerateRequest, ModelBackend};
use tandem_types::{
    AutoConfirm, Confirm, Message, Role, ToolEngine, ToolFormat, ToolSpec, UrlFetcher, shorten,
};

/// Maximum number of generate/execute cycles for a single prompt.
pub const MAX_CYCLES_PER_PROMPT: usize = 50;

/// Tokens reserved for the model's reply when deriving the default budget.
const RESPONSE_TOKENS: u64 = 8192;

const PROMPT_USER: &str = "User: ";

/// Settings that shape one conversation run.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub stream: bool,
    /// Ask for input once queued prompts are exhausted.
    pub interactive: bool,
    pub tool_format: ToolFormat,
    /// Directory that attached file paths are made relative to.
    pub workspace: Option<PathBuf>,
    /// Directory used to resolve paths mentioned in user input.
    pub cwd: PathBuf,
}

/// How a single cycle ended.
enum CycleEnd {
    /// Response logged and its tool results exhausted.
    Done,
    /// Cancelled; the sentinel has been logged.
    Interrupted,
    /// The backend failed; reported to the user.
    Failed,
    /// A command produced by a tool ran.
    Command(CommandOutcome),
}

/// Whether the loop keeps going after a response sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// The cycle limit was reached or the backend failed; ask the user
    /// before generating again.
    Stalled,
    Exit,
}

/// Drives a conversation between the user, the model backend and the tools.
pub struct Chat {
    backend: Arc<dyn ModelBackend>,
    tools: Arc<dyn ToolEngine>,
    commands: CommandRegistry,
    preparer: ContextPreparer,
    interrupt: InterruptController,
    confirm: Arc<dyn Confirm>,
    input: Box<dyn InputSource>,
    fetcher: Option<Arc<dyn UrlFetcher>>,
    options: ChatOptions,
}

impl Chat {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        tools: Arc<dyn ToolEngine>,
        options: ChatOptions,
    ) -> Self {
        let window = ContextTracker::new(&options.model).context_window();
        Self {
            backend,
            tools,
            commands: CommandRegistry::builtin(),
            preparer: ContextPreparer::new(window.saturating_sub(RESPONSE_TOKENS)),
            interrupt: InterruptController::new(),
            confirm: Arc::new(AutoConfirm),
            input: Box::new(QueuedInput::default()),
            fetcher: None,
            options,
        }
    }

    pub fn with_interrupt(mut self, interrupt: InterruptController) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_input(mut self, input: Box<dyn InputSource>) -> Self {
        self.input = input;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn UrlFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_preparer(mut self, preparer: ContextPreparer) -> Self {
        self.preparer = preparer;
        self
    }

    pub fn model(&self) -> &str {
        &self.options.model
    }

    pub fn preparer(&self) -> &ContextPreparer {
        &self.preparer
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn interrupt(&self) -> &InterruptController {
        &self.interrupt
    }

    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools.specs()
    }

    /// Run the conversation until the prompts are exhausted (non-interactive),
    /// input ends, or `/exit`.
    ///
    /// Each queued prompt is processed fully, including tool cycles, before
    /// the next one is taken.
    pub async fn run(
        &self,
        log: &mut ConversationLog,
        prompts: Vec<Message>,
    ) -> Result<(), ChatError> {
        let mut queue: VecDeque<Message> = prompts.into();
        let had_prompts = !queue.is_empty();

        while let Some(prompt) = queue.pop_front() {
            let msg = if self.commands.is_command(&prompt) {
                prompt
            } else {
                self.include(&prompt).await
            };
            log.append(msg.clone()).await?;
            match self.commands.execute(&msg, self, log).await? {
                Some(CommandOutcome::Exit) => return Ok(()),
                Some(CommandOutcome::Handled) => continue,
                None => {}
            }
            if self.respond(log).await? == Flow::Exit {
                return Ok(());
            }
        }

        if !self.options.interactive {
            if !had_prompts && needs_response(log) {
                self.respond(log).await?;
            }
            tracing::debug!("Non-interactive and prompts exhausted, exiting");
            return Ok(());
        }

        let mut force_prompt = false;
        loop {
            match self.step(log, force_prompt).await? {
                Flow::Exit => return Ok(()),
                Flow::Stalled => force_prompt = true,
                Flow::Continue => force_prompt = false,
            }
        }
    }

    /// One interactive pass: read input if the log does not already demand
    /// a response, then run response cycles.
    async fn step(&self, log: &mut ConversationLog, force_prompt: bool) -> Result<Flow, ChatError> {
        if force_prompt || !needs_response(log) {
            let Some(text) = self.read_line(PROMPT_USER).await? else {
                return Ok(Flow::Exit);
            };
            let input = Message::user(text).with_quiet(true);
            let msg = if self.commands.is_command(&input) {
                input
            } else {
                self.include(&input).await
            };
            log.append(msg.clone()).await?;
            match self.commands.execute(&msg, self, log).await? {
                Some(CommandOutcome::Exit) => return Ok(Flow::Exit),
                Some(CommandOutcome::Handled) => return Ok(Flow::Continue),
                None => {}
            }
        }
        self.respond(log).await
    }

    /// Run cycles until the latest assistant message has nothing left to run.
    async fn respond(&self, log: &mut ConversationLog) -> Result<Flow, ChatError> {
        for _ in 0..MAX_CYCLES_PER_PROMPT {
            match self.generate_and_execute(log).await? {
                CycleEnd::Done => {}
                CycleEnd::Interrupted => return Ok(Flow::Continue),
                CycleEnd::Failed => return Ok(Flow::Stalled),
                CycleEnd::Command(CommandOutcome::Exit) => return Ok(Flow::Exit),
                CycleEnd::Command(CommandOutcome::Handled) => return Ok(Flow::Continue),
            }

            let runnable = log
                .messages()
                .iter()
                .rev()
                .find(|m| m.role == Role::Assistant)
                .is_some_and(|m| self.tools.has_runnable(&m.content));
            if !runnable {
                return Ok(Flow::Continue);
            }
        }

        tracing::warn!("Stopped after {} cycles without a final response", MAX_CYCLES_PER_PROMPT);
        log.sink().notice(&format!(
            "Stopped after {MAX_CYCLES_PER_PROMPT} tool cycles. Send a message to continue."
        ));
        Ok(Flow::Stalled)
    }

    /// Prepare context, call the backend, log the response, run its tools.
    async fn generate_and_execute(&self, log: &mut ConversationLog) -> Result<CycleEnd, ChatError> {
        let armed = self.interrupt.arm();

        let messages = self.preparer.prepare(log.messages());
        for m in &messages {
            tracing::debug!("Prepared message: {}: {}", m.role, shorten(&m.content, 80));
        }
        let tools = match self.options.tool_format {
            ToolFormat::Tool => Some(self.tools.specs()),
            ToolFormat::Markdown => None,
        };
        let request = GenerateRequest {
            messages,
            model: self.options.model.clone(),
            stream: self.options.stream && self.backend.supports_streaming(),
            tools,
        };

        let result = tokio::select! {
            _ = armed.cancelled() => None,
            result = self.backend.generate(&request) => Some(result),
        };
        let response = match result {
            None => {
                drop(armed);
                log.append(Message::interrupted()).await?;
                return Ok(CycleEnd::Interrupted);
            }
            Some(Err(e)) => {
                drop(armed);
                if !self.options.interactive {
                    return Err(e.into());
                }
                tracing::warn!("{} backend error: {}", self.backend.name(), e);
                log.sink().notice(&format!("Error: {e}"));
                return Ok(CycleEnd::Failed);
            }
            Some(Ok(response)) => response,
        };

        log.append(response.clone().with_quiet(true)).await?;
        self.execute_tools(log, &response, armed).await
    }

    /// Execute the tool uses in `message` under a fresh armed window.
    ///
    /// Used by `/replay` and `/impersonate`.
    pub(crate) async fn replay_tools(
        &self,
        log: &mut ConversationLog,
        message: &Message,
    ) -> Result<CommandOutcome, ChatError> {
        let armed = self.interrupt.arm();
        match self.execute_tools(log, message, armed).await? {
            CycleEnd::Command(outcome) => Ok(outcome),
            _ => Ok(CommandOutcome::Handled),
        }
    }

    /// Append each tool result in turn; stop at the first command.
    async fn execute_tools(
        &self,
        log: &mut ConversationLog,
        message: &Message,
        armed: Armed,
    ) -> Result<CycleEnd, ChatError> {
        let mut command = None;
        let mut interrupted = false;
        {
            let mut results = self.tools.execute(message, self.confirm.clone());
            loop {
                let next = tokio::select! {
                    _ = armed.cancelled() => {
                        interrupted = true;
                        break;
                    }
                    next = results.next() => next,
                };
                let Some(msg) = next else {
                    break;
                };
                log.append(msg.clone()).await?;
                if msg.role == Role::User && self.commands.is_command(&msg) {
                    command = Some(msg);
                    break;
                }
            }
        }
        drop(armed);

        if interrupted {
            log.append(Message::interrupted()).await?;
            return Ok(CycleEnd::Interrupted);
        }
        if let Some(msg) = command {
            if let Some(outcome) = self.commands.execute(&msg, self, log).await? {
                return Ok(CycleEnd::Command(outcome));
            }
        }
        Ok(CycleEnd::Done)
    }

    /// Read a non-blank line. `None` at end of input.
    pub(crate) async fn read_line(&self, prompt: &str) -> Result<Option<String>, ChatError> {
        self.interrupt.disarm();
        loop {
            match self.input.read_line(prompt).await {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => return Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
                Err(InputError::EndOfInput) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn include(&self, msg: &Message) -> Message {
        let names = self.commands.names();
        let ctx = IncludeContext {
            cwd: &self.options.cwd,
            workspace: self.options.workspace.as_deref(),
            commands: &names,
            fetcher: self.fetcher.as_deref(),
        };
        include_paths(msg, &ctx).await
    }
}

/// Whether the log already demands a model response without new input.
///
/// True when the last message exists, is not from the assistant, is not the
/// interruption sentinel, is not pinned, and some user message exists.
pub fn needs_response(log: &ConversationLog) -> bool {
    let Some(last) = log.last() else {
        return false;
    };
    last.role != Role::Assistant
        && !last.is_interrupted()
        && !last.pinned
        && log.messages().iter().any(|m| m.role == Role::User)
}
