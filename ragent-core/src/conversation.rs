//! Line-oriented conversation driver.
//!
//! Owns the transcript between turns and hands it to the executor by value.
//! A failed turn is reported and the previous transcript kept.

use crate::graph::GraphExecutor;
use crate::types::{Message, TokenUsage};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

/// Inputs that end the conversation (compared case-insensitively).
pub const EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

/// What happened with one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// The user asked to leave.
    Exit,
    /// Blank input; nothing was run.
    Skipped,
    /// A turn completed with this reply.
    Reply(String),
    /// The turn failed with this error message.
    Failed(String),
}

/// Whether `line` is an exit command.
pub fn is_exit_command(line: &str) -> bool {
    let lowered = line.trim().to_lowercase();
    EXIT_COMMANDS.contains(&lowered.as_str())
}

/// Interactive loop around a [`GraphExecutor`].
pub struct ConversationLoop {
    executor: GraphExecutor,
    history: Vec<Message>,
    title: String,
}

impl ConversationLoop {
    pub fn new(executor: GraphExecutor) -> Self {
        Self {
            executor,
            history: Vec::new(),
            title: "Ragent RAG Agent".to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Transcript carried between turns.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Tokens spent by every turn so far.
    pub fn usage(&self) -> TokenUsage {
        self.executor.brain().total_usage()
    }

    /// Process one input line without any terminal I/O.
    pub async fn handle_line(&mut self, line: &str) -> LineOutcome {
        if is_exit_command(line) {
            return LineOutcome::Exit;
        }
        if line.trim().is_empty() {
            return LineOutcome::Skipped;
        }

        let mut seed = self.history.clone();
        seed.push(Message::user(line));

        match self.executor.invoke(seed).await {
            Ok(outcome) => {
                let reply = outcome.reply().to_string();
                self.history = outcome.into_messages();
                info!(messages = self.history.len(), "Turn committed to history");
                LineOutcome::Reply(reply)
            }
            Err(e) => {
                error!(error = %e, "Turn failed");
                LineOutcome::Failed(e.to_string())
            }
        }
    }

    /// Read lines from `input` until an exit command or end of input, writing
    /// prompts and replies to `output`.
    pub async fn run<R, W>(&mut self, input: R, output: &mut W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        output
            .write_all(
                format!(
                    "=== {} ===\nType 'exit' or 'quit' to end the conversation.\n\n",
                    self.title
                )
                .as_bytes(),
            )
            .await?;

        let mut lines = input.lines();
        loop {
            output.write_all(b"User: ").await?;
            output.flush().await?;

            let Some(line) = lines.next_line().await? else {
                output.write_all(b"\n").await?;
                break;
            };

            if is_exit_command(&line) {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }

            output.write_all(b"\n--- Agent Processing ---\n").await?;
            output.flush().await?;

            let text = match self.handle_line(&line).await {
                LineOutcome::Reply(reply) => format!("\nAgent: {}\n\n", reply),
                LineOutcome::Failed(message) => format!("\nError: {}\n\n", message),
                LineOutcome::Exit | LineOutcome::Skipped => continue,
            };
            output.write_all(text.as_bytes()).await?;
        }
        output.flush().await
    }
}
