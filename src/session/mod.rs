//! Chat session
//!
//! [`Session`] owns the live conversation and drives one interactive chat:
//! it reads lines, dispatches commands, streams replies from the inference
//! backend and keeps the transcript up to date.

pub mod commands;
pub mod transcript;

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::inference::template::build_prompt_window;
use crate::inference::{CancelFlag, InferenceBackend, PromptMessage};
use crate::storage::history::HistoryStore;
use crate::types::config::GenerationConfig;
use crate::types::message::Turn;
use crate::ui;
use commands::{parse_input, Command, Input};
use transcript::{Conversation, CHARS_PER_TOKEN};

/// Whether the loop keeps going after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Lets a signal handler stop the reply being streamed
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    cancel: CancelFlag,
    generating: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Request a stop. Returns false when no reply was streaming.
    pub fn interrupt(&self) -> bool {
        if self.generating.load(Ordering::Relaxed) {
            self.cancel.cancel();
            true
        } else {
            false
        }
    }

    fn begin(&self) {
        self.cancel.reset();
        self.generating.store(true, Ordering::Relaxed);
    }

    fn end(&self) {
        self.generating.store(false, Ordering::Relaxed);
    }
}

/// The state of one interactive chat
pub struct Session<B: InferenceBackend> {
    backend: B,
    history: HistoryStore,
    generation: GenerationConfig,
    system_prompt: String,
    conversation: Conversation,
    started_at: Instant,
    interrupt: InterruptHandle,
}

impl<B: InferenceBackend> Session<B> {
    pub fn new(
        backend: B,
        history: HistoryStore,
        generation: GenerationConfig,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            history,
            generation,
            system_prompt: system_prompt.into(),
            conversation: Conversation::new(None),
            started_at: Instant::now(),
            interrupt: InterruptHandle::default(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Read lines until `/quit` or end of input
    pub fn run(&mut self, input: &mut dyn BufRead, out: &mut dyn Write) -> io::Result<()> {
        let mut raw = Vec::new();
        loop {
            write!(out, "\n💬 ")?;
            out.flush()?;

            raw.clear();
            match input.read_until(b'\n', &mut raw) {
                Ok(0) => {
                    writeln!(out)?;
                    tracing::info!("End of input, leaving session");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let line = match std::str::from_utf8(&raw) {
                Ok(line) => line,
                Err(e) => {
                    tracing::debug!("Rejected input line: {}", e);
                    ui::print_error(out, &"Input is not valid UTF-8, line ignored")?;
                    continue;
                }
            };

            if self.handle_line(line, out)? == Flow::Quit {
                return Ok(());
            }
        }
    }

    /// Handle a single line of user input
    pub fn handle_line(&mut self, line: &str, out: &mut dyn Write) -> io::Result<Flow> {
        match parse_input(line) {
            Ok(Input::Empty) => Ok(Flow::Continue),
            Ok(Input::Chat(text)) => {
                self.chat(text, out)?;
                Ok(Flow::Continue)
            }
            Ok(Input::Command(command)) => self.execute(command, out),
            Err(e) => {
                ui::print_error(out, &e)?;
                writeln!(out, "💡 Type /help for available commands")?;
                Ok(Flow::Continue)
            }
        }
    }

    fn execute(&mut self, command: Command, out: &mut dyn Write) -> io::Result<Flow> {
        tracing::debug!("Executing {:?}", command);
        match command {
            Command::Help => ui::print_help(out)?,
            Command::Clear => {
                if self.conversation.is_empty() {
                    ui::print_warning(out, "Chat is already empty")?;
                } else {
                    self.conversation.clear();
                    ui::print_ok(out, "Chat cleared")?;
                }
            }
            Command::Save(name) => self.save(name.as_deref(), out)?,
            Command::Load(name) => self.load(&name, out)?,
            Command::List => match self.history.list() {
                Ok(records) => ui::print_saved_list(out, &records)?,
                Err(e) => ui::print_error(out, &e)?,
            },
            Command::Stats => self.print_stats(out)?,
            Command::History(n) => {
                ui::print_history(out, self.conversation.recent(n), self.conversation.len())?
            }
            Command::Quit => {
                writeln!(out, "\n👋 Goodbye!")?;
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    fn save(&mut self, name: Option<&str>, out: &mut dyn Write) -> io::Result<()> {
        if self.conversation.is_empty() {
            return ui::print_warning(out, "No chat to save!");
        }

        match self.history.save(&self.conversation, name, &self.system_prompt) {
            Ok(saved) => {
                let path = self.history.dir().join(format!("{saved}.json"));
                self.conversation.name = Some(saved);
                writeln!(out, "✅ Chat saved: {}", path.display())
            }
            Err(e) => {
                tracing::warn!("Save failed: {}", e);
                ui::print_error(out, &format!("Error saving chat: {e}"))
            }
        }
    }

    fn load(&mut self, name: &str, out: &mut dyn Write) -> io::Result<()> {
        match self.history.load(name) {
            Ok(conversation) => {
                let discarded = self.conversation.len();
                self.conversation = conversation;
                if discarded > 0 {
                    ui::print_warning(out, &format!("Discarded {discarded} unsaved turns"))?;
                }
                ui::print_ok(
                    out,
                    &format!(
                        "Loaded '{}' ({} turns)",
                        self.conversation.name.as_deref().unwrap_or(name),
                        self.conversation.len()
                    ),
                )
            }
            Err(e) => ui::print_error(out, &e),
        }
    }

    fn print_stats(&self, out: &mut dyn Write) -> io::Result<()> {
        let stats = self.conversation.stats();
        let uptime = chrono::Duration::from_std(self.started_at.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        ui::print_stats(
            out,
            &ui::StatsView {
                stats: &stats,
                system_prompt_tokens: self.system_prompt.chars().count() / CHARS_PER_TOKEN,
                context_length: self.backend.context_length(),
                conversation_name: self.conversation.name.as_deref(),
                uptime,
            },
        )
    }

    /// Send a chat message and stream the reply into the transcript
    fn chat(&mut self, text: String, out: &mut dyn Write) -> io::Result<()> {
        self.conversation.append(Turn::user(text));

        let prompt = build_prompt_window(
            &self.system_prompt,
            self.conversation.all(),
            self.backend.context_length(),
            self.generation.max_new_tokens,
        );

        self.interrupt.begin();
        let result = self.stream_reply(&prompt, out);
        self.interrupt.end();
        result
    }

    /// Whatever text arrived becomes the assistant turn, even when the
    /// stream failed or was cancelled part way.
    fn stream_reply(&mut self, prompt: &[PromptMessage], out: &mut dyn Write) -> io::Result<()> {
        let stream = match self.backend.stream_generate(
            prompt,
            &self.generation,
            self.interrupt.cancel.clone(),
        ) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Could not start generation: {}", e);
                return ui::print_error(out, &e);
            }
        };

        write!(out, "\n🤖 ")?;
        out.flush()?;

        let mut reply = String::new();
        let mut failure = None;
        for item in stream {
            match item {
                Ok(fragment) => {
                    out.write_all(fragment.as_bytes())?;
                    out.flush()?;
                    reply.push_str(&fragment);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        writeln!(out)?;

        let text = reply.trim();
        if text.is_empty() {
            if failure.is_none() {
                ui::print_warning(out, "No response generated.")?;
            }
        } else {
            self.conversation.append(Turn::assistant(text));
        }

        if let Some(e) = failure {
            tracing::warn!("Generation failed mid-stream: {}", e);
            ui::print_error(out, &e)?;
        }
        if self.interrupt.cancel.is_cancelled() {
            ui::print_warning(out, "Interrupted, partial response kept.")?;
        }
        Ok(())
    }
}
