//! Interactive input: a line reader with two out-of-band signals.
//!
//! Every read can end in a value, an interrupt (ctrl-c), or end-of-input
//! (ctrl-d). The two signals are distinct on purpose: during message
//! elicitation an interrupt unwinds one logical frame while end-of-input
//! terminates the enclosing collection or stream (see [`crate::fill`]).

use std::collections::VecDeque;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// Out-of-band result of a prompt read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSignal {
    /// The user interrupted the prompt (ctrl-c).
    Interrupt,
    /// The user signalled end-of-input (ctrl-d).
    Eof,
}

/// A synchronous line reader with cancellation.
pub trait Prompt {
    /// Reads one line, displaying `label` in front of the cursor.
    fn input(&mut self, label: &str) -> Result<String, PromptSignal>;

    /// Presents a numbered menu and reads the chosen index.
    ///
    /// Implementations must only return indices below `options.len()`;
    /// out-of-range input re-prompts.
    fn select(&mut self, label: &str, options: &[String]) -> Result<usize, PromptSignal>;
}

/// The interactive prompt used by the `grepl` binary, backed by `rustyline`.
pub struct LinePrompt {
    editor: DefaultEditor,
}

impl LinePrompt {
    pub fn new() -> Result<Self, ReadlineError> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }

    fn read(&mut self, label: &str) -> Result<String, PromptSignal> {
        match self.editor.readline(label) {
            Ok(line) => {
                let _ = self.editor.add_history_entry(line.as_str());
                Ok(line)
            }
            Err(ReadlineError::Interrupted) => Err(PromptSignal::Interrupt),
            // Any other editor failure means we cannot read further input,
            // which the REPL treats the same as end-of-input.
            Err(_) => Err(PromptSignal::Eof),
        }
    }
}

impl Prompt for LinePrompt {
    fn input(&mut self, label: &str) -> Result<String, PromptSignal> {
        self.read(label)
    }

    fn select(&mut self, label: &str, options: &[String]) -> Result<usize, PromptSignal> {
        println!("{label}");
        for (i, option) in options.iter().enumerate() {
            println!("  {i}: {option}");
        }
        loop {
            let line = self.read("choose => ")?;
            match line.trim().parse::<usize>() {
                Ok(i) if i < options.len() => return Ok(i),
                _ => println!("enter an index between 0 and {}", options.len() - 1),
            }
        }
    }
}

/// One scripted reply for [`ScriptedPrompt`].
#[derive(Debug, Clone)]
pub enum ScriptedEntry {
    Line(String),
    Interrupt,
    Eof,
}

/// A prompt that replays a fixed script instead of reading a terminal.
///
/// Used for scripted (non-interactive) sessions and throughout the test
/// suite. Once the script is exhausted every read yields
/// [`PromptSignal::Eof`].
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    entries: VecDeque<ScriptedEntry>,
}

impl ScriptedPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one input line.
    pub fn line(mut self, text: impl Into<String>) -> Self {
        self.entries.push_back(ScriptedEntry::Line(text.into()));
        self
    }

    /// Appends a menu choice (an index typed as a line).
    pub fn index(self, index: usize) -> Self {
        self.line(index.to_string())
    }

    /// Appends an interrupt signal.
    pub fn interrupt(mut self) -> Self {
        self.entries.push_back(ScriptedEntry::Interrupt);
        self
    }

    /// Appends an end-of-input signal.
    pub fn eof(mut self) -> Self {
        self.entries.push_back(ScriptedEntry::Eof);
        self
    }
}

impl Prompt for ScriptedPrompt {
    fn input(&mut self, _label: &str) -> Result<String, PromptSignal> {
        match self.entries.pop_front() {
            Some(ScriptedEntry::Line(line)) => Ok(line),
            Some(ScriptedEntry::Interrupt) => Err(PromptSignal::Interrupt),
            Some(ScriptedEntry::Eof) | None => Err(PromptSignal::Eof),
        }
    }

    fn select(&mut self, label: &str, options: &[String]) -> Result<usize, PromptSignal> {
        loop {
            let line = self.input(label)?;
            if let Ok(i) = line.trim().parse::<usize>()
                && i < options.len()
            {
                return Ok(i);
            }
        }
    }
}
