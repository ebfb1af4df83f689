//! Line-based terminal prompt.
//!
//! Deliberately small: one question per line on stderr, answers on stdin,
//! and `$EDITOR` for the change body. Prompting is disabled when stdin is
//! not a terminal or the user passed `--no-prompt`.

use std::io::{BufRead, IsTerminal, Write};
use std::process::Command;

use trellis_core::cancel::Cancel;
use trellis_core::prompt::{Prompt, PromptError};

pub struct ConsolePrompt {
    interactive: bool,
}

impl ConsolePrompt {
    pub fn new(no_prompt: bool) -> Self {
        Self {
            interactive: !no_prompt && std::io::stdin().is_terminal(),
        }
    }

    fn read_line(&self) -> Result<String, PromptError> {
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|err| PromptError::Failed(err.to_string()))?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn show(&self, text: &str) -> Result<(), PromptError> {
        let mut stderr = std::io::stderr().lock();
        stderr
            .write_all(text.as_bytes())
            .and_then(|()| stderr.flush())
            .map_err(|err| PromptError::Failed(err.to_string()))
    }
}

impl Prompt for ConsolePrompt {
    fn can_prompt(&self) -> bool {
        self.interactive
    }

    fn input(
        &mut self,
        cancel: &Cancel,
        title: &str,
        description: &str,
        initial: &str,
    ) -> Result<String, PromptError> {
        cancel.bail()?;
        if !self.interactive {
            return Err(PromptError::Disabled);
        }
        if initial.is_empty() {
            self.show(&format!("{title} ({description}): "))?;
        } else {
            self.show(&format!("{title} ({description}) [{initial}]: "))?;
        }
        let line = self.read_line()?;
        Ok(if line.is_empty() {
            initial.to_string()
        } else {
            line
        })
    }

    fn select(
        &mut self,
        cancel: &Cancel,
        title: &str,
        options: &[String],
    ) -> Result<usize, PromptError> {
        cancel.bail()?;
        if !self.interactive {
            return Err(PromptError::Disabled);
        }
        let mut menu = format!("{title}:\n");
        for (index, option) in options.iter().enumerate() {
            menu.push_str(&format!("  {}. {option}\n", index + 1));
        }
        loop {
            self.show(&menu)?;
            self.show("> ")?;
            let line = self.read_line()?;
            match line.parse::<usize>() {
                Ok(choice) if (1..=options.len()).contains(&choice) => return Ok(choice - 1),
                _ => self.show("pick a number from the list\n")?,
            }
        }
    }

    fn confirm(
        &mut self,
        cancel: &Cancel,
        title: &str,
        _description: &str,
        default: bool,
    ) -> Result<bool, PromptError> {
        cancel.bail()?;
        if !self.interactive {
            return Err(PromptError::Disabled);
        }
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            self.show(&format!("{title} {hint}: "))?;
            let line = self.read_line()?;
            match line.to_ascii_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.show("answer y or n\n")?,
            }
        }
    }

    fn edit(&mut self, cancel: &Cancel, title: &str, initial: &str) -> Result<String, PromptError> {
        cancel.bail()?;
        if !self.interactive {
            return Err(PromptError::Disabled);
        }

        let editor = std::env::var("GIT_EDITOR")
            .or_else(|_| std::env::var("EDITOR"))
            .unwrap_or_else(|_| "vi".to_string());

        let file = tempfile::Builder::new()
            .prefix("trellis-")
            .suffix(".md")
            .tempfile()
            .map_err(|err| PromptError::Failed(err.to_string()))?;
        std::fs::write(file.path(), initial)
            .map_err(|err| PromptError::Failed(err.to_string()))?;

        self.show(&format!("{title}: opening {editor}...\n"))?;
        // $EDITOR may carry arguments; run it through the shell like git
        // does.
        let status = Command::new("sh")
            .arg("-c")
            .arg(format!("{editor} \"$1\""))
            .arg(&editor)
            .arg(file.path())
            .status()
            .map_err(|err| PromptError::Failed(err.to_string()))?;
        if !status.success() {
            return Err(PromptError::Failed(format!("editor exited with {status}")));
        }

        std::fs::read_to_string(file.path())
            .map(|text| text.trim_end().to_string())
            .map_err(|err| PromptError::Failed(err.to_string()))
    }
}
