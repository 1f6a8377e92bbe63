//! Operator interaction on the terminal.
//!
//! Both calls block on stdin; the orchestrator runs them on the blocking
//! thread pool. When stdin is not a terminal the answer is read as a plain
//! line, so `echo y | backup-convert ...` works.

use crate::utils::Result;
use dialoguer::{Confirm, Input};
use std::io::{self, BufRead, IsTerminal, Write};

const RANGE_HELP: &str = "
Select source backups from valid options:
    * numerical selection (1, 2, 3, ...) for a single backup
    * numerical range selection (1-7, -7, 21-23, 42-) for multiple neighbouring backups
    * all available backups in the source repository (default or \"all\")
";

pub trait Prompt: Send + Sync {
    /// Ask which of the `count` listed backups to convert.
    fn range_expression(&self, count: usize) -> Result<String>;

    /// Ask whether to go ahead with converting `count` backups.
    fn confirm(&self, count: usize) -> Result<bool>;
}

/// Prompts via `dialoguer` on a terminal, line by line otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn range_expression(&self, count: usize) -> Result<String> {
        eprintln!("{}", RANGE_HELP);
        let question = format!("Which of the {} backups should be converted?", count);
        if !io::stdin().is_terminal() {
            let answer = read_answer(io::stdin().lock(), &mut io::stderr(), &question)?;
            return Ok(answer.to_lowercase());
        }
        let answer = Input::<String>::new()
            .with_prompt(question)
            .allow_empty(true)
            .interact_text()?;
        Ok(answer)
    }

    fn confirm(&self, count: usize) -> Result<bool> {
        let question = format!("Proceed with converting {} backups?", count);
        if !io::stdin().is_terminal() {
            let answer = read_answer(io::stdin().lock(), &mut io::stderr(), &format!("{} [y/N]", question))?;
            return Ok(is_yes(&answer));
        }
        let proceed = Confirm::new().with_prompt(question).default(false).interact()?;
        Ok(proceed)
    }
}

/// Write `question` to `out` and read one trimmed line from `input`.
/// End of input is an empty answer.
fn read_answer<R: BufRead, W: Write>(mut input: R, out: &mut W, question: &str) -> io::Result<String> {
    write!(out, "{}: ", question)?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
