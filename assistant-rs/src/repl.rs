// assistant-rs/src/repl.rs
// Line-oriented front end: one input line is one conversation turn

use std::io::Write;

use chrono::Local;
use orchestrator::{ConversationState, Orchestrator};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::prompt::{system_prompt, PromptContext};

#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Quit,
    Clear,
    Skip,
    Say(&'a str),
}

pub fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    match line {
        "" => Command::Skip,
        "/q" | "/quit" | "/exit" => Command::Quit,
        "/clear" | "/reset" => Command::Clear,
        text => Command::Say(text),
    }
}

fn fresh_session(backends: &[&str], context: &PromptContext) -> ConversationState {
    ConversationState::with_system_prompt(system_prompt(backends, context, Local::now()))
}

fn show_prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}

/// Read lines from stdin until EOF or a quit command
pub async fn run(orchestrator: &Orchestrator, backends: &[&str], context: &PromptContext) -> anyhow::Result<()> {
    let mut state = fresh_session(backends, context);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Support assistant ready. /clear resets the session, /q quits.");
    show_prompt()?;

    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Command::Quit => break,
            Command::Skip => {}
            Command::Clear => {
                state = fresh_session(backends, context);
                println!("Session cleared.");
            }
            Command::Say(text) => match orchestrator.run_turn(&mut state, text).await {
                Ok(reply) => println!("Assistant: {}", reply.text),
                Err(err) => println!("Assistant: {}", err.user_message()),
            },
        }
        show_prompt()?;
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        assert_eq!(parse_command("/q"), Command::Quit);
        assert_eq!(parse_command(" /exit "), Command::Quit);
        assert_eq!(parse_command("/reset"), Command::Clear);
        assert_eq!(parse_command("   "), Command::Skip);
        assert_eq!(parse_command(" show INC0010001 "), Command::Say("show INC0010001"));
    }

    #[test]
    fn test_fresh_session_is_seeded() {
        let state = fresh_session(&["github"], &PromptContext::default());
        assert_eq!(state.len(), 1);
    }
}
