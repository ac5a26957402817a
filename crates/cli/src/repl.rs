use std::borrow::Cow::{self, Borrowed, Owned};
use std::sync::Arc;

use anyhow::Result;
use owo_colors::OwoColorize;
use parley_agent::{ConversationController, SubmitOutcome};
use parley_core::Clipboard;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tokio::runtime::Runtime;

use crate::render::{SyntaxHighlighter, render_transcript};
use crate::{print_instructions, print_outcome};

const COMMANDS: &[&str] = &["/reset", "/instructions", "/set", "/clear-slot", "/copy", "/history", "/help", "/quit"];

/// Slash command entered at the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Reset,
    Instructions,
    Set { slot: String, text: String },
    ClearSlot { slot: String },
    /// 1-based message and block numbers, as printed
    Copy { message: usize, block: Option<usize> },
    History,
    Help,
    Quit,
}

impl SlashCommand {
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let line = line.trim();
        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match name {
            "/reset" => Ok(SlashCommand::Reset),
            "/instructions" => Ok(SlashCommand::Instructions),
            "/set" => {
                let (slot, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                if slot.is_empty() {
                    return Err("usage: /set <slot> <text>".to_string());
                }
                Ok(SlashCommand::Set { slot: slot.to_string(), text: text.trim().to_string() })
            }
            "/clear-slot" => {
                if rest.is_empty() {
                    return Err("usage: /clear-slot <slot>".to_string());
                }
                Ok(SlashCommand::ClearSlot { slot: rest.to_string() })
            }
            "/copy" => {
                let mut parts = rest.split_whitespace();
                let message = parts
                    .next()
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| "usage: /copy <message> [block]".to_string())?;
                let block = match parts.next() {
                    Some(b) => {
                        let n = b.parse::<usize>().ok().filter(|n| *n > 0);
                        Some(n.ok_or_else(|| format!("invalid block number: {}", b))?)
                    }
                    None => None,
                };
                Ok(SlashCommand::Copy { message, block })
            }
            "/history" => Ok(SlashCommand::History),
            "/help" => Ok(SlashCommand::Help),
            "/quit" | "/exit" => Ok(SlashCommand::Quit),
            other => Err(format!("unknown command: {} (try /help)", other)),
        }
    }
}

/// Completion, hints and highlighting for slash commands
#[derive(Clone)]
struct ChatHelper;

impl Helper for ChatHelper {}

impl Completer for ChatHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return Ok((0, vec![]));
        }

        let candidates = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(line))
            .map(|cmd| Pair { display: cmd.to_string(), replacement: cmd.to_string() })
            .collect();
        Ok((0, candidates))
    }
}

impl Highlighter for ChatHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') { Owned(line.bright_cyan().to_string()) } else { Borrowed(line) }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for ChatHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return None;
        }

        COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Validator for ChatHelper {}

fn print_help() {
    println!("{}", "Commands".bold());
    println!("  /reset                  clear the whole transcript");
    println!("  /instructions           show instruction slots");
    println!("  /set <slot> <text>      replace a slot's text");
    println!("  /clear-slot <slot>      empty a slot");
    println!("  /copy <n> [block]       copy message n, or one of its code blocks");
    println!("  /history                print the transcript");
    println!("  /help                   show this help");
    println!("  /quit                   leave");
}

fn confirm(rl: &mut Editor<ChatHelper, DefaultHistory>, question: &str) -> Result<bool> {
    match rl.readline(&format!("{} [y/N] ", question)) {
        Ok(answer) => Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Hand a typed line to the controller as its draft and submit it
async fn submit_line(controller: &ConversationController, line: &str) -> parley_core::Result<SubmitOutcome> {
    controller.set_draft(line);
    controller.submit_draft().await
}

/// Interactive chat loop
pub fn run_chat(
    controller: Arc<ConversationController>, runtime: &Runtime, clipboard: &dyn Clipboard,
    highlighter: &SyntaxHighlighter,
) -> Result<()> {
    let mut rl: Editor<ChatHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(ChatHelper));

    println!("{}", "Parley".bright_magenta().bold());
    let banner = format!("Connected to {}. Type /help for commands.", controller.backend_description());
    println!("{}", banner.bright_black());

    let transcript = controller.transcript();
    if !transcript.is_empty() {
        println!();
        println!("{}", render_transcript(&transcript, highlighter));
    }
    println!();

    loop {
        let line = match rl.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("{}", "Type /quit to exit.".yellow());
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(trimmed);

        if trimmed.starts_with('/') {
            let command = match SlashCommand::parse(trimmed) {
                Ok(command) => command,
                Err(message) => {
                    println!("{} {}", "Error:".red().bold(), message);
                    continue;
                }
            };

            match command {
                SlashCommand::Quit => break,
                SlashCommand::Help => print_help(),
                SlashCommand::History => println!("{}", render_transcript(&controller.transcript(), highlighter)),
                SlashCommand::Instructions => print_instructions(&controller),
                SlashCommand::Reset => {
                    if confirm(&mut rl, "Clear the entire transcript?")? {
                        if controller.clear_transcript() {
                            println!("{} Transcript cleared", "Success:".green().bold());
                        } else {
                            println!("{} A reply is still pending", "Warning:".yellow().bold());
                        }
                    }
                }
                SlashCommand::Set { slot, text } => match controller.set_slot(&slot, text) {
                    Ok(()) => println!("{} Updated slot {}", "Success:".green().bold(), slot.cyan()),
                    Err(e) => println!("{} {}", "Error:".red().bold(), e),
                },
                SlashCommand::ClearSlot { slot } => {
                    if confirm(&mut rl, &format!("Clear instruction slot '{}'?", slot))? {
                        match controller.clear_slot(&slot) {
                            Ok(()) => println!("{} Cleared slot {}", "Success:".green().bold(), slot.cyan()),
                            Err(e) => println!("{} {}", "Error:".red().bold(), e),
                        }
                    }
                }
                SlashCommand::Copy { message, block } => {
                    let result = match block {
                        Some(block) => controller.copy_code_block(message - 1, block - 1, clipboard),
                        None => controller.copy_message(message - 1, clipboard),
                    };
                    match result {
                        Ok(()) => println!("{} Copied to clipboard", "Success:".green().bold()),
                        Err(e) => println!("{} {}", "Error:".red().bold(), e),
                    }
                }
            }
            continue;
        }

        println!("{}", "...".bright_black());
        let outcome = runtime.block_on(async {
            tokio::select! {
                outcome = submit_line(&controller, &line) => Some(outcome),
                _ = tokio::signal::ctrl_c() => None,
            }
        });

        match outcome {
            Some(outcome) => print_outcome(&outcome?, controller.transcript().len(), highlighter),
            None => println!("{}", "Cancelled.".yellow()),
        }
    }

    println!("{}", "Goodbye!".bright_green());
    Ok(())
}
