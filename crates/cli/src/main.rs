mod clipboard;
mod render;
mod repl;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parley_agent::{ControllerSettings, ConversationController, SubmitOutcome};
use parley_core::logging::{self, LoggingConfig, sanitize_path};
use parley_core::{Config, FileStore, Profile, SessionStorage};
use parley_providers::BackendFactory;

use crate::clipboard::SystemClipboard;
use crate::render::{SyntaxHighlighter, render_message, render_transcript};

/// Parley - a terminal chat client for a remote completion backend
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Chat with a completion backend from the terminal", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to config.toml (default: ./config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Profile name to use (default: config's default_profile)
    #[arg(short, long, value_name = "PROFILE")]
    profile: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// Send a single prompt and print the reply
    Send {
        /// Prompt text
        #[arg(required = true, value_name = "PROMPT")]
        prompt: Vec<String>,
    },
    /// Print the saved transcript
    History,
    /// Clear the saved transcript
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show or edit instruction slots
    Instructions {
        #[command(subcommand)]
        action: InstructionsAction,
    },
    /// Copy a message (or one of its code blocks) to the clipboard
    Copy {
        /// Message number as shown by `history`
        #[arg(value_name = "N")]
        index: usize,

        /// Code block number within the message
        #[arg(short, long, value_name = "K")]
        block: Option<usize>,
    },
    /// Show current status
    Status,
}

#[derive(Subcommand, Debug)]
enum InstructionsAction {
    /// Print every slot and the resulting system directive
    Show,
    /// Replace the text of a slot
    Set {
        #[arg(value_name = "SLOT")]
        slot: String,

        #[arg(required = true, value_name = "TEXT")]
        text: Vec<String>,
    },
    /// Empty a slot
    Clear {
        #[arg(value_name = "SLOT")]
        slot: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = load_or_create_config(&config_path)?;

    let mut logging_config = LoggingConfig::from(config.logging.clone());
    if cli.verbose {
        logging_config = logging_config.with_level("info");
    }
    let _log_guard = match logging::init_logging(Some(logging_config)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {}", "Warning:".yellow().bold(), e);
            None
        }
    };

    if cli.verbose {
        println!("{} Using config: {}", "Info:".blue().bold(), config_path.display());
        println!("{} Available profiles: {:?}", "Info:".blue().bold(), config.profile_names());
    }

    let profile = cli.profile.as_deref();
    match cli.command {
        Commands::Chat => cmd_chat(&config, profile),
        Commands::Send { prompt } => cmd_send(&config, profile, &prompt.join(" ")),
        Commands::History => cmd_history(&config, profile),
        Commands::Reset { yes } => cmd_reset(&config, profile, yes, &mut std::io::stdin().lock()),
        Commands::Instructions { action } => {
            cmd_instructions(&config, profile, action, &mut std::io::stdin().lock())
        }
        Commands::Copy { index, block } => cmd_copy(&config, profile, index, block),
        Commands::Status => cmd_status(&config, profile, cli.verbose),
    }
}

/// Load config from file or create from example
fn load_or_create_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::from_file(&PathBuf::from(path)).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    } else {
        println!("{} Config not found at {}", "Warning:".yellow().bold(), path.display());
        println!("{} Creating config from example...", "Info:".blue().bold());

        std::fs::write(path, Config::example()).context("Failed to create config")?;

        println!(
            "{} Created config at {}. Please edit it with your settings.",
            "Success:".green().bold(),
            path.display()
        );

        anyhow::bail!("Please edit {} with your backend URL and run again", path.display())
    }
}

fn resolve_profile<'a>(config: &'a Config, name: Option<&str>) -> Result<&'a Profile> {
    let name = name.unwrap_or(&config.default_profile);
    config.profile(name).with_context(|| format!("Failed to load profile '{}'", name))
}

/// Build the controller for a profile, rehydrated from its storage directory
fn open_controller(config: &Config, profile_name: Option<&str>) -> Result<Arc<ConversationController>> {
    let profile = resolve_profile(config, profile_name)?;

    let backend = BackendFactory::create_from_config(&profile.backend).context("Failed to create backend")?;
    let storage_dir = profile.storage_dir()?;
    let store = FileStore::open(&storage_dir)
        .with_context(|| format!("Failed to open storage at {}", storage_dir.display()))?;
    let layout = profile.instruction_profile()?;

    let privacy = LoggingConfig::from(config.logging.clone()).privacy;
    let settings = ControllerSettings::from_profile(profile).with_privacy(privacy);

    Ok(Arc::new(ConversationController::open(backend, settings, SessionStorage::new(Arc::new(store)), layout)))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread().enable_all().build().context("Failed to start async runtime")
}

/// Ask a yes/no question on stdout and read the answer
fn confirm(input: &mut impl BufRead, question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Print a submit outcome; `count` is the transcript length afterwards
pub(crate) fn print_outcome(outcome: &SubmitOutcome, count: usize, highlighter: &SyntaxHighlighter) {
    match outcome {
        SubmitOutcome::Resolved(message) => println!("{}", render_message(count, message, highlighter)),
        SubmitOutcome::Failed(err) => println!("{} {}", "Error:".red().bold(), err),
        SubmitOutcome::Ignored(reason) => println!("{} Not sent: {}", "Warning:".yellow().bold(), reason),
    }
}

pub(crate) fn print_instructions(controller: &ConversationController) {
    let profile = controller.instruction_profile();
    println!("{}", "Instruction slots".bold());
    for slot in profile.slots() {
        let title = if slot.title.is_empty() { String::new() } else { format!(" ({})", slot.title) };
        let body = if slot.is_blank() { "(empty)".bright_black().to_string() } else { slot.body.clone() };
        println!("  {}{}: {}", slot.key.cyan(), title, body);
    }
    println!();
    println!("{}", "System directive".bold());
    println!("{}", controller.system_directive());
}

fn cmd_chat(config: &Config, profile_name: Option<&str>) -> Result<()> {
    let controller = open_controller(config, profile_name)?;
    let runtime = runtime()?;
    let clipboard = SystemClipboard::new();
    let highlighter = SyntaxHighlighter::new();

    repl::run_chat(controller, &runtime, &clipboard, &highlighter)
}

fn cmd_send(config: &Config, profile_name: Option<&str>, prompt: &str) -> Result<()> {
    let controller = open_controller(config, profile_name)?;
    let runtime = runtime()?;

    let outcome = runtime.block_on(controller.submit(prompt))?;
    match outcome {
        SubmitOutcome::Resolved(message) => {
            let highlighter = SyntaxHighlighter::new();
            println!("{}", render_message(controller.transcript().len(), &message, &highlighter));
            Ok(())
        }
        SubmitOutcome::Failed(err) => Err(err.into()),
        SubmitOutcome::Ignored(reason) => anyhow::bail!("Prompt not sent: {}", reason),
    }
}

fn cmd_history(config: &Config, profile_name: Option<&str>) -> Result<()> {
    let controller = open_controller(config, profile_name)?;
    let transcript = controller.transcript();

    if transcript.is_empty() {
        println!("{} Transcript is empty", "Info:".blue().bold());
    } else {
        println!("{}", render_transcript(&transcript, &SyntaxHighlighter::new()));
    }
    Ok(())
}

fn cmd_reset(config: &Config, profile_name: Option<&str>, yes: bool, input: &mut impl BufRead) -> Result<()> {
    let controller = open_controller(config, profile_name)?;

    if !yes && !confirm(input, "Clear the entire transcript?")? {
        println!("{} Nothing changed", "Info:".blue().bold());
        return Ok(());
    }

    if !controller.clear_transcript() {
        anyhow::bail!("A reply is still pending");
    }
    println!("{} Transcript cleared", "Success:".green().bold());
    Ok(())
}

fn cmd_instructions(
    config: &Config, profile_name: Option<&str>, action: InstructionsAction, input: &mut impl BufRead,
) -> Result<()> {
    let controller = open_controller(config, profile_name)?;

    match action {
        InstructionsAction::Show => print_instructions(&controller),
        InstructionsAction::Set { slot, text } => {
            controller.set_slot(&slot, text.join(" "))?;
            println!("{} Updated slot {}", "Success:".green().bold(), slot.cyan());
        }
        InstructionsAction::Clear { slot, yes } => {
            if !yes && !confirm(input, &format!("Clear instruction slot '{}'?", slot))? {
                println!("{} Nothing changed", "Info:".blue().bold());
                return Ok(());
            }
            controller.clear_slot(&slot)?;
            println!("{} Cleared slot {}", "Success:".green().bold(), slot.cyan());
        }
    }

    Ok(())
}

fn cmd_copy(config: &Config, profile_name: Option<&str>, index: usize, block: Option<usize>) -> Result<()> {
    let controller = open_controller(config, profile_name)?;
    let clipboard = SystemClipboard::new();

    let index = index.checked_sub(1).context("Message numbers start at 1")?;
    match block {
        Some(block) => {
            let block = block.checked_sub(1).context("Block numbers start at 1")?;
            controller.copy_code_block(index, block, &clipboard)?;
        }
        None => controller.copy_message(index, &clipboard)?,
    }

    println!("{} Copied to clipboard", "Success:".green().bold());
    Ok(())
}

/// Show current status
fn cmd_status(config: &Config, profile_name: Option<&str>, verbose: bool) -> Result<()> {
    println!("{}", "Parley Status".green().bold().underline());
    println!();

    println!("{} Configuration", "Info:".blue().bold());
    println!("  Default profile: {}", config.default_profile.cyan());
    println!("  Available profiles:");
    for name in config.profile_names() {
        let profile = config.profile(&name)?;
        let target = profile.backend.endpoint().unwrap_or_else(|| "scripted responses".to_string());
        println!("    - {} ({}: {})", name.cyan(), profile.backend.kind(), target);
    }

    let profile = resolve_profile(config, profile_name)?;
    let controller = open_controller(config, profile_name)?;
    let transcript = controller.transcript();

    println!();
    println!("{} Profile {}", "Info:".blue().bold(), profile.name.cyan());
    println!("  Backend: {}", controller.backend_description());
    println!("  Timeout: {}s", profile.backend.timeout().as_secs());
    println!("  Storage: {}", sanitize_path(&profile.storage_dir()?));
    println!("  Messages: {}", transcript.len().to_string().cyan());

    if verbose {
        let instructions = controller.instruction_profile();
        let filled = instructions.slots().iter().filter(|slot| !slot.is_blank()).count();
        println!("  Instruction slots: {} ({} filled)", instructions.slots().len(), filled);
        println!("  Max prompt length: {} chars", profile.conversation.max_prompt_chars);
    }

    Ok(())
}
