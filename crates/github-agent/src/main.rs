//! The interactive GitHub agent.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use github_agent::bootstrap::{Bootstrap, bootstrap};
use github_agent::config::{Cli, Settings};
use github_agent::core::TurnStatus;
use github_agent::{Reply, Session, SessionBuilder};
use github_agent_mcp::{ServerInfo, ToolDescriptor};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";
const BANNER_TOOLS: usize = 5;
const RULE_WIDTH: usize = 50;

enum SessionEvent {
    ToolCall(String),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match Settings::load(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{} {err}", "Configuration error:".bright_red());
            return ExitCode::FAILURE;
        }
    };
    debug!("settings: {settings:?}");

    println!("Starting GitHub Agent...");
    let toolset = if settings.no_tools {
        None
    } else {
        println!("Attempting to initialize with MCP tools...");
        let progress_bar =
            spinner("Setting up MCP client and loading tools...");
        progress_bar.enable_steady_tick(Duration::from_millis(100));
        let result = bootstrap(&settings.bootstrap, settings.fallback, |var| {
            env::var(var).ok()
        })
        .await;
        progress_bar.finish_and_clear();

        match result {
            Ok(Bootstrap::Tools(toolset)) => Some(toolset),
            Ok(Bootstrap::Fallback(err)) => {
                println!("\n{} {err}", "MCP version failed:".bright_yellow());
                print_rule();
                println!("Falling back to basic mode...");
                print_rule();
                None
            }
            Err(err) => {
                eprintln!("{} {err}", "Failed to initialize agent:".bright_red());
                print_troubleshooting();
                return ExitCode::FAILURE;
            }
        }
    };

    match &toolset {
        Some(toolset) => {
            print_tools_banner(toolset.server_info.as_ref(), &toolset.descriptors)
        }
        None => print_basic_banner(),
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let mut builder = SessionBuilder::with_model_settings(&settings.model)
        .with_config(settings.agent.clone())
        .on_tool_call(move |req| {
            event_tx.send(SessionEvent::ToolCall(req.name.clone())).ok();
        });
    if let Some(toolset) = toolset {
        builder = builder.with_toolset(toolset);
    }
    let session = builder.build();

    run_repl(session, event_rx).await;
    println!("\nGoodbye!");
    ExitCode::SUCCESS
}

async fn run_repl(
    mut session: Session,
    mut event_rx: mpsc::UnboundedReceiver<SessionEvent>,
) {
    let mut stdin = BufReader::new(io::stdin()).lines();

    'outer: loop {
        print!("\nCommand: ");
        std::io::stdout().flush().ok();

        let line = select! {
            line = read_line(&mut stdin) => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let progress_bar = spinner("🤔 Thinking...");

        let reply = {
            let turn = session.handle_line(&line);
            tokio::pin!(turn);
            loop {
                let sleep = sleep(Duration::from_millis(100));
                select! {
                    reply = &mut turn => break reply,
                    Some(event) = event_rx.recv() => {
                        let SessionEvent::ToolCall(name) = event;
                        progress_bar.suspend(|| {
                            println!(
                                "{}🔧 Calling {}",
                                BAR_CHAR.bright_yellow(),
                                name.bright_white()
                            );
                        });
                    }
                    _ = tokio::signal::ctrl_c() => {
                        progress_bar.finish_and_clear();
                        break 'outer;
                    }
                    _ = sleep => {
                        progress_bar.inc(1);
                    }
                }
            }
        };
        progress_bar.finish_and_clear();

        match reply {
            Reply::Exit => break,
            Reply::Ignored => continue,
            Reply::Turn(outcome) => {
                println!(
                    "\n{}Assistant: {}",
                    BAR_CHAR.bright_cyan(),
                    outcome.reply.bright_white()
                );
                if outcome.status == TurnStatus::Exhausted {
                    println!(
                        "{}{}",
                        BAR_CHAR.bright_yellow(),
                        format!(
                            "Stopped after {} tool rounds; the request may be incomplete.",
                            outcome.iterations
                        )
                        .bright_yellow()
                    );
                }
            }
        }
    }

    session.shutdown().await;
}

async fn read_line(stdin: &mut Lines<BufReader<Stdin>>) -> Option<String> {
    match stdin.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {err}");
            None
        }
    }
}

fn spinner(message: &'static str) -> ProgressBar {
    let progress_bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {wide_msg}") {
        progress_bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    progress_bar.set_message(message);
    progress_bar
}

fn print_rule() {
    println!("{}", "=".repeat(RULE_WIDTH));
}

fn print_tools_banner(
    server_info: Option<&ServerInfo>,
    descriptors: &[ToolDescriptor],
) {
    if let Some(info) = server_info {
        println!("Connected to {} {}", info.name.bright_white(), info.version);
    }
    println!("Successfully loaded {} MCP tools", descriptors.len());
    if !descriptors.is_empty() {
        println!("Available tools:");
        for tool in descriptors.iter().take(BANNER_TOOLS) {
            println!(
                "  - {}: {}",
                tool.name.bright_white(),
                tool.description.as_deref().unwrap_or("")
            );
        }
        if descriptors.len() > BANNER_TOOLS {
            println!("  ... and {} more tools", descriptors.len() - BANNER_TOOLS);
        }
    }

    println!();
    print_rule();
    println!("GitHub Agent ready! Type 'exit' to quit.");
    print_rule();
    println!("You can ask me to help with GitHub operations like:");
    println!("- 'List my repositories'");
    println!("- 'Create a new repository called test-repo'");
    println!("- 'Search for repositories about machine learning'");
    println!("- 'Get information about a specific repository'");
    println!("- 'Show me issues in a repository'");
    print_rule();
}

fn print_basic_banner() {
    println!();
    print_rule();
    println!("GitHub Assistant ready! (Basic mode - no live tools)");
    print_rule();
    println!("Type 'exit' to quit.");
}

fn print_troubleshooting() {
    println!("\nTroubleshooting tips:");
    println!("1. Make sure Docker is installed and running");
    println!("2. Check GITHUB_PERSONAL_ACCESS_TOKEN is set and has appropriate permissions");
    println!("3. Try running: docker pull ghcr.io/github/github-mcp-server");
    println!("4. Use --fallback any or --no-tools to start without live tools");
}
