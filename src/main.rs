//! shellterm - a single-session interactive command shell
//!
//! shellterm reads keys from the terminal, echoes them, and when Enter is
//! pressed dispatches the line to a registered command. Each command runs
//! with its own execution context and reports back whenever it is done;
//! the prompt returns once it has.
//!
//! # Quick Start
//!
//! ```text
//! shellterm                  # Start in the configured directory
//! shellterm -u alice -d /srv # Override user and working directory
//! shellterm --init-config    # Write ~/.shellterm/config.toml
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | Enter | Run the current line |
//! | Backspace | Erase the last character |
//! | Ctrl+V | Paste from the clipboard |
//! | Ctrl+D | Exit (at an empty prompt) |

mod commands;
mod config;
mod core;
mod host;
mod ui;

use std::env;
use std::path::PathBuf;
use std::rc::Rc;

use crossterm::event;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{config_dir, Config};
use crate::core::session::{Shell, ShellSettings};
use crate::host::{Host, LocalHost};
use crate::ui::{CrosstermSurface, KeyMapper, TerminalEvent, TerminalHandle};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the log filter
const LOG_ENV: &str = "SHELLTERM_LOG";

/// Command-line overrides
#[derive(Default)]
struct CliOptions {
    user: Option<String>,
    working_directory: Option<String>,
    app_version: Option<String>,
    /// Write the merged config file and exit
    init_config: bool,
}

fn print_version() {
    eprintln!("shellterm {}", VERSION);
}

fn print_help() {
    eprintln!("shellterm {} - A single-session interactive command shell", VERSION);
    eprintln!();
    eprintln!("Usage: shellterm [OPTIONS]");
    eprintln!();
    eprintln!("Session options:");
    eprintln!("  -u, --user <NAME>         User name shown in the prompt");
    eprintln!("  -d, --dir <PATH>          Initial working directory");
    eprintln!("  -V, --app-version <VER>   Version label shown in the prompt");
    eprintln!();
    eprintln!("Other options:");
    eprintln!("  --init-config             Write the current settings to the config file");
    eprintln!("  -v, --version             Show version");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  Enter                     Run the current line");
    eprintln!("  Backspace                 Erase the last character");
    eprintln!("  Ctrl+V                    Paste from the clipboard");
    eprintln!("  Ctrl+D                    Exit (at an empty prompt)");
    eprintln!();
    eprintln!("Type 'help' at the prompt to list the commands.");
    eprintln!();
    eprintln!("Configuration: ~/.shellterm/config.toml");
    eprintln!("Log file:      ~/.shellterm/shellterm.log ({} sets the filter)", LOG_ENV);
}

fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().collect();
    let mut options = CliOptions::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-u" | "--user" => {
                i += 1;
                options.user = Some(args.get(i).ok_or("Missing user name")?.clone());
            }
            "-d" | "--dir" => {
                i += 1;
                options.working_directory = Some(args.get(i).ok_or("Missing directory")?.clone());
            }
            "-V" | "--app-version" => {
                i += 1;
                options.app_version = Some(args.get(i).ok_or("Missing version label")?.clone());
            }
            "--init-config" => {
                options.init_config = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(options)
}

/// Log to `~/.shellterm/shellterm.log`; the terminal belongs to the shell
fn init_logging() {
    let log_path = config_dir()
        .map(|dir| dir.join("shellterm.log"))
        .unwrap_or_else(|| PathBuf::from("shellterm.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let options = match parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("shellterm {} starting...", VERSION);

    // Command-line flags override the config file
    let mut config = Config::load();
    if let Some(user) = options.user {
        config.user = Some(user);
    }
    if let Some(dir) = options.working_directory {
        config.working_directory = dir;
    }
    if let Some(version) = options.app_version {
        config.version = Some(version);
    }

    if options.init_config {
        let path = config.save()?;
        eprintln!("Wrote {}", path.display());
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let local = tokio::task::LocalSet::new();
    let result = local.block_on(&runtime, run(config));

    if let Err(ref e) = result {
        error!("Session ended with error: {}", e);
    }
    info!("shellterm exiting");
    result
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        "User: {:?}, directory: {}, version: {:?}",
        config.user, config.working_directory, config.version
    );

    let mut surface = CrosstermSurface::new(config.input.bracketed_paste);
    surface.init()?;
    let terminal = TerminalHandle::new(surface);

    let settings = ShellSettings::from_config(&config);
    let host: Rc<dyn Host> = Rc::new(LocalHost::new(config));
    let mut shell = Shell::new(settings, commands::builtins(), host, terminal);

    let (tx, rx) = mpsc::unbounded_channel::<TerminalEvent>();

    // Reader thread: blocking terminal reads feed the session loop
    std::thread::spawn(move || loop {
        match event::read() {
            Ok(ev) => {
                if let Some(input) = KeyMapper::translate(ev) {
                    if tx.send(input).is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                error!("Terminal read failed: {}", e);
                break;
            }
        }
    });

    shell.run(rx).await;
    debug!("Session history: {} line(s)", shell.state().history().len());

    // Dropping the shell releases the last terminal handle and restores the console
    drop(shell);
    Ok(())
}
