//! Built-in commands.

use std::time::Duration;

use crate::core::args::{ArgSchema, ParsedOptions};
use crate::core::context::ContextEvent;
use crate::core::dispatch::{Command, CommandEnv, CommandRegistry, CompletionPolicy};
use crate::core::error::CommandError;

/// Build the registry of built-in commands
pub fn builtins() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry.register(Box::new(Banner));
    registry.register(Box::new(Echo));
    registry.register(Box::new(Clear));
    registry.register(Box::new(Pwd));
    registry.register(Box::new(Cd));
    registry.register(Box::new(Whoami));
    registry.register(Box::new(SleepCmd));

    let mut entries: Vec<(String, String)> = registry
        .iter()
        .map(|cmd| (cmd.name().to_string(), cmd.description().to_string()))
        .collect();
    entries.push(("help".to_string(), HELP_DESCRIPTION.to_string()));
    entries.sort();
    registry.register(Box::new(Help { entries }));

    registry
}

// ============================================================================
// banner
// ============================================================================

struct Banner;

impl Command for Banner {
    fn name(&self) -> &str {
        "banner"
    }

    fn description(&self) -> &str {
        "Show the welcome banner"
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::empty().flag("plain", Some('p'))
    }

    fn execute(&self, env: CommandEnv, args: ParsedOptions, _input: &str) -> Result<CompletionPolicy, CommandError> {
        // Drawn straight onto the terminal, before any prompt exists
        let terminal = &env.terminal;
        if let Some(text) = env.host.config_value("banner") {
            terminal.write(&text);
            return Ok(CompletionPolicy::Immediate);
        }

        let app = env.host.config_value("app_name").unwrap_or_else(|| "shellterm".to_string());
        let version = env.host.config_value("version").unwrap_or_else(|| "latest".to_string());
        let title = format!("{} {}", app, version);

        if args.flag("plain") {
            terminal.write_line(&title);
        } else {
            terminal.write_line(&format!("\x1b[1m{}\x1b[0m", title));
        }
        terminal.write("Type 'help' to list the available commands.");
        Ok(CompletionPolicy::Immediate)
    }
}

// ============================================================================
// echo / clear / pwd / whoami
// ============================================================================

struct Echo;

impl Command for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Print the arguments"
    }

    fn execute(&self, env: CommandEnv, args: ParsedOptions, _input: &str) -> Result<CompletionPolicy, CommandError> {
        env.context.emit(ContextEvent::Data(args.positional.join(" ")));
        env.context.close(None);
        Ok(CompletionPolicy::Channel)
    }
}

struct Clear;

impl Command for Clear {
    fn name(&self) -> &str {
        "clear"
    }

    fn description(&self) -> &str {
        "Clear the screen"
    }

    fn execute(&self, env: CommandEnv, _args: ParsedOptions, _input: &str) -> Result<CompletionPolicy, CommandError> {
        env.context.clear();
        Ok(CompletionPolicy::Immediate)
    }
}

struct Pwd;

impl Command for Pwd {
    fn name(&self) -> &str {
        "pwd"
    }

    fn description(&self) -> &str {
        "Print the working directory"
    }

    fn execute(&self, env: CommandEnv, _args: ParsedOptions, _input: &str) -> Result<CompletionPolicy, CommandError> {
        env.context.write(&env.context.cwd().display().to_string());
        Ok(CompletionPolicy::Immediate)
    }
}

struct Whoami;

impl Command for Whoami {
    fn name(&self) -> &str {
        "whoami"
    }

    fn description(&self) -> &str {
        "Print the current user"
    }

    fn execute(&self, env: CommandEnv, _args: ParsedOptions, _input: &str) -> Result<CompletionPolicy, CommandError> {
        env.context.write(&env.host.current_user().username);
        Ok(CompletionPolicy::Immediate)
    }
}

// ============================================================================
// cd
// ============================================================================

struct Cd;

impl Command for Cd {
    fn name(&self) -> &str {
        "cd"
    }

    fn description(&self) -> &str {
        "Change the working directory"
    }

    fn execute(&self, env: CommandEnv, args: ParsedOptions, _input: &str) -> Result<CompletionPolicy, CommandError> {
        if args.positional.len() > 1 {
            return Err(CommandError::InvalidArguments("cd takes at most one path".to_string()));
        }
        let target = args.positional.first().map(String::as_str).unwrap_or("/");
        env.context.change_directory(target);
        Ok(CompletionPolicy::Immediate)
    }
}

// ============================================================================
// sleep
// ============================================================================

struct SleepCmd;

impl Command for SleepCmd {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Wait for the given number of milliseconds"
    }

    fn execute(&self, _env: CommandEnv, args: ParsedOptions, _input: &str) -> Result<CompletionPolicy, CommandError> {
        let millis: u64 = match args.positional.as_slice() {
            [ms] => ms
                .parse()
                .map_err(|_| CommandError::InvalidArguments(format!("not a number of milliseconds: {}", ms)))?,
            _ => return Err(CommandError::InvalidArguments("usage: sleep <ms>".to_string())),
        };

        Ok(CompletionPolicy::pending(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(())
        }))
    }
}

// ============================================================================
// help
// ============================================================================

const HELP_DESCRIPTION: &str = "List the available commands";

struct Help {
    /// (name, description), sorted by name
    entries: Vec<(String, String)>,
}

impl Command for Help {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> &str {
        HELP_DESCRIPTION
    }

    fn execute(&self, env: CommandEnv, _args: ParsedOptions, _input: &str) -> Result<CompletionPolicy, CommandError> {
        let width = self.entries.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
        let lines: Vec<String> = self
            .entries
            .iter()
            .map(|(name, description)| format!("  {:width$}  {}", name, description, width = width))
            .collect();
        env.context.write(&lines.join("\n"));
        Ok(CompletionPolicy::Immediate)
    }
}
