//! Argument parsing
//!
//! Turns the words after a command name into [`ParsedOptions`]. A command
//! declares its flags with an [`ArgSchema`]; with an empty schema every word
//! is positional.

use std::collections::BTreeMap;

use super::error::CommandError;

/// One declared flag
#[derive(Clone, Debug)]
pub struct FlagSpec {
    pub long: &'static str,
    pub short: Option<char>,
    pub takes_value: bool,
}

/// Flags a command accepts
#[derive(Clone, Debug, Default)]
pub struct ArgSchema {
    flags: Vec<FlagSpec>,
}

impl ArgSchema {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Declare a boolean flag
    pub fn flag(mut self, long: &'static str, short: Option<char>) -> Self {
        self.flags.push(FlagSpec { long, short, takes_value: false });
        self
    }

    /// Declare a flag that takes a value
    #[allow(dead_code)]
    pub fn option(mut self, long: &'static str, short: Option<char>) -> Self {
        self.flags.push(FlagSpec { long, short, takes_value: true });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    fn by_long(&self, name: &str) -> Option<&FlagSpec> {
        self.flags.iter().find(|f| f.long == name)
    }

    fn by_short(&self, ch: char) -> Option<&FlagSpec> {
        self.flags.iter().find(|f| f.short == Some(ch))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlagValue {
    Present,
    Value(String),
}

/// Structured arguments handed to a command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    pub positional: Vec<String>,
    /// Keyed by the flag's long name
    pub flags: BTreeMap<String, FlagValue>,
}

impl ParsedOptions {
    /// Whether a flag was given (with or without a value)
    pub fn flag(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    #[allow(dead_code)]
    pub fn value(&self, name: &str) -> Option<&str> {
        match self.flags.get(name) {
            Some(FlagValue::Value(v)) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// Parse `args` against `schema`.
///
/// Supports `--name`, `--name=value`, `--name value`, `-x`, grouped boolean
/// short flags (`-xy`) and `--` to end flag parsing. Dash words that match
/// no declared flag stay positional.
pub fn parse(schema: &ArgSchema, args: &[&str]) -> Result<ParsedOptions, CommandError> {
    let mut parsed = ParsedOptions::default();
    let mut iter = args.iter().copied();
    let mut only_positional = false;

    while let Some(arg) = iter.next() {
        if only_positional {
            parsed.positional.push(arg.to_string());
            continue;
        }

        if arg == "--" && !schema.is_empty() {
            only_positional = true;
            continue;
        }

        if let Some(body) = arg.strip_prefix("--") {
            let (name, inline) = match body.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (body, None),
            };

            if let Some(spec) = schema.by_long(name) {
                let value = if spec.takes_value {
                    let value = match inline {
                        Some(v) => v.to_string(),
                        None => iter.next().map(str::to_string).ok_or_else(|| {
                            CommandError::InvalidArguments(format!("--{} requires a value", name))
                        })?,
                    };
                    FlagValue::Value(value)
                } else {
                    if inline.is_some() {
                        return Err(CommandError::InvalidArguments(format!(
                            "--{} does not take a value",
                            name
                        )));
                    }
                    FlagValue::Present
                };
                parsed.flags.insert(spec.long.to_string(), value);
                continue;
            }
        } else if let Some(shorts) = arg.strip_prefix('-').filter(|s| !s.is_empty()) {
            let specs: Option<Vec<&FlagSpec>> = shorts.chars().map(|c| schema.by_short(c)).collect();

            if let Some(specs) = specs {
                match specs.as_slice() {
                    [spec] if spec.takes_value => {
                        let value = iter.next().map(str::to_string).ok_or_else(|| {
                            CommandError::InvalidArguments(format!("-{} requires a value", shorts))
                        })?;
                        parsed.flags.insert(spec.long.to_string(), FlagValue::Value(value));
                    }
                    specs if specs.iter().all(|s| !s.takes_value) => {
                        for spec in specs {
                            parsed.flags.insert(spec.long.to_string(), FlagValue::Present);
                        }
                    }
                    _ => {
                        return Err(CommandError::InvalidArguments(format!(
                            "-{} groups a flag that takes a value",
                            shorts
                        )));
                    }
                }
                continue;
            }
        }

        parsed.positional.push(arg.to_string());
    }

    Ok(parsed)
}
