//! Command-line interface definition using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use stated_models::{Attributes, ExpireAction, Value, VariableType};

/// Stated - runtime variables with TTL expiry
#[derive(Parser, Debug)]
#[command(name = "stated")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to state directory
    #[arg(short, long, env = "STATED_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// TTL options shared by `set` and `set-value`.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct TtlArgs {
    /// Seconds until the value expires
    #[arg(long)]
    pub ttl: Option<i64>,

    /// Value applied when the TTL expires (default: the type's reset value)
    #[arg(long, value_parser = parse_value)]
    pub expire_to: Option<Value>,

    /// What happens on expiry (reset, delete)
    #[arg(long, default_value = "reset")]
    pub expire_action: ExpireAction,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update a variable by name
    Set {
        /// Variable name (the id is derived from it)
        #[arg(required = true)]
        name: String,

        /// Value (JSON literal or plain text)
        #[arg(value_parser = parse_value)]
        value: Option<Value>,

        /// Variable type (boolean, number, string)
        #[arg(short = 't', long = "type")]
        var_type: Option<VariableType>,

        /// Display icon
        #[arg(short, long)]
        icon: Option<String>,

        /// Attribute to merge, as key=value (repeatable)
        #[arg(short, long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, serde_json::Value)>,

        #[command(flatten)]
        ttl: TtlArgs,
    },

    /// Write a value to an existing variable
    SetValue {
        /// Variable id
        #[arg(required = true)]
        id: String,

        /// Value (JSON literal or plain text)
        #[arg(required = true, value_parser = parse_value)]
        value: Value,

        /// Attribute to merge, as key=value (repeatable)
        #[arg(short, long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, serde_json::Value)>,

        #[command(flatten)]
        ttl: TtlArgs,
    },

    /// Flip a boolean variable
    Toggle {
        /// Variable id
        #[arg(required = true)]
        id: String,
    },

    /// Delete a variable by name
    Delete {
        /// Variable name or id
        #[arg(required = true)]
        name: String,
    },

    /// Delete every variable whose id starts with a prefix
    DeletePrefix {
        /// Id prefix
        #[arg(required = true)]
        prefix: String,
    },

    /// Show one variable
    Get {
        /// Variable id
        #[arg(required = true)]
        id: String,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List all variables
    List {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Start interactive REPL mode (keeps TTL timers running)
    Repl,
}

/// Output format for get and list
#[derive(Debug, Clone, Copy, Default, PartialEq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Parses a value given on the command line.
///
/// JSON scalars (`true`, `7`, `3.5`, `null`, `"text"`) keep their type;
/// anything else is taken as plain text.
pub fn parse_value(s: &str) -> Result<Value, String> {
    Ok(serde_json::from_str::<Value>(s).unwrap_or_else(|_| Value::String(s.to_string())))
}

/// Parses a `key=value` attribute.
pub fn parse_attribute(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("attribute key is empty in '{}'", s));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Collects parsed attributes, `None` when there are none.
pub fn attributes_from(pairs: Vec<(String, serde_json::Value)>) -> Option<Attributes> {
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.into_iter().collect())
    }
}

impl Cli {
    /// Returns the state directory path, using default if not specified.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".stated"))
                .unwrap_or_else(|| PathBuf::from(".stated"))
        })
    }

    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
