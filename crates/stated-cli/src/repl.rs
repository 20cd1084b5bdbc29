//! Interactive REPL (Read-Eval-Print Loop) for Stated.
//!
//! The REPL keeps a runtime alive, so armed TTLs fire while it runs. Change
//! events are printed as they arrive.

use std::path::Path;
use std::sync::mpsc::Receiver;
use std::thread;

use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use stated_events::EventFilter;
use stated_models::{
    Attributes, ExpireAction, Value, VariableEvent, VariableId, VariableType,
};
use stated_runtime::{Command, Runtime, RuntimeConfig, SetCommand, ValueUpdate};
use tracing::debug;

use crate::cli::{parse_attribute, parse_value};
use crate::commands::{self, describe_outcome, print_state, print_table};

/// Help information for a command.
pub struct CommandHelp {
    /// Command name (e.g., "set").
    pub name: &'static str,
    /// Command aliases (e.g., ["s"]).
    pub aliases: &'static [&'static str],
    /// Brief one-line description.
    pub brief: &'static str,
    /// Usage syntax.
    pub usage: &'static str,
    /// Examples with descriptions.
    pub examples: &'static [(&'static str, &'static str)],
}

/// Static help entries for all commands.
static COMMAND_HELP: &[CommandHelp] = &[
    CommandHelp {
        name: "set",
        aliases: &[],
        brief: "Create or update a variable by name",
        usage: "/set <name> [value] [type=T] [icon=I] [ttl=N] [expire_to=V] [action=reset|delete] [attr.K=V]",
        examples: &[
            ("/set \"Kitchen Light\" on type=boolean ttl=300", "Light on for five minutes"),
            ("/set guest_mode true type=boolean ttl=60 action=delete", "Temporary variable"),
        ],
    },
    CommandHelp {
        name: "value",
        aliases: &["v"],
        brief: "Write a value to an existing variable",
        usage: "/value <id> <value> [ttl=N] [expire_to=V] [action=reset|delete] [attr.K=V]",
        examples: &[
            ("/value counter 3", "Set counter to 3, cancelling any TTL"),
            ("/value kitchen_light on ttl=30", "On for thirty seconds"),
        ],
    },
    CommandHelp {
        name: "toggle",
        aliases: &["t"],
        brief: "Flip a boolean variable",
        usage: "/toggle <id>",
        examples: &[("/toggle kitchen_light", "Flip the kitchen light")],
    },
    CommandHelp {
        name: "delete",
        aliases: &["rm"],
        brief: "Delete a variable by name",
        usage: "/delete <name>",
        examples: &[("/delete \"Kitchen Light\"", "Delete kitchen_light")],
    },
    CommandHelp {
        name: "delete-prefix",
        aliases: &["rmp"],
        brief: "Delete every variable whose id starts with a prefix",
        usage: "/delete-prefix <prefix>",
        examples: &[("/delete-prefix kitchen_", "Delete all kitchen variables")],
    },
    CommandHelp {
        name: "get",
        aliases: &["g"],
        brief: "Show one variable",
        usage: "/get <id>",
        examples: &[("/get kitchen_light", "Show kitchen_light")],
    },
    CommandHelp {
        name: "list",
        aliases: &["ls", "l"],
        brief: "List all variables",
        usage: "/list",
        examples: &[("/list", "List all variables")],
    },
    CommandHelp {
        name: "events",
        aliases: &[],
        brief: "Show recent change events",
        usage: "/events [count]",
        examples: &[("/events 5", "Show the last five changes")],
    },
    CommandHelp {
        name: "help",
        aliases: &["h", "?"],
        brief: "Show help",
        usage: "/help [command]",
        examples: &[("/help set", "Show detailed help for /set")],
    },
    CommandHelp {
        name: "quit",
        aliases: &["q", "exit"],
        brief: "Exit the REPL (armed TTLs are dropped)",
        usage: "/quit",
        examples: &[],
    },
];

/// Tab completion for slash commands.
struct CommandCompleter;

impl CommandCompleter {
    const COMMANDS: &'static [&'static str] = &[
        "/delete", "/delete-prefix", "/events", "/get", "/help", "/list", "/quit", "/set",
        "/toggle", "/value",
    ];
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        if !line.starts_with('/') {
            return Ok((0, vec![]));
        }

        let prefix = &line[..pos];
        let matches: Vec<Pair> = Self::COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Helper for CommandCompleter {}

/// Slash commands available in the REPL.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    /// Apply a runtime command
    Run(Command),
    /// Show one variable
    Get(String),
    /// List all variables
    List,
    /// Show recent change events
    Events(usize),
    /// Show help (optionally for a specific command)
    Help(Option<String>),
    /// Quit the REPL
    Quit,
    /// Malformed command, with the reason
    Invalid(String),
    /// Unknown command
    Unknown(String),
    /// Empty line
    Empty,
}

/// Options accepted after the positional arguments of /set and /value.
#[derive(Debug, Default)]
struct ValueOptions {
    var_type: Option<VariableType>,
    icon: Option<String>,
    ttl: Option<i64>,
    expire_to: Option<Value>,
    expire_action: ExpireAction,
    attributes: Attributes,
}

impl ValueOptions {
    fn parse(tokens: &[String]) -> Result<Self, String> {
        let mut options = ValueOptions::default();
        for token in tokens {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{}'", token))?;
            match key {
                "type" => {
                    options.var_type = Some(value.parse().map_err(|e| format!("{}", e))?)
                }
                "icon" => options.icon = Some(value.to_string()),
                "ttl" => {
                    options.ttl = Some(
                        value
                            .parse()
                            .map_err(|_| format!("ttl must be a whole number of seconds, got '{}'", value))?,
                    )
                }
                "expire_to" => options.expire_to = Some(parse_value(value)?),
                "action" => {
                    options.expire_action = value.parse().map_err(|e| format!("{}", e))?
                }
                _ => match key.strip_prefix("attr.") {
                    Some(attr) => {
                        let (k, v) = parse_attribute(&format!("{}={}", attr, value))?;
                        options.attributes.insert(k, v);
                    }
                    None => return Err(format!("unknown option '{}'", key)),
                },
            }
        }
        Ok(options)
    }

    fn attributes(&mut self) -> Option<Attributes> {
        if self.attributes.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.attributes))
        }
    }
}

/// Splits a line into whitespace-separated tokens, honouring double quotes.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }
    tokens
}

impl ReplCommand {
    /// Parses input into a REPL command.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();

        if input.is_empty() {
            return ReplCommand::Empty;
        }

        let Some(stripped) = input.strip_prefix('/') else {
            return ReplCommand::Unknown(input.to_string());
        };

        let tokens = tokenize(stripped);
        let Some((cmd, args)) = tokens.split_first() else {
            return ReplCommand::Empty;
        };
        let cmd = cmd.to_lowercase();

        match cmd.as_str() {
            "set" => Self::parse_set(args),
            "value" | "v" => Self::parse_value(args),
            "toggle" | "t" => match args {
                [id] => ReplCommand::Run(Command::Toggle {
                    id: VariableId::from(id.as_str()),
                }),
                _ => ReplCommand::Invalid("usage: /toggle <id>".to_string()),
            },
            "delete" | "rm" => match args {
                [name] => ReplCommand::Run(Command::Delete { name: name.clone() }),
                _ => ReplCommand::Invalid("usage: /delete <name>".to_string()),
            },
            "delete-prefix" | "rmp" => match args {
                [prefix] => ReplCommand::Run(Command::DeletePrefix {
                    prefix: prefix.clone(),
                }),
                _ => ReplCommand::Invalid("usage: /delete-prefix <prefix>".to_string()),
            },
            "get" | "g" => match args {
                [id] => ReplCommand::Get(id.clone()),
                _ => ReplCommand::Invalid("usage: /get <id>".to_string()),
            },
            "list" | "ls" | "l" => ReplCommand::List,
            "events" => match args {
                [] => ReplCommand::Events(10),
                [n] => n
                    .parse()
                    .map(ReplCommand::Events)
                    .unwrap_or_else(|_| ReplCommand::Invalid(format!("not a count: {}", n))),
                _ => ReplCommand::Invalid("usage: /events [count]".to_string()),
            },
            "help" | "h" | "?" => ReplCommand::Help(args.first().cloned()),
            "quit" | "q" | "exit" => ReplCommand::Quit,
            _ => ReplCommand::Unknown(cmd),
        }
    }

    fn parse_set(args: &[String]) -> Self {
        let Some((name, rest)) = args.split_first() else {
            return ReplCommand::Invalid("usage: /set <name> [value] [options]".to_string());
        };
        let (value, rest) = match rest.split_first() {
            Some((value, rest)) if !value.contains('=') => (Some(value), rest),
            _ => (None, rest),
        };

        let mut options = match ValueOptions::parse(rest) {
            Ok(options) => options,
            Err(e) => return ReplCommand::Invalid(e),
        };

        let value = match value.map(|v| parse_value(v)).transpose() {
            Ok(value) => value,
            Err(e) => return ReplCommand::Invalid(e),
        };

        ReplCommand::Run(Command::Set(SetCommand {
            name: name.clone(),
            value,
            var_type: options.var_type,
            icon: options.icon.take(),
            attributes: options.attributes(),
            ttl: options.ttl,
            expire_to: options.expire_to.take(),
            expire_action: options.expire_action,
        }))
    }

    fn parse_value(args: &[String]) -> Self {
        let [id, value, rest @ ..] = args else {
            return ReplCommand::Invalid("usage: /value <id> <value> [options]".to_string());
        };

        let mut options = match ValueOptions::parse(rest) {
            Ok(options) => options,
            Err(e) => return ReplCommand::Invalid(e),
        };
        if options.var_type.is_some() || options.icon.is_some() {
            return ReplCommand::Invalid("type and icon can only be changed with /set".to_string());
        }

        let value = match parse_value(value) {
            Ok(value) => value,
            Err(e) => return ReplCommand::Invalid(e),
        };

        ReplCommand::Run(Command::SetValue {
            id: VariableId::from(id.as_str()),
            update: ValueUpdate {
                value,
                ttl: options.ttl,
                expire_to: options.expire_to.take(),
                expire_action: options.expire_action,
                attributes: options.attributes(),
            },
        })
    }
}

/// Formats an event for display, `None` for events that are not shown.
pub fn format_event(event: &VariableEvent) -> Option<String> {
    match event {
        VariableEvent::Changed(change) => Some(format!(
            "[{}] {}: {} -> {}",
            change.timestamp.format("%H:%M:%S"),
            change.variable_id,
            change.old_state.as_deref().unwrap_or("-"),
            change.new_state.as_deref().unwrap_or("-"),
        )),
        VariableEvent::Removed { variable_id } => Some(format!("[removed] {}", variable_id)),
        VariableEvent::Created(_) | VariableEvent::StateWritten(_) => None,
    }
}

/// REPL state
pub struct Repl {
    editor: Editor<CommandCompleter, DefaultHistory>,
    history_path: Option<std::path::PathBuf>,
    runtime: Runtime,
    tokio: tokio::runtime::Runtime,
}

impl Repl {
    /// Creates a new REPL instance and starts its runtime.
    pub fn new(state_dir: &Path) -> commands::Result<Self> {
        let config = rustyline::Config::builder()
            .completion_type(rustyline::CompletionType::List)
            .build();
        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(CommandCompleter));

        // Timers run on the worker threads while readline blocks
        let tokio = tokio::runtime::Runtime::new()?;
        let runtime = tokio.block_on(async {
            let mut runtime = Runtime::new(RuntimeConfig::new().with_state_dir(state_dir)).await?;
            runtime.start().await?;
            Ok::<_, stated_runtime::RuntimeError>(runtime)
        })?;

        // Set up history file
        let history_path = state_dir.join("repl_history.txt");
        if history_path.exists() {
            let _ = editor.load_history(&history_path);
        }

        Ok(Self {
            editor,
            history_path: Some(history_path),
            runtime,
            tokio,
        })
    }

    /// Runs the REPL loop.
    pub fn run(&mut self) -> commands::Result<()> {
        println!("Stated REPL v{}", env!("CARGO_PKG_VERSION"));
        println!("Type /help for commands, /quit to exit");
        println!();

        spawn_event_printer(self.runtime.subscribe());

        loop {
            match self.editor.readline("stated> ") {
                Ok(line) => {
                    self.editor.add_history_entry(&line)?;

                    let cmd = ReplCommand::parse(&line);
                    debug!(?cmd, "Parsed command");

                    match self.handle_command(cmd) {
                        Ok(true) => break, // Quit requested
                        Ok(false) => {}    // Continue
                        Err(e) => eprintln!("Error: {}", e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    // Don't exit on Ctrl+C, just clear line
                }
                Err(ReadlineError::Eof) => {
                    println!("^D");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        // Save history
        if let Some(path) = &self.history_path {
            let _ = self.editor.save_history(path);
        }

        self.tokio.block_on(self.runtime.shutdown())?;

        println!("Goodbye!");
        Ok(())
    }

    /// Handles a REPL command. Returns Ok(true) if should quit.
    fn handle_command(&mut self, cmd: ReplCommand) -> commands::Result<bool> {
        match cmd {
            ReplCommand::Run(command) => {
                let outcome = self.tokio.block_on(self.runtime.execute(command))?;
                println!("{}", describe_outcome(&outcome));
            }
            ReplCommand::Get(id) => {
                match self.tokio.block_on(self.runtime.get(&VariableId::from(id.as_str()))) {
                    Some(state) => print_state(&state),
                    None => println!("Variable not found: {}", id),
                }
            }
            ReplCommand::List => {
                let states = self.tokio.block_on(self.runtime.list());
                print_table(&states);
            }
            ReplCommand::Events(count) => {
                let recent = self
                    .runtime
                    .events()
                    .recent(Some(&EventFilter::changes()));
                let skip = recent.len().saturating_sub(count);
                if recent.is_empty() {
                    println!("No changes yet.");
                }
                for line in recent.iter().skip(skip).filter_map(format_event) {
                    println!("{}", line);
                }
            }
            ReplCommand::Help(topic) => print_help(topic.as_deref()),
            ReplCommand::Quit => return Ok(true),
            ReplCommand::Invalid(reason) => println!("{}", reason),
            ReplCommand::Unknown(cmd) => {
                println!("Unknown command: {}. Type /help for available commands.", cmd)
            }
            ReplCommand::Empty => {}
        }
        Ok(false)
    }
}

/// Prints change and removal events from a background thread.
fn spawn_event_printer(events: Receiver<VariableEvent>) {
    thread::spawn(move || {
        while let Ok(event) = events.recv() {
            if let Some(line) = format_event(&event) {
                println!("{}", line);
            }
        }
    });
}

/// Finds help for a command by name or alias.
fn find_command_help(name: &str) -> Option<&'static CommandHelp> {
    let name_lower = name.trim_start_matches('/').to_lowercase();
    COMMAND_HELP
        .iter()
        .find(|h| h.name == name_lower || h.aliases.contains(&name_lower.as_str()))
}

/// Prints help information.
fn print_help(topic: Option<&str>) {
    match topic {
        Some(cmd) => {
            if let Some(help) = find_command_help(cmd) {
                println!("/{} - {}", help.name, help.brief);
                if !help.aliases.is_empty() {
                    println!("Aliases: {}", help.aliases.join(", "));
                }
                println!();
                println!("Usage:");
                println!("  {}", help.usage);
                if !help.examples.is_empty() {
                    println!();
                    println!("Examples:");
                    for (example, desc) in help.examples {
                        println!("  {}  # {}", example, desc);
                    }
                }
            } else {
                println!(
                    "Unknown command: {}. Type /help for available commands.",
                    cmd
                );
            }
        }
        None => {
            println!("Stated REPL - runtime variables with TTL expiry");
            println!();
            println!("COMMANDS:");
            for help in COMMAND_HELP {
                println!("    /{:<16} {}", help.name, help.brief);
            }
            println!();
            println!("Names containing spaces must be quoted: /set \"Kitchen Light\" on");
            println!("Type /help <command> for detailed help on a specific command.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stated_models::ChangeEvent;

    #[test]
    fn test_tokenize_quotes() {
        assert_eq!(
            tokenize("set \"Kitchen Light\" on  ttl=5"),
            vec!["set", "Kitchen Light", "on", "ttl=5"]
        );
        assert_eq!(tokenize("value x \"\""), vec!["value", "x", ""]);
    }

    #[test]
    fn test_parse_set_full() {
        let cmd = ReplCommand::parse(
            "/set \"Kitchen Light\" on type=boolean ttl=300 action=delete attr.room=kitchen",
        );
        match cmd {
            ReplCommand::Run(Command::Set(set)) => {
                assert_eq!(set.name, "Kitchen Light");
                assert_eq!(set.value, Some(Value::from("on")));
                assert_eq!(set.var_type, Some(VariableType::Boolean));
                assert_eq!(set.ttl, Some(300));
                assert_eq!(set.expire_action, ExpireAction::Delete);
                assert_eq!(set.attributes.unwrap()["room"], serde_json::json!("kitchen"));
            }
            other => panic!("Expected Set, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_set_without_value() {
        let cmd = ReplCommand::parse("/set porch icon=mdi:lamp");
        match cmd {
            ReplCommand::Run(Command::Set(set)) => {
                assert!(set.value.is_none());
                assert_eq!(set.icon.as_deref(), Some("mdi:lamp"));
            }
            other => panic!("Expected Set, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_set_bad_option() {
        assert!(matches!(
            ReplCommand::parse("/set x 1 type=color"),
            ReplCommand::Invalid(_)
        ));
        assert!(matches!(
            ReplCommand::parse("/set x 1 ttl=soon"),
            ReplCommand::Invalid(_)
        ));
        assert!(matches!(ReplCommand::parse("/set"), ReplCommand::Invalid(_)));
    }

    #[test]
    fn test_parse_value() {
        let cmd = ReplCommand::parse("/value counter 3 ttl=10 expire_to=0");
        match cmd {
            ReplCommand::Run(Command::SetValue { id, update }) => {
                assert_eq!(id.as_str(), "counter");
                assert_eq!(update.value, Value::Int(3));
                assert_eq!(update.ttl, Some(10));
                assert_eq!(update.expire_to, Some(Value::Int(0)));
            }
            other => panic!("Expected SetValue, got {:?}", other),
        }

        assert!(matches!(
            ReplCommand::parse("/value counter"),
            ReplCommand::Invalid(_)
        ));
        assert!(matches!(
            ReplCommand::parse("/value counter 3 type=number"),
            ReplCommand::Invalid(_)
        ));
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(
            ReplCommand::parse("/toggle light"),
            ReplCommand::Run(Command::Toggle {
                id: VariableId::from("light")
            })
        );
        assert_eq!(
            ReplCommand::parse("/rmp kitchen_"),
            ReplCommand::Run(Command::DeletePrefix {
                prefix: "kitchen_".to_string()
            })
        );
        assert_eq!(ReplCommand::parse("/ls"), ReplCommand::List);
        assert_eq!(ReplCommand::parse("/events"), ReplCommand::Events(10));
        assert_eq!(ReplCommand::parse("/events 3"), ReplCommand::Events(3));
        assert_eq!(ReplCommand::parse("/q"), ReplCommand::Quit);
    }

    #[test]
    fn test_parse_help() {
        assert_eq!(ReplCommand::parse("/help"), ReplCommand::Help(None));
        assert_eq!(
            ReplCommand::parse("/? set"),
            ReplCommand::Help(Some("set".to_string()))
        );
    }

    #[test]
    fn test_parse_empty_and_unknown() {
        assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
        assert_eq!(
            ReplCommand::parse("/frobnicate"),
            ReplCommand::Unknown("frobnicate".to_string())
        );
        assert!(matches!(ReplCommand::parse("hello"), ReplCommand::Unknown(_)));
    }

    #[test]
    fn test_find_command_help() {
        assert!(find_command_help("set").is_some());
        assert!(find_command_help("/rm").is_some());
        assert!(find_command_help("nonexistent").is_none());
    }

    #[test]
    fn test_format_event() {
        let change = VariableEvent::Changed(ChangeEvent::new(
            VariableId::from("kitchen_light"),
            "Kitchen Light",
            VariableType::Boolean,
            Some("on".to_string()),
            Some("off".to_string()),
        ));
        let line = format_event(&change).unwrap();
        assert!(line.ends_with("kitchen_light: on -> off"));

        let removed = VariableEvent::Removed {
            variable_id: VariableId::from("x"),
        };
        assert_eq!(format_event(&removed).unwrap(), "[removed] x");
    }

    #[test]
    fn test_completer_matches_prefix() {
        let completer = CommandCompleter;
        let history = DefaultHistory::new();
        let ctx = Context::new(&history);

        let (start, matches) = completer.complete("/del", 4, &ctx).unwrap();
        assert_eq!(start, 0);
        let names: Vec<_> = matches.iter().map(|p| p.display.as_str()).collect();
        assert_eq!(names, vec!["/delete", "/delete-prefix"]);
    }

    #[test]
    fn test_completer_no_match() {
        let completer = CommandCompleter;
        let history = DefaultHistory::new();
        let ctx = Context::new(&history);

        let (_, matches) = completer.complete("plain", 5, &ctx).unwrap();
        assert!(matches.is_empty());
    }
}
