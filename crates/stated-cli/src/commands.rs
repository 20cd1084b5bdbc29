//! Command handlers for CLI subcommands.

use std::path::Path;

use stated_models::{VariableId, VariableState};
use stated_runtime::{Command, CommandOutcome, Runtime, RuntimeConfig, SetCommand, ValueUpdate};
use tracing::info;

use crate::cli::{attributes_from, Commands, OutputFormat};

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Execute a CLI command.
pub fn execute(command: Commands, state_dir: &Path) -> Result<()> {
    let tokio = tokio::runtime::Runtime::new()?;
    tokio.block_on(execute_async(command, state_dir))
}

async fn execute_async(command: Commands, state_dir: &Path) -> Result<()> {
    let config = RuntimeConfig::new().with_state_dir(state_dir);
    let runtime = Runtime::new(config).await?;

    match command {
        Commands::Get { id, format } => cmd_get(&runtime, &id, format).await,
        Commands::List { format } => cmd_list(&runtime, format).await,
        Commands::Repl => {
            // REPL is handled separately in main
            Ok(())
        }
        other => {
            let Some(command) = to_command(other) else {
                return Ok(());
            };
            let arms_ttl = arms_ttl(&command);
            let outcome = runtime.execute(command).await?;
            info!(?outcome, "command applied");
            println!("{}", describe_outcome(&outcome));
            if arms_ttl {
                println!("Note: TTLs only fire while a runtime is running (use `stated repl`)");
            }
            Ok(())
        }
    }
}

/// Converts a mutating CLI subcommand into a runtime command.
pub fn to_command(command: Commands) -> Option<Command> {
    match command {
        Commands::Set {
            name,
            value,
            var_type,
            icon,
            attributes,
            ttl,
        } => Some(Command::Set(SetCommand {
            name,
            value,
            var_type,
            icon,
            attributes: attributes_from(attributes),
            ttl: ttl.ttl,
            expire_to: ttl.expire_to,
            expire_action: ttl.expire_action,
        })),
        Commands::SetValue {
            id,
            value,
            attributes,
            ttl,
        } => Some(Command::SetValue {
            id: VariableId::from(id),
            update: ValueUpdate {
                value,
                ttl: ttl.ttl,
                expire_to: ttl.expire_to,
                expire_action: ttl.expire_action,
                attributes: attributes_from(attributes),
            },
        }),
        Commands::Toggle { id } => Some(Command::Toggle {
            id: VariableId::from(id),
        }),
        Commands::Delete { name } => Some(Command::Delete { name }),
        Commands::DeletePrefix { prefix } => Some(Command::DeletePrefix { prefix }),
        Commands::Get { .. } | Commands::List { .. } | Commands::Repl => None,
    }
}

fn arms_ttl(command: &Command) -> bool {
    match command {
        Command::Set(set) => set.ttl.is_some(),
        Command::SetValue { update, .. } => update.ttl.is_some(),
        _ => false,
    }
}

/// Returns a one-line, human-readable summary of an outcome.
pub fn describe_outcome(outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::Set { id, created: true } => format!("Created '{}'", id),
        CommandOutcome::Set { id, created: false } => format!("Updated '{}'", id),
        CommandOutcome::Deleted { id, existed: true } => format!("Deleted '{}'", id),
        CommandOutcome::Deleted { id, existed: false } => {
            format!("Variable '{}' does not exist", id)
        }
        CommandOutcome::DeletedPrefix { count } => format!("Deleted {} variable(s)", count),
        CommandOutcome::ValueSet { id } => format!("Set '{}'", id),
        CommandOutcome::Toggled { id, toggled: true } => format!("Toggled '{}'", id),
        CommandOutcome::Toggled { id, toggled: false } => {
            format!("Cannot toggle '{}': not a boolean variable", id)
        }
    }
}

async fn cmd_get(runtime: &Runtime, id: &str, format: OutputFormat) -> Result<()> {
    let state = runtime
        .get(&VariableId::from(id))
        .await
        .ok_or_else(|| format!("Variable not found: {}", id))?;

    match format {
        OutputFormat::Table => print_state(&state),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&state)?),
    }
    Ok(())
}

async fn cmd_list(runtime: &Runtime, format: OutputFormat) -> Result<()> {
    let states = runtime.list().await;

    match format {
        OutputFormat::Table => print_table(&states),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&states)?),
    }
    Ok(())
}

/// Prints variables as a table.
pub fn print_table(states: &[VariableState]) {
    if states.is_empty() {
        println!("No variables found.");
        return;
    }

    println!("{:<24} {:<24} {:<8} {:<16} EXPIRES", "ID", "NAME", "TYPE", "STATE");
    println!("{}", "-".repeat(84));
    for state in states {
        println!("{}", table_row(state));
    }
}

/// Formats one table row.
pub fn table_row(state: &VariableState) -> String {
    let expires = state
        .expiry
        .as_ref()
        .map(|e| format!("{} ({})", e.expires_at.format("%H:%M:%S"), e.expire_action))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<24} {:<24} {:<8} {:<16} {}",
        truncate(state.id.as_str(), 24),
        truncate(&state.name, 24),
        state.var_type.as_str(),
        truncate(state.state.as_deref().unwrap_or("-"), 16),
        expires
    )
}

/// Prints the details of one variable.
pub fn print_state(state: &VariableState) {
    for line in state_lines(state) {
        println!("{}", line);
    }
}

/// Formats the details of one variable, one line per entry.
///
/// The attribute section is the one automations see: user attributes plus
/// the type and any armed expiry.
pub fn state_lines(state: &VariableState) -> Vec<String> {
    let mut lines = vec![
        format!("Variable: {}", state.name),
        format!("  ID: {}", state.id),
        format!("  Type: {}", state.var_type),
        format!("  State: {}", state.state.as_deref().unwrap_or("-")),
    ];
    if let Some(icon) = &state.icon {
        lines.push(format!("  Icon: {}", icon));
    }
    if let Some(expiry) = &state.expiry {
        lines.push(format!("  Expires to: {}", expiry.expire_to));
    }
    lines.push("  Attributes:".to_string());
    for (key, value) in &state.extra_attributes() {
        lines.push(format!("    {}: {}", key, value));
    }
    lines
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::TtlArgs;
    use stated_models::{ExpireAction, Expiry, Value, VariableType};
    use tempfile::tempdir;

    #[test]
    fn test_to_command_set() {
        let command = to_command(Commands::Set {
            name: "Kitchen Light".to_string(),
            value: Some(Value::Bool(true)),
            var_type: Some(VariableType::Boolean),
            icon: None,
            attributes: vec![("room".to_string(), serde_json::json!("kitchen"))],
            ttl: TtlArgs {
                ttl: Some(60),
                expire_to: None,
                expire_action: ExpireAction::Delete,
            },
        })
        .unwrap();

        match command {
            Command::Set(set) => {
                assert_eq!(set.name, "Kitchen Light");
                assert_eq!(set.ttl, Some(60));
                assert_eq!(set.expire_action, ExpireAction::Delete);
                assert_eq!(set.attributes.unwrap()["room"], serde_json::json!("kitchen"));
            }
            other => panic!("Expected Set, got {:?}", other),
        }
    }

    #[test]
    fn test_to_command_read_only() {
        assert!(to_command(Commands::List {
            format: OutputFormat::Table
        })
        .is_none());
        assert!(to_command(Commands::Repl).is_none());
    }

    #[test]
    fn test_describe_outcome() {
        let id = VariableId::from("porch");
        assert_eq!(
            describe_outcome(&CommandOutcome::Set {
                id: id.clone(),
                created: true
            }),
            "Created 'porch'"
        );
        assert_eq!(
            describe_outcome(&CommandOutcome::DeletedPrefix { count: 2 }),
            "Deleted 2 variable(s)"
        );
        assert_eq!(
            describe_outcome(&CommandOutcome::Toggled { id, toggled: false }),
            "Cannot toggle 'porch': not a boolean variable"
        );
    }

    fn lamp_state() -> VariableState {
        VariableState {
            id: VariableId::from("lamp"),
            name: "Lamp".to_string(),
            var_type: VariableType::Boolean,
            state: Some("on".to_string()),
            value: Value::Bool(true),
            icon: None,
            attributes: serde_json::json!({"room": "den"})
                .as_object()
                .cloned()
                .unwrap(),
            expiry: None,
        }
    }

    #[test]
    fn test_state_lines_include_extra_attributes() {
        let lines = state_lines(&lamp_state());

        assert!(lines.contains(&"    room: \"den\"".to_string()));
        assert!(lines.contains(&"    var_type: \"boolean\"".to_string()));
        assert!(!lines.iter().any(|l| l.contains("expires_at")));
    }

    #[test]
    fn test_state_lines_show_armed_expiry() {
        let mut state = lamp_state();
        state.expiry = Some(Expiry {
            expires_at: chrono::Utc::now(),
            expire_to: Value::Bool(false),
            expire_action: ExpireAction::Delete,
        });

        let lines = state_lines(&state);

        assert!(lines.iter().any(|l| l.starts_with("    expires_at: ")));
        assert!(lines.contains(&"    expire_action: \"delete\"".to_string()));
        assert!(lines.contains(&"  Expires to: false".to_string()));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a_very_long_variable_id", 10), "a_very_...");
    }

    #[test]
    fn test_execute_persists_between_invocations() {
        let dir = tempdir().unwrap();

        execute(
            Commands::Set {
                name: "Porch".to_string(),
                value: Some(Value::from("on")),
                var_type: Some(VariableType::Boolean),
                icon: None,
                attributes: vec![],
                ttl: TtlArgs::default(),
            },
            dir.path(),
        )
        .unwrap();
        execute(
            Commands::Toggle {
                id: "porch".to_string(),
            },
            dir.path(),
        )
        .unwrap();

        let tokio = tokio::runtime::Runtime::new().unwrap();
        let runtime = tokio
            .block_on(Runtime::new(RuntimeConfig::new().with_state_dir(dir.path())))
            .unwrap();
        let state = tokio
            .block_on(runtime.get(&VariableId::from("porch")))
            .unwrap();
        assert_eq!(state.state.as_deref(), Some("off"));
    }
}
