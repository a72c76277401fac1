//! Prints the built-in mode catalog of a freshly built registry.
//!
//! The registry starts empty apart from its modes, so this shows mode shapes
//! only (descriptor kind, capabilities, factory type), either as a table or
//! as the JSON snapshot.

use clap::{Parser, ValueEnum};
use opreg::{CaselessKey, OperationRegistry, RegistrySnapshot};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Registry inspector command line arguments.
#[derive(Parser, Debug)]
#[command(name = "registry-inspect")]
#[command(about = "List the built-in modes of a new operation registry")]
struct Args {
    /// Only show this mode (caseless)
    #[arg(short, long)]
    mode: Option<String>,

    /// Print the JSON snapshot instead of a table
    #[arg(long)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, requires = "json")]
    pretty: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "OPREG_LOG_FORMAT")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// One row per mode, no operation counts: a new registry has none.
fn render_table(snapshot: &RegistrySnapshot) -> String {
    let mut out = format!(
        "{:<22} {:<10} {:<12} {:<11} FACTORY TYPE\n",
        "MODE", "KIND", "PREFERENCES", "PROPERTIES"
    );
    for mode in &snapshot.modes {
        out.push_str(&format!(
            "{:<22} {:<10} {:<12} {:<11} {}\n",
            mode.name,
            mode.descriptor_kind.to_string(),
            mode.supports_preferences,
            mode.supports_properties,
            mode.factory_type
        ));
    }
    out
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let registry = OperationRegistry::new();
    let mut snapshot = registry.snapshot();
    if let Some(mode) = &args.mode {
        let wanted = CaselessKey::new(mode.as_str());
        snapshot.modes.retain(|m| wanted.matches(&m.name));
        if snapshot.modes.is_empty() {
            anyhow::bail!("unknown mode \"{mode}\"; known modes: {}", registry.registry_modes().join(", "));
        }
    }
    tracing::debug!(modes = snapshot.modes.len(), "registry snapshot taken");

    if args.json {
        let out = if args.pretty {
            serde_json::to_string_pretty(&snapshot)?
        } else {
            serde_json::to_string(&snapshot)?
        };
        println!("{out}");
        return Ok(());
    }

    print!("{}", render_table(&snapshot));
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn about_text_describes_the_mode_catalog() {
        Args::command().debug_assert();
        let about = Args::command().get_about().map(ToString::to_string);
        assert_eq!(about.as_deref(), Some("List the built-in modes of a new operation registry"));
    }

    #[test]
    fn table_lists_every_builtin_mode_without_operation_counts() {
        let registry = OperationRegistry::new();
        let table = render_table(&registry.snapshot());
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("MODE"));
        assert!(!lines[0].contains("OPERATIONS"));
        assert_eq!(lines.len(), 1 + registry.registry_modes().len());
        assert!(lines.iter().any(|l| l.starts_with("tileDecoder")));
    }

    #[test]
    fn pretty_requires_json() {
        assert!(Args::try_parse_from(["registry-inspect", "--pretty"]).is_err());
        let args = Args::try_parse_from(["registry-inspect", "--json", "--pretty", "-m", "RENDERED"]).unwrap();
        assert_eq!(args.mode.as_deref(), Some("RENDERED"));
    }
}
