//! Tracing subscriber setup shared by the agent and server binaries.

use tracing_subscriber::EnvFilter;

/// Log output format selected by `--log-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Console,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "console" | "text" => Ok(LogFormat::Console),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Install the global subscriber. `level` is one of debug/info/warn/error;
/// `component` scopes the default directive so RUST_LOG can still widen it.
pub fn init(level: &str, format: LogFormat, component: &str) -> Result<(), String> {
    let directive = format!("{component}={level}")
        .parse()
        .map_err(|e| format!("invalid log level '{level}': {e}"))?;
    let filter = EnvFilter::from_default_env()
        .add_directive(directive)
        .add_directive(
            format!("fleetmon={level}")
                .parse()
                .map_err(|e| format!("invalid log level '{level}': {e}"))?,
        );

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Console => builder.init(),
    }
    Ok(())
}
