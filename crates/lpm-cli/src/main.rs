mod config;

use config::{LpmConfig, Overrides};

use anyhow::Result;
use clap::{Parser, Subcommand};
use lpm_native::platform::{self, PATHSEP, PLATFORM, VERSION};
use lpm_native::{Registry, Value};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit status when the capability layer cannot be brought up.
const STARTUP_FAILURE: u8 = 255;

#[derive(Parser, Debug)]
#[command(name = "lpm")]
#[command(about = "Scriptable package manager: native capability layer")]
#[command(version = VERSION)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory of PEM certificates to trust for HTTPS and git
    #[arg(long, value_name = "DIR", global = true, conflicts_with = "ca_file")]
    ca_dir: Option<PathBuf>,

    /// PEM certificate bundle to trust for HTTPS and git
    #[arg(long, value_name = "FILE", global = true)]
    ca_file: Option<PathBuf>,

    /// User agent for HTTP requests
    #[arg(long, global = true)]
    user_agent: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Invoke one capability with string arguments
    Call {
        /// Capability name (see `lpm capabilities`)
        capability: String,

        /// Arguments passed in order
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print the process constants and ARGV as JSON
    Env,

    /// List the registered capabilities
    Capabilities,
}

/// Error raised while bringing up the capability layer, reported with its
/// own message and exit status.
#[derive(Debug)]
struct StartupError(anyhow::Error);

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for StartupError {}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn install(args: &Args) -> Result<Registry, StartupError> {
    let config = LpmConfig::load_from_cwd().map_err(StartupError)?;
    let overrides = Overrides {
        user_agent: args.user_agent.clone(),
        ca_dir: args.ca_dir.clone(),
        ca_file: args.ca_file.clone(),
    };
    let transfer = config::transfer_config(config.as_ref(), overrides);
    log::debug!("transfer configuration: {:?}", transfer);

    Registry::install(transfer).map_err(|e| StartupError(e.into()))
}

/// Render one result value the way a script would print it: strings and
/// bodies verbatim, containers as JSON.
fn render(value: &Value) -> Result<Vec<u8>> {
    let mut out = match value {
        Value::Nil => b"nil".to_vec(),
        Value::Boolean(b) => b.to_string().into_bytes(),
        Value::Integer(n) => n.to_string().into_bytes(),
        Value::String(s) => s.clone().into_bytes(),
        Value::Bytes(bytes) => return Ok(bytes.clone()),
        Value::List(_) | Value::Table(_) => serde_json::to_vec_pretty(value)?,
    };
    out.push(b'\n');
    Ok(out)
}

fn env_json() -> serde_json::Value {
    serde_json::json!({
        "PLATFORM": PLATFORM,
        "PATHSEP": PATHSEP.to_string(),
        "ARCH": platform::arch_tuple(),
        "VERSION": VERSION,
        "ARGV": std::env::args().collect::<Vec<_>>(),
    })
}

fn run() -> Result<u8> {
    let args = Args::parse();
    init_logging(args.verbose);

    match &args.command {
        Commands::Env => {
            println!("{}", serde_json::to_string_pretty(&env_json())?);
            Ok(0)
        }
        Commands::Capabilities => {
            for capability in Registry::capabilities() {
                println!("{:<18} {}", capability.name, capability.usage);
            }
            Ok(0)
        }
        Commands::Call { capability, args: call_args } => {
            let mut registry = install(&args)?;
            let values: Vec<Value> = call_args.iter().map(|a| Value::from(a.as_str())).collect();
            let results = registry.invoke(capability, &values)?;

            let stdout = io::stdout();
            let mut out = stdout.lock();
            for value in &results {
                out.write_all(&render(value)?)?;
            }
            out.flush()?;
            Ok(0)
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            if let Some(startup) = e.downcast_ref::<StartupError>() {
                eprintln!("internal error when starting the application: {}", startup);
                return ExitCode::from(STARTUP_FAILURE);
            }
            eprintln!("Error: {}", e);
            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn test_args_parse_call() {
        let args = Args::try_parse_from(["lpm", "call", "hash", "hello", "file"]).unwrap();
        match args.command {
            Commands::Call { capability, args } => {
                assert_eq!(capability, "hash");
                assert_eq!(args, vec!["hello", "file"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_args_reject_both_trust_flags() {
        let result = Args::try_parse_from([
            "lpm", "--ca-dir", "/certs", "--ca-file", "/cert.pem", "env",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(render(&Value::Nil).unwrap(), b"nil\n");
        assert_eq!(render(&Value::from("abc")).unwrap(), b"abc\n");
        assert_eq!(render(&Value::Integer(42)).unwrap(), b"42\n");
        assert_eq!(render(&Value::Bytes(vec![0, 159, 1])).unwrap(), vec![0, 159, 1]);
    }

    #[test]
    fn test_render_table_as_json() {
        let mut table = IndexMap::new();
        table.insert("type".to_string(), Value::from("dir"));
        table.insert("size".to_string(), Value::Integer(4096));

        let rendered = render(&Value::Table(table)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&rendered).unwrap();
        assert_eq!(json["type"], "dir");
        assert_eq!(json["size"], 4096);
    }

    #[test]
    fn test_env_json_has_constants() {
        let env = env_json();
        assert_eq!(env["PLATFORM"], PLATFORM);
        assert_eq!(env["VERSION"], VERSION);
        assert!(env["ARGV"].is_array());
        assert!(env["ARCH"].as_str().unwrap().contains('-'));
    }

    #[test]
    fn test_capability_error_has_no_repeated_cause() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let mut registry = Registry::install(lpm_native::TransferConfig::default()).unwrap();

        let error: anyhow::Error = registry
            .invoke("list", &[Value::from(missing.to_str().unwrap())])
            .unwrap_err()
            .into();

        assert!(error.to_string().starts_with("can't ls "));
        assert_eq!(error.chain().count(), 1);
    }

    #[test]
    fn test_startup_error_is_distinguishable() {
        let error: anyhow::Error = StartupError(anyhow::anyhow!("no TLS backend")).into();
        let startup = error.downcast_ref::<StartupError>().unwrap();
        assert_eq!(startup.to_string(), "no TLS backend");
    }
}
