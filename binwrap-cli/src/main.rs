//! Binwrap CLI
//!
//! Fetches and runs a wrapped tool described by a JSON definition file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use binwrap_core::{BinError, BinWrapperBuilder, WrapperFile};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "binwrap", version, about = "Download and run external tools")]
struct Cli {
    /// Wrapper definition file
    #[arg(short, long, global = true, default_value = "binwrap.json")]
    config: PathBuf,

    /// Enable debug logging for binwrap
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the resolved executable path
    Path,
    /// Download the tool if it is missing and print its path
    Fetch,
    /// Run the tool with extra arguments
    Run {
        /// Kill the tool after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Arguments passed after the configured ones
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if verbose {
        if let Ok(directive) = "binwrap=debug".parse() {
            filter = filter.add_directive(directive);
        }
        if let Ok(directive) = "binwrap_core=debug".parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let definition = load_definition(&cli.config)?;
    tracing::debug!("Loaded definition for {}", definition.exec);

    match cli.command {
        Command::Path => {
            let wrapper = definition.into_builder().build();
            println!("{}", wrapper.path().display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Fetch => {
            let wrapper = definition.into_builder().build();
            let path = wrapper
                .ensure_available()
                .await
                .context("Failed to fetch tool")?;
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { timeout_secs, args } => {
            let mut wrapper = run_builder(definition, cli.verbose, timeout_secs).build();

            let extra: Vec<&str> = args.iter().map(String::as_str).collect();
            let outcome = wrapper.run(&extra).await;

            std::io::stdout()
                .write_all(wrapper.stdout())
                .context("Failed to write stdout")?;
            std::io::stderr()
                .write_all(wrapper.stderr())
                .context("Failed to write stderr")?;

            match outcome {
                Ok(()) => Ok(ExitCode::SUCCESS),
                Err(BinError::ProcessExit { status }) => Ok(status
                    .code()
                    .and_then(|code| u8::try_from(code).ok())
                    .map(ExitCode::from)
                    .unwrap_or(ExitCode::FAILURE)),
                Err(e) => Err(e).context("Failed to run tool"),
            }
        }
    }
}

/// Builder for `run`. `--verbose` can enable the debug line but never turns
/// off one enabled in the definition.
fn run_builder(
    definition: WrapperFile,
    verbose: bool,
    timeout_secs: Option<u64>,
) -> BinWrapperBuilder {
    let mut builder = definition.into_builder();
    if verbose {
        builder = builder.debug(true);
    }
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder
}

/// Loads the definition. Downloaded tools without a `dest` go to the user
/// cache directory; tools without sources stay on `PATH`.
fn load_definition(path: &Path) -> Result<WrapperFile> {
    let mut definition = WrapperFile::load(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    if definition.dest.is_none() && !definition.sources.is_empty() {
        if let Some(cache) = dirs::cache_dir() {
            definition.dest = Some(cache.join("binwrap").join(&definition.exec));
        }
    }

    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_hyphen_args() {
        let cli = Cli::try_parse_from([
            "binwrap",
            "--config",
            "tool.json",
            "run",
            "--timeout-secs",
            "5",
            "--",
            "--version",
            "-x",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("tool.json"));
        match cli.command {
            Command::Run { timeout_secs, args } => {
                assert_eq!(timeout_secs, Some(5));
                assert_eq!(args, ["--version", "-x"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_default_dest_uses_cache_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("binwrap.json");
        std::fs::write(
            &path,
            r#"{ "exec": "tool", "sources": [{ "url": "https://example.com/tool" }] }"#,
        )
        .unwrap();

        let definition = load_definition(&path).unwrap();
        if let Some(cache) = dirs::cache_dir() {
            assert_eq!(definition.dest, Some(cache.join("binwrap").join("tool")));
        }
    }

    #[test]
    fn test_path_tool_keeps_empty_dest() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("binwrap.json");
        std::fs::write(&path, r#"{ "exec": "echo" }"#).unwrap();

        let definition = load_definition(&path).unwrap();
        assert_eq!(definition.dest, None);
        assert_eq!(
            definition.into_builder().build().path(),
            PathBuf::from("echo")
        );
    }

    #[test]
    fn test_definition_debug_survives_without_verbose() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("binwrap.json");
        std::fs::write(&path, r#"{ "exec": "echo", "debug": true }"#).unwrap();

        let builder = run_builder(load_definition(&path).unwrap(), false, None);
        assert!(builder.build().config().debug);
    }
}
