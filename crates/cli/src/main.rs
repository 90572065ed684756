//! Styx Singularity CLI - run commands inside Singularity/Apptainer containers

mod logging;
mod settings;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::debug;

use styx_singularity_core::config::parse_env_pair;
use styx_singularity_core::domain::DEFAULT_EXECUTION_NAME;
use styx_singularity_core::shell::shell_join;
use styx_singularity_core::{
    ContainerFailure, ExecutionRequest, Mount, OutputFile, RunnerConfig, RunnerError,
    SingularityRunner,
};
use styx_singularity_infra_system::SubprocessInvoker;

use settings::Overrides;

/// Exit code when the adapter itself fails (config, launch, mounts, ...)
const ADAPTER_FAILURE_EXIT: u8 = 125;

#[derive(Parser)]
#[command(name = "styx-singularity")]
#[command(about = "Run Styx commands inside Singularity/Apptainer containers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML, YAML or JSON)
    #[arg(long, global = true, env = "STYX_SINGULARITY_CONFIG")]
    config: Option<PathBuf>,

    /// Add or replace an image mapping
    #[arg(long = "image-map", value_name = "TAG=PATH", global = true)]
    image_map: Vec<String>,

    /// Container runtime binary (singularity or apptainer)
    #[arg(long, global = true)]
    executable: Option<String>,

    /// Directory under which workspaces are created
    #[arg(long, global = true)]
    workspace_root: Option<PathBuf>,

    /// Debug logging, including the container's output line by line
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command inside a container
    Run {
        #[command(flatten)]
        request: RequestArgs,

        /// Print the execution result as JSON instead of forwarding output
        #[arg(long)]
        json: bool,
    },

    /// Print the container command line without running it
    Command {
        #[command(flatten)]
        request: RequestArgs,
    },

    /// List configured images
    Images,
}

#[derive(Args)]
struct RequestArgs {
    /// Image tag to run
    #[arg(long)]
    image: String,

    /// Bind mount SRC[:DST][:ro|:rw]
    #[arg(long = "bind", value_name = "SPEC")]
    binds: Vec<String>,

    /// Environment variable for the container
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Use this workspace instead of allocating one
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Bind the workspace read-write at this container path
    #[arg(long, value_name = "CONTAINER_PATH")]
    workspace_mount: Option<String>,

    /// Working directory inside the container
    #[arg(long)]
    workdir: Option<String>,

    /// Output file expected in the workspace (relative path)
    #[arg(long = "output", value_name = "PATH")]
    outputs: Vec<PathBuf>,

    /// Execution name (used in the workspace directory name)
    #[arg(long, default_value = DEFAULT_EXECUTION_NAME)]
    name: String,

    /// Command and arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl RequestArgs {
    fn into_request(self) -> Result<ExecutionRequest> {
        let (executable, args) = self
            .command
            .split_first()
            .context("Missing command to run")?;

        let mut request = ExecutionRequest::new(self.image, executable.clone())
            .with_name(self.name)
            .with_args(args.iter().cloned());

        for spec in &self.binds {
            let mut mount = Mount::parse(spec)?;
            mount.host_path = std::path::absolute(&mount.host_path)
                .with_context(|| format!("Cannot resolve bind source {}", mount.host_path.display()))?;
            request = request.with_mount(mount);
        }
        for pair in &self.env {
            let (key, value) = parse_env_pair(pair)?;
            request = request.with_env(key, value);
        }
        for output in self.outputs {
            request = request.with_output(OutputFile::new(output, false));
        }
        request.workspace = self.workspace;
        request.workspace_mount = self.workspace_mount;
        request.workdir = self.workdir;

        Ok(request)
    }
}

#[derive(Tabled)]
struct ImageRow {
    #[tabled(rename = "TAG")]
    tag: String,
    #[tabled(rename = "PATH")]
    path: String,
    #[tabled(rename = "PRESENT")]
    present: String,
}

fn load_config(cli: &Cli) -> Result<RunnerConfig> {
    let loaded = settings::load_settings(cli.config.as_deref(), settings::environment_source())?;
    let overrides = Overrides {
        images: cli.image_map.clone(),
        executable: cli.executable.clone(),
        workspace_root: cli.workspace_root.clone(),
    };
    let config = RunnerConfig::try_from(overrides.apply(loaded)?)?;
    debug!(
        executable = %config.executable(),
        workspace_root = %config.workspace_root().display(),
        images = config.images().len(),
        "Configuration loaded"
    );
    Ok(config)
}

fn build_runner(config: RunnerConfig, verbose: bool) -> Result<SingularityRunner> {
    let invoker = if verbose {
        SubprocessInvoker::new()
    } else {
        SubprocessInvoker::quiet()
    };
    Ok(SingularityRunner::new(config, Arc::new(invoker))?)
}

/// Process exit code mirroring the container's
fn container_exit_code(failure: &ContainerFailure) -> u8 {
    match (failure.exit_code, failure.signal) {
        (Some(code), _) => u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1),
        (None, Some(signal)) => u8::try_from(128 + signal).unwrap_or(ADAPTER_FAILURE_EXIT),
        (None, None) => ADAPTER_FAILURE_EXIT,
    }
}

async fn run(runner: &SingularityRunner, request: ExecutionRequest, json: bool) -> Result<ExitCode> {
    match runner.execute(&request).await {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", result.stdout);
                eprint!("{}", result.stderr);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(RunnerError::ContainerExecution(failure)) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&*failure)?);
            } else {
                print!("{}", failure.stdout);
                eprint!("{}", failure.stderr);
                eprintln!("{} {}", "error:".red().bold(), failure);
            }
            Ok(ExitCode::from(container_exit_code(&failure)))
        }
        Err(e) => Err(e.into()),
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run { request, json } => {
            let runner = build_runner(config, cli.verbose)?;
            run(&runner, request.into_request()?, json).await
        }
        Commands::Command { request } => {
            let runner = build_runner(config, cli.verbose)?;
            let argv = runner.command_line(&request.into_request()?)?;
            println!("{}", shell_join(&argv));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Images => {
            let rows: Vec<ImageRow> = config
                .images()
                .iter()
                .map(|(tag, path)| ImageRow {
                    tag: tag.to_string(),
                    path: path.display().to_string(),
                    present: if path.is_file() { "yes" } else { "no" }.to_string(),
                })
                .collect();
            println!("{}", Table::new(rows));
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.verbose) {
        eprintln!("{} {:#}", "warning:".yellow().bold(), e);
    }

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(ADAPTER_FAILURE_EXIT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use styx_singularity_core::MountAccess;

    fn failure(exit_code: Option<i32>, signal: Option<i32>) -> ContainerFailure {
        ContainerFailure {
            exit_code,
            signal,
            argv: vec![],
            command: vec![],
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    #[test]
    fn test_container_exit_code() {
        assert_eq!(container_exit_code(&failure(Some(3), None)), 3);
        assert_eq!(container_exit_code(&failure(None, Some(9))), 137);
        assert_eq!(container_exit_code(&failure(Some(-1), None)), 1);
        assert_eq!(container_exit_code(&failure(None, None)), ADAPTER_FAILURE_EXIT);
    }

    #[test]
    fn test_run_arguments_become_request() {
        let cli = Cli::try_parse_from([
            "styx-singularity",
            "run",
            "--image",
            "alpine:3.18",
            "--bind",
            "/data:/data:ro",
            "--env",
            "LANG=C",
            "--output",
            "out.txt",
            "--",
            "ls",
            "-la",
            "/data",
        ])
        .unwrap();

        let Commands::Run { request, json } = cli.command else {
            panic!("expected run subcommand");
        };
        assert!(!json);

        let request = request.into_request().unwrap();
        assert_eq!(request.image, "alpine:3.18");
        assert_eq!(request.command(), vec!["ls", "-la", "/data"]);
        assert_eq!(request.mounts[0].access, MountAccess::ReadOnly);
        assert_eq!(request.env.get("LANG").map(String::as_str), Some("C"));
        assert_eq!(request.outputs, vec![OutputFile::new("out.txt", false)]);
        assert_eq!(request.name, DEFAULT_EXECUTION_NAME);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "styx-singularity",
            "command",
            "--image",
            "alpine:3.18",
            "--image-map",
            "alpine:3.18=/images/alpine.sif",
            "--executable",
            "apptainer",
            "echo",
            "hello",
        ])
        .unwrap();

        assert_eq!(cli.image_map, vec!["alpine:3.18=/images/alpine.sif"]);
        assert_eq!(cli.executable.as_deref(), Some("apptainer"));
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["styx-singularity", "run", "--image", "alpine:3.18"]).is_err());
    }
}
