//! omlink CLI - evaluate expressions in an engine session, run compiled models

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use omlink_core::application::{OmcSession, SessionConfig};
use omlink_core::domain::{
    ArgInput, DockerNetwork, Endpoint, ExecutionEnvironment, ExecutionTarget, ModelExecution,
    Response, OVERRIDE_KEY,
};
use omlink_core::port::{EngineHost, SystemTimeProvider, UuidProvider};
use omlink_infra_system::{SubprocessRunner, SystemEngineHost};
use omlink_infra_zmq::ZmqChannel;

#[derive(Parser)]
#[command(name = "omlink")]
#[command(about = "OpenModelica engine client", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Budget in seconds for engine start, discovery and each request
    #[arg(long, env = "OMLINK_TIMEOUT", default_value = "10")]
    timeout: f64,

    /// Engine installation directory
    #[arg(long, env = "OPENMODELICAHOME")]
    omhome: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start (or attach to) an engine and evaluate expressions in order
    Eval(EvalArgs),

    /// Run a compiled model executable
    Run(RunArgs),
}

#[derive(Args)]
struct EvalArgs {
    /// Expressions, e.g. 'loadModel(Modelica)'
    #[arg(required = true)]
    expressions: Vec<String>,

    /// Connect to a running engine instead of starting one
    #[arg(long, conflicts_with_all = ["docker_image", "docker_container", "wsl"])]
    attach: Option<String>,

    /// With --attach: ask the engine to exit when done
    #[arg(long, requires = "attach")]
    stop_engine: bool,

    #[command(flatten)]
    environment: EnvironmentArgs,

    /// Fixed engine port
    #[arg(long)]
    port: Option<u16>,

    /// Read-only session (replies may be cached)
    #[arg(long)]
    readonly: bool,

    /// Print replies without decoding them
    #[arg(long)]
    raw: bool,
}

#[derive(Args)]
struct RunArgs {
    /// Directory containing the executable
    #[arg(long)]
    workdir: String,

    /// Model name (the executable's file name)
    #[arg(long)]
    model: String,

    /// Executable argument as key or key=value (repeatable)
    #[arg(long = "arg")]
    args: Vec<String>,

    /// Variable overrides, e.g. 'stopTime=2,solver=dassl'
    #[arg(long = "override")]
    overrides: Option<String>,

    /// Run inside this running container
    #[arg(long)]
    docker_container: Option<String>,

    /// Hard timeout of the run in seconds
    #[arg(long, default_value = "10")]
    run_timeout: f64,

    /// Print the command line instead of running it
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct EnvironmentArgs {
    /// Start the engine in a new container from this image
    #[arg(long, conflicts_with_all = ["docker_container", "wsl"])]
    docker_image: Option<String>,

    /// Start the engine inside this running container
    #[arg(long, conflicts_with = "wsl")]
    docker_container: Option<String>,

    /// Network of a new container: host or separate
    #[arg(long, default_value = "host")]
    docker_network: String,

    /// Start the engine through wsl
    #[arg(long)]
    wsl: bool,

    /// wsl distribution
    #[arg(long, requires = "wsl")]
    wsl_distribution: Option<String>,
}

impl EnvironmentArgs {
    fn environment(&self) -> Result<ExecutionEnvironment> {
        if let Some(image) = &self.docker_image {
            let network: DockerNetwork = self.docker_network.parse()?;
            let mut environment = ExecutionEnvironment::docker_run(image);
            if let ExecutionEnvironment::DockerRun { network: n, .. } = &mut environment {
                *n = network;
            }
            return Ok(environment);
        }
        if let Some(container) = &self.docker_container {
            return Ok(ExecutionEnvironment::docker_exec(container));
        }
        if self.wsl {
            return Ok(ExecutionEnvironment::remote_shell(
                self.wsl_distribution.clone(),
                None,
            ));
        }
        Ok(ExecutionEnvironment::Local)
    }
}

fn init_tracing() {
    // Logs go to stderr so replies on stdout stay clean
    let log_format = std::env::var("OMLINK_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("omlink=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn seconds(value: f64, what: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("Invalid {}: {}", what, value))
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn print_response(expression: &str, response: &Response) -> Result<()> {
    println!("{} {}", ">>".cyan().bold(), expression);
    match response {
        Response::Value(value) => println!("{}", serde_json::to_string_pretty(value)?),
        Response::Raw(raw) => println!("{}", raw.trim_end().yellow()),
    }
    Ok(())
}

async fn eval(timeout: Duration, omhome: Option<PathBuf>, args: EvalArgs) -> Result<()> {
    let mut config = SessionConfig::default()
        .with_timeout(timeout)
        .with_readonly(args.readonly)
        .with_environment(args.environment.environment()?);
    if let Some(port) = args.port {
        config = config.with_interactive_port(port);
    }

    let host: Arc<dyn EngineHost> = Arc::new(SystemEngineHost::new(omhome));
    let channel = Box::new(ZmqChannel::new().with_send_timeout(timeout));

    let mut session = match args.attach {
        Some(endpoint) => OmcSession::attach(config, host, channel, Endpoint::new(endpoint))
            .await
            .context("Failed to attach to engine")?
            .quit_on_close(args.stop_engine),
        None => OmcSession::start(config, host, channel, &UuidProvider)
            .await
            .context("Failed to start engine")?,
    };
    info!(token = %session.token(), "Session ready");

    let mut outcome = Ok(());
    for expression in &args.expressions {
        match session.send_expression(expression, !args.raw).await {
            Ok(response) => {
                if let Err(e) = print_response(expression, &response) {
                    outcome = Err(e);
                    break;
                }
            }
            Err(e) => {
                outcome = Err(anyhow::Error::new(e)
                    .context(format!("Failed to evaluate {}", expression)));
                break;
            }
        }
    }

    session.close().await;
    outcome
}

async fn run(omhome: Option<PathBuf>, args: RunArgs) -> Result<()> {
    let workdir = expand(&args.workdir);
    let run_timeout = seconds(args.run_timeout, "run timeout")?;
    let model = args.model;

    let target = match &args.docker_container {
        Some(container) => {
            let host = SystemEngineHost::new(omhome);
            ExecutionTarget {
                prefix: ExecutionEnvironment::docker_exec(container).execution_prefix(
                    &workdir.to_string_lossy(),
                    Some(container),
                    host.identity().uid,
                ),
                local: false,
                windows: false,
            }
        }
        None => ExecutionTarget::local(),
    };

    let mut execution = ModelExecution::new(&workdir, &model, target)?.with_timeout(run_timeout);
    for arg in &args.args {
        match arg.split_once('=') {
            Some((key, value)) => execution.arg_set(key, value)?,
            None => execution.arg_set(arg, ArgInput::Flag)?,
        }
    }
    if let Some(overrides) = args.overrides {
        execution.arg_set(OVERRIDE_KEY, overrides)?;
    }

    let descriptor = execution.definition()?;
    if args.dry_run {
        println!("{}", descriptor.command().join(" "));
        return Ok(());
    }

    let runner = SubprocessRunner::new(Arc::new(SystemTimeProvider));
    let exit_code = descriptor
        .run(&runner)
        .await
        .with_context(|| format!("Model {} failed", model))?;

    println!(
        "{}",
        format!("✓ {} finished with exit code {}", model, exit_code)
            .green()
            .bold()
    );
    println!("Result file: {}", descriptor.result_file);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let timeout = seconds(cli.timeout, "timeout")?;
    let omhome = cli.omhome.as_deref().map(expand);

    match cli.command {
        Commands::Eval(args) => eval(timeout, omhome, args).await,
        Commands::Run(args) => run(omhome, args).await,
    }
}
