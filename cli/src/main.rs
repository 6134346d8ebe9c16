mod dispatch;
mod envelope;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use ryvie_core::Config;
use ryvie_platform::PlatformTopology;
use std::path::PathBuf;

const CONFIG_ENV: &str = "RYVIE_STORAGE_CONFIG";
const LOG_ENV: &str = "RYVIE_STORAGE_LOG";

#[derive(Parser)]
#[command(name = "ryvie-storage")]
#[command(about = "Disk inventory and redundancy proposals for a home NAS", long_about = None)]
#[command(after_help = "Commands: scan, proposal, preflight, status, create, partition, mdadm, persist, lvm, format, mount, subvolumes")]
struct Cli {
    /// Command to run
    command: Option<String>,

    /// Command arguments as a JSON object
    #[arg(long, default_value = "{}", allow_hyphen_values = true)]
    json: String,

    /// Configuration file (JSON); falls back to $RYVIE_STORAGE_CONFIG
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
    }
}

/// Outcome of reading the command line.
enum Invocation {
    Run(Cli),
    /// Arguments did not parse but a command was named; it still gets an
    /// envelope and a zero exit.
    Rejected { command: String, message: String },
    /// Help, version, or a usage error with no command to report against.
    Exit(clap::Error),
}

fn parse_invocation(args: &[String]) -> Invocation {
    match Cli::try_parse_from(args) {
        Ok(cli) => Invocation::Run(cli),
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp
                    | ErrorKind::DisplayVersion
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) =>
        {
            Invocation::Exit(err)
        }
        Err(err) => match command_name(args) {
            Some(command) => Invocation::Rejected {
                command,
                message: error_message(&err),
            },
            None => Invocation::Exit(err),
        },
    }
}

/// First positional argument, skipping the values of options that take one.
fn command_name(args: &[String]) -> Option<String> {
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--" => return rest.next().cloned(),
            "--json" | "--config" => {
                rest.next();
            }
            flag if flag.starts_with('-') => {}
            command => return Some(command.to_string()),
        }
    }
    None
}

fn error_message(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    let first = rendered.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
    first.strip_prefix("error: ").unwrap_or(first).to_string()
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, default));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            log::debug!("loading config from {}", path.display());
            Config::load(&path).with_context(|| format!("failed to load config {}", path.display()))
        }
        None => Ok(Config::default()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args_os()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

    let cli = match parse_invocation(&args) {
        Invocation::Run(cli) => cli,
        Invocation::Rejected { command, message } => {
            init_logging(args.iter().any(|a| a == "-v" || a == "--verbose"));
            dispatch::reject(&command, &message)
                .emit(std::io::stdout().lock())
                .context("failed to write result")?;
            return Ok(());
        }
        Invocation::Exit(err) => err.exit(),
    };
    init_logging(cli.verbose);

    let Some(command) = cli.command.as_deref() else {
        eprintln!("{}", Cli::command().render_help());
        std::process::exit(2);
    };

    let config = load_config(cli.config_path())?;
    let source = PlatformTopology::new(config.topology.clone());

    let envelope = dispatch::run(command, &cli.json, &source, &config).await;
    envelope
        .emit(std::io::stdout().lock())
        .context("failed to write result")?;
    Ok(())
}
