use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use inspection_engine::config::PolicyConfig;
use inspection_engine::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Inspection Engine",
    about = "Serve and demonstrate the equipment inspection readings engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk one battery string through configure, record, and save
    Demo(DemoArgs),
    /// Inspect the threshold and lifetime policy table
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Print the effective policy table as JSON
    Show(PolicyArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct PolicyArgs {
    /// JSON policy table to use instead of APP_POLICY_TABLE or the built-in table
    #[arg(long)]
    pub(crate) policy_table: Option<PathBuf>,
}

impl PolicyArgs {
    /// Applies the flag over the environment-provided policy settings.
    pub(crate) fn resolve(&self, mut config: PolicyConfig) -> PolicyConfig {
        if let Some(path) = &self.policy_table {
            config.table_path = Some(path.clone());
        }
        config
    }
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    #[command(flatten)]
    pub(crate) policy: PolicyArgs,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Policy {
            command: PolicyCommand::Show(args),
        } => show_policy(args),
    }
}

fn show_policy(args: PolicyArgs) -> Result<(), AppError> {
    let config = inspection_engine::config::AppConfig::load()?;
    let table = args.resolve(config.policy).load_table()?;
    let stdout = std::io::stdout();
    serde_json::to_writer_pretty(stdout.lock(), &table).map_err(std::io::Error::from)?;
    println!();
    Ok(())
}
