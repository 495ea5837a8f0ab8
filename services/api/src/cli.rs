use crate::commands::{
    run_address_normalize, run_assessment_command, run_simulation, run_zoning_lookup,
    AddressArgs, AssessArgs, SimulateArgs, ZoningLookupArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use minpaku_feasibility::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Minpaku Feasibility",
    about = "Assess whether a property can legally and profitably operate as a minpaku",
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
    /// Run the full assessment for a flyer image, flyer text or address
    Assess(AssessArgs),
    /// Print the occupancy-rate profit simulation for a set of costs
    Simulate(SimulateArgs),
    /// Inspect the local zoning datasets
    Zoning {
        #[command(subcommand)]
        command: ZoningCommand,
    },
    /// Address utilities
    Address {
        #[command(subcommand)]
        command: AddressCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ZoningCommand {
    /// Find the zoning classification containing a coordinate
    Lookup(ZoningLookupArgs),
}

#[derive(Subcommand, Debug)]
enum AddressCommand {
    /// Show the block, city and wide-area search forms of an address
    Normalize(AddressArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Assess(args) => run_assessment_command(args).await,
        Command::Simulate(args) => run_simulation(args),
        Command::Zoning {
            command: ZoningCommand::Lookup(args),
        } => run_zoning_lookup(args),
        Command::Address {
            command: AddressCommand::Normalize(args),
        } => run_address_normalize(args),
    }
}
