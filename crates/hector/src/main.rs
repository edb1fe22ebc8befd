//! Hector - Mission autopilot for a small multirotor

use clap::{Parser, Subcommand};
use hector_sim::{fly, PlantParams, RunFlag, SimParams};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "hector")]
#[command(about = "Mission autopilot: pursue a ground target, reach the goal, land")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CLI batch/single simulation mode
    Cli {
        /// Pass remaining arguments to hector-cli
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Launch web GUI
    Gui {
        /// Port to bind to
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Host to bind to
        #[arg(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
    },
    /// Fly one mission in real time against the simulated vehicle
    Fly {
        /// JSON parameter file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Space/comma separated x,y pairs; the last pair is the goal
        #[arg(long, allow_hyphen_values = true)]
        goals: Option<String>,

        /// Give up after this many seconds
        #[arg(long, default_value_t = hector_sim::sim::MAX_TIME)]
        max_time: f64,

        /// Log the mission state every tick
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Cli { args }) => {
            // Pass through to hector-cli
            let cli_args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
            run_cli(&cli_args)
        }
        Some(Commands::Gui { port, host }) => run_gui(port, &host),
        Some(Commands::Fly {
            config,
            goals,
            max_time,
            verbose,
        }) => run_fly(config, goals, max_time, verbose),
        None => {
            // Default to GUI mode
            run_gui(8080, "0.0.0.0")
        }
    }
}

fn run_cli(args: &[&str]) -> anyhow::Result<()> {
    let mut full_args = vec!["hector-cli"];
    full_args.extend(args);

    match hector_cli::run_cli_main(&full_args) {
        Ok(_) => Ok(()),
        Err(e) => {
            eprintln!("CLI error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run_gui(port: u16, host: &str) -> anyhow::Result<()> {
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio::runtime::Runtime;
    let rt = Runtime::new()?;
    rt.block_on(async {
        let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
        let app = hector_gui::create_router();
        println!("listening on http://{}", addr);
        tracing::info!("GUI server started on {}", addr);
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    })
}

fn run_fly(
    config: Option<PathBuf>,
    goals: Option<String>,
    max_time: f64,
    verbose: bool,
) -> anyhow::Result<()> {
    let mut mission = match &config {
        Some(path) => hector_cli::load_mission_params(path)?,
        None => Default::default(),
    };
    if goals.is_some() {
        mission.goals = goals;
    }
    mission.verbose |= verbose;

    let params = SimParams {
        mission,
        plant: PlantParams::default(),
        max_time,
    };

    let flag = RunFlag::new();
    let summary = fly(&params, &flag)?;
    println!(
        "{} after {:.2} s ({} ticks, {} idle), final state {}",
        if summary.completed { "Landed" } else { "Stopped" },
        summary.flight_time,
        summary.run.ticks,
        summary.run.idle_ticks,
        summary.run.final_state.label()
    );
    Ok(())
}
