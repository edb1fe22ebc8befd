use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use hector_core::{MissionParams, MissionState, ReturnCondition, Sampling};
use hector_sim::{run_mission, PlantParams, SimParams, SimResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Public function that can be called from the main binary
pub fn run_cli_main(args: &[&str]) -> Result<()> {
    let args = Args::parse_from(args);
    main_inner(args)
}

#[derive(Parser, Debug)]
#[command(name = "hector-cli")]
#[command(about = "Simulated hector missions: pursue a ground target, reach the goal, land")]
#[command(version)]
pub struct Args {
    /// Output directory
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Output file format
    #[arg(short, long, value_enum, default_value = "csv")]
    format: OutputFormat,

    /// Run a single simulation
    #[arg(long)]
    single: bool,

    /// JSON parameter file; command line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    // ── Mission parameters ────────────────────────────────────
    #[arg(long)]
    cruise_height: Option<f64>,

    #[arg(long)]
    height_tolerance: Option<f64>,

    #[arg(long)]
    look_ahead: Option<f64>,

    #[arg(long, value_enum)]
    sampling: Option<SamplingArg>,

    #[arg(long)]
    close_enough: Option<f64>,

    #[arg(long)]
    average_speed: Option<f64>,

    #[arg(long)]
    initial_x: Option<f64>,

    #[arg(long)]
    initial_y: Option<f64>,

    #[arg(long)]
    initial_z: Option<f64>,

    /// Space/comma separated x,y pairs; the last pair is the goal
    #[arg(long, allow_hyphen_values = true)]
    goals: Option<String>,

    #[arg(long)]
    tick_rate_hz: Option<f64>,

    #[arg(long, value_enum)]
    return_condition: Option<ReturnArg>,

    /// Log the mission state every tick
    #[arg(short, long)]
    verbose: bool,

    // ── Plant options ─────────────────────────────────────────
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 1.0)]
    noise_scale: f64,

    #[arg(long, default_value_t = 0.22)]
    target_speed: f64,

    #[arg(long, default_value_t = 0.2)]
    estimator_delay: f64,

    #[arg(long, default_value_t = hector_sim::sim::MAX_TIME)]
    max_time: f64,

    // ── Sweep options ──────────────────────────────────────────
    /// Number of average-speed values to sweep
    #[arg(long, default_value_t = 5)]
    sweep_steps: usize,

    #[arg(long, default_value_t = 0.5)]
    sweep_min_speed: f64,

    #[arg(long, default_value_t = 3.0)]
    sweep_max_speed: f64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SamplingArg {
    Time,
    ArcLength,
}

impl From<SamplingArg> for Sampling {
    fn from(arg: SamplingArg) -> Self {
        match arg {
            SamplingArg::Time => Sampling::Time,
            SamplingArg::ArcLength => Sampling::ArcLength,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReturnArg {
    MissionSignal,
    ReachedHome,
    Either,
}

impl From<ReturnArg> for ReturnCondition {
    fn from(arg: ReturnArg) -> Self {
        match arg {
            ReturnArg::MissionSignal => ReturnCondition::MissionSignal,
            ReturnArg::ReachedHome => ReturnCondition::ReachedHome,
            ReturnArg::Either => ReturnCondition::Either,
        }
    }
}

fn main_inner(args: Args) -> Result<()> {
    println!("Hector Mission Simulator");
    println!("========================\n");

    let params = build_sim_params(&args)?;
    if args.single {
        run_single(&args, &params)?;
    } else {
        run_sweep(&args, &params)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Single Run
// ---------------------------------------------------------------------------
fn run_single(args: &Args, params: &SimParams) -> Result<()> {
    println!("Running single mission...");

    let result = run_mission(params).context("mission setup failed")?;
    print_sim_stats(&result);
    write_output(args, &result)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Sweep Run
// ---------------------------------------------------------------------------
#[derive(Debug, Serialize)]
struct SweepRow {
    average_speed: f64,
    completed: bool,
    idle_ticks: u64,
    pursuit_time: f64, // takeoff complete -> target reached
    mission_time: f64, // start -> landed, or the whole run if it never landed
}

fn run_sweep(args: &Args, base: &SimParams) -> Result<()> {
    let steps = args.sweep_steps;
    if steps < 2 {
        bail!("--sweep-steps must be at least 2, got {}", steps);
    }
    println!(
        "Sweeping average_speed {:.2}..{:.2} m/s in {} steps",
        args.sweep_min_speed, args.sweep_max_speed, steps
    );

    let mut rows = Vec::with_capacity(steps);
    for i in 0..steps {
        let speed = args.sweep_min_speed
            + (args.sweep_max_speed - args.sweep_min_speed) * (i as f64 / (steps - 1) as f64);

        let mut params = base.clone();
        params.mission.average_speed = speed;
        let res = run_mission(&params)
            .with_context(|| format!("run {} (average_speed {:.2})", i + 1, speed))?;

        let end = res.time.last().copied().unwrap_or(0.0);
        let pursuit_time = match (
            res.entered_at(MissionState::PursueTarget),
            res.entered_at(MissionState::PursueGoal),
        ) {
            (Some(a), Some(b)) => b - a,
            _ => f64::NAN,
        };

        println!(
            "Run {}/{} | Speed: {:.2} m/s -> {} in {:.2} s",
            i + 1,
            steps,
            speed,
            if res.completed { "landed" } else { "timed out" },
            end
        );

        rows.push(SweepRow {
            average_speed: speed,
            completed: res.completed,
            idle_ticks: res.idle_ticks,
            pursuit_time,
            mission_time: end,
        });
    }

    std::fs::create_dir_all(&args.output_dir)?;
    let path = match args.format {
        OutputFormat::Csv => {
            let path = args.output_dir.join("sweep_summary.csv");
            let mut wtr = csv::Writer::from_path(&path)?;
            for row in &rows {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
            path
        }
        OutputFormat::Json => {
            let path = args.output_dir.join("sweep_summary.json");
            write_json(&path, &rows)?;
            path
        }
    };

    println!("\nSweep complete. Summary at {:?}", path);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_sim_params(args: &Args) -> Result<SimParams> {
    let mut mission = match &args.config {
        Some(path) => load_mission_params(path)?,
        None => MissionParams::default(),
    };

    let overrides = [
        (&mut mission.cruise_height, args.cruise_height),
        (&mut mission.height_tolerance, args.height_tolerance),
        (&mut mission.look_ahead, args.look_ahead),
        (&mut mission.close_enough, args.close_enough),
        (&mut mission.average_speed, args.average_speed),
        (&mut mission.initial_x, args.initial_x),
        (&mut mission.initial_y, args.initial_y),
        (&mut mission.initial_z, args.initial_z),
        (&mut mission.tick_rate_hz, args.tick_rate_hz),
    ];
    for (slot, value) in overrides {
        if let Some(v) = value {
            *slot = v;
        }
    }
    if let Some(s) = args.sampling {
        mission.sampling = s.into();
    }
    if let Some(r) = args.return_condition {
        mission.return_condition = r.into();
    }
    if args.goals.is_some() {
        mission.goals = args.goals.clone();
    }
    mission.verbose |= args.verbose;

    // Map scalar "noise_scale" to the individual estimator sigmas
    let s = args.noise_scale;
    let defaults = PlantParams::default();
    let plant = PlantParams {
        target_speed: args.target_speed,
        estimator_delay: args.estimator_delay,
        pose_noise_std: defaults.pose_noise_std * s,
        velocity_noise_std: defaults.velocity_noise_std * s,
        seed: args.seed,
        ..defaults
    };

    Ok(SimParams {
        mission,
        plant,
        max_time: args.max_time,
    })
}

/// Read a JSON parameter file. Keys it leaves out fall back to their
/// defaults, with a warning for each.
pub fn load_mission_params(path: &Path) -> Result<MissionParams> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading parameter file {:?}", path))?;
    parse_mission_params(&text).with_context(|| format!("parsing parameter file {:?}", path))
}

fn parse_mission_params(text: &str) -> Result<MissionParams> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let Some(object) = value.as_object() else {
        bail!("expected a JSON object of parameters");
    };

    for key in MissionParams::KEYS {
        // `goals` has its own warning once the goal is resolved.
        if key != "goals" && !object.contains_key(key) {
            tracing::warn!("Param {} not found, using default", key);
        }
    }
    for key in object.keys() {
        if !MissionParams::KEYS.contains(&key.as_str()) {
            tracing::warn!("Unknown param {} ignored", key);
        }
    }

    Ok(serde_json::from_value(value)?)
}

fn print_sim_stats(result: &SimResult) {
    let flight_time = result.time.last().copied().unwrap_or(0.0);

    println!("\nMission Stats:");
    println!("  Ticks:       {}", result.len());
    println!("  Idle Ticks:  {}", result.idle_ticks);
    println!("  Flight Time: {:.2} s", flight_time);
    println!("  Goal:        ({:.2}, {:.2})", result.goal.x, result.goal.y);
    println!(
        "  Outcome:     {}",
        if result.completed { "landed" } else { "timed out" }
    );
    for (state, t) in &result.transitions {
        println!("  {:<14} {:>7.2} s", state.label(), t);
    }
    println!("-----------------------------");
}

fn write_output(args: &Args, sim: &SimResult) -> Result<()> {
    std::fs::create_dir_all(&args.output_dir)?;

    let path = match args.format {
        OutputFormat::Json => {
            let path = args.output_dir.join("simulation.json");
            write_json(&path, sim)?;
            path
        }
        OutputFormat::Csv => {
            let path = args.output_dir.join("simulation.csv");
            write_csv(&path, sim)?;
            path
        }
    };

    println!("Data written to {:?}", path);
    Ok(())
}

fn write_csv(path: &Path, sim: &SimResult) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "time",
        "pos_x",
        "pos_y",
        "pos_z",
        "vel_x",
        "vel_y",
        "vel_z",
        "heading",
        "target_x",
        "target_y",
        "state",
        "rotate",
        "waypoints",
    ])?;

    for i in 0..sim.len() {
        let p = sim.position[i];
        let v = sim.velocity[i];
        let tgt = sim.target[i];

        wtr.write_record(&[
            format!("{:.4}", sim.time[i]),
            format!("{:.4}", p.x),
            format!("{:.4}", p.y),
            format!("{:.4}", p.z),
            format!("{:.4}", v.x),
            format!("{:.4}", v.y),
            format!("{:.4}", v.z),
            format!("{:.4}", sim.heading[i]),
            format!("{:.4}", tgt.x),
            format!("{:.4}", tgt.y),
            sim.state[i].label().to_string(),
            sim.rotate[i].to_string(),
            sim.waypoints[i].to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("creating {:?}", path))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hector-cli-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "hector-cli",
            "--average-speed",
            "1.5",
            "--goals",
            "-1,2 3,4",
            "--sampling",
            "arc-length",
            "--return-condition",
            "either",
            "--noise-scale",
            "0",
        ]);
        let p = build_sim_params(&args).unwrap();
        assert_eq!(p.mission.average_speed, 1.5);
        assert_eq!(p.mission.cruise_height, 2.0);
        assert_eq!(p.mission.goals.as_deref(), Some("-1,2 3,4"));
        assert_eq!(p.mission.sampling, Sampling::ArcLength);
        assert_eq!(p.mission.return_condition, ReturnCondition::Either);
        assert_eq!(p.plant.pose_noise_std, 0.0);
    }

    #[test]
    fn test_parse_partial_params() {
        let p = parse_mission_params(r#"{ "cruise_height": 3.0, "goals": "1,1" }"#).unwrap();
        assert_eq!(p.cruise_height, 3.0);
        assert_eq!(p.average_speed, 2.0);
        assert_eq!(p.goals.as_deref(), Some("1,1"));
        assert!(parse_mission_params("[1, 2]").is_err());
    }

    #[test]
    fn test_single_run_writes_csv() {
        let dir = scratch_dir("single");
        let out = dir.to_string_lossy().to_string();
        run_cli_main(&["hector-cli", "--single", "--goals", "3,0 3,3", "-o", &out]).unwrap();

        let mut rdr = csv::Reader::from_path(dir.join("simulation.csv")).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(&headers[0], "time");
        assert_eq!(&headers[10], "state");
        let rows: Vec<_> = rdr.records().map(|r| r.unwrap()).collect();
        assert!(!rows.is_empty());
        assert_eq!(&rows.last().unwrap()[10], "LAND");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_sweep_writes_summary() {
        let dir = scratch_dir("sweep");
        let out = dir.to_string_lossy().to_string();
        run_cli_main(&[
            "hector-cli",
            "--goals",
            "3,0 3,3",
            "--sweep-steps",
            "2",
            "--format",
            "json",
            "-o",
            &out,
        ])
        .unwrap();

        let text = std::fs::read_to_string(dir.join("sweep_summary.json")).unwrap();
        let rows: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 2);
        assert_eq!(rows[1]["average_speed"], 3.0);
        assert_eq!(rows[1]["completed"], true);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bad_goals_is_an_error() {
        let dir = scratch_dir("bad");
        let out = dir.to_string_lossy().to_string();
        let err = run_cli_main(&["hector-cli", "--single", "--goals", "bad", "-o", &out]);
        assert!(err.is_err());
    }
}
