use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use argh::FromArgs;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use potential_swarm::render::{FrameSink, NullSink, PngSink, Scene, with_sink};
use potential_swarm::{Parameters, Result, Simulation, Status};

/// Plan a three-agent formation through moving obstacles on a potential field.
#[derive(FromArgs)]
struct Args {
    /// JSON parameter file; missing keys take their defaults
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// directory to write one PNG per tick into
    #[argh(option, short = 'f')]
    frames: Option<PathBuf>,

    /// write the final snapshot as JSON to this path
    #[argh(option, short = 's')]
    snapshot: Option<PathBuf>,

    /// seed for the random obstacle map
    #[argh(option)]
    seed: Option<u64>,

    /// override the iteration budget
    #[argh(option, short = 'n')]
    max_iterations: Option<usize>,
}

fn load(args: &Args) -> Result<Parameters> {
    let mut params = match &args.config {
        Some(path) => Parameters::from_json_file(path)?,
        None => Parameters::default(),
    };
    if args.seed.is_some() {
        params.seed = args.seed;
    }
    if let Some(n) = args.max_iterations {
        params.max_iterations = n;
    }
    params.validate()?;
    Ok(params)
}

fn simulate<S: FrameSink>(sim: &mut Simulation, sink: &mut S) -> Result<Status> {
    let pbar = ProgressBar::new(sim.params().max_iterations as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}/{eta_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
    ) {
        pbar.set_style(style);
    }
    while !sim.status().is_terminal() {
        sim.tick()?;
        sink.write_frame(&sim.snapshot(true))?;
        pbar.set_position(sim.state().iteration as u64);
        pbar.set_message(format!("{:.2} m to goal", sim.state().distance_to_goal()));
    }
    pbar.finish_with_message(format!("{:?}", sim.status()));
    Ok(sim.status())
}

fn run(args: Args) -> Result<Status> {
    let params = load(&args)?;
    let scene = Scene::from(&params);
    let mut sim = Simulation::new(params)?;

    let (status, frames) = match &args.frames {
        Some(dir) => with_sink(PngSink::create(dir, scene)?, |sink| simulate(&mut sim, sink))?,
        None => with_sink(NullSink::default(), |sink| simulate(&mut sim, sink))?,
    };
    info!(?status, frames, iterations = sim.state().iteration, "run complete");

    if let Some(path) = &args.snapshot {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &sim.snapshot(false))?;
        info!("snapshot written to {}", path.display());
    }
    Ok(status)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Args = argh::from_env();
    match run(args) {
        Ok(status) if status.is_success() => {
            println!("Reached the goal");
            ExitCode::SUCCESS
        }
        Ok(status) => {
            println!("Finished without reaching the goal: {status:?}");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
