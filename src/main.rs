use anyhow::Result;
use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use route_sim::simulation::{generate_map, MapProfile, SimConfig, SimWorld};

#[derive(Parser)]
#[command(name = "route_sim")]
#[command(about = "Microscopic route traffic simulation")]
struct Cli {
    /// Number of simulation ticks to run
    #[arg(long, default_value = "1000")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.1")]
    delta: f64,

    /// Seed of the random generator shared by map and traffic generation
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Rows of the generated intersection grid
    #[arg(long, default_value = "3")]
    rows: usize,

    /// Columns of the generated intersection grid
    #[arg(long, default_value = "3")]
    cols: usize,

    /// Distance between neighbouring intersections in meters
    #[arg(long, default_value = "200")]
    spacing: f64,

    /// Vehicles per second per site
    #[arg(long, default_value = "1.0")]
    frequency: f64,

    /// Send every vehicle back to its departure site
    #[arg(long)]
    round_trip: bool,

    /// Simulated seconds between summaries
    #[arg(long, default_value = "10")]
    summary_every: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    run_headless(&cli)
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(cli: &Cli) -> Result<()> {
    info!("Running route simulation in headless mode...");
    info!("Ticks: {}, Delta: {}s, Seed: {}", cli.ticks, cli.delta, cli.seed);

    let mut rng = StdRng::seed_from_u64(cli.seed);
    let config = SimConfig {
        frequency: cli.frequency,
        round_trip: cli.round_trip,
        ..SimConfig::default()
    };
    let mut world = SimWorld::with_config(config);
    let profile = MapProfile {
        rows: cli.rows,
        cols: cli.cols,
        spacing: cli.spacing,
        ..MapProfile::default()
    };
    generate_map(&mut world, &profile, &mut rng)?;

    info!("Initial state:");
    world.print_summary();

    // How many ticks make up one summary interval
    let ticks_per_summary = ((cli.summary_every / cli.delta).ceil() as u32).max(1);

    for tick in 1..=cli.ticks {
        let report = world.tick(cli.delta, &mut rng)?;
        for trip in &report.completed {
            log::debug!(
                "Vehicle {:?} arrived after {:.2}s (delay {:.2}s)",
                trip.vehicle,
                trip.traveling_time,
                trip.delay
            );
        }

        if tick % ticks_per_summary == 0 {
            info!(
                "--- After tick {} ({:.1}s simulated time) ---",
                tick,
                tick as f64 * cli.delta
            );
            world.print_summary();
        }
    }

    let stats = &world.stats;
    info!("=== SIMULATION COMPLETE ===");
    info!("Elapsed time: {:.2}s", stats.elapsed_time);
    info!("Total vehicles spawned: {}", stats.vehicles_spawned);
    info!("Total vehicles arrived: {}", stats.vehicles_arrived);
    info!("Unreachable vehicles: {}", stats.vehicles_unreachable);
    info!("Dropped arrivals: {}", stats.arrivals_dropped);
    info!("Active vehicles: {}", world.vehicles.len());
    info!("Total nodes: {}", world.road_network.node_count());
    info!("Total edges: {}", world.road_network.edge_count());
    info!("Average trip delay: {:.2}s", stats.average_trip_delay());
    info!("Success rate: {:.1}%", stats.success_rate());
    Ok(())
}
