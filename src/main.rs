use anyhow::Result;
use clap::Parser;

use smart_traffic::simulation::{shortest_dist, RoutingMode, SimWorld};

#[derive(Parser)]
#[command(name = "smart_traffic")]
#[command(about = "Adaptive-routing traffic simulation, headless")]
struct Cli {
    /// Number of simulation ticks to run
    #[arg(long, default_value = "3000")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.1")]
    delta: f64,

    /// RNG seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Route on static road lengths only, ignoring congestion
    #[arg(long)]
    static_routing: bool,

    /// Per-tick probability of spawning a batch of vehicles
    #[arg(long, default_value = "0.3")]
    spawn_probability: f64,

    /// Simulated seconds between progress summaries
    #[arg(long, default_value = "30.0")]
    summary_interval: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut world = match cli.seed {
        Some(seed) => SimWorld::demo_with_seed(seed),
        None => SimWorld::demo(),
    };
    world.tuning.spawn_probability = cli.spawn_probability;
    if cli.static_routing {
        world.tuning.routing_mode = RoutingMode::Static;
    }

    println!(
        "Running {} ticks at dt={}s ({} routing)...",
        cli.ticks,
        cli.delta,
        if cli.static_routing {
            "static"
        } else {
            "adaptive"
        }
    );
    println!();

    let mut next_summary = cli.summary_interval;
    for _ in 0..cli.ticks {
        world.tick(cli.delta);
        if world.clock() >= next_summary {
            world.print_summary();
            println!();
            next_summary += cli.summary_interval;
        }
    }

    println!("=== Final State ===");
    world.print_summary();
    print_pair_breakdown(&world);

    Ok(())
}

/// Prints mean travel times for major-tier pairs next to the static shortest
/// distance between them, the baseline the adaptive router competes against.
fn print_pair_breakdown(world: &SimWorld) {
    let mut pairs: Vec<_> = world.stats.pair_averages().collect();
    if pairs.is_empty() {
        return;
    }
    pairs.sort_by_key(|((origin, destination), _, _)| (*origin, *destination));

    println!();
    println!("--- Major pairs ---");
    for ((origin, destination), avg_time, count) in pairs {
        let distance = shortest_dist(&world.network, origin, destination);
        println!(
            "  {} -> {}: avg {:.1}s over {} trips (shortest dist {:.0})",
            world.network.intersection(origin).name,
            world.network.intersection(destination).name,
            avg_time,
            count,
            distance
        );
    }
}
