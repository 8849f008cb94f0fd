//! Estimates the top event of a small pump-system fault tree.
//!
//! Run with:
//! ```bash
//! cargo run --release --example fault_tree -- --prng philox4x64 --target 1e-4
//! ```
use bitmc::{Checkpoint, Connective, Edge, MonteCarlo, NodeIndex, Pdag, Prng, Seed, Settings};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(about = "Bitpacked Monte Carlo on a pump-system fault tree")]
struct Cli {
    /// Random number engine, mt19937_64 or philox4x64.
    #[arg(long, default_value = "mt19937_64")]
    prng: Prng,

    #[arg(long)]
    seed: Option<u64>,

    /// Target standard error of the top event; 0 runs to the iteration cap.
    #[arg(long, default_value_t = 0.0)]
    target: f64,

    #[arg(long, default_value_t = 1000)]
    max_iterations: u64,

    /// Wall-clock limit in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Resume from and save to this checkpoint file.
    #[arg(long)]
    checkpoint: Option<PathBuf>,
}

/// Two redundant pump trains, each failing on the pump or either of its valves; a shared power
/// supply; and a 2-out-of-3 sensor vote that trips the system when the house event `test_mode` is off.
fn pump_system() -> bitmc::Result<(Pdag, NodeIndex, NodeIndex)> {
    let mut pdag = Pdag::new();
    let mut next = 0;
    let mut basic = |pdag: &mut Pdag, p: f64| {
        next += 1;
        pdag.add_basic_event(NodeIndex(next), p)
    };
    let pump_a = basic(&mut pdag, 3e-3)?;
    let valve_a1 = basic(&mut pdag, 1e-3)?;
    let valve_a2 = basic(&mut pdag, 1e-3)?;
    let pump_b = basic(&mut pdag, 3e-3)?;
    let valve_b1 = basic(&mut pdag, 1e-3)?;
    let valve_b2 = basic(&mut pdag, 1e-3)?;
    let power = basic(&mut pdag, 2e-4)?;
    let sensors = [basic(&mut pdag, 2e-2)?, basic(&mut pdag, 2e-2)?, basic(&mut pdag, 2e-2)?];
    let test_mode = pdag.add_house_event(NodeIndex(100), false)?;

    let train_a = pdag.add_gate(
        NodeIndex(200),
        Connective::Or,
        vec![Edge::pos(pump_a), Edge::pos(valve_a1), Edge::pos(valve_a2)],
    )?;
    let train_b = pdag.add_gate(
        NodeIndex(201),
        Connective::Or,
        vec![Edge::pos(pump_b), Edge::pos(valve_b1), Edge::pos(valve_b2)],
    )?;
    let no_flow = pdag.add_gate(NodeIndex(202), Connective::And, vec![Edge::pos(train_a), Edge::pos(train_b)])?;
    let vote = pdag.add_gate(NodeIndex(203), Connective::AtLeast(2), sensors.iter().map(|&s| Edge::pos(s)))?;
    let spurious_trip = pdag.add_gate(NodeIndex(204), Connective::And, vec![Edge::pos(vote), Edge::neg(test_mode)])?;
    let top = pdag.add_gate(
        NodeIndex(300),
        Connective::Or,
        vec![Edge::pos(no_flow), Edge::pos(power), Edge::pos(spurious_trip)],
    )?;
    pdag.set_root(top);
    Ok((pdag, no_flow, vote))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;
    let cli = Cli::parse();

    let (pdag, no_flow, vote) = pump_system()?;
    let mut settings = Settings::default()
        .with_prng(cli.prng)
        .with_target_std_err(cli.target)
        .with_max_iterations(Some(cli.max_iterations))
        .with_observed(vec![no_flow, vote]);
    if let Some(seed) = cli.seed {
        settings = settings.with_seed(Seed::Fixed(seed));
    }
    if let Some(seconds) = cli.timeout {
        settings = settings.with_timeout(Duration::from_secs(seconds));
    }

    let monte_carlo = MonteCarlo::new(settings)?;
    let time = std::time::Instant::now();
    let report = match cli.checkpoint.as_ref().filter(|path| path.exists()) {
        Some(path) => monte_carlo.resume(&pdag, &Checkpoint::load(path)?)?,
        None => monte_carlo.run(&pdag)?,
    };
    println!("{} in {:?}, seed {}, {} words", report.stop, time.elapsed(), report.seed, report.word_width);
    for (node, estimate) in report.estimates.iter() {
        println!(
            "{:>5}: p = {:.4e} +/- {:.2e}  95% [{:.4e}, {:.4e}]  99% [{:.4e}, {:.4e}]  ({} trials)",
            node.to_string(),
            estimate.mean,
            estimate.std_err,
            estimate.ci95_lower,
            estimate.ci95_upper,
            estimate.ci99_lower,
            estimate.ci99_upper,
            estimate.num_trials
        );
    }
    if let Some(path) = cli.checkpoint {
        report.checkpoint().save(&path)?;
        println!("checkpoint saved to {}", path.display());
    }
    Ok(())
}
