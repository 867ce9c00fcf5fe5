use std::sync::{Arc, Mutex};

use clap::Parser;

use rust_dmc::{
    geometry, read_run_config, CollectingAccumulator, ContinuousWeighting, DMCEngine,
    DiscreteWeighting, DmcError, FileSnapshotSink, PopulationControl, PotentialEvaluator,
    StrategyKind, WalkerSet, WalkerSetParams,
};

#[derive(Parser, Debug)]
#[command(version, about = "Diffusion Monte Carlo runner", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "dmc.yml")]
    config: String,

    /// Write checkpoints to this file (enabled when checkpoint_interval is set)
    #[arg(long, default_value = "dmc.ckpt")]
    snapshot: String,

    /// Harmonic force constant of the demo potential
    #[arg(long, default_value_t = 1.0)]
    force_constant: f64,
}

fn main() -> Result<(), DmcError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = read_run_config(&args.config)?;

    let base = geometry(&config.geometry)?;
    let atom_specs: Vec<&str> = config.atoms.iter().map(String::as_str).collect();
    let walkers = WalkerSet::new(
        &atom_specs,
        base.clone(),
        WalkerSetParams {
            initial_walkers: config.initial_walkers,
            masses: config.masses.clone(),
        },
    )?;

    // Demo potential: harmonic restraint of every atom to the base geometry.
    let k = args.force_constant;
    let potential = PotentialEvaluator::per_walker(move |_, geom| {
        geom.iter()
            .zip(base.iter())
            .map(|(r, r0)| 0.5 * k * (r - r0).norm_squared())
            .sum()
    });

    let strategy: Box<dyn PopulationControl> = match config.strategy {
        StrategyKind::Discrete => Box::new(DiscreteWeighting::default()),
        StrategyKind::Continuous => Box::new(ContinuousWeighting::new(config.target())),
    };
    let params = config.dmc_params();

    let accumulator = Arc::new(Mutex::new(CollectingAccumulator::new()));
    let mut engine = DMCEngine::new(walkers, potential, strategy, params)?
        .with_accumulator(Box::new(Arc::clone(&accumulator)));
    if config.checkpoint_interval.is_some() {
        engine = engine.with_snapshot_sink(Box::new(FileSnapshotSink::new(&args.snapshot)));
    }

    engine.propagate(config.steps)?;

    let equilibration = config.steps / 2;
    let e0 = engine.ground_state_estimate(equilibration);

    println!("DMC Simulation Results");
    println!("----------------------------------------");
    println!("Atoms: {:?}", config.atoms);
    println!("Steps: {} (dt = {})", engine.step_num(), config.timestep);
    println!("Final population: {} walkers", engine.walkers().num_walkers());
    println!("Final reference energy: {:.6}", engine.reference_energy());
    match e0 {
        Some(e0) => println!(
            "Ground-state estimate (last {} steps): {:.6}",
            config.steps - equilibration,
            e0
        ),
        None => println!("Ground-state estimate: n/a (no equilibrated steps)"),
    }
    let samples = accumulator.lock().unwrap();
    if !samples.samples.is_empty() {
        println!(
            "Wavefunction samples: {} snapshots, total descendant weight {:.1}",
            samples.samples.len(),
            samples.total_weight()
        );
    }
    Ok(())
}
