#[cfg(feature = "mimalloc-global")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::time::Instant;
use word_life::wordlife::{KernelBackend, WordLife, WordLifeConfig};

const DEFAULT_ROWS: usize = 1024;
const DEFAULT_COLS: usize = 1024;
const DEFAULT_DENSITY: f64 = 0.42;
const DEFAULT_STEPS: u64 = 2000;
const DEFAULT_CHECK_INTERVAL: u64 = 500;
const DEFAULT_SEED: u64 = 0x5EED_1234_ABCD_EF01;

struct MainArgs {
    config: WordLifeConfig,
    density: f64,
    steps: u64,
    check_interval: u64,
    seed: u64,
}

fn parse_args() -> MainArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut config = WordLifeConfig::default().dimensions(DEFAULT_ROWS, DEFAULT_COLS);
    let mut density = DEFAULT_DENSITY;
    let mut steps = DEFAULT_STEPS;
    let mut check_interval = DEFAULT_CHECK_INTERVAL;
    let mut seed = DEFAULT_SEED;
    let next_arg = |i: usize, flag: &str| -> &str {
        args.get(i)
            .map(String::as_str)
            .unwrap_or_else(|| panic!("{flag} requires a value"))
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rows" => {
                i += 1;
                config.rows = next_arg(i, "--rows")
                    .parse()
                    .expect("--rows requires a positive integer");
            }
            "--cols" => {
                i += 1;
                config.columns = next_arg(i, "--cols")
                    .parse()
                    .expect("--cols requires a positive integer");
            }
            "--density" => {
                i += 1;
                density = next_arg(i, "--density")
                    .parse()
                    .expect("--density requires a float in [0,1]");
            }
            "--steps" => {
                i += 1;
                steps = next_arg(i, "--steps")
                    .parse()
                    .expect("--steps requires a positive integer");
            }
            "--check-interval" => {
                i += 1;
                check_interval = next_arg(i, "--check-interval")
                    .parse()
                    .expect("--check-interval requires a positive integer");
            }
            "--seed" => {
                i += 1;
                seed = next_arg(i, "--seed")
                    .parse()
                    .expect("--seed requires a u64");
            }
            "--threads" => {
                i += 1;
                let n: usize = next_arg(i, "--threads")
                    .parse()
                    .expect("--threads requires a positive integer");
                config = config.thread_count(n);
            }
            "--max-threads" => {
                i += 1;
                let n: usize = next_arg(i, "--max-threads")
                    .parse()
                    .expect("--max-threads requires a positive integer");
                config = config.max_threads(n);
            }
            "--kernel" => {
                i += 1;
                let backend = match next_arg(i, "--kernel").to_ascii_lowercase().as_str() {
                    "scalar" => KernelBackend::Scalar,
                    "avx2" => KernelBackend::Avx2,
                    other => panic!("unknown kernel backend: {other} (expected scalar or avx2)"),
                };
                config = config.kernel(backend);
            }
            other => panic!(
                "unknown argument: {other}\nusage: word-life [--rows N] [--cols N] [--density F] [--steps N] [--check-interval N] [--seed N] [--threads N] [--max-threads N] [--kernel scalar|avx2]"
            ),
        }
        i += 1;
    }
    MainArgs {
        config,
        density,
        steps,
        check_interval,
        seed,
    }
}

/// Step a scalar-backend engine and the configured engine in lockstep,
/// comparing populations at each checkpoint.
fn run_checked(args: MainArgs) {
    let mut reference = WordLife::with_config(args.config.clone().kernel(KernelBackend::Scalar))
        .expect("invalid configuration");
    let mut engine = WordLife::with_config(args.config).expect("invalid configuration");
    reference.randomize(args.density, args.seed);
    engine.randomize(args.density, args.seed);

    println!(
        "world {}x{} density {} backend {:?}",
        engine.rows(),
        engine.columns(),
        args.density,
        engine.backend()
    );

    let mut reference_total = std::time::Duration::ZERO;
    let mut engine_total = std::time::Duration::ZERO;
    let check_interval = args.check_interval.max(1);
    let checkpoints = args.steps / check_interval;

    for checkpoint in 1..=checkpoints {
        let iteration = checkpoint * check_interval;

        let start = Instant::now();
        reference.step_n(check_interval);
        reference_total += start.elapsed();

        let start = Instant::now();
        engine.step_n(check_interval);
        engine_total += start.elapsed();

        let reference_population = reference.population();
        let engine_population = engine.population();
        let match_status = if reference_population == engine_population {
            "MATCH"
        } else {
            "MISMATCH"
        };
        println!(
            "Iteration {iteration}: scalar pop = {reference_population}, {:?} pop = {engine_population} [{match_status}]",
            engine.backend()
        );
    }

    let reference_ms = reference_total.as_secs_f64() * 1000.0;
    let engine_ms = engine_total.as_secs_f64() * 1000.0;
    let steps = (checkpoints * check_interval).max(1);

    println!("\n--- Summary ({steps} iterations) ---");
    println!(
        "scalar: {reference_ms:.3} ms total, {:.6} ms/iter",
        reference_ms / steps as f64
    );
    println!(
        "{:?}: {engine_ms:.3} ms total, {:.6} ms/iter, speedup {:.2}x",
        engine.backend(),
        engine_ms / steps as f64,
        reference_ms / engine_ms
    );
}

fn main() {
    env_logger::init();
    run_checked(parse_args());
}
