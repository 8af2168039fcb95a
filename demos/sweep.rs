use clap::Parser;
use scoreprobe::{StderrLog, Sweep, TRIAL_COUNT};
use std::io::{self, Write};
use std::time;

#[derive(Parser, Clone, Debug)]
struct Args {
    #[clap(long, help = "smallest target score (inclusive)")]
    k_min: usize,
    #[clap(long, help = "largest target score (exclusive)")]
    k_max: usize,
    #[clap(long, short = 'n', help = "number of options per question")]
    option_count: usize,
    /// Simulated runs per pool/target pair without a closed form.
    #[clap(long, default_value_t = TRIAL_COUNT)]
    trials: u32,
    /// Seed for the binary-search simulator. Output is reproducible only
    /// when this is set.
    #[clap(long)]
    seed: Option<u64>,
    #[clap(long, help = "print rows as JSON")]
    json: bool,
    #[clap(long, help = "print normalized expectations as exact fractions")]
    exact: bool,
}

pub fn main() -> io::Result<()> {
    let args = Args::parse();

    let sweep = Sweep {
        k_min: args.k_min,
        k_max: args.k_max,
        option_count: args.option_count,
        trial_count: args.trials,
        seed: args.seed,
    };
    let t0 = time::Instant::now();
    let rows = sweep.run(&mut scoreprobe::update_stderr_progress, &StderrLog)?;
    eprintln!("sweep time = {:?}", t0.elapsed());

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    if args.json {
        serde_json::to_writer_pretty(&mut out, &rows)?;
        writeln!(out)?;
    } else {
        for row in &rows {
            if args.exact {
                writeln!(out, "{} {}", row.k, row.normalized_exact)?;
            } else {
                writeln!(out, "{}", row)?;
            }
        }
    }
    Ok(())
}
