use std::{fs, io, path::PathBuf};

use cachesim::{
    config::{CacheConfig, Config, RunConfig},
    experiment::{self, Experiment, ReplayOptions},
};
use color_eyre::eyre::{self, WrapErr};

const USAGE: &str = "\
usage:
  cachesim <cache size> <assoc> <repl: 0=LRU 1=FIFO> <write: 0=WT 1=WB> <trace>
  cachesim -p <config.json> | --config <json>
  cachesim --experiments <trace>...

options:
  --json <path>          write per-run stats as json
  --truncate             round the set count down instead of rejecting the size
  --dump                 print every set's contents after each run
  --warmup <n>           clear the counters after the first n accesses
  --heartbeat <n>        log progress every n accesses
  --buffer-size <n>      trace entries per block (default 16384)
  --queue-size <n>       trace blocks decoded ahead (default 32)";

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = pico_args::Arguments::from_env();
    if args.contains("--help") {
        println!("{USAGE}");
        return Ok(());
    }

    let defaults = ReplayOptions::default();
    let options = ReplayOptions {
        entries_per_block: args
            .opt_value_from_str("--buffer-size")
            .wrap_err("--buffer-size must be an integer")?
            .unwrap_or(defaults.entries_per_block),
        blocks_per_queue: args
            .opt_value_from_str("--queue-size")
            .wrap_err("--queue-size must be an integer")?
            .unwrap_or(defaults.blocks_per_queue),
        warmup: args
            .opt_value_from_str("--warmup")
            .wrap_err("--warmup must be an integer")?
            .unwrap_or(defaults.warmup),
        heartbeat: args
            .opt_value_from_str("--heartbeat")
            .wrap_err("--heartbeat must be an integer")?
            .unwrap_or(defaults.heartbeat),
        dump: args.contains("--dump"),
    };
    let stats_path: Option<PathBuf> = args.opt_value_from_str("--json")?;
    let truncate = args.contains("--truncate");
    let experiments = args.contains("--experiments");

    let config_str: Option<String> =
        if let Some(config_str) = args.opt_value_from_str("--config")? {
            Some(config_str)
        } else if let Some(config_path) = args.opt_value_from_str::<_, PathBuf>("-p")? {
            Some(
                fs::read_to_string(&config_path)
                    .wrap_err_with(|| format!("could not read config {}", config_path.display()))?,
            )
        } else {
            None
        };

    let reports = if experiments {
        let traces: Vec<PathBuf> = args.finish().into_iter().map(PathBuf::from).collect();
        eyre::ensure!(!traces.is_empty(), "--experiments needs at least one trace\n{USAGE}");
        let experiment = Experiment::standard(&traces);
        experiment.execute(&options, &mut io::stdout().lock())?
    } else if let Some(config_str) = config_str {
        let config: Config = serde_json::from_str(&config_str).wrap_err("invalid config")?;
        let experiment = Experiment::from_config(config, truncate);
        experiment.execute(&options, &mut io::stdout().lock())?
    } else {
        let run_config = single_run(&mut args, truncate)?;
        let rest = args.finish();
        if !rest.is_empty() {
            log::warn!("ignoring extra arguments: {rest:?}");
        }
        let (report, cache) = experiment::run(&run_config, &options)?;
        println!("{}", experiment::summary(&report));
        if options.dump {
            print!("{cache}");
        }
        vec![report]
    };

    if let Some(stats_path) = stats_path {
        let stats = reports.iter().map(|r| &r.stats).collect::<Vec<_>>();
        let stats_file = fs::File::create(&stats_path)
            .wrap_err_with(|| format!("cannot open output file {}", stats_path.display()))?;
        serde_json::to_writer_pretty(stats_file, &stats)?;
    }
    Ok(())
}

fn single_run(args: &mut pico_args::Arguments, truncate: bool) -> eyre::Result<RunConfig> {
    let positional = |err: pico_args::Error| eyre::eyre!("{err}\n{USAGE}");
    let cache_size: usize = args.free_from_str().map_err(positional)?;
    let ways: usize = args.free_from_str().map_err(positional)?;
    let repl: u32 = args.free_from_str().map_err(positional)?;
    let write: u32 = args.free_from_str().map_err(positional)?;
    let trace: PathBuf = args.free_from_str().map_err(positional)?;

    let mut cache = CacheConfig::from_codes(cache_size, ways, repl, write)?;
    cache.truncate = truncate;
    Ok(RunConfig { cache, trace })
}
