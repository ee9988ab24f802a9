use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::{
    cache::{CacheStats, IsCache},
    config::{CacheConfig, Config, ConfigError, ReplacementPolicy, RunConfig, WritePolicy},
    trace::{Trace, TraceError},
};

const SIZE_SWEEP: [usize; 5] = [8192, 16384, 32768, 65536, 131072];
const WAYS_SWEEP: [usize; 7] = [1, 2, 4, 8, 16, 32, 64];

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Trace(#[from] TraceError),
}

#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    pub entries_per_block: usize,
    pub blocks_per_queue: usize,
    /// Clear the counters once this many accesses were replayed, 0 disables it.
    pub warmup: u64,
    /// Log progress every this many accesses, 0 disables it.
    pub heartbeat: u64,
    /// Print every set's contents at the end of a run.
    pub dump: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        ReplayOptions {
            entries_per_block: 1024 * 16,
            blocks_per_queue: 32,
            warmup: 0,
            heartbeat: 0,
            dump: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub trace: PathBuf,
    pub stats: CacheStats,
}

/// Feeds every access of `trace` to `cache`, in order, until the trace ends.
///
/// Returns the number of accesses replayed, warmup included.
pub fn replay(
    cache: &mut dyn IsCache,
    trace: &Trace,
    options: &ReplayOptions,
) -> Result<u64, TraceError> {
    let mut processed = 0u64;
    let mut next_heartbeat = options.heartbeat;
    for block in trace.blocks() {
        for access in block? {
            cache.access(access.op, access.address);
            processed += 1;
            if processed == options.warmup {
                cache.clear_stats();
                log::info!("{}: finished warmup", cache.config().name);
            }
        }
        if options.heartbeat != 0 && processed >= next_heartbeat {
            log::info!("{}: {} accesses", cache.config().name, processed);
            while next_heartbeat <= processed {
                next_heartbeat += options.heartbeat;
            }
        }
    }
    Ok(processed)
}

/// Simulates one configuration against its trace on a fresh cache.
pub fn run(
    run: &RunConfig,
    options: &ReplayOptions,
) -> Result<(RunReport, Box<dyn IsCache>), RunError> {
    let mut cache = run.cache.to_cache()?;
    let trace = Trace::open(&run.trace, options.entries_per_block, options.blocks_per_queue)?;
    let processed = replay(cache.as_mut(), &trace, options)?;
    log::debug!(
        "{}: replayed {} accesses from {}",
        run.cache.name,
        processed,
        run.trace.display()
    );
    let report = RunReport {
        trace: run.trace.clone(),
        stats: cache.make_stats(),
    };
    Ok((report, cache))
}

fn miss_ratio(report: &RunReport) -> String {
    match report.stats.miss_rate {
        Some(ratio) => format!("{ratio:.6}"),
        None => "n/a".to_string(),
    }
}

/// Tabular form: `size assoc repl write trace: miss-ratio writes reads`.
pub fn report_line(report: &RunReport) -> String {
    let config = &report.stats.config;
    format!(
        "\t{} {} {} {} {}:\t{}\t{}\t{}",
        config.cache_size,
        config.ways,
        config.repl.code(),
        config.write.code(),
        report.trace.display(),
        miss_ratio(report),
        report.stats.counters.writes,
        report.stats.counters.reads
    )
}

pub fn summary(report: &RunReport) -> String {
    format!(
        "Miss Ratio: \t{}\nWrites: \t{}\nReads: \t\t{}",
        miss_ratio(report),
        report.stats.counters.writes,
        report.stats.counters.reads
    )
}

#[derive(Debug, Clone)]
pub struct Section {
    pub title: String,
    pub runs: Vec<RunConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct Experiment {
    pub sections: Vec<Section>,
}

fn sweep<'a>(
    traces: &'a [PathBuf],
    caches: impl Fn() -> Vec<CacheConfig> + 'a,
) -> impl Iterator<Item = RunConfig> + 'a {
    traces.iter().flat_map(move |trace| {
        caches().into_iter().map(move |cache| RunConfig {
            cache,
            trace: trace.clone(),
        })
    })
}

impl Experiment {
    pub fn from_config(config: Config, truncate: bool) -> Self {
        let runs = config
            .runs
            .into_iter()
            .map(|mut run| {
                run.cache.truncate |= truncate;
                if run.cache.name.is_empty() {
                    run.cache.name = CacheConfig::new(
                        run.cache.cache_size,
                        run.cache.ways,
                        run.cache.repl,
                        run.cache.write,
                    )
                    .name;
                }
                run
            })
            .collect();
        Experiment {
            sections: vec![Section {
                title: "CONFIG".to_string(),
                runs,
            }],
        }
    }

    /// The four standard sweeps, each over every trace.
    pub fn standard(traces: &[PathBuf]) -> Self {
        use ReplacementPolicy::{Fifo, Lru};
        use WritePolicy::{WriteBack, WriteThrough};

        let by_size = |repl: ReplacementPolicy, write: WritePolicy| {
            move || {
                SIZE_SWEEP
                    .iter()
                    .map(|&size| CacheConfig::new(size, 4, repl, write))
                    .collect::<Vec<_>>()
            }
        };
        let by_ways = || {
            WAYS_SWEEP
                .iter()
                .map(|&ways| CacheConfig::new(32768, ways, Lru, WriteBack))
                .collect::<Vec<_>>()
        };

        Experiment {
            sections: vec![
                Section {
                    title: "PART A".to_string(),
                    runs: sweep(traces, by_size(Lru, WriteBack)).collect(),
                },
                Section {
                    title: "PART B".to_string(),
                    runs: sweep(traces, by_size(Lru, WriteThrough)).collect(),
                },
                Section {
                    title: "PART C".to_string(),
                    runs: sweep(traces, by_ways).collect(),
                },
                Section {
                    title: "PART D".to_string(),
                    runs: sweep(traces, by_size(Fifo, WriteBack)).collect(),
                },
            ],
        }
    }

    /// Runs every configuration one after another, writing a report line
    /// per completed run. Failed runs are logged and skipped.
    pub fn execute(
        &self,
        options: &ReplayOptions,
        out: &mut impl Write,
    ) -> io::Result<Vec<RunReport>> {
        let mut reports = Vec::new();
        for section in &self.sections {
            writeln!(out, "{:=^74}", format!(" {} ", section.title))?;
            let mut last_trace: Option<&Path> = None;
            for run_config in &section.runs {
                if last_trace != Some(run_config.trace.as_path()) {
                    let name = run_config
                        .trace
                        .file_name()
                        .unwrap_or(run_config.trace.as_os_str());
                    writeln!(out, "{}", name.to_string_lossy())?;
                    last_trace = Some(run_config.trace.as_path());
                }
                match run(run_config, options) {
                    Ok((report, cache)) => {
                        writeln!(out, "{}", report_line(&report))?;
                        if options.dump {
                            write!(out, "{cache}")?;
                        }
                        reports.push(report);
                    }
                    Err(err) => log::error!("skipping {}: {}", run_config.cache.name, err),
                }
            }
            writeln!(out)?;
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_trace(name: &str, text: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("cachesim-{}-{name}.t", std::process::id()));
        fs::write(&path, text).unwrap();
        path
    }

    fn run_config(
        cache_size: usize,
        ways: usize,
        repl: u32,
        write: u32,
        trace: &Path,
    ) -> RunConfig {
        RunConfig {
            cache: CacheConfig::from_codes(cache_size, ways, repl, write).unwrap(),
            trace: trace.to_path_buf(),
        }
    }

    #[test]
    fn single_run_report() {
        let path = temp_trace("single", "R 0x0\nR 0x40\nW 0x0\nR 0x80\n");
        let (report, _cache) =
            run(&run_config(128, 2, 1, 1, &path), &ReplayOptions::default()).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(
            summary(&report),
            "Miss Ratio: \t0.750000\nWrites: \t1\nReads: \t\t3"
        );
        assert_eq!(
            report_line(&report),
            format!("\t128 2 1 1 {}:\t0.750000\t1\t3", path.display())
        );
    }

    #[test]
    fn small_blocks_still_replay() {
        let path = temp_trace("blocks", "R 0\nR 40\nR 80\nR c0\nR 0\n");
        let options = ReplayOptions {
            entries_per_block: 2,
            blocks_per_queue: 1,
            ..ReplayOptions::default()
        };
        let (report, _cache) = run(&run_config(256, 4, 0, 0, &path), &options).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(report.stats.counters.accesses(), 5);
        assert_eq!(report.stats.counters.hits, 1);
    }

    #[test]
    fn warmup_clears_counters() {
        let path = temp_trace("warmup", "R 0\nR 40\nR 0\nR 40\nR 80\n");
        let options = ReplayOptions {
            warmup: 2,
            entries_per_block: 3,
            ..ReplayOptions::default()
        };
        let (report, _cache) = run(&run_config(128, 2, 0, 1, &path), &options).unwrap();
        fs::remove_file(&path).unwrap();
        // only the last three accesses are counted, the cache stays warm
        let counters = report.stats.counters;
        assert_eq!((counters.hits, counters.misses, counters.evictions), (2, 1, 1));
    }

    #[test]
    fn bad_record_fails_the_run() {
        let path = temp_trace("malformed", "R 0x0\nW\n");
        let result = run(&run_config(128, 2, 0, 1, &path), &ReplayOptions::default());
        fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(RunError::Trace(TraceError::Format { .. }))));
    }

    #[test]
    fn failed_runs_are_skipped() {
        let good = temp_trace("good", "W 0x0\nW 0x0\n");
        let bad = temp_trace("bad", "W 0x0\nW zz\n");
        let experiment = Experiment {
            sections: vec![Section {
                title: "MIXED".to_string(),
                runs: vec![
                    run_config(64, 1, 0, 0, Path::new("/nonexistent/trace.t")),
                    run_config(64, 1, 0, 0, &bad),
                    run_config(1000, 4, 0, 0, &good),
                    run_config(64, 1, 0, 0, &good),
                ],
            }],
        };
        let mut out = Vec::new();
        let reports = experiment.execute(&ReplayOptions::default(), &mut out).unwrap();
        fs::remove_file(&good).unwrap();
        fs::remove_file(&bad).unwrap();

        assert_eq!(reports.len(), 1);
        let counters = reports[0].stats.counters;
        assert_eq!((counters.hits, counters.misses, counters.reads, counters.writes), (1, 1, 1, 2));

        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("="));
        assert!(out.contains(" MIXED "));
        assert_eq!(out.matches("\t0.500000\t2\t1").count(), 1);
    }

    #[test]
    fn standard_sweeps() {
        let traces = vec![PathBuf::from("XSBENCH.t"), PathBuf::from("MINIFE.t")];
        let experiment = Experiment::standard(&traces);
        let counts: Vec<_> = experiment.sections.iter().map(|s| s.runs.len()).collect();
        assert_eq!(counts, vec![10, 10, 14, 10]);

        let part_c = &experiment.sections[2].runs;
        assert!(part_c.iter().all(|r| r.cache.cache_size == 32768));
        assert_eq!(part_c[6].cache.ways, 64);
        assert_eq!(part_c[7].trace, PathBuf::from("MINIFE.t"));

        let part_d = &experiment.sections[3].runs;
        assert!(part_d.iter().all(|r| r.cache.repl == ReplacementPolicy::Fifo));
        // every standard geometry divides evenly
        for section in &experiment.sections {
            for run in &section.runs {
                assert!(run.cache.n_sets().is_ok(), "{:?}", run.cache);
            }
        }
    }

    #[test]
    fn config_runs_get_names() {
        let config: Config = serde_json::from_str(
            r#"{"runs": [{"cache_size": 1000, "ways": 4, "repl": "lru", "write": "wb", "trace": "x.t"}]}"#,
        )
        .unwrap();
        let experiment = Experiment::from_config(config, true);
        let run = &experiment.sections[0].runs[0];
        assert!(run.cache.truncate);
        assert_eq!(run.cache.name, "1000B 4-way LRU write-back");
        assert_eq!(run.cache.n_sets(), Ok(3));
    }
}
