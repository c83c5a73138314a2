use crate::analysis::Analyzer;
use crate::config::Config;
use crate::engine::{Engine, Outcome, Record};
use anyhow::{Context, Result};
use glob::glob;
use rmp_serde::encode;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    /// Perform `n_runs` new simulations, each in its own run directory.
    pub fn create_runs(&self, n_runs: usize) -> Result<()> {
        for _ in 0..n_runs {
            self.create_run().context("failed to create run")?;
        }
        Ok(())
    }

    fn create_run(&self) -> Result<()> {
        let run_idx = self.count_run_dirs().context("failed to count run dirs")?;

        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        let seed = match self.cfg.run.seed {
            Some(seed) => seed.wrapping_add(run_idx as u64),
            None => rand::random(),
        };
        log::info!("seed = {seed}");

        let engine =
            Engine::new(self.cfg.clone(), seed).context("failed to generate initial condition")?;
        let record = engine
            .perform_simulation()
            .context("failed to perform simulation")?;

        log_summary(&record);

        let record_file = self.record_file(run_idx);
        save_record(&record, &record_file)
            .with_context(|| format!("failed to save {record_file:?}"))?;

        Ok(())
    }

    pub fn analyze_sim(&self) -> Result<()> {
        let n_runs = self.count_run_dirs().context("failed to count run dirs")?;
        let mut analyzer = Analyzer::new();
        for run_idx in 0..n_runs {
            analyzer
                .add_file(self.record_file(run_idx))
                .context("failed to add file")?;
        }

        let results_file = self.results_file();
        analyzer
            .save_results(&results_file)
            .context("failed to save results")?;
        log::info!("analyzed {n_runs} runs into {results_file:?}");

        Ok(())
    }

    pub fn clean_sim(&self) -> Result<()> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        for run_dir in glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
        {
            fs::remove_dir_all(&run_dir)
                .with_context(|| format!("failed to remove {run_dir:?}"))?;
            log::info!("removed {run_dir:?}");
        }

        let results_file = self.results_file();
        if results_file.exists() {
            fs::remove_file(&results_file)
                .with_context(|| format!("failed to remove {results_file:?}"))?;
            log::info!("removed {results_file:?}");
        }

        Ok(())
    }

    fn count_run_dirs(&self) -> Result<usize> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let count = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .count();
        Ok(count)
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }

    fn record_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("record.msgpack")
    }

    fn results_file(&self) -> PathBuf {
        self.sim_dir.join("results.json")
    }
}

fn save_record(record: &Record, file: &Path) -> Result<()> {
    let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(file);
    encode::write(&mut writer, record).context("failed to serialize record")?;
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}

fn log_summary(record: &Record) {
    let status = match record.outcome {
        Outcome::Extinguished => "extinguished",
        Outcome::Persists => "persists",
    };
    log::info!(
        "epidemic {status}: {} days, {} total infection events",
        record.duration(),
        record.n_events
    );
    log::info!(
        "unique agents infected: {} of {} ({:.1}% attack rate)",
        record.n_unique,
        record.n_agt,
        record.attack_rate()
    );
    let reinfections = record.reinfections();
    if reinfections > 0 {
        log::info!(
            "reinfections: {reinfections} ({:.1}% of total events)",
            100.0 * reinfections as f64 / record.n_events as f64
        );
    }
    let (peak_day, peak_size) = record.peak();
    log::info!("peak: {peak_size} active infections on day {peak_day}");
    log::info!("curve: {:?}", record.curve);
}
