use crate::engine::{Outcome, Record};
use crate::stats::Accumulator;
use anyhow::{Context, Result};
use rmp_serde::decode;
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// Quantity measured on every run record.
pub trait Obs {
    fn update(&mut self, record: &Record);
    fn report(&self) -> serde_json::Value;
}

/// Summary statistics of a scalar measured on each run.
pub struct Scalar {
    name: &'static str,
    measure: fn(&Record) -> f64,
    acc: Accumulator,
}

impl Scalar {
    pub fn new(name: &'static str, measure: fn(&Record) -> f64) -> Self {
        Self {
            name,
            measure,
            acc: Accumulator::new(),
        }
    }
}

impl Obs for Scalar {
    fn update(&mut self, record: &Record) {
        self.acc.add((self.measure)(record));
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({ self.name: self.acc.report() })
    }
}

/// Fraction of runs in which the epidemic died out.
pub struct ProbExtinct {
    acc: Accumulator,
}

impl ProbExtinct {
    pub fn new() -> Self {
        Self {
            acc: Accumulator::new(),
        }
    }
}

impl Obs for ProbExtinct {
    fn update(&mut self, record: &Record) {
        let extinct = record.outcome == Outcome::Extinguished;
        self.acc.add(if extinct { 1.0 } else { 0.0 });
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({ "prob_extinct": self.acc.report() })
    }
}

/// Aggregates run records into a results file.
pub struct Analyzer {
    n_runs: usize,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new() -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(Scalar::new("attack_rate", Record::attack_rate)),
            Box::new(Scalar::new("duration", |rec| rec.duration() as f64)),
            Box::new(Scalar::new("peak_day", |rec| rec.peak().0 as f64)),
            Box::new(Scalar::new("peak_size", |rec| rec.peak().1 as f64)),
            Box::new(Scalar::new("n_events", |rec| rec.n_events as f64)),
            Box::new(Scalar::new("reinfections", |rec| rec.reinfections() as f64)),
            Box::new(ProbExtinct::new()),
        ];
        Self {
            n_runs: 0,
            obs_ptr_vec,
        }
    }

    pub fn add_record(&mut self, record: &Record) {
        self.n_runs += 1;
        for obs in &mut self.obs_ptr_vec {
            obs.update(record);
        }
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let record: Record = decode::from_read(&mut reader).context("failed to read record")?;
        self.add_record(&record);
        Ok(())
    }

    pub fn report(&self) -> serde_json::Value {
        let reports: Vec<_> = self.obs_ptr_vec.iter().map(|obs| obs.report()).collect();
        serde_json::json!({ "n_runs": self.n_runs, "observables": reports })
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.report())
            .context("failed to serialize results")?;
        Ok(())
    }
}
