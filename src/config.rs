use crate::sampling::Counts;
use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Population structure and interventions.
    pub population: PopulationConfig,
    /// Disease progression and transmission.
    pub disease: DiseaseConfig,
    /// Daily contact structure.
    pub contact: ContactConfig,
    /// Run control.
    pub run: RunConfig,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PopulationConfig {
    /// Number of agents (one entry per subgroup when subgrouped).
    pub n_agt: Counts,
    /// Number of initially infected agents.
    pub n_inf: Counts,
    /// Probability of being vaccinated.
    pub prob_vac: f64,
    /// Probability of wearing a mask.
    pub prob_mask: f64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            n_agt: Counts::Flat(100),
            n_inf: Counts::Flat(1),
            prob_vac: 0.9,
            prob_mask: 0.3,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiseaseConfig {
    /// Days spent exposed (pre-symptomatic).
    pub days_exp: i32,
    /// Days spent infected (symptomatic).
    pub days_inf: i32,
    /// Transmission probability of an exposed agent.
    pub prob_trans_exp: f64,
    /// Transmission probability of an infected agent.
    pub prob_trans_inf: f64,
    /// Probability of recovering with full immunity.
    pub prob_rec: f64,
    /// Probability of an infection being asymptomatic.
    pub prob_asym: f64,
    /// Probability of a symptomatic agent isolating.
    pub prob_iso: f64,
}

impl Default for DiseaseConfig {
    fn default() -> Self {
        Self {
            days_exp: 3,
            days_inf: 5,
            prob_trans_exp: 0.01,
            prob_trans_inf: 0.02,
            prob_rec: 0.5,
            prob_asym: 0.3,
            prob_iso: 0.4,
        }
    }
}

impl DiseaseConfig {
    /// State assigned at the moment of infection.
    pub fn onset(&self) -> i32 {
        self.days_inf + self.days_exp + 1
    }

    /// Infected but pre-symptomatic.
    pub fn is_exposed(&self, state: i32) -> bool {
        self.days_inf < state && state <= self.days_inf + self.days_exp
    }

    /// Symptomatic.
    pub fn is_infected(&self, state: i32) -> bool {
        0 < state && state <= self.days_inf
    }

    /// Either exposed or infected.
    pub fn is_active(&self, state: i32) -> bool {
        0 < state && state <= self.days_inf + self.days_exp
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContactConfig {
    /// Maximum number of daily contacts of an infected agent.
    pub max_contacts: usize,
    /// Percentages of the daily contacts of each subgroup going to every subgroup
    /// (matrix `n_grp x n_grp`, rows summing to 100).
    pub mixing: Option<Vec<Vec<f64>>>,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            max_contacts: 4,
            mixing: None,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Maximum number of simulated days.
    pub max_days: usize,
    /// Base random seed (drawn from the OS when absent).
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_days: 100,
            seed: None,
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded; missing keys take their default values,
    /// and a missing file yields the default configuration.
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        if !file.exists() {
            log::warn!("{file:?} not found, using default config");
            return Ok(Self::default());
        }
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_population()
            .context("invalid population parameters")?;
        self.validate_disease()
            .context("invalid disease parameters")?;
        self.validate_contact()
            .context("invalid contact parameters")?;
        check_num(self.run.max_days, 0..1_000_000).context("invalid maximum number of days")?;
        Ok(())
    }

    fn validate_population(&self) -> Result<()> {
        let pop = &self.population;
        match (&pop.n_inf, &pop.n_agt) {
            (Counts::Flat(n_inf), n_agt) => {
                check_num(*n_inf, 0..=n_agt.total()).context("invalid number of infected")?;
            }
            (Counts::Binned(n_inf), Counts::Binned(n_agt)) => {
                check_len(n_inf, n_agt.len()).context("invalid number of infected")?;
                for (i_grp, (&n_inf, &n_agt)) in n_inf.iter().zip(n_agt).enumerate() {
                    check_num(n_inf, 0..=n_agt)
                        .with_context(|| format!("invalid number of infected in group {i_grp}"))?;
                }
            }
            (Counts::Binned(_), Counts::Flat(_)) => {
                bail!("per-group infected counts require a subgrouped population")
            }
        }
        if let Counts::Binned(n_agt) = &pop.n_agt {
            ensure!(!n_agt.is_empty(), "population must have at least one group");
        }
        check_num(pop.n_agt.total(), 1..100_000_000).context("invalid number of agents")?;
        check_num(pop.prob_vac, 0.0..=1.0).context("invalid vaccination probability")?;
        check_num(pop.prob_mask, 0.0..=1.0).context("invalid masking probability")?;
        Ok(())
    }

    fn validate_disease(&self) -> Result<()> {
        let dis = &self.disease;
        check_num(dis.days_exp, 0..10_000).context("invalid number of exposed days")?;
        check_num(dis.days_inf, 1..10_000).context("invalid number of infected days")?;
        check_num(dis.prob_trans_exp, 0.0..=1.0)
            .context("invalid exposed transmission probability")?;
        check_num(dis.prob_trans_inf, 0.0..=1.0)
            .context("invalid infected transmission probability")?;
        check_num(dis.prob_rec, 0.0..=1.0).context("invalid recovery probability")?;
        check_num(dis.prob_asym, 0.0..=1.0).context("invalid asymptomatic probability")?;
        check_num(dis.prob_iso, 0.0..=1.0).context("invalid isolation probability")?;
        Ok(())
    }

    fn validate_contact(&self) -> Result<()> {
        let max_contacts = self.contact.max_contacts;
        match (&self.population.n_agt, &self.contact.mixing) {
            (Counts::Flat(n_agt), None) => {
                check_num(max_contacts, 0..=*n_agt)
                    .context("invalid maximum number of contacts")?;
            }
            (Counts::Binned(n_agt), Some(mixing)) => {
                check_mat(mixing, (n_agt.len(), n_agt.len()))
                    .context("invalid mixing matrix")?;
                for (i_row, row) in mixing.iter().enumerate() {
                    for (i_col, &pct) in row.iter().enumerate() {
                        let n_max = group_contacts(max_contacts, pct);
                        check_num(n_max, 0..=n_agt[i_col]).with_context(|| {
                            format!("group {i_row} may request too many contacts in group {i_col}")
                        })?;
                    }
                }
            }
            (Counts::Flat(_), Some(_)) => bail!("mixing matrix requires a subgrouped population"),
            (Counts::Binned(_), None) => bail!("subgrouped population requires a mixing matrix"),
        }
        Ok(())
    }
}

/// Number of contacts out of `n_contacts` assigned to a group receiving `pct` percent.
///
/// Each entry is rounded on its own, so a row may not add up to `n_contacts`.
pub fn group_contacts(n_contacts: usize, pct: f64) -> usize {
    (n_contacts as f64 * pct / 100.0).round_ties_even() as usize
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_len<T>(vec: &[T], exp_len: usize) -> Result<()> {
    let len = vec.len();
    if len != exp_len {
        bail!("vector length must be {exp_len}, but is {len}");
    }
    Ok(())
}

fn check_vec(vec: &[f64], exp_len: usize) -> Result<()> {
    check_len(vec, exp_len)?;
    // Percentages: non-negative elements summing to about 100.
    if vec.iter().any(|&ele| ele < 0.0) {
        bail!("vector must have only non-negative elements");
    }
    let sum: f64 = vec.iter().sum();
    let tol = 1.0;
    if (sum - 100.0).abs() > tol {
        bail!("vector must sum to 100 (tolerance: {tol}), but sums to {sum}");
    }
    if (sum - 100.0).abs() > 1e-6 {
        log::warn!("vector sums to {sum} instead of 100");
    }
    Ok(())
}

fn check_mat(mat: &[Vec<f64>], exp_dim: (usize, usize)) -> Result<()> {
    let exp_n_rows = exp_dim.0;
    let exp_n_cols = exp_dim.1;
    let n_rows = mat.len();
    if n_rows != exp_n_rows {
        bail!("matrix must have {exp_n_rows} rows, but has {n_rows}");
    }
    for (i_row, row) in mat.iter().enumerate() {
        check_vec(row, exp_n_cols).with_context(|| format!("invalid row {i_row}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.population.n_agt, Counts::Flat(100));
        assert_eq!(config.contact.max_contacts, 4);
        assert_eq!(config.run.max_days, 100);
    }

    #[test]
    fn subgrouped_config_parses() {
        let config = Config::from_toml(
            r#"
[population]
n_agt = [60, 40]
n_inf = [1, 0]

[contact]
max_contacts = 10
mixing = [[70.0, 30.0], [50.0, 50.0]]

[run]
seed = 3
"#,
        )
        .unwrap();
        assert_eq!(config.population.n_agt, Counts::Binned(vec![60, 40]));
        assert_eq!(config.population.n_inf, Counts::Binned(vec![1, 0]));
        assert_eq!(config.run.seed, Some(3));
    }

    #[test]
    fn disease_windows_partition_active_states() {
        let dis = DiseaseConfig {
            days_exp: 3,
            days_inf: 5,
            ..DiseaseConfig::default()
        };
        assert_eq!(dis.onset(), 9);
        assert!((1..=5).all(|state| dis.is_infected(state) && !dis.is_exposed(state)));
        assert!((6..=8).all(|state| dis.is_exposed(state) && !dis.is_infected(state)));
        for state in [-1, 0, 9] {
            assert!(!dis.is_active(state));
            assert!(!dis.is_exposed(state));
            assert!(!dis.is_infected(state));
        }
    }

    #[test]
    fn group_contacts_round_independently() {
        assert_eq!(group_contacts(3, 50.0), 2);
        assert_eq!(group_contacts(5, 50.0), 2);
        assert_eq!(group_contacts(4, 33.3), 1);
        assert_eq!(group_contacts(0, 100.0), 0);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let cases = [
            "[population]\nn_agt = 10\nn_inf = 11\n",
            "[population]\nn_agt = 10\nn_inf = [1, 1]\n",
            "[population]\nn_agt = [5, 5]\nn_inf = [1]\n[contact]\nmixing = [[50.0, 50.0], [50.0, 50.0]]\n",
            "[population]\nn_agt = [5, 5]\nn_inf = [6, 0]\n[contact]\nmixing = [[50.0, 50.0], [50.0, 50.0]]\n",
            "[population]\nn_agt = [5, 5]\n",
            "[population]\nn_agt = [5, 5]\n[contact]\nmixing = [[40.0, 50.0], [50.0, 50.0]]\n",
            "[population]\nn_agt = [5, 5]\n[contact]\nmixing = [[100.0], [100.0]]\n",
            "[population]\nn_agt = [5, 5]\n[contact]\nmax_contacts = 8\nmixing = [[100.0, 0.0], [0.0, 100.0]]\n",
            "[contact]\nmixing = [[100.0]]\n",
            "[contact]\nmax_contacts = 101\n",
            "[population]\nprob_vac = 1.5\n",
            "[disease]\ndays_inf = 0\n",
            "[disease]\nprob_rec = -0.1\n",
            "[disease]\nunknown = 1\n",
        ];
        for case in cases {
            assert!(Config::from_toml(case).is_err(), "accepted invalid config:\n{case}");
        }
    }

    #[test]
    fn no_exposed_phase_is_accepted() {
        let config = Config::from_toml("[disease]\ndays_exp = 0\n").unwrap();
        let dis = &config.disease;
        assert_eq!(dis.onset(), dis.days_inf + 1);
        assert!((-1..=dis.onset()).all(|state| !dis.is_exposed(state)));
        assert!((1..=dis.days_inf).all(|state| dis.is_active(state)));
    }

    #[test]
    fn near_hundred_mixing_rows_are_accepted() {
        for row in ["[33.0, 33.0, 34.0]", "[33.0, 33.0, 33.0]", "[33.3, 33.3, 33.3]"] {
            let contents = format!(
                "[population]\nn_agt = [5, 5, 5]\n\
                 [contact]\nmixing = [{row}, {row}, {row}]\n"
            );
            assert!(Config::from_toml(&contents).is_ok(), "rejected row {row}");
        }
        let contents = "[population]\nn_agt = [5, 5, 5]\n\
                        [contact]\nmixing = [[30.0, 30.0, 30.0], [30.0, 30.0, 30.0], [30.0, 30.0, 30.0]]\n";
        assert!(Config::from_toml(contents).is_err());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let file = std::env::temp_dir()
            .join(format!("episim_missing_{}", std::process::id()))
            .join("config.toml");
        assert_eq!(Config::from_file(&file).unwrap(), Config::default());
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = std::env::temp_dir().join(format!("episim_from_file_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("config.toml");
        fs::write(&file, "[run]\nmax_days = 7\n").unwrap();
        let config = Config::from_file(&file).unwrap();
        assert_eq!(config.run.max_days, 7);
        fs::remove_dir_all(&dir).ok();
    }
}
