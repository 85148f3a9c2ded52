//! Seeded synthetic survey data.
//!
//! Produces respondents spread unevenly over 50 states, with a right-skewed
//! age distribution, decade-of-birth cohorts and thermometer scores built
//! from party, age, state and cohort effects plus noise. Every state gets at
//! least one respondent.

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use statrs::distribution::{Gamma, Normal};
use tracing::debug;

use crate::error::DataError;
use crate::survey::Observation;

/// Two-letter codes of the 50 states.
pub const STATES: [&str; 50] = [
    "AK", "AL", "AR", "AZ", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "IA", "ID", "IL", "IN",
    "KS", "KY", "LA", "MA", "MD", "ME", "MI", "MN", "MO", "MS", "MT", "NC", "ND", "NE", "NH",
    "NJ", "NM", "NV", "NY", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VA",
    "VT", "WA", "WI", "WV", "WY",
];

const PARTIES: [(&str, f64, f64); 3] = [
    // (label, share, shift of the Democratic thermometer)
    ("Democrat", 0.34, 22.0),
    ("Independent", 0.36, 0.0),
    ("Republican", 0.30, -24.0),
];

const RACES: [(&str, f64); 4] = [
    ("white", 0.62),
    ("black", 0.12),
    ("hispanic", 0.17),
    ("other", 0.09),
];

/// Parameters of the simulated survey.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub n_respondents: usize,
    pub seed: u64,
    /// Survey waves respondents are assigned to uniformly.
    pub years: Vec<i32>,
    /// SD of state random intercepts.
    pub state_sd: f64,
    /// SD of state-specific age slopes (per year of age).
    pub state_slope_sd: f64,
    /// SD of cohort random intercepts.
    pub cohort_sd: f64,
    /// Residual SD.
    pub residual_sd: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n_respondents: 2000,
            seed: 12345,
            years: vec![2016, 2020],
            state_sd: 6.0,
            state_slope_sd: 0.15,
            cohort_sd: 4.0,
            residual_sd: 15.0,
        }
    }
}

fn normal(mean: f64, sd: f64) -> Result<Normal, DataError> {
    Normal::new(mean, sd).map_err(|e| DataError::Schema(format!("invalid normal({mean}, {sd}): {e}")))
}

fn weighted<T: Copy>(items: &[(T, f64)]) -> Result<WeightedIndex<f64>, DataError> {
    WeightedIndex::new(items.iter().map(|(_, w)| *w))
        .map_err(|e| DataError::Schema(format!("invalid weights: {e}")))
}

/// Decade-of-birth label such as `1960s`.
pub fn cohort_label(birth_year: i32) -> String {
    format!("{}s", birth_year.div_euclid(10) * 10)
}

/// Generate respondents according to `config`.
pub fn simulate_survey(config: &SimulationConfig) -> Result<Vec<Observation>, DataError> {
    if config.years.is_empty() {
        return Err(DataError::Schema("at least one survey year is required".into()));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let state_effect = normal(0.0, config.state_sd)?;
    let slope_effect = normal(0.0, config.state_slope_sd)?;
    let cohort_effect = normal(0.0, config.cohort_sd)?;
    let noise = normal(0.0, config.residual_sd)?;
    let age_tail = Gamma::new(2.0, 1.0 / 12.0)
        .map_err(|e| DataError::Schema(format!("invalid gamma: {e}")))?;

    let state_intercepts: Vec<f64> = STATES.iter().map(|_| rng.sample(&state_effect)).collect();
    let state_slopes: Vec<f64> = STATES.iter().map(|_| rng.sample(&slope_effect)).collect();
    // Zipf-like sizes: a few large states, many small ones.
    let state_weights: Vec<f64> = (0..STATES.len()).map(|i| 1.0 / (i as f64 + 1.0).powf(0.9)).collect();
    let state_pick = WeightedIndex::<f64>::new(&state_weights)
        .map_err(|e| DataError::Schema(format!("invalid weights: {e}")))?;
    let party_pick = weighted(&PARTIES.map(|(label, share, _)| (label, share)))?;
    let race_pick = weighted(&RACES)?;

    let mut cohort_intercepts: std::collections::HashMap<String, f64> = Default::default();
    let mut out = Vec::with_capacity(config.n_respondents);

    for i in 0..config.n_respondents {
        let state_idx = if i < STATES.len() { i } else { state_pick.sample(&mut rng) };
        let (party, _, party_shift) = PARTIES[party_pick.sample(&mut rng)];
        let race = RACES[race_pick.sample(&mut rng)].0;
        let year = config.years[rng.gen_range(0..config.years.len())];
        let age = (18.0 + rng.sample(&age_tail)).min(95.0).round();
        let cohort = cohort_label(year - age as i32);
        let cohort_shift = *cohort_intercepts
            .entry(cohort.clone())
            .or_insert_with(|| rng.sample(&cohort_effect));

        let centered_age = age - 45.0;
        let base = 50.0
            + 0.1 * centered_age
            + state_intercepts[state_idx]
            + state_slopes[state_idx] * centered_age
            + cohort_shift;
        let therm_dem = (base + party_shift + rng.sample(&noise)).clamp(0.0, 100.0);
        let therm_rep = (100.0 - base - party_shift * 0.9 + rng.sample(&noise)).clamp(0.0, 100.0);

        out.push(Observation {
            partyid: party.to_string(),
            age,
            female: rng.gen_bool(0.52),
            race: race.to_string(),
            therm_dem,
            therm_rep,
            state: STATES[state_idx].to_string(),
            year,
            cohort,
        });
    }

    debug!(
        "Simulated {} respondents across {} cohorts",
        out.len(),
        cohort_intercepts.len()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_state_present() {
        let config = SimulationConfig {
            n_respondents: 300,
            ..Default::default()
        };
        let obs = simulate_survey(&config).unwrap();
        assert_eq!(obs.len(), 300);
        let states: HashSet<&str> = obs.iter().map(|o| o.state.as_str()).collect();
        assert_eq!(states.len(), 50);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let config = SimulationConfig {
            n_respondents: 80,
            ..Default::default()
        };
        assert_eq!(simulate_survey(&config).unwrap(), simulate_survey(&config).unwrap());
    }

    #[test]
    fn test_value_ranges() {
        let obs = simulate_survey(&SimulationConfig::default()).unwrap();
        for o in &obs {
            assert!((18.0..=95.0).contains(&o.age));
            assert!((0.0..=100.0).contains(&o.therm_dem));
            assert!((0.0..=100.0).contains(&o.therm_rep));
            assert!(o.cohort.ends_with('s'));
        }
        // Right skew: mean above median.
        let mut ages: Vec<f64> = obs.iter().map(|o| o.age).collect();
        ages.sort_by(|a, b| a.total_cmp(b));
        let mean = ages.iter().sum::<f64>() / ages.len() as f64;
        assert!(mean > ages[ages.len() / 2]);
    }

    #[test]
    fn test_cohort_label() {
        assert_eq!(cohort_label(1967), "1960s");
        assert_eq!(cohort_label(2000), "2000s");
    }
}
