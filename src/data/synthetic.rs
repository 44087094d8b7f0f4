//! Synthetic Lexis snapshots from a known log-linear truth.
//!
//! Used by `imr simulate` to produce a realistic cache file without network
//! access, and by tests that need a dataset whose coefficients are known.
//!
//! Truth per `(country, cohort, sex)`:
//!
//! ```text
//! log m = base + trend·time + male·[sex = male] + country_i
//!       + post·(shift + country_shift_i)
//! ```
//!
//! Deaths are Poisson around `m · exposure`, split between the triangles.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};

use crate::domain::{CovariateScheme, ObservationRecord, Sex, Triangle};
use crate::error::AppError;
use crate::prep::derive;

/// Share of infant deaths that fall in the lower triangle.
const LOWER_DEATH_SHARE: f64 = 0.8;

/// Person-years lived in each triangle per birth.
const LOWER_EXPOSURE_PER_BIRTH: f64 = 0.47;
const UPPER_EXPOSURE_PER_BIRTH: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub countries: Vec<String>,
    pub reference: String,
    pub first_cohort: i32,
    pub last_cohort: i32,
    pub scheme: CovariateScheme,
    pub seed: u64,
    /// Births per sex and cohort in the reference country.
    pub births: f64,
    pub base_log_rate: f64,
    pub trend: f64,
    pub male_effect: f64,
    pub post_shift: f64,
}

impl SimulationConfig {
    /// Log-scale country effect; zero for the reference country.
    pub fn country_effect(&self, index: usize) -> f64 {
        if self.countries[index] == self.reference {
            return 0.0;
        }
        0.04 * (((index * 7) % 9) as f64 - 4.0)
    }

    /// Country-specific addition to the post-threshold shift.
    pub fn country_post_shift(&self, index: usize) -> f64 {
        if self.countries[index] == self.reference {
            return 0.0;
        }
        0.03 * (((index * 5) % 7) as f64 - 3.0)
    }

    /// True log-rate of one cell.
    pub fn true_log_rate(&self, index: usize, sex: Sex, cohort: i32) -> f64 {
        let c = derive(&self.countries[index], sex, cohort, &self.scheme);
        let male = if sex == Sex::Male { self.male_effect } else { 0.0 };
        self.base_log_rate
            + self.trend * c.time
            + male
            + self.country_effect(index)
            + c.post * (self.post_shift + self.country_post_shift(index))
    }
}

/// Generate lower/upper triangle rows for both sexes plus the `total` rows.
pub fn simulate_snapshot(config: &SimulationConfig) -> Result<Vec<ObservationRecord>, AppError> {
    if config.countries.is_empty() {
        return Err(AppError::new(2, "Simulation needs at least one country."));
    }
    if config.last_cohort < config.first_cohort {
        return Err(AppError::new(2, "Simulation cohort range is empty."));
    }
    if !(config.births.is_finite() && config.births > 0.0) {
        return Err(AppError::new(2, "Simulation births must be > 0."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut out = Vec::new();

    for (i, code) in config.countries.iter().enumerate() {
        // Larger and smaller populations, so exposures differ across countries.
        let births = config.births * (1.0 + 0.5 * (i % 4) as f64);
        for cohort in config.first_cohort..=config.last_cohort {
            let mut totals = [(0.0, 0.0); 2];
            for sex in Sex::MODELLED {
                let rate = config.true_log_rate(i, sex, cohort).exp();
                let lower_exposure = (births * LOWER_EXPOSURE_PER_BIRTH).round();
                let upper_exposure = (births * UPPER_EXPOSURE_PER_BIRTH).round();
                let expected = rate * (lower_exposure + upper_exposure);

                let lower_deaths = draw(&mut rng, expected * LOWER_DEATH_SHARE)?;
                let upper_deaths = draw(&mut rng, expected * (1.0 - LOWER_DEATH_SHARE))?;

                for (t, (triangle, deaths, exposures)) in [
                    (Triangle::Lower, lower_deaths, lower_exposure),
                    (Triangle::Upper, upper_deaths, upper_exposure),
                ]
                .into_iter()
                .enumerate()
                {
                    totals[t].0 += deaths;
                    totals[t].1 += exposures;
                    out.push(row(code, cohort, sex, triangle, deaths, exposures));
                }
            }
            out.push(row(code, cohort, Sex::Total, Triangle::Lower, totals[0].0, totals[0].1));
            out.push(row(code, cohort, Sex::Total, Triangle::Upper, totals[1].0, totals[1].1));
        }
    }

    Ok(out)
}

fn draw(rng: &mut StdRng, mean: f64) -> Result<f64, AppError> {
    if mean <= 0.0 {
        return Ok(0.0);
    }
    let poisson =
        Poisson::new(mean).map_err(|e| AppError::new(4, format!("Poisson distribution error: {e}")))?;
    Ok(poisson.sample(rng))
}

fn row(code: &str, cohort: i32, sex: Sex, triangle: Triangle, deaths: f64, exposures: f64) -> ObservationRecord {
    let year = match triangle {
        Triangle::Lower => cohort,
        Triangle::Upper => cohort + 1,
    };
    ObservationRecord {
        code: code.to_string(),
        cohort,
        year,
        sex,
        triangle,
        deaths,
        exposures,
    }
}
