//! Likelihood-ratio tests between nested mixed models.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::info;

use crate::error::{MixlmError, Result};
use crate::lmm::Criterion;
use crate::model::FittedModel;

/// Relative tolerance when checking that two fits saw the same response.
const SAME_DATA_TOL: f64 = 1e-8;

/// Result of a likelihood-ratio test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LrtResult {
    pub simpler: String,
    pub complex: String,
    pub simpler_params: usize,
    pub complex_params: usize,
    pub simpler_log_likelihood: f64,
    pub complex_log_likelihood: f64,
    pub simpler_aic: f64,
    pub complex_aic: f64,
    /// 2 (ll_complex - ll_simpler), floored at zero.
    pub statistic: f64,
    pub df: usize,
    pub p_value: f64,
}

impl fmt::Display for LrtResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model 1: {}", self.simpler)?;
        writeln!(f, "Model 2: {}", self.complex)?;
        writeln!(
            f,
            "{:<8} {:>6} {:>10} {:>10} {:>10} {:>5} {:>12}",
            "", "npar", "AIC", "logLik", "Chisq", "Df", "Pr(>Chisq)"
        )?;
        writeln!(
            f,
            "{:<8} {:>6} {:>10.2} {:>10.2}",
            "Model 1", self.simpler_params, self.simpler_aic, self.simpler_log_likelihood
        )?;
        write!(
            f,
            "{:<8} {:>6} {:>10.2} {:>10.2} {:>10.4} {:>5} {:>12.4e}",
            "Model 2",
            self.complex_params,
            self.complex_aic,
            self.complex_log_likelihood,
            self.statistic,
            self.df,
            self.p_value
        )
    }
}

/// Identity of one covariance parameter: (group, parameter, parameter).
/// Diagonal entries are variances, off-diagonal entries covariances.
pub type CovarianceKey = (String, String, String);

/// Covariance parameters a model estimates.
pub fn covariance_keys(model: &FittedModel) -> BTreeSet<CovarianceKey> {
    let mut keys = BTreeSet::new();
    for vc in &model.variance_components {
        for (i, a) in vc.coefficients.iter().enumerate() {
            for b in &vc.coefficients[i..] {
                if a != b && !vc.correlated {
                    continue;
                }
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                keys.insert((vc.group.clone(), lo.clone(), hi.clone()));
            }
        }
    }
    keys
}

/// True when every parameter of `simpler` is also estimated by `complex`
/// and `complex` has strictly more parameters.
pub fn is_nested(simpler: &FittedModel, complex: &FittedModel) -> bool {
    let fixed_a: BTreeSet<String> = simpler.fixed_names().into_iter().collect();
    let fixed_b: BTreeSet<String> = complex.fixed_names().into_iter().collect();
    fixed_a.is_subset(&fixed_b)
        && covariance_keys(simpler).is_subset(&covariance_keys(complex))
        && simpler.n_params() < complex.n_params()
}

fn same_response(a: &FittedModel, b: &FittedModel) -> bool {
    let (ya, yb) = (a.response(), b.response());
    ya.len() == yb.len()
        && ya
            .iter()
            .zip(&yb)
            .all(|(x, y)| (x - y).abs() <= SAME_DATA_TOL * x.abs().max(y.abs()).max(1.0))
}

/// Likelihood-ratio test of two nested ML fits of the same data.
///
/// The models may be passed in either order; the one with fewer parameters
/// is treated as the null model. Fails with
/// [`MixlmError::InvalidComparison`] when either fit used REML, the fits
/// saw different data, the parameter counts are equal, or neither model is
/// nested in the other.
pub fn likelihood_ratio_test(a: &FittedModel, b: &FittedModel) -> Result<LrtResult> {
    for m in [a, b] {
        if m.criterion != Criterion::Ml {
            return Err(MixlmError::InvalidComparison(format!(
                "'{}' was fit by {}; refit both models by maximum likelihood",
                m.formula(),
                m.criterion
            )));
        }
    }
    if a.spec.response != b.spec.response {
        return Err(MixlmError::InvalidComparison(format!(
            "models have different responses ('{}' and '{}')",
            a.spec.response, b.spec.response
        )));
    }
    if a.n_obs != b.n_obs || !same_response(a, b) {
        return Err(MixlmError::InvalidComparison(format!(
            "models were not fit to the same observations ({} and {} rows)",
            a.n_obs, b.n_obs
        )));
    }

    let (simpler, complex) = if a.n_params() <= b.n_params() { (a, b) } else { (b, a) };
    let df = complex.n_params() - simpler.n_params();
    if df == 0 {
        return Err(MixlmError::InvalidComparison(format!(
            "both models estimate {} parameters; nothing to test",
            simpler.n_params()
        )));
    }
    if !is_nested(simpler, complex) {
        return Err(MixlmError::InvalidComparison(format!(
            "'{}' is not nested in '{}'",
            simpler.formula(),
            complex.formula()
        )));
    }

    let statistic = (2.0 * (complex.log_likelihood - simpler.log_likelihood)).max(0.0);
    let chi2 = ChiSquared::new(df as f64)
        .map_err(|e| MixlmError::InvalidComparison(format!("chi-squared({}): {}", df, e)))?;
    let p_value = chi2.sf(statistic);
    info!(
        "LRT: chisq = {:.4} on {} df, p = {:.4e}",
        statistic, df, p_value
    );

    Ok(LrtResult {
        simpler: simpler.formula(),
        complex: complex.formula(),
        simpler_params: simpler.n_params(),
        complex_params: complex.n_params(),
        simpler_log_likelihood: simpler.log_likelihood,
        complex_log_likelihood: complex.log_likelihood,
        simpler_aic: simpler.aic(),
        complex_aic: complex.aic(),
        statistic,
        df,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ModelSpec;
    use crate::lmm::{FitConfig, ModelFitter};
    use mixlm_data::simulate::{simulate_survey, SimulationConfig};
    use mixlm_data::survey::observations_to_dataset;
    use mixlm_data::Dataset;

    fn survey() -> Dataset {
        let obs = simulate_survey(&SimulationConfig {
            n_respondents: 600,
            ..Default::default()
        })
        .unwrap();
        observations_to_dataset(&obs).unwrap()
    }

    fn fit(data: &Dataset, formula: &str, criterion: Criterion) -> FittedModel {
        let config = FitConfig::default().with_criterion(criterion);
        ModelFitter::new(config)
            .fit(data, &ModelSpec::parse(formula).unwrap())
            .unwrap()
    }

    #[test]
    fn test_covariance_keys() {
        let data = survey();
        let corr = fit(&data, "therm_dem ~ scale(age) + (1 + scale(age) | state)", Criterion::Ml);
        let uncorr = fit(&data, "therm_dem ~ scale(age) + (1 + scale(age) || state)", Criterion::Ml);
        assert_eq!(covariance_keys(&corr).len(), 3);
        assert_eq!(covariance_keys(&uncorr).len(), 2);
        assert!(covariance_keys(&uncorr).is_subset(&covariance_keys(&corr)));
        assert!(is_nested(&uncorr, &corr));
        assert!(!is_nested(&corr, &uncorr));
    }

    #[test]
    fn test_random_intercept_vs_ols() {
        let data = survey();
        let ols = fit(&data, "therm_dem ~ scale(age) + partyid", Criterion::Ml);
        let mixed = fit(&data, "therm_dem ~ scale(age) + partyid + (1 | state)", Criterion::Ml);
        let res = likelihood_ratio_test(&mixed, &ols).unwrap();
        assert_eq!(res.df, 1);
        assert_eq!(res.simpler, ols.formula());
        assert!(res.statistic >= 0.0);
        assert!((0.0..=1.0).contains(&res.p_value));
        let text = res.to_string();
        assert!(text.contains("Pr(>Chisq)"));
    }

    #[test]
    fn test_identical_models_rejected() {
        let data = survey();
        let m = fit(&data, "therm_dem ~ scale(age) + (1 | state)", Criterion::Ml);
        assert!(matches!(
            likelihood_ratio_test(&m, &m.clone()),
            Err(MixlmError::InvalidComparison(_))
        ));
    }

    #[test]
    fn test_reml_rejected() {
        let data = survey();
        let a = fit(&data, "therm_dem ~ scale(age)", Criterion::Reml);
        let b = fit(&data, "therm_dem ~ scale(age) + (1 | state)", Criterion::Reml);
        let err = likelihood_ratio_test(&a, &b).unwrap_err();
        assert!(err.to_string().contains("maximum likelihood"));
    }

    #[test]
    fn test_non_nested_rejected() {
        let data = survey();
        let a = fit(&data, "therm_dem ~ scale(age) + (1 | state)", Criterion::Ml);
        let b = fit(&data, "therm_dem ~ partyid + female + (1 | cohort)", Criterion::Ml);
        assert!(matches!(
            likelihood_ratio_test(&a, &b),
            Err(MixlmError::InvalidComparison(_))
        ));
    }

    #[test]
    fn test_different_response_rejected() {
        let data = survey();
        let a = fit(&data, "therm_dem ~ scale(age)", Criterion::Ml);
        let b = fit(&data, "therm_rep ~ scale(age) + (1 | state)", Criterion::Ml);
        assert!(likelihood_ratio_test(&a, &b).is_err());
    }
}
