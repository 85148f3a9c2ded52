//! Human-readable model summaries.

use std::fmt::Write as _;

use super::fitted::FittedModel;

/// Summary of a fitted model (for display).
pub fn model_summary(model: &FittedModel) -> String {
    let mut out = String::new();
    let criterion = match model.criterion {
        crate::lmm::Criterion::Reml => "REML criterion at convergence",
        crate::lmm::Criterion::Ml => "Deviance",
    };
    let _ = writeln!(out, "Linear mixed model fit by {}", model.criterion);
    let _ = writeln!(out, "Formula: {}", model.formula());
    let _ = writeln!(
        out,
        "Optimizer: {} ({} evaluations)",
        model.outcome.optimizer, model.outcome.evaluations
    );
    if model.n_dropped > 0 {
        let _ = writeln!(out, "Rows dropped for missing values: {}", model.n_dropped);
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:>10} {:>10} {:>10} {:>10}",
        "AIC", "BIC", "logLik", "df.resid"
    );
    let _ = writeln!(
        out,
        "{:>10.1} {:>10.1} {:>10.1} {:>10}",
        model.aic(),
        model.bic(),
        model.log_likelihood,
        model.n_obs.saturating_sub(model.n_params())
    );
    let _ = writeln!(out, "{}: {:.1}", criterion, model.deviance);

    let _ = writeln!(out, "\nScaled residuals:");
    let q = model.scaled_residual_quantiles();
    let _ = writeln!(
        out,
        "{:>9} {:>9} {:>9} {:>9} {:>9}",
        "Min", "1Q", "Median", "3Q", "Max"
    );
    let _ = writeln!(
        out,
        "{:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>9.4}",
        q[0], q[1], q[2], q[3], q[4]
    );

    let _ = writeln!(out, "\nRandom effects:");
    let _ = writeln!(
        out,
        " {:<12} {:<20} {:>12} {:>10}  Corr",
        "Groups", "Name", "Variance", "Std.Dev."
    );
    for vc in &model.variance_components {
        for i in 0..vc.dim() {
            let group = if i == 0 { vc.group.as_str() } else { "" };
            let mut line = format!(
                " {:<12} {:<20} {:>12.4} {:>10.4}",
                group,
                vc.coefficients[i],
                vc.variance(i),
                vc.std_dev(i)
            );
            if vc.correlated {
                for j in 0..i {
                    let _ = write!(line, "  {:>6.3}", vc.correlation(i, j));
                }
            }
            let _ = writeln!(out, "{}", line.trim_end());
        }
    }
    let _ = writeln!(
        out,
        " {:<12} {:<20} {:>12.4} {:>10.4}",
        "Residual",
        "",
        model.sigma * model.sigma,
        model.sigma
    );
    let groups: Vec<String> = model
        .design
        .random
        .iter()
        .map(|b| format!("{}, {}", b.group, b.n_levels()))
        .collect();
    if groups.is_empty() {
        let _ = writeln!(out, "Number of obs: {}", model.n_obs);
    } else {
        let _ = writeln!(
            out,
            "Number of obs: {}, groups:  {}",
            model.n_obs,
            groups.join("; ")
        );
    }

    let _ = writeln!(out, "\nFixed effects:");
    let _ = writeln!(
        out,
        "{:<24} {:>11} {:>11} {:>8} {:>11} {:>11}",
        "", "Estimate", "Std. Error", "t value", "2.5 %", "97.5 %"
    );
    for fe in model.fixed_effects() {
        let _ = writeln!(
            out,
            "{:<24} {:>11.4} {:>11.4} {:>8.3} {:>11.4} {:>11.4}",
            fe.name, fe.estimate, fe.std_error, fe.t_value, fe.ci_lower, fe.ci_upper
        );
    }

    let _ = writeln!(out, "\nConvergence: {}", model.outcome.message);
    if let Some(g) = model.outcome.max_grad {
        let _ = writeln!(out, "max|grad| = {:.3e}", g);
    }
    for w in &model.warnings {
        let _ = writeln!(out, "Warning: {}", w);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ModelSpec;
    use crate::lmm::ModelFitter;
    use mixlm_data::simulate::{simulate_survey, SimulationConfig};
    use mixlm_data::survey::observations_to_dataset;

    #[test]
    fn test_summary_sections() {
        let obs = simulate_survey(&SimulationConfig {
            n_respondents: 300,
            ..Default::default()
        })
        .unwrap();
        let data = observations_to_dataset(&obs).unwrap();
        let spec = ModelSpec::parse("therm_dem ~ scale(age) + partyid + (1 | state)").unwrap();
        let model = ModelFitter::default().fit(&data, &spec).unwrap();
        let text = model_summary(&model);
        assert!(text.starts_with("Linear mixed model fit by REML"));
        assert!(text.contains("Formula: therm_dem ~ scale(age) + partyid + (1 | state)"));
        assert!(text.contains("Random effects:"));
        assert!(text.contains("state, 50"));
        assert!(text.contains("partyidRepublican"));
        assert!(text.contains("REML criterion at convergence"));
    }
}
