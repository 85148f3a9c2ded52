//! End-to-end tests on simulated survey data.
//!
//! Every fit runs on data from the seeded simulator, so results are
//! deterministic across runs.

use mixlm_core::formula::ModelSpec;
use mixlm_core::lmm::{Criterion, FitConfig, ModelFitter};
use mixlm_core::model::FittedModel;
use mixlm_data::simulate::{simulate_survey, SimulationConfig};
use mixlm_data::survey::observations_to_dataset;
use mixlm_data::Dataset;

fn survey(n: usize, seed: u64) -> Dataset {
    let obs = simulate_survey(&SimulationConfig {
        n_respondents: n,
        seed,
        ..Default::default()
    })
    .expect("simulation failed");
    observations_to_dataset(&obs).expect("dataset assembly failed")
}

fn fit(data: &Dataset, formula: &str, criterion: Criterion) -> FittedModel {
    let spec = ModelSpec::parse(formula).expect("bad formula");
    ModelFitter::new(FitConfig::default().with_criterion(criterion))
        .fit(data, &spec)
        .unwrap_or_else(|e| panic!("fit of {} failed: {}", formula, e))
}

mod fixed_only {
    use super::*;
    use mixlm_core::design::build_model_frame;
    use mixlm_core::lmm::fit::ordinary_least_squares;

    #[test]
    fn test_matches_ordinary_least_squares() {
        let data = survey(800, 7);
        for formula in [
            "therm_dem ~ age",
            "therm_dem ~ scale(age) + female + partyid + race",
            "therm_rep ~ partyid*female",
        ] {
            for criterion in [Criterion::Reml, Criterion::Ml] {
                let model = fit(&data, formula, criterion);
                let spec = ModelSpec::parse(formula).unwrap();
                let frame = build_model_frame(&data, &spec).unwrap();
                let ols = ordinary_least_squares(&frame.x, &frame.y).unwrap();
                for (a, b) in model.beta.iter().zip(&ols) {
                    assert!(
                        (a - b).abs() <= 1e-8 * b.abs().max(1.0),
                        "{} ({}): {} vs {}",
                        formula,
                        criterion,
                        a,
                        b
                    );
                }
            }
        }
    }
}

mod criteria {
    use super::*;
    use mixlm_data::Column;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// 20 groups of 10 with the same x values in every group, so the GLS
    /// estimate of β does not depend on the variance components.
    fn balanced() -> Dataset {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut y = Vec::new();
        let mut x = Vec::new();
        let mut g = Vec::new();
        for group in 0..20 {
            let shift: f64 = rng.gen_range(-3.0..3.0);
            for i in 0..10 {
                let xi = i as f64;
                x.push(xi);
                y.push(1.0 + 0.5 * xi + shift + rng.gen_range(-2.0..2.0));
                g.push(format!("g{:02}", group));
            }
        }
        Dataset::new()
            .with_column("y", Column::Numeric(y))
            .unwrap()
            .with_column("x", Column::Numeric(x))
            .unwrap()
            .with_column(
                "g",
                Column::Categorical(mixlm_data::Factor::from_strings(&g)),
            )
            .unwrap()
    }

    #[test]
    fn test_ml_and_reml_share_fixed_effects() {
        let data = balanced();
        let reml = fit(&data, "y ~ x + (1 | g)", Criterion::Reml);
        let ml = fit(&data, "y ~ x + (1 | g)", Criterion::Ml);
        for (a, b) in reml.beta.iter().zip(&ml.beta) {
            assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
        }
        // REML corrects the downward bias of ML variance estimates.
        assert!(reml.variance_components[0].variance(0) > ml.variance_components[0].variance(0));
    }
}

mod comparison {
    use super::*;
    use mixlm_core::compare::likelihood_ratio_test;
    use mixlm_core::MixlmError;

    #[test]
    fn test_identical_specifications_rejected() {
        let data = survey(600, 3);
        let a = fit(&data, "therm_dem ~ scale(age) + (1 | state)", Criterion::Ml);
        let b = fit(&data, "therm_dem ~ scale(age) + (1 | state)", Criterion::Ml);
        match likelihood_ratio_test(&a, &b) {
            Err(MixlmError::InvalidComparison(_)) => {}
            Ok(res) => assert_eq!(res.statistic, 0.0),
            Err(other) => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_uncorrelated_nested_in_correlated() {
        let data = survey(1200, 5);
        let uncorr = fit(
            &data,
            "therm_dem ~ scale(age) + (1 + scale(age) || state)",
            Criterion::Ml,
        );
        let corr = fit(
            &data,
            "therm_dem ~ scale(age) + (1 + scale(age) | state)",
            Criterion::Ml,
        );
        let res = likelihood_ratio_test(&corr, &uncorr).unwrap();
        assert_eq!(res.df, 1);
        assert_eq!(res.simpler, uncorr.formula());
        assert!((0.0..=1.0).contains(&res.p_value));
        // Freeing a parameter cannot lower the maximized likelihood.
        assert!(corr.log_likelihood >= uncorr.log_likelihood - 1e-3);
    }
}

mod optimizers {
    use super::*;
    use mixlm_core::optim::OptimizerKind;

    fn fit_with(data: &Dataset, formula: &str, optimizer: OptimizerKind) -> FittedModel {
        let spec = ModelSpec::parse(formula).unwrap();
        let config = FitConfig::default()
            .with_criterion(Criterion::Ml)
            .with_optimizer(optimizer);
        ModelFitter::new(config)
            .fit(data, &spec)
            .unwrap_or_else(|e| panic!("{} failed: {}", optimizer, e))
    }

    #[test]
    fn test_uncorrelated_slope_leaves_bound() {
        let data = survey(600, SimulationConfig::default().seed);
        let formula = "therm_dem ~ scale(age) + (1 + scale(age) || state)";
        let nm = fit_with(&data, formula, OptimizerKind::NelderMead);
        let bfgs = fit_with(&data, formula, OptimizerKind::Bfgs);
        assert!(
            (nm.deviance - bfgs.deviance).abs() < 1e-6,
            "nelder-mead {:.8} vs bfgs {:.8}",
            nm.deviance,
            bfgs.deviance
        );
        assert!(nm.theta[1] > 0.0, "slope variance stuck at the bound: {:?}", nm.theta);
        assert!(!nm.singular);
    }
}

mod blups {
    use super::*;
    use mixlm_core::ranef::random_effects;

    #[test]
    fn test_one_prediction_per_state_despite_imbalance() {
        let data = survey(900, 11);
        let states = data.factor("state").unwrap();
        let mut counts = std::collections::HashMap::new();
        for r in 0..states.len() {
            *counts.entry(states.label(r).unwrap().to_string()).or_insert(0usize) += 1;
        }
        assert_eq!(counts.len(), 50);
        let max = counts.values().max().unwrap();
        let min = counts.values().min().unwrap();
        assert!(max > &(5 * min), "simulated sizes should be imbalanced");

        let model = fit(&data, "therm_dem ~ scale(age) + partyid + (1 | state)", Criterion::Reml);
        let tables = random_effects(&model);
        assert_eq!(tables[0].n_levels(), 50);
        assert_eq!(tables[0].values.len(), 50);

        // Small states are shrunk harder: larger conditional SD.
        let sd_of = |state: &str| {
            let i = tables[0].levels.iter().position(|l| l == state).unwrap();
            tables[0].cond_sd[i][0]
        };
        let (big, _) = counts.iter().max_by_key(|(_, c)| **c).unwrap();
        let (small, _) = counts.iter().min_by_key(|(_, c)| **c).unwrap();
        assert!(sd_of(big) < sd_of(small));
    }
}

mod scaling {
    use super::*;
    use mixlm_core::predict::{predict_grid, PREDICTION_COLUMN};
    use mixlm_data::PredictionGrid;

    #[test]
    fn test_standardizing_age_preserves_predictions() {
        let data = survey(800, 19);
        let raw = fit(&data, "therm_dem ~ age + partyid + (1 | state)", Criterion::Reml);
        let scaled = fit(&data, "therm_dem ~ scale(age) + partyid + (1 | state)", Criterion::Reml);

        let s = scaled.design.scaling("age").unwrap();
        let slope = s.unscale_slope(scaled.coefficient("scale(age)").unwrap());
        assert!((slope - raw.coefficient("age").unwrap()).abs() < 1e-3);

        let grid = PredictionGrid::new()
            .numeric("age", vec![20.0, 40.0, 60.0, 85.0])
            .levels("partyid", vec!["Democrat", "Republican"])
            .levels("state", vec!["NY", "WY"]);
        let a = predict_grid(&raw, &grid, true).unwrap();
        let b = predict_grid(&scaled, &grid, true).unwrap();
        let (pa, pb) = (
            a.numeric(PREDICTION_COLUMN).unwrap(),
            b.numeric(PREDICTION_COLUMN).unwrap(),
        );
        for (x, y) in pa.iter().zip(pb) {
            assert!((x - y).abs() < 1e-2, "{} vs {}", x, y);
        }
    }
}

mod persistence {
    use super::*;
    use mixlm_core::model::serialization::{load_model, model_path, save_model};
    use mixlm_core::predict::predict;
    use mixlm_data::survey::load_survey;

    #[test]
    fn test_file_to_saved_model_to_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.tsv");
        survey(400, 23).write_tsv(&path).unwrap();

        let data = load_survey(&path).unwrap();
        assert_eq!(data.n_rows(), 400);
        let model = fit(&data, "therm_dem ~ scale(age) + female + (1 | cohort)", Criterion::Reml);

        let out = model_path(dir.path().join("m").to_str().unwrap());
        save_model(&model, &out).unwrap();
        let loaded = load_model(&out).unwrap();
        let p1 = predict(&model, &data, true).unwrap();
        let p2 = predict(&loaded, &data, true).unwrap();
        assert_eq!(p1, p2);
    }
}
