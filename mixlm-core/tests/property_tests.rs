//! Property-based tests using proptest.
//!
//! These check invariants that must hold for any reasonable grouped data
//! rather than specific numerical values:
//!   - fixed-only fits agree with least squares
//!   - likelihood-ratio p-values stay in [0, 1]
//!   - one BLUP per observed grouping level
//!   - prediction grids expand to the product of their axis lengths

use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use mixlm_core::compare::likelihood_ratio_test;
use mixlm_core::design::build_model_frame;
use mixlm_core::formula::ModelSpec;
use mixlm_core::lmm::fit::ordinary_least_squares;
use mixlm_core::lmm::{Criterion, FitConfig, ModelFitter};
use mixlm_core::predict::{predict_grid, PREDICTION_COLUMN};
use mixlm_core::ranef::random_effects;
use mixlm_data::{Column, Dataset, Factor, PredictionGrid};

/// Grouped data: y = 2 + 0.7 x1 - 0.3 x2 + group shift + noise.
fn grouped_data(seed: u64, n_groups: usize, per_group: usize, group_sd: f64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (mut y, mut x1, mut x2, mut g) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for group in 0..n_groups {
        let shift = group_sd * (rng.gen::<f64>() * 2.0 - 1.0);
        for _ in 0..per_group {
            let a: f64 = rng.gen_range(-2.0..2.0);
            let b: f64 = rng.gen_range(0.0..10.0);
            x1.push(a);
            x2.push(b);
            y.push(2.0 + 0.7 * a - 0.3 * b + shift + rng.gen_range(-1.0..1.0));
            g.push(format!("grp{:03}", group));
        }
    }
    Dataset::new()
        .with_column("y", Column::Numeric(y))
        .unwrap()
        .with_column("x1", Column::Numeric(x1))
        .unwrap()
        .with_column("x2", Column::Numeric(x2))
        .unwrap()
        .with_column("g", Column::Categorical(Factor::from_strings(&g)))
        .unwrap()
}

// ---------------------------------------------------------------------------
// 1. Without random terms the fit is least squares
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn prop_fixed_only_matches_ols(
        seed in 0u64..1000,
        n_groups in 3usize..8,
        per_group in 4usize..10,
    ) {
        let data = grouped_data(seed, n_groups, per_group, 1.0);
        let spec = ModelSpec::parse("y ~ x1 + x2").unwrap();
        let model = ModelFitter::default().fit(&data, &spec).unwrap();
        let frame = build_model_frame(&data, &spec).unwrap();
        let ols = ordinary_least_squares(&frame.x, &frame.y).unwrap();
        for (a, b) in model.beta.iter().zip(&ols) {
            prop_assert!((a - b).abs() <= 1e-8 * b.abs().max(1.0), "{} vs {}", a, b);
        }
    }
}

// ---------------------------------------------------------------------------
// 2. LRT p-values lie in [0, 1]
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn prop_lrt_pvalue_in_unit_interval(
        seed in 0u64..1000,
        n_groups in 4usize..10,
        group_sd in 0.0f64..3.0,
    ) {
        let data = grouped_data(seed, n_groups, 8, group_sd);
        let fitter = ModelFitter::new(FitConfig::default().with_criterion(Criterion::Ml));
        let ols = fitter.fit(&data, &ModelSpec::parse("y ~ x1 + x2").unwrap()).unwrap();
        // Draws with group_sd near 0 end on the boundary; those fits must still succeed.
        let mixed = fitter
            .fit(&data, &ModelSpec::parse("y ~ x1 + x2 + (1 | g)").unwrap())
            .map_err(|e| TestCaseError::fail(format!("seed {}: {}", seed, e)))?;
        let res = likelihood_ratio_test(&ols, &mixed).unwrap();
        prop_assert!(res.p_value >= 0.0 && res.p_value <= 1.0, "p = {}", res.p_value);
        prop_assert!(res.statistic >= 0.0);
        prop_assert_eq!(res.df, 1);
    }
}

// ---------------------------------------------------------------------------
// 3. One BLUP per grouping level
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn prop_blup_count_equals_levels(
        seed in 0u64..1000,
        n_groups in 2usize..15,
        per_group in 3usize..8,
    ) {
        let data = grouped_data(seed, n_groups, per_group, 2.0);
        let spec = ModelSpec::parse("y ~ x1 + (1 | g)").unwrap();
        let model = ModelFitter::default()
            .fit(&data, &spec)
            .map_err(|e| TestCaseError::fail(format!("seed {}: {}", seed, e)))?;
        let tables = random_effects(&model);
        prop_assert_eq!(tables.len(), 1);
        prop_assert_eq!(tables[0].n_levels(), n_groups);
        prop_assert_eq!(model.random_effects.len(), n_groups);
        prop_assert!(tables[0].cond_sd.iter().all(|r| r[0] >= 0.0));
    }
}

// ---------------------------------------------------------------------------
// 4. Prediction grid size is the product of axis lengths
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    #[test]
    fn prop_grid_size(
        n_x1 in 1usize..6,
        n_x2 in 1usize..4,
        n_levels in 1usize..5,
    ) {
        let data = grouped_data(99, 6, 10, 2.0);
        let spec = ModelSpec::parse("y ~ x1 + scale(x2) + (1 | g)").unwrap();
        let model = ModelFitter::default().fit(&data, &spec).unwrap();
        let levels: Vec<String> = (0..n_levels).map(|i| format!("grp{:03}", i)).collect();
        let grid = PredictionGrid::new()
            .numeric("x1", (0..n_x1).map(|i| i as f64 * 0.5).collect())
            .numeric("x2", (0..n_x2).map(|i| i as f64).collect())
            .levels("g", levels);
        let out = predict_grid(&model, &grid, true).unwrap();
        prop_assert_eq!(out.n_rows(), n_x1 * n_x2 * n_levels);
        let pred = out.numeric(PREDICTION_COLUMN).unwrap();
        prop_assert!(pred.iter().all(|p| p.is_finite()));
    }
}
