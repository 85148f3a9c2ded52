//! mixlm-core: Linear mixed models for clustered survey data
//!
//! Implements the modeling pipeline: lme4-style formulas, model matrices,
//! (RE)ML estimation of the profiled deviance, convergence diagnostics
//! across optimizers, BLUP extraction, likelihood-ratio tests, prediction
//! on covariate grids and model serialization.

pub mod compare;
pub mod design;
pub mod diagnose;
pub mod error;
pub mod formula;
pub mod lmm;
pub mod model;
pub mod optim;
pub mod predict;
pub mod ranef;

pub use compare::{likelihood_ratio_test, LrtResult};
pub use diagnose::{diagnose_convergence, OptimizerReport};
pub use error::{MixlmError, Result};
pub use formula::ModelSpec;
pub use lmm::{Criterion, FitConfig, ModelFitter};
pub use model::FittedModel;
pub use optim::{OptimControl, OptimizerKind};
pub use predict::{predict, predict_grid};
pub use ranef::{cluster_coefficients, random_effects, RanefTable};
