//! Linear mixed model estimation by profiled (restricted) maximum likelihood.

pub mod checks;
pub mod deviance;
pub mod fit;
pub mod theta;

pub use checks::ConvergenceReport;
pub use deviance::{Criterion, DevianceProblem};
pub use fit::{FitConfig, ModelFitter};
