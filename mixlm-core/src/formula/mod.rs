//! Model specifications in lme4 formula syntax.
//!
//! `therm_dem ~ scale(age) + female + partyid + (1 + scale(age) | state) + (1 | cohort)`
//!
//! - `a:b` is an interaction, `a*b` expands to `a + b + a:b`.
//! - `scale(x)` standardizes `x` with constants learned at fit time.
//! - `- 1` or `+ 0` removes the intercept.
//! - `(expr | g)` is a random-effect term with correlated parameters,
//!   `(expr || g)` one with independent parameters.

mod parser;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MixlmError, Result};

/// Label of the intercept column, fixed or random.
pub const INTERCEPT: &str = "(Intercept)";

/// A data column referenced by a formula, optionally standardized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub scaled: bool,
}

impl Variable {
    pub fn raw(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scaled: false,
        }
    }

    pub fn scaled(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scaled: true,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scaled {
            write!(f, "scale({})", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// A fixed-effect term: one variable or an interaction of several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedTerm {
    pub factors: Vec<Variable>,
}

impl FixedTerm {
    pub fn main(var: Variable) -> Self {
        Self { factors: vec![var] }
    }

    fn same_variables(&self, other: &FixedTerm) -> bool {
        self.factors.len() == other.factors.len()
            && self.factors.iter().all(|f| other.factors.contains(f))
    }
}

impl fmt::Display for FixedTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.factors.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", parts.join(":"))
    }
}

/// A random-effect term: parameters that vary across levels of `group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomTerm {
    pub intercept: bool,
    pub slopes: Vec<Variable>,
    pub group: String,
    /// Whether all covariances between the term's parameters are estimated.
    pub correlated: bool,
}

impl RandomTerm {
    pub fn intercept_only(group: &str) -> Self {
        Self {
            intercept: true,
            slopes: Vec::new(),
            group: group.to_string(),
            correlated: true,
        }
    }

    /// Names of the varying parameters, intercept first.
    pub fn coefficient_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.dim());
        if self.intercept {
            names.push(INTERCEPT.to_string());
        }
        names.extend(self.slopes.iter().map(|v| v.to_string()));
        names
    }

    /// Number of varying parameters per level.
    pub fn dim(&self) -> usize {
        self.slopes.len() + usize::from(self.intercept)
    }

    /// Number of covariance parameters this term estimates.
    pub fn n_covariance_params(&self) -> usize {
        let k = self.dim();
        if self.correlated {
            k * (k + 1) / 2
        } else {
            k
        }
    }
}

impl fmt::Display for RandomTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        parts.push(if self.intercept { "1" } else { "0" }.to_string());
        parts.extend(self.slopes.iter().map(|v| v.to_string()));
        let bar = if self.correlated { "|" } else { "||" };
        write!(f, "({} {} {})", parts.join(" + "), bar, self.group)
    }
}

/// A parsed and validated model formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub response: String,
    pub intercept: bool,
    pub fixed: Vec<FixedTerm>,
    pub random: Vec<RandomTerm>,
}

impl ModelSpec {
    /// Parse and validate a formula string.
    pub fn parse(formula: &str) -> Result<Self> {
        let spec = parser::parse_formula(formula)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check the structural invariants of the specification.
    pub fn validate(&self) -> Result<()> {
        for term in &self.random {
            if term.dim() == 0 {
                return Err(MixlmError::Specification(format!(
                    "random term {} has no varying parameters",
                    term
                )));
            }
            if self
                .fixed
                .iter()
                .any(|t| t.factors.iter().any(|v| v.name == term.group))
            {
                return Err(MixlmError::Specification(format!(
                    "grouping key '{}' also appears as a fixed effect",
                    term.group
                )));
            }
            if term.slopes.iter().any(|v| v.name == term.group) {
                return Err(MixlmError::Specification(format!(
                    "grouping key '{}' cannot vary within its own term",
                    term.group
                )));
            }
        }

        let mut seen: Vec<(&str, String)> = Vec::new();
        for term in &self.random {
            for coef in term.coefficient_names() {
                if seen.iter().any(|(g, c)| *g == term.group && *c == coef) {
                    return Err(MixlmError::Specification(format!(
                        "'{}' varies by '{}' in more than one random term",
                        coef, term.group
                    )));
                }
                seen.push((term.group.as_str(), coef));
            }
        }

        for (i, a) in self.fixed.iter().enumerate() {
            if self.fixed[..i].iter().any(|b| a.same_variables(b)) {
                return Err(MixlmError::Specification(format!(
                    "fixed-effect term {} is listed twice",
                    a
                )));
            }
        }

        if self.response_in_predictors() {
            return Err(MixlmError::Specification(format!(
                "response '{}' also appears as a predictor",
                self.response
            )));
        }
        Ok(())
    }

    fn response_in_predictors(&self) -> bool {
        self.fixed
            .iter()
            .flat_map(|t| t.factors.iter())
            .chain(self.random.iter().flat_map(|t| t.slopes.iter()))
            .any(|v| v.name == self.response)
            || self.random.iter().any(|t| t.group == self.response)
    }

    /// Every data column the model reads, response first, without duplicates.
    pub fn variables(&self) -> Vec<String> {
        let mut vars = vec![self.response.clone()];
        let mut add = |name: &str| {
            if !vars.iter().any(|v| v == name) {
                vars.push(name.to_string());
            }
        };
        for term in &self.fixed {
            for v in &term.factors {
                add(&v.name);
            }
        }
        for term in &self.random {
            for v in &term.slopes {
                add(&v.name);
            }
            add(&term.group);
        }
        vars
    }

    /// Variables wrapped in `scale()` anywhere in the formula.
    pub fn scaled_variables(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let all = self
            .fixed
            .iter()
            .flat_map(|t| t.factors.iter())
            .chain(self.random.iter().flat_map(|t| t.slopes.iter()));
        for v in all {
            if v.scaled && !out.contains(&v.name) {
                out.push(v.name.clone());
            }
        }
        out
    }

    /// Total number of covariance parameters across random terms.
    pub fn n_covariance_params(&self) -> usize {
        self.random.iter().map(|t| t.n_covariance_params()).sum()
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if !self.intercept {
            parts.push("0".to_string());
        }
        parts.extend(self.fixed.iter().map(|t| t.to_string()));
        parts.extend(self.random.iter().map(|t| t.to_string()));
        if parts.is_empty() {
            parts.push("1".to_string());
        }
        write!(f, "{} ~ {}", self.response, parts.join(" + "))
    }
}
