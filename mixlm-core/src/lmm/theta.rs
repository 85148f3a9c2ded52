//! Relative covariance factor Λθ.
//!
//! Each random block owns a k x k lower-triangular template T. Correlated
//! blocks store T's lower triangle column by column in θ; independent blocks
//! store only the diagonal. Λθ repeats T once per grouping level.

use mixlm_linalg::DenseMatrix;

use crate::design::RandomBlock;

/// Number of θ entries a block contributes.
pub fn n_theta(block: &RandomBlock) -> usize {
    let k = block.dim();
    if block.correlated {
        k * (k + 1) / 2
    } else {
        k
    }
}

/// (row, col) of each θ entry within the block's template, in θ order.
pub fn template_positions(block: &RandomBlock) -> Vec<(usize, usize)> {
    let k = block.dim();
    if block.correlated {
        (0..k).flat_map(|j| (j..k).map(move |i| (i, j))).collect()
    } else {
        (0..k).map(|i| (i, i)).collect()
    }
}

/// Lower bounds: 0 on template diagonals, unbounded off the diagonal.
pub fn lower_bounds(blocks: &[RandomBlock]) -> Vec<f64> {
    blocks
        .iter()
        .flat_map(template_positions)
        .map(|(i, j)| if i == j { 0.0 } else { f64::NEG_INFINITY })
        .collect()
}

/// Identity templates.
pub fn initial_theta(blocks: &[RandomBlock]) -> Vec<f64> {
    blocks
        .iter()
        .flat_map(template_positions)
        .map(|(i, j)| if i == j { 1.0 } else { 0.0 })
        .collect()
}

/// Whether each θ entry sits on a template diagonal.
pub fn diagonal_mask(blocks: &[RandomBlock]) -> Vec<bool> {
    blocks
        .iter()
        .flat_map(template_positions)
        .map(|(i, j)| i == j)
        .collect()
}

/// Readable θ labels such as `state.(Intercept)` or `state.age.(Intercept)`.
pub fn theta_names(blocks: &[RandomBlock]) -> Vec<String> {
    let mut names = Vec::new();
    for block in blocks {
        for (i, j) in template_positions(block) {
            if i == j {
                names.push(format!("{}.{}", block.group, block.coefficients[i]));
            } else {
                names.push(format!(
                    "{}.{}.{}",
                    block.group, block.coefficients[i], block.coefficients[j]
                ));
            }
        }
    }
    names
}

/// Split θ into one template per block.
pub fn templates(blocks: &[RandomBlock], theta: &[f64]) -> Vec<DenseMatrix> {
    let mut out = Vec::with_capacity(blocks.len());
    let mut pos = 0;
    for block in blocks {
        let k = block.dim();
        let mut t = DenseMatrix::zeros(k, k);
        for (i, j) in template_positions(block) {
            t.set(i, j, theta[pos]);
            pos += 1;
        }
        out.push(t);
    }
    out
}

/// Dense block-diagonal Λθ (q x q).
pub fn lambda(blocks: &[RandomBlock], theta: &[f64]) -> DenseMatrix {
    let q: usize = blocks.iter().map(|b| b.n_columns()).sum();
    let mut lam = DenseMatrix::zeros(q, q);
    for (block, t) in blocks.iter().zip(templates(blocks, theta)) {
        let k = block.dim();
        for level in 0..block.n_levels() {
            let base = block.offset + level * k;
            for i in 0..k {
                for j in 0..=i {
                    lam.set(base + i, base + j, t.get(i, j));
                }
            }
        }
    }
    lam
}

/// Relative covariance T T' of a template (multiply by σ² for the covariance).
pub fn relative_covariance(t: &DenseMatrix) -> DenseMatrix {
    t.mat_mul(&t.transpose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Variable;

    fn block(k_slopes: usize, correlated: bool, levels: usize, offset: usize) -> RandomBlock {
        let slopes: Vec<Variable> = (0..k_slopes).map(|i| Variable::raw(&format!("x{}", i))).collect();
        let mut coefficients = vec!["(Intercept)".to_string()];
        coefficients.extend(slopes.iter().map(|v| v.to_string()));
        RandomBlock {
            group: "g".into(),
            levels: (0..levels).map(|l| format!("L{}", l)).collect(),
            coefficients,
            intercept: true,
            slopes,
            correlated,
            offset,
        }
    }

    #[test]
    fn test_counts_and_bounds() {
        let blocks = vec![block(1, true, 3, 0), block(1, false, 2, 6)];
        assert_eq!(n_theta(&blocks[0]), 3);
        assert_eq!(n_theta(&blocks[1]), 2);
        let lower = lower_bounds(&blocks);
        assert_eq!(lower, vec![0.0, f64::NEG_INFINITY, 0.0, 0.0, 0.0]);
        assert_eq!(initial_theta(&blocks), vec![1.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(
            theta_names(&blocks)[1],
            "g.x0.(Intercept)"
        );
    }

    #[test]
    fn test_lambda_is_block_diagonal() {
        let blocks = vec![block(1, true, 2, 0)];
        let lam = lambda(&blocks, &[2.0, 0.5, 3.0]);
        assert_eq!(lam.nrows(), 4);
        assert_eq!(lam.get(0, 0), 2.0);
        assert_eq!(lam.get(1, 0), 0.5);
        assert_eq!(lam.get(1, 1), 3.0);
        assert_eq!(lam.get(0, 1), 0.0);
        assert_eq!(lam.get(3, 2), 0.5);
        assert_eq!(lam.get(2, 1), 0.0);
    }

    #[test]
    fn test_relative_covariance() {
        let blocks = vec![block(1, true, 1, 0)];
        let t = &templates(&blocks, &[1.0, 2.0, 3.0])[0];
        let c = relative_covariance(t);
        assert_eq!(c.get(0, 0), 1.0);
        assert_eq!(c.get(1, 0), 2.0);
        assert_eq!(c.get(1, 1), 13.0);
    }
}
