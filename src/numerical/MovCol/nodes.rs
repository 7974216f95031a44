//! Gauss–Legendre and Gauss–Lobatto nodes on the reference element [0, 1].
//!
//! Gauss nodes are the roots of P_n(ξ) and come from the `gauss-quad` Legendre rule.
//! Lobatto nodes are the roots of (1-ξ²)P'_n(ξ), include both ends and are found by Newton
//! iteration on [-1, 1]. Both are mapped to s = (ξ + 1)/2.
use crate::numerical::MovCol::errors::MovColError;
use gauss_quad::GaussLegendre;
use std::f64::consts::PI;

const NEWTON_MAXITER: usize = 100;
const NEWTON_TOL: f64 = 1e-15;

/// Legendre polynomial P_n(x) and its derivative via the three-term recurrence
/// (n+1) P_{n+1} = (2n+1) x P_n - n P_{n-1}.
pub fn legendre_and_derivative(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1.0, 0.0);
    }
    let mut p_prev = 1.0;
    let mut p_curr = x;
    for k in 1..n {
        let p_next = ((2 * k + 1) as f64 * x * p_curr - k as f64 * p_prev) / (k + 1) as f64;
        p_prev = p_curr;
        p_curr = p_next;
    }
    let dp = if (x - 1.0).abs() < 1e-14 {
        (n * (n + 1)) as f64 / 2.0
    } else if (x + 1.0).abs() < 1e-14 {
        let sign = if n % 2 == 0 { -1.0 } else { 1.0 };
        sign * (n * (n + 1)) as f64 / 2.0
    } else {
        n as f64 * (x * p_curr - p_prev) / (x * x - 1.0)
    };
    (p_curr, dp)
}

/// `n` Gauss–Legendre nodes in [0, 1], ascending, taken from the `gauss-quad` rule.
pub fn gauss_nodes(n: usize) -> Result<Vec<f64>, MovColError> {
    let rule = GaussLegendre::new(n).map_err(|e| {
        MovColError::NumericDegeneracy(format!("Failed to create Gauss-Legendre rule: {:?}", e))
    })?;
    let mut nodes: Vec<f64> = rule.nodes().map(|&xi| 0.5 * (xi + 1.0)).collect();
    nodes.sort_by(|a, b| a.total_cmp(b));
    Ok(nodes)
}

/// `n + 1` Gauss–Lobatto nodes in [0, 1], ascending, with exact endpoints.
pub fn lobatto_nodes(n: usize) -> Vec<f64> {
    let mut nodes = Vec::with_capacity(n + 1);
    nodes.push(0.0);
    for j in 1..n {
        // Chebyshev–Lobatto initial guess
        let mut x = -(PI * j as f64 / n as f64).cos();
        for _ in 0..NEWTON_MAXITER {
            let (p, dp) = legendre_and_derivative(n, x);
            let update = (1.0 - x * x) * dp / ((n * (n + 1)) as f64 * p);
            x += update;
            if update.abs() < NEWTON_TOL {
                break;
            }
        }
        nodes.push(0.5 * (x + 1.0));
    }
    nodes.push(1.0);
    nodes
}
