//! # Collocation data
//!
//! One-time generation of everything the residual assemblers need for a given number of
//! collocation points per element `ns` (even, `ns >= 2`):
//!
//! - `ns` Gauss nodes (where the source term `F` is collocated) and `ns + 1` Lobatto nodes
//!   (where the flux `G` is sampled), both on the reference element `[0, 1]`;
//! - for every node `s` the Hermite tables `Qleft`, `Qright` of shape `(ns+1) × ns`:
//!   `Q[k, j]` is the k-th derivative at `s` of the j-th Hermite basis function of degree
//!   `2ns - 1` attached to the left (right) end of the element;
//! - the flux reconstruction matrix `AB = A⁻¹B`, where
//!   ```text
//!   A[j, k] = -∫_{lob_j}^{lob_{j+1}} L_k(s) ds      (L_k: Lagrange basis on the Gauss nodes)
//!   B       = I - superdiag(1)                      (ns × (ns+1))
//!   ```
//!   so that `F(gauss) = AB · G(lobatto)` collocates `F = dG/ds`. It is exact when `G` is a
//!   polynomial of degree `<= ns`.
use crate::numerical::MovCol::errors::MovColError;
use crate::numerical::MovCol::nodes::{gauss_nodes, lobatto_nodes};
use gauss_quad::GaussLegendre;
use log::info;
use nalgebra::DMatrix;

/// Fixed parametric location inside the reference element with its Hermite tables.
#[derive(Debug, Clone)]
pub struct CollocationPoint {
    pub s: f64,
    /// (ns+1) × ns, derivatives 0..=ns of the left-end basis functions at `s`
    pub Qleft: DMatrix<f64>,
    /// (ns+1) × ns, derivatives 0..=ns of the right-end basis functions at `s`
    pub Qright: DMatrix<f64>,
}

impl CollocationPoint {
    /// Builds the descriptor of `s` from the monomial coefficients of the Hermite basis
    /// (see [`hermite_basis_coefficients`]).
    pub fn new(ns: usize, s: f64, coefficients: &DMatrix<f64>) -> Self {
        let n_coef = 2 * ns;
        let mut Qleft = DMatrix::zeros(ns + 1, ns);
        let mut Qright = DMatrix::zeros(ns + 1, ns);
        for k in 0..=ns {
            for j in 0..ns {
                let mut left = 0.0;
                let mut right = 0.0;
                for m in 0..n_coef {
                    let dm = monomial_derivative(m, k, s);
                    left += coefficients[(m, j)] * dm;
                    right += coefficients[(m, ns + j)] * dm;
                }
                Qleft[(k, j)] = left;
                Qright[(k, j)] = right;
            }
        }
        CollocationPoint { s, Qleft, Qright }
    }
}

/// Immutable tables shared by every residual evaluation.
#[derive(Debug, Clone)]
pub struct CollocationData {
    pub ns: usize,
    pub gauss: Vec<CollocationPoint>,
    pub lobatto: Vec<CollocationPoint>,
    /// ns × (ns+1)
    pub AB: DMatrix<f64>,
    /// s = 0
    pub left: CollocationPoint,
    /// s = 1
    pub right: CollocationPoint,
    /// s = 1/2
    pub midpoint: CollocationPoint,
}

impl CollocationData {
    /// Builds the tables for `ns` collocation points. `ns` must be even and at least 2;
    /// callers validate this before construction.
    pub fn new(ns: usize) -> Result<Self, MovColError> {
        debug_assert!(ns >= 2 && ns % 2 == 0, "ns must be even and >= 2");
        let coefficients = hermite_basis_coefficients(ns)?;
        let gauss_s = gauss_nodes(ns)?;
        let lobatto_s = lobatto_nodes(ns);
        let gauss = gauss_s
            .iter()
            .map(|&s| CollocationPoint::new(ns, s, &coefficients))
            .collect();
        let lobatto = lobatto_s
            .iter()
            .map(|&s| CollocationPoint::new(ns, s, &coefficients))
            .collect();
        let AB = flux_matrix(&gauss_s, &lobatto_s)?;
        info!(
            "collocation data built: ns = {}, gauss nodes {:?}, lobatto nodes {:?}",
            ns, gauss_s, lobatto_s
        );
        Ok(CollocationData {
            ns,
            gauss,
            lobatto,
            AB,
            left: CollocationPoint::new(ns, 0.0, &coefficients),
            right: CollocationPoint::new(ns, 1.0, &coefficients),
            midpoint: CollocationPoint::new(ns, 0.5, &coefficients),
        })
    }

    /// number of derivative orders stored per function at a mesh point
    pub fn nd(&self) -> usize {
        self.ns
    }
}

/// m!/(m-k)! · s^(m-k), the k-th derivative of s^m
fn monomial_derivative(m: usize, k: usize, s: f64) -> f64 {
    if k > m {
        return 0.0;
    }
    let falling: f64 = ((m - k + 1)..=m).map(|i| i as f64).product();
    falling * s.powi((m - k) as i32)
}

/// Monomial coefficients (column per basis function) of the 2ns Hermite basis functions of
/// degree 2ns-1 on [0, 1]. Column j < ns has unit j-th derivative at 0 and vanishing
/// derivatives 0..ns-1 at 1; column ns + j is the mirror image attached to s = 1.
pub fn hermite_basis_coefficients(ns: usize) -> Result<DMatrix<f64>, MovColError> {
    let n = 2 * ns;
    let mut V = DMatrix::zeros(n, n);
    for k in 0..ns {
        for m in 0..n {
            V[(k, m)] = monomial_derivative(m, k, 0.0);
            V[(ns + k, m)] = monomial_derivative(m, k, 1.0);
        }
    }
    V.try_inverse().ok_or_else(|| {
        MovColError::NumericDegeneracy(format!("Hermite system for ns = {} is singular", ns))
    })
}

fn lagrange(nodes: &[f64], k: usize, s: f64) -> f64 {
    nodes
        .iter()
        .enumerate()
        .filter(|&(m, _)| m != k)
        .fold(1.0, |acc, (_, &node)| acc * (s - node) / (nodes[k] - node))
}

/// AB = A⁻¹B, see the module documentation.
pub fn flux_matrix(gauss: &[f64], lobatto: &[f64]) -> Result<DMatrix<f64>, MovColError> {
    let ns = gauss.len();
    assert_eq!(lobatto.len(), ns + 1, "need ns+1 Lobatto nodes");
    // Lagrange basis has degree ns-1, so ns-point Gauss-Legendre integrates it exactly
    let quad = GaussLegendre::new(ns).map_err(|e| {
        MovColError::NumericDegeneracy(format!("Failed to create Gauss-Legendre quadrature: {:?}", e))
    })?;
    let mut A = DMatrix::zeros(ns, ns);
    for j in 0..ns {
        for k in 0..ns {
            A[(j, k)] = -quad.integrate(lobatto[j], lobatto[j + 1], |s| lagrange(gauss, k, s));
        }
    }
    let mut B = DMatrix::zeros(ns, ns + 1);
    for j in 0..ns {
        B[(j, j)] = 1.0;
        B[(j, j + 1)] = -1.0;
    }
    A.lu().solve(&B).ok_or_else(|| {
        MovColError::NumericDegeneracy("flux reconstruction matrix A is singular".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    #[test]
    fn test_shapes() {
        for ns in [2, 4, 6] {
            let data = CollocationData::new(ns).unwrap();
            assert_eq!(data.gauss.len(), ns);
            assert_eq!(data.lobatto.len(), ns + 1);
            assert_eq!(data.AB.shape(), (ns, ns + 1));
            for p in data.gauss.iter().chain(data.lobatto.iter()) {
                assert_eq!(p.Qleft.shape(), (ns + 1, ns));
                assert_eq!(p.Qright.shape(), (ns + 1, ns));
            }
            assert_eq!(data.nd(), ns);
        }
    }

    #[test]
    fn test_hermite_interpolation_conditions() {
        let ns = 4;
        let data = CollocationData::new(ns).unwrap();
        for k in 0..ns {
            for j in 0..ns {
                let delta = if k == j { 1.0 } else { 0.0 };
                assert_relative_eq!(data.left.Qleft[(k, j)], delta, epsilon = 1e-9);
                assert_relative_eq!(data.left.Qright[(k, j)], 0.0, epsilon = 1e-9);
                assert_relative_eq!(data.right.Qright[(k, j)], delta, epsilon = 1e-9);
                assert_relative_eq!(data.right.Qleft[(k, j)], 0.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_cubic_hermite_basis_at_midpoint() {
        // ns = 2: classic cubic Hermite, h00(1/2) = 1/2, h10(1/2) = 1/8, h11(1/2) = -1/8
        let data = CollocationData::new(2).unwrap();
        let mid = &data.midpoint;
        assert_relative_eq!(mid.Qleft[(0, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(mid.Qleft[(0, 1)], 0.125, epsilon = 1e-12);
        assert_relative_eq!(mid.Qright[(0, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(mid.Qright[(0, 1)], -0.125, epsilon = 1e-12);
        // first derivatives: h00' = 6t^2 - 6t -> -1.5 at 1/2
        assert_relative_eq!(mid.Qleft[(1, 0)], -1.5, epsilon = 1e-12);
        assert_relative_eq!(mid.Qright[(1, 0)], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_flux_matrix_constant_and_linear() {
        for ns in [2, 4] {
            let data = CollocationData::new(ns).unwrap();
            let ones = DVector::from_element(ns + 1, 1.0);
            let lob = DVector::from_iterator(ns + 1, data.lobatto.iter().map(|p| p.s));
            let d_const = &data.AB * ones;
            let d_lin = &data.AB * lob;
            for j in 0..ns {
                assert_relative_eq!(d_const[j], 0.0, epsilon = 1e-12);
                assert_relative_eq!(d_lin[j], 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_flux_matrix_exact_up_to_degree_ns() {
        for ns in [2, 4] {
            let data = CollocationData::new(ns).unwrap();
            let g = DVector::from_iterator(ns + 1, data.lobatto.iter().map(|p| p.s.powi(ns as i32)));
            let f = &data.AB * g;
            for (j, p) in data.gauss.iter().enumerate() {
                let exact = ns as f64 * p.s.powi(ns as i32 - 1);
                assert_relative_eq!(f[j], exact, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_lagrange_basis() {
        let nodes = gauss_nodes(4).unwrap();
        for k in 0..4 {
            for (m, &s) in nodes.iter().enumerate() {
                let expected = if m == k { 1.0 } else { 0.0 };
                assert_relative_eq!(lagrange(&nodes, k, s), expected, epsilon = 1e-12);
            }
        }
    }
}
