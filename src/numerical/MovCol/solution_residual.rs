//! # Solution residual
//!
//! For every element `[x_i, x_{i+1}]` the PDE `F = ∂G/∂x` is collocated as
//! ```text
//! R_i = FGauss - GLobatto · ABᵀ / h        (nu × ns)
//! ```
//! where `FGauss` holds `F` at the `ns` Gauss points and `GLobatto` holds `G` at the `ns + 1`
//! Lobatto points. `R_i` fills the residual slots of mesh point `i`; the slots of the last
//! mesh point hold the boundary conditions, the first `nu·ns/2` entries from `Bl` at the left
//! end of the domain and the rest from `Br` at the right end.
use crate::numerical::MovCol::collocation_data::CollocationData;
use crate::numerical::MovCol::errors::{MovColError, check_callback_len};
use crate::numerical::MovCol::evaluator::{ElementScratch, EndpointState};
use crate::numerical::MovCol::layout::DiscreteState;
use crate::numerical::MovCol::problem::PdeProblem;
use nalgebra::{DMatrix, DVector};

/// Residual of one element, `nu × ns`.
pub fn element_residual<P: PdeProblem + ?Sized>(
    problem: &P,
    data: &CollocationData,
    scratch: &mut ElementScratch,
    t: f64,
    state: &DiscreteState,
    e: usize,
) -> Result<DMatrix<f64>, MovColError> {
    let ns = data.ns;
    let nu = problem.nu();
    let (xl, xr) = (state.x[e], state.x[e + 1]);
    let h = xr - xl;
    if !(h > 0.0) {
        return Err(MovColError::NumericDegeneracy(format!(
            "element {} has non-positive width {:e}",
            e, h
        )));
    }
    scratch.reset(h, state.xt[e + 1] - state.xt[e]);
    let (ul, ur) = (&state.u[e], &state.u[e + 1]);
    let (utl, utr) = (&state.ut[e], &state.ut[e + 1]);
    let (xtl, xtr) = (state.xt[e], state.xt[e + 1]);
    let mut ux = DMatrix::zeros(ns + 1, nu);
    let mut utx = DMatrix::zeros(ns, nu);

    let mut FGauss = DMatrix::zeros(nu, ns);
    for (c, point) in data.gauss.iter().enumerate() {
        scratch.spatial(ul, ur, point, &mut ux);
        scratch.temporal(ul, ur, utl, utr, xtl, xtr, point, &ux, &mut utx);
        let f = problem.F(t, xl + point.s * h, &ux, &utx);
        check_callback_len("F", f.len(), nu, true)?;
        FGauss.set_column(c, &f);
    }
    let mut GLobatto = DMatrix::zeros(nu, ns + 1);
    for (c, point) in data.lobatto.iter().enumerate() {
        scratch.spatial(ul, ur, point, &mut ux);
        scratch.temporal(ul, ur, utl, utr, xtl, xtr, point, &ux, &mut utx);
        let g = problem.G(t, xl + point.s * h, &ux, &utx);
        check_callback_len("G", g.len(), nu, true)?;
        GLobatto.set_column(c, &g);
    }
    Ok(FGauss - GLobatto * data.AB.transpose() / h)
}

/// Boundary block of the last mesh point, `nu × ns` (column-major fill).
pub fn boundary_residual<P: PdeProblem + ?Sized>(
    problem: &P,
    ns: usize,
    t: f64,
    left: &EndpointState,
    right: &EndpointState,
) -> Result<DMatrix<f64>, MovColError> {
    let nu = problem.nu();
    let half = nu * ns / 2;
    let bl = problem.Bl(t, left.x, left.xt, &left.u, &left.ut);
    check_callback_len("Bl", bl.len(), half, false)?;
    let br = problem.Br(t, right.x, right.xt, &right.u, &right.ut);
    check_callback_len("Br", br.len(), half, false)?;
    let values: Vec<f64> = bl.iter().take(half).chain(br.iter().take(half)).copied().collect();
    Ok(DMatrix::from_column_slice(nu, ns, &values))
}

/// Solution residual `resu` of length `nu·ns·nx`, index `f + nu·(c + ns·i)`.
pub fn solution_residual<P: PdeProblem + ?Sized>(
    problem: &P,
    data: &CollocationData,
    t: f64,
    state: &DiscreteState,
    left: &EndpointState,
    right: &EndpointState,
) -> Result<DVector<f64>, MovColError> {
    let ns = data.ns;
    let nu = problem.nu();
    let nx = state.nx();
    if nx < 2 {
        return Err(MovColError::PreconditionViolation(format!(
            "solution residual needs at least 2 mesh points, got {}",
            nx
        )));
    }
    let block = nu * ns;
    let mut resu = DVector::zeros(block * nx);
    let mut scratch = ElementScratch::new(data.nd(), nu);
    for e in 0..nx - 1 {
        let r = element_residual(problem, data, &mut scratch, t, state, e)?;
        resu.as_mut_slice()[e * block..(e + 1) * block].copy_from_slice(r.as_slice());
    }
    let b = boundary_residual(problem, ns, t, left, right)?;
    resu.as_mut_slice()[(nx - 1) * block..].copy_from_slice(b.as_slice());
    Ok(resu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerical::MovCol::evaluator::domain_end_states;
    use crate::numerical::MovCol::layout::StateLayout;
    use crate::numerical::MovCol::problem::PdeSystem;
    use approx::assert_relative_eq;

    /// u(x, t) = sin(x) e^{-t} solves u_t = u_xx, written as F = u_t, G = u_x
    fn heat(nu_values_bl: usize) -> PdeSystem {
        PdeSystem::new(
            (0.0, 1.0),
            1,
            |x| DMatrix::from_column_slice(2, 1, &[x.sin(), x.cos()]),
            |_t, _x, _u, ut| DVector::from_element(1, ut[(0, 0)]),
            |_t, _x, u, _ut| DVector::from_element(1, u[(1, 0)]),
            move |t, x, _xt, u, _ut| DVector::from_element(nu_values_bl, u[(0, 0)] - x.sin() * (-t).exp()),
            |t, x, _xt, u, _ut| DVector::from_vec(vec![u[(0, 0)] - x.sin() * (-t).exp(), 99.0]),
        )
    }

    /// node data of sin(x) e^{-t} at time t on mesh x (ns = 4, mesh at rest)
    fn exact_state(layout: &StateLayout, x: &DVector<f64>, t: f64) -> DiscreteState {
        let mut u = DVector::zeros(layout.solution_len());
        let mut ut = DVector::zeros(layout.solution_len());
        let decay = (-t).exp();
        for i in 0..layout.nx {
            let xi = x[i];
            let derivs = [xi.sin(), xi.cos(), -xi.sin(), -xi.cos()];
            for d in 0..layout.nd {
                u[layout.index(d, 0, i)] = derivs[d] * decay;
                ut[layout.index(d, 0, i)] = -derivs[d] * decay;
            }
        }
        DiscreteState::from_parts(layout, x, &DVector::zeros(layout.nx), &u, &ut)
    }

    #[test]
    fn test_manufactured_solution_interior_residual_small() {
        let ns = 4;
        let data = CollocationData::new(ns).unwrap();
        let problem = heat(2);
        for nx in [2, 3, 6] {
            let layout = StateLayout::new(ns, 1, nx);
            let x = DVector::from_iterator(nx, (0..nx).map(|i| (i as f64 / (nx - 1) as f64).powf(1.3)));
            let state = exact_state(&layout, &x, 0.3);
            let (left, right) = domain_end_states(&data, &state);
            let resu = solution_residual(&problem, &data, 0.3, &state, &left, &right).unwrap();
            assert_eq!(resu.len(), ns * nx);
            for r in resu.rows(0, ns * (nx - 1)).iter() {
                assert!(r.abs() < 1e-4, "residual {} too large for nx = {}", r, nx);
            }
            // exact boundary data, Br pads with a marker value
            assert_relative_eq!(resu[ns * (nx - 1)], 0.0, epsilon = 1e-14);
            assert_relative_eq!(resu[ns * (nx - 1) + 2], 0.0, epsilon = 1e-14);
            assert_eq!(resu[ns * nx - 1], 99.0);
        }
    }

    #[test]
    fn test_boundary_block_layout_and_extra_values_ignored() {
        let ns = 4;
        let data = CollocationData::new(ns).unwrap();
        let problem = heat(3);
        let layout = StateLayout::new(ns, 1, 3);
        let x = DVector::from_vec(vec![0.0, 0.5, 1.0]);
        let mut state = exact_state(&layout, &x, 0.0);
        state.u[0][(0, 0)] += 0.1;
        state.u[2][(0, 0)] -= 0.2;
        let (left, right) = domain_end_states(&data, &state);
        let resu = solution_residual(&problem, &data, 0.0, &state, &left, &right).unwrap();
        // slots of mesh point 2: Bl[0], Bl[1], Br[0], Br[1]
        assert_relative_eq!(resu[8], 0.1, epsilon = 1e-12);
        assert_relative_eq!(resu[9], 0.1, epsilon = 1e-12);
        assert_relative_eq!(resu[10], -0.2, epsilon = 1e-12);
        assert_eq!(resu[11], 99.0);
    }

    #[test]
    fn test_short_boundary_result_is_callback_error() {
        let ns = 4;
        let data = CollocationData::new(ns).unwrap();
        let problem = heat(1);
        let layout = StateLayout::new(ns, 1, 3);
        let state = exact_state(&layout, &DVector::from_vec(vec![0.0, 0.5, 1.0]), 0.0);
        let (left, right) = domain_end_states(&data, &state);
        let err = solution_residual(&problem, &data, 0.0, &state, &left, &right).unwrap_err();
        assert_eq!(
            err,
            MovColError::UserCallback {
                callback: "Bl",
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn test_wrong_sized_flux_is_callback_error() {
        let ns = 2;
        let data = CollocationData::new(ns).unwrap();
        let problem = PdeSystem::new(
            (0.0, 1.0),
            1,
            |x| DMatrix::from_column_slice(2, 1, &[x, 1.0]),
            |_t, _x, _u, ut| DVector::from_element(1, ut[(0, 0)]),
            |_t, _x, u, _ut| DVector::from_element(2, u[(0, 0)]),
            |_t, _x, _xt, u, _ut| DVector::from_element(1, u[(0, 0)]),
            |_t, _x, _xt, u, _ut| DVector::from_element(1, u[(0, 0)]),
        );
        let layout = StateLayout::new(ns, 1, 2);
        let u = DVector::from_vec(vec![0.0, 1.0, 1.0, 1.0]);
        let state = DiscreteState::from_parts(
            &layout,
            &DVector::from_vec(vec![0.0, 1.0]),
            &DVector::zeros(2),
            &u,
            &DVector::zeros(4),
        );
        let (left, right) = domain_end_states(&data, &state);
        let err = solution_residual(&problem, &data, 0.0, &state, &left, &right).unwrap_err();
        assert!(matches!(err, MovColError::UserCallback { callback: "G", expected: 1, got: 2 }));
    }

    #[test]
    fn test_tangled_element_is_degenerate() {
        let ns = 2;
        let data = CollocationData::new(ns).unwrap();
        let problem = heat(1);
        let layout = StateLayout::new(ns, 1, 3);
        let mut state = exact_state(&layout, &DVector::from_vec(vec![0.0, 0.5, 1.0]), 0.0);
        state.x[1] = 1.2;
        let mut scratch = ElementScratch::new(ns, 1);
        let err = element_residual(&problem, &data, &mut scratch, 0.0, &state, 1).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_mesh_without_elements_is_rejected() {
        let data = CollocationData::new(2).unwrap();
        let layout = StateLayout::new(2, 1, 1);
        let state = exact_state(&layout, &DVector::zeros(1), 0.0);
        let end = EndpointState {
            x: 0.0,
            xt: 0.0,
            u: DMatrix::zeros(3, 1),
            ut: DMatrix::zeros(2, 1),
        };
        let err = solution_residual(&heat(1), &data, 0.0, &state, &end, &end).unwrap_err();
        assert!(matches!(err, MovColError::PreconditionViolation(_)));
    }
}
