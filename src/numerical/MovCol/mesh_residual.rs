//! # Mesh residual
//!
//! Moving-mesh equation: equidistribution of the monitor function `M` with temporal smoothing
//! `tau` and spatial smoothing `gamma`. For element `e` of width `w = x_{e+1} - x_e` and rate
//! `ẇ`,
//! ```text
//! Y[e]   = -tau·ẇ/w² + 1/w                  (Y[-1] = Y[0], Y[nx-1] = Y[nx-2])
//! D2[e]  = Y[e+1] - 2·Y[e] + Y[e-1]
//! resx[i] = (Y[i] - g·D2[i])/M[i] - (Y[i-1] - g·D2[i-1])/M[i-1],   g = gamma·(gamma+1)
//! ```
//! for interior nodes; `resx[0] = Bxl`, `resx[nx-1] = Bxr`. `M[e]` is the monitor at the
//! element midpoint, or for the first and last element the mean of its values at both
//! element ends. At a steady state `w·M` is constant across elements.
use crate::numerical::MovCol::collocation_data::CollocationData;
use crate::numerical::MovCol::errors::MovColError;
use crate::numerical::MovCol::evaluator::{ElementScratch, EndpointState};
use crate::numerical::MovCol::layout::DiscreteState;
use crate::numerical::MovCol::problem::PdeProblem;
use nalgebra::{DMatrix, DVector};

/// Monitor value of every element.
pub fn element_monitors<P: PdeProblem + ?Sized>(
    problem: &P,
    data: &CollocationData,
    t: f64,
    state: &DiscreteState,
) -> Result<DVector<f64>, MovColError> {
    let ne = state.nx() - 1;
    let nu = problem.nu();
    let mut scratch = ElementScratch::new(data.nd(), nu);
    let mut u = DMatrix::zeros(data.nd() + 1, nu);
    let mut Mhalf = DVector::zeros(ne);
    for e in 0..ne {
        let (xl, xr) = (state.x[e], state.x[e + 1]);
        let h = xr - xl;
        if !(h > 0.0) {
            return Err(MovColError::NumericDegeneracy(format!(
                "element {} has non-positive width {:e}",
                e, h
            )));
        }
        scratch.reset(h, 0.0);
        let (ul, ur) = (&state.u[e], &state.u[e + 1]);
        let m = if e == 0 || e == ne - 1 {
            scratch.spatial(ul, ur, &data.left, &mut u);
            let ml = problem.monitor(t, xl, &u);
            scratch.spatial(ul, ur, &data.right, &mut u);
            let mr = problem.monitor(t, xr, &u);
            0.5 * (ml + mr)
        } else {
            scratch.spatial(ul, ur, &data.midpoint, &mut u);
            problem.monitor(t, xl + 0.5 * h, &u)
        };
        if !(m > 0.0 && m.is_finite()) {
            return Err(MovColError::NumericDegeneracy(format!(
                "monitor of element {} is {:e}, must be positive",
                e, m
            )));
        }
        Mhalf[e] = m;
    }
    Ok(Mhalf)
}

/// Mesh residual `resx` of length `nx`.
pub fn mesh_residual<P: PdeProblem + ?Sized>(
    problem: &P,
    data: &CollocationData,
    t: f64,
    state: &DiscreteState,
    left: &EndpointState,
    right: &EndpointState,
) -> Result<DVector<f64>, MovColError> {
    let nx = state.nx();
    if nx < 2 {
        return Err(MovColError::PreconditionViolation(format!(
            "mesh residual needs at least 2 mesh points, got {}",
            nx
        )));
    }
    let ne = nx - 1;
    let Mhalf = element_monitors(problem, data, t, state)?;
    let tau = problem.tau();
    let Y = DVector::from_iterator(
        ne,
        (0..ne).map(|e| {
            let w = state.x[e + 1] - state.x[e];
            let wt = state.xt[e + 1] - state.xt[e];
            -tau * wt / (w * w) + 1.0 / w
        }),
    );
    let gamma = problem.gamma();
    let g = gamma * (gamma + 1.0);
    let ghost = |e: isize| -> f64 { Y[e.clamp(0, ne as isize - 1) as usize] };
    let smoothed = DVector::from_iterator(
        ne,
        (0..ne).map(|e| {
            let e = e as isize;
            let D2 = ghost(e + 1) - 2.0 * ghost(e) + ghost(e - 1);
            (ghost(e) - g * D2) / Mhalf[e as usize]
        }),
    );
    let mut resx = DVector::zeros(nx);
    for i in 1..nx - 1 {
        resx[i] = smoothed[i] - smoothed[i - 1];
    }
    resx[0] = problem.Bxl(t, left.x, left.xt, &left.u, &left.ut);
    resx[nx - 1] = problem.Bxr(t, right.x, right.xt, &right.u, &right.ut);
    Ok(resx)
}
