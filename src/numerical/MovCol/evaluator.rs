//! # Evaluator
//!
//! Reconstructs the derivative vector of every state function at a point `x_l + s·h` of an
//! element from the node data at its two ends.
//!
//! Node blocks `ul`, `ur` are `nd × nu` (derivatives 0..nd-1 in x). In element coordinates
//! the j-th s-derivative is `h^j` times the j-th x-derivative, so with `H = [h^0 .. h^nd]`
//! ```text
//! ux[k] = ( Σ_j Qleft[k,j]·H[j]·ul[j] + Qright[k,j]·H[j]·ur[j] ) / H[k]     k = 0..nd
//! ```
//! For time derivatives the element itself moves: `H` changes with `Ht[j] = j·ht·h^(j-1)`
//! and the point drifts with `xt(s) = (1-s)·xtl + s·xtr`. Differentiating `u(x(t), t)` at
//! fixed `s` gives
//! ```text
//! res      = Qleft·(H⊙utl + Ht⊙ul) + Qright·(H⊙utr + Ht⊙ur)
//! utx[j]   = (res[j] - Ht[j]·ux[j]) / H[j] - xt(s)·ux[j+1]                j = 0..nd-1
//! ```
//! The last term removes the mesh-velocity contribution so that callbacks see the true
//! partial time derivative.
use crate::numerical::MovCol::collocation_data::{CollocationData, CollocationPoint};
use crate::numerical::MovCol::layout::DiscreteState;
use nalgebra::{DMatrix, DVector};

/// H = [h^0, h^1, .., h^nd]
pub fn scale_vector(h: f64, nd: usize) -> DVector<f64> {
    DVector::from_iterator(nd + 1, (0..=nd).map(|j| h.powi(j as i32)))
}

/// Ht[j] = j·ht·h^(j-1), time derivative of [`scale_vector`]
pub fn scale_rate_vector(h: f64, ht: f64, nd: usize) -> DVector<f64> {
    DVector::from_iterator(
        nd + 1,
        (0..=nd).map(|j| {
            if j == 0 {
                0.0
            } else {
                j as f64 * ht * h.powi(j as i32 - 1)
            }
        }),
    )
}

/// Working storage for the evaluations inside one element. `reset` is called once per
/// element; the buffers are reused across its collocation points.
#[derive(Debug, Clone)]
pub struct ElementScratch {
    nd: usize,
    nu: usize,
    pub h: f64,
    pub ht: f64,
    pub H: DVector<f64>,
    pub Ht: DVector<f64>,
    scaled_left: DMatrix<f64>,
    scaled_right: DMatrix<f64>,
    combined: DMatrix<f64>,
}

impl ElementScratch {
    pub fn new(nd: usize, nu: usize) -> Self {
        ElementScratch {
            nd,
            nu,
            h: 1.0,
            ht: 0.0,
            H: DVector::from_element(nd + 1, 1.0),
            Ht: DVector::zeros(nd + 1),
            scaled_left: DMatrix::zeros(nd, nu),
            scaled_right: DMatrix::zeros(nd, nu),
            combined: DMatrix::zeros(nd + 1, nu),
        }
    }

    /// prepares the scale vectors of an element of width `h` changing at rate `ht`
    pub fn reset(&mut self, h: f64, ht: f64) {
        self.h = h;
        self.ht = ht;
        self.H = scale_vector(h, self.nd);
        self.Ht = scale_rate_vector(h, ht, self.nd);
    }

    /// Spatial derivative vector `(nd+1) × nu` at `point`, written into `ux`.
    pub fn spatial(
        &mut self,
        ul: &DMatrix<f64>,
        ur: &DMatrix<f64>,
        point: &CollocationPoint,
        ux: &mut DMatrix<f64>,
    ) {
        let nd = self.nd;
        for j in 0..nd {
            for f in 0..self.nu {
                self.scaled_left[(j, f)] = self.H[j] * ul[(j, f)];
                self.scaled_right[(j, f)] = self.H[j] * ur[(j, f)];
            }
        }
        self.combined.gemm(1.0, &point.Qleft, &self.scaled_left, 0.0);
        self.combined.gemm(1.0, &point.Qright, &self.scaled_right, 1.0);
        for k in 0..=nd {
            for f in 0..self.nu {
                ux[(k, f)] = self.combined[(k, f)] / self.H[k];
            }
        }
        // node rows are known exactly at the element ends
        if point.s == 0.0 {
            ux.rows_mut(0, nd).copy_from(ul);
        } else if point.s == 1.0 {
            ux.rows_mut(0, nd).copy_from(ur);
        }
    }

    /// True partial time derivatives `nd × nu` at `point`, written into `utx`. `ux` must be
    /// the result of [`ElementScratch::spatial`] for the same point.
    #[allow(clippy::too_many_arguments)]
    pub fn temporal(
        &mut self,
        ul: &DMatrix<f64>,
        ur: &DMatrix<f64>,
        utl: &DMatrix<f64>,
        utr: &DMatrix<f64>,
        xtl: f64,
        xtr: f64,
        point: &CollocationPoint,
        ux: &DMatrix<f64>,
        utx: &mut DMatrix<f64>,
    ) {
        let nd = self.nd;
        let s = point.s;
        let xt = (1.0 - s) * xtl + s * xtr;
        if s == 0.0 || s == 1.0 {
            let (ut_end, xt_end) = if s == 0.0 { (utl, xtl) } else { (utr, xtr) };
            for j in 0..nd {
                for f in 0..self.nu {
                    utx[(j, f)] = ut_end[(j, f)] - xt_end * ux[(j + 1, f)];
                }
            }
            return;
        }
        for j in 0..nd {
            for f in 0..self.nu {
                self.scaled_left[(j, f)] = self.H[j] * utl[(j, f)] + self.Ht[j] * ul[(j, f)];
                self.scaled_right[(j, f)] = self.H[j] * utr[(j, f)] + self.Ht[j] * ur[(j, f)];
            }
        }
        self.combined.gemm(1.0, &point.Qleft, &self.scaled_left, 0.0);
        self.combined.gemm(1.0, &point.Qright, &self.scaled_right, 1.0);
        for j in 0..nd {
            for f in 0..self.nu {
                utx[(j, f)] = (self.combined[(j, f)] - self.Ht[j] * ux[(j, f)]) / self.H[j]
                    - xt * ux[(j + 1, f)];
            }
        }
    }
}

/// Derivative vector `(nd+1) × nu` at `point` of an element with scale vector `H`.
pub fn compute_spatial_derivatives(
    ul: &DMatrix<f64>,
    ur: &DMatrix<f64>,
    point: &CollocationPoint,
    H: &DVector<f64>,
) -> DMatrix<f64> {
    let (nd, nu) = ul.shape();
    let mut scratch = ElementScratch::new(nd, nu);
    scratch.H = H.clone();
    let mut ux = DMatrix::zeros(nd + 1, nu);
    scratch.spatial(ul, ur, point, &mut ux);
    ux
}

/// True partial time derivatives `nd × nu` at `point`; `ux` from
/// [`compute_spatial_derivatives`] at the same point.
#[allow(clippy::too_many_arguments)]
pub fn compute_time_derivatives(
    ul: &DMatrix<f64>,
    ur: &DMatrix<f64>,
    utl: &DMatrix<f64>,
    utr: &DMatrix<f64>,
    xtl: f64,
    xtr: f64,
    point: &CollocationPoint,
    H: &DVector<f64>,
    Ht: &DVector<f64>,
    ux: &DMatrix<f64>,
) -> DMatrix<f64> {
    let (nd, nu) = ul.shape();
    let mut scratch = ElementScratch::new(nd, nu);
    scratch.H = H.clone();
    scratch.Ht = Ht.clone();
    let mut utx = DMatrix::zeros(nd, nu);
    scratch.temporal(ul, ur, utl, utr, xtl, xtr, point, ux, &mut utx);
    utx
}

/// Position, velocity and evaluated derivatives at one end of the domain, as handed to the
/// boundary callbacks.
#[derive(Debug, Clone)]
pub struct EndpointState {
    pub x: f64,
    pub xt: f64,
    /// (nd+1) × nu
    pub u: DMatrix<f64>,
    /// nd × nu, true partial time derivatives
    pub ut: DMatrix<f64>,
}

/// Evaluates the left end of the first element and the right end of the last element.
pub fn domain_end_states(data: &CollocationData, state: &DiscreteState) -> (EndpointState, EndpointState) {
    let nx = state.nx();
    let (nd, nu) = state.u[0].shape();
    let mut scratch = ElementScratch::new(nd, nu);
    let mut end = |e: usize, point: &CollocationPoint, i: usize| {
        let h = state.x[e + 1] - state.x[e];
        let ht = state.xt[e + 1] - state.xt[e];
        scratch.reset(h, ht);
        let mut ux = DMatrix::zeros(nd + 1, nu);
        let mut utx = DMatrix::zeros(nd, nu);
        scratch.spatial(&state.u[e], &state.u[e + 1], point, &mut ux);
        scratch.temporal(
            &state.u[e],
            &state.u[e + 1],
            &state.ut[e],
            &state.ut[e + 1],
            state.xt[e],
            state.xt[e + 1],
            point,
            &ux,
            &mut utx,
        );
        EndpointState {
            x: state.x[i],
            xt: state.xt[i],
            u: ux,
            ut: utx,
        }
    };
    let left = end(0, &data.left, 0);
    let right = end(nx - 2, &data.right, nx - 1);
    (left, right)
}
