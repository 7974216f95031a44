//! # Problem definition
//!
//! A PDE system of `nu` functions on `xspan` in the conservation form
//! ```text
//! F(t, x, u, ut) = ∂/∂x G(t, x, u, ut)
//! ```
//! with boundary conditions `Bl`, `Br`, a monitor function `M(t, x, u)` that sets the desired
//! mesh density (spacing ∝ 1/M), the mesh smoothing parameters `tau`, `gamma` and the
//! boundary motion conditions `Bxl`, `Bxr`.
//!
//! Inside every callback `u` is `(nd+1) × nu` (row k holds the k-th x-derivative) and `ut`
//! is `nd × nu` (true partial time derivatives). `u0(x)` returns the `nd × nu` node block at
//! `x`; rows beyond `nd` are ignored.
//!
//! Problems either implement [`PdeProblem`] directly or are assembled from closures with
//! [`PdeSystem`]. [`FixedEndpoints`] wraps any problem and pins both ends of the mesh.
use nalgebra::{DMatrix, DVector};

pub trait PdeProblem {
    /// spatial domain `(xl, xr)`, `xl < xr`
    fn xspan(&self) -> (f64, f64);
    /// initial time
    fn t0(&self) -> f64;
    /// number of state functions
    fn nu(&self) -> usize;
    /// initial node block at `x`
    fn u0(&self, x: f64) -> DMatrix<f64>;
    fn F(&self, t: f64, x: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> DVector<f64>;
    fn G(&self, t: f64, x: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> DVector<f64>;
    /// left boundary conditions, at least `nu·ns/2` values
    fn Bl(&self, t: f64, x: f64, xt: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> DVector<f64>;
    /// right boundary conditions, at least `nu·ns/2` values
    fn Br(&self, t: f64, x: f64, xt: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> DVector<f64>;
    /// monitor function, must stay strictly positive
    fn monitor(&self, t: f64, x: f64, u: &DMatrix<f64>) -> f64;
    /// mesh smoothing time constant
    fn tau(&self) -> f64;
    /// spatial smoothing order
    fn gamma(&self) -> f64;
    /// motion of the left mesh end, fixed by default
    fn Bxl(&self, _t: f64, _x: f64, xt: f64, _u: &DMatrix<f64>, _ut: &DMatrix<f64>) -> f64 {
        xt
    }
    /// motion of the right mesh end, fixed by default
    fn Bxr(&self, _t: f64, _x: f64, xt: f64, _u: &DMatrix<f64>, _ut: &DMatrix<f64>) -> f64 {
        xt
    }
}

pub type SourceFn = Box<dyn Fn(f64, f64, &DMatrix<f64>, &DMatrix<f64>) -> DVector<f64>>;
pub type BoundaryFn = Box<dyn Fn(f64, f64, f64, &DMatrix<f64>, &DMatrix<f64>) -> DVector<f64>>;
pub type BoundaryMotionFn = Box<dyn Fn(f64, f64, f64, &DMatrix<f64>, &DMatrix<f64>) -> f64>;
pub type MonitorFn = Box<dyn Fn(f64, f64, &DMatrix<f64>) -> f64>;
pub type InitialFn = Box<dyn Fn(f64) -> DMatrix<f64>>;

/// arc-length monitor `sqrt(1 + Σ_f (∂u_f/∂x)²)`
pub fn arc_length_monitor(u: &DMatrix<f64>) -> f64 {
    (1.0 + u.row(1).iter().map(|ux| ux * ux).sum::<f64>()).sqrt()
}

fn default_monitor(_t: f64, _x: f64, u: &DMatrix<f64>) -> f64 {
    arc_length_monitor(u)
}

/// Problem assembled from closures.
///
/// ```ignore
/// let problem = PdeSystem::new((0.0, 1.0), 1, u0, F, G, Bl, Br)
///     .with_tau(1e-3)
///     .with_monitor(|_t, _x, u| (1.0 + u[(1, 0)].powi(2)).sqrt());
/// ```
pub struct PdeSystem {
    pub xspan: (f64, f64),
    pub t0: f64,
    pub nu: usize,
    pub tau: f64,
    pub gamma: f64,
    u0: InitialFn,
    F: SourceFn,
    G: SourceFn,
    Bl: BoundaryFn,
    Br: BoundaryFn,
    monitor: MonitorFn,
    Bxl: Option<BoundaryMotionFn>,
    Bxr: Option<BoundaryMotionFn>,
}

impl PdeSystem {
    /// New problem starting at `t0 = 0` with the arc-length monitor, `tau = 1e-3`,
    /// `gamma = 1` and fixed mesh ends.
    pub fn new<U0, FF, GG, BL, BR>(xspan: (f64, f64), nu: usize, u0: U0, F: FF, G: GG, Bl: BL, Br: BR) -> Self
    where
        U0: Fn(f64) -> DMatrix<f64> + 'static,
        FF: Fn(f64, f64, &DMatrix<f64>, &DMatrix<f64>) -> DVector<f64> + 'static,
        GG: Fn(f64, f64, &DMatrix<f64>, &DMatrix<f64>) -> DVector<f64> + 'static,
        BL: Fn(f64, f64, f64, &DMatrix<f64>, &DMatrix<f64>) -> DVector<f64> + 'static,
        BR: Fn(f64, f64, f64, &DMatrix<f64>, &DMatrix<f64>) -> DVector<f64> + 'static,
    {
        PdeSystem {
            xspan,
            t0: 0.0,
            nu,
            tau: 1e-3,
            gamma: 1.0,
            u0: Box::new(u0),
            F: Box::new(F),
            G: Box::new(G),
            Bl: Box::new(Bl),
            Br: Box::new(Br),
            monitor: Box::new(default_monitor),
            Bxl: None,
            Bxr: None,
        }
    }

    pub fn with_t0(mut self, t0: f64) -> Self {
        self.t0 = t0;
        self
    }

    pub fn with_tau(mut self, tau: f64) -> Self {
        self.tau = tau;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_monitor<M>(mut self, monitor: M) -> Self
    where
        M: Fn(f64, f64, &DMatrix<f64>) -> f64 + 'static,
    {
        self.monitor = Box::new(monitor);
        self
    }

    pub fn with_boundary_motion<BXL, BXR>(mut self, Bxl: BXL, Bxr: BXR) -> Self
    where
        BXL: Fn(f64, f64, f64, &DMatrix<f64>, &DMatrix<f64>) -> f64 + 'static,
        BXR: Fn(f64, f64, f64, &DMatrix<f64>, &DMatrix<f64>) -> f64 + 'static,
    {
        self.Bxl = Some(Box::new(Bxl));
        self.Bxr = Some(Box::new(Bxr));
        self
    }
}

impl PdeProblem for PdeSystem {
    fn xspan(&self) -> (f64, f64) {
        self.xspan
    }
    fn t0(&self) -> f64 {
        self.t0
    }
    fn nu(&self) -> usize {
        self.nu
    }
    fn u0(&self, x: f64) -> DMatrix<f64> {
        (self.u0)(x)
    }
    fn F(&self, t: f64, x: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> DVector<f64> {
        (self.F)(t, x, u, ut)
    }
    fn G(&self, t: f64, x: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> DVector<f64> {
        (self.G)(t, x, u, ut)
    }
    fn Bl(&self, t: f64, x: f64, xt: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> DVector<f64> {
        (self.Bl)(t, x, xt, u, ut)
    }
    fn Br(&self, t: f64, x: f64, xt: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> DVector<f64> {
        (self.Br)(t, x, xt, u, ut)
    }
    fn monitor(&self, t: f64, x: f64, u: &DMatrix<f64>) -> f64 {
        (self.monitor)(t, x, u)
    }
    fn tau(&self) -> f64 {
        self.tau
    }
    fn gamma(&self) -> f64 {
        self.gamma
    }
    fn Bxl(&self, t: f64, x: f64, xt: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> f64 {
        match &self.Bxl {
            Some(f) => f(t, x, xt, u, ut),
            None => xt,
        }
    }
    fn Bxr(&self, t: f64, x: f64, xt: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> f64 {
        match &self.Bxr {
            Some(f) => f(t, x, xt, u, ut),
            None => xt,
        }
    }
}

/// Forwards everything to the wrapped problem except the boundary motion, which becomes
/// `Bxl = Bxr = xt` (ends at rest). Used while relaxing the initial mesh.
pub struct FixedEndpoints<'a, P: PdeProblem + ?Sized> {
    pub inner: &'a P,
}

impl<'a, P: PdeProblem + ?Sized> FixedEndpoints<'a, P> {
    pub fn new(inner: &'a P) -> Self {
        FixedEndpoints { inner }
    }
}

impl<'a, P: PdeProblem + ?Sized> PdeProblem for FixedEndpoints<'a, P> {
    fn xspan(&self) -> (f64, f64) {
        self.inner.xspan()
    }
    fn t0(&self) -> f64 {
        self.inner.t0()
    }
    fn nu(&self) -> usize {
        self.inner.nu()
    }
    fn u0(&self, x: f64) -> DMatrix<f64> {
        self.inner.u0(x)
    }
    fn F(&self, t: f64, x: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> DVector<f64> {
        self.inner.F(t, x, u, ut)
    }
    fn G(&self, t: f64, x: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> DVector<f64> {
        self.inner.G(t, x, u, ut)
    }
    fn Bl(&self, t: f64, x: f64, xt: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> DVector<f64> {
        self.inner.Bl(t, x, xt, u, ut)
    }
    fn Br(&self, t: f64, x: f64, xt: f64, u: &DMatrix<f64>, ut: &DMatrix<f64>) -> DVector<f64> {
        self.inner.Br(t, x, xt, u, ut)
    }
    fn monitor(&self, t: f64, x: f64, u: &DMatrix<f64>) -> f64 {
        self.inner.monitor(t, x, u)
    }
    fn tau(&self) -> f64 {
        self.inner.tau()
    }
    fn gamma(&self) -> f64 {
        self.inner.gamma()
    }
    fn Bxl(&self, _t: f64, _x: f64, xt: f64, _u: &DMatrix<f64>, _ut: &DMatrix<f64>) -> f64 {
        xt
    }
    fn Bxr(&self, _t: f64, _x: f64, xt: f64, _u: &DMatrix<f64>, _ut: &DMatrix<f64>) -> f64 {
        xt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn moving_boundary_system() -> PdeSystem {
        PdeSystem::new(
            (0.0, 2.0),
            1,
            |x| DMatrix::from_column_slice(2, 1, &[x * x, 2.0 * x]),
            |_t, _x, _u, ut| DVector::from_element(1, ut[(0, 0)]),
            |_t, _x, u, _ut| DVector::from_element(1, u[(1, 0)]),
            |_t, _x, _xt, u, _ut| DVector::from_element(1, u[(0, 0)]),
            |_t, _x, _xt, u, _ut| DVector::from_element(1, u[(0, 0)] - 4.0),
        )
        .with_tau(0.5)
        .with_gamma(2.0)
        .with_boundary_motion(|_t, _x, xt, _u, _ut| xt - 1.0, |_t, _x, xt, _u, _ut| xt + 1.0)
    }

    #[test]
    fn test_closure_system_forwards_callbacks() {
        let p = moving_boundary_system();
        assert_eq!(p.xspan(), (0.0, 2.0));
        assert_eq!(p.nu(), 1);
        assert_eq!(p.tau(), 0.5);
        assert_eq!(p.gamma(), 2.0);
        assert_eq!(p.u0(3.0)[(1, 0)], 6.0);
        let u = DMatrix::from_column_slice(3, 1, &[1.0, 3.0, 0.0]);
        let ut = DMatrix::from_column_slice(2, 1, &[-2.0, 0.0]);
        assert_eq!(p.F(0.0, 0.5, &u, &ut)[0], -2.0);
        assert_eq!(p.G(0.0, 0.5, &u, &ut)[0], 3.0);
        assert_eq!(p.Br(0.0, 2.0, 0.0, &u, &ut)[0], -3.0);
        assert_relative_eq!(p.monitor(0.0, 0.5, &u), 10.0_f64.sqrt());
        assert_eq!(p.Bxl(0.0, 0.0, 0.25, &u, &ut), -0.75);
        assert_eq!(p.Bxr(0.0, 2.0, 0.25, &u, &ut), 1.25);
    }

    #[test]
    fn test_fixed_endpoints_override_only_boundary_motion() {
        let p = moving_boundary_system();
        let fixed = FixedEndpoints::new(&p);
        let u = DMatrix::from_column_slice(3, 1, &[1.0, 3.0, 0.0]);
        let ut = DMatrix::zeros(2, 1);
        assert_eq!(fixed.Bxl(0.0, 0.0, 0.25, &u, &ut), 0.25);
        assert_eq!(fixed.Bxr(0.0, 2.0, -0.5, &u, &ut), -0.5);
        assert_eq!(fixed.tau(), p.tau());
        assert_eq!(fixed.G(0.0, 0.5, &u, &ut), p.G(0.0, 0.5, &u, &ut));
        assert_eq!(fixed.u0(1.0), p.u0(1.0));
    }

    #[test]
    fn test_arc_length_monitor() {
        let u = DMatrix::from_column_slice(3, 2, &[0.0, 3.0, 0.0, 0.0, 4.0, 0.0]);
        assert_relative_eq!(arc_length_monitor(&u), 26.0_f64.sqrt());
    }
}
