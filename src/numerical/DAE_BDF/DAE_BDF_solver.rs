//! # BDF solver for fully implicit systems
//!
//! Integrates differential-algebraic systems written in residual form
//!
//! ```text
//! F(t, y, y') = 0,   y(t₀) = y₀, y'(t₀) = y'₀
//! ```
//!
//! with the variable-order (1-5), variable-step backward differentiation formulas in the
//! form used by scipy's `BDF`: the solution history is stored as a difference array `D`
//! (`D[0] = y`, `D[1] = h·y'`, `D[k]` the k-th scaled backward difference) and
//! rescaled with `change_D` whenever the step size changes.
//!
//! ## Corrector
//!
//! With the predictor `y_pred = Σ_{i≤k} D[i]`, `c = h/αₖ` and
//! `ψ = Σ_{i=1..k} γᵢ D[i] / αₖ`, the BDF formula gives the new rate as a function of the
//! correction `d = y - y_pred`:
//!
//! ```text
//! y' = (ψ + d) / c
//! ```
//!
//! so each step solves `F(t_new, y_pred + d, (ψ + d)/c) = 0` for `d` by simplified Newton
//! iteration on the matrix
//!
//! ```text
//! M = ∂F/∂y' + c·∂F/∂y
//! ```
//!
//! Both Jacobian blocks are forward-difference estimates, reused across steps and
//! re-estimated when Newton fails with a stale Jacobian.
//!
//! ## Failures
//!
//! A residual that reports a recoverable error (for instance a tangled mesh) or returns
//! non-finite values counts as a Newton failure and the step is halved. The integration
//! fails once the step size drops below `10·ε·|t|`.
//!
//! ## References
//!
//! - Shampine, L.F., Reichelt, M.W. "The MATLAB ODE Suite"
//! - Brenan, K.E., Campbell, S.L., Petzold, L.R. "Numerical Solution of Initial-Value
//!   Problems in Differential-Algebraic Equations"

use crate::numerical::DAE_BDF::common::{
    NumberOrVec, ResidualFn, newton_tol, norm, num_jac_dae, scale_func, select_initial_step,
    validate_first_step, validate_max_step, validate_tol,
};
use crate::numerical::MovCol::errors::MovColError;
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector, Dyn, LU};
use std::fmt::Display;
use std::ops::AddAssign;

const MAX_ORDER: usize = 5;
const NEWTON_MAXITER: usize = 4;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

/// Cumulative product down every column.
fn cumulative_product_along_columns(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let (rows, cols) = matrix.shape();
    let mut result = DMatrix::zeros(rows, cols);
    for col in 0..cols {
        let mut cumprod = 1.0;
        for row in 0..rows {
            cumprod *= matrix[(row, col)];
            result[(row, col)] = cumprod;
        }
    }
    result
}

/// Transformation of the difference array for a step size change by `factor`:
/// ```text
/// R[i,j] = (i-1-factor*j)/i  for i,j ≥ 1
/// R[0,j] = 1
/// ```
/// followed by cumulative products down the columns.
fn compute_r(order: usize, factor: f64) -> DMatrix<f64> {
    let mut m = DMatrix::zeros(order + 1, order + 1);
    for i in 1..(order + 1) {
        for j in 1..(order + 1) {
            m[(i, j)] = (i as f64 - 1.0 - factor * j as f64) / i as f64;
        }
    }
    m.row_mut(0).fill(1.0);
    cumulative_product_along_columns(&m)
}

/// `D[0..=order] = (R(order, factor)·R(order, 1))ᵀ · D[0..=order]`
fn change_D(D: &mut DMatrix<f64>, order: usize, factor: f64) {
    let r = compute_r(order, factor);
    let u = compute_r(order, 1.0);
    let ru = r * u;
    let temp = ru.transpose() * D.rows(0, order + 1);
    D.rows_mut(0, order + 1).copy_from(&temp);
}

/// Outcome of one Newton solve of the corrector equation.
struct NewtonOutcome {
    converged: bool,
    n_iter: usize,
    y: DVector<f64>,
    d: DVector<f64>,
}

/// Simplified Newton iteration for `F(t_new, y_pred + d, (ψ + d)/c) = 0`.
///
/// The iteration stops without convergence when the estimated rate is too slow, when the
/// residual is not finite or reports a recoverable error, or when the iteration matrix is
/// singular. Fatal residual errors are propagated.
#[allow(clippy::too_many_arguments)]
fn solve_dae_system(
    fun: &ResidualFn,
    nfev: &mut usize,
    t_new: f64,
    y_predict: &DVector<f64>,
    c: f64,
    psi: &DVector<f64>,
    lu: &LU<f64, Dyn, Dyn>,
    scale: &DVector<f64>,
    tol: f64,
) -> Result<NewtonOutcome, MovColError> {
    let mut d = DVector::zeros(y_predict.len());
    let mut y = y_predict.clone();
    let mut dy_norm_old: Option<f64> = None;
    let mut converged = false;
    let mut k_: usize = 0;
    for k in 0..NEWTON_MAXITER {
        let yp = (psi + &d) / c;
        *nfev += 1;
        let f = match fun(t_new, &y, &yp) {
            Ok(f) => f,
            Err(e) if e.is_recoverable() => {
                debug!("residual rejected Newton iterate at t = {}: {}", t_new, e);
                break;
            }
            Err(e) => return Err(e),
        };
        if !f.iter().all(|&x| x.is_finite()) {
            break;
        }
        let dy = match lu.solve(&(c * f)) {
            Some(dy) => -dy,
            None => {
                debug!("singular iteration matrix at t = {}", t_new);
                break;
            }
        };
        let dy_norm = norm(&dy.component_div(scale));
        let rate = dy_norm_old.map(|old| dy_norm / old);
        if let Some(rate) = rate {
            if rate >= 1.0
                || (rate.powi((NEWTON_MAXITER - k) as i32) / (1.0 - rate)) * dy_norm > tol
            {
                break;
            }
        }
        y += &dy;
        d += &dy;
        k_ = k;
        if dy_norm == 0.0 {
            converged = true;
            break;
        }
        if let Some(rate) = rate {
            if rate / (1.0 - rate) * dy_norm < tol {
                converged = true;
                break;
            }
        }
        dy_norm_old = Some(dy_norm);
    }
    Ok(NewtonOutcome {
        converged,
        n_iter: k_ + 1,
        y,
        d,
    })
}

/// Accepted state of the integrator.
#[derive(Debug, Clone, PartialEq)]
pub struct DaeSnapshot {
    pub t: f64,
    pub y: DVector<f64>,
    pub yp: DVector<f64>,
}

/// Work counters of an integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegratorCounters {
    pub n_steps: usize,
    pub nfev: usize,
    pub njev: usize,
    pub nlu: usize,
}

impl AddAssign for IntegratorCounters {
    fn add_assign(&mut self, other: Self) {
        self.n_steps += other.n_steps;
        self.nfev += other.nfev;
        self.njev += other.njev;
        self.nlu += other.nlu;
    }
}

/// Stepping protocol consumed by the moving-collocation driver.
pub trait DaeStepper {
    /// Takes one accepted step. `Ok(None)` once the end of the interval was reached.
    fn advance(&mut self) -> Result<Option<DaeSnapshot>, MovColError>;
    fn counters(&self) -> IntegratorCounters {
        IntegratorCounters::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaeStatus {
    Running,
    Finished,
    Failed,
}

impl Display for DaeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DaeStatus::Running => "running",
            DaeStatus::Finished => "finished",
            DaeStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Integrator options; `first_step = None` selects the initial step automatically.
#[derive(Debug, Clone)]
pub struct DaeOptions {
    pub rtol: NumberOrVec,
    pub atol: NumberOrVec,
    pub max_step: f64,
    pub first_step: Option<f64>,
}

impl Default for DaeOptions {
    fn default() -> Self {
        DaeOptions {
            rtol: NumberOrVec::Number(1e-3),
            atol: NumberOrVec::Number(1e-6),
            max_step: f64::INFINITY,
            first_step: None,
        }
    }
}

/// Variable-order BDF integrator for `F(t, y, y') = 0`.
pub struct DAEBDF<'a> {
    fun: ResidualFn<'a>,
    pub t: f64,
    pub y: DVector<f64>,
    pub yp: DVector<f64>,
    pub t_bound: f64,
    pub rtol: NumberOrVec,
    pub atol: NumberOrVec,
    pub max_step: f64,
    pub h_abs: f64,
    pub order: usize,
    pub status: DaeStatus,
    n: usize,
    newton_tol: f64,
    n_equal_steps: usize,
    /// difference array, `(MAX_ORDER + 3) × n`
    D: DMatrix<f64>,
    alpha: DVector<f64>,
    gamma: DVector<f64>,
    error_const: DVector<f64>,
    Jy: DMatrix<f64>,
    Jyp: DMatrix<f64>,
    LU: Option<LU<f64, Dyn, Dyn>>,
    pub counters: IntegratorCounters,
}

impl<'a> DAEBDF<'a> {
    /// Validates the options, picks the first step and estimates the initial Jacobian.
    pub fn new(
        fun: ResidualFn<'a>,
        t0: f64,
        y0: DVector<f64>,
        yp0: DVector<f64>,
        t_bound: f64,
        options: DaeOptions,
    ) -> Result<Self, MovColError> {
        let n = y0.len();
        if yp0.len() != n {
            return Err(MovColError::PreconditionViolation(format!(
                "initial rate has {} components, state has {}",
                yp0.len(),
                n
            )));
        }
        if !(t_bound >= t0) {
            return Err(MovColError::PreconditionViolation(format!(
                "integration interval [{}, {}] must run forward",
                t0, t_bound
            )));
        }
        let (rtol, atol) = validate_tol(options.rtol, options.atol, n)?;
        let max_step = validate_max_step(options.max_step)?;
        let h_abs = match options.first_step {
            Some(first_step) => validate_first_step(first_step, t0, t_bound)?,
            None => select_initial_step(t0, &y0, &yp0, t_bound, max_step, &rtol, &atol),
        };

        let kappa = DVector::from_vec(vec![0.0, -0.1850, -1.0 / 9.0, -0.0823, -0.0415, 0.0]);
        let mut gamma = DVector::zeros(MAX_ORDER + 1);
        for k in 1..=MAX_ORDER {
            gamma[k] = gamma[k - 1] + 1.0 / k as f64;
        }
        let alpha = (DVector::from_element(MAX_ORDER + 1, 1.0) - &kappa).component_mul(&gamma);
        let error_const = kappa.component_mul(&gamma)
            + DVector::from_iterator(MAX_ORDER + 1, (0..=MAX_ORDER).map(|k| 1.0 / (k as f64 + 1.0)));

        let mut D = DMatrix::zeros(MAX_ORDER + 3, n);
        D.set_row(0, &y0.transpose());
        D.set_row(1, &(h_abs * &yp0).transpose());

        let newton_tol = newton_tol(&rtol);
        let status = if t_bound == t0 {
            DaeStatus::Finished
        } else {
            DaeStatus::Running
        };
        let mut solver = DAEBDF {
            fun,
            t: t0,
            y: y0,
            yp: yp0,
            t_bound,
            rtol,
            atol,
            max_step,
            h_abs,
            order: 1,
            status,
            n,
            newton_tol,
            n_equal_steps: 0,
            D,
            alpha,
            gamma,
            error_const,
            Jy: DMatrix::zeros(n, n),
            Jyp: DMatrix::zeros(n, n),
            LU: None,
            counters: IntegratorCounters::default(),
        };
        if solver.status == DaeStatus::Running {
            let (y, yp) = (solver.y.clone(), solver.yp.clone());
            solver.update_jacobian(t0, &y, &yp)?;
        }
        info!(
            "DAE BDF initialized: n = {}, t = [{}, {}], first step {:e}",
            n, t0, t_bound, h_abs
        );
        Ok(solver)
    }

    fn update_jacobian(
        &mut self,
        t: f64,
        y: &DVector<f64>,
        yp: &DVector<f64>,
    ) -> Result<(), MovColError> {
        self.counters.njev += 1;
        self.counters.nfev += 1;
        let f0 = (self.fun)(t, y, yp)?;
        if f0.len() != self.n {
            return Err(MovColError::PreconditionViolation(format!(
                "residual has {} components, state has {}",
                f0.len(),
                self.n
            )));
        }
        let (Jy, Jyp, nfev) = num_jac_dae(&self.fun, t, y, yp, &f0)?;
        self.counters.nfev += nfev;
        self.Jy = Jy;
        self.Jyp = Jyp;
        Ok(())
    }

    pub fn snapshot(&self) -> DaeSnapshot {
        DaeSnapshot {
            t: self.t,
            y: self.y.clone(),
            yp: self.yp.clone(),
        }
    }

    /// One accepted step with error control and order selection.
    pub fn _step_impl(&mut self) -> Result<(), MovColError> {
        let t = self.t;
        let mut D = self.D.clone();
        let max_step = self.max_step;
        let min_step = 10.0 * f64::max(f64::EPSILON * t.abs(), f64::MIN_POSITIVE);
        let order = self.order;
        let mut LU = self.LU.take();

        let mut h_abs = if self.h_abs > max_step {
            change_D(&mut D, order, max_step / self.h_abs);
            self.n_equal_steps = 0;
            LU = None;
            max_step
        } else if self.h_abs < min_step {
            change_D(&mut D, order, min_step / self.h_abs);
            self.n_equal_steps = 0;
            LU = None;
            min_step
        } else {
            self.h_abs
        };

        let mut current_jac = false;
        let mut step_accepted = false;
        let mut t_new = t;
        let mut safety = 0.0;
        let mut error_norm = 0.0;
        let mut scale = DVector::zeros(self.n);
        let mut outcome = NewtonOutcome {
            converged: false,
            n_iter: 0,
            y: DVector::zeros(self.n),
            d: DVector::zeros(self.n),
        };
        let mut psi = DVector::zeros(self.n);
        let mut c = 0.0;
        while !step_accepted {
            if h_abs < min_step {
                self.status = DaeStatus::Failed;
                return Err(MovColError::IntegratorFailure(format!(
                    "step size too small at t = {}",
                    t
                )));
            }
            t_new = t + h_abs;
            if t_new > self.t_bound {
                t_new = self.t_bound;
                change_D(&mut D, order, (t_new - t) / h_abs);
                self.n_equal_steps = 0;
                LU = None;
            }
            let h = t_new - t;
            h_abs = h.abs();

            let y_predict = D.rows(0, order + 1).row_sum().transpose();
            scale = scale_func(&self.rtol, &self.atol, &y_predict);
            psi = D.rows(1, order).transpose() * self.gamma.rows(1, order) / self.alpha[order];
            c = h / self.alpha[order];

            loop {
                let lu = match LU.take() {
                    Some(lu) => lu,
                    None => {
                        self.counters.nlu += 1;
                        (&self.Jyp + c * &self.Jy).lu()
                    }
                };
                outcome = solve_dae_system(
                    &self.fun,
                    &mut self.counters.nfev,
                    t_new,
                    &y_predict,
                    c,
                    &psi,
                    &lu,
                    &scale,
                    self.newton_tol,
                )?;
                LU = Some(lu);
                if outcome.converged || current_jac {
                    break;
                }
                let yp_predict = &psi / c;
                match self.update_jacobian(t_new, &y_predict, &yp_predict) {
                    Ok(()) => {}
                    Err(e) if e.is_recoverable() => {
                        warn!("Jacobian estimate failed at t = {}: {}", t_new, e);
                        break;
                    }
                    Err(e) => return Err(e),
                }
                LU = None;
                current_jac = true;
            }

            if !outcome.converged {
                let factor = 0.5;
                h_abs *= factor;
                change_D(&mut D, order, factor);
                self.n_equal_steps = 0;
                LU = None;
                // the Jacobian is re-estimated at the smaller step
                current_jac = false;
                debug!("Newton failed at t = {}, step halved to {:e}", t_new, h_abs);
                continue;
            }

            safety = 0.9 * (2.0 * (NEWTON_MAXITER as f64) + 1.0)
                / (2.0 * (NEWTON_MAXITER as f64) + outcome.n_iter as f64);
            scale = scale_func(&self.rtol, &self.atol, &outcome.y);
            let error = self.error_const[order] * &outcome.d;
            error_norm = norm(&error.component_div(&scale));
            if error_norm > 1.0 {
                let factor =
                    (safety * error_norm.powf(-1.0 / (order as f64 + 1.0))).max(MIN_FACTOR);
                h_abs *= factor;
                change_D(&mut D, order, factor);
                self.n_equal_steps = 0;
                LU = None;
            } else {
                step_accepted = true;
            }
        }

        let d = outcome.d;
        self.counters.n_steps += 1;
        self.n_equal_steps += 1;
        self.t = t_new;
        self.y = outcome.y;
        self.yp = (&psi + &d) / c;
        self.h_abs = h_abs;
        self.LU = LU;

        let D_ = D.clone();
        D.set_row(order + 2, &(d.transpose() - D_.row(order + 1)));
        D.set_row(order + 1, &d.transpose());
        for i in (0..order + 1).rev() {
            let D_ = D.clone();
            D.row_mut(i).add_assign(D_.row(i + 1));
        }

        if self.n_equal_steps < order + 1 {
            self.D = D;
            return Ok(());
        }

        let error_m_norm = if order > 1 {
            let error_m = self.error_const[order - 1] * D.row(order);
            norm(&error_m.transpose().component_div(&scale))
        } else {
            f64::INFINITY
        };
        let error_p_norm = if order < MAX_ORDER {
            let error_p = self.error_const[order + 1] * D.row(order + 2);
            norm(&error_p.transpose().component_div(&scale))
        } else {
            f64::INFINITY
        };

        let error_norms = [error_m_norm, error_norm, error_p_norm];
        let factors: DVector<f64> = DVector::from_iterator(
            3,
            error_norms
                .iter()
                .enumerate()
                .map(|(i, x)| x.powf(-1.0 / (order as f64 + i as f64))),
        );
        let delta_order = factors.argmax().0 as i32 - 1;
        self.order = ((order as i32) + delta_order).clamp(1, MAX_ORDER as i32) as usize;

        let factor = (safety * factors.max()).min(MAX_FACTOR);
        self.h_abs *= factor;
        change_D(&mut D, self.order, factor);
        self.n_equal_steps = 0;
        self.LU = None;
        self.D = D;
        Ok(())
    }

    /// Integrates to `t_bound`, returning every accepted snapshot.
    pub fn solve(&mut self) -> Result<Vec<DaeSnapshot>, MovColError> {
        let mut history = vec![self.snapshot()];
        while let Some(snapshot) = self.advance()? {
            history.push(snapshot);
        }
        info!(
            "DAE BDF {}: {} steps, {} residual evaluations, {} Jacobians",
            self.status, self.counters.n_steps, self.counters.nfev, self.counters.njev
        );
        Ok(history)
    }
}

impl DaeStepper for DAEBDF<'_> {
    fn advance(&mut self) -> Result<Option<DaeSnapshot>, MovColError> {
        if self.status != DaeStatus::Running {
            return Ok(None);
        }
        if let Err(e) = self._step_impl() {
            self.status = DaeStatus::Failed;
            return Err(e);
        }
        debug!(
            "t = {:.6e}, order {}, next step {:.3e}",
            self.t, self.order, self.h_abs
        );
        if self.t >= self.t_bound {
            self.status = DaeStatus::Finished;
        }
        Ok(Some(self.snapshot()))
    }

    fn counters(&self) -> IntegratorCounters {
        self.counters
    }
}

impl Iterator for DAEBDF<'_> {
    type Item = Result<DaeSnapshot, MovColError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(snapshot)) => Some(Ok(snapshot)),
            Ok(None) => None,
            Err(e) => {
                self.status = DaeStatus::Failed;
                Some(Err(e))
            }
        }
    }
}
