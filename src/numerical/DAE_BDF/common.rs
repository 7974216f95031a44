//! Helpers shared by the DAE BDF integrator: tolerances, weighted norms, the initial step
//! and the finite-difference Jacobian of an implicit residual `F(t, y, y')`.
use crate::numerical::MovCol::errors::MovColError;
use log::{info, warn};
use nalgebra::{DMatrix, DVector};
use std::fmt::Debug;

const EPS: f64 = f64::EPSILON;

/// Implicit residual `F(t, y, y')`. A recoverable error makes the integrator shrink the step.
pub type ResidualFn<'a> =
    Box<dyn Fn(f64, &DVector<f64>, &DVector<f64>) -> Result<DVector<f64>, MovColError> + 'a>;

/// Boxes a residual closure.
pub fn residual_fn<'a, F>(f: F) -> ResidualFn<'a>
where
    F: Fn(f64, &DVector<f64>, &DVector<f64>) -> Result<DVector<f64>, MovColError> + 'a,
{
    Box::new(f)
}

// rtol or atol can be a number or a vector
#[derive(Clone, PartialEq)]
pub enum NumberOrVec {
    Number(f64),
    Vec(Vec<f64>),
}

impl Debug for NumberOrVec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumberOrVec::Number(n) => write!(f, "{}", n),
            NumberOrVec::Vec(v) => write!(f, "{:?}", v),
        }
    }
}

impl NumberOrVec {
    /// component `i`, the scalar itself for `Number`
    pub fn at(&self, i: usize) -> f64 {
        match self {
            NumberOrVec::Number(x) => *x,
            NumberOrVec::Vec(v) => v[i],
        }
    }

    pub fn min_value(&self) -> f64 {
        match self {
            NumberOrVec::Number(x) => *x,
            NumberOrVec::Vec(v) => v.iter().cloned().fold(f64::INFINITY, f64::min),
        }
    }
}

pub fn newton_tol(rtol: &NumberOrVec) -> f64 {
    let rtol_i = rtol.min_value();
    f64::max(10.0 * EPS / rtol_i, f64::min(0.03, rtol_i.powf(0.5)))
}

/// root mean square norm
pub fn norm(vector: &DVector<f64>) -> f64 {
    if vector.is_empty() {
        return 0.0;
    }
    vector.norm() / (vector.len() as f64).sqrt()
}

/// atol_i + |y_i|·rtol_i
pub fn scale_func(rtol: &NumberOrVec, atol: &NumberOrVec, y: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(
        y.len(),
        y.iter()
            .enumerate()
            .map(|(i, y_i)| atol.at(i) + y_i.abs() * rtol.at(i)),
    )
}

pub fn validate_tol(
    rtol: NumberOrVec,
    atol: NumberOrVec,
    n: usize,
) -> Result<(NumberOrVec, NumberOrVec), MovColError> {
    let floor = 100.0 * EPS;
    let rtol = match rtol {
        NumberOrVec::Number(rtol_i) => {
            if rtol_i < floor {
                warn!("`rtol` is too small. Setting `rtol = max(rtol, 100·EPS)`.");
            }
            NumberOrVec::Number(f64::max(rtol_i, floor))
        }
        NumberOrVec::Vec(rtol) => {
            if rtol.len() != n {
                return Err(MovColError::PreconditionViolation(format!(
                    "`rtol` has {} components, state has {}",
                    rtol.len(),
                    n
                )));
            }
            if rtol.iter().any(|&r| r < floor) {
                warn!("At least one element of `rtol` is too small. Setting `rtol = max(rtol, 100·EPS)`.");
            }
            NumberOrVec::Vec(rtol.into_iter().map(|r| f64::max(r, floor)).collect())
        }
    };
    let atol_ok = match &atol {
        NumberOrVec::Number(atol) => *atol >= 0.0,
        NumberOrVec::Vec(atol) => atol.len() == n && atol.iter().all(|&x| x >= 0.0),
    };
    if !atol_ok {
        return Err(MovColError::PreconditionViolation(
            "`atol` must be non-negative and match the state length".to_string(),
        ));
    }
    Ok((rtol, atol))
}

pub fn validate_first_step(first_step: f64, t0: f64, t_bound: f64) -> Result<f64, MovColError> {
    if !(first_step > 0.0) {
        return Err(MovColError::PreconditionViolation(
            "`first_step` must be positive.".to_string(),
        ));
    }
    if first_step > (t_bound - t0).abs() {
        return Err(MovColError::PreconditionViolation(
            "`first_step` exceeds bounds.".to_string(),
        ));
    }
    info!("first step validation: done");
    Ok(first_step)
}

pub fn validate_max_step(max_step: f64) -> Result<f64, MovColError> {
    if !(max_step > 0.0) {
        return Err(MovColError::PreconditionViolation(
            "`max_step` must be positive.".to_string(),
        ));
    }
    Ok(max_step)
}

/// Initial step from the size of the state and of its (possibly rough) initial rate:
/// `0.01·‖y0‖/‖y0'‖`, or `1e-6` when either norm is tiny.
pub fn select_initial_step(
    t0: f64,
    y0: &DVector<f64>,
    yp0: &DVector<f64>,
    t_bound: f64,
    max_step: f64,
    rtol: &NumberOrVec,
    atol: &NumberOrVec,
) -> f64 {
    if y0.is_empty() {
        return f64::INFINITY;
    }
    let interval_length = (t_bound - t0).abs();
    if interval_length == 0.0 {
        return 0.0;
    }
    let scale = scale_func(rtol, atol, y0);
    let d0 = norm(&y0.component_div(&scale));
    let d1 = norm(&yp0.component_div(&scale));
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };
    h0.min(interval_length).min(max_step)
}

/// Forward-difference Jacobians `(∂F/∂y, ∂F/∂y')` at `(t, y, yp)`, `f0 = F(t, y, yp)`.
/// Returns the two blocks and the number of residual evaluations spent.
pub fn num_jac_dae(
    fun: &ResidualFn,
    t: f64,
    y: &DVector<f64>,
    yp: &DVector<f64>,
    f0: &DVector<f64>,
) -> Result<(DMatrix<f64>, DMatrix<f64>, usize), MovColError> {
    let n = y.len();
    let m = f0.len();
    let mut Jy = DMatrix::zeros(m, n);
    let mut Jyp = DMatrix::zeros(m, n);
    let mut y_shift = y.clone();
    let mut yp_shift = yp.clone();
    for j in 0..n {
        let h = fd_step(y[j]);
        y_shift[j] = y[j] + h;
        let f = fun(t, &y_shift, yp)?;
        Jy.set_column(j, &((f - f0) / (y_shift[j] - y[j])));
        y_shift[j] = y[j];

        let h = fd_step(yp[j]);
        yp_shift[j] = yp[j] + h;
        let f = fun(t, y, &yp_shift)?;
        Jyp.set_column(j, &((f - f0) / (yp_shift[j] - yp[j])));
        yp_shift[j] = yp[j];
    }
    Ok((Jy, Jyp, 2 * n))
}

fn fd_step(v: f64) -> f64 {
    EPS.sqrt() * (1.0 + v.abs())
}
