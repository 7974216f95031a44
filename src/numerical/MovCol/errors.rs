use std::fmt;

/// Errors raised while building, assembling or integrating a moving collocation problem.
#[derive(Debug, Clone, PartialEq)]
pub enum MovColError {
    /// invalid input detected before any work is done (odd `ns`, `nx < 2`, ...)
    PreconditionViolation(String),
    /// mesh relaxation did not settle within its step ceiling
    ConvergenceFailure { steps: usize, velocity_norm: f64 },
    /// residual could not be evaluated at this iterate (non-positive monitor, tangled mesh,
    /// singular matrix). The integrator treats it as a failed Newton iteration.
    NumericDegeneracy(String),
    /// a user callback returned a result of the wrong size
    UserCallback {
        callback: &'static str,
        expected: usize,
        got: usize,
    },
    /// the integrator gave up (step size underflow)
    IntegratorFailure(String),
    /// invalid configuration value or unreadable configuration document
    Config(String),
}

impl MovColError {
    /// errors the integrator may recover from by shrinking the step
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MovColError::NumericDegeneracy(_))
    }
}

impl fmt::Display for MovColError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MovColError::PreconditionViolation(msg) => write!(f, "Precondition violated: {}", msg),
            MovColError::ConvergenceFailure {
                steps,
                velocity_norm,
            } => write!(
                f,
                "Mesh relaxation did not converge after {} steps (|xt|_inf = {:e})",
                steps, velocity_norm
            ),
            MovColError::NumericDegeneracy(msg) => write!(f, "Numeric degeneracy: {}", msg),
            MovColError::UserCallback {
                callback,
                expected,
                got,
            } => write!(
                f,
                "Callback `{}` returned {} values, expected {}",
                callback, got, expected
            ),
            MovColError::IntegratorFailure(msg) => write!(f, "Integrator failed: {}", msg),
            MovColError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for MovColError {}

/// checks the length of a callback result; `exact` rejects longer results too
pub fn check_callback_len(
    callback: &'static str,
    got: usize,
    expected: usize,
    exact: bool,
) -> Result<(), MovColError> {
    if got < expected || (exact && got != expected) {
        return Err(MovColError::UserCallback {
            callback,
            expected,
            got,
        });
    }
    Ok(())
}
