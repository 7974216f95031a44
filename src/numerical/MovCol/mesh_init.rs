//! # Mesh initialization
//!
//! Before the PDE is integrated, the uniform starting mesh is relaxed to a steady state of
//! the mesh equation for the initial data: the mesh-only system (solution frozen at `u0`
//! sampled on the moving mesh, both ends at rest) is stepped in pseudo time until the
//! largest node velocity drops below `tolerance`. Running out of steps or of pseudo time
//! first is a `ConvergenceFailure`.
use crate::numerical::DAE_BDF::DAE_BDF_solver::{
    DAEBDF, DaeOptions, DaeStepper, IntegratorCounters,
};
use crate::numerical::DAE_BDF::common::{NumberOrVec, residual_fn};
use crate::numerical::MovCol::collocation_data::CollocationData;
use crate::numerical::MovCol::discretization::MovColDiscretization;
use crate::numerical::MovCol::errors::MovColError;
use crate::numerical::MovCol::problem::PdeProblem;
use log::{debug, info, warn};
use nalgebra::DVector;

/// Result of a mesh relaxation.
#[derive(Debug, Clone)]
pub struct RelaxedMesh {
    pub x: DVector<f64>,
    pub steps: usize,
    /// pseudo time reached
    pub t: f64,
    /// `‖xt‖∞` of the last step
    pub velocity_norm: f64,
    pub counters: IntegratorCounters,
}

/// Pulls steps from `stepper` until the mesh velocity (the first `nx` rate components)
/// is below `tolerance`.
pub fn relax<S: DaeStepper + ?Sized>(
    stepper: &mut S,
    nx: usize,
    tolerance: f64,
    max_steps: usize,
) -> Result<RelaxedMesh, MovColError> {
    let mut steps = 0;
    let mut velocity_norm = f64::INFINITY;
    while let Some(snapshot) = stepper.advance()? {
        steps += 1;
        velocity_norm = snapshot.yp.rows(0, nx).amax();
        debug!(
            "mesh relaxation step {}: t = {:e}, |xt| = {:e}",
            steps, snapshot.t, velocity_norm
        );
        if velocity_norm < tolerance {
            return Ok(RelaxedMesh {
                x: snapshot.y.rows(0, nx).clone_owned(),
                steps,
                t: snapshot.t,
                velocity_norm,
                counters: stepper.counters(),
            });
        }
        if steps >= max_steps {
            break;
        }
    }
    warn!(
        "mesh relaxation stopped after {} steps with |xt| = {:e}",
        steps, velocity_norm
    );
    Err(MovColError::ConvergenceFailure {
        steps,
        velocity_norm,
    })
}

/// Settings of the pseudo-time relaxation.
#[derive(Debug, Clone)]
pub struct MeshInitializer {
    pub tolerance: f64,
    pub max_steps: usize,
    /// pseudo-time horizon
    pub horizon: f64,
    pub rtol: f64,
    pub atol: f64,
}

impl Default for MeshInitializer {
    fn default() -> Self {
        MeshInitializer {
            tolerance: 1e-6,
            max_steps: 1000,
            horizon: 1e3,
            rtol: 1e-3,
            atol: 1e-6,
        }
    }
}

impl MeshInitializer {
    /// Relaxes the mesh `x0` for the initial data of `problem`.
    pub fn run<P: PdeProblem + ?Sized>(
        &self,
        problem: &P,
        data: &CollocationData,
        x0: &DVector<f64>,
    ) -> Result<RelaxedMesh, MovColError> {
        let nx = x0.len();
        let disc = MovColDiscretization::new(problem, data, nx);
        let t_data = problem.t0();
        // the residual sees the physical initial time, the integrator runs in pseudo time
        let fun = residual_fn(move |_s, x, xt| disc.mesh_only_residual(t_data, x, xt));
        let options = DaeOptions {
            rtol: NumberOrVec::Number(self.rtol),
            atol: NumberOrVec::Number(self.atol),
            ..DaeOptions::default()
        };
        let mut stepper = DAEBDF::new(fun, 0.0, x0.clone(), DVector::zeros(nx), self.horizon, options)?;
        let relaxed = relax(&mut stepper, nx, self.tolerance, self.max_steps)?;
        info!(
            "mesh relaxed in {} steps (pseudo time {:e}, |xt| = {:e})",
            relaxed.steps, relaxed.t, relaxed.velocity_norm
        );
        Ok(relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerical::DAE_BDF::DAE_BDF_solver::DaeSnapshot;
    use crate::numerical::MovCol::layout::linspace;
    use crate::numerical::MovCol::problem::PdeSystem;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    /// replays a fixed sequence of mesh velocities
    struct ScriptedStepper {
        velocities: Vec<f64>,
        next: usize,
    }

    impl DaeStepper for ScriptedStepper {
        fn advance(&mut self) -> Result<Option<DaeSnapshot>, MovColError> {
            let Some(&v) = self.velocities.get(self.next) else {
                return Ok(None);
            };
            self.next += 1;
            Ok(Some(DaeSnapshot {
                t: self.next as f64,
                y: DVector::from_vec(vec![0.0, 0.5, 1.0, 42.0]),
                yp: DVector::from_vec(vec![0.0, -v, 0.0, 1e3]),
            }))
        }
    }

    fn scripted(velocities: &[f64]) -> ScriptedStepper {
        ScriptedStepper {
            velocities: velocities.to_vec(),
            next: 0,
        }
    }

    #[test]
    fn test_relax_stops_at_tolerance() {
        let mut stepper = scripted(&[1.0, 1e-2, 1e-7, 1e-9]);
        let relaxed = relax(&mut stepper, 3, 1e-6, 10).unwrap();
        assert_eq!(relaxed.steps, 3);
        assert_eq!(relaxed.x.as_slice(), &[0.0, 0.5, 1.0]);
        assert_relative_eq!(relaxed.velocity_norm, 1e-7);
    }

    #[test]
    fn test_relax_step_ceiling() {
        let mut stepper = scripted(&[1.0; 20]);
        let err = relax(&mut stepper, 3, 1e-6, 5).unwrap_err();
        assert_eq!(
            err,
            MovColError::ConvergenceFailure {
                steps: 5,
                velocity_norm: 1.0
            }
        );
    }

    #[test]
    fn test_relax_exhausted_horizon() {
        let mut stepper = scripted(&[1.0, 0.5]);
        let err = relax(&mut stepper, 3, 1e-6, 100).unwrap_err();
        assert!(matches!(err, MovColError::ConvergenceFailure { steps: 2, .. }));
    }

    fn flat_problem() -> PdeSystem {
        PdeSystem::new(
            (0.0, 1.0),
            1,
            |_x| DMatrix::zeros(2, 1),
            |_t, _x, _u, ut| DVector::from_element(1, ut[(0, 0)]),
            |_t, _x, u, _ut| DVector::from_element(1, u[(1, 0)]),
            |_t, _x, _xt, u, _ut| DVector::from_element(1, u[(0, 0)]),
            |_t, _x, _xt, u, _ut| DVector::from_element(1, u[(0, 0)]),
        )
        .with_tau(1e-2)
        .with_gamma(1.0)
        .with_monitor(|_t, _x, _u| 1.0)
    }

    #[test]
    fn test_constant_monitor_relaxes_to_uniform_mesh() {
        let problem = flat_problem();
        let data = CollocationData::new(2).unwrap();
        let x0 = DVector::from_vec(vec![0.0, 0.1, 0.3, 0.8, 1.0]);
        let relaxed = MeshInitializer::default().run(&problem, &data, &x0).unwrap();
        let uniform = linspace(0.0, 1.0, 5);
        for i in 0..5 {
            assert_relative_eq!(relaxed.x[i], uniform[i], epsilon = 1e-4);
        }
        assert!(relaxed.velocity_norm < 1e-6);
        assert!(relaxed.counters.n_steps == relaxed.steps);
    }

    #[test]
    fn test_uniform_mesh_is_already_relaxed() {
        let problem = flat_problem();
        let data = CollocationData::new(2).unwrap();
        let relaxed = MeshInitializer::default()
            .run(&problem, &data, &linspace(0.0, 1.0, 5))
            .unwrap();
        assert_eq!(relaxed.steps, 1);
    }

    #[test]
    fn test_step_ceiling_is_convergence_failure() {
        let problem = flat_problem();
        let data = CollocationData::new(2).unwrap();
        let x0 = DVector::from_vec(vec![0.0, 0.1, 0.3, 0.8, 1.0]);
        let initializer = MeshInitializer {
            max_steps: 3,
            ..MeshInitializer::default()
        };
        let err = initializer.run(&problem, &data, &x0).unwrap_err();
        assert!(matches!(err, MovColError::ConvergenceFailure { steps: 3, .. }));
    }
}
