//! # Moving-collocation DAE
//!
//! Binds a problem, its collocation tables and the state layout into the residual
//! functions handed to the integrator:
//! - the combined residual `[resx; resu]` of the state `y = [x; u]` and its rate,
//! - the mesh-only residual used to relax the initial mesh, with the solution held at the
//!   initial data sampled on the current mesh and both mesh ends at rest.
use crate::numerical::MovCol::collocation_data::CollocationData;
use crate::numerical::MovCol::errors::MovColError;
use crate::numerical::MovCol::evaluator::domain_end_states;
use crate::numerical::MovCol::layout::{DiscreteState, StateLayout};
use crate::numerical::MovCol::mesh_residual::mesh_residual;
use crate::numerical::MovCol::problem::{FixedEndpoints, PdeProblem};
use crate::numerical::MovCol::solution_residual::solution_residual;
use nalgebra::DVector;

pub struct MovColDiscretization<'a, P: PdeProblem + ?Sized> {
    pub problem: &'a P,
    pub data: &'a CollocationData,
    pub layout: StateLayout,
}

impl<'a, P: PdeProblem + ?Sized> MovColDiscretization<'a, P> {
    pub fn new(problem: &'a P, data: &'a CollocationData, nx: usize) -> Self {
        let layout = StateLayout::new(data.nd(), problem.nu(), nx);
        MovColDiscretization {
            problem,
            data,
            layout,
        }
    }

    /// At least one element is needed to evaluate either residual.
    fn check_mesh(&self) -> Result<(), MovColError> {
        if self.layout.nx < 2 {
            return Err(MovColError::PreconditionViolation(format!(
                "a mesh of {} points has no elements, nx must be at least 2",
                self.layout.nx
            )));
        }
        Ok(())
    }

    /// Initial data `u0` on the mesh `x`, in solution layout.
    pub fn sample_initial(&self, x: &DVector<f64>) -> Result<DVector<f64>, MovColError> {
        let layout = &self.layout;
        let mut u = DVector::zeros(layout.solution_len());
        for (i, xi) in x.iter().enumerate() {
            let block = self.problem.u0(*xi);
            if block.shape() != (layout.nd, layout.nu) {
                return Err(MovColError::UserCallback {
                    callback: "u0",
                    expected: layout.block_len(),
                    got: block.len(),
                });
            }
            layout.set_node_block(&mut u, i, &block);
        }
        Ok(u)
    }

    /// Combined initial state `[x; u0(x)]`.
    pub fn initial_state(&self, x: &DVector<f64>) -> Result<DVector<f64>, MovColError> {
        let u = self.sample_initial(x)?;
        Ok(self.layout.join(x, &u))
    }

    /// Combined residual `[resx; resu]` at `(t, y, y')`.
    pub fn residual(
        &self,
        t: f64,
        y: &DVector<f64>,
        yp: &DVector<f64>,
    ) -> Result<DVector<f64>, MovColError> {
        self.check_mesh()?;
        let total = self.layout.total_len();
        if y.len() != total || yp.len() != total {
            return Err(MovColError::PreconditionViolation(format!(
                "state of length {} and rate of length {}, expected {}",
                y.len(),
                yp.len(),
                total
            )));
        }
        let state = DiscreteState::from_combined(&self.layout, y, yp);
        let (left, right) = domain_end_states(self.data, &state);
        let resx = mesh_residual(self.problem, self.data, t, &state, &left, &right)?;
        let resu = solution_residual(self.problem, self.data, t, &state, &left, &right)?;
        Ok(self.layout.join(&resx, &resu))
    }

    /// Mesh residual of the mesh `x` moving with `xt`, solution frozen at the initial data.
    pub fn mesh_only_residual(
        &self,
        t: f64,
        x: &DVector<f64>,
        xt: &DVector<f64>,
    ) -> Result<DVector<f64>, MovColError> {
        self.check_mesh()?;
        let nx = self.layout.nx;
        if x.len() != nx || xt.len() != nx {
            return Err(MovColError::PreconditionViolation(format!(
                "mesh of length {} and velocity of length {}, expected {}",
                x.len(),
                xt.len(),
                nx
            )));
        }
        let u = self.sample_initial(x)?;
        let ut = DVector::zeros(self.layout.solution_len());
        let state = DiscreteState::from_parts(&self.layout, x, xt, &u, &ut);
        let (left, right) = domain_end_states(self.data, &state);
        let fixed = FixedEndpoints::new(self.problem);
        mesh_residual(&fixed, self.data, t, &state, &left, &right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerical::MovCol::layout::linspace;
    use crate::numerical::MovCol::problem::PdeSystem;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    /// u_t = -u_x as F = u_t, G = -u, exact data u(x, t) = x - t; the mesh ends are pushed
    /// with unit speed apart
    fn advection() -> PdeSystem {
        PdeSystem::new(
            (0.0, 1.0),
            1,
            |x| DMatrix::from_column_slice(2, 1, &[x, 1.0]),
            |_t, _x, _u, ut| DVector::from_element(1, ut[(0, 0)]),
            |_t, _x, u, _ut| DVector::from_element(1, -u[(0, 0)]),
            |t, x, _xt, u, _ut| DVector::from_element(1, u[(0, 0)] - (x - t)),
            |t, x, _xt, u, _ut| DVector::from_element(1, u[(0, 0)] - (x - t)),
        )
        .with_monitor(|_t, _x, _u| 1.0)
        .with_boundary_motion(|_t, _x, xt, _u, _ut| xt - 0.5, |_t, _x, xt, _u, _ut| xt + 0.5)
    }

    #[test]
    fn test_initial_state_layout() {
        let problem = advection();
        let data = CollocationData::new(2).unwrap();
        let disc = MovColDiscretization::new(&problem, &data, 3);
        let x = linspace(0.0, 1.0, 3);
        let y = disc.initial_state(&x).unwrap();
        assert_eq!(y.as_slice(), &[0.0, 0.5, 1.0, 0.0, 1.0, 0.5, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_exact_state_has_zero_combined_residual() {
        // u = x - t on a uniform mesh at rest: u_t = -1 = ∂x(-u)
        let problem = advection();
        let data = CollocationData::new(2).unwrap();
        let nx = 4;
        let disc = MovColDiscretization::new(&problem, &data, nx);
        let t = 0.3;
        let x = linspace(0.0, 1.0, nx);
        let mut u = DVector::zeros(disc.layout.solution_len());
        let mut ut = DVector::zeros(disc.layout.solution_len());
        for i in 0..nx {
            u[disc.layout.index(0, 0, i)] = x[i] - t;
            u[disc.layout.index(1, 0, i)] = 1.0;
            ut[disc.layout.index(0, 0, i)] = -1.0;
        }
        let y = disc.layout.join(&x, &u);
        let yp = disc.layout.join(&DVector::zeros(nx), &ut);
        let res = disc.residual(t, &y, &yp).unwrap();
        assert_eq!(res.len(), nx + 2 * nx);
        // the user's boundary motion is active in the combined system
        assert_relative_eq!(res[0], -0.5);
        assert_relative_eq!(res[nx - 1], 0.5);
        // interior mesh rows and the whole solution block vanish
        for r in res.rows(1, nx - 2).iter() {
            assert_relative_eq!(*r, 0.0, epsilon = 1e-12);
        }
        for r in res.rows(nx, res.len() - nx).iter() {
            assert_relative_eq!(*r, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_mesh_only_residual_holds_ends() {
        let problem = advection();
        let data = CollocationData::new(2).unwrap();
        let disc = MovColDiscretization::new(&problem, &data, 3);
        let x = DVector::from_vec(vec![0.0, 0.25, 1.0]);
        let xt = DVector::from_vec(vec![0.1, 0.0, -0.2]);
        let res = disc.mesh_only_residual(0.0, &x, &xt).unwrap();
        assert_relative_eq!(res[0], 0.1);
        assert_relative_eq!(res[2], -0.2);
        assert!(res[1] < 0.0);
    }

    #[test]
    fn test_wrong_length_state_is_rejected() {
        let problem = advection();
        let data = CollocationData::new(2).unwrap();
        let disc = MovColDiscretization::new(&problem, &data, 3);
        let y = DVector::zeros(5);
        let err = disc.residual(0.0, &y, &y).unwrap_err();
        assert!(matches!(err, MovColError::PreconditionViolation(_)));
    }

    #[test]
    fn test_single_point_mesh_is_rejected() {
        let problem = advection();
        let data = CollocationData::new(2).unwrap();
        let disc = MovColDiscretization::new(&problem, &data, 1);
        let y = DVector::zeros(disc.layout.total_len());
        let err = disc.residual(0.0, &y, &y).unwrap_err();
        assert!(matches!(err, MovColError::PreconditionViolation(_)));
        let x = DVector::zeros(1);
        let err = disc.mesh_only_residual(0.0, &x, &x).unwrap_err();
        assert!(matches!(err, MovColError::PreconditionViolation(_)));
        let empty = MovColDiscretization::new(&problem, &data, 0);
        let y = DVector::zeros(0);
        assert!(matches!(
            empty.residual(0.0, &y, &y),
            Err(MovColError::PreconditionViolation(_))
        ));
    }

    #[test]
    fn test_wrong_initial_block_is_callback_error() {
        let problem = PdeSystem::new(
            (0.0, 1.0),
            1,
            |x| DMatrix::from_column_slice(1, 1, &[x]),
            |_t, _x, _u, ut| DVector::from_element(1, ut[(0, 0)]),
            |_t, _x, u, _ut| DVector::from_element(1, u[(1, 0)]),
            |_t, _x, _xt, u, _ut| DVector::from_element(1, u[(0, 0)]),
            |_t, _x, _xt, u, _ut| DVector::from_element(1, u[(0, 0)]),
        );
        let data = CollocationData::new(2).unwrap();
        let disc = MovColDiscretization::new(&problem, &data, 2);
        let err = disc.initial_state(&linspace(0.0, 1.0, 2)).unwrap_err();
        assert_eq!(
            err,
            MovColError::UserCallback {
                callback: "u0",
                expected: 2,
                got: 1
            }
        );
    }
}
