use crate::numerical::MovCol::MovCol_main::MovColSolver;
use crate::numerical::MovCol::config::SolverConfig;
use crate::numerical::MovCol::problem::PdeSystem;
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

/// Burgers travelling front `u_t + u·u_x = eps·u_xx`,
/// exact `u = (1 - tanh((x - t/2 - 1/4)/(4 eps)))/2`
pub fn burgers_front(eps: f64) -> PdeSystem {
    let exact = move |x: f64, t: f64| -> (f64, f64) {
        let th = ((x - 0.5 * t - 0.25) / (4.0 * eps)).tanh();
        (0.5 * (1.0 - th), -0.5 * (1.0 - th * th) / (4.0 * eps))
    };
    PdeSystem::new(
        (0.0, 1.0),
        1,
        move |x| {
            let (u, ux) = exact(x, 0.0);
            DMatrix::from_column_slice(2, 1, &[u, ux])
        },
        |_t, _x, u, ut| DVector::from_element(1, ut[(0, 0)] + u[(0, 0)] * u[(1, 0)]),
        move |_t, _x, u, _ut| DVector::from_element(1, eps * u[(1, 0)]),
        move |t, x, _xt, u, _ut| DVector::from_element(1, u[(0, 0)] - exact(x, t).0),
        move |t, x, _xt, u, _ut| DVector::from_element(1, u[(0, 0)] - exact(x, t).0),
    )
    .with_tau(1e-2)
    .with_gamma(1.0)
}

/// heat equation `u_t = u_xx`, `u(x, 0) = sin(πx)`, homogeneous Dirichlet data
pub fn heat_sine() -> PdeSystem {
    PdeSystem::new(
        (0.0, 1.0),
        1,
        |x| {
            DMatrix::from_column_slice(
                4,
                1,
                &[
                    (PI * x).sin(),
                    PI * (PI * x).cos(),
                    -PI * PI * (PI * x).sin(),
                    -PI.powi(3) * (PI * x).cos(),
                ],
            )
        },
        |_t, _x, _u, ut| DVector::from_element(1, ut[(0, 0)]),
        |_t, _x, u, _ut| DVector::from_element(1, u[(1, 0)]),
        |_t, _x, _xt, u, _ut| DVector::from_vec(vec![u[(0, 0)], u[(2, 0)]]),
        |_t, _x, _xt, u, _ut| DVector::from_vec(vec![u[(0, 0)], u[(2, 0)]]),
    )
    .with_tau(1e-2)
    .with_monitor(|_t, _x, _u| 1.0)
}

pub fn movcol_examples(example: usize) {
    match example {
        0 => {
            let problem = burgers_front(1e-2);
            let config = SolverConfig::new().ns(2).nx(21).t_final(1.0);
            let mut solver = MovColSolver::new(&problem, config);
            match solver.solve() {
                Ok(last) => {
                    let nx = solver.config.nx;
                    println!("t = {}, mesh = {:.3}", last.t, last.y.rows(0, nx).transpose());
                    if let Some(solution) = solver.get_result() {
                        let _ = solution.save_final_to_csv("burgers_front.csv");
                    }
                }
                Err(e) => println!("Burgers front failed: {}", e),
            }
        }
        1 => {
            let problem = heat_sine();
            let config = SolverConfig::new().ns(4).nx(6).t_final(0.1);
            let mut solver = MovColSolver::new(&problem, config);
            match solver.solve() {
                Ok(last) => {
                    let solution = solver.get_result();
                    if let Some(solution) = solution {
                        let k = solution.len() - 1;
                        println!("t = {}, u = {:.5}", last.t, solution.values(k, 0).transpose());
                    }
                }
                Err(e) => println!("heat equation failed: {}", e),
            }
        }
        _ => println!("no example {}", example),
    }
}
