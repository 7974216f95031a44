//! Numerical solvers
/// Moving collocation solver for time-dependent PDE systems on an adaptive mesh
/// ```ignore
/// let problem = PdeSystem::new((0.0, 1.0), 1, u0, F, G, Bl, Br).with_tau(1e-2);
/// let config = SolverConfig::new().ns(2).nx(21).t_final(1.0);
/// let mut solver = MovColSolver::new(&problem, config);
/// let last = solver.solve()?;
/// ```
pub mod MovCol;
/// BDF solver for implicit differential-algebraic systems F(t, y, y') = 0
pub mod DAE_BDF;
