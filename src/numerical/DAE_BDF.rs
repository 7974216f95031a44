/// SOLVER OF IMPLICIT DAE SYSTEMS F(t, y, y') = 0
/// variable order BDF in difference-array form, generalization of the scipy BDF
pub mod DAE_BDF_solver;
/// tolerances, norms, initial step and finite-difference jacobians
pub mod common;
