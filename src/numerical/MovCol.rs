//! Moving collocation method for time-dependent PDE systems
//! ```text
//! F(t, x, u, u_t) = ∂G(t, x, u, u_t)/∂x,   x ∈ [a, b]
//! ```
//! The mesh moves with the solution by an equidistribution equation and mesh and solution
//! are integrated together as one DAE system.
/// Gauss and Lobatto nodes on [0, 1]
pub mod nodes;
/// Hermite interpolation tables and the flux matrix, built once per number of collocation points
pub mod collocation_data;
/// derivatives inside an element from the node data of its ends
pub mod evaluator;
/// index bookkeeping of state and residual vectors
pub mod layout;
/// problem definition: trait and closure based implementation
pub mod problem;
/// collocation residual of the PDE and boundary conditions
pub mod solution_residual;
/// residual of the moving mesh equation
pub mod mesh_residual;
/// combined residual handed to the integrator
pub mod discretization;
/// relaxation of the initial mesh
pub mod mesh_init;
/// configuration with TOML loading
pub mod config;
/// error type
pub mod errors;
/// solver api: validation, mesh relaxation, integration, results
pub mod MovCol_main;
/// timer and statistics
pub mod MovCol_utils;
