//! # Moving collocation solver
//!
//! Drives a [`PdeProblem`] from `t0` to `t_final`:
//! 1. validates the problem against the configuration,
//! 2. builds the collocation tables for `ns`,
//! 3. relaxes the uniform mesh of `nx` points for the initial data,
//! 4. integrates the combined state `y = [x; u]` (zero initial rate) with the DAE BDF
//!    integrator, keeping every accepted step in a [`MovColSolution`].
//!
//! ```ignore
//! let config = SolverConfig::new().ns(2).nx(21).t_final(1.0);
//! let mut solver = MovColSolver::new(&problem, config);
//! let last = solver.solve()?;
//! solver.save_to_csv("front.csv")?;
//! ```
use crate::Utils::logger::{init_logger, save_matrix_to_csv};
use crate::numerical::DAE_BDF::DAE_BDF_solver::{DAEBDF, DaeOptions, DaeSnapshot, DaeStepper};
use crate::numerical::DAE_BDF::common::{NumberOrVec, residual_fn};
use crate::numerical::MovCol::MovCol_utils::{CustomTimer, SolverStatistics};
use crate::numerical::MovCol::collocation_data::CollocationData;
use crate::numerical::MovCol::config::SolverConfig;
use crate::numerical::MovCol::discretization::MovColDiscretization;
use crate::numerical::MovCol::errors::MovColError;
use crate::numerical::MovCol::layout::{StateLayout, linspace};
use crate::numerical::MovCol::problem::PdeProblem;
use csv::Writer;
use log::{info, warn};
use nalgebra::{DMatrix, DVector};
use std::fs::File;
use std::io;
use std::path::Path;

/// History of accepted states `(t, y = [x; u], y')`.
#[derive(Debug, Clone)]
pub struct MovColSolution {
    pub layout: StateLayout,
    pub t: Vec<f64>,
    pub y: Vec<DVector<f64>>,
    pub yp: Vec<DVector<f64>>,
}

impl MovColSolution {
    pub fn new(layout: StateLayout) -> Self {
        MovColSolution {
            layout,
            t: Vec::new(),
            y: Vec::new(),
            yp: Vec::new(),
        }
    }

    pub fn push(&mut self, snapshot: DaeSnapshot) {
        self.t.push(snapshot.t);
        self.y.push(snapshot.y);
        self.yp.push(snapshot.yp);
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn last(&self) -> Option<DaeSnapshot> {
        let k = self.len().checked_sub(1)?;
        Some(DaeSnapshot {
            t: self.t[k],
            y: self.y[k].clone(),
            yp: self.yp[k].clone(),
        })
    }

    /// mesh positions at step `k`
    pub fn mesh(&self, k: usize) -> DVector<f64> {
        self.y[k].rows(0, self.layout.nx).clone_owned()
    }

    /// mesh velocities at step `k`
    pub fn mesh_velocity(&self, k: usize) -> DVector<f64> {
        self.yp[k].rows(0, self.layout.nx).clone_owned()
    }

    /// `d`-th spatial derivative of function `f` at every mesh point of step `k`
    pub fn derivative(&self, k: usize, d: usize, f: usize) -> DVector<f64> {
        let layout = &self.layout;
        DVector::from_iterator(
            layout.nx,
            (0..layout.nx).map(|i| self.y[k][layout.nx + layout.index(d, f, i)]),
        )
    }

    /// values of function `f` at every mesh point of step `k`
    pub fn values(&self, k: usize, f: usize) -> DVector<f64> {
        self.derivative(k, 0, f)
    }

    /// `nd × nu` node blocks of step `k`
    pub fn node_blocks(&self, k: usize) -> Vec<DMatrix<f64>> {
        let (_, u) = self.layout.split(&self.y[k]);
        self.layout.node_blocks(&u)
    }

    /// Final profile, one row per mesh point: `x, u0, .., u{nu-1}`.
    pub fn save_final_to_csv<T: AsRef<Path>>(&self, filename: T) -> io::Result<()> {
        let Some(k) = self.len().checked_sub(1) else {
            return Err(io::Error::other("empty solution"));
        };
        let nu = self.layout.nu;
        let mut matrix = DMatrix::zeros(self.layout.nx, nu);
        for f in 0..nu {
            matrix.set_column(f, &self.values(k, f));
        }
        let headers: Vec<String> = (0..nu).map(|f| format!("u{}", f)).collect();
        save_matrix_to_csv(&matrix, &headers, filename, &self.mesh(k), "x")
    }

    /// One row per (step, mesh point): `t, x, u0, .., u{nu-1}`.
    pub fn save_to_csv<T: AsRef<Path>>(&self, filename: T, names: Option<&[String]>) -> io::Result<()> {
        let file = File::create(filename)?;
        let mut writer = Writer::from_writer(file);
        let nu = self.layout.nu;
        let mut headers = vec!["t".to_string(), "x".to_string()];
        match names {
            Some(names) if names.len() == nu => headers.extend(names.iter().cloned()),
            _ => headers.extend((0..nu).map(|f| format!("u{}", f))),
        }
        writer.write_record(&headers)?;
        for k in 0..self.len() {
            let x = self.mesh(k);
            let blocks = self.node_blocks(k);
            for (i, block) in blocks.iter().enumerate() {
                let mut row = vec![self.t[k].to_string(), x[i].to_string()];
                row.extend((0..nu).map(|f| block[(0, f)].to_string()));
                writer.write_record(&row)?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

/// Moving collocation solver for one problem.
pub struct MovColSolver<'a, P: PdeProblem + ?Sized> {
    pub problem: &'a P,
    pub config: SolverConfig,
    pub solution: Option<MovColSolution>,
    pub statistics: SolverStatistics,
    pub timer: CustomTimer,
    /// mesh after relaxation, before the PDE run
    pub initial_mesh: Option<DVector<f64>>,
}

impl<'a, P: PdeProblem + ?Sized> MovColSolver<'a, P> {
    pub fn new(problem: &'a P, config: SolverConfig) -> Self {
        MovColSolver {
            problem,
            config,
            solution: None,
            statistics: SolverStatistics::default(),
            timer: CustomTimer::new(),
            initial_mesh: None,
        }
    }

    /// Checks problem and configuration before any work is done.
    pub fn validate(&self) -> Result<(), MovColError> {
        self.config.validate()?;
        let fail = |msg: String| Err(MovColError::PreconditionViolation(msg));
        if self.problem.nu() < 1 {
            return fail("the problem must have at least one function".to_string());
        }
        let (a, b) = self.problem.xspan();
        if !(a.is_finite() && b.is_finite() && a < b) {
            return fail(format!("xspan ({}, {}) must be finite and increasing", a, b));
        }
        let t0 = self.problem.t0();
        if !(self.config.t_final > t0) {
            return fail(format!(
                "t_final = {} must be greater than t0 = {}",
                self.config.t_final, t0
            ));
        }
        if !(self.problem.tau() >= 0.0 && self.problem.gamma() >= 0.0) {
            return fail("tau and gamma must be non-negative".to_string());
        }
        Ok(())
    }

    fn integrator_options(&self) -> DaeOptions {
        DaeOptions {
            rtol: NumberOrVec::Number(self.config.rtol),
            atol: NumberOrVec::Number(self.config.atol),
            max_step: self.config.max_step,
            first_step: self.config.first_step,
        }
    }

    /// Runs the whole solve and returns the final snapshot.
    pub fn solve(&mut self) -> Result<DaeSnapshot, MovColError> {
        if let Ok(level) = self.config.level_filter() {
            init_logger(level, self.config.log_to_file);
        }
        self.validate()?;
        self.timer.start();
        let config = &self.config;
        let data = CollocationData::new(config.ns)?;
        let (a, b) = self.problem.xspan();
        info!(
            "moving collocation: ns = {}, nx = {}, nu = {}, x in [{}, {}], t in [{}, {}]",
            config.ns,
            config.nx,
            self.problem.nu(),
            a,
            b,
            self.problem.t0(),
            config.t_final
        );

        self.timer.mesh_tic();
        let relaxed = config
            .mesh_initializer()
            .run(self.problem, &data, &linspace(a, b, config.nx))?;
        self.timer.mesh_tac();

        let disc = MovColDiscretization::new(self.problem, &data, config.nx);
        let y0 = disc.initial_state(&relaxed.x)?;
        let yp0 = DVector::zeros(y0.len());
        let mut solution = MovColSolution::new(disc.layout);
        solution.push(DaeSnapshot {
            t: self.problem.t0(),
            y: y0.clone(),
            yp: yp0.clone(),
        });

        self.timer.integration_tic();
        let fun = residual_fn(|t, y, yp| disc.residual(t, y, yp));
        let mut stepper = DAEBDF::new(
            fun,
            self.problem.t0(),
            y0,
            yp0,
            config.t_final,
            self.integrator_options(),
        )?;
        let outcome = integrate(&mut stepper, &mut solution, config.max_steps);
        self.timer.integration_tac();

        self.statistics = SolverStatistics {
            mesh_relaxation: relaxed.counters,
            integration: stepper.counters(),
            number_of_grid_points: config.nx,
            length_of_state: disc.layout.total_len(),
            snapshots: solution.len(),
        };
        self.statistics.log(Some(&self.timer));
        self.initial_mesh = Some(relaxed.x);
        let last = solution.last();
        self.solution = Some(solution);
        outcome?;
        last.ok_or_else(|| MovColError::IntegratorFailure("no snapshot recorded".to_string()))
    }

    pub fn get_result(&self) -> Option<&MovColSolution> {
        self.solution.as_ref()
    }

    pub fn save_to_csv<T: AsRef<Path>>(&self, filename: T) -> io::Result<()> {
        match &self.solution {
            Some(solution) => solution.save_to_csv(filename, None),
            None => Err(io::Error::other("nothing to save, run solve() first")),
        }
    }
}

/// Pulls snapshots from `stepper` into `solution` until the integrator is exhausted.
pub fn integrate<S: DaeStepper + ?Sized>(
    stepper: &mut S,
    solution: &mut MovColSolution,
    max_steps: usize,
) -> Result<(), MovColError> {
    let mut steps = 0;
    while let Some(snapshot) = stepper.advance()? {
        if steps == max_steps {
            warn!("step ceiling {} reached at t = {}", max_steps, snapshot.t);
            return Err(MovColError::IntegratorFailure(format!(
                "more than {} steps needed",
                max_steps
            )));
        }
        solution.push(snapshot);
        steps += 1;
    }
    Ok(())
}
