use crate::numerical::DAE_BDF::DAE_BDF_solver::IntegratorCounters;
use log::info;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tabled::{builder::Builder, settings::Style};

/// Human readable duration: unit and value.
pub fn elapsed_time(elapsed: Duration) -> (String, f64) {
    let time = elapsed.as_millis();
    if time < 1000 {
        (" ms".to_string(), time as f64)
    } else if time < 60_000 {
        (" s".to_string(), elapsed.as_secs_f64())
    } else if time < 3_600_000 {
        (" min".to_string(), elapsed.as_secs_f64() / 60.0)
    } else {
        (" h".to_string(), elapsed.as_secs_f64() / 3600.0)
    }
}

/// Wall-clock time of the solver phases.
#[derive(Debug, Clone)]
pub struct CustomTimer {
    pub start: Instant,
    pub mesh_time: Instant,
    pub mesh: Duration,
    pub integration_time: Instant,
    pub integration: Duration,
}

impl Default for CustomTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomTimer {
    pub fn new() -> CustomTimer {
        CustomTimer {
            start: Instant::now(),
            mesh_time: Instant::now(),
            mesh: Duration::from_secs(0),
            integration_time: Instant::now(),
            integration: Duration::from_secs(0),
        }
    }
    pub fn start(&mut self) {
        *self = CustomTimer::new();
    }
    pub fn mesh_tic(&mut self) {
        self.mesh_time = Instant::now();
    }
    pub fn mesh_tac(&mut self) {
        self.mesh += self.mesh_time.elapsed();
    }
    pub fn integration_tic(&mut self) {
        self.integration_time = Instant::now();
    }
    pub fn integration_tac(&mut self) {
        self.integration += self.integration_time.elapsed();
    }

    pub fn get_all(&self) -> HashMap<String, String> {
        let mut timer_data: HashMap<String, String> = HashMap::new();
        let total = self.start.elapsed();
        let total_ns = total.as_nanos().max(1) as f64;
        let (unit, value) = elapsed_time(total);
        timer_data.insert(format!("time elapsed,{}", unit), format!("{}", value));
        let mesh_percent = 100.0 * self.mesh.as_nanos() as f64 / total_ns;
        timer_data.insert(
            "mesh relaxation %".to_string(),
            format!("{}", (mesh_percent * 1000.0).round() / 1000.0),
        );
        let integration_percent = 100.0 * self.integration.as_nanos() as f64 / total_ns;
        timer_data.insert(
            "integration %".to_string(),
            format!("{}", (integration_percent * 1000.0).round() / 1000.0),
        );
        timer_data
    }
}

/// Work done by a solve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverStatistics {
    pub mesh_relaxation: IntegratorCounters,
    pub integration: IntegratorCounters,
    pub number_of_grid_points: usize,
    pub length_of_state: usize,
    pub snapshots: usize,
}

impl SolverStatistics {
    pub fn as_map(&self) -> HashMap<String, usize> {
        let mut stats = HashMap::new();
        let mesh = &self.mesh_relaxation;
        let pde = &self.integration;
        stats.insert("mesh relaxation steps".to_string(), mesh.n_steps);
        stats.insert("integration steps".to_string(), pde.n_steps);
        stats.insert("residual evaluations".to_string(), mesh.nfev + pde.nfev);
        stats.insert("jacobian evaluations".to_string(), mesh.njev + pde.njev);
        stats.insert("LU factorizations".to_string(), mesh.nlu + pde.nlu);
        stats.insert("number of grid points".to_string(), self.number_of_grid_points);
        stats.insert("length of y vector".to_string(), self.length_of_state);
        stats.insert("stored snapshots".to_string(), self.snapshots);
        stats
    }

    pub fn table(&self) -> String {
        let mut table = Builder::from(self.as_map()).build();
        table.with(Style::modern_rounded());
        table.to_string()
    }

    pub fn log(&self, timer: Option<&CustomTimer>) {
        info!("\n \n CALC STATISTICS \n \n {}", self.table());
        if let Some(timer) = timer {
            let mut table = Builder::from(timer.get_all()).build();
            table.with(Style::modern_rounded());
            info!("\n \n TIMER \n \n {}", table.to_string());
        }
    }
}
