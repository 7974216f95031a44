//! Solver configuration: defaults, chained setters and loading from TOML.
//!
//! ```toml
//! [discretization]
//! ns = 2
//! nx = 21
//!
//! [integrator]
//! t_final = 1.0
//! rtol = 1e-4
//! atol = 1e-7
//! max_step = 0.1      # optional
//! first_step = 1e-6   # optional
//! max_steps = 100000
//!
//! [mesh]
//! tolerance = 1e-6
//! max_steps = 1000
//! horizon = 1e3
//! rtol = 1e-3
//! atol = 1e-6
//!
//! [logging]
//! loglevel = "info"   # debug, info, warn, error, off
//! log_to_file = false
//! ```
use crate::numerical::MovCol::errors::MovColError;
use crate::numerical::MovCol::mesh_init::MeshInitializer;
use log::LevelFilter;
use std::path::Path;
use toml::{Table, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// collocation points per element (even)
    pub ns: usize,
    /// mesh points
    pub nx: usize,
    pub t_final: f64,
    pub rtol: f64,
    pub atol: f64,
    pub max_step: f64,
    pub first_step: Option<f64>,
    /// ceiling on accepted integrator steps of the PDE run
    pub max_steps: usize,
    pub mesh_tolerance: f64,
    pub mesh_max_steps: usize,
    pub mesh_horizon: f64,
    pub mesh_rtol: f64,
    pub mesh_atol: f64,
    pub loglevel: String,
    pub log_to_file: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            ns: 2,
            nx: 21,
            t_final: 1.0,
            rtol: 1e-4,
            atol: 1e-7,
            max_step: f64::INFINITY,
            first_step: None,
            max_steps: 100_000,
            mesh_tolerance: 1e-6,
            mesh_max_steps: 1000,
            mesh_horizon: 1e3,
            mesh_rtol: 1e-3,
            mesh_atol: 1e-6,
            loglevel: "info".to_string(),
            log_to_file: false,
        }
    }
}

impl SolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ns(mut self, ns: usize) -> Self {
        self.ns = ns;
        self
    }
    pub fn nx(mut self, nx: usize) -> Self {
        self.nx = nx;
        self
    }
    pub fn t_final(mut self, t_final: f64) -> Self {
        self.t_final = t_final;
        self
    }
    pub fn tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }
    pub fn max_step(mut self, max_step: f64) -> Self {
        self.max_step = max_step;
        self
    }
    pub fn first_step(mut self, first_step: f64) -> Self {
        self.first_step = Some(first_step);
        self
    }
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
    pub fn mesh_tolerance(mut self, tolerance: f64) -> Self {
        self.mesh_tolerance = tolerance;
        self
    }
    pub fn mesh_max_steps(mut self, max_steps: usize) -> Self {
        self.mesh_max_steps = max_steps;
        self
    }
    pub fn mesh_horizon(mut self, horizon: f64) -> Self {
        self.mesh_horizon = horizon;
        self
    }
    pub fn mesh_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.mesh_rtol = rtol;
        self.mesh_atol = atol;
        self
    }
    pub fn loglevel(mut self, loglevel: &str) -> Self {
        self.loglevel = loglevel.to_string();
        self
    }
    pub fn log_to_file(mut self, log_to_file: bool) -> Self {
        self.log_to_file = log_to_file;
        self
    }

    /// Mesh relaxation settings.
    pub fn mesh_initializer(&self) -> MeshInitializer {
        MeshInitializer {
            tolerance: self.mesh_tolerance,
            max_steps: self.mesh_max_steps,
            horizon: self.mesh_horizon,
            rtol: self.mesh_rtol,
            atol: self.mesh_atol,
        }
    }

    pub fn level_filter(&self) -> Result<LevelFilter, MovColError> {
        match self.loglevel.to_lowercase().as_str() {
            "debug" => Ok(LevelFilter::Debug),
            "info" => Ok(LevelFilter::Info),
            "warn" => Ok(LevelFilter::Warn),
            "error" => Ok(LevelFilter::Error),
            "off" | "none" => Ok(LevelFilter::Off),
            other => Err(MovColError::Config(format!("unknown log level `{}`", other))),
        }
    }

    /// Checks the settings that do not depend on the problem.
    pub fn validate(&self) -> Result<(), MovColError> {
        let fail = |msg: String| Err(MovColError::PreconditionViolation(msg));
        if self.ns < 2 || self.ns % 2 != 0 {
            return fail(format!("ns must be even and at least 2, got {}", self.ns));
        }
        if self.nx < 2 {
            return fail(format!("nx must be at least 2, got {}", self.nx));
        }
        if !self.t_final.is_finite() {
            return fail(format!("t_final must be finite, got {}", self.t_final));
        }
        if !(self.rtol > 0.0) || !(self.atol >= 0.0) || !(self.mesh_rtol > 0.0) || !(self.mesh_atol >= 0.0) {
            return fail("tolerances must be positive".to_string());
        }
        if !(self.mesh_tolerance > 0.0) || !(self.mesh_horizon > 0.0) {
            return fail("mesh tolerance and horizon must be positive".to_string());
        }
        if self.max_steps == 0 || self.mesh_max_steps == 0 {
            return fail("step ceilings must be positive".to_string());
        }
        self.level_filter()?;
        Ok(())
    }

    /// Reads a configuration from a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(document: &str) -> Result<Self, MovColError> {
        let table: Table = toml::from_str(document)
            .map_err(|e| MovColError::Config(format!("cannot parse TOML: {}", e)))?;
        let mut config = SolverConfig::default();
        for (section, content) in table.iter() {
            let Value::Table(content) = content else {
                return Err(MovColError::Config(format!("`{}` must be a section", section)));
            };
            for (key, value) in content.iter() {
                config.set_key(section, key, value)?;
            }
        }
        Ok(config)
    }

    pub fn from_toml_file<T: AsRef<Path>>(path: T) -> Result<Self, MovColError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path)
            .map_err(|e| MovColError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&document)
    }

    fn set_key(&mut self, section: &str, key: &str, value: &Value) -> Result<(), MovColError> {
        let name = format!("{}.{}", section, key);
        match (section, key) {
            ("discretization", "ns") => self.ns = as_usize(&name, value)?,
            ("discretization", "nx") => self.nx = as_usize(&name, value)?,
            ("integrator", "t_final") => self.t_final = as_f64(&name, value)?,
            ("integrator", "rtol") => self.rtol = as_f64(&name, value)?,
            ("integrator", "atol") => self.atol = as_f64(&name, value)?,
            ("integrator", "max_step") => self.max_step = as_f64(&name, value)?,
            ("integrator", "first_step") => self.first_step = Some(as_f64(&name, value)?),
            ("integrator", "max_steps") => self.max_steps = as_usize(&name, value)?,
            ("mesh", "tolerance") => self.mesh_tolerance = as_f64(&name, value)?,
            ("mesh", "max_steps") => self.mesh_max_steps = as_usize(&name, value)?,
            ("mesh", "horizon") => self.mesh_horizon = as_f64(&name, value)?,
            ("mesh", "rtol") => self.mesh_rtol = as_f64(&name, value)?,
            ("mesh", "atol") => self.mesh_atol = as_f64(&name, value)?,
            ("logging", "loglevel") => match value {
                Value::String(level) => self.loglevel = level.clone(),
                _ => return Err(wrong_type(&name, "a string")),
            },
            ("logging", "log_to_file") => match value {
                Value::Boolean(flag) => self.log_to_file = *flag,
                _ => return Err(wrong_type(&name, "a boolean")),
            },
            _ => return Err(MovColError::Config(format!("unknown key `{}`", name))),
        }
        Ok(())
    }
}

fn wrong_type(name: &str, expected: &str) -> MovColError {
    MovColError::Config(format!("`{}` must be {}", name, expected))
}

fn as_f64(name: &str, value: &Value) -> Result<f64, MovColError> {
    match value {
        Value::Float(v) => Ok(*v),
        Value::Integer(v) => Ok(*v as f64),
        _ => Err(wrong_type(name, "a number")),
    }
}

fn as_usize(name: &str, value: &Value) -> Result<usize, MovColError> {
    match value {
        Value::Integer(v) if *v >= 0 => Ok(*v as usize),
        _ => Err(wrong_type(name, "a non-negative integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = SolverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Info);
    }

    #[test]
    fn test_setters_and_validation() {
        let config = SolverConfig::new().ns(4).nx(11).t_final(0.5).tolerances(1e-6, 1e-9);
        assert_eq!((config.ns, config.nx), (4, 11));
        assert!(config.validate().is_ok());
        assert!(SolverConfig::new().ns(3).validate().is_err());
        assert!(SolverConfig::new().ns(0).validate().is_err());
        assert!(SolverConfig::new().nx(1).validate().is_err());
        assert!(SolverConfig::new().tolerances(0.0, 1e-6).validate().is_err());
        assert!(matches!(
            SolverConfig::new().loglevel("loud").validate(),
            Err(MovColError::Config(_))
        ));
    }

    #[test]
    fn test_from_toml_str() {
        let document = r#"
            [discretization]
            ns = 4
            nx = 9

            [integrator]
            t_final = 2
            rtol = 1e-5
            first_step = 1e-4

            [mesh]
            tolerance = 1e-8
            max_steps = 50

            [logging]
            loglevel = "debug"
            log_to_file = true
        "#;
        let config = SolverConfig::from_toml_str(document).unwrap();
        assert_eq!(config.ns, 4);
        assert_eq!(config.nx, 9);
        assert_eq!(config.t_final, 2.0);
        assert_eq!(config.rtol, 1e-5);
        assert_eq!(config.atol, SolverConfig::default().atol);
        assert_eq!(config.first_step, Some(1e-4));
        assert_eq!(config.mesh_tolerance, 1e-8);
        assert_eq!(config.mesh_max_steps, 50);
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Debug);
        assert!(config.log_to_file);
        let initializer = config.mesh_initializer();
        assert_eq!(initializer.max_steps, 50);
    }

    #[test]
    fn test_bad_toml_documents() {
        for document in [
            "[discretization]\nns = \"two\"",
            "[discretization]\nnx = -3",
            "[integrator]\nrtol = true",
            "[integrator]\nspeed = 1.0",
            "ns = 2",
            "[mesh\n",
        ] {
            let err = SolverConfig::from_toml_str(document).unwrap_err();
            assert!(matches!(err, MovColError::Config(_)), "{}", document);
        }
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[discretization]\nnx = 5\n[integrator]\nt_final = 0.25").unwrap();
        let config = SolverConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.nx, 5);
        assert_eq!(config.t_final, 0.25);
        assert!(SolverConfig::from_toml_file("/nonexistent/movcol.toml").is_err());
    }
}
