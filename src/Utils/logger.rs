use chrono::Local;
use csv::Writer;
use nalgebra::{DMatrix, DVector};
use simplelog::*;
use std::fs::File;
use std::io;
use std::path::Path;

/// Installs a terminal logger and, if `log_to_file`, a file logger `log_<timestamp>.txt`.
/// Does nothing when a logger is already installed.
pub fn init_logger(level: LevelFilter, log_to_file: bool) {
    if level == LevelFilter::Off {
        return;
    }
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if log_to_file {
        let date_and_time = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let name = format!("log_{}.txt", date_and_time);
        if let Ok(file) = File::create(name) {
            loggers.push(WriteLogger::new(level, Config::default(), file));
        }
    }
    let _ = CombinedLogger::init(loggers);
}

/// Writes `matrix` with the column `x_mesh` in front, one row per mesh point.
pub fn save_matrix_to_csv<T: AsRef<Path>>(
    matrix: &DMatrix<f64>,
    headers: &[String],
    filename: T,
    x_mesh: &DVector<f64>,
    arg: &str,
) -> io::Result<()> {
    let file = File::create(filename)?;
    let mut writer = Writer::from_writer(file);

    let mut headers_with_x = vec![arg.to_string()];
    headers_with_x.extend(headers.iter().cloned());
    writer.write_record(&headers_with_x)?;

    for (i, row) in matrix.row_iter().enumerate() {
        let mut row_data = vec![x_mesh[i].to_string()];
        row_data.extend(row.iter().map(|&val| val.to_string()));
        writer.write_record(&row_data)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_matrix_to_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("final.csv");
        let matrix = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let x = DVector::from_vec(vec![0.0, 0.5]);
        save_matrix_to_csv(
            &matrix,
            &["u".to_string(), "v".to_string()],
            &path,
            &x,
            "x",
        )
        .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["x,u,v", "0,1,2", "0.5,3,4"]);
    }
}
