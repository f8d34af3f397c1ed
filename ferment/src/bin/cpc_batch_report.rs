// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run one CPC fermentation and print its product report.
//!
//! ```text
//! cpc_batch_report [CONFIG.json] [--trajectory]
//! ```
//!
//! Without a config file the reference batch is run. `--trajectory` also
//! prints the sampled states as CSV. Exit code 0 on success, 1 on any
//! configuration or integration error, 2 on bad usage.

use std::path::PathBuf;
use std::process::ExitCode;

use cpc_ferment::bio::fermentation::{simulate, ProductSummary, Trajectory};
use cpc_ferment::bio::kinetics::Field;
use cpc_ferment::config::FermentationConfig;
use cpc_ferment::error::{Error, Result};

struct Args {
    config: Option<PathBuf>,
    trajectory: bool,
}

fn parse_args() -> std::result::Result<Args, String> {
    let mut args = Args {
        config: None,
        trajectory: false,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--trajectory" => args.trajectory = true,
            "-h" | "--help" => return Err(String::new()),
            flag if flag.starts_with('-') => return Err(format!("unknown option {flag}")),
            path if args.config.is_none() => args.config = Some(PathBuf::from(path)),
            extra => return Err(format!("unexpected argument {extra}")),
        }
    }
    Ok(args)
}

fn write_trajectory<W: std::io::Write>(out: W, traj: &Trajectory) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(std::iter::once("t").chain(Field::ALL.iter().map(|f| f.symbol())))?;
    for (t, s) in traj.t.iter().zip(&traj.states) {
        let row = std::iter::once(format!("{t:.4}"))
            .chain(s.to_array().into_iter().map(|v| format!("{v:.6}")));
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => FermentationConfig::load(path)?,
        None => FermentationConfig::default(),
    };
    let batch = config.to_batch_run()?;
    let traj = simulate(&batch)?;
    let summary = ProductSummary::from_trajectory(&traj);

    if args.trajectory {
        write_trajectory(std::io::stdout(), &traj).map_err(|e| Error::Io {
            path: PathBuf::from("<stdout>"),
            source: e.into(),
        })?;
        println!();
    }
    println!("Final CPC concentration: {:.3} mg/L", summary.final_product);
    println!(
        "Maximum CPC concentration: {:.3} mg/L (t = {:.2} h)",
        summary.max_product, summary.peak_time
    );
    println!("Total CPC produced: {:.3} kg", summary.total_kg);
    if let Some(t) = traj.glucose_depletion_time(batch.params.phase_threshold) {
        println!("Glucose depleted by t = {t:.2} h");
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
            }
            eprintln!("usage: cpc_batch_report [CONFIG.json] [--trajectory]");
            return ExitCode::from(2);
        }
    };
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cpc_ferment::bio::fermentation::{BatchRun, TimeGrid};

    #[test]
    fn trajectory_csv_has_header_and_one_row_per_time() {
        let run = BatchRun {
            grid: TimeGrid::linspace(0.0, 2.0, 3).unwrap(),
            ..BatchRun::reference()
        };
        let traj = simulate(&run).unwrap();
        let mut out = Vec::new();
        write_trajectory(&mut out, &traj).unwrap();

        let mut rdr = csv::Reader::from_reader(out.as_slice());
        let header: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header.len(), 1 + Field::ALL.len());
        assert_eq!(header[0], "t");
        let rows: Vec<csv::StringRecord> = rdr.records().map(std::result::Result::unwrap).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][0], "0.0000");
        assert_eq!(&rows[2][0], "2.0000");
        assert_eq!(&rows[0][Field::Volume.index() + 1], "12000.000000");
    }
}
