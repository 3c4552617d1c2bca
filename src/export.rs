use std::fs;
use std::path::Path;

use log::info;

use serde::{Serialize};


pub static CASES_TABLE: &'static str = "cases.csv";
pub static CONNECTIONS_TABLE: &'static str = "connections.csv";
pub static RISKS_TABLE: &'static str = "risks.csv";
pub static EXPORTED_CASES_TABLE: &'static str = "exported_cases.csv";
pub static RISK_CASES_TABLE: &'static str = "risk_cases.csv";
pub static BIG_NUMBERS_TABLE: &'static str = "big_numbers.csv";
pub static EPIDEMIC_DAYS_TABLE: &'static str = "epidemic_days.csv";
pub static CASES_WITH_SARS_TABLE: &'static str = "cases_with_sars.csv";


/// Write `rows` as a CSV table with a header line, creating missing parent
/// directories.
pub fn write_table<P: AsRef<Path>, T: Serialize>(path: P, rows: &[T]) -> Result<(), csv::Error> {
	let path = path.as_ref();
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	let mut w = csv::Writer::from_path(path)?;
	for row in rows.iter() {
		w.serialize(row)?;
	}
	w.flush()?;
	info!("wrote {} rows to {}", rows.len(), path.display());
	Ok(())
}
