use chrono::NaiveDate;

mod ioutil;
mod progress;
pub mod location;
pub mod countries;
pub mod hopkins;
pub mod query;
pub mod response;
pub mod client;
pub mod join;
pub mod statistics;
pub mod comparisons;
pub mod export;
pub mod config;

pub use ioutil::{magic_open, open_resource};
pub use progress::*;
pub use location::{GeoLevel, Location, LocationId, LocationRef, LocationTable, Registry, UnknownLocation};
pub use countries::{CountryError, CountryInfo, CountryTable, Iso3, canonicalize_case_name, reconcile_code};
pub use hopkins::{CaseRecord, Metric};
pub use query::{EpiriskQuery, QueryError, QueryOptions, QueryRequest};
pub use response::{ConnectionsRisk, ExportedCases, MalformedResponse, Target};
pub use client::{Client, query_epirisk};
pub use join::{Bin, RiskCaseRow, RiskTier, join_risk_cases, latest_confirmed, risk_by_iso3};
pub use statistics::{BigNumbersRow, Region, big_numbers};
pub use comparisons::{EpidemicSummary, epidemic_summaries, read_epidemics, read_sars, sars_progress};
pub use export::write_table;
pub use config::Config;


/// All distinct dates present in the records, ascending.
pub fn record_dates(records: &[hopkins::CaseRecord]) -> Vec<NaiveDate> {
	let mut dates: Vec<NaiveDate> = records.iter().map(|rec| { rec.date }).collect();
	dates.sort();
	dates.dedup();
	dates
}

/// The records of a single day.
pub fn records_on(records: &[hopkins::CaseRecord], date: NaiveDate) -> Vec<hopkins::CaseRecord> {
	records.iter().filter(|rec| { rec.date == date }).cloned().collect()
}
