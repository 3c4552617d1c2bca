use std::collections::BTreeMap;
use std::io;

use log::debug;

use chrono::NaiveDate;

use serde::{Deserialize, Deserializer, Serialize};

use smartstring::alias::{String as SmartString};

use super::hopkins::{CaseRecord, EPIDEMY};

static CORONA_LABEL: &'static str = "Corona Virus 2019-nCoV";
static SARS: &'static str = "SARS";


/// One day of an epidemic next to the figures other epidemics are compared
/// by. Columns are in alphabetical order, as the dashboard expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpidemicSummary {
	#[serde(rename = "CFR", default, deserialize_with = "decimal_comma")]
	pub cfr: Option<f64>,
	#[serde(rename = "Confirmed")]
	pub confirmed: Option<u64>,
	#[serde(rename = "Date")]
	pub date: Option<NaiveDate>,
	#[serde(rename = "Deaths")]
	pub deaths: Option<u64>,
	#[serde(rename = "Epidemy")]
	pub epidemy: SmartString,
	#[serde(rename = "Name")]
	pub name: SmartString,
	#[serde(rename = "R0", default, deserialize_with = "decimal_comma")]
	pub r0: Option<f64>,
	#[serde(rename = "R0max", default, deserialize_with = "decimal_comma")]
	pub r0_max: Option<f64>,
	#[serde(rename = "R0min", default, deserialize_with = "decimal_comma")]
	pub r0_min: Option<f64>,
	pub end_year: SmartString,
	#[serde(default)]
	pub notes: SmartString,
	pub start_year: Option<i32>,
	pub years: SmartString,
}

// The comparison sheet is maintained with a German locale.
fn decimal_comma<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
	let raw: Option<SmartString> = Option::deserialize(d)?;
	let raw = match raw {
		Some(s) if !s.trim().is_empty() => s,
		_ => return Ok(None),
	};
	raw.trim().replace(',', ".").parse::<f64>().map(Some).map_err(|e| { <D::Error as serde::de::Error>::custom(e) })
}

/// Rows of other epidemics, in the column layout of `EpidemicSummary`.
pub fn read_epidemics<R: io::Read>(r: R) -> Result<Vec<EpidemicSummary>, csv::Error> {
	let mut reader = csv::Reader::from_reader(r);
	let mut result = Vec::new();
	for row in reader.deserialize() {
		result.push(row?);
	}
	debug!("read {} comparison rows", result.len());
	Ok(result)
}

fn corona_day(date: NaiveDate, confirmed: u64, deaths: u64) -> EpidemicSummary {
	EpidemicSummary{
		cfr: if confirmed > 0 { Some(deaths as f64 / confirmed as f64) } else { None },
		confirmed: Some(confirmed),
		date: Some(date),
		deaths: Some(deaths),
		epidemy: CORONA_LABEL.into(),
		name: EPIDEMY.into(),
		r0: Some(2.74),
		r0_max: Some(3.9),
		r0_min: Some(1.4),
		end_year: "present".into(),
		notes: SmartString::new(),
		start_year: Some(2019),
		years: "2019-".into(),
	}
}

/// `others` followed by one row per date of the case records, summed over
/// all locations.
pub fn epidemic_summaries(records: &[CaseRecord], others: Vec<EpidemicSummary>) -> Vec<EpidemicSummary> {
	let mut per_date: BTreeMap<NaiveDate, (u64, u64)> = BTreeMap::new();
	for rec in records.iter() {
		let day = per_date.entry(rec.date).or_insert((0, 0));
		day.0 += rec.confirmed;
		day.1 += rec.deaths;
	}

	let mut result = others;
	result.reserve(per_date.len());
	for (date, (confirmed, deaths)) in per_date.into_iter() {
		result.push(corona_day(date, confirmed, deaths));
	}
	result
}

/// SARS case rows in the layout of the case table. Rows without an
/// `Epidemy` column are labelled SARS.
pub fn read_sars<R: io::Read>(r: R) -> Result<Vec<CaseRecord>, csv::Error> {
	let mut reader = csv::Reader::from_reader(r);
	let mut result = Vec::new();
	for row in reader.deserialize() {
		let mut rec: CaseRecord = row?;
		if rec.epidemy.is_empty() {
			rec.epidemy = SARS.into();
		}
		result.push(rec);
	}
	debug!("read {} sars rows", result.len());
	Ok(result)
}

/// The case records with the SARS progression appended.
pub fn sars_progress(records: &[CaseRecord], sars: Vec<CaseRecord>) -> Vec<CaseRecord> {
	let mut result = Vec::with_capacity(records.len() + sars.len());
	result.extend_from_slice(records);
	result.extend(sars);
	result
}


#[cfg(test)]
mod tests {
	use super::*;

	use approx::assert_relative_eq;
	use indoc::indoc;

	use crate::countries::Iso3;
	use crate::export::write_table;

	fn record(iso3: &str, date: NaiveDate, confirmed: u64, deaths: u64) -> CaseRecord {
		CaseRecord{
			province: SmartString::new(),
			country: iso3.into(),
			lat: None,
			lng: None,
			date,
			confirmed,
			deaths,
			recovered: 0,
			iso3: Iso3::from(iso3),
			epidemy: EPIDEMY.into(),
		}
	}

	static OTHERS: &'static str = indoc! {"
		CFR,Confirmed,Date,Deaths,Epidemy,Name,R0,R0max,R0min,end_year,notes,start_year,years
		\"0,096\",8096,,774,Severe acute respiratory syndrome,SARS,\"2,75\",4,2,2003,,2002,2002-2003
		\"0,5\",,,,Ebola virus disease,Ebola,\"1,8\",2,\"1,5\",2016,West Africa,2013,2013-2016
	"};

	#[test]
	fn corona_days_follow_other_epidemics() {
		let d1 = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
		let d2 = NaiveDate::from_ymd_opt(2020, 3, 2).unwrap();
		let records = vec![
			record("CHN", d2, 450, 9),
			record("ITA", d1, 0, 0),
			record("CHN", d1, 400, 8),
			record("Other", d2, 50, 1),
		];
		let others = read_epidemics(OTHERS.as_bytes()).unwrap();
		let rows = epidemic_summaries(&records, others);

		let names: Vec<&str> = rows.iter().map(|r| { r.name.as_str() }).collect();
		assert_eq!(names, vec!["SARS", "Ebola", "Corona", "Corona"]);

		let day = &rows[3];
		assert_eq!(day.date, Some(d2));
		assert_eq!(day.confirmed, Some(500));
		assert_eq!(day.deaths, Some(10));
		assert_relative_eq!(day.cfr.unwrap(), 0.02);
		assert_eq!(day.epidemy.as_str(), "Corona Virus 2019-nCoV");
		assert_eq!(day.r0, Some(2.74));
		assert_eq!(day.start_year, Some(2019));
		assert_eq!(rows[2].confirmed, Some(400));
	}

	#[test]
	fn comparison_sheet_uses_decimal_commas() {
		let others = read_epidemics(OTHERS.as_bytes()).unwrap();
		assert_relative_eq!(others[0].cfr.unwrap(), 0.096);
		assert_relative_eq!(others[0].r0.unwrap(), 2.75);
		assert_relative_eq!(others[1].r0_min.unwrap(), 1.5);
		assert_eq!(others[1].confirmed, None);
		assert_eq!(others[1].notes.as_str(), "West Africa");
		assert_eq!(others[0].end_year.as_str(), "2003");
	}

	#[test]
	fn day_without_cases_has_no_fatality_rate() {
		let d1 = NaiveDate::from_ymd_opt(2020, 1, 22).unwrap();
		let rows = epidemic_summaries(&[record("CHN", d1, 0, 0)], Vec::new());
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].cfr, None);

		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("epidemic_days.csv");
		write_table(&path, &rows).unwrap();
		let written = std::fs::read_to_string(&path).unwrap();
		let mut lines = written.lines();
		assert_eq!(lines.next(), Some("CFR,Confirmed,Date,Deaths,Epidemy,Name,R0,R0max,R0min,end_year,notes,start_year,years"));
		assert_eq!(lines.next(), Some(",0,2020-01-22,0,Corona Virus 2019-nCoV,Corona,2.74,3.9,1.4,present,,2019,2019-"));
	}

	#[test]
	fn sars_rows_are_appended_to_cases() {
		let d1 = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
		let sars = read_sars(indoc! {"
			Province/State,Country/Region,Date,Confirmed,Deaths,Recovered,ISO3
			,Hong Kong SAR,2003-03-17,95,1,0,HKG
			,Canada,2003-03-17,8,2,0,CAN
		"}.as_bytes()).unwrap();
		assert_eq!(sars[0].epidemy.as_str(), "SARS");
		assert_eq!(sars[1].date, NaiveDate::from_ymd_opt(2003, 3, 17).unwrap());
		assert_eq!(sars[1].lat, None);

		let all = sars_progress(&[record("CHN", d1, 400, 8)], sars);
		let got: Vec<(&str, &str, u64)> = all.iter().map(|r| { (r.epidemy.as_str(), r.iso3.as_str(), r.confirmed) }).collect();
		assert_eq!(got, vec![("Corona", "CHN", 400), ("SARS", "HKG", 95), ("SARS", "CAN", 8)]);
	}
}
