use std::collections::{BTreeMap, HashMap};
use std::collections::btree_map::Entry;
use std::fmt;
use std::io;

use log::{debug, info};

use chrono::NaiveDate;

use enum_map::{Enum, EnumMap};

use serde::{Deserialize, Serialize};

use smartstring::alias::{String as SmartString};

use super::countries::{CountryError, CountryTable, HasIso3, Iso3, reconcile_codes};
use super::ioutil::magic_open;

/// Columns before the first date column in the JHU CSSE time series files.
pub static FIXED_COLUMNS: usize = 4;

static DATE_FORMAT: &'static str = "%m/%d/%y";

pub static UNKNOWN_ISO3: &'static str = "Other";

pub static EPIDEMY: &'static str = "Corona";


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum Metric {
	Confirmed,
	Deaths,
	Recovered,
}

impl Metric {
	pub fn name(&self) -> &'static str {
		match self {
			Self::Confirmed => "Confirmed",
			Self::Deaths => "Deaths",
			Self::Recovered => "Recovered",
		}
	}
}


#[derive(Debug)]
pub enum Error {
	Io(io::Error),
	Csv(csv::Error),
	Request(reqwest::Error),
	Country(CountryError),
	InvalidHeader(String),
	InvalidValue{line: u64, column: String, value: String},
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Io(e) => fmt::Display::fmt(e, f),
			Self::Csv(e) => fmt::Display::fmt(e, f),
			Self::Request(e) => fmt::Display::fmt(e, f),
			Self::Country(e) => fmt::Display::fmt(e, f),
			Self::InvalidHeader(h) => write!(f, "invalid time series header column: {:?}", h),
			Self::InvalidValue{line, column, value} => write!(f, "invalid value {:?} in column {:?} on line {}", value, column, line),
		}
	}
}

impl From<io::Error> for Error {
	fn from(other: io::Error) -> Self {
		Self::Io(other)
	}
}

impl From<csv::Error> for Error {
	fn from(other: csv::Error) -> Self {
		Self::Csv(other)
	}
}

impl From<reqwest::Error> for Error {
	fn from(other: reqwest::Error) -> Self {
		Self::Request(other)
	}
}

impl From<CountryError> for Error {
	fn from(other: CountryError) -> Self {
		Self::Country(other)
	}
}

impl std::error::Error for Error {}


/// One non-zero cell of a wide time series file.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesValue {
	pub province: SmartString,
	pub country: SmartString,
	pub lat: Option<f64>,
	pub lng: Option<f64>,
	pub date: NaiveDate,
	pub value: u64,
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
	#[serde(rename = "Province/State", default)]
	pub province: SmartString,
	#[serde(rename = "Country/Region")]
	pub country: SmartString,
	#[serde(rename = "Lat")]
	pub lat: Option<f64>,
	#[serde(rename = "Long")]
	pub lng: Option<f64>,
	#[serde(rename = "Date")]
	pub date: NaiveDate,
	#[serde(rename = "Confirmed")]
	pub confirmed: u64,
	#[serde(rename = "Deaths")]
	pub deaths: u64,
	#[serde(rename = "Recovered")]
	pub recovered: u64,
	#[serde(rename = "ISO3", default)]
	pub iso3: Iso3,
	#[serde(rename = "Epidemy", default)]
	pub epidemy: SmartString,
}

impl HasIso3 for CaseRecord {
	fn iso3_mut(&mut self) -> &mut Iso3 {
		&mut self.iso3
	}
}


fn parse_coordinate(s: &str) -> Option<f64> {
	let s = s.trim();
	if s.len() == 0 {
		return None
	}
	s.parse::<f64>().ok()
}

fn parse_count(s: &str) -> Option<Result<u64, ()>> {
	let s = s.trim();
	if s.len() == 0 {
		return None
	}
	// some revisions of the files carry counts as floats
	match s.parse::<u64>() {
		Ok(v) => Some(Ok(v)),
		Err(_) => match s.parse::<f64>() {
			Ok(v) if v >= 0.0 && v.fract() == 0.0 => Some(Ok(v as u64)),
			_ => Some(Err(())),
		},
	}
}


/// Read one wide JHU CSSE time series into long form. When a date occurs
/// in several columns the last one wins; empty and zero cells are dropped.
pub fn read_series<R: io::Read>(r: R) -> Result<Vec<SeriesValue>, Error> {
	let mut r = csv::Reader::from_reader(r);
	let headers = r.headers()?.clone();
	if headers.len() < FIXED_COLUMNS {
		return Err(Error::InvalidHeader(headers.iter().collect::<Vec<_>>().join(",")))
	}

	let mut date_columns: HashMap<NaiveDate, usize> = HashMap::new();
	for (i, h) in headers.iter().enumerate().skip(FIXED_COLUMNS) {
		let date = NaiveDate::parse_from_str(h.trim(), DATE_FORMAT).map_err(|_| { Error::InvalidHeader(h.into()) })?;
		date_columns.insert(date, i);
	}
	let mut date_columns: Vec<(NaiveDate, usize)> = date_columns.into_iter().collect();
	date_columns.sort();

	let mut result = Vec::new();
	for row in r.records() {
		let row = row?;
		let line = row.position().map(|p| { p.line() }).unwrap_or(0);
		let province: SmartString = row.get(0).unwrap_or("").into();
		let country: SmartString = row.get(1).unwrap_or("").into();
		let lat = row.get(2).and_then(parse_coordinate);
		let lng = row.get(3).and_then(parse_coordinate);
		for (date, i) in date_columns.iter() {
			let raw = row.get(*i).unwrap_or("");
			let value = match parse_count(raw) {
				None => continue,
				Some(Ok(v)) => v,
				Some(Err(())) => return Err(Error::InvalidValue{
					line,
					column: headers.get(*i).unwrap_or("").into(),
					value: raw.into(),
				}),
			};
			if value == 0 {
				continue
			}
			result.push(SeriesValue{
				province: province.clone(),
				country: country.clone(),
				lat,
				lng,
				date: *date,
				value,
			});
		}
	}
	Ok(result)
}


/// Outer-merge the three metric series into one record per location and
/// date. Metrics missing for a key are zero.
pub fn merge_series(series: EnumMap<Metric, Vec<SeriesValue>>, countries: &CountryTable) -> Result<Vec<CaseRecord>, Error> {
	let mut merged: BTreeMap<(SmartString, SmartString, NaiveDate), CaseRecord> = BTreeMap::new();
	let mut iso3_cache: HashMap<SmartString, Iso3> = HashMap::new();
	for (metric, values) in series.into_iter() {
		debug!("merging {} {} values", values.len(), metric.name());
		for v in values {
			let k = (v.country.clone(), v.province.clone(), v.date);
			let rec = match merged.entry(k) {
				Entry::Occupied(e) => e.into_mut(),
				Entry::Vacant(e) => {
					let iso3 = match iso3_cache.get(&v.country) {
						Some(iso3) => iso3.clone(),
						None => {
							let iso3 = countries.to_iso3(&v.country, Some(UNKNOWN_ISO3))?;
							iso3_cache.insert(v.country.clone(), iso3.clone());
							iso3
						},
					};
					e.insert(CaseRecord{
						province: v.province,
						country: v.country,
						lat: v.lat,
						lng: v.lng,
						date: v.date,
						confirmed: 0,
						deaths: 0,
						recovered: 0,
						iso3,
						epidemy: EPIDEMY.into(),
					})
				},
			};
			match metric {
				Metric::Confirmed => rec.confirmed += v.value,
				Metric::Deaths => rec.deaths += v.value,
				Metric::Recovered => rec.recovered += v.value,
			}
		}
	}
	let mut result: Vec<CaseRecord> = merged.into_iter().map(|(_, rec)| { rec }).collect();
	reconcile_codes(&mut result[..]);
	Ok(result)
}


fn is_remote(source: &str) -> bool {
	source.starts_with("http://") || source.starts_with("https://")
}

/// Load and merge the three series. Each source is either an http(s) URL or
/// a local (optionally gzipped) file.
pub fn load_cases(
		client: &reqwest::blocking::Client,
		sources: &EnumMap<Metric, String>,
		countries: &CountryTable,
) -> Result<Vec<CaseRecord>, Error> {
	let mut series: EnumMap<Metric, Vec<SeriesValue>> = EnumMap::default();
	for (metric, source) in sources.iter() {
		info!("loading {} series from {}", metric.name(), source);
		series[metric] = if is_remote(source) {
			let resp = client.get(source.as_str()).send()?.error_for_status()?;
			let body = resp.bytes()?;
			read_series(&body[..])?
		} else {
			read_series(magic_open(source)?)?
		};
	}
	merge_series(series, countries)
}

/// The most recent date present in the records.
pub fn latest_date(records: &[CaseRecord]) -> Option<NaiveDate> {
	records.iter().map(|rec| { rec.date }).max()
}
