use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;
use std::fmt;

use log::{debug, trace};

use serde::{Serialize};
use serde_json::{Map, Value};

use smartstring::alias::{String as SmartString};

use super::countries::canonicalize_case_name;
use super::hopkins::{CaseRecord, latest_date};
use super::location::{GeoLevel, LocationId, LocationRef, LocationTable, UnknownLocation};

pub static MONTHS: [&'static str; 12] = [
	"Jan", "Feb", "Mar", "Apr", "May", "Jun",
	"Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Largest number of sources sent to the endpoint. Longer queries fail
/// upstream; the exact limit is not documented.
pub static DEFAULT_SOURCE_CAP: usize = 60;

/// Non-sovereign or disputed territories. They are always sent with a zero
/// count so that their risk lands in the rest-of-world bucket.
pub static DENYLIST_LABELS: &'static [&'static str] = &[
	"Cyprus, Northern",
	"Aland Islands",
];


#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
	UnknownLocation(UnknownLocation),
	InvalidCaseCount{location: String, count: i64},
	InvalidOption(&'static str),
}

impl fmt::Display for QueryError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::UnknownLocation(e) => fmt::Display::fmt(e, f),
			Self::InvalidCaseCount{location, count} => write!(f, "invalid case count {} for {}", count, location),
			Self::InvalidOption(what) => write!(f, "invalid query option: {}", what),
		}
	}
}

impl From<UnknownLocation> for QueryError {
	fn from(other: UnknownLocation) -> Self {
		Self::UnknownLocation(other)
	}
}

impl std::error::Error for QueryError {}


/// The knobs of the Epirisk form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
	/// days to onset of symptoms
	pub period: u32,
	/// month of travel, 1-based
	pub month: u32,
	/// 0.0 for completely restricted travel, 1.0 for no restrictions
	pub travel_level: f64,
	pub source_cap: usize,
}

impl Default for QueryOptions {
	fn default() -> Self {
		Self{
			period: 10,
			month: 1,
			travel_level: 1.0,
			source_cap: DEFAULT_SOURCE_CAP,
		}
	}
}

impl QueryOptions {
	pub fn validate(&self) -> Result<(), QueryError> {
		if self.month < 1 || self.month > 12 {
			return Err(QueryError::InvalidOption("month must be within 1..=12"))
		}
		if !(self.travel_level >= 0.0 && self.travel_level <= 1.0) {
			return Err(QueryError::InvalidOption("travel_level must be within 0.0..=1.0"))
		}
		if self.source_cap == 0 {
			return Err(QueryError::InvalidOption("source_cap must be positive"))
		}
		Ok(())
	}

	pub fn month_name(&self) -> &'static str {
		MONTHS[(self.month.max(1).min(12) - 1) as usize]
	}
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
	count: u64,
	// insertion sequence, breaks ties during truncation
	seq: u64,
}


#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
	pub geolevel: GeoLevel,
	pub period: u32,
	pub sources: Vec<LocationId>,
	pub cases: BTreeMap<LocationId, u64>,
	pub month: &'static str,
	pub travel_level: f64,
	pub userdata: Map<String, Value>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl QueryRequest {
	pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
		serde_json::to_vec(self)
	}

	/// The value of the `q` query parameter: URL-safe base64 of the JSON
	/// body.
	pub fn encode(&self) -> Result<String, serde_json::Error> {
		Ok(base64::encode_config(self.to_json()?, base64::URL_SAFE))
	}
}


/// Case counts per location for one Epirisk query. Bound to one location
/// table for its whole lifetime.
#[derive(Debug, Clone)]
pub struct EpiriskQuery<'r> {
	table: &'r LocationTable,
	options: QueryOptions,
	cases: HashMap<LocationId, Entry>,
	next_seq: u64,
}

impl<'r> EpiriskQuery<'r> {
	pub fn new(table: &'r LocationTable, options: QueryOptions) -> Result<Self, QueryError> {
		options.validate()?;
		Ok(Self{
			table,
			options,
			cases: HashMap::new(),
			next_seq: 0,
		})
	}

	pub fn level(&self) -> GeoLevel {
		self.table.level()
	}

	pub fn options(&self) -> &QueryOptions {
		&self.options
	}

	pub fn len(&self) -> usize {
		self.cases.len()
	}

	pub fn is_empty(&self) -> bool {
		self.cases.is_empty()
	}

	/// Add `count` cases to a location. Zero removes the location from the
	/// query.
	pub fn set<'x, L: Into<LocationRef<'x>>>(&mut self, location: L, count: i64) -> Result<(), QueryError> {
		let location = location.into();
		if count < 0 {
			let location = match location {
				LocationRef::Id(id) => id.to_string(),
				LocationRef::Label(label) => label.into(),
			};
			return Err(QueryError::InvalidCaseCount{location, count})
		}
		let id = self.table.lookup(location)?.id;
		if count == 0 {
			trace!("removing location {} from query", id);
			self.cases.remove(&id);
			return Ok(())
		}
		let next_seq = &mut self.next_seq;
		let entry = self.cases.entry(id).or_insert_with(|| {
			let seq = *next_seq;
			*next_seq += 1;
			Entry{count: 0, seq}
		});
		entry.count = entry.count.saturating_add(count as u64);
		Ok(())
	}

	pub fn get<'x, L: Into<LocationRef<'x>>>(&self, location: L) -> Result<u64, QueryError> {
		let id = self.table.lookup(location.into())?.id;
		Ok(self.cases.get(&id).map(|e| { e.count }).unwrap_or(0))
	}

	fn ranked(&self) -> Vec<(LocationId, Entry)> {
		let mut result: Vec<(LocationId, Entry)> = self.cases.iter().map(|(id, e)| { (*id, *e) }).collect();
		result.sort_by(|(_, a), (_, b)| { b.count.cmp(&a.count).then(a.seq.cmp(&b.seq)) });
		result
	}

	/// Build the request. Only the `source_cap` largest locations are kept
	/// (ties go to the earlier insertion), then the denylist is added with a
	/// zero count.
	pub fn build(&self, extra: Map<String, Value>) -> QueryRequest {
		let mut ranked = self.ranked();
		if ranked.len() > self.options.source_cap {
			debug!("truncating query from {} to {} sources", ranked.len(), self.options.source_cap);
			ranked.truncate(self.options.source_cap);
		}

		let mut sources: Vec<LocationId> = Vec::with_capacity(ranked.len() + DENYLIST_LABELS.len());
		let mut cases = BTreeMap::new();
		for (id, e) in ranked.into_iter() {
			sources.push(id);
			cases.insert(id, e.count);
		}
		for label in DENYLIST_LABELS.iter() {
			let id = match self.table.resolve(label) {
				Ok(loc) => loc.id,
				Err(_) => {
					debug!("denylisted location {:?} not in {} table", label, self.table.level());
					continue
				},
			};
			if cases.insert(id, 0).is_none() {
				sources.push(id);
			}
		}

		QueryRequest{
			geolevel: self.table.level(),
			period: self.options.period,
			sources,
			cases,
			month: self.options.month_name(),
			travel_level: self.options.travel_level,
			userdata: Map::new(),
			extra,
		}
	}

	pub fn build_for_targets(&self, targets: &[LocationId]) -> QueryRequest {
		let mut extra = Map::new();
		extra.insert("targets".into(), Value::from(targets.to_vec()));
		self.build(extra)
	}

	/// Seed a query with the confirmed cases of the most recent date in
	/// `records`, summed per Epirisk country name. Names the table doesn't
	/// know are returned; the caller decides whether that is fatal.
	pub fn from_latest_cases(
			table: &'r LocationTable,
			options: QueryOptions,
			records: &[CaseRecord],
	) -> Result<(Self, Vec<UnknownLocation>), QueryError> {
		let mut query = Self::new(table, options)?;
		let latest = match latest_date(records) {
			Some(d) => d,
			None => return Ok((query, Vec::new())),
		};

		let mut by_name: BTreeMap<SmartString, u64> = BTreeMap::new();
		for rec in records.iter().filter(|rec| { rec.date == latest }) {
			*by_name.entry(canonicalize_case_name(&rec.country).into()).or_insert(0) += rec.confirmed;
		}

		let mut unknown = Vec::new();
		for (name, count) in by_name.iter() {
			let count = i64::try_from(*count).unwrap_or(i64::MAX);
			match query.set(name.as_str(), count) {
				Ok(()) => (),
				Err(QueryError::UnknownLocation(e)) => unknown.push(e),
				Err(other) => return Err(other),
			}
		}
		debug!("seeded query with {} locations from {}, {} unknown", query.len(), latest, unknown.len());
		Ok((query, unknown))
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::location::Registry;

	use chrono::NaiveDate;

	fn options(cap: usize) -> QueryOptions {
		QueryOptions{source_cap: cap, ..QueryOptions::default()}
	}

	#[test]
	fn set_accumulates_and_zero_removes() {
		let registry = Registry::bundled();
		let mut q = EpiriskQuery::new(registry.countries(), options(10)).unwrap();
		q.set("Poland", 100).unwrap();
		q.set(169u32, 50).unwrap();
		assert_eq!(q.get("Poland").unwrap(), 150);
		q.set("Poland", 0).unwrap();
		assert_eq!(q.get("Poland").unwrap(), 0);
		assert!(q.is_empty());
		assert_eq!(q.get("Italy").unwrap(), 0);
	}

	#[test]
	fn negative_and_unknown_are_rejected() {
		let registry = Registry::bundled();
		let mut q = EpiriskQuery::new(registry.countries(), options(10)).unwrap();
		assert_eq!(
			q.set("Poland", -1),
			Err(QueryError::InvalidCaseCount{location: "Poland".into(), count: -1}),
		);
		assert_eq!(
			q.set("Atlantis", 1),
			Err(QueryError::UnknownLocation(UnknownLocation::Label("Atlantis".into()))),
		);
		assert!(q.is_empty());
	}

	#[test]
	fn build_keeps_top_n_and_forces_denylist() {
		let registry = Registry::bundled();
		let table = registry.countries();
		let mut q = EpiriskQuery::new(table, options(2)).unwrap();
		q.set("China", 500).unwrap();
		q.set("Italy", 20).unwrap();
		q.set("San Marino", 1).unwrap();
		let req = q.build(Map::new());

		let china = table.resolve("China").unwrap().id;
		let italy = table.resolve("Italy").unwrap().id;
		let san_marino = table.resolve("San Marino").unwrap().id;
		let ncy = table.resolve("Cyprus, Northern").unwrap().id;
		let ala = table.resolve("Aland Islands").unwrap().id;

		let expected: BTreeMap<LocationId, u64> = vec![
			(china, 500), (italy, 20), (ncy, 0), (ala, 0),
		].into_iter().collect();
		assert_eq!(req.cases, expected);
		assert!(!req.cases.contains_key(&san_marino));
		assert_eq!(req.sources, vec![china, italy, ncy, ala]);
	}

	#[test]
	fn truncation_ties_follow_insertion_order() {
		let registry = Registry::bundled();
		let table = registry.countries();
		for _ in 0..5 {
			let mut q = EpiriskQuery::new(table, options(2)).unwrap();
			q.set("Poland", 7).unwrap();
			q.set("Italy", 7).unwrap();
			q.set("Spain", 7).unwrap();
			let req = q.build(Map::new());
			assert_eq!(&req.sources[..2], &[169, 111][..]);
			assert!(!req.cases.contains_key(&67));
		}
	}

	#[test]
	fn denylisted_sources_are_zeroed_even_when_present() {
		let registry = Registry::bundled();
		let mut q = EpiriskQuery::new(registry.countries(), options(5)).unwrap();
		q.set("Aland Islands", 40).unwrap();
		q.set("Poland", 3).unwrap();
		let req = q.build(Map::new());
		assert_eq!(req.cases.get(&14), Some(&0));
		assert_eq!(req.sources.iter().filter(|id| { **id == 14 }).count(), 1);
	}

	#[test]
	fn request_json_shape() {
		let registry = Registry::bundled();
		let mut q = EpiriskQuery::new(registry.basins(), QueryOptions{month: 3, travel_level: 0.5, ..options(10)}).unwrap();
		q.set("Wuhan", 30).unwrap();
		let req = q.build_for_targets(&[169]);
		let v: Value = serde_json::from_slice(&req.to_json().unwrap()).unwrap();
		assert_eq!(v["geolevel"], "basin");
		assert_eq!(v["period"], 10);
		assert_eq!(v["sources"], serde_json::json!([2852]));
		assert_eq!(v["cases"], serde_json::json!({"2852": 30}));
		assert_eq!(v["month"], "Mar");
		assert_eq!(v["travel_level"], 0.5);
		assert_eq!(v["userdata"], serde_json::json!({}));
		assert_eq!(v["targets"], serde_json::json!([169]));

		let decoded = base64::decode_config(req.encode().unwrap(), base64::URL_SAFE).unwrap();
		assert_eq!(decoded, req.to_json().unwrap());
	}

	#[test]
	fn invalid_options_are_rejected() {
		let registry = Registry::bundled();
		assert!(EpiriskQuery::new(registry.countries(), QueryOptions{month: 13, ..QueryOptions::default()}).is_err());
		assert!(EpiriskQuery::new(registry.countries(), QueryOptions{travel_level: 1.5, ..QueryOptions::default()}).is_err());
	}

	fn record(country: &str, date: NaiveDate, confirmed: u64) -> CaseRecord {
		CaseRecord{
			province: "".into(),
			country: country.into(),
			lat: None,
			lng: None,
			date,
			confirmed,
			deaths: 0,
			recovered: 0,
			iso3: "".into(),
			epidemy: "Corona".into(),
		}
	}

	#[test]
	fn from_latest_cases_uses_latest_date_and_canonical_names() {
		let registry = Registry::bundled();
		let d1 = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
		let d2 = NaiveDate::from_ymd_opt(2020, 3, 2).unwrap();
		let records = vec![
			record("Mainland China", d1, 1000),
			record("Mainland China", d2, 400),
			record("Hong Kong", d2, 100),
			record("US", d2, 7),
			record("Diamond Princess", d2, 700),
		];
		let (q, unknown) = EpiriskQuery::from_latest_cases(registry.countries(), options(10), &records).unwrap();
		assert_eq!(q.get("China").unwrap(), 500);
		assert_eq!(q.get("United States of America").unwrap(), 7);
		assert_eq!(unknown, vec![UnknownLocation::Label("Diamond Princess".into())]);
	}
}
