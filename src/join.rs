use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::{debug, warn};

use serde::{Serialize, Serializer};

use smartstring::alias::{String as SmartString};

use super::countries::{CountryTable, Iso3, reconcile_code};
use super::hopkins::{CaseRecord, latest_date};
use super::response::ConnectionsRisk;

/// Per-million ratio bin boundaries. Bins are closed on the right, so a
/// ratio of exactly 2.0 belongs to "0-2".
pub static RATIO_BOUNDARIES: [f64; 8] = [0.0, 2.0, 5.0, 10.0, 50.0, 100.0, 400.0, 5000.0];


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskTier {
	Low,
	Medium,
	High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bin {
	/// index of the lower boundary in [`RATIO_BOUNDARIES`]; the last index
	/// is the open-ended bin above 5000
	Ratio(usize),
	Risk(RiskTier),
}

impl fmt::Display for Bin {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Ratio(i) if *i + 1 < RATIO_BOUNDARIES.len() => {
				write!(f, "{}-{}", RATIO_BOUNDARIES[*i], RATIO_BOUNDARIES[*i + 1])
			},
			Self::Ratio(i) => write!(f, ">{}", RATIO_BOUNDARIES[*i]),
			Self::Risk(RiskTier::Low) => f.write_str("low risk"),
			Self::Risk(RiskTier::Medium) => f.write_str("medium risk"),
			Self::Risk(RiskTier::High) => f.write_str("high risk"),
		}
	}
}

impl Serialize for Bin {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}


pub fn ratio_bin(per_mil: f64) -> Option<Bin> {
	if per_mil.is_nan() || per_mil <= RATIO_BOUNDARIES[0] {
		return None
	}
	for i in 0..RATIO_BOUNDARIES.len() - 1 {
		if per_mil <= RATIO_BOUNDARIES[i + 1] {
			return Some(Bin::Ratio(i))
		}
	}
	Some(Bin::Ratio(RATIO_BOUNDARIES.len() - 1))
}

/// Split [min, max] into three bands of equal width.
pub fn risk_tier(risk: f64, min: f64, max: f64) -> RiskTier {
	if !(max > min) {
		return RiskTier::Low
	}
	let width = (max - min) / 3.0;
	if risk <= min + width {
		RiskTier::Low
	} else if risk <= min + 2.0 * width {
		RiskTier::Medium
	} else {
		RiskTier::High
	}
}


fn nan_as_empty<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
	if v.is_nan() {
		serializer.serialize_none()
	} else {
		serializer.serialize_f64(*v)
	}
}


#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskCaseRow {
	#[serde(rename = "Country")]
	pub country: SmartString,
	#[serde(rename = "Risk")]
	pub risk: f64,
	#[serde(rename = "Confirmed")]
	pub confirmed: u64,
	#[serde(rename = "Country_ISO3")]
	pub iso3: Iso3,
	#[serde(rename = "Kraj")]
	pub name_pl: SmartString,
	#[serde(rename = "Population")]
	pub population: Option<u64>,
	#[serde(serialize_with = "nan_as_empty")]
	pub per_mil: f64,
	pub bin: Option<Bin>,
}


pub fn latest_confirmed(records: &[CaseRecord]) -> BTreeMap<Iso3, u64> {
	let mut result = BTreeMap::new();
	let latest = match latest_date(records) {
		Some(d) => d,
		None => return result,
	};
	for rec in records.iter().filter(|rec| { rec.date == latest }) {
		*result.entry(rec.iso3.clone()).or_insert(0) += rec.confirmed;
	}
	result
}

/// Re-key a risk distribution from Epirisk ids to ISO3 codes. Ids folding
/// onto the same code are summed.
pub fn risk_by_iso3(risk: &ConnectionsRisk, countries: &CountryTable) -> BTreeMap<Iso3, f64> {
	let mut result = BTreeMap::new();
	for (id, r) in risk.distribution.iter() {
		let iso3 = match countries.iso3_for_epirisk_id(*id) {
			Some(iso3) => reconcile_code(iso3),
			None => {
				debug!("epirisk id {} has no ISO3 code, dropping its risk {}", id, r);
				continue
			},
		};
		*result.entry(iso3).or_insert(0.0) += *r;
	}
	result
}


/// Outer-join risk and confirmed cases by ISO3, then normalize and bin.
/// Missing risk counts as 1.0, missing cases as 0. Codes without an entry
/// in the country table are dropped.
pub fn join_risk_cases(
		risk: &BTreeMap<Iso3, f64>,
		confirmed: &BTreeMap<Iso3, u64>,
		countries: &CountryTable,
) -> Vec<RiskCaseRow> {
	let codes: BTreeSet<&Iso3> = risk.keys().chain(confirmed.keys()).collect();
	let mut rows = Vec::with_capacity(codes.len());
	for iso3 in codes {
		let info = match countries.info(iso3) {
			Some(info) => info,
			None => {
				warn!("no country data for {:?}, leaving it out of the risk table", iso3);
				continue
			},
		};
		let cases = confirmed.get(iso3).copied().unwrap_or(0);
		let per_mil = match info.population {
			Some(p) if p > 0 => cases as f64 / p as f64 * 1e6,
			_ => f64::NAN,
		};
		rows.push(RiskCaseRow{
			country: info.name_short.clone(),
			risk: risk.get(iso3).copied().unwrap_or(1.0),
			confirmed: cases,
			iso3: iso3.clone(),
			name_pl: info.name_pl.clone(),
			population: info.population,
			per_mil,
			bin: None,
		});
	}
	normalize_risk(&mut rows[..]);
	assign_bins(&mut rows[..]);
	rows
}

/// Pin countries with cases to a risk of 1.0 and rescale the others to a
/// total of 1.0.
pub fn normalize_risk(rows: &mut [RiskCaseRow]) {
	let mut free_total = 0.0;
	for row in rows.iter_mut() {
		if row.confirmed > 0 {
			row.risk = 1.0;
		} else {
			free_total += row.risk;
		}
	}
	if !(free_total > 0.0) {
		return
	}
	for row in rows.iter_mut().filter(|row| { row.confirmed == 0 }) {
		row.risk /= free_total;
	}
}

pub fn assign_bins(rows: &mut [RiskCaseRow]) {
	let free = rows.iter().filter(|row| { row.confirmed == 0 }).map(|row| { row.risk });
	let (min, max) = free.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| { (lo.min(r), hi.max(r)) });
	for row in rows.iter_mut() {
		row.bin = if row.confirmed > 0 {
			ratio_bin(row.per_mil)
		} else {
			Some(Bin::Risk(risk_tier(row.risk, min, max)))
		};
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::location::Registry;

	use approx::assert_relative_eq;
	use chrono::NaiveDate;

	fn countries() -> CountryTable {
		let registry = Registry::bundled();
		CountryTable::bundled().with_epirisk_ids(registry.countries()).unwrap()
	}

	#[test]
	fn ratio_bins_are_right_closed() {
		let cases = [
			(2.0, "0-2"),
			(2.0001, "2-5"),
			(5.0, "2-5"),
			(10.0, "5-10"),
			(50.0, "10-50"),
			(100.0, "50-100"),
			(400.0, "100-400"),
			(5000.0, "400-5000"),
			(5000.5, ">5000"),
			(0.01, "0-2"),
		];
		for (ratio, label) in cases.iter() {
			assert_eq!(ratio_bin(*ratio).unwrap().to_string(), *label, "ratio {}", ratio);
		}
		assert_eq!(ratio_bin(f64::NAN), None);
		assert_eq!(ratio_bin(0.0), None);
	}

	#[test]
	fn risk_tiers_split_range_evenly() {
		assert_eq!(risk_tier(0.0, 0.0, 0.9), RiskTier::Low);
		assert_eq!(risk_tier(0.3, 0.0, 0.9), RiskTier::Low);
		assert_eq!(risk_tier(0.31, 0.0, 0.9), RiskTier::Medium);
		assert_eq!(risk_tier(0.9, 0.0, 0.9), RiskTier::High);
		assert_eq!(risk_tier(0.5, 0.5, 0.5), RiskTier::Low);
	}

	fn build(risk: &[(&str, f64)], confirmed: &[(&str, u64)]) -> Vec<RiskCaseRow> {
		let risk: BTreeMap<Iso3, f64> = risk.iter().map(|(k, v)| { ((*k).into(), *v) }).collect();
		let confirmed: BTreeMap<Iso3, u64> = confirmed.iter().map(|(k, v)| { ((*k).into(), *v) }).collect();
		join_risk_cases(&risk, &confirmed, &countries())
	}

	#[test]
	fn normalization_pins_cases_and_rescales_the_rest() {
		let rows = build(
			&[("POL", 0.2), ("DEU", 0.1), ("ITA", 0.3), ("CZE", 0.1)],
			&[("ITA", 600), ("CHN", 80000)],
		);
		assert_eq!(rows.len(), 5);
		for row in rows.iter() {
			assert_eq!(row.confirmed > 0, row.risk == 1.0, "{:?}", row);
		}
		let free: f64 = rows.iter().filter(|r| { r.confirmed == 0 }).map(|r| { r.risk }).sum();
		assert_relative_eq!(free, 1.0, epsilon = 1e-12);
		let pol = rows.iter().find(|r| { r.iso3.as_str() == "POL" }).unwrap();
		assert_relative_eq!(pol.risk, 0.5, epsilon = 1e-12);
	}

	#[test]
	fn missing_risk_defaults_to_one_before_rescaling() {
		let rows = build(&[("POL", 1.0)], &[("DEU", 0)]);
		let deu = rows.iter().find(|r| { r.iso3.as_str() == "DEU" }).unwrap();
		assert_relative_eq!(deu.risk, 0.5);
	}

	#[test]
	fn missing_population_leaves_ratio_undefined() {
		let rows = build(&[], &[("VAT", 12), ("ITA", 6043)]);
		let vat = rows.iter().find(|r| { r.iso3.as_str() == "VAT" }).unwrap();
		assert!(vat.per_mil.is_nan());
		assert_eq!(vat.bin, None);
		let ita = rows.iter().find(|r| { r.iso3.as_str() == "ITA" }).unwrap();
		assert_eq!(ita.bin, Some(Bin::Ratio(4)));
		assert_eq!(ita.bin.unwrap().to_string(), "50-100");
	}

	#[test]
	fn unknown_codes_are_dropped() {
		let rows = build(&[("POL", 1.0)], &[("Other", 700)]);
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].iso3.as_str(), "POL");
	}

	#[test]
	fn zero_case_rows_get_risk_tiers() {
		let rows = build(&[("POL", 0.1), ("DEU", 0.4), ("CZE", 0.7)], &[]);
		let tiers: Vec<_> = rows.iter().map(|r| { (r.iso3.as_str(), r.bin) }).collect();
		assert_eq!(tiers, vec![
			("CZE", Some(Bin::Risk(RiskTier::High))),
			("DEU", Some(Bin::Risk(RiskTier::Medium))),
			("POL", Some(Bin::Risk(RiskTier::Low))),
		]);
	}

	#[test]
	fn risk_is_rekeyed_and_folded() {
		let body = r#"{"connections": {}, "distribution": {"72": 0.1, "14": 0.05, "169": 0.2, "53": 0.3}, "residual": 0.35}"#;
		let risk = ConnectionsRisk::from_slice(body.as_bytes()).unwrap();
		let by_iso3 = risk_by_iso3(&risk, &countries());
		assert_eq!(by_iso3.len(), 2);
		// Aland folds into Finland, Northern Cyprus has no code
		assert_relative_eq!(by_iso3["FIN"], 0.15, epsilon = 1e-12);
		assert_relative_eq!(by_iso3["POL"], 0.2);
	}

	#[test]
	fn latest_confirmed_sums_per_code() {
		let d1 = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
		let d2 = NaiveDate::from_ymd_opt(2020, 3, 2).unwrap();
		let mk = |iso3: &str, date, confirmed| {
			CaseRecord{
				province: "".into(),
				country: "".into(),
				lat: None,
				lng: None,
				date,
				confirmed,
				deaths: 0,
				recovered: 0,
				iso3: iso3.into(),
				epidemy: "Corona".into(),
			}
		};
		let records = vec![mk("CHN", d1, 5), mk("CHN", d2, 10), mk("CHN", d2, 3), mk("ITA", d2, 1)];
		let latest = latest_confirmed(&records);
		assert_eq!(latest["CHN"], 13);
		assert_eq!(latest["ITA"], 1);
	}
}
