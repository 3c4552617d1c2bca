use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;

use serde::{Serialize};

use super::countries::{CountryTable, Iso3};
use super::hopkins::CaseRecord;

static EUROPE: &'static str = "Europe";


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
	World,
	EU,
}

impl Region {
	pub fn name(&self) -> &'static str {
		match self {
			Self::World => "World",
			Self::EU => "EU",
		}
	}
}

impl Serialize for Region {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.name())
	}
}


#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BigNumbersRow {
	#[serde(rename = "Region")]
	pub region: Region,
	#[serde(rename = "Date")]
	pub date: NaiveDate,
	#[serde(rename = "Confirmed")]
	pub confirmed: u64,
	#[serde(rename = "Deaths")]
	pub deaths: u64,
	#[serde(rename = "Recovered")]
	pub recovered: u64,
	#[serde(rename = "Countries")]
	pub countries: usize,
}

#[derive(Default)]
struct Accumulator<'x> {
	confirmed: u64,
	deaths: u64,
	recovered: u64,
	affected: HashSet<&'x Iso3>,
}

impl<'x> Accumulator<'x> {
	fn add(&mut self, rec: &'x CaseRecord, known: bool) {
		self.confirmed += rec.confirmed;
		self.deaths += rec.deaths;
		self.recovered += rec.recovered;
		if known {
			self.affected.insert(&rec.iso3);
		}
	}
}


/// Daily world and European totals, world rows first. Records without a
/// country in the table (cruise ships, "Other") still count towards the
/// world sums, but not towards the number of countries.
pub fn big_numbers(records: &[CaseRecord], countries: &CountryTable) -> Vec<BigNumbersRow> {
	let mut acc: BTreeMap<(Region, NaiveDate), Accumulator> = BTreeMap::new();
	for rec in records.iter() {
		let info = countries.info(&rec.iso3);
		acc.entry((Region::World, rec.date)).or_default().add(rec, info.is_some());
		if let Some(info) = info {
			if info.continent.as_str() == EUROPE {
				acc.entry((Region::EU, rec.date)).or_default().add(rec, true);
			}
		}
	}

	acc.into_iter().map(|((region, date), a)| {
		BigNumbersRow{
			region,
			date,
			confirmed: a.confirmed,
			deaths: a.deaths,
			recovered: a.recovered,
			countries: a.affected.len(),
		}
	}).collect()
}
