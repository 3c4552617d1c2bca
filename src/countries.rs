use std::collections::HashMap;
use std::fmt;
use std::io;

use log::{debug, info, warn};

use regex::{Regex, RegexBuilder};

use serde::{Deserialize};

use smartstring::alias::{String as SmartString};

use super::location::{LocationId, LocationTable};

pub type Iso3 = SmartString;

pub static BUNDLED_COUNTRIES: &'static str = include_str!("../data/countries.csv");

/// JHU CSSE country names which differ from the labels used by Epirisk.
/// No right-hand side may appear on the left, so applying the table twice
/// is the same as applying it once.
pub static CASE_NAME_OVERRIDES: &'static [(&'static str, &'static str)] = &[
	("Hong Kong", "China"),
	("Macau", "China"),
	("Mainland China", "China"),
	("South Korea", "Korea, Rep."),
	("Korea, South", "Korea, Rep."),
	("US", "United States of America"),
	("Russia", "Russian Federation"),
	("UK", "United Kingdom"),
	("Egypt", "Egypt, Arab Rep."),
	("Iran", "Iran, Islamic Rep."),
	("Czechia", "Czech Republic"),
	("Slovakia", "Slovak Republic"),
	("North Macedonia", "Macedonia, FYR"),
	("Taiwan*", "Taiwan"),
];

/// Codes the regex matcher produces but which must not end up in output
/// tables.
pub static ISO3_OVERRIDES: &'static [(&'static str, &'static str)] = &[
	("ALA", "FIN"),
	("XKX", "KOS"),
];

// applied to the country table itself on load
static PLACEHOLDER_CODES: &'static [(&'static str, &'static str)] = &[
	("XKX", "KOS"),
];

/// Epirisk labels left out of the id mapping. "Cyprus, Northern" matches
/// Cyprus and would claim its code.
pub static EPIRISK_SKIPPED_LABELS: &'static [&'static str] = &[
	"Cyprus, Northern",
];


pub fn canonicalize_case_name<'x>(raw: &'x str) -> &'x str {
	for (from, to) in CASE_NAME_OVERRIDES.iter() {
		if *from == raw {
			return *to
		}
	}
	raw
}

fn lookup_override(table: &[(&'static str, &'static str)], code: &str) -> Option<&'static str> {
	table.iter().find(|(from, _)| { *from == code }).map(|(_, to)| { *to })
}

pub fn reconcile_code(code: &str) -> Iso3 {
	match lookup_override(ISO3_OVERRIDES, code) {
		Some(to) => to.into(),
		None => code.into(),
	}
}


/// Rows carrying an ISO3 column which [`reconcile_codes`] can rewrite.
pub trait HasIso3 {
	fn iso3_mut(&mut self) -> &mut Iso3;
}

pub fn reconcile_codes<T: HasIso3>(rows: &mut [T]) {
	for row in rows.iter_mut() {
		let code = row.iso3_mut();
		if let Some(to) = lookup_override(ISO3_OVERRIDES, code) {
			*code = to.into();
		}
	}
}


#[derive(Debug)]
pub enum CountryError {
	NotFound(String),
	Ambiguous(String, Vec<Iso3>),
	DuplicateIso3{iso3: Iso3, first: LocationId, second: LocationId},
	InvalidPattern(Iso3, regex::Error),
	Csv(csv::Error),
}

impl fmt::Display for CountryError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::NotFound(name) => write!(f, "couldn't recognize country {:?}", name),
			Self::Ambiguous(name, codes) => write!(f, "country name {:?} matches several codes: {}", name, codes.join(", ")),
			Self::DuplicateIso3{iso3, first, second} => write!(f, "ISO3 {} already assigned to epirisk id {}, refusing to assign it to {}", iso3, first, second),
			Self::InvalidPattern(iso3, e) => write!(f, "invalid name pattern for {}: {}", iso3, e),
			Self::Csv(e) => fmt::Display::fmt(e, f),
		}
	}
}

impl From<csv::Error> for CountryError {
	fn from(other: csv::Error) -> Self {
		Self::Csv(other)
	}
}

impl std::error::Error for CountryError {}


#[derive(Debug, Clone, Deserialize)]
struct RawCountryRow {
	#[serde(rename = "ISO3")]
	iso3: Iso3,
	name_short: SmartString,
	name_pl: SmartString,
	continent: SmartString,
	population: Option<u64>,
	regex: String,
	regex_exclude: Option<String>,
}


#[derive(Debug, Clone, PartialEq)]
pub struct CountryInfo {
	pub iso3: Iso3,
	pub name_short: SmartString,
	pub name_pl: SmartString,
	pub continent: SmartString,
	pub population: Option<u64>,
	pub epirisk_id: Option<LocationId>,
}


#[derive(Debug, Clone)]
struct NamePattern {
	include: Regex,
	exclude: Option<Regex>,
}

impl NamePattern {
	fn compile(pattern: &str) -> Result<Regex, regex::Error> {
		RegexBuilder::new(pattern).case_insensitive(true).build()
	}

	fn matches(&self, name: &str) -> bool {
		if !self.include.is_match(name) {
			return false
		}
		match &self.exclude {
			Some(exclude) => !exclude.is_match(name),
			None => true,
		}
	}
}


/// Country metadata keyed by ISO3, with the regex name matcher and the
/// mapping to Epirisk country ids.
#[derive(Debug, Clone)]
pub struct CountryTable {
	rows: Vec<CountryInfo>,
	patterns: Vec<NamePattern>,
	by_iso3: HashMap<Iso3, usize>,
	by_epirisk_id: HashMap<LocationId, Iso3>,
}

impl CountryTable {
	pub fn from_reader<R: io::Read>(r: R) -> Result<Self, CountryError> {
		let mut r = csv::Reader::from_reader(r);
		let mut rows = Vec::new();
		let mut patterns = Vec::new();
		let mut by_iso3 = HashMap::new();
		for row in r.deserialize() {
			let rec: RawCountryRow = row?;
			let iso3: Iso3 = match lookup_override(PLACEHOLDER_CODES, &rec.iso3) {
				Some(to) => to.into(),
				None => rec.iso3,
			};
			let include = NamePattern::compile(&rec.regex).map_err(|e| { CountryError::InvalidPattern(iso3.clone(), e) })?;
			let exclude = match rec.regex_exclude {
				Some(pattern) => Some(NamePattern::compile(&pattern).map_err(|e| { CountryError::InvalidPattern(iso3.clone(), e) })?),
				None => None,
			};
			by_iso3.insert(iso3.clone(), rows.len());
			patterns.push(NamePattern{include, exclude});
			rows.push(CountryInfo{
				iso3,
				name_short: rec.name_short,
				name_pl: rec.name_pl,
				continent: rec.continent,
				population: rec.population,
				epirisk_id: None,
			});
		}
		debug!("loaded {} countries", rows.len());
		Ok(Self{
			rows,
			patterns,
			by_iso3,
			by_epirisk_id: HashMap::new(),
		})
	}

	pub fn bundled() -> Self {
		Self::from_reader(BUNDLED_COUNTRIES.as_bytes()).expect("bundled country table is malformed")
	}

	/// Attach Epirisk country ids by running every Epirisk label through the
	/// name matcher. Labels the table doesn't know keep no code.
	pub fn with_epirisk_ids(mut self, epirisk: &LocationTable) -> Result<Self, CountryError> {
		let mut assigned: HashMap<Iso3, LocationId> = HashMap::new();
		for loc in epirisk.iter_sorted() {
			if EPIRISK_SKIPPED_LABELS.contains(&loc.label.as_str()) {
				info!("skipping epirisk country {:?}", loc.label);
				continue
			}
			let iso3 = match self.to_iso3(&loc.label, None) {
				Ok(iso3) => iso3,
				Err(CountryError::NotFound(_)) | Err(CountryError::Ambiguous(..)) => {
					warn!("epirisk country {:?} (id {}) not in the country table", loc.label, loc.id);
					continue
				},
				Err(other) => return Err(other),
			};
			if let Some(first) = assigned.get(&iso3) {
				return Err(CountryError::DuplicateIso3{iso3, first: *first, second: loc.id})
			}
			assigned.insert(iso3, loc.id);
		}
		for (iso3, id) in assigned.into_iter() {
			if let Some(index) = self.by_iso3.get(&iso3) {
				self.rows[*index].epirisk_id = Some(id);
			}
			self.by_epirisk_id.insert(id, iso3);
		}
		Ok(self)
	}

	/// Match a free-text country name to its ISO3 code. Without a fallback,
	/// names matching no country or several countries are errors.
	pub fn to_iso3(&self, name: &str, fallback: Option<&str>) -> Result<Iso3, CountryError> {
		let mut found: Vec<Iso3> = Vec::new();
		for (row, pattern) in self.rows.iter().zip(self.patterns.iter()) {
			if pattern.matches(name) {
				found.push(row.iso3.clone());
			}
		}
		match (found.len(), fallback) {
			(1, _) => Ok(found.remove(0)),
			(_, Some(fallback)) => Ok(fallback.into()),
			(0, None) => Err(CountryError::NotFound(name.into())),
			(_, None) => Err(CountryError::Ambiguous(name.into(), found)),
		}
	}

	pub fn info(&self, iso3: &str) -> Option<&CountryInfo> {
		self.by_iso3.get(iso3).map(|index| { &self.rows[*index] })
	}

	pub fn iso3_for_epirisk_id(&self, id: LocationId) -> Option<&Iso3> {
		self.by_epirisk_id.get(&id)
	}

	pub fn iter(&self) -> impl Iterator<Item = &CountryInfo> {
		self.rows.iter()
	}
}
