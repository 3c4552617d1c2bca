use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use log::warn;

use serde::{Deserialize, Serialize};

use smartstring::alias::{String as SmartString};

pub type LocationId = u32;

pub static BUNDLED_INIT_DATA: &'static str = include_str!("../data/epirisk_getinitdata.json");


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeoLevel {
	#[serde(rename = "country")]
	Country,
	#[serde(rename = "basin")]
	Basin,
}

impl GeoLevel {
	pub fn value(&self) -> &'static str {
		match self {
			Self::Country => "country",
			Self::Basin => "basin",
		}
	}
}

impl fmt::Display for GeoLevel {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.value())
	}
}


#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Location {
	pub id: LocationId,
	pub label: SmartString,
	pub lat: f64,
	pub lng: f64,
	pub population: u64,
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownLocation {
	Label(String),
	Id(LocationId),
}

impl fmt::Display for UnknownLocation {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Label(label) => write!(f, "unknown location: {:?}", label),
			Self::Id(id) => write!(f, "unknown location id: {}", id),
		}
	}
}

impl std::error::Error for UnknownLocation {}


/// Either side of a location lookup: the source-assigned id or the display
/// label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationRef<'x> {
	Id(LocationId),
	Label(&'x str),
}

impl From<LocationId> for LocationRef<'_> {
	fn from(other: LocationId) -> Self {
		Self::Id(other)
	}
}

impl<'x> From<&'x str> for LocationRef<'x> {
	fn from(other: &'x str) -> Self {
		Self::Label(other)
	}
}


#[derive(Debug, Clone)]
pub struct LocationTable {
	level: GeoLevel,
	by_label: HashMap<SmartString, Arc<Location>>,
	by_id: HashMap<LocationId, Arc<Location>>,
}

impl LocationTable {
	fn build(level: GeoLevel, rows: Vec<Location>) -> Self {
		let mut by_label: HashMap<SmartString, Arc<Location>> = HashMap::with_capacity(rows.len());
		let mut by_id = HashMap::with_capacity(rows.len());
		for row in rows {
			let loc = Arc::new(row);
			if let Some(prev) = by_label.insert(loc.label.clone(), loc.clone()) {
				warn!("duplicate {} label {:?} (ids {} and {}), keeping the later one", level, loc.label, prev.id, loc.id);
			}
			by_id.insert(loc.id, loc);
		}
		Self{level, by_label, by_id}
	}

	pub fn level(&self) -> GeoLevel {
		self.level
	}

	pub fn resolve(&self, label: &str) -> Result<&Arc<Location>, UnknownLocation> {
		self.by_label.get(label).ok_or_else(|| { UnknownLocation::Label(label.into()) })
	}

	pub fn resolve_id(&self, id: LocationId) -> Result<&Arc<Location>, UnknownLocation> {
		self.by_id.get(&id).ok_or(UnknownLocation::Id(id))
	}

	pub fn lookup(&self, r: LocationRef<'_>) -> Result<&Arc<Location>, UnknownLocation> {
		match r {
			LocationRef::Id(id) => self.resolve_id(id),
			LocationRef::Label(label) => self.resolve(label),
		}
	}

	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	/// All locations ordered by id.
	pub fn iter_sorted(&self) -> Vec<&Arc<Location>> {
		let mut result: Vec<_> = self.by_id.values().collect();
		result.sort_by_key(|loc| { loc.id });
		result
	}
}


#[derive(Debug, Clone, Deserialize)]
struct RawInitData {
	countries: Vec<Location>,
	basins: Vec<Location>,
}


/// The Epirisk location tables. Built once at startup and shared by
/// reference afterwards.
#[derive(Debug, Clone)]
pub struct Registry {
	countries: LocationTable,
	basins: LocationTable,
}

impl Registry {
	pub fn from_reader<R: io::Read>(r: R) -> Result<Self, serde_json::Error> {
		let raw: RawInitData = serde_json::from_reader(r)?;
		Ok(Self::from_raw(raw))
	}

	pub fn bundled() -> Self {
		// the bundled file is part of the build, it has to parse
		let raw: RawInitData = serde_json::from_str(BUNDLED_INIT_DATA).expect("bundled epirisk init data is malformed");
		Self::from_raw(raw)
	}

	fn from_raw(raw: RawInitData) -> Self {
		Self{
			countries: LocationTable::build(GeoLevel::Country, raw.countries),
			basins: LocationTable::build(GeoLevel::Basin, raw.basins),
		}
	}

	pub fn table(&self, level: GeoLevel) -> &LocationTable {
		match level {
			GeoLevel::Country => &self.countries,
			GeoLevel::Basin => &self.basins,
		}
	}

	pub fn countries(&self) -> &LocationTable {
		&self.countries
	}

	pub fn basins(&self) -> &LocationTable {
		&self.basins
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bundled_registry_resolves_by_label_and_id() {
		let registry = Registry::bundled();
		let poland = registry.countries().resolve("Poland").unwrap();
		assert_eq!(poland.id, 169);
		assert_eq!(registry.countries().resolve_id(169).unwrap().label.as_str(), "Poland");
		assert_eq!(registry.basins().resolve("Wuhan").unwrap().id, 2852);
	}

	#[test]
	fn tables_are_disjoint() {
		let registry = Registry::bundled();
		assert_eq!(
			registry.table(GeoLevel::Basin).resolve("Poland").unwrap_err(),
			UnknownLocation::Label("Poland".into()),
		);
		assert_eq!(
			registry.table(GeoLevel::Country).resolve_id(1036).unwrap_err(),
			UnknownLocation::Id(1036),
		);
	}

	#[test]
	fn duplicate_labels_keep_the_last_row() {
		let data = r#"{
			"countries": [
				{"id": 1, "label": "Atlantis", "lat": 0.0, "lng": 0.0, "population": 10},
				{"id": 2, "label": "Atlantis", "lat": 1.0, "lng": 1.0, "population": 20}
			],
			"basins": []
		}"#;
		let registry = Registry::from_reader(data.as_bytes()).unwrap();
		assert_eq!(registry.countries().resolve("Atlantis").unwrap().id, 2);
		// both ids stay reachable
		assert_eq!(registry.countries().resolve_id(1).unwrap().population, 10);
		assert_eq!(registry.countries().len(), 2);
	}

	#[test]
	fn lookup_accepts_ids_and_labels() {
		let registry = Registry::bundled();
		let table = registry.countries();
		assert_eq!(table.lookup("Italy".into()).unwrap().id, table.lookup(LocationRef::Id(111)).unwrap().id);
	}
}
