use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;
use std::fmt;

use serde::{Serialize};
use serde_json::{Map, Value};

use smartstring::alias::{String as SmartString};

use super::location::{LocationId, LocationTable, UnknownLocation};

pub static WORLD_TARGET: &'static str = "world";


#[derive(Debug)]
pub enum MalformedResponse {
	Json(serde_json::Error),
	MissingKey(&'static str),
	NotAnObject(&'static str),
	NotAnArray(&'static str),
	InvalidId(String),
	InvalidNumber{field: &'static str, value: String},
}

impl fmt::Display for MalformedResponse {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Json(e) => write!(f, "malformed response: {}", e),
			Self::MissingKey(k) => write!(f, "malformed response: missing key {:?}", k),
			Self::NotAnObject(k) => write!(f, "malformed response: {:?} is not an object", k),
			Self::NotAnArray(k) => write!(f, "malformed response: {:?} is not an array", k),
			Self::InvalidId(v) => write!(f, "malformed response: invalid location id {}", v),
			Self::InvalidNumber{field, value} => write!(f, "malformed response: {:?} has non-numeric value {}", field, value),
		}
	}
}

impl From<serde_json::Error> for MalformedResponse {
	fn from(other: serde_json::Error) -> Self {
		Self::Json(other)
	}
}

impl std::error::Error for MalformedResponse {}


fn get<'v>(obj: &'v Map<String, Value>, key: &'static str) -> Result<&'v Value, MalformedResponse> {
	obj.get(key).ok_or(MalformedResponse::MissingKey(key))
}

fn as_object<'v>(v: &'v Value, what: &'static str) -> Result<&'v Map<String, Value>, MalformedResponse> {
	v.as_object().ok_or(MalformedResponse::NotAnObject(what))
}

// numbers occasionally arrive as strings
fn as_f64(v: &Value, field: &'static str) -> Result<f64, MalformedResponse> {
	let parsed = match v {
		Value::Number(n) => n.as_f64(),
		Value::String(s) => s.trim().parse::<f64>().ok(),
		_ => None,
	};
	parsed.ok_or_else(|| { MalformedResponse::InvalidNumber{field, value: v.to_string()} })
}

fn parse_id(s: &str) -> Result<LocationId, MalformedResponse> {
	s.trim().parse::<LocationId>().map_err(|_| { MalformedResponse::InvalidId(s.into()) })
}

fn value_as_id(v: &Value) -> Result<LocationId, MalformedResponse> {
	match v {
		Value::Number(n) => n.as_u64()
			.and_then(|n| { LocationId::try_from(n).ok() })
			.ok_or_else(|| { MalformedResponse::InvalidId(v.to_string()) }),
		Value::String(s) => parse_id(s),
		_ => Err(MalformedResponse::InvalidId(v.to_string())),
	}
}


/// Probability per case-count bucket plus the mass of the truncated tail.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
	pub values: BTreeMap<i64, f64>,
	pub residual: f64,
}

impl Distribution {
	fn from_value(v: &Value) -> Result<Self, MalformedResponse> {
		let obj = as_object(v, "target")?;
		let dist = as_object(get(obj, "distribution")?, "distribution")?;
		let mut values = BTreeMap::new();
		for (k, p) in dist.iter() {
			let bucket = k.trim().parse::<i64>().map_err(|_| {
				MalformedResponse::InvalidNumber{field: "distribution", value: k.clone()}
			})?;
			values.insert(bucket, as_f64(p, "distribution")?);
		}
		Ok(Self{
			values,
			residual: as_f64(get(obj, "residual")?, "residual")?,
		})
	}

	pub fn total(&self) -> f64 {
		self.values.values().sum::<f64>() + self.residual
	}
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
	World,
	Location(LocationId),
}

impl Target {
	fn parse(s: &str) -> Result<Self, MalformedResponse> {
		if s == WORLD_TARGET {
			return Ok(Self::World)
		}
		Ok(Self::Location(parse_id(s)?))
	}

	pub fn label(&self, table: &LocationTable) -> Result<SmartString, UnknownLocation> {
		match self {
			Self::World => Ok(WORLD_TARGET.into()),
			Self::Location(id) => Ok(table.resolve_id(*id)?.label.clone()),
		}
	}
}

impl fmt::Display for Target {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::World => f.write_str(WORLD_TARGET),
			Self::Location(id) => write!(f, "{}", id),
		}
	}
}


#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedRow {
	#[serde(rename = "where")]
	pub target: SmartString,
	pub value: i64,
	pub probability: f64,
}


#[derive(Debug, Clone, PartialEq)]
pub struct ExportedCases {
	pub targets: BTreeMap<Target, Distribution>,
}

impl ExportedCases {
	pub fn from_slice(body: &[u8]) -> Result<Self, MalformedResponse> {
		let v: Value = serde_json::from_slice(body)?;
		Self::from_value(&v)
	}

	pub fn from_value(v: &Value) -> Result<Self, MalformedResponse> {
		let obj = as_object(v, "response")?;
		let targets_obj = as_object(get(obj, "targets")?, "targets")?;
		let mut targets = BTreeMap::new();
		for (k, dist) in targets_obj.iter() {
			targets.insert(Target::parse(k)?, Distribution::from_value(dist)?);
		}
		Ok(Self{targets})
	}

	/// One row per target and bucket. With `names`, targets are given by
	/// label instead of id; targets missing from `table` are returned
	/// separately instead of as rows.
	pub fn rows(&self, table: &LocationTable, names: bool) -> (Vec<ExportedRow>, Vec<UnknownLocation>) {
		let mut result = Vec::new();
		let mut unknown = Vec::new();
		for (target, dist) in self.targets.iter() {
			let label: SmartString = if names {
				match target.label(table) {
					Ok(label) => label,
					Err(e) => {
						unknown.push(e);
						continue
					},
				}
			} else {
				target.to_string().into()
			};
			for (value, probability) in dist.values.iter() {
				result.push(ExportedRow{
					target: label.clone(),
					value: *value,
					probability: *probability,
				});
			}
		}
		(result, unknown)
	}
}


#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRow {
	pub country_id: LocationId,
	pub country_name: SmartString,
	pub dest_id: LocationId,
	pub dest_name: SmartString,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionRow {
	#[serde(rename = "CountryId")]
	pub country_id: LocationId,
	#[serde(rename = "Country")]
	pub country: SmartString,
	#[serde(rename = "Risk")]
	pub risk: f64,
}


/// Response of `getrisk`: travel connections of every source and the
/// importation risk per country.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionsRisk {
	pub connections: BTreeMap<LocationId, BTreeSet<LocationId>>,
	pub distribution: BTreeMap<LocationId, f64>,
	pub residual: f64,
}

impl ConnectionsRisk {
	pub fn from_slice(body: &[u8]) -> Result<Self, MalformedResponse> {
		let v: Value = serde_json::from_slice(body)?;
		Self::from_value(&v)
	}

	pub fn from_value(v: &Value) -> Result<Self, MalformedResponse> {
		let obj = as_object(v, "response")?;

		let mut connections = BTreeMap::new();
		for (k, dests) in as_object(get(obj, "connections")?, "connections")?.iter() {
			let dests = dests.as_array().ok_or(MalformedResponse::NotAnArray("connections"))?;
			let mut set = BTreeSet::new();
			for dest in dests.iter() {
				set.insert(value_as_id(dest)?);
			}
			connections.insert(parse_id(k)?, set);
		}

		let mut distribution = BTreeMap::new();
		for (k, risk) in as_object(get(obj, "distribution")?, "distribution")?.iter() {
			distribution.insert(parse_id(k)?, as_f64(risk, "distribution")?);
		}

		Ok(Self{
			connections,
			distribution,
			residual: as_f64(get(obj, "residual")?, "residual")?,
		})
	}

	/// Rows for every connection with both ends in `table`. Ids the table
	/// doesn't know are returned next to the rows.
	pub fn connection_rows(&self, table: &LocationTable) -> (Vec<ConnectionRow>, Vec<UnknownLocation>) {
		let mut result = Vec::new();
		let mut unknown = Vec::new();
		for (country_id, dests) in self.connections.iter() {
			let country_name = match table.resolve_id(*country_id) {
				Ok(loc) => &loc.label,
				Err(e) => {
					unknown.push(e);
					continue
				},
			};
			for dest_id in dests.iter() {
				match table.resolve_id(*dest_id) {
					Ok(dest) => result.push(ConnectionRow{
						country_id: *country_id,
						country_name: country_name.clone(),
						dest_id: *dest_id,
						dest_name: dest.label.clone(),
					}),
					Err(e) => unknown.push(e),
				}
			}
		}
		(result, unknown)
	}

	pub fn distribution_rows(&self, table: &LocationTable) -> (Vec<DistributionRow>, Vec<UnknownLocation>) {
		let mut result = Vec::with_capacity(self.distribution.len());
		let mut unknown = Vec::new();
		for (id, risk) in self.distribution.iter() {
			match table.resolve_id(*id) {
				Ok(loc) => result.push(DistributionRow{
					country_id: *id,
					country: loc.label.clone(),
					risk: *risk,
				}),
				Err(e) => unknown.push(e),
			}
		}
		(result, unknown)
	}

	/// The `n` countries with the highest risk, highest first. Equal risks
	/// are ordered by id.
	pub fn top_targets(&self, n: usize) -> Vec<LocationId> {
		let mut ranked: Vec<(LocationId, f64)> = self.distribution.iter().map(|(id, risk)| { (*id, *risk) }).collect();
		ranked.sort_by(|(ida, a), (idb, b)| {
			b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal).then(ida.cmp(idb))
		});
		ranked.into_iter().take(n).map(|(id, _)| { id }).collect()
	}
}
