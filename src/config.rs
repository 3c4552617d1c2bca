use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};

use enum_map::{enum_map, EnumMap};

use serde::{Deserialize};

use super::client::DEFAULT_API_URL;
use super::comparisons::{EpidemicSummary, read_epidemics, read_sars};
use super::countries::{BUNDLED_COUNTRIES, CountryError, CountryTable};
use super::hopkins::{CaseRecord, Metric};
use super::ioutil::open_resource;
use super::location::{BUNDLED_INIT_DATA, Registry};
use super::query::{DEFAULT_SOURCE_CAP, QueryOptions};

static HOPKINS_BASE_URL: &'static str = "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series";

pub static DEFAULT_CONFIG_PATH: &'static str = "corona.toml";


#[derive(Debug)]
pub enum Error {
	Io(PathBuf, io::Error),
	Toml(PathBuf, toml::de::Error),
	InitData(serde_json::Error),
	Country(CountryError),
	Csv(PathBuf, csv::Error),
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Io(p, e) => write!(f, "failed to read {}: {}", p.display(), e),
			Self::Toml(p, e) => write!(f, "invalid configuration in {}: {}", p.display(), e),
			Self::InitData(e) => write!(f, "malformed epirisk init data: {}", e),
			Self::Country(e) => fmt::Display::fmt(e, f),
			Self::Csv(p, e) => write!(f, "malformed table {}: {}", p.display(), e),
		}
	}
}

impl From<CountryError> for Error {
	fn from(other: CountryError) -> Self {
		Self::Country(other)
	}
}

impl std::error::Error for Error {}


#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EpiriskConfig {
	pub url: String,
	pub period: u32,
	pub month: u32,
	pub travel_level: f64,
	pub source_cap: usize,
}

impl Default for EpiriskConfig {
	fn default() -> Self {
		let opts = QueryOptions::default();
		Self{
			url: DEFAULT_API_URL.into(),
			period: opts.period,
			month: opts.month,
			travel_level: opts.travel_level,
			source_cap: DEFAULT_SOURCE_CAP,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HopkinsConfig {
	pub confirmed: String,
	pub deaths: String,
	pub recovered: String,
}

fn hopkins_url(metric: Metric) -> String {
	format!("{}/time_series_19-covid-{}.csv", HOPKINS_BASE_URL, metric.name())
}

impl Default for HopkinsConfig {
	fn default() -> Self {
		Self{
			confirmed: hopkins_url(Metric::Confirmed),
			deaths: hopkins_url(Metric::Deaths),
			recovered: hopkins_url(Metric::Recovered),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataConfig {
	/// replacement for the bundled epirisk init data
	pub init_data: Option<PathBuf>,
	/// replacement for the bundled country table
	pub countries: Option<PathBuf>,
	/// other epidemics to compare against
	pub epidemics: Option<PathBuf>,
	/// SARS case rows appended to the case table
	pub sars: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
	pub directory: PathBuf,
}

impl Default for ExportConfig {
	fn default() -> Self {
		Self{
			directory: "export".into(),
		}
	}
}


#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
	pub epirisk: EpiriskConfig,
	pub hopkins: HopkinsConfig,
	pub data: DataConfig,
	pub export: ExportConfig,
}

impl Config {
	pub fn from_str(s: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(s)
	}

	/// Read the configuration file (defaults if it does not exist), then
	/// apply `EPIRISK_URL` and `CORONA_EXPORT_DIR` from the environment.
	pub fn load(path: Option<&Path>) -> Result<Self, Error> {
		let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
		let mut config = match fs::read_to_string(path) {
			Ok(s) => {
				debug!("loaded config from {}", path.display());
				Self::from_str(&s).map_err(|e| { Error::Toml(path.into(), e) })?
			},
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				info!("{} not found, using default configuration", path.display());
				Self::default()
			},
			Err(e) => return Err(Error::Io(path.into(), e)),
		};
		config.apply_env(|name| { env::var(name).ok() });
		Ok(config)
	}

	pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
		if let Some(url) = lookup("EPIRISK_URL") {
			self.epirisk.url = url;
		}
		if let Some(dir) = lookup("CORONA_EXPORT_DIR") {
			self.export.directory = dir.into();
		}
	}

	pub fn query_options(&self) -> QueryOptions {
		QueryOptions{
			period: self.epirisk.period,
			month: self.epirisk.month,
			travel_level: self.epirisk.travel_level,
			source_cap: self.epirisk.source_cap,
		}
	}

	pub fn hopkins_sources(&self) -> EnumMap<Metric, String> {
		enum_map! {
			Metric::Confirmed => self.hopkins.confirmed.clone(),
			Metric::Deaths => self.hopkins.deaths.clone(),
			Metric::Recovered => self.hopkins.recovered.clone(),
		}
	}

	pub fn load_registry(&self) -> Result<Registry, Error> {
		let path = self.data.init_data.as_ref();
		let r = open_resource(path, BUNDLED_INIT_DATA).map_err(|e| {
			Error::Io(path.cloned().unwrap_or_default(), e)
		})?;
		Registry::from_reader(r).map_err(Error::InitData)
	}

	/// Country table with Epirisk ids attached from `registry`.
	pub fn load_countries(&self, registry: &Registry) -> Result<CountryTable, Error> {
		let path = self.data.countries.as_ref();
		let r = open_resource(path, BUNDLED_COUNTRIES).map_err(|e| {
			Error::Io(path.cloned().unwrap_or_default(), e)
		})?;
		Ok(CountryTable::from_reader(r)?.with_epirisk_ids(registry.countries())?)
	}

	/// Comparison rows of other epidemics; none unless `[data] epidemics`
	/// is set.
	pub fn load_epidemics(&self) -> Result<Vec<EpidemicSummary>, Error> {
		let path = self.data.epidemics.as_ref();
		let r = open_resource(path, "").map_err(|e| {
			Error::Io(path.cloned().unwrap_or_default(), e)
		})?;
		read_epidemics(r).map_err(|e| { Error::Csv(path.cloned().unwrap_or_default(), e) })
	}

	pub fn load_sars(&self) -> Result<Vec<CaseRecord>, Error> {
		let path = self.data.sars.as_ref();
		let r = open_resource(path, "").map_err(|e| {
			Error::Io(path.cloned().unwrap_or_default(), e)
		})?;
		read_sars(r).map_err(|e| { Error::Csv(path.cloned().unwrap_or_default(), e) })
	}

	pub fn export_path(&self, table: &str) -> PathBuf {
		self.export.directory.join(table)
	}
}
