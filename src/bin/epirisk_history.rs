use std::path::PathBuf;

use clap::Parser;

use log::{info, warn};

use corona::{Client, Config, EpiriskQuery, StepMeter, query_epirisk, record_dates, records_on, write_table};
use corona::export::{CONNECTIONS_TABLE, EXPORTED_CASES_TABLE, RISKS_TABLE};
use corona::hopkins;

static EXPORTED_TOP_TABLE: &'static str = "exported_top.csv";


#[derive(Parser, Debug)]
#[command(name = "epirisk_history")]
#[command(about = "Replay the Epirisk queries for every day of the case series", long_about = None)]
struct Args {
	/// TOML configuration file
	#[arg(long)]
	config: Option<PathBuf>,

	/// Number of highest-risk countries to request exported cases for
	#[arg(long, default_value_t = 30)]
	top: usize,
}


fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	let args = Args::parse();

	let config = Config::load(args.config.as_deref())?;
	let registry = config.load_registry()?;
	let countries = config.load_countries(&registry)?;
	let table = registry.countries();

	let http = reqwest::blocking::Client::new();
	println!("loading case data ...");
	let cases = hopkins::load_cases(&http, &config.hopkins_sources(), &countries)?;
	let client = Client::with_client(http, &config.epirisk.url);

	let dates = record_dates(&cases);
	let history_dir = config.export.directory.join("history");
	println!("querying epirisk for {} days ...", dates.len());
	let mut output = corona::default_output();
	let mut pm = StepMeter::new(&mut *output, dates.len());
	for (i, date) in dates.iter().enumerate() {
		let day = records_on(&cases, *date);
		let (query, unknown) = EpiriskQuery::from_latest_cases(table, config.query_options(), &day)?;
		if !unknown.is_empty() {
			warn!("{}: {} locations unknown to epirisk", date, unknown.len());
		}
		if query.is_empty() {
			info!("{}: no cases, skipping", date);
			pm.update(i+1);
			continue;
		}

		let (risk, exported) = query_epirisk(&client, &query)?;
		let top = risk.top_targets(args.top);
		let exported_top = client.get_exported_cases(&query.build_for_targets(&top))?;

		let (risks, mut skipped) = risk.distribution_rows(table);
		let (connections, unknown) = risk.connection_rows(table);
		skipped.extend(unknown);
		let (exported, unknown) = exported.rows(table, true);
		skipped.extend(unknown);
		let (exported_top, unknown) = exported_top.rows(table, true);
		skipped.extend(unknown);
		if !skipped.is_empty() {
			warn!("{}: skipped {} response entries with unknown ids", date, skipped.len());
		}

		let dir = history_dir.join(date.format("%Y-%m-%d").to_string());
		write_table(dir.join(RISKS_TABLE), &risks)?;
		write_table(dir.join(CONNECTIONS_TABLE), &connections)?;
		write_table(dir.join(EXPORTED_CASES_TABLE), &exported)?;
		write_table(dir.join(EXPORTED_TOP_TABLE), &exported_top)?;
		pm.update(i+1);
	}
	pm.finish();
	Ok(())
}
