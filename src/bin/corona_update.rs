use std::path::PathBuf;

use clap::Parser;

use log::{info, warn};

use corona::{Client, Config, EpiriskQuery, UnknownLocation, big_numbers, epidemic_summaries, join_risk_cases, latest_confirmed, query_epirisk, risk_by_iso3, sars_progress, write_table};
use corona::export::{BIG_NUMBERS_TABLE, CASES_TABLE, CASES_WITH_SARS_TABLE, CONNECTIONS_TABLE, EPIDEMIC_DAYS_TABLE, EXPORTED_CASES_TABLE, RISKS_TABLE, RISK_CASES_TABLE};
use corona::hopkins;


#[derive(Parser, Debug)]
#[command(name = "corona_update")]
#[command(about = "Refresh the dashboard tables from case data and Epirisk", long_about = None)]
struct Args {
	/// TOML configuration file
	#[arg(long)]
	config: Option<PathBuf>,

	/// Fail if a country with cases or a country in a response is unknown
	#[arg(long)]
	strict: bool,
}


fn check_unknown(table: &str, unknown: &[UnknownLocation], strict: bool) -> Result<(), String> {
	for loc in unknown.iter() {
		warn!("{}: skipped {}", table, loc);
	}
	if strict && !unknown.is_empty() {
		return Err(format!("{}: {} epirisk locations missing from the registry", table, unknown.len()))
	}
	Ok(())
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
	let big = big_numbers(&cases, &countries);
	let epidemics = epidemic_summaries(&cases, config.load_epidemics()?);
	let with_sars = sars_progress(&cases, config.load_sars()?);

	let (query, unknown) = EpiriskQuery::from_latest_cases(table, config.query_options(), &cases)?;
	for loc in unknown.iter() {
		warn!("not sent to epirisk: {}", loc);
	}
	if args.strict && !unknown.is_empty() {
		return Err(format!("{} locations with cases are unknown to epirisk", unknown.len()).into())
	}

	println!("querying epirisk ...");
	let client = Client::with_client(http, &config.epirisk.url);
	let (risk, exported) = query_epirisk(&client, &query)?;
	info!("risk residual {:.4}, {} countries at risk", risk.residual, risk.distribution.len());

	let risk_cases = join_risk_cases(
		&risk_by_iso3(&risk, &countries),
		&latest_confirmed(&cases),
		&countries,
	);

	let (connections, unknown) = risk.connection_rows(table);
	check_unknown(CONNECTIONS_TABLE, &unknown, args.strict)?;
	let (risks, unknown) = risk.distribution_rows(table);
	check_unknown(RISKS_TABLE, &unknown, args.strict)?;
	let (exported, unknown) = exported.rows(table, true);
	check_unknown(EXPORTED_CASES_TABLE, &unknown, args.strict)?;

	println!("writing tables to {} ...", config.export.directory.display());
	write_table(config.export_path(CASES_TABLE), &cases)?;
	write_table(config.export_path(CONNECTIONS_TABLE), &connections)?;
	write_table(config.export_path(RISKS_TABLE), &risks)?;
	write_table(config.export_path(EXPORTED_CASES_TABLE), &exported)?;
	write_table(config.export_path(RISK_CASES_TABLE), &risk_cases)?;
	write_table(config.export_path(BIG_NUMBERS_TABLE), &big)?;
	write_table(config.export_path(EPIDEMIC_DAYS_TABLE), &epidemics)?;
	write_table(config.export_path(CASES_WITH_SARS_TABLE), &with_sars)?;
	Ok(())
}
