use std::fmt;

use log::{debug, trace};

use reqwest;

use super::query::{EpiriskQuery, QueryRequest};
use super::response::{ConnectionsRisk, ExportedCases, MalformedResponse};

pub static DEFAULT_API_URL: &'static str = "http://epirisk.net/era";


#[derive(Debug)]
pub enum Error {
	Request(reqwest::Error),
	Status(reqwest::StatusCode),
	Encode(serde_json::Error),
	Malformed(MalformedResponse),
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Request(e) => fmt::Display::fmt(e, f),
			Self::Status(s) => write!(f, "epirisk responded with status {}", s),
			Self::Encode(e) => write!(f, "failed to encode query: {}", e),
			Self::Malformed(e) => fmt::Display::fmt(e, f),
		}
	}
}

impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		Self::Request(err)
	}
}

impl From<MalformedResponse> for Error {
	fn from(err: MalformedResponse) -> Self {
		Self::Malformed(err)
	}
}

impl std::error::Error for Error {}


/// Blocking client for the Epirisk endpoints. Nothing is retried; a failed
/// call fails the run.
pub struct Client {
	client: reqwest::blocking::Client,
	risk_url: String,
	exported_url: String,
}

impl Client {
	pub fn new(api_url: &str) -> Self {
		Self::with_client(reqwest::blocking::Client::new(), api_url)
	}

	pub fn with_client(client: reqwest::blocking::Client, api_url: &str) -> Self {
		let api_url = api_url.trim_end_matches('/');
		Self{
			client,
			risk_url: format!("{}/getrisk", api_url),
			exported_url: format!("{}/getexportedcases", api_url),
		}
	}

	fn fetch(&self, url: &str, req: &QueryRequest) -> Result<bytes::Bytes, Error> {
		let q = req.encode().map_err(Error::Encode)?;
		trace!("GET {} with {} sources", url, req.sources.len());
		let resp = self.client.get(url).query(&[("q", q)]).send()?;
		let status = resp.status();
		if !status.is_success() {
			return Err(Error::Status(status))
		}
		let body = resp.bytes()?;
		debug!("{} returned {} bytes", url, body.len());
		Ok(body)
	}

	pub fn get_risk(&self, req: &QueryRequest) -> Result<ConnectionsRisk, Error> {
		let body = self.fetch(&self.risk_url, req)?;
		Ok(ConnectionsRisk::from_slice(&body[..])?)
	}

	pub fn get_exported_cases(&self, req: &QueryRequest) -> Result<ExportedCases, Error> {
		let body = self.fetch(&self.exported_url, req)?;
		Ok(ExportedCases::from_slice(&body[..])?)
	}
}


/// Risk and exported cases for one query, as the dashboard needs them.
pub fn query_epirisk(client: &Client, query: &EpiriskQuery<'_>) -> Result<(ConnectionsRisk, ExportedCases), Error> {
	let req = query.build(Default::default());
	let risk = client.get_risk(&req)?;
	let exported = client.get_exported_cases(&req)?;
	Ok((risk, exported))
}


#[cfg(test)]
mod tests {
	use super::*;
	use std::io::{BufRead, BufReader, Write};
	use std::net::TcpListener;
	use std::sync::mpsc;
	use std::thread;

	use crate::location::Registry;
	use crate::query::QueryOptions;

	// Answers one request with `status` and hands back its request line.
	fn one_shot_server(status: &'static str) -> (String, mpsc::Receiver<String>) {
		let listener = TcpListener::bind("127.0.0.1:0").unwrap();
		let addr = listener.local_addr().unwrap();
		let (tx, rx) = mpsc::channel();
		thread::spawn(move || {
			let (stream, _) = listener.accept().unwrap();
			let mut reader = BufReader::new(stream.try_clone().unwrap());
			let mut request_line = String::new();
			reader.read_line(&mut request_line).unwrap();
			loop {
				let mut header = String::new();
				if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
					break;
				}
			}
			let mut stream = stream;
			write!(stream, "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status).unwrap();
			stream.flush().unwrap();
			tx.send(request_line).unwrap();
		});
		(format!("http://{}/era", addr), rx)
	}

	#[test]
	fn endpoint_urls_are_derived_from_base() {
		let client = Client::new("http://localhost:8080/era/");
		assert_eq!(client.risk_url, "http://localhost:8080/era/getrisk");
		assert_eq!(client.exported_url, "http://localhost:8080/era/getexportedcases");
	}

	#[test]
	fn server_error_is_reported_with_status() {
		let registry = Registry::bundled();
		let mut query = EpiriskQuery::new(registry.countries(), QueryOptions::default()).unwrap();
		query.set("Poland", 5).unwrap();
		let req = query.build(Default::default());

		let (url, requests) = one_shot_server("503 Service Unavailable");
		let http = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
		let client = Client::with_client(http, &url);
		match client.get_risk(&req) {
			Err(Error::Status(s)) => assert_eq!(s.as_u16(), 503),
			other => panic!("unexpected result: {:?}", other),
		}

		let request_line = requests.recv().unwrap();
		let q = req.encode().unwrap().replace('=', "%3D");
		assert!(request_line.starts_with("GET /era/getrisk?q="), "{}", request_line);
		assert!(request_line.contains(&format!("?q={} ", q)), "{}", request_line);
	}
}
