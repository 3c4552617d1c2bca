use std::fs;
use std::io;
use std::io::Read;
use std::path::Path;

use log::debug;

use flate2;


/// Open a local input file, transparently decompressing `.gz` files.
pub fn magic_open<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Read>> {
	let path = path.as_ref();
	let f = fs::File::open(path)?;
	match path.extension() {
		Some(x) if x == "gz" => {
			debug!("opening {} as gzip stream", path.display());
			Ok(Box::new(flate2::read::GzDecoder::new(f)))
		},
		_ => Ok(Box::new(f)),
	}
}

/// Open the user-supplied replacement for a bundled resource, or the
/// bundled copy if there is none.
pub fn open_resource<P: AsRef<Path>>(path: Option<P>, bundled: &'static str) -> io::Result<Box<dyn Read>> {
	match path {
		Some(path) => magic_open(path),
		None => Ok(Box::new(bundled.as_bytes())),
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	use flate2::write::GzEncoder;
	use flate2::Compression;

	#[test]
	fn magic_open_reads_gzip_and_plain_files() {
		let dir = tempfile::tempdir().unwrap();
		let plain = dir.path().join("series.csv");
		fs::write(&plain, b"a,b\n1,2\n").unwrap();
		let packed = dir.path().join("series.csv.gz");
		let mut enc = GzEncoder::new(fs::File::create(&packed).unwrap(), Compression::default());
		enc.write_all(b"a,b\n1,2\n").unwrap();
		enc.finish().unwrap();

		for path in [plain, packed].iter() {
			let mut s = String::new();
			magic_open(path).unwrap().read_to_string(&mut s).unwrap();
			assert_eq!(s, "a,b\n1,2\n");
		}
	}

	#[test]
	fn open_resource_falls_back_to_bundled() {
		let mut s = String::new();
		open_resource(None::<&Path>, "bundled").unwrap().read_to_string(&mut s).unwrap();
		assert_eq!(s, "bundled");
	}
}
