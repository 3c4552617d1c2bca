use std::io;
use std::io::Write;
use std::time;


pub trait ProgressSink {
	fn update(&mut self, inow: usize, n: Option<usize>);
	fn finish(&mut self, inow: usize, n: Option<usize>);
}


/// Single-line progress display with a rate estimate, rewritten in place.
pub struct ProgressMeter {
	t0: time::Instant,
	tprev: time::Instant,
	iprev: usize,
}

impl ProgressMeter {
	pub fn start() -> Self {
		let now = time::Instant::now();
		Self{
			t0: now,
			tprev: now,
			iprev: 0,
		}
	}
}

impl ProgressSink for ProgressMeter {
	fn update(&mut self, inow: usize, n: Option<usize>) {
		let now = time::Instant::now();
		let dt = (now - self.tprev).as_secs_f64();
		let rate = inow.saturating_sub(self.iprev) as f64 / dt;
		match n {
			Some(n) => {
				let done = (inow as f64) / (n as f64);
				print!("{:6.0}% [{:6.2}/s]\r", done * 100.0, rate);
			},
			None => {
				print!("{:12} [{:6.2}/s]\r", inow, rate);
			},
		}
		let _ = io::stdout().flush();
		self.iprev = inow;
		self.tprev = now;
	}

	fn finish(&mut self, inow: usize, n: Option<usize>) {
		let dt = (time::Instant::now() - self.t0).as_secs_f64();
		let rate = inow as f64 / dt;
		match n {
			Some(_) => {
				println!("{:6.0}% [{:6.2}/s]", 100.0, rate);
			},
			None => {
				println!("{:12} [{:6.2}/s]", inow, rate);
			},
		}
	}
}


pub struct NullSink;

impl ProgressSink for NullSink {
	fn update(&mut self, _inow: usize, _n: Option<usize>) {}
	fn finish(&mut self, _inow: usize, _n: Option<usize>) {}
}


/// Progress on stdout if it is a terminal, nothing otherwise.
pub fn default_output() -> Box<dyn ProgressSink> {
	if isatty::stdout_isatty() {
		Box::new(ProgressMeter::start())
	} else {
		Box::new(NullSink)
	}
}


/// Progress over a known number of steps.
pub struct StepMeter<'s, S: ProgressSink + ?Sized> {
	sink: &'s mut S,
	n: usize,
}

impl<'s, S: ProgressSink + ?Sized> StepMeter<'s, S> {
	pub fn new(sink: &'s mut S, n: usize) -> Self {
		sink.update(0, Some(n));
		Self{sink, n}
	}

	pub fn update(&mut self, inow: usize) {
		self.sink.update(inow, Some(self.n));
	}

	pub fn finish(self) {
		self.sink.finish(self.n, Some(self.n));
	}
}


/// Progress over an open-ended count of items.
pub struct CountMeter<'s, S: ProgressSink + ?Sized> {
	sink: &'s mut S,
}

impl<'s, S: ProgressSink + ?Sized> CountMeter<'s, S> {
	pub fn new(sink: &'s mut S) -> Self {
		sink.update(0, None);
		Self{sink}
	}

	pub fn update(&mut self, inow: usize) {
		self.sink.update(inow, None);
	}

	pub fn finish(self, n: usize) {
		self.sink.finish(n, None);
	}
}
