/// Counts keep-alive wakes and says which ones should probe the connection.
#[derive(Debug, Clone)]
pub(crate) struct Heartbeat {
	ping_every: u32,
	since_ping: u32,
	fired: u64,
}

impl Heartbeat {
	pub(crate) fn new(ping_every: u32) -> Self {
		Self { ping_every: ping_every.max(1), since_ping: 0, fired: 0 }
	}

	/// Records one wake. Returns true when this wake is due a ping; the
	/// counter then starts over.
	pub(crate) fn tick(&mut self) -> bool {
		self.fired += 1;
		self.since_ping += 1;
		if self.since_ping >= self.ping_every {
			self.since_ping = 0;
			return true;
		}
		false
	}

	pub(crate) fn fired(&self) -> u64 {
		self.fired
	}
}
