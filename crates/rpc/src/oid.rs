//! 12-byte document identifiers.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

/// Error parsing an [`ObjectId`] from its hex form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectIdError {
	/// Input was not exactly 24 characters long.
	#[error("object id must be 24 hex characters, got {0}")]
	InvalidLength(usize),
	/// Input contained a non-hex character.
	#[error("invalid hex character {c:?} at {index}")]
	InvalidCharacter {
		/// Offending character.
		c: char,
		/// Byte offset into the input.
		index: usize,
	},
}

/// A 12-byte identifier: 4-byte big-endian seconds, 5 process-unique random
/// bytes, 3-byte big-endian counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

impl ObjectId {
	/// Generates a fresh identifier for the current second.
	pub fn new() -> Self {
		let secs = chrono::Utc::now().timestamp().clamp(0, i64::from(u32::MAX)) as u32;
		let unique = PROCESS_UNIQUE.get_or_init(rand::random);
		let counter = COUNTER.get_or_init(|| AtomicU32::new(rand::random())).fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

		let mut bytes = [0u8; 12];
		bytes[..4].copy_from_slice(&secs.to_be_bytes());
		bytes[4..9].copy_from_slice(unique);
		bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
		Self(bytes)
	}

	/// Wraps raw bytes.
	pub const fn from_bytes(bytes: [u8; 12]) -> Self {
		Self(bytes)
	}

	/// Returns the raw bytes.
	pub const fn bytes(&self) -> [u8; 12] {
		self.0
	}

	/// Parses the 24-character hex form. Upper and lower case are accepted.
	pub fn parse_str(s: &str) -> Result<Self, ObjectIdError> {
		let raw = s.as_bytes();
		if raw.len() != 24 {
			return Err(ObjectIdError::InvalidLength(s.chars().count()));
		}
		let mut bytes = [0u8; 12];
		for (i, pair) in raw.chunks_exact(2).enumerate() {
			let hi = hex_nibble(pair[0]).ok_or_else(|| invalid_char(s, i * 2))?;
			let lo = hex_nibble(pair[1]).ok_or_else(|| invalid_char(s, i * 2 + 1))?;
			bytes[i] = (hi << 4) | lo;
		}
		Ok(Self(bytes))
	}

	/// Lowercase 24-character hex form.
	pub fn to_hex(&self) -> String {
		const DIGITS: &[u8; 16] = b"0123456789abcdef";
		let mut out = String::with_capacity(24);
		for byte in self.0 {
			out.push(DIGITS[usize::from(byte >> 4)] as char);
			out.push(DIGITS[usize::from(byte & 0x0f)] as char);
		}
		out
	}

	/// Creation time embedded in the first four bytes.
	pub fn timestamp(&self) -> crate::DateTime {
		let secs = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
		crate::DateTime::from_millis(i64::from(secs) * 1000).unwrap_or_else(crate::DateTime::epoch)
	}
}

impl Default for ObjectId {
	fn default() -> Self {
		Self::new()
	}
}

fn hex_nibble(b: u8) -> Option<u8> {
	match b {
		b'0'..=b'9' => Some(b - b'0'),
		b'a'..=b'f' => Some(b - b'a' + 10),
		b'A'..=b'F' => Some(b - b'A' + 10),
		_ => None,
	}
}

fn invalid_char(s: &str, index: usize) -> ObjectIdError {
	let c = s.get(index..).and_then(|rest| rest.chars().next()).unwrap_or('\u{fffd}');
	ObjectIdError::InvalidCharacter { c, index }
}

impl FromStr for ObjectId {
	type Err = ObjectIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse_str(s)
	}
}

impl fmt::Display for ObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}

impl fmt::Debug for ObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ObjectId({})", self.to_hex())
	}
}
