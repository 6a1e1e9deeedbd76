#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("zero is not a valid id")]
	Zero,
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

fn parse_nonzero(s: &str) -> Result<i64, ParseIdError> {
	let s = s.trim();
	if s.is_empty() {
		return Err(ParseIdError::Empty);
	}

	let v: i64 = s
		.parse()
		.map_err(|_| ParseIdError::InvalidFormat(format!("expected integer id, got {s:?}")))?;

	if v == 0 {
		return Err(ParseIdError::Zero);
	}
	Ok(v)
}

macro_rules! numeric_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(pub i64);

		impl $name {
			pub const fn new(id: i64) -> Self {
				Self(id)
			}

			pub const fn get(self) -> i64 {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl FromStr for $name {
			type Err = ParseIdError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				parse_nonzero(s).map(Self)
			}
		}

		impl From<i64> for $name {
			fn from(v: i64) -> Self {
				Self(v)
			}
		}
	};
}

numeric_id! {
	/// Chat (group) identifier. Supergroups use negative ids.
	ChatId
}

numeric_id! {
	/// User identifier.
	UserId
}

numeric_id! {
	/// Chat-local message identifier.
	MessageId
}

/// Declared content kind of an incoming message.
///
/// Decoding accepts a few platform aliases; kinds this crate does not know
/// decode as `Other` so the rest of the message is still moderated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
	Text,
	#[serde(alias = "gif")]
	Animation,
	#[serde(alias = "image")]
	Photo,
	Document,
	Voice,
	Audio,
	Video,
	Sticker,
	#[serde(alias = "short_video", alias = "videonote")]
	VideoNote,
	Contact,
	Location,
	Poll,
	#[serde(other)]
	Other,
}

impl ContentKind {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			ContentKind::Text => "text",
			ContentKind::Animation => "animation",
			ContentKind::Photo => "photo",
			ContentKind::Document => "document",
			ContentKind::Voice => "voice",
			ContentKind::Audio => "audio",
			ContentKind::Video => "video",
			ContentKind::Sticker => "sticker",
			ContentKind::VideoNote => "video_note",
			ContentKind::Contact => "contact",
			ContentKind::Location => "location",
			ContentKind::Poll => "poll",
			ContentKind::Other => "other",
		}
	}
}

impl fmt::Display for ContentKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
