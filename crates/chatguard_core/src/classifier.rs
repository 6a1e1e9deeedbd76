#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;

use chatguard_domain::ContentKind;
use chatguard_platform::{EntityKind, MessagePayload};

/// Content kinds that new members may not post.
pub const RESTRICTED_KINDS: [ContentKind; 8] = [
	ContentKind::Animation,
	ContentKind::Photo,
	ContentKind::Document,
	ContentKind::Voice,
	ContentKind::Audio,
	ContentKind::Video,
	ContentKind::Sticker,
	ContentKind::VideoNote,
];

/// Why a message from an untrusted sender is removed.
///
/// Ordering puts content kinds first (in declaration order) and `Link` last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RestrictionReason {
	Content(ContentKind),
	Link,
}

impl RestrictionReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			RestrictionReason::Content(kind) => kind.as_str(),
			RestrictionReason::Link => "link",
		}
	}
}

impl fmt::Display for RestrictionReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

pub fn is_restricted_kind(kind: ContentKind) -> bool {
	RESTRICTED_KINDS.contains(&kind)
}

/// Restricted content present in `message`; empty for plain text without links.
pub fn classify(message: &MessagePayload) -> BTreeSet<RestrictionReason> {
	let mut reasons: BTreeSet<RestrictionReason> = message
		.content_kinds
		.iter()
		.copied()
		.filter(|k| is_restricted_kind(*k))
		.map(RestrictionReason::Content)
		.collect();

	if message.entities.iter().any(|e| e.kind == EntityKind::Url) {
		reasons.insert(RestrictionReason::Link);
	}

	reasons
}

/// Comma separated reason list, e.g. `photo, link`.
pub fn format_reasons(reasons: &BTreeSet<RestrictionReason>) -> String {
	reasons.iter().map(RestrictionReason::as_str).collect::<Vec<_>>().join(", ")
}
