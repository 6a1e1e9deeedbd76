#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use chatguard_platform::UserRef;

use crate::classifier::{RestrictionReason, format_reasons};

pub const DEFAULT_NOTICE_PREFIX: &str = "☝️";

/// Text posted to the chat after removing a message.
pub fn removal_notice(prefix: &str, sender: &UserRef, reasons: &BTreeSet<RestrictionReason>) -> String {
	let body = format!(
		"Message from {} removed. Reason: new user + {}",
		sender.display_name(),
		format_reasons(reasons)
	);

	let prefix = prefix.trim();
	if prefix.is_empty() { body } else { format!("{prefix} {body}") }
}
