#![forbid(unsafe_code)]

use std::time::Duration;

use chatguard_core::membership::{record_departure, record_join};
use chatguard_core::{ChatRecord, Departure, MembershipEntry, TrustEngine};
use chatguard_domain::{ChatId, UserId};
use proptest::prelude::*;

const DAY_MS: i64 = 86_400_000;

fn record() -> ChatRecord {
	ChatRecord::new(ChatId(-42))
}

proptest! {
	#[test]
	fn trust_flips_once_and_stays(
		since in 1i64..4_000_000_000_000,
		age_ms in 1u64..((7 * DAY_MS) as u64),
		mut offsets in proptest::collection::vec(0i64..(14 * DAY_MS), 1..32),
	) {
		let engine = TrustEngine::new(Duration::from_millis(age_ms), std::iter::empty());
		let mut rec = record();
		prop_assert!(record_join(&mut rec, UserId(7), since));

		offsets.sort_unstable();
		let mut seen_trusted = false;
		for off in offsets {
			let now = since + off;
			let trusted = engine.is_trusted(&mut rec, UserId(7), now);
			prop_assert_eq!(trusted, off >= age_ms as i64);
			if seen_trusted {
				prop_assert!(trusted, "trust must not be revoked by time passing");
			}
			seen_trusted |= trusted;
		}
	}

	#[test]
	fn unknown_users_are_always_trusted(user in 1i64..i64::MAX, now in DAY_MS..4_000_000_000_000) {
		let engine = TrustEngine::new(Duration::from_secs(24 * 3600), std::iter::empty());
		let mut rec = record();

		prop_assert!(engine.is_trusted(&mut rec, UserId(user), now));
		prop_assert_eq!(rec.membership(UserId(user)), Some(MembershipEntry::unknown()));
		prop_assert!(engine.is_trusted(&mut rec, UserId(user), now));
		prop_assert_eq!(rec.tracked_users(), 1);
	}

	#[test]
	fn repeated_joins_keep_first_timestamp(first in 1i64..1_000_000, later in proptest::collection::vec(1i64..1_000_000, 0..16)) {
		let mut rec = record();
		record_join(&mut rec, UserId(3), first);
		for t in later {
			prop_assert!(!record_join(&mut rec, UserId(3), t));
		}
		prop_assert_eq!(rec.membership(UserId(3)).map(|e| e.since), Some(first));
	}

	#[test]
	fn departures_untrust_only_on_ejection(leaver in 1i64..1_000, actor in 1i64..1_000) {
		let mut rec = record();
		record_join(&mut rec, UserId(leaver), 10);

		let out = record_departure(&mut rec, UserId(leaver), UserId(actor));
		if leaver == actor {
			prop_assert_eq!(out, Departure::SelfLeave);
			prop_assert!(rec.membership(UserId(leaver)).is_some());
		} else {
			prop_assert_eq!(out, Departure::Ejected);
			prop_assert!(rec.membership(UserId(leaver)).is_none());
		}
	}
}
