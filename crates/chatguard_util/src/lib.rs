#![forbid(unsafe_code)]

pub mod time {
	use std::time::{Duration, SystemTime, UNIX_EPOCH};

	/// Current Unix time in milliseconds.
	#[inline]
	pub fn unix_ms_now() -> i64 {
		unix_ms(SystemTime::now())
	}

	/// Unix time in milliseconds for an arbitrary instant (pre-epoch clamps to 0).
	#[inline]
	pub fn unix_ms(t: SystemTime) -> i64 {
		t.duration_since(UNIX_EPOCH).unwrap_or(Duration::from_secs(0)).as_millis() as i64
	}

	/// Duration as signed milliseconds, saturating at `i64::MAX`.
	#[inline]
	pub fn duration_ms(d: Duration) -> i64 {
		i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		#[test]
		fn epoch_is_zero() {
			assert_eq!(unix_ms(UNIX_EPOCH), 0);
			assert_eq!(unix_ms(UNIX_EPOCH + Duration::from_millis(1500)), 1500);
		}

		#[test]
		fn duration_ms_saturates() {
			assert_eq!(duration_ms(Duration::from_secs(2)), 2000);
			assert_eq!(duration_ms(Duration::MAX), i64::MAX);
		}
	}
}

pub mod ids {
	use std::str::FromStr;

	/// Parse a comma separated id list such as `"-1001,-1002"`.
	///
	/// Blank, zero and unparsable entries are skipped; the returned error list
	/// names the entries that were rejected so callers can log them.
	pub fn parse_id_list<T: FromStr>(s: &str) -> (Vec<T>, Vec<String>) {
		let mut ids = Vec::new();
		let mut rejected = Vec::new();

		for part in s.split(',') {
			let part = part.trim();
			if part.is_empty() {
				continue;
			}
			if part.parse::<i64>().ok() == Some(0) {
				rejected.push(part.to_string());
				continue;
			}
			match part.parse::<T>() {
				Ok(id) => ids.push(id),
				Err(_) => rejected.push(part.to_string()),
			}
		}

		(ids, rejected)
	}

}

pub mod duration {
	use std::time::Duration;

	/// Parse a human duration: `250ms`, `30s`, `15m`, `6h`, `1d`, or bare milliseconds.
	pub fn parse_duration(s: &str) -> Result<Duration, String> {
		let s = s.trim();
		if s.is_empty() {
			return Err("duration must be non-empty (e.g. 6h, 30m, 3600s)".to_string());
		}

		let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
		let (num, unit) = s.split_at(split);

		let n: u64 = num
			.parse()
			.map_err(|_| format!("invalid duration (expected <number><unit>): {s}"))?;

		let per_unit_ms: u64 = match unit.trim().to_ascii_lowercase().as_str() {
			"" | "ms" => 1,
			"s" | "sec" | "secs" => 1_000,
			"m" | "min" | "mins" => 60_000,
			"h" | "hr" | "hrs" => 3_600_000,
			"d" | "day" | "days" => 86_400_000,
			other => return Err(format!("invalid duration unit {other:?} in {s}")),
		};

		n.checked_mul(per_unit_ms)
			.map(Duration::from_millis)
			.ok_or_else(|| format!("duration overflows: {s}"))
	}

}
