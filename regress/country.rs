//! Country bucketing of tract identifiers.
//!
//! The combined multi-country tables carry tract codes from disjoint numeric
//! bands; predicted-vs-actual rows are tagged with the band they fall in so
//! the exported tables can be filtered per country.

use std::ops::RangeInclusive;

pub const SRI_LANKA: RangeInclusive<i64> = 9_000_000..=9_233_130;
pub const BELIZE: RangeInclusive<i64> = 700_000..=799_999;
pub const GHANA: RangeInclusive<i64> = 3_000_000..=3_999_999;

/// Maps a tract identifier to its country label, or "Other" when it falls
/// outside every known band.
pub fn country_bucket(tract_id: i64) -> &'static str {
    if SRI_LANKA.contains(&tract_id) {
        "Sri Lanka"
    } else if BELIZE.contains(&tract_id) {
        "Belize"
    } else if GHANA.contains(&tract_id) {
        "Ghana"
    } else {
        "Other"
    }
}
