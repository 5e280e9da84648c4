//! # Transitions
//!
//! Pure state changes for tracked events. Callers load a record, apply one of these
//! with the current time, then persist the result.
use chrono::{DateTime, Utc};

use crate::record::AcknowledgmentRecord;

pub fn percentage_for(has_viewed: bool, has_downloaded: bool) -> u8 {
    match (has_viewed, has_downloaded) {
        (true, true) => 100,
        (false, false) => 0,
        _ => 50,
    }
}

pub fn apply_view(mut record: AcknowledgmentRecord, now: DateTime<Utc>) -> AcknowledgmentRecord {
    if record.has_viewed {
        record.view_count += 1;
    } else {
        record.first_viewed_at = Some(now);
        record.view_count = 1;
        record.set_flags(true, record.has_downloaded);
    }

    record.last_viewed_at = Some(now);
    record
}

/// A download with no prior view also credits the view.
pub fn apply_download(
    mut record: AcknowledgmentRecord,
    now: DateTime<Utc>,
) -> AcknowledgmentRecord {
    if record.has_downloaded {
        record.download_count += 1;
        return record;
    }

    record.downloaded_at = Some(now);
    record.download_count = 1;

    if !record.has_viewed {
        record.first_viewed_at = Some(now);
        record.last_viewed_at = Some(now);
        record.view_count = 1;
    }

    record.set_flags(true, true);
    record
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::record::{AcknowledgmentState, ClientInfo, RecordKey};

    fn fresh(now: DateTime<Utc>) -> AcknowledgmentRecord {
        AcknowledgmentRecord::new(RecordKey::new("policy", "user"), ClientInfo::default(), now)
    }

    #[test]
    fn test_percentage_table() {
        assert_eq!(percentage_for(false, false), 0);
        assert_eq!(percentage_for(true, false), 50);
        assert_eq!(percentage_for(false, true), 50);
        assert_eq!(percentage_for(true, true), 100);
    }

    #[test]
    fn test_first_view() {
        let now = Utc::now();
        let record = apply_view(fresh(now), now);

        assert!(record.has_viewed());
        assert!(!record.has_downloaded());
        assert_eq!(record.view_count, 1);
        assert_eq!(record.percentage(), 50);
        assert_eq!(record.first_viewed_at, Some(now));
        assert_eq!(record.last_viewed_at, Some(now));
    }

    #[test]
    fn test_repeated_views() {
        let start = Utc::now();
        let later = start + Duration::minutes(5);

        let record = apply_view(fresh(start), start);
        let record = apply_view(record, later);
        let record = apply_view(record, later);

        assert_eq!(record.view_count, 3);
        assert_eq!(record.percentage(), 50);
        assert!(record.has_viewed());
        assert_eq!(record.first_viewed_at, Some(start));
        assert_eq!(record.last_viewed_at, Some(later));
    }

    #[test]
    fn test_download_implies_view() {
        let now = Utc::now();
        let record = apply_download(fresh(now), now);

        assert!(record.has_viewed());
        assert!(record.has_downloaded());
        assert_eq!(record.percentage(), 100);
        assert_eq!(record.view_count, 1);
        assert_eq!(record.download_count, 1);
        assert_eq!(record.first_viewed_at, Some(now));
        assert_eq!(record.last_viewed_at, Some(now));
        assert_eq!(record.downloaded_at, Some(now));
    }

    #[test]
    fn test_view_then_download() {
        let start = Utc::now();
        let later = start + Duration::hours(1);

        let record = apply_view(fresh(start), start);
        let record = apply_download(record, later);

        assert!(record.has_viewed());
        assert!(record.has_downloaded());
        assert_eq!(record.percentage(), 100);
        assert_eq!(record.download_count, 1);
        assert_eq!(record.view_count, 1);
        assert_eq!(record.first_viewed_at, Some(start));
        assert_eq!(record.downloaded_at, Some(later));
    }

    #[test]
    fn test_order_independence() {
        let now = Utc::now();

        let a = apply_download(apply_view(fresh(now), now), now);
        let b = apply_view(apply_download(fresh(now), now), now);

        assert_eq!(a.percentage(), b.percentage());
        assert_eq!(a.has_viewed(), b.has_viewed());
        assert_eq!(a.has_downloaded(), b.has_downloaded());
        assert_eq!(a.state(), AcknowledgmentState::Complete);
    }

    #[test]
    fn test_repeated_downloads() {
        let now = Utc::now();

        let record = apply_download(fresh(now), now);
        let record = apply_download(record, now + Duration::seconds(1));

        assert_eq!(record.download_count, 2);
        assert_eq!(record.view_count, 1);
        assert_eq!(record.percentage(), 100);
        assert_eq!(record.downloaded_at, Some(now));
    }

    #[test]
    fn test_percentage_follows_flags_for_any_sequence() {
        let now = Utc::now();

        // Every sequence of up to four events, encoded as bits: 1 = download, 0 = view.
        for length in 0..=4u32 {
            for bits in 0..(1u32 << length) {
                let mut record = fresh(now);
                for step in 0..length {
                    record = if (bits >> step) & 1 == 1 {
                        apply_download(record, now)
                    } else {
                        apply_view(record, now)
                    };
                }

                assert_eq!(
                    record.percentage(),
                    percentage_for(record.has_viewed(), record.has_downloaded()),
                    "length {length}, bits {bits:b}"
                );
            }
        }
    }

    #[test]
    fn test_manual_acknowledgment_untouched() {
        let now = Utc::now();
        let record = apply_view(apply_download(fresh(now), now), now);

        assert!(!record.manually_acknowledged);
        assert_eq!(record.acknowledged_at, None);
    }
}
