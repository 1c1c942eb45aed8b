//! The status mapper: the single seam between the remote payment lifecycle and the UI status vocabulary.

use crate::order_types::{ClientStatus, LifecycleStatus};

/// Map the remote service's fine-grained payment lifecycle onto the coarse client-facing status.
///
/// Pure and total: every input, including an absent status, yields exactly one [`ClientStatus`]. No other code path
/// may produce a client status.
pub fn map_status(lifecycle: Option<LifecycleStatus>) -> ClientStatus {
    match lifecycle {
        Some(LifecycleStatus::Confirmed) => ClientStatus::Delivered,
        Some(LifecycleStatus::Declared) => ClientStatus::Preparing,
        Some(LifecycleStatus::Processing) => ClientStatus::Processing,
        Some(LifecycleStatus::Rejected) => ClientStatus::Rejected,
        Some(LifecycleStatus::Pending) | None => ClientStatus::Pending,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mapping_is_total() {
        let all = [
            LifecycleStatus::Pending,
            LifecycleStatus::Declared,
            LifecycleStatus::Processing,
            LifecycleStatus::Confirmed,
            LifecycleStatus::Rejected,
        ];
        for status in all {
            // Every input maps, and maps the same way twice.
            assert_eq!(map_status(Some(status)), map_status(Some(status)));
        }
        assert_eq!(map_status(None), ClientStatus::Pending);
    }

    #[test]
    fn mapping_table() {
        assert_eq!(map_status(Some(LifecycleStatus::Confirmed)), ClientStatus::Delivered);
        assert_eq!(map_status(Some(LifecycleStatus::Declared)), ClientStatus::Preparing);
        assert_eq!(map_status(Some(LifecycleStatus::Processing)), ClientStatus::Processing);
        assert_eq!(map_status(Some(LifecycleStatus::Rejected)), ClientStatus::Rejected);
        assert_eq!(map_status(Some(LifecycleStatus::Pending)), ClientStatus::Pending);
    }
}
