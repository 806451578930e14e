mod aggregation;

pub use aggregation::*;

use chrono::{DateTime, FixedOffset, Utc};

/// Source of "now" for new transactions, in the ledger's configured offset
#[derive(Debug, Clone, Copy)]
pub struct LedgerClock {
    offset: FixedOffset,
}

impl LedgerClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_carries_configured_offset() {
        let clock = LedgerClock::new(FixedOffset::east_opt(7 * 3600).unwrap());
        assert_eq!(clock.now().offset().local_minus_utc(), 7 * 3600);

        let utc = LedgerClock::new(FixedOffset::east_opt(0).unwrap());
        assert!((utc.now() - clock.now()).num_seconds().abs() < 5);
    }
}
