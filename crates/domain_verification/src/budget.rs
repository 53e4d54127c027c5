//! Daily call budget for the costly provider tier
//!
//! One budget instance is shared by every pipeline in the process. The
//! counter resets when the local calendar day in the configured timezone
//! changes.

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use core_kernel::Timezone;

#[derive(Debug)]
struct Usage {
    day: NaiveDate,
    used: u32,
}

/// Per-day call counter, read and incremented atomically
#[derive(Debug)]
pub struct DailyCallBudget {
    limit: u32,
    timezone: Timezone,
    usage: Mutex<Usage>,
}

impl DailyCallBudget {
    pub fn new(limit: u32, timezone: Timezone) -> Self {
        Self {
            limit,
            usage: Mutex::new(Usage {
                day: timezone.today(),
                used: 0,
            }),
            timezone,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Consumes one call if any remain today
    pub async fn try_acquire(&self) -> bool {
        self.try_acquire_at(Utc::now()).await
    }

    /// Consumes one call as of `now`
    pub async fn try_acquire_at(&self, now: DateTime<Utc>) -> bool {
        let today = self.timezone.local_date(now);
        let mut usage = self.usage.lock().await;
        if usage.day != today {
            info!(previous = %usage.day, used = usage.used, "Resetting daily call budget");
            usage.day = today;
            usage.used = 0;
        }
        if usage.used >= self.limit {
            debug!(limit = self.limit, "Daily call budget exhausted");
            return false;
        }
        usage.used += 1;
        true
    }

    /// Calls left for the local day containing `now`
    pub async fn remaining_at(&self, now: DateTime<Utc>) -> u32 {
        let today = self.timezone.local_date(now);
        let usage = self.usage.lock().await;
        if usage.day != today {
            return self.limit;
        }
        self.limit.saturating_sub(usage.used)
    }

    pub async fn remaining(&self) -> u32 {
        self.remaining_at(Utc::now()).await
    }
}
