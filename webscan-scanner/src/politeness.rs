use crate::scope::origin_key;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

/// Minimum spacing between successive fetches to the same origin.
///
/// Each caller reserves the next free slot for its origin under the lock and then sleeps
/// outside it, so workers queued on one origin are spaced `delay` apart while other
/// origins are not held up.
pub struct PolitenessLimiter {
    delay: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl PolitenessLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    pub async fn wait(&self, url: &Url) {
        if self.delay.is_zero() {
            return;
        }

        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match next_slot.get(&origin_key(url)) {
                Some(reserved) if *reserved > now => *reserved,
                _ => now,
            };
            next_slot.insert(origin_key(url), slot + self.delay);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}
