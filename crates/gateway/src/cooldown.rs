use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::debug;

use rostergate_core::domain::verification::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CooldownDecision {
    Proceed,
    Wait { remaining_secs: u64 },
}

/// Longest window a gate will hold a key for.
pub const MAX_WINDOW: Duration = Duration::from_secs(60 * 60);

type Expiries = Arc<Mutex<HashMap<String, Instant>>>;

/// Per `(command, member)` rate limit with one expiry instant per key.
#[derive(Clone)]
pub struct CooldownGate {
    window: Duration,
    expiries: Expiries,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self { window: window.min(MAX_WINDOW), expiries: Arc::default() }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Starts a fresh cooldown unless one is still running for this key.
    pub fn check(&self, command: &str, user_id: &UserId) -> CooldownDecision {
        let key = format!("{command}-{user_id}");
        let now = Instant::now();

        let mut expiries = lock(&self.expiries);
        if let Some(expires_at) = expiries.get(&key).copied() {
            if now < expires_at {
                return CooldownDecision::Wait { remaining_secs: ceil_secs(expires_at - now) };
            }
        }

        let expires_at = now + self.window;
        expiries.insert(key.clone(), expires_at);
        drop(expiries);

        self.schedule_removal(key, expires_at);
        CooldownDecision::Proceed
    }

    pub fn tracked_keys(&self) -> usize {
        lock(&self.expiries).len()
    }

    fn schedule_removal(&self, key: String, expires_at: Instant) {
        let Ok(handle) = Handle::try_current() else {
            return;
        };

        let expiries = self.expiries.clone();
        handle.spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            let mut expiries = lock(&expiries);
            if expiries.get(&key) == Some(&expires_at) {
                expiries.remove(&key);
                debug!(event_name = "gateway.cooldown.expired", cooldown_key = %key);
            }
        });
    }
}

fn lock(expiries: &Expiries) -> MutexGuard<'_, HashMap<String, Instant>> {
    match expiries.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn ceil_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
