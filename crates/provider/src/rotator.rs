//! Auth profile rotator: picks which credential profile backs the next LM
//! request, and drives each profile through a healthy/cooldown state
//! machine as requests succeed or fail.
//!
//! The cooldown math follows the same "struct config + calculation method"
//! shape as `retry::RetryConfig::delay_for_attempt`; selection and failure
//! handling are exposed as plain synchronous methods behind a single lock
//! so callers don't need to reason about interleaving.

use anvil_foundation::storage::JsonStore;
use anvil_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const STATE_FILE: &str = "auth_rotator.json";

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Strategy used to pick among the healthy set once stickiness doesn't apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStrategy {
    RoundRobin,
    Priority,
    Random,
}

/// A single credential profile under rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthProfile {
    pub id: String,
    pub is_oauth: bool,
    pub priority: i32,
    #[serde(default)]
    pub in_cooldown: bool,
    #[serde(default)]
    pub cooldown_until: Option<u64>,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub last_failure_was_billing: bool,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_failure_at: Option<u64>,
}

impl AuthProfile {
    pub fn new(id: impl Into<String>, priority: i32, is_oauth: bool) -> Self {
        Self {
            id: id.into(),
            is_oauth,
            priority,
            in_cooldown: false,
            cooldown_until: None,
            failure_count: 0,
            last_failure_was_billing: false,
            last_error: None,
            last_failure_at: None,
        }
    }

    fn is_healthy_at(&self, now: u64) -> bool {
        !self.in_cooldown || self.cooldown_until.map(|t| t <= now).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedCooldown {
    cooldown_until: u64,
    failure_count: u32,
    last_failure_was_billing: bool,
    last_error: Option<String>,
    last_failure_at: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    cooldowns: HashMap<String, PersistedCooldown>,
    saved_at: u64,
}

struct Inner {
    profiles: HashMap<String, AuthProfile>,
    order: Vec<String>,
    round_robin_index: usize,
    sticky_bindings: HashMap<String, String>,
}

/// Rotates across a fixed set of auth profiles, quarantining ones that fail
/// and recovering them once their cooldown elapses.
pub struct AuthRotator {
    inner: Mutex<Inner>,
    strategy: RotationStrategy,
    sticky: bool,
    base_cooldown_secs: u64,
    billing_cooldown_secs: u64,
    store: Option<JsonStore>,
}

impl AuthRotator {
    pub fn new(
        profiles: Vec<AuthProfile>,
        strategy: RotationStrategy,
        sticky: bool,
        base_cooldown_secs: u64,
        billing_cooldown_secs: u64,
    ) -> Self {
        let order: Vec<String> = profiles.iter().map(|p| p.id.clone()).collect();
        let profiles = profiles.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            inner: Mutex::new(Inner {
                profiles,
                order,
                round_robin_index: 0,
                sticky_bindings: HashMap::new(),
            }),
            strategy,
            sticky,
            base_cooldown_secs,
            billing_cooldown_secs,
            store: None,
        }
    }

    pub fn with_store(mut self, store: JsonStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Reload persisted cooldown state, rescheduling recovery (in practice:
    /// clearing cooldowns whose window has already elapsed, leaving the
    /// remainder in place for the next `get_next_profile` to observe).
    pub fn reload(&self) -> Result<()> {
        let Some(store) = &self.store else { return Ok(()) };
        let Some(state) = store.load_optional::<PersistedState>(STATE_FILE)? else {
            return Ok(());
        };
        let now = now_secs();
        let mut inner = self.inner.lock().unwrap();
        for (id, cooldown) in state.cooldowns {
            if let Some(profile) = inner.profiles.get_mut(&id) {
                profile.failure_count = cooldown.failure_count;
                profile.last_failure_was_billing = cooldown.last_failure_was_billing;
                profile.last_error = cooldown.last_error;
                profile.last_failure_at = cooldown.last_failure_at;
                if cooldown.cooldown_until > now {
                    profile.in_cooldown = true;
                    profile.cooldown_until = Some(cooldown.cooldown_until);
                    info!(profile = %id, remaining_secs = cooldown.cooldown_until - now, "reloaded profile still in cooldown");
                } else {
                    profile.in_cooldown = false;
                    profile.cooldown_until = None;
                }
            }
        }
        Ok(())
    }

    fn persist(&self, inner: &Inner) {
        let Some(store) = &self.store else { return };
        let cooldowns = inner
            .profiles
            .values()
            .filter(|p| p.in_cooldown)
            .map(|p| {
                (
                    p.id.clone(),
                    PersistedCooldown {
                        cooldown_until: p.cooldown_until.unwrap_or(0),
                        failure_count: p.failure_count,
                        last_failure_was_billing: p.last_failure_was_billing,
                        last_error: p.last_error.clone(),
                        last_failure_at: p.last_failure_at,
                    },
                )
            })
            .collect();
        let state = PersistedState {
            cooldowns,
            saved_at: now_secs(),
        };
        if let Err(e) = store.save_atomic(STATE_FILE, &state) {
            warn!("failed to persist auth rotator state: {}", e);
        }
    }

    /// Cooldown for a non-billing failure: `base × 5^(k-1)`, capped at 1 hour.
    pub fn non_billing_cooldown(&self, failure_count: u32) -> u64 {
        let raw = self.base_cooldown_secs as f64 * 5f64.powi(failure_count as i32 - 1);
        raw.min(3600.0) as u64
    }

    /// Cooldown for a billing failure: `billing_base × 2^(k-1)`, capped at 24 hours.
    pub fn billing_cooldown(&self, failure_count: u32) -> u64 {
        let raw = self.billing_cooldown_secs as f64 * 2f64.powi(failure_count as i32 - 1);
        raw.min(86400.0) as u64
    }

    /// Pick the next profile to use, honouring session stickiness and the
    /// configured rotation strategy over the currently-healthy set.
    #[tracing::instrument(skip(self))]
    pub fn get_next_profile(&self, session_id: Option<&str>) -> Result<String> {
        let now = now_secs();
        let mut inner = self.inner.lock().unwrap();

        // Transition any expired cooldowns back to healthy before computing
        // the healthy set.
        let order = inner.order.clone();
        for id in &order {
            if let Some(profile) = inner.profiles.get_mut(id) {
                if profile.in_cooldown && profile.is_healthy_at(now) {
                    profile.in_cooldown = false;
                    profile.cooldown_until = None;
                    debug!(profile = %id, "cooldown expired, back to healthy");
                }
            }
        }

        if self.sticky {
            if let Some(sid) = session_id {
                if let Some(bound) = inner.sticky_bindings.get(sid).cloned() {
                    if inner
                        .profiles
                        .get(&bound)
                        .map(|p| p.is_healthy_at(now))
                        .unwrap_or(false)
                    {
                        return Ok(bound);
                    }
                }
            }
        }

        let mut healthy: Vec<AuthProfile> = inner
            .profiles
            .values()
            .filter(|p| p.is_healthy_at(now))
            .cloned()
            .collect();
        healthy.sort_by(|a, b| {
            b.is_oauth
                .cmp(&a.is_oauth)
                .then(b.priority.cmp(&a.priority))
        });

        if healthy.is_empty() {
            return Err(Error::AuthFailure {
                profile: "*".to_string(),
                message: "no healthy auth profiles available".to_string(),
            });
        }

        let chosen = match self.strategy {
            RotationStrategy::Priority => healthy[0].id.clone(),
            RotationStrategy::Random => {
                let idx = (pseudo_random_u64() as usize) % healthy.len();
                healthy[idx].id.clone()
            }
            RotationStrategy::RoundRobin => {
                let idx = inner.round_robin_index % healthy.len();
                inner.round_robin_index = (idx + 1) % healthy.len().max(1);
                healthy[idx].id.clone()
            }
        };

        if self.sticky {
            if let Some(sid) = session_id {
                inner.sticky_bindings.insert(sid.to_string(), chosen.clone());
            }
        }

        Ok(chosen)
    }

    /// Record a failure for `profile_id`, entering (or extending) cooldown.
    #[tracing::instrument(skip(self, error))]
    pub fn mark_failed(&self, profile_id: &str, error: impl Into<String>, is_billing: bool) -> Result<()> {
        let error = error.into();
        let now = now_secs();
        let mut inner = self.inner.lock().unwrap();
        let profile = inner
            .profiles
            .get_mut(profile_id)
            .ok_or_else(|| Error::AuthFailure {
                profile: profile_id.to_string(),
                message: "unknown profile".to_string(),
            })?;

        profile.failure_count += 1;
        profile.last_error = Some(error);
        profile.last_failure_was_billing = is_billing;
        profile.last_failure_at = Some(now);

        let cooldown = if is_billing {
            self.billing_cooldown(profile.failure_count)
        } else {
            self.non_billing_cooldown(profile.failure_count)
        };
        profile.in_cooldown = true;
        profile.cooldown_until = Some(now + cooldown);

        warn!(
            profile = %profile_id,
            failure_count = profile.failure_count,
            cooldown_secs = cooldown,
            billing = is_billing,
            "auth profile entered cooldown"
        );

        self.persist(&inner);
        Ok(())
    }

    /// Reset a profile to fully healthy after a successful request.
    pub fn mark_success(&self, profile_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let profile = inner
            .profiles
            .get_mut(profile_id)
            .ok_or_else(|| Error::AuthFailure {
                profile: profile_id.to_string(),
                message: "unknown profile".to_string(),
            })?;
        profile.failure_count = 0;
        profile.in_cooldown = false;
        profile.cooldown_until = None;
        profile.last_error = None;
        profile.last_failure_was_billing = false;
        self.persist(&inner);
        Ok(())
    }

    pub fn profile(&self, id: &str) -> Option<AuthProfile> {
        self.inner.lock().unwrap().profiles.get(id).cloned()
    }
}

fn pseudo_random_u64() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotator(strategy: RotationStrategy, sticky: bool) -> AuthRotator {
        AuthRotator::new(
            vec![
                AuthProfile::new("p1", 10, false),
                AuthProfile::new("p2", 5, false),
            ],
            strategy,
            sticky,
            60,
            300,
        )
    }

    #[test]
    fn non_billing_cooldown_escalates_and_caps() {
        let r = rotator(RotationStrategy::Priority, false);
        assert_eq!(r.non_billing_cooldown(1), 60);
        assert_eq!(r.non_billing_cooldown(2), 300);
        assert_eq!(r.non_billing_cooldown(3), 1500);
        assert_eq!(r.non_billing_cooldown(5), 3600); // capped
    }

    #[test]
    fn billing_cooldown_escalates_and_caps() {
        let r = rotator(RotationStrategy::Priority, false);
        assert_eq!(r.billing_cooldown(1), 300);
        assert_eq!(r.billing_cooldown(2), 600);
        assert_eq!(r.billing_cooldown(10), 86400); // capped
    }

    #[test]
    fn priority_strategy_prefers_higher_priority() {
        let r = rotator(RotationStrategy::Priority, false);
        assert_eq!(r.get_next_profile(None).unwrap(), "p1");
    }

    #[test]
    fn rotator_escalation_scenario() {
        // S4 from the testable-properties scenarios.
        let r = rotator(RotationStrategy::Priority, false);
        r.mark_failed("p1", "rate_limit", false).unwrap();
        assert_eq!(r.get_next_profile(None).unwrap(), "p2");

        r.mark_failed("p1", "rate_limit", false).unwrap();
        r.mark_failed("p1", "rate_limit", false).unwrap();
        let p1 = r.profile("p1").unwrap();
        assert_eq!(p1.failure_count, 3);
        assert_eq!(p1.cooldown_until.unwrap() - now_secs() <= 1500, true);

        r.mark_success("p1").unwrap();
        r.mark_failed("p1", "rate_limit", false).unwrap();
        let p1 = r.profile("p1").unwrap();
        assert_eq!(p1.failure_count, 1);
    }

    #[test]
    fn never_returns_a_profile_still_in_cooldown() {
        let r = rotator(RotationStrategy::RoundRobin, false);
        r.mark_failed("p1", "x", false).unwrap();
        r.mark_failed("p2", "y", false).unwrap();
        assert!(r.get_next_profile(None).is_err());
    }

    #[test]
    fn sticky_session_keeps_same_profile() {
        let r = rotator(RotationStrategy::RoundRobin, true);
        let first = r.get_next_profile(Some("s1")).unwrap();
        for _ in 0..5 {
            assert_eq!(r.get_next_profile(Some("s1")).unwrap(), first);
        }
    }

    #[test]
    fn sticky_session_rebinds_when_bound_profile_unhealthy() {
        let r = rotator(RotationStrategy::Priority, true);
        let first = r.get_next_profile(Some("s1")).unwrap();
        assert_eq!(first, "p1");
        r.mark_failed("p1", "down", false).unwrap();
        assert_eq!(r.get_next_profile(Some("s1")).unwrap(), "p2");
    }

    #[test]
    fn round_robin_cycles_through_healthy_set() {
        let r = rotator(RotationStrategy::RoundRobin, false);
        let a = r.get_next_profile(None).unwrap();
        let b = r.get_next_profile(None).unwrap();
        assert_ne!(a, b);
        let c = r.get_next_profile(None).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn reload_restores_cooldown_from_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = anvil_foundation::storage::JsonStore::new(dir.path());
        {
            let r = rotator(RotationStrategy::Priority, false).with_store(store.clone());
            r.mark_failed("p1", "x", false).unwrap();
        }
        let r2 = rotator(RotationStrategy::Priority, false).with_store(store);
        r2.reload().unwrap();
        assert_eq!(r2.get_next_profile(None).unwrap(), "p2");
    }
}
