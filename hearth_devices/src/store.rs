//! In-memory `DeviceStore`
//!
//! Reads and writes go through one `RwLock` around the tree, which makes each
//! address atomic. `when` subscriptions are edge-triggered: a callback fires
//! once each time its condition goes from unsatisfied to satisfied for an
//! address, and the state seen at subscription time counts as the baseline.
//! Callbacks run on the dispatcher, never on the writing thread.

use crate::dispatcher::Dispatcher;
use crate::scheduler::{Clock, Scheduler, SystemClock};
use crate::tree::DeviceTree;
use chrono::NaiveTime;
use hearth_dsl::config::runtime::DispatchPreferences;
use hearth_dsl::evaluation::value::Value;
use hearth_dsl::evaluation::{
    Condition, DeviceAddress, DeviceStore, Firing, FiringCause, PathPattern, RegistrationId,
    StoreError, TriggerCallback,
};
use hearth_dsl::logging::codes;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct Subscription {
    condition: Condition,
    callback: TriggerCallback,
    /// Addresses whose value currently satisfies the condition
    satisfied: HashSet<DeviceAddress>,
}

pub struct MemoryStore {
    tree: RwLock<DeviceTree>,
    subscriptions: Mutex<BTreeMap<RegistrationId, Subscription>>,
    scheduler: Scheduler,
    dispatcher: Arc<Dispatcher>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new(tree: DeviceTree) -> std::io::Result<Self> {
        Self::with_clock(tree, Arc::new(SystemClock), DispatchPreferences::default())
    }

    pub fn with_clock(
        tree: DeviceTree,
        clock: Arc<dyn Clock>,
        preferences: DispatchPreferences,
    ) -> std::io::Result<Self> {
        let dispatcher = Arc::new(Dispatcher::new(preferences)?);
        let scheduler = Scheduler::start(clock, Arc::clone(&dispatcher))?;

        Ok(Self {
            tree: RwLock::new(tree),
            subscriptions: Mutex::new(BTreeMap::new()),
            scheduler,
            dispatcher,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn device_count(&self) -> usize {
        self.read_tree().len()
    }

    pub fn subscription_count(&self) -> usize {
        self.lock_subscriptions().len()
    }

    /// A change that originates on the device side, e.g. a sensor report
    pub fn apply_external(&self, address: &DeviceAddress, value: Value) -> Result<(), StoreError> {
        hearth_dsl::log_info!("External device change",
            "address" => address,
            "value" => value
        );
        self.write(address, value)
    }

    fn read_tree(&self) -> RwLockReadGuard<'_, DeviceTree> {
        self.tree.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_tree(&self) -> RwLockWriteGuard<'_, DeviceTree> {
        self.tree.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, BTreeMap<RegistrationId, Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_registration(&self) -> RegistrationId {
        RegistrationId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Firings owed for `address` now holding `value`. Lock order is tree
    /// then subscriptions, so callers hold the tree lock.
    fn transitions(&self, address: &DeviceAddress, value: &Value) -> Vec<(Firing, TriggerCallback)> {
        let mut subscriptions = self.lock_subscriptions();
        let mut due = Vec::new();

        for (registration, subscription) in subscriptions.iter_mut() {
            if !subscription.condition.pattern.matches(address) {
                continue;
            }

            let now = subscription.condition.is_satisfied_by(value);
            let before = subscription.satisfied.contains(address);

            match (before, now) {
                (false, true) => {
                    subscription.satisfied.insert(address.clone());
                    due.push((
                        Firing {
                            registration: *registration,
                            cause: FiringCause::ConditionMet {
                                address: address.clone(),
                                value: value.clone(),
                            },
                        },
                        Arc::clone(&subscription.callback),
                    ));
                }
                (true, false) => {
                    subscription.satisfied.remove(address);
                }
                _ => {}
            }
        }

        due
    }
}

impl DeviceStore for MemoryStore {
    fn resolve(&self, pattern: &PathPattern) -> Result<Vec<DeviceAddress>, StoreError> {
        Ok(self.read_tree().resolve(pattern))
    }

    fn read(&self, address: &DeviceAddress) -> Result<Value, StoreError> {
        self.read_tree().read(address)
    }

    fn write(&self, address: &DeviceAddress, value: Value) -> Result<(), StoreError> {
        let due = {
            let mut tree = self.write_tree();
            tree.write(address, value.clone())?;
            self.transitions(address, &value)
        };

        for (firing, callback) in due {
            self.dispatcher.dispatch(firing, callback);
        }
        Ok(())
    }

    fn schedule_at(
        &self,
        time: NaiveTime,
        callback: TriggerCallback,
    ) -> Result<RegistrationId, StoreError> {
        let registration = self.next_registration();
        self.scheduler.schedule(registration, time, callback);

        hearth_dsl::log_debug!("Scheduled registration",
            "registration" => registration,
            "time" => time.format("%H:%M")
        );
        Ok(registration)
    }

    fn subscribe_when(
        &self,
        condition: Condition,
        callback: TriggerCallback,
    ) -> Result<RegistrationId, StoreError> {
        let tree = self.read_tree();

        let satisfied = tree
            .resolve(&condition.pattern)
            .into_iter()
            .filter(|address| {
                tree.read(address)
                    .map(|value| condition.is_satisfied_by(&value))
                    .unwrap_or(false)
            })
            .collect();

        let registration = self.next_registration();
        self.lock_subscriptions().insert(
            registration,
            Subscription {
                condition,
                callback,
                satisfied,
            },
        );
        Ok(registration)
    }

    fn cancel(&self, registration: RegistrationId) -> Result<(), StoreError> {
        if self.lock_subscriptions().remove(&registration).is_some() {
            return Ok(());
        }

        if self.scheduler.cancel(registration) {
            return Ok(());
        }

        hearth_dsl::log_warning!("Cancel for unknown registration",
            "registration" => registration,
            "code" => codes::runtime::REGISTRATION_FAILURE
        );
        Err(StoreError::Registration {
            reason: format!("no pending registration {}", registration),
        })
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.scheduler.shutdown();
        self.dispatcher.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualClock;
    use assert_matches::assert_matches;
    use hearth_dsl::grammar::ast::nodes::{ComparisonOperator, PathSegment};
    use std::time::Duration;

    fn address(text: &str) -> DeviceAddress {
        DeviceAddress::parse(text).unwrap()
    }

    fn store() -> MemoryStore {
        let tree = DeviceTree::from_toml_str(
            r#"
            [devices]
            "hall.temperature" = 20
            "hall.light" = "off"
            "room.a.light" = "off"
            "room.b.light" = "off"
            "#,
        )
        .unwrap();
        let clock = Arc::new(ManualClock::new(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        ));
        MemoryStore::with_clock(
            tree,
            clock,
            DispatchPreferences {
                worker_threads: 2,
                firing_timeout_ms: 1_000,
            },
        )
        .unwrap()
    }

    fn hot_condition() -> Condition {
        Condition {
            pattern: PathPattern::new(vec![
                PathSegment::Literal("hall".to_string()),
                PathSegment::Literal("temperature".to_string()),
            ]),
            operator: ComparisonOperator::Greater,
            value: Value::Number(25.0),
        }
    }

    fn recorder() -> (TriggerCallback, crossbeam_channel::Receiver<Firing>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let callback: TriggerCallback = Arc::new(move |firing: &Firing| {
            let _ = tx.send(firing.clone());
        });
        (callback, rx)
    }

    #[test]
    fn test_when_fires_once_per_transition() {
        let store = store();
        let (callback, fired) = recorder();
        store.subscribe_when(hot_condition(), callback).unwrap();

        let temperature = address("hall.temperature");
        store.write(&temperature, Value::Number(26.0)).unwrap();
        store.write(&temperature, Value::Number(27.0)).unwrap();

        let first = fired.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_matches!(
            first.cause,
            FiringCause::ConditionMet { value: Value::Number(n), .. } if n == 26.0
        );
        assert!(fired.recv_timeout(Duration::from_millis(100)).is_err());

        store.write(&temperature, Value::Number(20.0)).unwrap();
        store.apply_external(&temperature, Value::Number(30.0)).unwrap();
        assert!(fired.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn test_already_satisfied_condition_is_the_baseline() {
        let store = store();
        store
            .write(&address("hall.temperature"), Value::Number(28.0))
            .unwrap();

        let (callback, fired) = recorder();
        store.subscribe_when(hot_condition(), callback).unwrap();
        store
            .write(&address("hall.temperature"), Value::Number(29.0))
            .unwrap();
        assert!(fired.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_wildcard_subscription_tracks_each_address() {
        let store = store();
        let (callback, fired) = recorder();
        let condition = Condition {
            pattern: PathPattern::new(vec![
                PathSegment::Literal("room".to_string()),
                PathSegment::Wildcard,
                PathSegment::Literal("light".to_string()),
            ]),
            operator: ComparisonOperator::Equal,
            value: Value::word("on"),
        };
        store.subscribe_when(condition, callback).unwrap();

        store.write(&address("room.a.light"), Value::word("on")).unwrap();
        store.write(&address("room.b.light"), Value::word("on")).unwrap();

        let mut seen: Vec<String> = (0..2)
            .map(|_| match fired.recv_timeout(Duration::from_secs(2)).unwrap().cause {
                FiringCause::ConditionMet { address, .. } => address.to_string(),
                other => panic!("unexpected cause {:?}", other),
            })
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["room.a.light", "room.b.light"]);
    }

    #[test]
    fn test_cancel() {
        let store = store();
        let (callback, fired) = recorder();
        let id = store.subscribe_when(hot_condition(), callback).unwrap();
        store.cancel(id).unwrap();
        assert_eq!(store.subscription_count(), 0);

        store
            .write(&address("hall.temperature"), Value::Number(40.0))
            .unwrap();
        assert!(fired.recv_timeout(Duration::from_millis(100)).is_err());

        let (callback, _fired) = recorder();
        let scheduled = store
            .schedule_at(NaiveTime::from_hms_opt(13, 0, 0).unwrap(), callback)
            .unwrap();
        assert!(store.cancel(scheduled).is_ok());
        assert_matches!(store.cancel(scheduled), Err(StoreError::Registration { .. }));
    }

    #[test]
    fn test_fired_registration_is_retired() {
        let clock = Arc::new(ManualClock::new(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(6, 59, 0)
                .unwrap(),
        ));
        let store = MemoryStore::with_clock(
            DeviceTree::new(),
            clock.clone(),
            DispatchPreferences {
                worker_threads: 1,
                firing_timeout_ms: 1_000,
            },
        )
        .unwrap();

        let (callback, fired) = recorder();
        let id = store
            .schedule_at(NaiveTime::from_hms_opt(7, 0, 0).unwrap(), callback)
            .unwrap();
        assert!(store.scheduler().is_live(id));

        clock.advance(Duration::from_secs(120));
        store.scheduler().wake();
        assert_eq!(fired.recv_timeout(Duration::from_secs(2)).unwrap().registration, id);

        assert!(!store.scheduler().is_live(id));
        assert_eq!(store.scheduler().pending(), 0);
        assert_matches!(store.cancel(id), Err(StoreError::Registration { .. }));
    }

    #[test]
    fn test_failed_write_does_not_fire() {
        let store = store();
        let (callback, fired) = recorder();
        store.subscribe_when(hot_condition(), callback).unwrap();

        assert_matches!(
            store.write(&address("hall.temperature"), Value::word("hot")),
            Err(StoreError::TypeMismatch { .. })
        );
        assert!(fired.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
