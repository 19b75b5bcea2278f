//! Standing `at` and `when` registrations
//!
//! A trigger owns a copy of its body and of the bindings visible when it was
//! registered. It holds the store weakly: the store owns the callback, and
//! the callback owns the trigger.
//!
//! Firings of one trigger never overlap. Stores may deliver a firing more
//! than once; a body only writes values it computes from its own literals
//! and bindings, so repeating it leaves the same state.

use super::error::{RuntimeError, RuntimeResult};
use super::evaluator::Execution;
use super::result::EvalResult;
use super::scope::Scope;
use super::store::{DeviceStore, Firing, FiringCause, StoreError, TriggerCallback};
use crate::config::runtime::EvaluationPreferences;
use crate::grammar::ast::nodes::BlockNode;
use crate::logging::codes;
use crate::utils::Position;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

pub struct Trigger {
    keyword: &'static str,
    position: Position,
    body: BlockNode,
    bindings: Scope,
    store: Weak<dyn DeviceStore>,
    preferences: EvaluationPreferences,
    firing: Mutex<()>,
    firings: AtomicU64,
}

impl Trigger {
    pub fn new(
        keyword: &'static str,
        position: Position,
        body: BlockNode,
        bindings: Scope,
        store: &Arc<dyn DeviceStore>,
        preferences: EvaluationPreferences,
    ) -> Arc<Self> {
        Arc::new(Self {
            keyword,
            position,
            body,
            bindings,
            store: Arc::downgrade(store),
            preferences,
            firing: Mutex::new(()),
            firings: AtomicU64::new(0),
        })
    }

    pub fn keyword(&self) -> &'static str {
        self.keyword
    }

    /// Completed or in-progress firings so far
    pub fn firings(&self) -> u64 {
        self.firings.load(Ordering::SeqCst)
    }

    /// Evaluate the body once, waiting for any firing already running
    pub fn fire(&self, firing: &Firing) -> RuntimeResult<EvalResult> {
        let _serial = self
            .firing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let store = self.store.upgrade().ok_or_else(|| RuntimeError::Store {
            position: self.position,
            source: StoreError::Unavailable {
                reason: "device store was dropped".to_string(),
            },
        })?;

        self.firings.fetch_add(1, Ordering::SeqCst);

        if self.preferences.trace_statements {
            crate::log_debug!("Trigger firing",
                "keyword" => self.keyword,
                "registration" => firing.registration,
                "cause" => describe_cause(&firing.cause)
            );
        }

        let mut scope = self.bindings.clone();
        Execution::new(store, &self.preferences, &mut scope).block(&self.body)
    }

    /// Callback for the store. Failures are logged; there is no caller to
    /// return them to.
    pub fn callback(self: &Arc<Self>) -> TriggerCallback {
        let trigger = Arc::clone(self);
        Arc::new(move |firing: &Firing| trigger.handle(firing))
    }

    fn handle(&self, firing: &Firing) {
        match self.fire(firing) {
            Ok(_) => {
                crate::log_success!(
                    codes::success::TRIGGER_FIRED,
                    "Trigger fired",
                    "keyword" => self.keyword,
                    "registration" => firing.registration,
                    "cause" => describe_cause(&firing.cause)
                );
            }
            Err(error) => {
                crate::log_error!(
                    codes::dispatch::FIRING_FAILED,
                    "Trigger body failed",
                    position = error.position(),
                    "keyword" => self.keyword,
                    "registration" => firing.registration,
                    "code" => error.error_code(),
                    "error" => error
                );
            }
        }
    }
}

fn describe_cause(cause: &FiringCause) -> String {
    match cause {
        FiringCause::Scheduled { at } => format!("scheduled at {}", at.format("%H:%M")),
        FiringCause::ConditionMet { address, value } => format!("{} became {}", address, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::store::{DeviceAddress, RegistrationId};
    use crate::evaluation::testing::MockStore;
    use crate::evaluation::value::Value;
    use crate::lexical::scan;
    use crate::syntax::parse;
    use crate::grammar::ast::nodes::Statement;
    use assert_matches::assert_matches;
    use std::thread;
    use std::time::Duration;

    fn body_of(source: &str) -> BlockNode {
        let program = parse(scan(source)).unwrap();
        match program.statements.into_iter().next() {
            Some(Statement::When(when)) => when.body,
            Some(Statement::At(at)) => at.body,
            other => panic!("expected a trigger statement, got {:?}", other),
        }
    }

    fn scheduled() -> Firing {
        Firing {
            registration: RegistrationId(1),
            cause: FiringCause::Scheduled {
                at: chrono::NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            },
        }
    }

    #[test]
    fn test_fire_uses_snapshot_bindings() {
        let mock = MockStore::with_devices(&[("porch.light", Value::word("off"))]);
        let store: Arc<dyn DeviceStore> = mock.clone();

        let mut bindings = Scope::new();
        bindings.bind("state", Value::word("on"));

        let trigger = Trigger::new(
            "at",
            Position::start(),
            body_of("at 7:00 set porch.light $state"),
            bindings,
            &store,
            EvaluationPreferences::default(),
        );

        trigger.fire(&scheduled()).unwrap();
        assert_eq!(
            mock.value_of("porch.light"),
            Some(Value::word("on"))
        );
        assert_eq!(trigger.firings(), 1);
    }

    #[test]
    fn test_fire_after_store_dropped() {
        let store: Arc<dyn DeviceStore> = MockStore::with_devices(&[]);
        let trigger = Trigger::new(
            "at",
            Position::start(),
            body_of("at 7:00 get a.b"),
            Scope::new(),
            &store,
            EvaluationPreferences::default(),
        );
        drop(store);

        assert_matches!(
            trigger.fire(&scheduled()),
            Err(RuntimeError::Store { source: StoreError::Unavailable { .. }, .. })
        );
        assert_eq!(trigger.firings(), 0);
    }

    #[test]
    fn test_firings_of_one_trigger_never_overlap() {
        let mock = MockStore::with_devices(&[("hall.light", Value::word("off"))]);
        mock.set_write_delay(Duration::from_millis(20));
        let store: Arc<dyn DeviceStore> = mock.clone();

        let trigger = Trigger::new(
            "when",
            Position::start(),
            body_of("when hall.light == off { set hall.light on; set hall.light off }"),
            Scope::new(),
            &store,
            EvaluationPreferences::default(),
        );

        let firing = Firing {
            registration: RegistrationId(7),
            cause: FiringCause::ConditionMet {
                address: DeviceAddress::parse("hall.light").unwrap(),
                value: Value::word("off"),
            },
        };

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let trigger = Arc::clone(&trigger);
                let firing = firing.clone();
                thread::spawn(move || trigger.fire(&firing).is_ok())
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(trigger.firings(), 4);
        assert_eq!(mock.max_concurrent_writes(), 1);
    }

    #[test]
    fn test_callback_logs_failures() {
        let logs = crate::logging::capture_global_logging();
        let store: Arc<dyn DeviceStore> = MockStore::with_devices(&[]);
        let trigger = Trigger::new(
            "at",
            Position::start(),
            body_of("at 7:00 set garage.door closed"),
            Scope::new(),
            &store,
            EvaluationPreferences::default(),
        );

        let callback = trigger.callback();
        callback(&Firing {
            registration: RegistrationId(4242),
            cause: FiringCause::Scheduled {
                at: chrono::NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            },
        });

        assert!(logs
            .get_events_with_code(codes::dispatch::FIRING_FAILED)
            .iter()
            .any(|event| event.context.get("registration").map(String::as_str) == Some("#4242")));
    }
}
