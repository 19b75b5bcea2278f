//! Tree-walking evaluator
//!
//! Walks a parsed tree against a `DeviceStore`. The evaluator holds no locks
//! of its own; per-address consistency is the store's job. `at` and `when`
//! only register a `Trigger` and return as soon as the store accepts it.

use super::error::{RuntimeError, RuntimeResult};
use super::result::{EvalResult, Reading};
use super::scope::Scope;
use super::store::{Condition, DeviceAddress, DeviceStore, PathPattern, StoreError};
use super::trigger::Trigger;
use super::value::Value;
use crate::config::runtime::EvaluationPreferences;
use crate::grammar::ast::nodes::*;
use crate::logging::codes;
use crate::utils::Position;
use std::sync::Arc;

pub struct Evaluator {
    store: Arc<dyn DeviceStore>,
    preferences: EvaluationPreferences,
}

impl Evaluator {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self::with_preferences(store, EvaluationPreferences::default())
    }

    pub fn with_preferences(store: Arc<dyn DeviceStore>, preferences: EvaluationPreferences) -> Self {
        Self { store, preferences }
    }

    pub fn store(&self) -> &Arc<dyn DeviceStore> {
        &self.store
    }

    pub fn preferences(&self) -> &EvaluationPreferences {
        &self.preferences
    }

    /// Evaluate any node with a fresh scope
    pub fn evaluate(&self, node: &Node) -> RuntimeResult<EvalResult> {
        let mut scope = Scope::new();
        self.evaluate_with_scope(node, &mut scope)
    }

    pub fn evaluate_program(&self, program: &ProgramNode) -> RuntimeResult<EvalResult> {
        let mut scope = Scope::new();
        self.program_with_scope(program, &mut scope)
    }

    /// Evaluate against caller-owned bindings, so `var` survives across calls
    pub fn evaluate_with_scope(&self, node: &Node, scope: &mut Scope) -> RuntimeResult<EvalResult> {
        let result = Execution::new(self.store.clone(), &self.preferences, scope).node(node);
        log_outcome(node.type_name(), &result);
        result
    }

    pub fn program_with_scope(
        &self,
        program: &ProgramNode,
        scope: &mut Scope,
    ) -> RuntimeResult<EvalResult> {
        let result = Execution::new(self.store.clone(), &self.preferences, scope)
            .sequence(&program.statements);
        log_outcome("ProgramNode", &result);
        result
    }
}

fn log_outcome(node: &str, result: &RuntimeResult<EvalResult>) {
    match result {
        Ok(_) => {
            crate::log_success!(
                codes::success::EVALUATION_COMPLETE,
                "Evaluation completed",
                "node" => node
            );
        }
        Err(error) => {
            crate::log_debug!("Evaluation failed",
                "node" => node,
                "code" => error.error_code(),
                "position" => error.position(),
                "error" => error
            );
        }
    }
}

// ============================================================================
// EXECUTION
// ============================================================================

/// One walk over a tree: a store handle, preferences and the live bindings.
/// Trigger firings build their own.
pub(crate) struct Execution<'a> {
    store: Arc<dyn DeviceStore>,
    preferences: &'a EvaluationPreferences,
    scope: &'a mut Scope,
}

impl<'a> Execution<'a> {
    pub(crate) fn new(
        store: Arc<dyn DeviceStore>,
        preferences: &'a EvaluationPreferences,
        scope: &'a mut Scope,
    ) -> Self {
        Self {
            store,
            preferences,
            scope,
        }
    }

    fn node(&mut self, node: &Node) -> RuntimeResult<EvalResult> {
        match node {
            Node::Program(program) => self.sequence(&program.statements),
            Node::Block(block) => self.block(block),
            Node::Set(set) => self.set(set),
            Node::Get(get) => self.get(get),
            Node::Var(var) => self.var(var),
            Node::At(at) => self.at(at),
            Node::When(when) => self.when(when),
            Node::Condition(_) | Node::PathMatch(_) | Node::Value(_) => {
                crate::log_error!(
                    codes::runtime::UNKNOWN_NODE,
                    "Evaluator received a node that is not a statement",
                    position = node.position(),
                    "node" => node.type_name()
                );
                Err(RuntimeError::UnknownNode {
                    position: node.position(),
                    node: node.type_name(),
                })
            }
        }
    }

    pub(crate) fn block(&mut self, block: &BlockNode) -> RuntimeResult<EvalResult> {
        self.sequence(&block.statements)
    }

    /// Run statements in order; the last result wins, the first error stops
    fn sequence(&mut self, statements: &[Statement]) -> RuntimeResult<EvalResult> {
        let mut last = EvalResult::unit();
        for statement in statements {
            last = self.statement(statement)?;
        }
        Ok(last)
    }

    fn statement(&mut self, statement: &Statement) -> RuntimeResult<EvalResult> {
        if self.preferences.trace_statements {
            crate::log_debug!("Evaluating statement",
                "keyword" => statement.keyword(),
                "position" => statement.position()
            );
        }

        match statement {
            Statement::Set(set) => self.set(set),
            Statement::Get(get) => self.get(get),
            Statement::Var(var) => self.var(var),
            Statement::At(at) => self.at(at),
            Statement::When(when) => self.when(when),
        }
    }

    // === DEVICE ACCESS ===

    /// Addresses for a path match. Zero matches is an error only without wildcards.
    fn resolve(&self, path: &PathMatchNode) -> RuntimeResult<(PathPattern, Vec<DeviceAddress>)> {
        let pattern = PathPattern::from(path);
        let addresses = self
            .store
            .resolve(&pattern)
            .map_err(|error| RuntimeError::from_store(path.position, error))?;

        if addresses.is_empty() && !pattern.has_wildcard() {
            return Err(RuntimeError::UnknownPath {
                position: path.position,
                path: pattern.to_string(),
            });
        }

        let limit = self.preferences.max_matches_per_path;
        if addresses.len() > limit {
            return Err(RuntimeError::TooManyMatches {
                position: path.position,
                path: pattern.to_string(),
                count: addresses.len(),
                limit,
            });
        }

        Ok((pattern, addresses))
    }

    /// Every match is kind-checked before the first write; devices never
    /// change kind, so a wildcard `set` either writes all matches or none.
    fn set(&mut self, set: &SetStatementNode) -> RuntimeResult<EvalResult> {
        let value = self.scope.resolve(&set.value)?;
        let (_, addresses) = self.resolve(&set.device_match)?;

        if addresses.len() > 1 {
            for address in &addresses {
                let current = self
                    .store
                    .read(address)
                    .map_err(|error| RuntimeError::from_store(set.value.position, error))?;
                if current.kind() != value.kind() {
                    return Err(RuntimeError::from_store(
                        set.value.position,
                        StoreError::TypeMismatch {
                            address: address.to_string(),
                            expected: current.kind(),
                            found: value.kind(),
                        },
                    ));
                }
            }
        }

        for address in &addresses {
            self.store
                .write(address, value.clone())
                .map_err(|error| RuntimeError::from_store(set.value.position, error))?;
        }

        Ok(EvalResult::unit())
    }

    fn get(&mut self, get: &GetStatementNode) -> RuntimeResult<EvalResult> {
        let (pattern, addresses) = self.resolve(&get.device_match)?;
        let position = get.device_match.position;

        if !pattern.has_wildcard() {
            if let Some(address) = addresses.first() {
                let value = self
                    .store
                    .read(address)
                    .map_err(|error| RuntimeError::from_store(position, error))?;
                return Ok(EvalResult::Value { value });
            }
        }

        let readings = addresses
            .into_iter()
            .map(|address| {
                let value = self
                    .store
                    .read(&address)
                    .map_err(|error| RuntimeError::from_store(position, error))?;
                Ok(Reading { address, value })
            })
            .collect::<RuntimeResult<Vec<_>>>()?;

        Ok(EvalResult::Readings { readings })
    }

    fn var(&mut self, var: &VarStatementNode) -> RuntimeResult<EvalResult> {
        let value = self.scope.resolve(&var.value)?;
        self.scope.bind(var.name.clone(), value);
        Ok(EvalResult::unit())
    }

    // === TRIGGERS ===

    fn at(&mut self, at: &AtStatementNode) -> RuntimeResult<EvalResult> {
        let time = match self.scope.resolve(&at.time)? {
            Value::Time(time) => time,
            other => {
                return Err(RuntimeError::kind_mismatch(
                    at.time.position,
                    "at",
                    ValueKind::Time,
                    other.kind(),
                ))
            }
        };

        let trigger = self.trigger("at", at.position, &at.body);
        let registration = self
            .store
            .schedule_at(time, trigger.callback())
            .map_err(|error| registration_failed(at.position, "at", error))?;

        crate::log_success!(
            codes::success::TRIGGER_REGISTERED,
            "Scheduled trigger registered",
            "registration" => registration,
            "time" => time.format("%H:%M")
        );

        Ok(EvalResult::summary(format!(
            "scheduled {} at {}",
            registration,
            time.format("%H:%M")
        )))
    }

    fn when(&mut self, when: &WhenStatementNode) -> RuntimeResult<EvalResult> {
        let condition = self.condition(&when.condition)?;
        let summary = condition.to_string();

        let trigger = self.trigger("when", when.position, &when.body);
        let registration = self
            .store
            .subscribe_when(condition, trigger.callback())
            .map_err(|error| registration_failed(when.position, "when", error))?;

        crate::log_success!(
            codes::success::TRIGGER_REGISTERED,
            "Condition trigger registered",
            "registration" => registration,
            "condition" => summary
        );

        Ok(EvalResult::summary(format!(
            "subscribed {} when {}",
            registration, summary
        )))
    }

    /// Resolve and check a `when` condition before anything is registered
    fn condition(&mut self, condition: &ConditionNode) -> RuntimeResult<Condition> {
        let value = self.scope.resolve(&condition.value)?;

        if condition.operator.is_ordering() && !value.is_ordered() {
            return Err(RuntimeError::TypeMismatch {
                position: condition.value.position,
                message: format!(
                    "'{}' needs a number, time or duration, found a {}",
                    condition.operator,
                    value.kind()
                ),
            });
        }

        let pattern = PathPattern::from(&condition.device_match);
        if !pattern.has_wildcard() {
            let (_, addresses) = self.resolve(&condition.device_match)?;
            for address in &addresses {
                let current = self
                    .store
                    .read(address)
                    .map_err(|error| RuntimeError::from_store(condition.position, error))?;
                if current.kind() != value.kind() {
                    return Err(RuntimeError::kind_mismatch(
                        condition.value.position,
                        &format!("device '{}'", address),
                        current.kind(),
                        value.kind(),
                    ));
                }
            }
        }

        Ok(Condition {
            pattern,
            operator: condition.operator,
            value,
        })
    }

    fn trigger(&self, keyword: &'static str, position: Position, body: &BlockNode) -> Arc<Trigger> {
        Trigger::new(
            keyword,
            position,
            body.clone(),
            self.scope.clone(),
            &self.store,
            self.preferences.clone(),
        )
    }
}

fn registration_failed(
    position: Position,
    keyword: &'static str,
    error: super::store::StoreError,
) -> RuntimeError {
    RuntimeError::Registration {
        position,
        keyword,
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::store::{Firing, FiringCause, RegistrationId};
    use crate::evaluation::testing::MockStore;
    use crate::lexical::scan;
    use crate::syntax::parse;
    use assert_matches::assert_matches;
    use chrono::NaiveTime;

    fn program(source: &str) -> ProgramNode {
        parse(scan(source)).unwrap()
    }

    fn evaluator(mock: &Arc<MockStore>) -> Evaluator {
        let store: Arc<dyn DeviceStore> = mock.clone();
        Evaluator::new(store)
    }

    fn run(evaluator: &Evaluator, source: &str) -> RuntimeResult<EvalResult> {
        evaluator.evaluate(&Node::from(program(source)))
    }

    fn rooms() -> Arc<MockStore> {
        MockStore::with_devices(&[
            ("porch.light", Value::word("on")),
            ("room.kitchen.light", Value::word("on")),
            ("room.bedroom.light", Value::word("on")),
            ("room.bedroom.lamp", Value::word("on")),
            ("hall.temperature", Value::Number(21.0)),
        ])
    }

    #[test]
    fn test_get_renders_current_value() {
        let mock = rooms();
        let result = run(&evaluator(&mock), "get porch.light").unwrap();
        assert_eq!(result.render().as_deref(), Some("on"));
    }

    #[test]
    fn test_write_then_read() {
        let mock = rooms();
        let evaluator = evaluator(&mock);

        let set = run(&evaluator, "set porch.light off").unwrap();
        assert_eq!(set.render(), None);
        assert_eq!(
            run(&evaluator, "get porch.light").unwrap().render().as_deref(),
            Some("off")
        );
    }

    #[test]
    fn test_wildcard_set_writes_every_match() {
        let mock = rooms();
        run(&evaluator(&mock), "set room.*.light off").unwrap();

        assert_eq!(mock.write_count(), 2);
        assert_eq!(mock.value_of("room.kitchen.light"), Some(Value::word("off")));
        assert_eq!(mock.value_of("room.bedroom.light"), Some(Value::word("off")));
        assert_eq!(mock.value_of("room.bedroom.lamp"), Some(Value::word("on")));
    }

    #[test]
    fn test_wildcard_set_with_wrong_kind_writes_nothing() {
        let mock = MockStore::with_devices(&[
            ("room.a.level", Value::Number(3.0)),
            ("room.b.level", Value::word("high")),
        ]);
        assert_matches!(
            run(&evaluator(&mock), "set room.*.level 5"),
            Err(RuntimeError::TypeMismatch { .. })
        );
        assert_eq!(mock.write_count(), 0);
        assert_eq!(mock.value_of("room.a.level"), Some(Value::Number(3.0)));
    }

    #[test]
    fn test_wildcard_get_reads_every_match() {
        let mock = rooms();
        let result = run(&evaluator(&mock), "get room.*.light").unwrap();
        assert_matches!(&result, EvalResult::Readings { readings } if readings.len() == 2);
        assert_eq!(
            result.render().as_deref(),
            Some("room.bedroom.light = on\nroom.kitchen.light = on")
        );
    }

    #[test]
    fn test_zero_matches_wildcard_vs_literal() {
        let mock = rooms();
        let evaluator = evaluator(&mock);

        assert_eq!(run(&evaluator, "set garage.*.light off").unwrap(), EvalResult::unit());
        assert_eq!(mock.write_count(), 0);
        assert_eq!(
            run(&evaluator, "get garage.*").unwrap(),
            EvalResult::Readings { readings: vec![] }
        );

        assert_matches!(
            run(&evaluator, "set garage.light off"),
            Err(RuntimeError::UnknownPath { path, position }) if path == "garage.light" && position.column == 5
        );
        assert_matches!(
            run(&evaluator, "get garage.light"),
            Err(RuntimeError::UnknownPath { .. })
        );
    }

    #[test]
    fn test_type_mismatch_on_write() {
        let mock = rooms();
        assert_matches!(
            run(&evaluator(&mock), "set hall.temperature warm"),
            Err(RuntimeError::TypeMismatch { .. })
        );
        assert_eq!(mock.value_of("hall.temperature"), Some(Value::Number(21.0)));
    }

    #[test]
    fn test_variables_and_shadowing() {
        let mock = rooms();
        run(
            &evaluator(&mock),
            "var t = 19; var t = 23.5; set hall.temperature $t",
        )
        .unwrap();
        assert_eq!(mock.value_of("hall.temperature"), Some(Value::Number(23.5)));
    }

    #[test]
    fn test_scope_is_per_call_unless_shared() {
        let mock = rooms();
        let evaluator = evaluator(&mock);

        run(&evaluator, "var state = off").unwrap();
        assert_matches!(
            run(&evaluator, "set porch.light $state"),
            Err(RuntimeError::UnboundVariable { name, .. }) if name == "state"
        );

        let mut scope = Scope::new();
        evaluator
            .evaluate_with_scope(&Node::from(program("var state = off")), &mut scope)
            .unwrap();
        evaluator
            .evaluate_with_scope(&Node::from(program("set porch.light $state")), &mut scope)
            .unwrap();
        assert_eq!(mock.value_of("porch.light"), Some(Value::word("off")));
    }

    #[test]
    fn test_first_error_stops_the_program() {
        let mock = rooms();
        let result = run(
            &evaluator(&mock),
            "set porch.light off; set nowhere.light off; set hall.temperature 5",
        );
        assert_matches!(result, Err(RuntimeError::UnknownPath { .. }));
        assert_eq!(mock.value_of("porch.light"), Some(Value::word("off")));
        assert_eq!(mock.value_of("hall.temperature"), Some(Value::Number(21.0)));
    }

    #[test]
    fn test_last_statement_result_wins() {
        let mock = rooms();
        let result = run(&evaluator(&mock), "get porch.light; set porch.light off").unwrap();
        assert_eq!(result, EvalResult::unit());

        let result = run(&evaluator(&mock), "set porch.light on; get porch.light").unwrap();
        assert_eq!(result.value(), Some(&Value::word("on")));
    }

    #[test]
    fn test_at_registers_without_running_body() {
        let mock = rooms();
        let result = run(&evaluator(&mock), "at 5:30 pm set porch.light off").unwrap();

        assert_eq!(result.render().as_deref(), Some("scheduled #1 at 17:30"));
        assert_eq!(mock.value_of("porch.light"), Some(Value::word("on")));

        let scheduled = mock.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, NaiveTime::from_hms_opt(17, 30, 0).unwrap());

        (scheduled[0].1)(&Firing {
            registration: RegistrationId(1),
            cause: FiringCause::Scheduled { at: scheduled[0].0 },
        });
        assert_eq!(mock.value_of("porch.light"), Some(Value::word("off")));
    }

    #[test]
    fn test_trigger_sees_bindings_at_registration() {
        let mock = rooms();
        run(
            &evaluator(&mock),
            "var mode = off; when hall.temperature > 25 set room.*.light $mode",
        )
        .unwrap();

        let subscriptions = mock.subscriptions();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].0.to_string(), "hall.temperature > 25");

        (subscriptions[0].1)(&Firing {
            registration: RegistrationId(1),
            cause: FiringCause::ConditionMet {
                address: DeviceAddress::parse("hall.temperature").unwrap(),
                value: Value::Number(26.0),
            },
        });
        assert_eq!(mock.value_of("room.kitchen.light"), Some(Value::word("off")));
    }

    #[test]
    fn test_when_condition_validation() {
        let mock = rooms();
        let evaluator = evaluator(&mock);

        assert_matches!(
            run(&evaluator, "when porch.light > on get porch.light"),
            Err(RuntimeError::TypeMismatch { .. })
        );
        assert_matches!(
            run(&evaluator, "when hall.temperature == warm get porch.light"),
            Err(RuntimeError::TypeMismatch { .. })
        );
        assert_matches!(
            run(&evaluator, "when attic.fan == on get porch.light"),
            Err(RuntimeError::UnknownPath { .. })
        );
        assert!(run(&evaluator, "when attic.*.fan == on get porch.light").is_ok());
        assert_eq!(mock.subscriptions().len(), 1);
    }

    #[test]
    fn test_registration_failure() {
        let mock = rooms();
        mock.refuse_registrations();
        assert_matches!(
            run(&evaluator(&mock), "at 7:00 get porch.light"),
            Err(RuntimeError::Registration { keyword: "at", .. })
        );
    }

    #[test]
    fn test_non_statement_nodes_are_internal_errors() {
        let mock = rooms();
        let node = Node::Value(ValueNode::new(Position::start(), ValueKind::Word, "on"));
        let error = evaluator(&mock).evaluate(&node).unwrap_err();
        assert_matches!(error, RuntimeError::UnknownNode { node: "ValueNode", .. });
        assert!(error.is_internal());
    }

    #[test]
    fn test_statement_and_block_nodes_evaluate_directly() {
        let mock = rooms();
        let evaluator = evaluator(&mock);
        let parsed = program("get porch.light");
        let statement = parsed.statements[0].clone();

        assert_eq!(
            evaluator.evaluate(&Node::from(statement.clone())).unwrap().render().as_deref(),
            Some("on")
        );
        let block = BlockNode {
            position: Position::start(),
            statements: vec![statement],
        };
        assert!(evaluator.evaluate(&Node::Block(block)).is_ok());
    }

    #[test]
    fn test_match_limit() {
        let mock = rooms();
        let preferences = EvaluationPreferences {
            trace_statements: true,
            max_matches_per_path: 1,
        };
        let store: Arc<dyn DeviceStore> = mock.clone();
        let evaluator = Evaluator::with_preferences(store, preferences);
        assert_matches!(
            evaluator.evaluate_program(&program("set room.*.light off")),
            Err(RuntimeError::TooManyMatches { count: 2, limit: 1, .. })
        );
        assert_eq!(mock.write_count(), 0);
    }
}
