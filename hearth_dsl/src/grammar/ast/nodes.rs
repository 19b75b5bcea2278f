//! AST node definitions
//!
//! The node set is closed. Every node records the position of the token that
//! introduced it, owns its children exclusively, and is never mutated after
//! the parser builds it.
//!
//! Design principles:
//! - One node type per grammar rule
//! - Statements are a closed `Statement` enum so a program can only hold statements
//! - `Node` wraps every node type for the evaluator's entry point
//! - Serde compatible for `--dump-ast`

use crate::utils::Position;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Anything carrying a source position
pub trait Positioned {
    fn position(&self) -> Position;
}

macro_rules! impl_positioned {
    ($($node:ty),+ $(,)?) => {
        $(
            impl Positioned for $node {
                fn position(&self) -> Position {
                    self.position
                }
            }
        )+
    };
}

// === VALUES ===

/// Literal kinds a value node may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Number,
    /// Always normalised to 24-hour `HH:MM`
    Time,
    Duration,
    Word,
    /// `$name`, resolved against the evaluation scope
    Variable,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Time => "time",
            Self::Duration => "duration",
            Self::Word => "word",
            Self::Variable => "variable",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueNode {
    pub position: Position,
    pub kind: ValueKind,
    pub literal: String,
}

impl ValueNode {
    pub fn new(position: Position, kind: ValueKind, literal: impl Into<String>) -> Self {
        Self {
            position,
            kind,
            literal: literal.into(),
        }
    }

    /// Variable name without its `$`
    pub fn variable_name(&self) -> Option<&str> {
        match self.kind {
            ValueKind::Variable => Some(self.literal.trim_start_matches('$')),
            _ => None,
        }
    }
}

impl fmt::Display for ValueNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

// === PATHS ===

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    Literal(String),
    Wildcard,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(word) => f.write_str(word),
            Self::Wildcard => f.write_str("*"),
        }
    }
}

/// `segment ('.' segment)*`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMatchNode {
    pub position: Position,
    pub segments: Vec<PathSegment>,
}

impl PathMatchNode {
    pub fn new(position: Position, segments: Vec<PathSegment>) -> Self {
        Self { position, segments }
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, PathSegment::Wildcard))
    }

    /// Number of wildcard segments
    pub fn wildcards(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, PathSegment::Wildcard))
            .count()
    }
}

impl fmt::Display for PathMatchNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

// === CONDITIONS ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl ComparisonOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(Self::Equal),
            "!=" => Some(Self::NotEqual),
            "<" => Some(Self::Less),
            "<=" => Some(Self::LessOrEqual),
            ">" => Some(Self::Greater),
            ">=" => Some(Self::GreaterOrEqual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        }
    }

    /// Operators that need an ordered value kind
    pub fn is_ordering(&self) -> bool {
        !matches!(self, Self::Equal | Self::NotEqual)
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `path OPERATOR value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionNode {
    pub position: Position,
    pub device_match: PathMatchNode,
    pub operator: ComparisonOperator,
    pub value: ValueNode,
}

impl fmt::Display for ConditionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.device_match, self.operator, self.value)
    }
}

// === STATEMENTS ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetStatementNode {
    pub position: Position,
    pub device_match: PathMatchNode,
    pub value: ValueNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetStatementNode {
    pub position: Position,
    pub device_match: PathMatchNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarStatementNode {
    pub position: Position,
    pub name: String,
    pub value: ValueNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtStatementNode {
    pub position: Position,
    pub time: ValueNode,
    pub body: BlockNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenStatementNode {
    pub position: Position,
    pub condition: ConditionNode,
    pub body: BlockNode,
}

/// A statement reachable from the statement grammar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "statement")]
pub enum Statement {
    Set(SetStatementNode),
    Get(GetStatementNode),
    Var(VarStatementNode),
    At(AtStatementNode),
    When(WhenStatementNode),
}

impl Statement {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Set(_) => "set",
            Self::Get(_) => "get",
            Self::Var(_) => "var",
            Self::At(_) => "at",
            Self::When(_) => "when",
        }
    }
}

impl Positioned for Statement {
    fn position(&self) -> Position {
        match self {
            Self::Set(node) => node.position,
            Self::Get(node) => node.position,
            Self::Var(node) => node.position,
            Self::At(node) => node.position,
            Self::When(node) => node.position,
        }
    }
}

// === CONTAINERS ===

/// Nested statement sequence: a braced block, or a single bare statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    pub position: Position,
    pub statements: Vec<Statement>,
}

/// Root of a parse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramNode {
    pub position: Position,
    pub statements: Vec<Statement>,
}

impl ProgramNode {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl_positioned!(
    ValueNode,
    PathMatchNode,
    ConditionNode,
    SetStatementNode,
    GetStatementNode,
    VarStatementNode,
    AtStatementNode,
    WhenStatementNode,
    BlockNode,
    ProgramNode,
);

// === NODE ===

/// Every node type, for the evaluator's entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node")]
pub enum Node {
    Program(ProgramNode),
    Block(BlockNode),
    Set(SetStatementNode),
    Get(GetStatementNode),
    Var(VarStatementNode),
    At(AtStatementNode),
    When(WhenStatementNode),
    Condition(ConditionNode),
    PathMatch(PathMatchNode),
    Value(ValueNode),
}

impl Node {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Program(_) => "ProgramNode",
            Self::Block(_) => "BlockNode",
            Self::Set(_) => "SetStatementNode",
            Self::Get(_) => "GetStatementNode",
            Self::Var(_) => "VarStatementNode",
            Self::At(_) => "AtStatementNode",
            Self::When(_) => "WhenStatementNode",
            Self::Condition(_) => "ConditionNode",
            Self::PathMatch(_) => "PathMatchNode",
            Self::Value(_) => "ValueNode",
        }
    }
}

impl Positioned for Node {
    fn position(&self) -> Position {
        match self {
            Self::Program(node) => node.position,
            Self::Block(node) => node.position,
            Self::Set(node) => node.position,
            Self::Get(node) => node.position,
            Self::Var(node) => node.position,
            Self::At(node) => node.position,
            Self::When(node) => node.position,
            Self::Condition(node) => node.position,
            Self::PathMatch(node) => node.position,
            Self::Value(node) => node.position,
        }
    }
}

impl From<Statement> for Node {
    fn from(statement: Statement) -> Self {
        match statement {
            Statement::Set(node) => Self::Set(node),
            Statement::Get(node) => Self::Get(node),
            Statement::Var(node) => Self::Var(node),
            Statement::At(node) => Self::At(node),
            Statement::When(node) => Self::When(node),
        }
    }
}

impl From<ProgramNode> for Node {
    fn from(program: ProgramNode) -> Self {
        Self::Program(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(words: &[&str]) -> PathMatchNode {
        PathMatchNode::new(
            Position::start(),
            words
                .iter()
                .map(|w| match *w {
                    "*" => PathSegment::Wildcard,
                    other => PathSegment::Literal(other.to_string()),
                })
                .collect(),
        )
    }

    #[test]
    fn test_path_display_and_wildcards() {
        let plain = path(&["porch", "light"]);
        assert_eq!(plain.to_string(), "porch.light");
        assert!(!plain.has_wildcard());

        let wild = path(&["room", "*", "light"]);
        assert_eq!(wild.to_string(), "room.*.light");
        assert!(wild.has_wildcard());
        assert_eq!(wild.wildcards(), 1);
    }

    #[test]
    fn test_operator_symbols() {
        for symbol in ["==", "!=", "<", "<=", ">", ">="] {
            let op = ComparisonOperator::from_symbol(symbol).unwrap();
            assert_eq!(op.as_str(), symbol);
        }
        assert!(ComparisonOperator::Less.is_ordering());
        assert!(!ComparisonOperator::NotEqual.is_ordering());
        assert_eq!(ComparisonOperator::from_symbol("="), None);
    }

    #[test]
    fn test_variable_name_strips_sigil() {
        let value = ValueNode::new(Position::start(), ValueKind::Variable, "$level");
        assert_eq!(value.variable_name(), Some("level"));
        let word = ValueNode::new(Position::start(), ValueKind::Word, "on");
        assert_eq!(word.variable_name(), None);
    }

    #[test]
    fn test_statement_converts_to_node_keeping_position() {
        let statement = Statement::Get(GetStatementNode {
            position: Position::new(4, 1, 5),
            device_match: path(&["porch", "light"]),
        });
        let node = Node::from(statement);
        assert_eq!(node.type_name(), "GetStatementNode");
        assert_eq!(node.position(), Position::new(4, 1, 5));
    }

    #[test]
    fn test_ast_serializes_with_tags() {
        let program = ProgramNode {
            position: Position::start(),
            statements: vec![Statement::Get(GetStatementNode {
                position: Position::start(),
                device_match: path(&["porch", "light"]),
            })],
        };
        let json = serde_json::to_string(&Node::from(program)).unwrap();
        assert!(json.contains("\"node\":\"Program\""));
        assert!(json.contains("\"statement\":\"Get\""));
        assert!(json.contains("\"Literal\":\"porch\""));
    }
}
