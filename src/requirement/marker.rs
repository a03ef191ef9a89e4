// src/requirement/marker.rs

//! Environment markers
//!
//! A small recursive-descent parser for the PEP 508 marker grammar:
//!
//! ```text
//! marker_or   = marker_and ("or" marker_and)*
//! marker_and  = marker_atom ("and" marker_atom)*
//! marker_atom = "(" marker_or ")" | value op value
//! value       = variable | quoted string
//! op          = "<" | "<=" | "==" | "!=" | ">=" | ">" | "~=" | "===" | "in" | "not in"
//! ```
//!
//! Markers that gate a requirement on an extra (`extra == 'dev'`) cannot be
//! evaluated against an environment that binds a single extra while several
//! extras were requested, so [`MarkerTree::extract_extras`] moves those
//! leaves into a side set and rebuilds the remaining expression.

use crate::error::{Error, Result};
use crate::system::VariantAxis;
use crate::version::{Operator, Pep440Version, Specifier};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Marker variables and the variant axis each one implies
const VARIABLES: &[(&str, Option<VariantAxis>)] = &[
    ("implementation_name", Some(VariantAxis::Interpreter)),
    ("implementation_version", Some(VariantAxis::Interpreter)),
    ("platform_python_implementation", Some(VariantAxis::Interpreter)),
    ("platform.python_implementation", Some(VariantAxis::Interpreter)),
    ("python_implementation", Some(VariantAxis::Interpreter)),
    ("python_version", Some(VariantAxis::Interpreter)),
    ("python_full_version", Some(VariantAxis::Interpreter)),
    ("sys_platform", Some(VariantAxis::Platform)),
    ("sys.platform", Some(VariantAxis::Platform)),
    ("os_name", Some(VariantAxis::Platform)),
    ("os.name", Some(VariantAxis::Platform)),
    ("platform_system", Some(VariantAxis::Platform)),
    ("platform_release", Some(VariantAxis::Platform)),
    ("platform_version", Some(VariantAxis::Platform)),
    ("platform.version", Some(VariantAxis::Platform)),
    ("platform_machine", Some(VariantAxis::Arch)),
    ("platform.machine", Some(VariantAxis::Arch)),
    ("extra", None),
];

/// Canonical environment key for a (possibly legacy dotted) variable name
fn canonical_variable(name: &str) -> &str {
    match name {
        "sys.platform" => "sys_platform",
        "os.name" => "os_name",
        "platform.machine" => "platform_machine",
        "platform.version" => "platform_version",
        "platform.python_implementation" | "python_implementation" => {
            "platform_python_implementation"
        }
        other => other,
    }
}

fn is_known_variable(name: &str) -> bool {
    VARIABLES.iter().any(|(var, _)| *var == name)
}

// =============================================================================
// Tree
// =============================================================================

/// Comparison operator in a marker leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOp {
    Version(Operator),
    In,
    NotIn,
}

impl fmt::Display for MarkerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(op) => write!(f, "{}", op),
            Self::In => f.write_str("in"),
            Self::NotIn => f.write_str("not in"),
        }
    }
}

/// One side of a marker leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerValue {
    Variable(String),
    Literal(String),
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => f.write_str(name),
            Self::Literal(s) if s.contains('"') => write!(f, "'{}'", s),
            Self::Literal(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// A `{value, operator, value}` leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerExpr {
    pub lhs: MarkerValue,
    pub op: MarkerOp,
    pub rhs: MarkerValue,
}

impl MarkerExpr {
    /// The literal of an `extra == '<lit>'` leaf (either operand order)
    fn extra_literal(&self) -> Option<&str> {
        if self.op != MarkerOp::Version(Operator::Equal) {
            return None;
        }
        match (&self.lhs, &self.rhs) {
            (MarkerValue::Variable(v), MarkerValue::Literal(lit))
            | (MarkerValue::Literal(lit), MarkerValue::Variable(v))
                if v == "extra" =>
            {
                Some(lit.as_str())
            }
            _ => None,
        }
    }

    fn evaluate(&self, env: &MarkerEnvironment) -> Result<bool> {
        let lhs = env.resolve(&self.lhs)?;
        let rhs = env.resolve(&self.rhs)?;

        let op = match self.op {
            MarkerOp::In => return Ok(rhs.contains(lhs)),
            MarkerOp::NotIn => return Ok(!rhs.contains(lhs)),
            MarkerOp::Version(op) => op,
        };

        // version semantics when both sides are versions
        if let (Ok(spec), Ok(candidate)) = (
            Specifier::parse(&format!("{}{}", op, rhs)),
            Pep440Version::parse(lhs),
        ) {
            if let Ok(result) = spec.contains(&candidate) {
                return Ok(result);
            }
        }

        match op {
            Operator::Equal => Ok(lhs == rhs),
            Operator::NotEqual => Ok(lhs != rhs),
            Operator::Less => Ok(lhs < rhs),
            Operator::LessEqual => Ok(lhs <= rhs),
            Operator::Greater => Ok(lhs > rhs),
            Operator::GreaterEqual => Ok(lhs >= rhs),
            Operator::Compatible | Operator::Arbitrary => Err(Error::ParseError(format!(
                "Cannot compare '{}' and '{}' with '{}'",
                lhs, rhs, op
            ))),
        }
    }
}

impl fmt::Display for MarkerExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

/// Boolean expression over marker leaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerTree {
    Expr(MarkerExpr),
    And(Vec<MarkerTree>),
    Or(Vec<MarkerTree>),
    /// Parentheses as written in the source
    Group(Box<MarkerTree>),
}

impl MarkerTree {
    /// Parse a marker expression
    pub fn parse(s: &str) -> Result<Self> {
        let tokens = tokenize(s)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            input: s,
        };
        let tree = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(tree)
    }

    /// Evaluate against an environment
    pub fn evaluate(&self, env: &MarkerEnvironment) -> Result<bool> {
        match self {
            Self::Expr(expr) => expr.evaluate(env),
            Self::Group(inner) => inner.evaluate(env),
            Self::And(children) => {
                for child in children {
                    if !child.evaluate(env)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(children) => {
                for child in children {
                    if child.evaluate(env)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Visit every leaf in source order
    fn for_each_expr<'a>(&'a self, f: &mut impl FnMut(&'a MarkerExpr)) {
        match self {
            Self::Expr(expr) => f(expr),
            Self::Group(inner) => inner.for_each_expr(f),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.for_each_expr(f);
                }
            }
        }
    }

    /// Every variable referenced by the expression
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut vars = BTreeSet::new();
        self.for_each_expr(&mut |expr| {
            for value in [&expr.lhs, &expr.rhs] {
                if let MarkerValue::Variable(name) = value {
                    vars.insert(name.as_str());
                }
            }
        });
        vars
    }

    /// Whether any leaf compares the `extra` variable
    pub fn references_extra(&self) -> bool {
        self.variables().contains("extra")
    }

    /// Split `extra == '<lit>'` leaves out of the expression
    ///
    /// Returns the residual expression (`None` when nothing remains) and the
    /// extracted extras. Connectives collapse when they are left with a
    /// single operand; parentheses are kept.
    pub fn extract_extras(self) -> (Option<MarkerTree>, BTreeSet<String>) {
        let mut extras = BTreeSet::new();
        let residual = self.extract_into(&mut extras);
        (residual, extras)
    }

    fn extract_into(self, extras: &mut BTreeSet<String>) -> Option<MarkerTree> {
        match self {
            Self::Expr(expr) => match expr.extra_literal() {
                Some(lit) => {
                    extras.insert(lit.to_string());
                    None
                }
                None => Some(Self::Expr(expr)),
            },
            Self::Group(inner) => inner.extract_into(extras).map(|t| Self::Group(Box::new(t))),
            Self::And(children) => Self::rebuild(children, extras, Self::And),
            Self::Or(children) => Self::rebuild(children, extras, Self::Or),
        }
    }

    fn rebuild(
        children: Vec<MarkerTree>,
        extras: &mut BTreeSet<String>,
        make: fn(Vec<MarkerTree>) -> MarkerTree,
    ) -> Option<MarkerTree> {
        let mut kept: Vec<MarkerTree> = children
            .into_iter()
            .filter_map(|child| child.extract_into(extras))
            .collect();
        match kept.len() {
            0 => None,
            1 => kept.pop(),
            _ => Some(make(kept)),
        }
    }
}

impl fmt::Display for MarkerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(expr) => write!(f, "{}", expr),
            Self::Group(inner) => write!(f, "({})", inner),
            Self::And(children) | Self::Or(children) => {
                let sep = if matches!(self, Self::And(_)) { " and " } else { " or " };
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{}", child)?;
                }
                Ok(())
            }
        }
    }
}

/// Variant axes implied by the variables a marker references
pub fn convert_marker(marker: &MarkerTree) -> BTreeSet<VariantAxis> {
    marker
        .variables()
        .into_iter()
        .filter_map(|var| {
            VARIABLES
                .iter()
                .find(|(name, _)| *name == var)
                .and_then(|(_, axis)| *axis)
        })
        .collect()
}

// =============================================================================
// Environment
// =============================================================================

/// Values bound to marker variables during evaluation
#[derive(Debug, Clone, Default)]
pub struct MarkerEnvironment {
    values: BTreeMap<String, String>,
}

impl MarkerEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable (legacy dotted names are accepted)
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(canonical_variable(name).to_string(), value.into());
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(canonical_variable(name)).map(String::as_str)
    }

    fn resolve<'a>(&'a self, value: &'a MarkerValue) -> Result<&'a str> {
        match value {
            MarkerValue::Literal(s) => Ok(s.as_str()),
            // an unbound extra compares as the empty string
            MarkerValue::Variable(name) if name == "extra" => Ok(self.get("extra").unwrap_or("")),
            MarkerValue::Variable(name) => self
                .get(name)
                .ok_or_else(|| Error::ParseError(format!("Marker variable '{}' is not bound", name))),
        }
    }
}

// =============================================================================
// Parser
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Op(Operator),
    LParen,
    RParen,
}

fn tokenize(s: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = s.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| Error::ParseError(format!("Unterminated string in marker '{}'", s)))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '<' | '>' | '=' | '!' | '~' => {
                let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
                let op = ["===", "==", "!=", "<=", ">=", "~=", "<", ">"]
                    .into_iter()
                    .find(|op| rest.starts_with(op))
                    .ok_or_else(|| Error::ParseError(format!("Invalid operator in marker '{}'", s)))?;
                // the table only holds valid operators
                if let Some(parsed) = Operator::parse(op) {
                    tokens.push(Token::Op(parsed));
                }
                i += op.len();
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(Error::ParseError(format!(
                    "Unexpected character '{}' in marker '{}'",
                    other, s
                )));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
}

impl Parser<'_> {
    fn error(&self, what: &str) -> Error {
        Error::ParseError(format!("Invalid marker '{}': {}", self.input, what))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == keyword)
    }

    fn parse_or(&mut self) -> Result<MarkerTree> {
        let mut children = vec![self.parse_and()?];
        while self.peek_keyword("or") {
            self.pos += 1;
            children.push(self.parse_and()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            MarkerTree::Or(children)
        })
    }

    fn parse_and(&mut self) -> Result<MarkerTree> {
        let mut children = vec![self.parse_atom()?];
        while self.peek_keyword("and") {
            self.pos += 1;
            children.push(self.parse_atom()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            MarkerTree::And(children)
        })
    }

    fn parse_atom(&mut self) -> Result<MarkerTree> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            if self.peek() != Some(&Token::RParen) {
                return Err(self.error("expected ')'"));
            }
            self.pos += 1;
            return Ok(MarkerTree::Group(Box::new(inner)));
        }

        let lhs = self.parse_value()?;
        let op = self.parse_op()?;
        let rhs = self.parse_value()?;
        Ok(MarkerTree::Expr(MarkerExpr { lhs, op, rhs }))
    }

    fn parse_value(&mut self) -> Result<MarkerValue> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Str(s)) => {
                self.pos += 1;
                Ok(MarkerValue::Literal(s))
            }
            Some(Token::Ident(name)) if is_known_variable(&name) => {
                self.pos += 1;
                Ok(MarkerValue::Variable(name))
            }
            Some(Token::Ident(name)) => Err(self.error(&format!("unknown variable '{}'", name))),
            _ => Err(self.error("expected a variable or a quoted string")),
        }
    }

    fn parse_op(&mut self) -> Result<MarkerOp> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Op(op)) => {
                self.pos += 1;
                Ok(MarkerOp::Version(op))
            }
            Some(Token::Ident(kw)) if kw == "in" => {
                self.pos += 1;
                Ok(MarkerOp::In)
            }
            Some(Token::Ident(kw)) if kw == "not" => {
                self.pos += 1;
                if !self.peek_keyword("in") {
                    return Err(self.error("expected 'in' after 'not'"));
                }
                self.pos += 1;
                Ok(MarkerOp::NotIn)
            }
            _ => Err(self.error("expected an operator")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> MarkerTree {
        MarkerTree::parse(s).unwrap()
    }

    fn env() -> MarkerEnvironment {
        MarkerEnvironment::new()
            .with("python_version", "3.9")
            .with("python_full_version", "3.9.18")
            .with("sys_platform", "linux")
            .with("platform_machine", "x86_64")
            .with("os_name", "posix")
    }

    #[test]
    fn test_parse_and_render() {
        assert_eq!(m("python_version<'3.8'").to_string(), "python_version < \"3.8\"");
        assert_eq!(
            m("os_name == 'nt' and (python_version >= '3' or sys_platform != \"linux\")").to_string(),
            "os_name == \"nt\" and (python_version >= \"3\" or sys_platform != \"linux\")"
        );
        assert_eq!(m("'linux' in sys_platform").to_string(), "\"linux\" in sys_platform");
        assert_eq!(m("sys.platform not in 'win32'").to_string(), "sys.platform not in \"win32\"");
    }

    #[test]
    fn test_parse_errors() {
        assert!(MarkerTree::parse("").is_err());
        assert!(MarkerTree::parse("python_version").is_err());
        assert!(MarkerTree::parse("foo == '1'").is_err());
        assert!(MarkerTree::parse("(python_version == '3'").is_err());
        assert!(MarkerTree::parse("python_version == '3").is_err());
        assert!(MarkerTree::parse("python_version == '3' and").is_err());
        assert!(MarkerTree::parse("python_version not '3'").is_err());
    }

    #[test]
    fn test_evaluate_versions() {
        let env = env();
        assert!(!m("python_version < '3.8'").evaluate(&env).unwrap());
        assert!(m("python_version >= '3.8'").evaluate(&env).unwrap());
        assert!(m("python_full_version == '3.9.*'").evaluate(&env).unwrap());
        assert!(m("python_version < '3.10'").evaluate(&env).unwrap());
    }

    #[test]
    fn test_evaluate_strings_and_connectives() {
        let env = env();
        assert!(m("sys_platform == 'linux' and platform_machine == 'x86_64'").evaluate(&env).unwrap());
        assert!(m("sys_platform == 'win32' or os_name == 'posix'").evaluate(&env).unwrap());
        assert!(!m("sys_platform == 'win32' or (os_name == 'nt' and python_version > '3')").evaluate(&env).unwrap());
        assert!(m("'lin' in sys_platform").evaluate(&env).unwrap());
        assert!(m("sys.platform not in 'win32 cygwin'").evaluate(&env).unwrap());
    }

    #[test]
    fn test_evaluate_unbound() {
        let env = MarkerEnvironment::new();
        assert!(m("platform_release == '5'").evaluate(&env).is_err());
        assert!(!m("extra == 'dev'").evaluate(&env).unwrap());
    }

    #[test]
    fn test_extract_single_extra() {
        let (residual, extras) = m("extra == 'dev'").extract_extras();
        assert!(residual.is_none());
        assert_eq!(extras.into_iter().collect::<Vec<_>>(), vec!["dev"]);
    }

    #[test]
    fn test_extract_preserves_skeleton() {
        let (residual, extras) =
            m("python_version < '3.8' and extra == 'test' or 'docs' == extra").extract_extras();
        assert_eq!(residual.unwrap().to_string(), "python_version < \"3.8\"");
        assert_eq!(extras.len(), 2);

        let (residual, extras) = m(
            "(sys_platform == 'win32' or os_name == 'nt') and extra == 'gui' and python_version >= '3'",
        )
        .extract_extras();
        assert_eq!(
            residual.unwrap().to_string(),
            "(sys_platform == \"win32\" or os_name == \"nt\") and python_version >= \"3\""
        );
        assert!(extras.contains("gui"));
    }

    #[test]
    fn test_extract_nested_group() {
        let (residual, extras) = m("(extra == 'a' or extra == 'b') and python_version < '4'").extract_extras();
        assert_eq!(residual.unwrap().to_string(), "python_version < \"4\"");
        assert_eq!(extras.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_extract_without_extras() {
        let tree = m("python_version < '3.8'");
        assert!(!tree.references_extra());
        let (residual, extras) = tree.clone().extract_extras();
        assert_eq!(residual, Some(tree));
        assert!(extras.is_empty());
    }

    #[test]
    fn test_convert_marker() {
        let axes = convert_marker(&m("python_version == '3' and platform_machine == 'x86_64'"));
        assert_eq!(
            axes.into_iter().collect::<Vec<_>>(),
            vec![VariantAxis::Arch, VariantAxis::Interpreter]
        );

        let axes = convert_marker(&m("sys.platform == 'darwin' or os_name == 'nt'"));
        assert_eq!(axes.into_iter().collect::<Vec<_>>(), vec![VariantAxis::Platform]);

        assert!(convert_marker(&m("extra == 'x'")).is_empty());
    }
}
