//! # Datalog AST - Abstract Syntax Tree Types
//!
//! Structured Datalog programs, as handed to the rule builder. There is no
//! textual parser; programs are built in code or read from JSON.
//!
//! ```json
//! {"rules": [{"head": {"relation": "path", "args": [{"Variable": "x"}, {"Variable": "y"}]},
//!             "body": [{"Positive": {"relation": "edge", "args": [{"Variable": "x"}, {"Variable": "y"}]}}]}]}
//! ```
//!
//! ## Builders
//!
//! For programmatic construction of AST nodes, see the [`builders`] module
//! which provides fluent APIs like `AtomBuilder` and `RuleBuilder`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

pub mod builders;

/// Name of the only supported builtin predicate
pub const BASH_COMMAND: &str = "bash_command";

/// Represents a variable or constant in Datalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    Variable(String), // e.g., "x", "y", "z"
    Constant(String), // e.g., "a", "42"
    /// Anonymous variable `_`
    Wildcard,
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Variable(name.into())
    }

    pub fn constant(value: impl Into<String>) -> Self {
        Term::Constant(value.into())
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Term::Constant(_))
    }

    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Term::Variable(v) => Some(v),
            _ => None,
        }
    }
}

/// `relation(args...)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Atom {
    pub relation: String,
    pub args: Vec<Term>,
}

impl Atom {
    pub fn new(relation: impl Into<String>, args: Vec<Term>) -> Self {
        Atom {
            relation: relation.into(),
            args,
        }
    }

    pub fn variables(&self) -> HashSet<String> {
        self.args
            .iter()
            .filter_map(Term::as_variable)
            .map(str::to_string)
            .collect()
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// `name/arity`
    pub fn signature(&self) -> String {
        format!("{}/{}", self.relation, self.arity())
    }
}

/// Body literal of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyPredicate {
    Positive(Atom),
    Negated(Atom),
    /// Builtin predicate such as `bash_command("cmd", x, y)`
    Builtin(Atom),
}

impl BodyPredicate {
    pub fn atom(&self) -> &Atom {
        match self {
            BodyPredicate::Positive(atom)
            | BodyPredicate::Negated(atom)
            | BodyPredicate::Builtin(atom) => atom,
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, BodyPredicate::Positive(_))
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, BodyPredicate::Negated(_))
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, BodyPredicate::Builtin(_))
    }

    /// Variables this literal binds or reads
    pub fn variables(&self) -> HashSet<String> {
        self.atom().variables()
    }
}

/// `head :- body.`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub head: Atom,
    pub body: Vec<BodyPredicate>,
}

impl Rule {
    pub fn new(head: Atom, body: Vec<BodyPredicate>) -> Self {
        Rule { head, body }
    }

    pub fn new_simple(head: Atom, body: Vec<Atom>) -> Self {
        Rule {
            head,
            body: body.into_iter().map(BodyPredicate::Positive).collect(),
        }
    }

    /// Whether every head variable and every negated variable is bound by a
    /// positive literal
    pub fn is_safe(&self) -> bool {
        let bound = self.positive_body_variables();
        if !self.head.variables().is_subset(&bound) {
            return false;
        }
        self.body
            .iter()
            .filter(|pred| pred.is_negated())
            .all(|pred| pred.variables().is_subset(&bound))
    }

    /// Variables bound by positive atoms and builtins
    pub fn positive_body_variables(&self) -> HashSet<String> {
        self.body
            .iter()
            .filter(|pred| !pred.is_negated())
            .flat_map(BodyPredicate::variables)
            .collect()
    }

    pub fn variables(&self) -> HashSet<String> {
        let mut vars = self.head.variables();
        for pred in &self.body {
            vars.extend(pred.variables());
        }
        vars
    }

    pub fn is_recursive(&self) -> bool {
        self.body
            .iter()
            .any(|pred| !pred.is_builtin() && pred.atom().signature() == self.head.signature())
    }

    pub fn positive_body_atoms(&self) -> Vec<&Atom> {
        self.body
            .iter()
            .filter_map(|pred| match pred {
                BodyPredicate::Positive(atom) => Some(atom),
                _ => None,
            })
            .collect()
    }

    pub fn negated_body_atoms(&self) -> Vec<&Atom> {
        self.body
            .iter()
            .filter_map(|pred| match pred {
                BodyPredicate::Negated(atom) => Some(atom),
                _ => None,
            })
            .collect()
    }
}

/// A Datalog program: a list of rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub rules: Vec<Rule>,
}

impl Program {
    pub fn new() -> Self {
        Program { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Parse a program from its JSON form
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Relations defined by rules, as `name/arity`
    pub fn idbs(&self) -> BTreeSet<String> {
        self.rules.iter().map(|rule| rule.head.signature()).collect()
    }

    /// Relations only read, as `name/arity`
    pub fn edbs(&self) -> BTreeSet<String> {
        let idbs = self.idbs();
        self.rules
            .iter()
            .flat_map(|rule| rule.body.iter())
            .filter(|pred| !pred.is_builtin())
            .map(|pred| pred.atom().signature())
            .filter(|sig| !idbs.contains(sig))
            .collect()
    }

    /// Every relation signature mentioned by the program
    pub fn relations(&self) -> BTreeSet<String> {
        let mut all = self.idbs();
        all.extend(self.edbs());
        all
    }

    pub fn recursive_rules(&self) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|rule| rule.is_recursive())
            .collect()
    }
}
