//! Builder Patterns for AST Construction
//!
//! Provides fluent APIs for constructing AST nodes, particularly useful for tests.
//!
//! ## Example
//!
//! ```rust
//! use bashlog::ast::builders::{AtomBuilder, RuleBuilder};
//!
//! // Build an atom: path(x, y)
//! let atom = AtomBuilder::new("path")
//!     .var("x")
//!     .var("y")
//!     .build();
//!
//! // Build a rule: path(x, y) :- edge(x, y).
//! let rule = RuleBuilder::new("path")
//!     .head_vars(["x", "y"])
//!     .body_atom("edge", ["x", "y"])
//!     .build();
//!
//! // Build a recursive rule: path(x, z) :- path(x, y), edge(y, z).
//! let recursive = RuleBuilder::new("path")
//!     .head_vars(["x", "z"])
//!     .body_atom("path", ["x", "y"])
//!     .body_atom("edge", ["y", "z"])
//!     .build();
//! ```

use super::{Atom, BodyPredicate, Rule, Term, BASH_COMMAND};

// AtomBuilder
/// Builder for constructing Atom instances
#[derive(Debug, Clone)]
pub struct AtomBuilder {
    relation: String,
    args: Vec<Term>,
}

impl AtomBuilder {
    pub fn new(relation: impl Into<String>) -> Self {
        AtomBuilder {
            relation: relation.into(),
            args: Vec::new(),
        }
    }

    /// Add a variable argument
    pub fn var(mut self, name: impl Into<String>) -> Self {
        self.args.push(Term::Variable(name.into()));
        self
    }

    /// Add a constant argument
    pub fn constant(mut self, value: impl Into<String>) -> Self {
        self.args.push(Term::Constant(value.into()));
        self
    }

    /// Add an anonymous `_` argument
    pub fn wildcard(mut self) -> Self {
        self.args.push(Term::Wildcard);
        self
    }

    pub fn build(self) -> Atom {
        Atom::new(self.relation, self.args)
    }
}

/// Terms from short strings: `_` is a wildcard, a leading `'` marks a
/// constant, anything else is a variable
fn terms<I, S>(args: I) -> Vec<Term>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|arg| {
            let arg = arg.as_ref();
            if arg == "_" {
                Term::Wildcard
            } else if let Some(constant) = arg.strip_prefix('\'') {
                Term::Constant(constant.to_string())
            } else {
                Term::Variable(arg.to_string())
            }
        })
        .collect()
}

// RuleBuilder
/// Builder for constructing Rule instances
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    head_relation: String,
    head_args: Vec<Term>,
    body: Vec<BodyPredicate>,
}

impl RuleBuilder {
    pub fn new(head_relation: impl Into<String>) -> Self {
        RuleBuilder {
            head_relation: head_relation.into(),
            head_args: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Set head arguments (see `terms` for the notation)
    pub fn head_vars<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.head_args = terms(args);
        self
    }

    pub fn body_atom<I, S>(mut self, relation: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.body
            .push(BodyPredicate::Positive(Atom::new(relation, terms(args))));
        self
    }

    pub fn negated_atom<I, S>(mut self, relation: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.body
            .push(BodyPredicate::Negated(Atom::new(relation, terms(args))));
        self
    }

    /// `bash_command("command", args...)`
    pub fn bash_command<I, S>(mut self, command: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut all = vec![Term::Constant(command.to_string())];
        all.extend(terms(args));
        self.body
            .push(BodyPredicate::Builtin(Atom::new(BASH_COMMAND, all)));
        self
    }

    pub fn build(self) -> Rule {
        Rule::new(Atom::new(self.head_relation, self.head_args), self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_notation() {
        assert_eq!(
            terms(["x", "'a", "_"]),
            vec![Term::var("x"), Term::constant("a"), Term::Wildcard]
        );
    }

    #[test]
    fn test_bash_command_literal() {
        let rule = RuleBuilder::new("line")
            .head_vars(["x"])
            .bash_command("cat data.tsv", ["x"])
            .build();
        let BodyPredicate::Builtin(atom) = &rule.body[0] else {
            panic!("expected builtin");
        };
        assert_eq!(atom.relation, BASH_COMMAND);
        assert_eq!(atom.args[0], Term::constant("cat data.tsv"));
        assert_eq!(atom.arity(), 2);
    }
}
