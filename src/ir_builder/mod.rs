//! # IR Builder
//!
//! Takes Datalog rules (AST) and converts them to an initial plan for one
//! query relation.
//!
//! ```text
//! AST (Program/Rules) → [IR Builder] → PlanNode tree → Optimizer
//! ```
//!
//! - Relations are identified by `name/arity`; a relation without rules is a
//!   base table.
//! - A rule body becomes a left-deep join of its positive atoms in order
//!   (join keys from shared variables), filters for constants and repeated
//!   variables, anti-joins for negated atoms, and a head projection.
//! - A recursive strongly connected component becomes a `Recursion`. Rules
//!   that only recurse through the relation itself get one semi-naive variant
//!   per recursive atom (that atom reads `delta`, the others `full`); rules
//!   recursing through other members of the component read `full` and inline
//!   the other members as nested recursions.

use crate::ast::{Atom, BodyPredicate, Program, Rule, Term, BASH_COMMAND};
use crate::error::{CompileError, CompileResult};
use crate::ir::{IdGenerator, NodeId, PlaceholderRole, PlanNode, ProjectItem};
use crate::recursion::DependencyGraph;
use std::collections::HashMap;

/// Split `name/arity`
pub fn split_signature(signature: &str) -> Option<(&str, usize)> {
    let (name, arity) = signature.rsplit_once('/')?;
    Some((name, arity.parse().ok()?))
}

/// How atoms of a rule body are resolved
#[derive(Clone, Copy)]
enum Scope<'a> {
    /// Outside any recursive component
    TopLevel,
    /// Inside the recursion of `env.last()`; `delta` is the occurrence of the
    /// own relation that reads the delta placeholder
    Recursive {
        scc: &'a [String],
        env: &'a [(String, NodeId)],
        delta: Option<usize>,
    },
}

/// Variable bound by each column of an intermediate plan
type Layout = Vec<Option<String>>;

/// IR Builder converts AST to IR
pub struct IRBuilder<'p> {
    program: &'p Program,
    graph: DependencyGraph,
    sccs: Vec<Vec<String>>,
    ids: IdGenerator,
    /// Plans of relations outside any recursion context
    cache: HashMap<String, PlanNode>,
}

impl<'p> IRBuilder<'p> {
    pub fn new(program: &'p Program) -> Self {
        let graph = DependencyGraph::from_program(program);
        let sccs = graph.find_sccs();
        IRBuilder {
            program,
            graph,
            sccs,
            ids: IdGenerator::new(),
            cache: HashMap::new(),
        }
    }

    /// Resolve `query` (`name/arity` or a bare name) to a relation signature
    pub fn resolve_query(&self, query: &str) -> CompileResult<String> {
        let relations = self.program.relations();
        if split_signature(query).is_some() {
            return if relations.contains(query) {
                Ok(query.to_string())
            } else {
                Err(CompileError::UnknownRelation(query.to_string()))
            };
        }
        let candidates: Vec<String> = relations
            .into_iter()
            .filter(|sig| split_signature(sig).is_some_and(|(name, _)| name == query))
            .collect();
        match candidates.len() {
            0 => Err(CompileError::UnknownRelation(query.to_string())),
            1 => Ok(candidates[0].clone()),
            _ => Err(CompileError::AmbiguousQuery {
                name: query.to_string(),
                candidates,
            }),
        }
    }

    /// Build the plan computing `query`
    pub fn build_query(&mut self, query: &str) -> CompileResult<PlanNode> {
        let signature = self.resolve_query(query)?;
        self.build_relation(&signature)
    }

    fn rules_for(&self, signature: &str) -> Vec<&'p Rule> {
        let program: &'p Program = self.program;
        program
            .rules
            .iter()
            .filter(|rule| rule.head.signature() == signature)
            .collect()
    }

    fn scc_of(&self, signature: &str) -> Vec<String> {
        self.sccs
            .iter()
            .find(|scc| scc.iter().any(|r| r == signature))
            .cloned()
            .unwrap_or_else(|| vec![signature.to_string()])
    }

    /// Build the plan of one relation outside any recursion context
    pub fn build_relation(&mut self, signature: &str) -> CompileResult<PlanNode> {
        if let Some(plan) = self.cache.get(signature) {
            return Ok(plan.clone());
        }
        let (name, arity) = split_signature(signature)
            .ok_or_else(|| CompileError::UnknownRelation(signature.to_string()))?;

        let rules = self.rules_for(signature);
        let plan = if rules.is_empty() {
            PlanNode::table(name, arity)
        } else {
            let scc = self.scc_of(signature);
            if let Some((relation, negated)) = self.graph.negative_edge_in_scc(&scc) {
                return Err(CompileError::UnstratifiedNegation { relation, negated });
            }
            if self.graph.is_recursive(&scc) {
                self.build_member(signature, &scc, &[])?
            } else {
                let mut parts = Vec::with_capacity(rules.len());
                for rule in rules {
                    parts.push(self.build_rule(rule, Scope::TopLevel)?);
                }
                union_of(parts, arity)
            }
        };
        tracing::trace!(relation = signature, nodes = plan.node_count(), "relation built");
        self.cache.insert(signature.to_string(), plan.clone());
        Ok(plan)
    }

    /// Build a member of a recursive component as a recursion of its own
    fn build_member(
        &mut self,
        signature: &str,
        scc: &[String],
        env: &[(String, NodeId)],
    ) -> CompileResult<PlanNode> {
        let arity = split_signature(signature).map_or(0, |(_, a)| a);
        let id = self.ids.fresh();
        let mut env = env.to_vec();
        env.push((signature.to_string(), id));

        let mut exit = Vec::new();
        let mut recursive = Vec::new();
        for rule in self.rules_for(signature) {
            let members: Vec<&Atom> = rule
                .positive_body_atoms()
                .into_iter()
                .filter(|atom| scc.contains(&atom.signature()))
                .collect();
            if members.is_empty() {
                exit.push(self.build_rule(rule, Scope::TopLevel)?);
                continue;
            }
            let own = members
                .iter()
                .filter(|atom| atom.signature() == signature)
                .count();
            if own == members.len() {
                for occurrence in 0..own {
                    let scope = Scope::Recursive {
                        scc,
                        env: &env,
                        delta: Some(occurrence),
                    };
                    recursive.push(self.build_rule(rule, scope)?);
                }
            } else {
                let scope = Scope::Recursive {
                    scc,
                    env: &env,
                    delta: None,
                };
                recursive.push(self.build_rule(rule, scope)?);
            }
        }

        Ok(PlanNode::recursion(
            id,
            union_of(exit, arity),
            union_of(recursive, arity),
        ))
    }

    fn resolve_atom(
        &mut self,
        atom: &Atom,
        occurrence: Option<usize>,
        scope: Scope<'_>,
    ) -> CompileResult<PlanNode> {
        let signature = atom.signature();
        let Scope::Recursive { scc, env, delta } = scope else {
            return self.build_relation(&signature);
        };
        if let Some((_, id)) = env.iter().rev().find(|(s, _)| *s == signature) {
            let own = env.last().is_some_and(|(s, _)| *s == signature);
            let role = if own && delta.is_some() && occurrence == delta {
                PlaceholderRole::Delta
            } else {
                PlaceholderRole::Full
            };
            return Ok(PlanNode::placeholder(*id, role, atom.arity()));
        }
        if scc.contains(&signature) {
            return self.build_member(&signature, scc, env);
        }
        self.build_relation(&signature)
    }

    /// Build one rule body and its head projection
    fn build_rule(&mut self, rule: &Rule, scope: Scope<'_>) -> CompileResult<PlanNode> {
        let head = rule.head.signature();
        if !rule.is_safe() {
            return Err(CompileError::InvalidRule(format!(
                "{head}: every head and negated variable must occur in a positive literal"
            )));
        }

        let mut current: Option<(PlanNode, Layout)> = None;
        let mut own_occurrence = 0;
        for pred in &rule.body {
            let (plan, terms) = match pred {
                BodyPredicate::Positive(atom) => {
                    let occurrence = (atom.signature() == head).then(|| {
                        own_occurrence += 1;
                        own_occurrence - 1
                    });
                    (self.resolve_atom(atom, occurrence, scope)?, &atom.args[..])
                }
                BodyPredicate::Builtin(atom) => builtin_leaf(atom)?,
                BodyPredicate::Negated(_) => continue,
            };
            let (plan, names) = bind_terms(plan, terms);
            current = Some(match current {
                None => (plan, names),
                Some((joined, mut layout)) => {
                    let (left_keys, right_keys) = shared_keys(&layout, &names);
                    let fresh: Layout = names
                        .into_iter()
                        .map(|n| match n {
                            Some(var) if layout_contains(&layout, &var) => None,
                            other => other,
                        })
                        .collect();
                    layout.extend(fresh);
                    (joined.join(plan, left_keys, right_keys), layout)
                }
            });
        }

        let Some((mut plan, layout)) = current else {
            return Err(CompileError::InvalidRule(format!(
                "{head}: a rule needs at least one positive body literal"
            )));
        };

        for atom in rule.negated_body_atoms() {
            let right = self.resolve_atom(atom, None, scope)?;
            let (right, names) = bind_terms(right, &atom.args);
            let (left_keys, right_keys) = shared_keys(&layout, &names);
            plan = plan.anti_join(right, left_keys, right_keys);
        }

        let mut items = Vec::with_capacity(rule.head.arity());
        for term in &rule.head.args {
            items.push(match term {
                Term::Variable(var) => {
                    let column = layout
                        .iter()
                        .position(|n| n.as_deref() == Some(var))
                        .ok_or_else(|| {
                            CompileError::InvalidRule(format!("{head}: unbound variable {var}"))
                        })?;
                    ProjectItem::Column(column)
                }
                Term::Constant(value) => ProjectItem::Literal(value.clone()),
                Term::Wildcard => {
                    return Err(CompileError::InvalidRule(format!(
                        "{head}: '_' cannot appear in a rule head"
                    )))
                }
            });
        }
        Ok(plan.project(items))
    }
}

fn union_of(mut parts: Vec<PlanNode>, arity: usize) -> PlanNode {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        PlanNode::union_all(parts, arity)
    }
}

/// `bash_command("cmd", args...)` as a command leaf and its output terms
fn builtin_leaf(atom: &Atom) -> CompileResult<(PlanNode, &[Term])> {
    if atom.relation != BASH_COMMAND {
        return Err(CompileError::UnsupportedBuiltin(atom.relation.clone()));
    }
    match atom.args.split_first() {
        Some((Term::Constant(command), rest)) => {
            Ok((PlanNode::builtin(command.clone(), rest.len()), rest))
        }
        _ => Err(CompileError::InvalidRule(format!(
            "{BASH_COMMAND} needs a constant command as its first argument"
        ))),
    }
}

fn layout_contains(layout: &[Option<String>], var: &str) -> bool {
    layout.iter().any(|n| n.as_deref() == Some(var))
}

/// Filter `plan` on the constants and repeated variables of `terms`; returns
/// the variable bound by each column
fn bind_terms(mut plan: PlanNode, terms: &[Term]) -> (PlanNode, Layout) {
    let mut names: Layout = Vec::with_capacity(terms.len());
    for (i, term) in terms.iter().enumerate() {
        match term {
            Term::Constant(value) => {
                plan = plan.filter_const(i, value.clone());
                names.push(None);
            }
            Term::Variable(var) => match names.iter().position(|n| n.as_deref() == Some(var)) {
                Some(first) => {
                    plan = plan.filter_columns(first, i);
                    names.push(None);
                }
                None => names.push(Some(var.clone())),
            },
            Term::Wildcard => names.push(None),
        }
    }
    (plan, names)
}

/// Join keys pairing every variable of `right` already bound in `left`
fn shared_keys(left: &[Option<String>], right: &[Option<String>]) -> (Vec<usize>, Vec<usize>) {
    let mut left_keys = Vec::new();
    let mut right_keys = Vec::new();
    for (r, name) in right.iter().enumerate() {
        let Some(var) = name else { continue };
        if let Some(l) = left.iter().position(|n| n.as_ref() == Some(var)) {
            left_keys.push(l);
            right_keys.push(r);
        }
    }
    (left_keys, right_keys)
}
