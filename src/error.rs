//! Compile error types.
//!
//! Every failure the compiler can report is fatal: passes assume a well-formed
//! tree, so anything that reaches them in the wrong shape aborts compilation
//! instead of being silently dropped from the generated script.

/// Compilation error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// A plan shape that a later stage cannot handle (e.g. a multi-column
    /// join key reaching the code generator unlowered)
    #[error("Malformed plan: {0}")]
    MalformedPlan(String),

    /// An abstract node kind reached the code generator
    #[error("Plan node {node} has no shell translation (was it lowered?)")]
    Unlowered { node: String },

    /// A bare query name matched the same relation at several arities
    #[error("Ambiguous query '{name}', candidates: {}", candidates.join(", "))]
    AmbiguousQuery {
        name: String,
        candidates: Vec<String>,
    },

    /// Query names a relation the program does not know
    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    /// A rule that cannot be translated (unbound head variable, unsafe negation)
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// A builtin predicate without a shell translation
    #[error("Unsupported builtin predicate: {0}")]
    UnsupportedBuiltin(String),

    /// Negation inside a recursive cycle
    #[error("Negation through recursion: {relation} negates {negated}")]
    UnstratifiedNegation { relation: String, negated: String },
}

/// Result type for compiler operations
pub type CompileResult<T> = Result<T, CompileError>;
