//! IR types for bashlog query plans, shared across all passes.
//!
//! A plan is a free tree of [`PlanNode`]s over rows of fixed-width text
//! values. Every node knows its output arity. Producers (recursions,
//! materializations and multi-output scans) carry a [`NodeId`]; placeholders
//! refer back to them by id and are resolved through [`scope::ScopeTable`],
//! so the tree stays acyclic and can be cloned, hashed and compared freely.

pub mod scope;
pub mod validate;

use std::fmt;

/// Identity of a producer node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic allocator for producer ids
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    next: u32,
}

impl IdGenerator {
    pub fn new() -> Self {
        IdGenerator { next: 0 }
    }

    /// Generator whose ids never collide with the producers already in `plan`
    pub fn after(plan: &PlanNode) -> Self {
        IdGenerator {
            next: plan.max_producer_id().map_or(0, |id| id.0 + 1),
        }
    }

    pub fn fresh(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// One output column of a projection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProjectItem {
    /// Copy an input column
    Column(usize),
    /// Emit a constant
    Literal(String),
}

impl ProjectItem {
    pub fn column(&self) -> Option<usize> {
        match self {
            ProjectItem::Column(c) => Some(*c),
            ProjectItem::Literal(_) => None,
        }
    }
}

impl fmt::Display for ProjectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectItem::Column(c) => write!(f, "{c}"),
            ProjectItem::Literal(v) => write!(f, "{v:?}"),
        }
    }
}

/// Projection that only copies columns
pub fn columns(cols: &[usize]) -> Vec<ProjectItem> {
    cols.iter().map(|&c| ProjectItem::Column(c)).collect()
}

/// Whether `items` reproduces an input of `input_arity` unchanged
pub fn is_identity_projection(items: &[ProjectItem], input_arity: usize) -> bool {
    items.len() == input_arity
        && items
            .iter()
            .enumerate()
            .all(|(i, item)| *item == ProjectItem::Column(i))
}

/// What a placeholder stands for inside its producer's scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlaceholderRole {
    /// Rows derived in the previous recursion round
    Delta,
    /// All rows derived so far by a recursion
    Full,
    /// A materialized subplan
    Reuse,
    /// One branch of a multi-output scan
    Branch(usize),
}

impl fmt::Display for PlaceholderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceholderRole::Delta => write!(f, "delta"),
            PlaceholderRole::Full => write!(f, "full"),
            PlaceholderRole::Reuse => write!(f, "reuse"),
            PlaceholderRole::Branch(i) => write!(f, "branch{i}"),
        }
    }
}

/// How often a materialized value is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReuseCount {
    /// Read by exactly this many placeholders
    Finite(usize),
    /// Read once per iteration of an enclosing recursion
    Unbounded,
}

impl fmt::Display for ReuseCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReuseCount::Finite(n) => write!(f, "{n}"),
            ReuseCount::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Input side of a join output column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// Output column of a sort join, taken from one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinColumn {
    pub side: Side,
    pub column: usize,
}

impl JoinColumn {
    pub fn left(column: usize) -> Self {
        JoinColumn {
            side: Side::Left,
            column,
        }
    }

    pub fn right(column: usize) -> Self {
        JoinColumn {
            side: Side::Right,
            column,
        }
    }
}

/// Row condition of a filter branch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Condition {
    /// column = literal
    Const { column: usize, value: String },
    /// column_left = column_right
    Columns { left: usize, right: usize },
}

impl Condition {
    pub fn holds(&self, row: &[String]) -> bool {
        match self {
            Condition::Const { column, value } => row.get(*column) == Some(value),
            Condition::Columns { left, right } => row.get(*left) == row.get(*right),
        }
    }
}

/// Filters followed by an optional projection, applied to one shared input
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterBranch {
    pub conditions: Vec<Condition>,
    pub projection: Option<Vec<ProjectItem>>,
}

impl FilterBranch {
    pub fn arity(&self, input_arity: usize) -> usize {
        self.projection.as_ref().map_or(input_arity, Vec::len)
    }

    /// Output row for `row`, or `None` when a condition fails
    pub fn apply(&self, row: &[String]) -> Option<Vec<String>> {
        if !self.conditions.iter().all(|c| c.holds(row)) {
            return None;
        }
        Some(match &self.projection {
            None => row.to_vec(),
            Some(items) => items
                .iter()
                .map(|item| match item {
                    ProjectItem::Column(c) => row.get(*c).cloned().unwrap_or_default(),
                    ProjectItem::Literal(v) => v.clone(),
                })
                .collect(),
        })
    }
}

impl fmt::Display for FilterBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conds: Vec<String> = self
            .conditions
            .iter()
            .map(|c| match c {
                Condition::Const { column, value } => format!("${column}={value:?}"),
                Condition::Columns { left, right } => format!("${left}=${right}"),
            })
            .collect();
        write!(f, "[{}]", conds.join(" && "))?;
        if let Some(items) = &self.projection {
            let items: Vec<String> = items.iter().map(ToString::to_string).collect();
            write!(f, " -> ({})", items.join(", "))?;
        }
        Ok(())
    }
}

/// Query plan node
///
/// Child order (used by paths and scopes): unary nodes have their input at 0,
/// binary nodes `[left, right]`, recursions `[exit, recursive]`,
/// materializations `[reused, main]` and multi-output scans `[input, main]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlanNode {
    /// Base relation by name, read from the input directory
    Table { name: String, arity: usize },

    /// Base relation stored as a tab separated file
    File { path: String, arity: usize },

    /// Rows produced by an external command, inserted verbatim
    Builtin { command: String, arity: usize },

    /// Column reorder/drop and literal injection
    Project {
        input: Box<PlanNode>,
        items: Vec<ProjectItem>,
    },

    /// Keep rows whose column equals a literal
    ConstEq {
        input: Box<PlanNode>,
        column: usize,
        value: String,
    },

    /// Keep rows whose two columns are equal
    VarEq {
        input: Box<PlanNode>,
        left: usize,
        right: usize,
    },

    /// Equi-join; output is the left row followed by the right row
    Join {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
    },

    /// Left rows without a right row matching on the keys
    AntiJoin {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
    },

    /// Set union; no inputs is the empty relation
    Union { inputs: Vec<PlanNode>, arity: usize },

    /// Sort on the given columns, or on all columns with duplicates removed
    Sort {
        input: Box<PlanNode>,
        columns: Option<Vec<usize>>,
    },

    /// Append one column combining several key columns
    CombinedColumn {
        input: Box<PlanNode>,
        columns: Vec<usize>,
    },

    /// Merge join of inputs sorted on one key column each
    SortJoin {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        left_key: usize,
        right_key: usize,
        output: Vec<JoinColumn>,
    },

    /// Merge anti-join of inputs sorted on one key column each
    SortAntiJoin {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        left_key: usize,
        right_key: usize,
    },

    /// One scan of `input` printing the rows of every matching branch
    MultiFilter {
        input: Box<PlanNode>,
        branches: Vec<FilterBranch>,
        arity: usize,
    },

    /// One scan of `input` writing each branch to its own artifact
    MultiOutput {
        id: NodeId,
        input: Box<PlanNode>,
        branches: Vec<FilterBranch>,
        main: Box<PlanNode>,
    },

    /// Fixpoint: exit ∪ lfp(recursive), with delta/full placeholders
    Recursion {
        id: NodeId,
        exit: Box<PlanNode>,
        recursive: Box<PlanNode>,
    },

    /// Recursion whose inputs are canonically sorted
    SortRecursion {
        id: NodeId,
        exit: Box<PlanNode>,
        recursive: Box<PlanNode>,
    },

    /// Evaluate `reused` once and read it through placeholders in `main`
    Materialization {
        id: NodeId,
        reused: Box<PlanNode>,
        main: Box<PlanNode>,
        reuse: ReuseCount,
    },

    /// Back-reference to a producer
    Placeholder {
        producer: NodeId,
        role: PlaceholderRole,
        arity: usize,
    },
}

impl PlanNode {
    // Constructors

    pub fn table(name: impl Into<String>, arity: usize) -> Self {
        PlanNode::Table {
            name: name.into(),
            arity,
        }
    }

    pub fn file(path: impl Into<String>, arity: usize) -> Self {
        PlanNode::File {
            path: path.into(),
            arity,
        }
    }

    pub fn builtin(command: impl Into<String>, arity: usize) -> Self {
        PlanNode::Builtin {
            command: command.into(),
            arity,
        }
    }

    /// The empty relation of the given arity
    pub fn empty(arity: usize) -> Self {
        PlanNode::Union {
            inputs: Vec::new(),
            arity,
        }
    }

    pub fn placeholder(producer: NodeId, role: PlaceholderRole, arity: usize) -> Self {
        PlanNode::Placeholder {
            producer,
            role,
            arity,
        }
    }

    pub fn recursion(id: NodeId, exit: PlanNode, recursive: PlanNode) -> Self {
        PlanNode::Recursion {
            id,
            exit: Box::new(exit),
            recursive: Box::new(recursive),
        }
    }

    pub fn project(self, items: Vec<ProjectItem>) -> Self {
        PlanNode::Project {
            input: Box::new(self),
            items,
        }
    }

    pub fn project_columns(self, cols: &[usize]) -> Self {
        self.project(columns(cols))
    }

    pub fn filter_const(self, column: usize, value: impl Into<String>) -> Self {
        PlanNode::ConstEq {
            input: Box::new(self),
            column,
            value: value.into(),
        }
    }

    pub fn filter_columns(self, left: usize, right: usize) -> Self {
        PlanNode::VarEq {
            input: Box::new(self),
            left,
            right,
        }
    }

    pub fn join(self, right: PlanNode, left_keys: Vec<usize>, right_keys: Vec<usize>) -> Self {
        PlanNode::Join {
            left: Box::new(self),
            right: Box::new(right),
            left_keys,
            right_keys,
        }
    }

    pub fn anti_join(
        self,
        right: PlanNode,
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
    ) -> Self {
        PlanNode::AntiJoin {
            left: Box::new(self),
            right: Box::new(right),
            left_keys,
            right_keys,
        }
    }

    pub fn union(self, other: PlanNode) -> Self {
        let arity = self.arity();
        PlanNode::Union {
            inputs: vec![self, other],
            arity,
        }
    }

    pub fn union_all(inputs: Vec<PlanNode>, arity: usize) -> Self {
        PlanNode::Union { inputs, arity }
    }

    pub fn sort(self, columns: Option<Vec<usize>>) -> Self {
        PlanNode::Sort {
            input: Box::new(self),
            columns,
        }
    }

    // Structure

    /// Output arity
    pub fn arity(&self) -> usize {
        match self {
            PlanNode::Table { arity, .. }
            | PlanNode::File { arity, .. }
            | PlanNode::Builtin { arity, .. }
            | PlanNode::Union { arity, .. }
            | PlanNode::MultiFilter { arity, .. }
            | PlanNode::Placeholder { arity, .. } => *arity,
            PlanNode::Project { items, .. } => items.len(),
            PlanNode::ConstEq { input, .. }
            | PlanNode::VarEq { input, .. }
            | PlanNode::Sort { input, .. } => input.arity(),
            PlanNode::CombinedColumn { input, .. } => input.arity() + 1,
            PlanNode::Join { left, right, .. } => left.arity() + right.arity(),
            PlanNode::AntiJoin { left, .. } | PlanNode::SortAntiJoin { left, .. } => left.arity(),
            PlanNode::SortJoin { output, .. } => output.len(),
            PlanNode::MultiOutput { main, .. } | PlanNode::Materialization { main, .. } => {
                main.arity()
            }
            PlanNode::Recursion { exit, .. } | PlanNode::SortRecursion { exit, .. } => {
                exit.arity()
            }
        }
    }

    /// Children in canonical order
    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::Table { .. }
            | PlanNode::File { .. }
            | PlanNode::Builtin { .. }
            | PlanNode::Placeholder { .. } => Vec::new(),
            PlanNode::Project { input, .. }
            | PlanNode::ConstEq { input, .. }
            | PlanNode::VarEq { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::CombinedColumn { input, .. }
            | PlanNode::MultiFilter { input, .. } => vec![input],
            PlanNode::Join { left, right, .. }
            | PlanNode::AntiJoin { left, right, .. }
            | PlanNode::SortJoin { left, right, .. }
            | PlanNode::SortAntiJoin { left, right, .. } => vec![left, right],
            PlanNode::Union { inputs, .. } => inputs.iter().collect(),
            PlanNode::MultiOutput { input, main, .. } => vec![input, main],
            PlanNode::Recursion {
                exit, recursive, ..
            }
            | PlanNode::SortRecursion {
                exit, recursive, ..
            } => vec![exit, recursive],
            PlanNode::Materialization { reused, main, .. } => vec![reused, main],
        }
    }

    /// Rebuild this node with every child passed through `f`
    pub fn map_children(self, mut f: impl FnMut(PlanNode) -> PlanNode) -> PlanNode {
        let mut boxed = |node: Box<PlanNode>| Box::new(f(*node));
        match self {
            leaf @ (PlanNode::Table { .. }
            | PlanNode::File { .. }
            | PlanNode::Builtin { .. }
            | PlanNode::Placeholder { .. }) => leaf,
            PlanNode::Project { input, items } => PlanNode::Project {
                input: boxed(input),
                items,
            },
            PlanNode::ConstEq {
                input,
                column,
                value,
            } => PlanNode::ConstEq {
                input: boxed(input),
                column,
                value,
            },
            PlanNode::VarEq { input, left, right } => PlanNode::VarEq {
                input: boxed(input),
                left,
                right,
            },
            PlanNode::Join {
                left,
                right,
                left_keys,
                right_keys,
            } => PlanNode::Join {
                left: boxed(left),
                right: boxed(right),
                left_keys,
                right_keys,
            },
            PlanNode::AntiJoin {
                left,
                right,
                left_keys,
                right_keys,
            } => PlanNode::AntiJoin {
                left: boxed(left),
                right: boxed(right),
                left_keys,
                right_keys,
            },
            PlanNode::Union { inputs, arity } => PlanNode::Union {
                inputs: inputs.into_iter().map(|c| *boxed(Box::new(c))).collect(),
                arity,
            },
            PlanNode::Sort { input, columns } => PlanNode::Sort {
                input: boxed(input),
                columns,
            },
            PlanNode::CombinedColumn { input, columns } => PlanNode::CombinedColumn {
                input: boxed(input),
                columns,
            },
            PlanNode::SortJoin {
                left,
                right,
                left_key,
                right_key,
                output,
            } => PlanNode::SortJoin {
                left: boxed(left),
                right: boxed(right),
                left_key,
                right_key,
                output,
            },
            PlanNode::SortAntiJoin {
                left,
                right,
                left_key,
                right_key,
            } => PlanNode::SortAntiJoin {
                left: boxed(left),
                right: boxed(right),
                left_key,
                right_key,
            },
            PlanNode::MultiFilter {
                input,
                branches,
                arity,
            } => PlanNode::MultiFilter {
                input: boxed(input),
                branches,
                arity,
            },
            PlanNode::MultiOutput {
                id,
                input,
                branches,
                main,
            } => PlanNode::MultiOutput {
                id,
                input: boxed(input),
                branches,
                main: boxed(main),
            },
            PlanNode::Recursion {
                id,
                exit,
                recursive,
            } => PlanNode::Recursion {
                id,
                exit: boxed(exit),
                recursive: boxed(recursive),
            },
            PlanNode::SortRecursion {
                id,
                exit,
                recursive,
            } => PlanNode::SortRecursion {
                id,
                exit: boxed(exit),
                recursive: boxed(recursive),
            },
            PlanNode::Materialization {
                id,
                reused,
                main,
                reuse,
            } => PlanNode::Materialization {
                id,
                reused: boxed(reused),
                main: boxed(main),
                reuse,
            },
        }
    }

    /// Post-order rewrite: children first, then `f` on the rebuilt node
    pub fn transform_up(self, f: &mut impl FnMut(PlanNode) -> PlanNode) -> PlanNode {
        let node = self.map_children(|child| child.transform_up(f));
        f(node)
    }

    /// Rewrite the node at `path` with `f`, leaving the rest of the tree as is
    pub fn replace_at(self, path: &[usize], f: impl FnOnce(PlanNode) -> PlanNode) -> PlanNode {
        let Some((&first, rest)) = path.split_first() else {
            return f(self);
        };
        let mut f = Some(f);
        let mut index = 0;
        self.map_children(|child| {
            let i = index;
            index += 1;
            match f.take() {
                Some(g) if i == first => child.replace_at(rest, g),
                Some(g) => {
                    f = Some(g);
                    child
                }
                None => child,
            }
        })
    }

    /// Node at `path` (child indices from this node)
    pub fn at_path(&self, path: &[usize]) -> Option<&PlanNode> {
        let mut node = self;
        for &i in path {
            node = *node.children().get(i)?;
        }
        Some(node)
    }

    pub fn height(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(PlanNode::height)
            .max()
            .unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(PlanNode::node_count)
            .sum::<usize>()
    }

    /// Whether `other` occurs (structurally) anywhere in this tree
    pub fn contains(&self, other: &PlanNode) -> bool {
        self == other || self.children().into_iter().any(|c| c.contains(other))
    }

    /// Whether any placeholder of producer `id` occurs in this tree
    pub fn references(&self, id: NodeId) -> bool {
        match self {
            PlanNode::Placeholder { producer, .. } => *producer == id,
            _ => self.children().into_iter().any(|c| c.references(id)),
        }
    }

    pub fn is_empty_relation(&self) -> bool {
        matches!(self, PlanNode::Union { inputs, .. } if inputs.is_empty())
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            PlanNode::Table { .. }
                | PlanNode::File { .. }
                | PlanNode::Builtin { .. }
                | PlanNode::Placeholder { .. }
        )
    }

    /// Producer id carried by this node, if it binds placeholders
    pub fn producer_id(&self) -> Option<NodeId> {
        match self {
            PlanNode::Recursion { id, .. }
            | PlanNode::SortRecursion { id, .. }
            | PlanNode::Materialization { id, .. }
            | PlanNode::MultiOutput { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Index of the child in which this producer's placeholders are valid
    pub fn scope_child(&self) -> Option<usize> {
        self.producer_id().map(|_| 1)
    }

    pub fn is_recursion(&self) -> bool {
        matches!(
            self,
            PlanNode::Recursion { .. } | PlanNode::SortRecursion { .. }
        )
    }

    /// Whether the output is sorted on all columns without duplicates
    pub fn is_sorted_unique(&self) -> bool {
        match self {
            PlanNode::Sort { columns: None, .. } | PlanNode::SortRecursion { .. } => true,
            PlanNode::Union { inputs, .. } => inputs.iter().all(PlanNode::is_sorted_unique),
            _ => false,
        }
    }

    /// Wrap in a full unique sort unless already sorted that way
    pub fn into_sorted_unique(self) -> PlanNode {
        if self.is_sorted_unique() {
            self
        } else {
            self.sort(None)
        }
    }

    pub fn max_producer_id(&self) -> Option<NodeId> {
        let own = match self {
            PlanNode::Placeholder { producer, .. } => Some(*producer),
            _ => self.producer_id(),
        };
        self.children()
            .into_iter()
            .filter_map(PlanNode::max_producer_id)
            .chain(own)
            .max()
    }

    /// Variant name, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            PlanNode::Table { .. } => "Table",
            PlanNode::File { .. } => "File",
            PlanNode::Builtin { .. } => "Builtin",
            PlanNode::Project { .. } => "Project",
            PlanNode::ConstEq { .. } => "ConstEq",
            PlanNode::VarEq { .. } => "VarEq",
            PlanNode::Join { .. } => "Join",
            PlanNode::AntiJoin { .. } => "AntiJoin",
            PlanNode::Union { .. } => "Union",
            PlanNode::Sort { .. } => "Sort",
            PlanNode::CombinedColumn { .. } => "CombinedColumn",
            PlanNode::SortJoin { .. } => "SortJoin",
            PlanNode::SortAntiJoin { .. } => "SortAntiJoin",
            PlanNode::MultiFilter { .. } => "MultiFilter",
            PlanNode::MultiOutput { .. } => "MultiOutput",
            PlanNode::Recursion { .. } => "Recursion",
            PlanNode::SortRecursion { .. } => "SortRecursion",
            PlanNode::Materialization { .. } => "Materialization",
            PlanNode::Placeholder { .. } => "Placeholder",
        }
    }

    /// Pretty-print the plan for debugging
    pub fn pretty_print(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);
        let header = match self {
            PlanNode::Table { name, arity } => format!("Table({name}/{arity})"),
            PlanNode::File { path, arity } => format!("File({path}/{arity})"),
            PlanNode::Builtin { command, arity } => format!("Builtin({command:?}/{arity})"),
            PlanNode::Project { items, .. } => {
                let items: Vec<String> = items.iter().map(ToString::to_string).collect();
                format!("Project({})", items.join(", "))
            }
            PlanNode::ConstEq { column, value, .. } => format!("ConstEq(${column} = {value:?})"),
            PlanNode::VarEq { left, right, .. } => format!("VarEq(${left} = ${right})"),
            PlanNode::Join {
                left_keys,
                right_keys,
                ..
            } => format!("Join(left_keys={left_keys:?}, right_keys={right_keys:?})"),
            PlanNode::AntiJoin {
                left_keys,
                right_keys,
                ..
            } => format!("AntiJoin(left_keys={left_keys:?}, right_keys={right_keys:?})"),
            PlanNode::Union { inputs, arity } if inputs.is_empty() => format!("Empty/{arity}"),
            PlanNode::Union { .. } => "Union".to_string(),
            PlanNode::Sort { columns, .. } => match columns {
                Some(cols) => format!("Sort({cols:?})"),
                None => "Sort(all, unique)".to_string(),
            },
            PlanNode::CombinedColumn { columns, .. } => format!("CombinedColumn({columns:?})"),
            PlanNode::SortJoin {
                left_key,
                right_key,
                output,
                ..
            } => {
                let out: Vec<String> = output
                    .iter()
                    .map(|c| match c.side {
                        Side::Left => format!("1.{}", c.column),
                        Side::Right => format!("2.{}", c.column),
                    })
                    .collect();
                format!("SortJoin({left_key} = {right_key}, out={})", out.join(","))
            }
            PlanNode::SortAntiJoin {
                left_key,
                right_key,
                ..
            } => format!("SortAntiJoin({left_key} = {right_key})"),
            PlanNode::MultiFilter { branches, .. } => {
                let b: Vec<String> = branches.iter().map(ToString::to_string).collect();
                format!("MultiFilter({})", b.join(" | "))
            }
            PlanNode::MultiOutput { id, branches, .. } => {
                let b: Vec<String> = branches.iter().map(ToString::to_string).collect();
                format!("MultiOutput{id}({})", b.join(" | "))
            }
            PlanNode::Recursion { id, .. } => format!("Recursion{id}"),
            PlanNode::SortRecursion { id, .. } => format!("SortRecursion{id}"),
            PlanNode::Materialization { id, reuse, .. } => {
                format!("Materialization{id}(reuse={reuse})")
            }
            PlanNode::Placeholder {
                producer,
                role,
                arity,
            } => format!("Placeholder{producer}({role}/{arity})"),
        };

        let mut out = format!("{prefix}{header}");
        for child in self.children() {
            out.push('\n');
            out.push_str(&child.pretty_print(indent + 1));
        }
        out
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty_print(0))
    }
}
