//! # Script AST
//!
//! Structural representation of the generated bash program and its printer.
//! The code generator never concatenates shell text directly; it builds
//! [`Snippet`]s and lets the printer decide how a nested snippet is spliced in:
//!
//! - as a command argument, a file is passed by path and anything else through
//!   process substitution `<(...)`;
//! - at the head of a pipe or as a statement, a file becomes `cat path`;
//! - compound snippets in a pipe or under a redirection are grouped in `{ }`.

use std::fmt;

const INDENT: &str = "  ";

/// Command argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Literal text, inserted unquoted
    Text(String),
    /// Output of a nested snippet, read as a file
    Snippet(Snippet),
}

/// One program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<Arg>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Command {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append literal argument text
    pub fn arg(mut self, text: impl Into<String>) -> Self {
        self.args.push(Arg::Text(text.into()));
        self
    }

    /// Append a nested snippet read as a file
    pub fn input(mut self, snippet: Snippet) -> Self {
        self.args.push(Arg::Snippet(snippet));
        self
    }
}

impl From<Command> for Snippet {
    fn from(command: Command) -> Self {
        Snippet::Command(command)
    }
}

/// Piece of a bash script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snippet {
    Command(Command),
    /// Statements run one after the other
    Sequence(Vec<Snippet>),
    /// Stages chained through standard streams
    Pipe(Vec<Snippet>),
    /// A file path
    File(String),
    /// Verbatim shell text
    Text(String),
    /// `prefix body suffix` on one logical line, e.g. a redirection
    Wrap {
        prefix: String,
        body: Box<Snippet>,
        suffix: String,
    },
    /// `header`, the indented body, then `footer`
    Block {
        header: String,
        body: Box<Snippet>,
        footer: String,
    },
    /// `# text`, dropped wherever a statement cannot appear
    Comment(String),
}

impl Snippet {
    pub fn text(text: impl Into<String>) -> Self {
        Snippet::Text(text.into())
    }

    pub fn file(path: impl Into<String>) -> Self {
        Snippet::File(path.into())
    }

    /// `self > path`
    pub fn redirect_to(self, path: &str) -> Self {
        Snippet::Wrap {
            prefix: String::new(),
            body: Box::new(self),
            suffix: format!(" > {}", shell_word(path)),
        }
    }

    /// Feed `self` into `command`: files become an argument, anything else a
    /// pipe stage
    pub fn pipe_into(self, command: Command) -> Self {
        match self {
            Snippet::File(_) => command.input(self).into(),
            Snippet::Pipe(mut stages) => {
                stages.push(command.into());
                Snippet::Pipe(stages)
            }
            other => Snippet::Pipe(vec![other, command.into()]),
        }
    }

    fn is_compound(&self) -> bool {
        matches!(self, Snippet::Sequence(_) | Snippet::Block { .. })
    }

    /// Render as a script fragment starting at column 0
    pub fn render(&self) -> String {
        self.render_at(0)
    }

    /// Render with continuation lines indented to `indent`; the first line is
    /// left for the caller to position
    fn render_at(&self, indent: usize) -> String {
        let pad = INDENT.repeat(indent);
        match self {
            Snippet::Command(command) => render_command(command, indent),
            Snippet::Sequence(items) => items
                .iter()
                .map(|item| item.render_at(indent))
                .collect::<Vec<_>>()
                .join(&format!("\n{pad}")),
            Snippet::Pipe(stages) => {
                let stages: Vec<&Snippet> = stages
                    .iter()
                    .filter(|s| !matches!(s, Snippet::Comment(_)))
                    .collect();
                let mut out = String::new();
                for (i, stage) in stages.iter().enumerate() {
                    if i == 0 {
                        out.push_str(&stage.render_stage(indent));
                    } else {
                        out.push_str(&format!(" |\n{pad}{INDENT}"));
                        out.push_str(&stage.render_stage(indent + 1));
                    }
                }
                out
            }
            Snippet::File(path) => format!("cat {}", shell_word(path)),
            Snippet::Text(text) => text.lines().collect::<Vec<_>>().join(&format!("\n{pad}")),
            Snippet::Wrap {
                prefix,
                body,
                suffix,
            } => format!("{prefix}{}{suffix}", body.render_stage(indent)),
            Snippet::Block {
                header,
                body,
                footer,
            } => format!(
                "{header}\n{pad}{INDENT}{}\n{pad}{footer}",
                body.render_at(indent + 1)
            ),
            Snippet::Comment(text) => format!("# {text}"),
        }
    }

    /// Render in a position that takes a single command (pipe stage,
    /// redirection)
    fn render_stage(&self, indent: usize) -> String {
        if self.is_compound() {
            let pad = INDENT.repeat(indent);
            format!(
                "{{\n{pad}{INDENT}{}\n{pad}}}",
                self.render_at(indent + 1)
            )
        } else {
            self.render_at(indent)
        }
    }

    /// Render as a command argument
    fn render_argument(&self, indent: usize) -> String {
        match self {
            Snippet::File(path) => shell_word(path),
            other => format!("<({})", other.render_at(indent)),
        }
    }
}

impl fmt::Display for Snippet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

fn render_command(command: &Command, indent: usize) -> String {
    let pad = INDENT.repeat(indent + 1);
    let mut out = command.program.clone();
    for arg in &command.args {
        match arg {
            Arg::Text(text) => {
                out.push(' ');
                out.push_str(text);
            }
            Arg::Snippet(Snippet::File(path)) => {
                out.push(' ');
                out.push_str(&shell_word(path));
            }
            Arg::Snippet(snippet) => {
                out.push_str(&format!(" \\\n{pad}"));
                out.push_str(&snippet.render_argument(indent + 2));
            }
        }
    }
    out
}

/// Quote `word` for the shell unless it only contains safe characters
pub fn shell_word(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '+' | ':' | ','));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Complete script: header lines followed by the query pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub header: Vec<String>,
    pub body: Snippet,
}

impl Script {
    pub fn new(header: Vec<String>, body: Snippet) -> Self {
        Script { header, body }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.header {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body.render());
        out.push('\n');
        out
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}
