//! Command segmentation
//!
//! Splits a multi-statement script into an ordered list of commands with
//! absolute offsets. Boundaries are found on the token stream so separators
//! inside string literals, comments and bracketed sub-expressions are never
//! mistaken for command boundaries. When in doubt, segmentation does not
//! split.

use crate::lexer::{tokenize, Lexer, Token, TokenKind};
use serde::{Deserialize, Serialize};

/// How query commands are separated from each other
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandSeparator {
    /// One or more blank lines end a command (Kusto scripts)
    #[default]
    BlankLine,
    /// A top-level `;` ends a query command
    Semicolon,
}

/// Classification of a command by its first significant token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandKind {
    /// A `#` directive interpreted by the client, e.g. `#connect`
    ClientDirective,
    /// A `.` control command, e.g. `.show tables`
    AdminCommand,
    /// A query statement block
    Query,
}

/// One command of a script with its absolute `[start, end)` span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// The exact document text in `[absolute_start, absolute_end)`
    pub text: String,
    /// Offset of the command's first non-whitespace character
    pub absolute_start: usize,
    /// Offset where the next command starts, or the end of the document
    pub absolute_end: usize,
    /// Command kind
    pub kind: CommandKind,
}

impl Command {
    /// The command text without the separator whitespace that trails it
    #[must_use]
    pub fn content(&self) -> &str {
        self.text.trim_end()
    }

    /// Whether `offset` lies in `[absolute_start, absolute_end)`
    #[must_use]
    pub fn contains(&self, offset: usize) -> bool {
        self.absolute_start <= offset && offset < self.absolute_end
    }
}

/// A command's text with leading comments removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrippedCommand {
    /// Text starting at the first significant token
    pub text: String,
    /// Offset of `text` within the input it was taken from
    pub offset: usize,
}

fn first_significant(text: &str) -> Option<Token> {
    Lexer::new(text).find(|t| !t.is_trivia())
}

fn classify_token(token: Option<&Token>) -> CommandKind {
    match token.map(|t| t.kind) {
        Some(TokenKind::Punctuation('#')) => CommandKind::ClientDirective,
        Some(TokenKind::Punctuation('.')) => CommandKind::AdminCommand,
        _ => CommandKind::Query,
    }
}

/// Classify the text of a single command
#[must_use]
pub fn classify(text: &str) -> CommandKind {
    classify_token(first_significant(text).as_ref())
}

fn strip_if(text: &str, kind: CommandKind) -> Option<StrippedCommand> {
    let first = first_significant(text)?;
    (classify_token(Some(&first)) == kind).then(|| StrippedCommand {
        text: text[first.start..].to_string(),
        offset: first.start,
    })
}

/// Match a client directive, stripping any leading comment lines
#[must_use]
pub fn client_directive(text: &str) -> Option<StrippedCommand> {
    strip_if(text, CommandKind::ClientDirective)
}

/// Match an admin command, stripping any leading comment lines
#[must_use]
pub fn admin_command(text: &str) -> Option<StrippedCommand> {
    strip_if(text, CommandKind::AdminCommand)
}

/// Index of the token where the command starting at `from` stops
///
/// The returned token (if any) is separator whitespace or the first token
/// of the next command.
fn command_end(
    text: &str,
    tokens: &[Token],
    from: usize,
    kind: CommandKind,
    separator: CommandSeparator,
) -> usize {
    if kind == CommandKind::ClientDirective {
        // A directive is a single line
        return tokens[from..]
            .iter()
            .position(|t| t.line_breaks(text) > 0)
            .map_or(tokens.len(), |idx| from + idx);
    }

    let splits_on_blank_line =
        kind == CommandKind::AdminCommand || separator == CommandSeparator::BlankLine;
    let splits_on_semicolon =
        kind == CommandKind::Query && separator == CommandSeparator::Semicolon;

    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(from) {
        if token.opens_bracket() {
            depth += 1;
        } else if token.closes_bracket() {
            depth = depth.saturating_sub(1);
        } else if depth == 0 {
            if splits_on_semicolon && token.is_punct(';') {
                return idx + 1;
            }
            if splits_on_blank_line && token.line_breaks(text) >= 2 {
                return idx;
            }
        }
    }
    tokens.len()
}

/// Split `text` into commands
///
/// The commands are ordered, non-overlapping and contiguous: each one runs
/// from its first non-whitespace character to the start of the next, and
/// the last one runs to the end of the text. Only leading whitespace is
/// left uncovered. An unterminated trailing command still spans to the
/// end of the text.
#[must_use]
pub fn segment(text: &str, separator: CommandSeparator) -> Vec<Command> {
    let tokens = tokenize(text);
    let mut starts: Vec<(usize, CommandKind)> = Vec::new();

    let mut idx = 0;
    while idx < tokens.len() {
        if tokens[idx].kind == TokenKind::Whitespace {
            idx += 1;
            continue;
        }
        let first = tokens[idx..]
            .iter()
            .position(|t| !t.is_trivia())
            .map(|pos| idx + pos);
        let leading_blank = tokens[idx..first.unwrap_or(tokens.len())]
            .iter()
            .position(|t| t.line_breaks(text) >= 2)
            .map(|pos| idx + pos);

        let (kind, end) = match (leading_blank, first) {
            // Comment-only block followed by a blank line
            (Some(blank), _) => (CommandKind::Query, blank),
            (None, None) => (CommandKind::Query, tokens.len()),
            (None, Some(first)) => {
                let kind = classify_token(Some(&tokens[first]));
                let scan_from = if kind == CommandKind::ClientDirective {
                    first
                } else {
                    idx
                };
                (kind, command_end(text, &tokens, scan_from, kind, separator))
            }
        };
        starts.push((tokens[idx].start, kind));
        idx = end.max(idx + 1);
    }

    let ends = starts
        .iter()
        .skip(1)
        .map(|(start, _)| *start)
        .chain(std::iter::once(text.len()));
    let commands: Vec<Command> = starts
        .iter()
        .zip(ends)
        .map(|(&(start, kind), end)| Command {
            text: text[start..end].to_string(),
            absolute_start: start,
            absolute_end: end,
            kind,
        })
        .collect();

    log::trace!("Segmented {} bytes into {} commands", text.len(), commands.len());
    commands
}

/// Index of the command containing `offset`
///
/// The last command also owns the end-of-text position so a cursor placed
/// after the final character still resolves. Offsets in leading whitespace
/// or past the end resolve to `None`.
#[must_use]
pub fn command_index_at(commands: &[Command], offset: usize) -> Option<usize> {
    let idx = commands
        .partition_point(|c| c.absolute_start <= offset)
        .checked_sub(1)?;
    let command = &commands[idx];
    let at_end = idx + 1 == commands.len() && offset == command.absolute_end;
    (command.contains(offset) || at_end).then_some(idx)
}

/// The command containing `offset`, see [`command_index_at`]
#[must_use]
pub fn command_at(commands: &[Command], offset: usize) -> Option<&Command> {
    command_index_at(commands, offset).map(|idx| &commands[idx])
}
