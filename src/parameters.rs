//! Query parameter scopes
//!
//! Three views over the parameters visible to a command:
//!
//! - declared: introduced by `declare query_parameters(...)` statements in
//!   the script, from the start of the document through the command at the
//!   cursor, later declarations replacing earlier ones of the same name
//! - ambient: supplied by the host, see [`crate::store::SchemaStore`]
//! - referenced: ambient parameters used as free identifiers by one
//!   command and not shadowed by a declared parameter

use crate::lexer::{significant_tokens, Token, TokenKind};
use crate::schema::{InputParameter, ScalarParameter, TabularParameter};
use crate::segmenter::{Command, CommandKind};
use std::collections::HashSet;

/// Cursor over the significant tokens of one command
struct TokenCursor<'a> {
    source: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenCursor<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn eat_punct(&mut self, ch: char) -> bool {
        let matched = self.peek().is_some_and(|t| t.is_punct(ch));
        if matched {
            self.pos += 1;
        }
        matched
    }

    fn identifier(&mut self) -> Option<&'a str> {
        let token = self.peek().filter(|t| t.kind == TokenKind::Identifier)?;
        self.pos += 1;
        Some(token.text(self.source))
    }

    /// Skip to the next `,` or `)` at the current nesting level; the
    /// delimiter is not consumed. Returns the span of the skipped tokens.
    fn skip_to_delimiter(&mut self) -> Option<(usize, usize)> {
        let mut depth = 0usize;
        let mut span: Option<(usize, usize)> = None;
        while let Some(token) = self.peek() {
            if depth == 0 && (token.is_punct(',') || token.closes_bracket()) {
                break;
            }
            if token.opens_bracket() {
                depth += 1;
            } else if token.closes_bracket() {
                depth -= 1;
            }
            span = Some((span.map_or(token.start, |(start, _)| start), token.end));
            self.pos += 1;
        }
        span
    }

    /// `name: type` pairs of a tabular parameter's column list, after `(`
    fn column_list(&mut self) -> Vec<ScalarParameter> {
        let mut columns = Vec::new();
        loop {
            if self.eat_punct(',') {
                continue;
            }
            if self.peek().map_or(true, Token::closes_bracket) {
                self.bump();
                return columns;
            }
            match (self.identifier(), self.eat_punct(':')) {
                (Some(name), true) => {
                    if let Some(csl_type) = self.identifier() {
                        columns.push(ScalarParameter::typed(name, csl_type));
                    }
                }
                // `*` wildcards and malformed entries
                _ => {
                    self.skip_to_delimiter();
                }
            }
        }
    }

    /// Parameters of a declaration list, after `(`
    fn parameter_list(&mut self) -> Vec<InputParameter> {
        let mut parameters = Vec::new();
        loop {
            if self.eat_punct(',') {
                continue;
            }
            if self.peek().map_or(true, Token::closes_bracket) {
                self.bump();
                return parameters;
            }
            let Some(name) = self.identifier() else {
                self.skip_to_delimiter();
                continue;
            };
            if !self.eat_punct(':') {
                self.skip_to_delimiter();
                continue;
            }
            let parameter = if self.eat_punct('(') {
                InputParameter::Tabular(TabularParameter {
                    name: name.to_string(),
                    columns: self.column_list(),
                })
            } else {
                let mut scalar = match self.identifier() {
                    Some(csl_type) => ScalarParameter::typed(name, csl_type),
                    None => ScalarParameter::new(name),
                };
                if self.eat_punct('=') {
                    scalar.csl_default_value = self
                        .skip_to_delimiter()
                        .map(|(start, end)| self.source[start..end].to_string());
                }
                InputParameter::Scalar(scalar)
            };
            self.skip_to_delimiter();
            parameters.push(parameter);
        }
    }
}

/// Parameters declared in one command, in declaration order
///
/// Duplicates are kept; [`declared_parameters`] applies shadowing.
#[must_use]
pub fn parse_declarations(source: &str) -> Vec<InputParameter> {
    let tokens = significant_tokens(source);
    let mut declared = Vec::new();
    let mut depth = 0usize;
    let mut idx = 0;
    while idx < tokens.len() {
        let token = &tokens[idx];
        if token.opens_bracket() {
            depth += 1;
        } else if token.closes_bracket() {
            depth = depth.saturating_sub(1);
        } else if depth == 0
            && token.is_word(source, "declare")
            && tokens.get(idx + 1).is_some_and(|t| t.is_word(source, "query_parameters"))
            && tokens.get(idx + 2).is_some_and(|t| t.is_punct('('))
        {
            let mut cursor = TokenCursor {
                source,
                tokens: &tokens,
                pos: idx + 3,
            };
            declared.extend(cursor.parameter_list());
            idx = cursor.pos;
            continue;
        }
        idx += 1;
    }
    declared
}

/// Add `parameter`, replacing an earlier one of the same name in place
fn shadow(scope: &mut Vec<InputParameter>, parameter: InputParameter) {
    match scope.iter_mut().find(|p| p.name() == parameter.name()) {
        Some(existing) => *existing = parameter,
        None => scope.push(parameter),
    }
}

/// Add the declarations of `command` to `scope`
pub(crate) fn extend_scope(scope: &mut Vec<InputParameter>, command: &Command) {
    if command.kind != CommandKind::Query {
        return;
    }
    for parameter in parse_declarations(&command.text) {
        shadow(scope, parameter);
    }
}

/// Parameters declared by `commands[..=through]`, last declaration wins
#[must_use]
pub fn declared_parameters(commands: &[Command], through: usize) -> Vec<InputParameter> {
    let mut scope = Vec::new();
    for command in commands.iter().take(through.saturating_add(1)) {
        extend_scope(&mut scope, command);
    }
    scope
}

/// Identifiers used as free variables in a command
///
/// Excludes names bound by `let`, names followed by `=` or `:` (column
/// assignments, named arguments, parameter declarations) and member names
/// after `.`.
#[must_use]
pub fn free_identifiers(source: &str) -> HashSet<&str> {
    let tokens = significant_tokens(source);
    let let_bound: HashSet<&str> = tokens
        .windows(2)
        .filter(|pair| pair[0].is_word(source, "let") && pair[1].kind == TokenKind::Identifier)
        .map(|pair| pair[1].text(source))
        .collect();
    let lambda_bound = lambda_parameters(source, &tokens);

    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.kind == TokenKind::Identifier)
        .filter(|(idx, _)| {
            let after_dot = idx
                .checked_sub(1)
                .is_some_and(|prev| tokens[prev].is_punct('.'));
            let bound = tokens
                .get(idx + 1)
                .is_some_and(|next| next.is_punct('=') || next.is_punct(':'));
            !after_dot && !bound
        })
        .map(|(_, t)| t.text(source))
        .filter(|name| !let_bound.contains(name) && !lambda_bound.contains(name))
        .collect()
}

/// Parameter names of `let name = (p:type, ...)` lambdas
fn lambda_parameters<'s>(source: &'s str, tokens: &[Token]) -> HashSet<&'s str> {
    let mut names = HashSet::new();
    for (idx, token) in tokens.iter().enumerate() {
        let is_lambda = token.is_word(source, "let")
            && tokens.get(idx + 1).is_some_and(|t| t.kind == TokenKind::Identifier)
            && tokens.get(idx + 2).is_some_and(|t| t.is_punct('='))
            && tokens.get(idx + 3).is_some_and(|t| t.is_punct('('));
        if !is_lambda {
            continue;
        }
        let mut depth = 0usize;
        for (pos, inner) in tokens.iter().enumerate().skip(idx + 3) {
            if inner.opens_bracket() {
                depth += 1;
            } else if inner.closes_bracket() {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            } else if depth == 1
                && inner.kind == TokenKind::Identifier
                && tokens.get(pos + 1).is_some_and(|next| next.is_punct(':'))
            {
                names.insert(inner.text(source));
            }
        }
    }
    names
}

/// Ambient parameters referenced by `source`, in ambient order
///
/// A declared parameter of the same name takes precedence, so such a name
/// is not reported.
#[must_use]
pub fn referenced_globals(
    source: &str,
    ambient: &[ScalarParameter],
    declared: &[InputParameter],
) -> Vec<ScalarParameter> {
    let used = free_identifiers(source);
    ambient
        .iter()
        .filter(|p| used.contains(p.name.as_str()))
        .filter(|p| !declared.iter().any(|d| d.name() == p.name))
        .cloned()
        .collect()
}
