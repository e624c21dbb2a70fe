//! Validation pipeline
//!
//! Runs a set of [`DiagnosticRule`]s over the commands of a document that
//! intersect the requested intervals. Rules see the same segmentation,
//! schema and parameter scopes as every other worker query, and report
//! spans in document offsets. Diagnostics outside every requested interval
//! are dropped.

use crate::document::Document;
use crate::lexer::{significant_tokens, tokenize, TokenKind};
use crate::parameters::extend_scope;
use crate::position::Interval;
use crate::render::parse_render_directive;
use crate::schema::{InputParameter, ScalarParameter, Schema};
use crate::segmenter::{Command, CommandKind};
use crate::store::SchemaSnapshot;
use crate::types::{Diagnostic, ValidationResult};

/// What a rule sees for one command
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Full document text
    pub text: &'a str,
    /// The command being checked; its offsets are absolute
    pub command: &'a Command,
    pub schema: &'a Schema,
    /// Ambient parameters
    pub global_parameters: &'a [ScalarParameter],
    /// Parameters declared from the start of the document through `command`
    pub declared_parameters: &'a [InputParameter],
}

/// A check producing diagnostics for one command
pub trait DiagnosticRule: Send + Sync {
    /// Stable rule name, reported as the diagnostic code
    fn name(&self) -> &'static str;

    /// Append diagnostics for `ctx.command`, using document offsets
    fn check(&self, ctx: &RuleContext<'_>, diagnostics: &mut Vec<Diagnostic>);
}

/// String literals missing their closing quote or fence
#[derive(Debug, Default, Clone, Copy)]
pub struct UnterminatedStringRule;

impl DiagnosticRule for UnterminatedStringRule {
    fn name(&self) -> &'static str {
        "unterminated-string"
    }

    fn check(&self, ctx: &RuleContext<'_>, diagnostics: &mut Vec<Diagnostic>) {
        let base = ctx.command.absolute_start;
        for token in tokenize(&ctx.command.text) {
            if matches!(token.kind, TokenKind::String { terminated: false }) {
                diagnostics.push(
                    Diagnostic::error(
                        "Unterminated string literal",
                        base + token.start,
                        base + token.end,
                    )
                    .with_code(self.name()),
                );
            }
        }
    }
}

/// Brackets without a matching partner
#[derive(Debug, Default, Clone, Copy)]
pub struct UnbalancedBracketRule;

fn partner(close: char) -> char {
    match close {
        ')' => '(',
        ']' => '[',
        _ => '{',
    }
}

impl DiagnosticRule for UnbalancedBracketRule {
    fn name(&self) -> &'static str {
        "unbalanced-bracket"
    }

    fn check(&self, ctx: &RuleContext<'_>, diagnostics: &mut Vec<Diagnostic>) {
        let base = ctx.command.absolute_start;
        let mut open: Vec<(char, usize, usize)> = Vec::new();

        for token in significant_tokens(&ctx.command.text) {
            let TokenKind::Punctuation(ch) = token.kind else {
                continue;
            };
            if token.opens_bracket() {
                open.push((ch, token.start, token.end));
            } else if token.closes_bracket() {
                if open.last().is_some_and(|(o, _, _)| *o == partner(ch)) {
                    open.pop();
                } else {
                    diagnostics.push(
                        Diagnostic::error(
                            format!("Unexpected '{ch}'"),
                            base + token.start,
                            base + token.end,
                        )
                        .with_code(self.name()),
                    );
                }
            }
        }

        for (ch, start, end) in open {
            diagnostics.push(
                Diagnostic::error(format!("Unclosed '{ch}'"), base + start, base + end)
                    .with_code(self.name()),
            );
        }
    }
}

/// Render options whose value is outside the option's accepted values
#[derive(Debug, Default, Clone, Copy)]
pub struct InvalidRenderOptionRule;

impl DiagnosticRule for InvalidRenderOptionRule {
    fn name(&self) -> &'static str {
        "invalid-render-option"
    }

    fn check(&self, ctx: &RuleContext<'_>, diagnostics: &mut Vec<Diagnostic>) {
        if ctx.command.kind != CommandKind::Query {
            return;
        }
        let Some(directive) = parse_render_directive(&ctx.command.text) else {
            return;
        };
        let base = ctx.command.absolute_start;
        for rejected in directive.rejected {
            diagnostics.push(
                Diagnostic::warning(
                    format!(
                        "'{}' is not a valid value for render option '{}'",
                        rejected.value, rejected.key
                    ),
                    base + rejected.span.start,
                    base + rejected.span.end,
                )
                .with_code(self.name()),
            );
        }
    }
}

/// Ordered set of rules applied to a document
pub struct ValidationPipeline {
    rules: Vec<Box<dyn DiagnosticRule>>,
}

impl Default for ValidationPipeline {
    /// The built-in structural rules
    fn default() -> Self {
        Self::new()
            .with_rule(UnterminatedStringRule)
            .with_rule(UnbalancedBracketRule)
            .with_rule(InvalidRenderOptionRule)
    }
}

impl std::fmt::Debug for ValidationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationPipeline")
            .field("rules", &self.rule_names().collect::<Vec<_>>())
            .finish()
    }
}

impl ValidationPipeline {
    /// A pipeline without rules
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule
    #[must_use]
    pub fn with_rule(mut self, rule: impl DiagnosticRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.name())
    }

    /// Validate the parts of `document` inside `intervals`
    ///
    /// Client directives are not checked. Diagnostics are ordered by
    /// position and carry resolved 1-based line/column values.
    #[must_use]
    pub fn validate(
        &self,
        document: &Document,
        snapshot: &SchemaSnapshot,
        intervals: &[Interval],
    ) -> ValidationResult {
        let mut diagnostics = Vec::new();
        let mut declared = Vec::new();

        for command in document.commands() {
            extend_scope(&mut declared, command);
            if command.kind == CommandKind::ClientDirective {
                continue;
            }
            let in_view = intervals
                .iter()
                .any(|i| i.intersects(command.absolute_start, command.absolute_end));
            if !in_view {
                continue;
            }

            let ctx = RuleContext {
                text: document.text(),
                command,
                schema: snapshot.schema(),
                global_parameters: snapshot.parameters(),
                declared_parameters: &declared,
            };
            let mut found = Vec::new();
            for rule in &self.rules {
                rule.check(&ctx, &mut found);
            }
            diagnostics.extend(
                found
                    .into_iter()
                    .filter(|d| intervals.iter().any(|i| i.intersects(d.start, d.end))),
            );
        }

        for diagnostic in &mut diagnostics {
            let start = document.position_at(diagnostic.start);
            let end = document.position_at(diagnostic.end);
            diagnostic.line = start.line as usize + 1;
            diagnostic.column = start.character as usize + 1;
            diagnostic.end_line = end.line as usize + 1;
            diagnostic.end_column = end.character as usize + 1;
        }
        diagnostics.sort_by_key(|d| (d.start, d.end));

        log::trace!(
            "Validated '{}' over {} intervals: {} diagnostics",
            document.uri(),
            intervals.len(),
            diagnostics.len()
        );
        ValidationResult::from_diagnostics(diagnostics)
    }
}
