//! Render directive extraction
//!
//! Finds the trailing `| render <kind> with (...)` clause of a query and
//! turns it into [`RenderOptions`]. Every option is always present in the
//! result; options that are absent or whose value is not acceptable are
//! `None` (serialized as `null`). Unknown option names are ignored.

use crate::lexer::{significant_tokens, unquote, Token, TokenKind};
use crate::position::Interval;
use crate::segmenter::Command;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// A value outside an option's closed set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized value '{0}'")]
pub struct UnrecognizedValue(pub String);

/// Chart kind requested by `render`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationKind {
    AnomalyChart,
    AreaChart,
    BarChart,
    ColumnChart,
    LadderChart,
    LineChart,
    PieChart,
    PivotChart,
    ScatterChart,
    StackedAreaChart,
    TimeChart,
    Table,
    Timeline,
    TimePivot,
    Card,
}

impl FromStr for VisualizationKind {
    type Err = UnrecognizedValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "anomalychart" => Self::AnomalyChart,
            "areachart" => Self::AreaChart,
            "barchart" => Self::BarChart,
            "columnchart" => Self::ColumnChart,
            "ladderchart" => Self::LadderChart,
            "linechart" => Self::LineChart,
            "piechart" => Self::PieChart,
            "pivotchart" => Self::PivotChart,
            "scatterchart" => Self::ScatterChart,
            "stackedareachart" => Self::StackedAreaChart,
            "timechart" => Self::TimeChart,
            "table" => Self::Table,
            "timeline" => Self::Timeline,
            "timepivot" => Self::TimePivot,
            "card" => Self::Card,
            _ => return Err(UnrecognizedValue(s.to_string())),
        })
    }
}

/// Axis scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Linear,
    Log,
}

impl FromStr for Scale {
    type Err = UnrecognizedValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "log" => Ok(Self::Log),
            _ => Err(UnrecognizedValue(s.to_string())),
        }
    }
}

/// Legend visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegendVisibility {
    Visible,
    Hidden,
}

impl FromStr for LegendVisibility {
    type Err = UnrecognizedValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "visible" => Ok(Self::Visible),
            "hidden" => Ok(Self::Hidden),
            _ => Err(UnrecognizedValue(s.to_string())),
        }
    }
}

/// How multiple y-axis series are split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YSplit {
    None,
    Axes,
    Panels,
}

impl FromStr for YSplit {
    type Err = UnrecognizedValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "axes" => Ok(Self::Axes),
            "panels" => Ok(Self::Panels),
            _ => Err(UnrecognizedValue(s.to_string())),
        }
    }
}

/// Stacking kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackKind {
    Default,
    Unstacked,
    Stacked,
    Stacked100,
    Map,
}

impl FromStr for StackKind {
    type Err = UnrecognizedValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "unstacked" => Ok(Self::Unstacked),
            "stacked" => Ok(Self::Stacked),
            "stacked100" => Ok(Self::Stacked100),
            "map" => Ok(Self::Map),
            _ => Err(UnrecognizedValue(s.to_string())),
        }
    }
}

/// Visualization options of a render directive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub visualization: Option<VisualizationKind>,
    pub title: Option<String>,
    pub xcolumn: Option<String>,
    pub series: Option<Vec<String>>,
    pub ycolumns: Option<Vec<String>>,
    pub xtitle: Option<String>,
    pub ytitle: Option<String>,
    pub xaxis: Option<Scale>,
    pub yaxis: Option<Scale>,
    pub legend: Option<LegendVisibility>,
    #[serde(rename = "ySplit")]
    pub y_split: Option<YSplit>,
    pub accumulate: Option<bool>,
    pub kind: Option<StackKind>,
    pub anomalycolumns: Option<Vec<String>>,
    pub ymin: Option<f64>,
    pub ymax: Option<f64>,
}

/// Absolute `[start_offset, end_offset)` of a render directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderLocation {
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Options of a render directive and the directive's own span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderInfo {
    pub options: RenderOptions,
    pub location: RenderLocation,
}

/// An option value that was present but normalized to `None`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedOption {
    /// Option name, lowercase (`visualization` for the chart kind)
    pub key: String,
    /// The offending value text
    pub value: String,
    /// Span of the value, relative to the parsed source
    pub span: Interval,
}

/// Result of parsing one render directive
#[derive(Debug, Clone, PartialEq)]
pub struct RenderDirective {
    pub options: RenderOptions,
    /// Span of the directive, relative to the parsed source
    pub span: Interval,
    pub rejected: Vec<RejectedOption>,
}

/// One option value with its span
#[derive(Debug, Clone)]
struct OptionValue {
    text: String,
    span: Interval,
}

fn option_value(source: &str, token: &Token) -> OptionValue {
    let raw = token.text(source);
    let text = match token.kind {
        TokenKind::String { .. } => unquote(raw),
        _ => raw.to_string(),
    };
    OptionValue {
        text,
        span: Interval::new(token.start, token.end),
    }
}

/// Index of the `render` keyword of the trailing top-level `| render`
fn find_render(source: &str, tokens: &[Token]) -> Option<usize> {
    let mut depth = 0usize;
    let mut found = None;
    for (idx, token) in tokens.iter().enumerate() {
        if token.opens_bracket() {
            depth += 1;
        } else if token.closes_bracket() {
            depth = depth.saturating_sub(1);
        } else if depth == 0
            && token.is_word(source, "render")
            && idx > 0
            && tokens[idx - 1].is_punct('|')
        {
            found = Some(idx);
        }
    }
    found
}

/// Collect `key = value` pairs inside `with (...)`, starting after `(`
///
/// Bare values after a comma extend the previous key's list, so both
/// `ycolumns=a, b` and `ycolumns=(a, b)` yield two columns. Returns the
/// pairs and the index of the first token after the list.
fn collect_properties(
    source: &str,
    tokens: &[Token],
    mut idx: usize,
) -> (Vec<(String, Vec<OptionValue>)>, usize) {
    let mut properties: Vec<(String, Vec<OptionValue>)> = Vec::new();
    let mut depth = 0usize;

    while let Some(token) = tokens.get(idx) {
        idx += 1;
        if token.opens_bracket() {
            depth += 1;
            continue;
        }
        if token.closes_bracket() {
            if depth == 0 {
                break;
            }
            depth -= 1;
            continue;
        }
        if token.is_punct(',') {
            continue;
        }

        let is_key = depth == 0
            && token.kind == TokenKind::Identifier
            && tokens.get(idx).is_some_and(|next| next.is_punct('='));
        if is_key {
            properties.push((token.text(source).to_ascii_lowercase(), Vec::new()));
            idx += 1;
            continue;
        }

        let Some((_, values)) = properties.last_mut() else {
            continue;
        };
        let signed = token.is_punct('-') || token.is_punct('+');
        match tokens.get(idx) {
            Some(number) if signed && number.kind == TokenKind::Number => {
                let mut value = option_value(source, number);
                value.text.insert_str(0, token.text(source));
                value.span = Interval::new(token.start, number.end);
                values.push(value);
                idx += 1;
            }
            _ => values.push(option_value(source, token)),
        }
    }
    (properties, idx)
}

fn single(values: Vec<OptionValue>) -> Option<String> {
    values.into_iter().next().map(|v| v.text)
}

fn list(values: Vec<OptionValue>) -> Option<Vec<String>> {
    if values.is_empty() {
        return None;
    }
    Some(values.into_iter().map(|v| v.text).collect())
}

/// Parse a value, recording it as rejected when it does not parse
fn parsed<T: FromStr>(key: &str, values: &[OptionValue], rejected: &mut Vec<RejectedOption>) -> Option<T> {
    let value = values.first()?;
    let parsed = value.text.trim().parse().ok();
    if parsed.is_none() {
        rejected.push(RejectedOption {
            key: key.to_string(),
            value: value.text.clone(),
            span: value.span,
        });
    }
    parsed
}

/// Parse an axis bound; `nan` and infinities are rejected
fn finite(key: &str, values: &[OptionValue], rejected: &mut Vec<RejectedOption>) -> Option<f64> {
    let value = values.first()?;
    let parsed = value.text.trim().parse::<f64>().ok().filter(|v| v.is_finite());
    if parsed.is_none() {
        rejected.push(RejectedOption {
            key: key.to_string(),
            value: value.text.clone(),
            span: value.span,
        });
    }
    parsed
}

fn apply(
    options: &mut RenderOptions,
    key: &str,
    values: Vec<OptionValue>,
    rejected: &mut Vec<RejectedOption>,
) {
    match key {
        "title" => options.title = single(values),
        "xcolumn" => options.xcolumn = single(values),
        "xtitle" => options.xtitle = single(values),
        "ytitle" => options.ytitle = single(values),
        "series" => options.series = list(values),
        "ycolumns" => options.ycolumns = list(values),
        "anomalycolumns" => options.anomalycolumns = list(values),
        "xaxis" => options.xaxis = parsed(key, &values, rejected),
        "yaxis" => options.yaxis = parsed(key, &values, rejected),
        "legend" => options.legend = parsed(key, &values, rejected),
        "ysplit" => options.y_split = parsed(key, &values, rejected),
        "kind" => options.kind = parsed(key, &values, rejected),
        "accumulate" => options.accumulate = parsed(key, &values, rejected),
        "ymin" => options.ymin = finite(key, &values, rejected),
        "ymax" => options.ymax = finite(key, &values, rejected),
        _ => log::trace!("Ignoring unknown render option '{key}'"),
    }
}

/// Parse the trailing render directive of a query text
#[must_use]
pub fn parse_render_directive(source: &str) -> Option<RenderDirective> {
    let tokens = significant_tokens(source);
    let render = find_render(source, &tokens)?;

    let mut options = RenderOptions::default();
    let mut rejected = Vec::new();
    let mut end = tokens[render].end;
    let mut idx = render + 1;

    if let Some(kind) = tokens.get(idx).filter(|t| t.kind == TokenKind::Identifier) {
        let value = option_value(source, kind);
        options.visualization = parsed("visualization", &[value], &mut rejected);
        end = kind.end;
        idx += 1;
    }

    if let Some(with) = tokens.get(idx).filter(|t| t.is_word(source, "with")) {
        end = with.end;
        idx += 1;
        if let Some(open) = tokens.get(idx).filter(|t| t.is_punct('(')) {
            end = open.end;
            let (properties, next) = collect_properties(source, &tokens, idx + 1);
            if let Some(last) = tokens[..next.min(tokens.len())].last() {
                end = end.max(last.end);
            }
            for (key, values) in properties {
                apply(&mut options, &key, values, &mut rejected);
            }
        }
    }

    Some(RenderDirective {
        options,
        span: Interval::new(tokens[render].start, end),
        rejected,
    })
}

/// Render info of a command, with the directive located in the document
#[must_use]
pub fn render_info(command: &Command) -> Option<RenderInfo> {
    let directive = parse_render_directive(&command.text)?;
    Some(RenderInfo {
        options: directive.options,
        location: RenderLocation {
            start_offset: command.absolute_start + directive.span.start,
            end_offset: command.absolute_start + directive.span.end,
        },
    })
}
