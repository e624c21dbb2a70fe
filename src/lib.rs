//! KQL Language Worker
//!
//! The editor-side core of a Kusto (KQL) language integration. Given the
//! text of a script, a cursor offset and a schema description, it answers
//! the questions an editor asks on every keystroke or hover.
//!
//! ## Features
//!
//! - **Segmentation**: Split a multi-statement script into commands with
//!   absolute offsets (queries, `.` admin commands, `#` client directives)
//! - **Parameter Scopes**: Declared (`declare query_parameters`), ambient
//!   and referenced ambient parameters for the command at the cursor
//! - **Schema Normalization**: Turn the several `.show schema` payload shapes
//!   into one typed [`Schema`] model
//! - **Render Directives**: Typed options of a trailing `| render` clause
//! - **Validation**: A pluggable rule pipeline restricted to requested
//!   intervals
//!
//! ## Usage
//!
//! ```
//! use kql_language_worker::{KustoWorker, LanguageSettings};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> kql_language_worker::Result<()> {
//!     let worker = KustoWorker::new(LanguageSettings::default());
//!     worker
//!         .set_document("inmemory://model/1", "StormEvents | take 10\n\nStormEvents | count")
//!         .await;
//!
//!     for command in worker.get_commands_in_document("inmemory://model/1").await? {
//!         println!("{}..{}: {}", command.absolute_start, command.absolute_end, command.content());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Offsets
//!
//! All offsets are byte offsets into the document text. Line/character
//! positions (0-based, UTF-16 characters) are converted with
//! [`KustoWorker::offset_at`] and reported in [`CommandLocation`].

mod document;
mod error;
mod lexer;
mod normalize;
mod parameters;
mod position;
mod render;
mod schema;
mod segmenter;
mod settings;
mod store;
mod types;
mod validation;
mod worker;

pub use document::Document;
pub use error::Error;
pub use lexer::{tokenize, Token, TokenKind};
pub use normalize::{kql_type_for, normalize_schema};
pub use parameters::{declared_parameters, free_identifiers, parse_declarations, referenced_globals};
pub use position::{Interval, LineIndex, Position, Range};
pub use render::{
    parse_render_directive, render_info, LegendVisibility, RejectedOption, RenderDirective,
    RenderInfo, RenderLocation, RenderOptions, Scale, StackKind, UnrecognizedValue,
    VisualizationKind, YSplit,
};
pub use schema::{
    Cluster, ClusterManagerSchema, Column, DataManagementSchema, Database, EngineSchema, Function,
    InputParameter, ScalarParameter, Schema, Table, TableEntityType, TabularParameter,
};
pub use segmenter::{
    admin_command, classify, client_directive, command_at, command_index_at, segment, Command,
    CommandKind, CommandSeparator, StrippedCommand,
};
pub use settings::{LanguageSettings, DEFAULT_MAXIMUM_WORKER_IDLE_TIME};
pub use store::{SchemaSnapshot, SchemaStore};
pub use types::{Diagnostic, DiagnosticSeverity, ValidationResult};
pub use validation::{
    DiagnosticRule, InvalidRenderOptionRule, RuleContext, UnbalancedBracketRule,
    UnterminatedStringRule, ValidationPipeline,
};
pub use worker::{CommandLocation, KustoWorker};

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
