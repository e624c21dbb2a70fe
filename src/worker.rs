//! The language worker
//!
//! [`KustoWorker`] serves editor requests for a set of open documents. It
//! owns the current document snapshots, the versioned schema store and the
//! validation pipeline. Every request works on snapshots: it clones the
//! `Arc` of the document and of the schema state it needs, releases the
//! locks and computes its answer from those.
//!
//! Queries on a URI that was never registered with
//! [`KustoWorker::set_document`] fail with [`Error::UnknownDocument`]. Every
//! other miss (cursor outside any command, no render directive, ...) is an
//! empty answer.
//!
//! ```
//! use kql_language_worker::{KustoWorker, LanguageSettings, ScalarParameter};
//!
//! # async fn demo() -> kql_language_worker::Result<()> {
//! let worker = KustoWorker::new(LanguageSettings::default());
//! worker.set_parameters(vec![ScalarParameter::typed("region", "string")]).await;
//! worker.set_document("inmemory://1", "T | where Region == region").await;
//!
//! let referenced = worker.get_referenced_global_params("inmemory://1", 5).await?;
//! assert_eq!(referenced[0].name, "region");
//! # Ok(())
//! # }
//! ```

use crate::document::Document;
use crate::error::Error;
use crate::normalize;
use crate::parameters;
use crate::position::{Interval, Position, Range};
use crate::render::{self, RenderInfo};
use crate::schema::{EngineSchema, InputParameter, ScalarParameter, Schema};
use crate::segmenter::{self, Command, StrippedCommand};
use crate::settings::LanguageSettings;
use crate::store::{SchemaSnapshot, SchemaStore};
use crate::types::ValidationResult;
use crate::validation::ValidationPipeline;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A command's text and its line/character range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLocation {
    /// Command text without trailing separator whitespace
    pub text: String,
    /// Range of `text` in the document
    pub range: Range,
}

/// Editor-facing language worker
#[derive(Debug)]
pub struct KustoWorker {
    settings: LanguageSettings,
    documents: RwLock<HashMap<String, Arc<Document>>>,
    store: SchemaStore,
    pipeline: ValidationPipeline,
}

impl Default for KustoWorker {
    fn default() -> Self {
        Self::new(LanguageSettings::default())
    }
}

impl KustoWorker {
    /// Create a worker with the built-in validation rules
    #[must_use]
    pub fn new(settings: LanguageSettings) -> Self {
        Self {
            settings,
            documents: RwLock::new(HashMap::new()),
            store: SchemaStore::new(),
            pipeline: ValidationPipeline::default(),
        }
    }

    /// Replace the validation pipeline
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: ValidationPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &LanguageSettings {
        &self.settings
    }

    /// Idle lifetime after which the host may shut this worker down
    #[must_use]
    pub fn max_idle_time(&self) -> Option<Duration> {
        self.settings.max_worker_idle_time()
    }

    // Documents

    /// Register or replace the text of a document
    ///
    /// Returns the document's new version, `1` for a new URI.
    pub async fn set_document(&self, uri: &str, text: impl Into<String>) -> u64 {
        let mut documents = self.documents.write().await;
        let version = documents.get(uri).map_or(1, |doc| doc.version() + 1);
        let document = Document::new(uri, version, text, self.settings.command_separator);
        documents.insert(uri.to_string(), Arc::new(document));
        version
    }

    /// Forget a document; returns whether it was registered
    pub async fn remove_document(&self, uri: &str) -> bool {
        let removed = self.documents.write().await.remove(uri).is_some();
        if removed {
            log::debug!("Removed document '{uri}'");
        }
        removed
    }

    /// Current snapshot of a document
    pub async fn document(&self, uri: &str) -> Result<Arc<Document>, Error> {
        self.documents
            .read()
            .await
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::unknown_document(uri))
    }

    /// Byte offset of a line/character position in a document
    pub async fn offset_at(&self, uri: &str, position: Position) -> Result<usize, Error> {
        Ok(self.document(uri).await?.offset_at(position))
    }

    // Schema ingestion

    /// Current schema state
    pub async fn schema(&self) -> Arc<SchemaSnapshot> {
        self.store.snapshot().await
    }

    /// Replace the schema; returns the published version
    pub async fn set_schema(&self, schema: Schema) -> u64 {
        self.store.replace_schema(schema).await
    }

    /// Normalize a raw `.show schema` payload and install it together with
    /// the ambient parameters
    pub async fn set_schema_from_show_schema(
        &self,
        raw: &Value,
        connection_string: &str,
        database_in_context: &str,
        global_parameters: Vec<ScalarParameter>,
    ) -> u64 {
        let schema = normalize::normalize_schema(raw, connection_string, database_in_context);
        self.store
            .replace_all(Schema::Engine(schema), global_parameters)
            .await
    }

    /// Normalize a raw `.show schema` payload without installing it
    #[allow(clippy::unused_async)]
    pub async fn normalize_schema(
        &self,
        raw: &Value,
        connection_string: &str,
        database_in_context: &str,
    ) -> EngineSchema {
        normalize::normalize_schema(raw, connection_string, database_in_context)
    }

    /// Replace the ambient parameters; returns the published version
    pub async fn set_parameters(&self, parameters: Vec<ScalarParameter>) -> u64 {
        self.store.replace_parameters(parameters).await
    }

    // Queries

    /// The command containing `offset`
    pub async fn get_command_in_context(
        &self,
        uri: &str,
        offset: usize,
    ) -> Result<Option<Command>, Error> {
        Ok(self.document(uri).await?.command_at(offset).cloned())
    }

    /// Text and line/character range of the command containing `offset`
    pub async fn get_command_and_location_in_context(
        &self,
        uri: &str,
        offset: usize,
    ) -> Result<Option<CommandLocation>, Error> {
        let document = self.document(uri).await?;
        Ok(document.command_at(offset).map(|command| {
            let text = command.content();
            CommandLocation {
                text: text.to_string(),
                range: document.range(command.absolute_start, command.absolute_start + text.len()),
            }
        }))
    }

    /// All commands of a document, ordered by start offset
    pub async fn get_commands_in_document(&self, uri: &str) -> Result<Vec<Command>, Error> {
        Ok(self.document(uri).await?.commands().to_vec())
    }

    /// `text` as a client directive with leading comments stripped
    #[allow(clippy::unused_async)]
    pub async fn get_client_directive(&self, text: &str) -> Option<StrippedCommand> {
        segmenter::client_directive(text)
    }

    /// `text` as an admin command with leading comments stripped
    #[allow(clippy::unused_async)]
    pub async fn get_admin_command(&self, text: &str) -> Option<StrippedCommand> {
        segmenter::admin_command(text)
    }

    /// Parameters declared up to and including the command at `offset`
    pub async fn get_query_params(
        &self,
        uri: &str,
        offset: usize,
    ) -> Result<Vec<InputParameter>, Error> {
        let document = self.document(uri).await?;
        Ok(document
            .command_index_at(offset)
            .map(|idx| parameters::declared_parameters(document.commands(), idx))
            .unwrap_or_default())
    }

    /// Ambient parameters; empty for a document without commands
    pub async fn get_global_params(&self, uri: &str) -> Result<Vec<ScalarParameter>, Error> {
        let document = self.document(uri).await?;
        if document.commands().is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.snapshot().await.parameters().to_vec())
    }

    /// Ambient parameters used by the command at `offset`
    pub async fn get_referenced_global_params(
        &self,
        uri: &str,
        offset: usize,
    ) -> Result<Vec<ScalarParameter>, Error> {
        let document = self.document(uri).await?;
        let Some(idx) = document.command_index_at(offset) else {
            return Ok(Vec::new());
        };
        let snapshot = self.store.snapshot().await;
        let declared = parameters::declared_parameters(document.commands(), idx);
        Ok(parameters::referenced_globals(
            &document.commands()[idx].text,
            snapshot.parameters(),
            &declared,
        ))
    }

    /// Render directive of the command at `offset`
    pub async fn get_render_info(
        &self,
        uri: &str,
        offset: usize,
    ) -> Result<Option<RenderInfo>, Error> {
        let document = self.document(uri).await?;
        Ok(document.command_at(offset).and_then(render::render_info))
    }

    /// Diagnostics of a document restricted to `intervals`
    pub async fn do_validation(
        &self,
        uri: &str,
        intervals: &[Interval],
    ) -> Result<ValidationResult, Error> {
        let document = self.document(uri).await?;
        let snapshot = self.store.snapshot().await;
        Ok(self.pipeline.validate(&document, &snapshot, intervals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::VisualizationKind;
    use crate::schema::{Cluster, Database, Table};
    use crate::segmenter::{CommandKind, CommandSeparator};
    use serde_json::json;

    const URI: &str = "inmemory://model/1";

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    async fn worker_with(text: &str) -> KustoWorker {
        init_logging();
        let worker = KustoWorker::default();
        worker.set_document(URI, text).await;
        worker
    }

    fn ambient() -> Vec<ScalarParameter> {
        vec![
            ScalarParameter::typed("a", "string"),
            ScalarParameter::typed("b", "long"),
        ]
    }

    #[tokio::test]
    async fn test_commands_partition_the_document() {
        let text = "  // leading\nT | take 1\n\n\n.show tables; .show functions\n\n#connect cluster('x')\nU\n| where s == ';'\n\n";
        let worker = worker_with(text).await;
        let commands = worker.get_commands_in_document(URI).await.unwrap();

        let first = text.len() - text.trim_start().len();
        assert_eq!(commands[0].absolute_start, first);
        assert_eq!(commands.last().unwrap().absolute_end, text.len());
        for pair in commands.windows(2) {
            assert_eq!(pair[0].absolute_end, pair[1].absolute_start);
        }
        let rebuilt: String = commands.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, &text[first..]);

        let kinds: Vec<_> = commands.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            [
                CommandKind::Query,
                CommandKind::AdminCommand,
                CommandKind::ClientDirective,
                CommandKind::Query
            ]
        );
    }

    #[tokio::test]
    async fn test_command_in_context() {
        let text = "T | take 1\n\nU | count";
        let worker = worker_with(text).await;
        let second = text.find('U').unwrap();

        let command = worker.get_command_in_context(URI, second + 2).await.unwrap().unwrap();
        assert_eq!(command.absolute_start, second);
        let again = worker.get_command_in_context(URI, second + 2).await.unwrap().unwrap();
        assert_eq!(command, again);

        let at_end = worker.get_command_in_context(URI, text.len()).await.unwrap();
        assert_eq!(at_end.unwrap().absolute_start, second);
        assert!(worker.get_command_in_context(URI, text.len() + 1).await.unwrap().is_none());

        worker.set_document(URI, "").await;
        assert!(worker.get_command_in_context(URI, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_command_and_location() {
        let text = "T | take 1\n\nU\n| count\n\n";
        let worker = worker_with(text).await;
        let location = worker
            .get_command_and_location_in_context(URI, text.find('U').unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(location.text, "U\n| count");
        assert_eq!(location.range.start, Position::new(2, 0));
        assert_eq!(location.range.end, Position::new(3, 7));
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let worker = KustoWorker::default();
        let err = worker.get_commands_in_document("inmemory://missing").await.unwrap_err();
        assert!(matches!(err, Error::UnknownDocument { ref uri } if uri == "inmemory://missing"));

        worker.set_document(URI, "T").await;
        assert!(worker.remove_document(URI).await);
        assert!(!worker.remove_document(URI).await);
        assert!(worker.get_query_params(URI, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_document_versions_and_separator() {
        let settings = LanguageSettings {
            command_separator: CommandSeparator::Semicolon,
            ..LanguageSettings::default()
        };
        let worker = KustoWorker::new(settings);
        assert_eq!(worker.set_document(URI, "T | take 1").await, 1);
        assert_eq!(worker.set_document(URI, "T; U").await, 2);
        assert_eq!(worker.document(URI).await.unwrap().version(), 2);
        assert_eq!(worker.get_commands_in_document(URI).await.unwrap().len(), 2);
        assert_eq!(worker.offset_at(URI, Position::new(0, 3)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_declared_parameters_last_wins() {
        let text = "declare query_parameters(x:string); declare query_parameters(x:long);\nT | where y == x";
        let worker = worker_with(text).await;
        let params = worker.get_query_params(URI, text.len()).await.unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name(), "x");
        assert_eq!(params[0].csl_type(), Some("long"));
    }

    #[tokio::test]
    async fn test_referenced_versus_global() {
        let text = "T | where Name == a";
        let worker = worker_with(text).await;
        worker.set_parameters(ambient()).await;

        let globals = worker.get_global_params(URI).await.unwrap();
        assert_eq!(globals, ambient());
        let referenced = worker.get_referenced_global_params(URI, 3).await.unwrap();
        assert_eq!(referenced, vec![ambient()[0].clone()]);
    }

    #[tokio::test]
    async fn test_declared_parameter_shadows_global() {
        let text = "declare query_parameters(a:int);\nT | where Name == a and Id == b";
        let worker = worker_with(text).await;
        worker.set_parameters(ambient()).await;
        let referenced = worker.get_referenced_global_params(URI, text.len()).await.unwrap();
        let names: Vec<_> = referenced.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["b"]);
    }

    #[tokio::test]
    async fn test_empty_document_has_no_parameters() {
        let worker = worker_with("").await;
        worker.set_parameters(ambient()).await;
        assert!(worker.get_query_params(URI, 0).await.unwrap().is_empty());
        assert!(worker.get_global_params(URI).await.unwrap().is_empty());
        assert!(worker.get_referenced_global_params(URI, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cursor_in_comment_uses_whole_command() {
        let text = "T // cursor here\n| where Name == b";
        let worker = worker_with(text).await;
        worker.set_parameters(ambient()).await;
        let referenced = worker.get_referenced_global_params(URI, 6).await.unwrap();
        assert_eq!(referenced, vec![ambient()[1].clone()]);
    }

    #[tokio::test]
    async fn test_set_schema_from_show_schema() {
        let worker = KustoWorker::default();
        let raw = json!({"Databases": {"D": {"Name": "D", "Tables": {"T": {"Name": "T", "OrderedColumns": []}}}}});

        let version = worker.set_schema_from_show_schema(&raw, "https://c.kusto.windows.net", "d", ambient()).await;
        assert_eq!(version, 1);
        let snapshot = worker.schema().await;
        let Schema::Engine(engine) = snapshot.schema() else {
            panic!("expected an engine schema");
        };
        let idx = engine.database_index().unwrap();
        assert!(std::ptr::eq(engine.database().unwrap(), &engine.databases()[idx]));
        assert_eq!(snapshot.parameters().len(), 2);

        let missing = worker.normalize_schema(&raw, "https://c.kusto.windows.net", "Missing").await;
        assert!(missing.database().is_none());
        assert_eq!(missing.databases().len(), 1);
        assert_eq!(worker.schema().await.version(), 1);
    }

    #[tokio::test]
    async fn test_readers_keep_their_schema_version() {
        let worker = KustoWorker::default();
        let cluster = |db: &str| Cluster {
            connection_string: "c".to_string(),
            databases: vec![Database::new(db).table(Table::new("T"))],
        };
        worker.set_schema(EngineSchema::new(cluster("Old"), Some("Old")).into()).await;
        let held = worker.schema().await;
        worker.set_schema(EngineSchema::new(cluster("New"), Some("New")).into()).await;

        assert_eq!(held.schema().database_in_context().unwrap().name, "Old");
        assert_eq!(worker.schema().await.schema().database_in_context().unwrap().name, "New");
        assert_eq!(worker.schema().await.version(), 2);
    }

    #[tokio::test]
    async fn test_render_info() {
        let text = "T | take 1\n\nT | summarize count() by bin(t, 1h)\n| render barchart with (title=\"T\", ymin=0, ymax=not_a_number)";
        let worker = worker_with(text).await;
        assert!(worker.get_render_info(URI, 2).await.unwrap().is_none());

        let info = worker.get_render_info(URI, text.len()).await.unwrap().unwrap();
        assert_eq!(info.options.visualization, Some(VisualizationKind::BarChart));
        assert_eq!(info.options.title.as_deref(), Some("T"));
        assert_eq!(info.options.ymin, Some(0.0));
        assert_eq!(info.options.ymax, None);
        assert_eq!(info.location.start_offset, text.find("render").unwrap());
        assert_eq!(info.location.end_offset, text.len());
    }

    #[tokio::test]
    async fn test_client_directive_and_admin_command() {
        let worker = KustoWorker::default();
        let directive = worker.get_client_directive("// pick a cluster\n#connect cluster('x')").await.unwrap();
        assert_eq!(directive.text, "#connect cluster('x')");
        assert_eq!(directive.offset, 18);
        assert!(worker.get_client_directive("T | take 1").await.is_none());

        let admin = worker.get_admin_command(".show tables").await.unwrap();
        assert_eq!(admin.offset, 0);
        assert!(worker.get_admin_command("#connect").await.is_none());
    }

    #[tokio::test]
    async fn test_validation_scoped_to_intervals() {
        let text = "T | where a == (1)\n\nU | where b == 'x\n\nV | where c == (1";
        let worker = worker_with(text).await;
        assert_eq!(worker.get_commands_in_document(URI).await.unwrap().len(), 3);
        let second = text.find("U |").unwrap();
        let third = text.find("V |").unwrap();

        let everything = worker.do_validation(URI, &[Interval::new(0, text.len())]).await.unwrap();
        let codes: Vec<_> = everything.diagnostics.iter().filter_map(|d| d.code.as_deref()).collect();
        assert_eq!(codes, ["unterminated-string", "unbalanced-bracket"]);

        let intervals = [Interval::new(0, second), Interval::new(third, text.len())];
        let result = worker.do_validation(URI, &intervals).await.unwrap();
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].start, text.rfind('(').unwrap());
        assert_eq!(result.diagnostics[0].line, 5);

        let result = worker.do_validation(URI, &[Interval::new(0, second)]).await.unwrap();
        assert!(result.valid);
        assert!(result.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_custom_pipeline() {
        let worker = KustoWorker::default().with_pipeline(ValidationPipeline::new());
        worker.set_document(URI, "T | where (").await;
        let result = worker.do_validation(URI, &[Interval::new(0, 11)]).await.unwrap();
        assert!(result.valid);
        assert!(result.diagnostics.is_empty());
        assert_eq!(worker.max_idle_time(), Some(Duration::from_secs(120)));
    }
}
