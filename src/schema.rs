//! Schema model
//!
//! The normalized description of a Kusto target. An engine cluster carries
//! databases with their tables and functions; cluster-manager and
//! data-management targets carry only topology. The in-context database of
//! an engine schema is an index into its own database list, so there is
//! exactly one copy of every database.

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Column name
    pub name: String,

    /// KQL data type (string, long, datetime, dynamic, etc.)
    #[serde(rename = "type")]
    pub data_type: String,

    /// Optional column description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
}

impl Column {
    /// Create a new column
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            docstring: None,
        }
    }

    /// Set the docstring
    #[must_use]
    pub fn docstring(mut self, doc: impl Into<String>) -> Self {
        self.docstring = Some(doc.into());
        self
    }
}

/// What kind of entity a table-shaped schema entry is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableEntityType {
    #[default]
    Table,
    ExternalTable,
    MaterializedView,
}

/// Table definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Table name
    pub name: String,

    /// Table columns
    #[serde(default)]
    pub columns: Vec<Column>,

    /// Optional table description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,

    /// Table, external table or materialized view
    #[serde(default)]
    pub entity_type: TableEntityType,
}

impl Table {
    /// Create a new table with the given name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            docstring: None,
            entity_type: TableEntityType::Table,
        }
    }

    /// Builder method to add a column with name and type
    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.columns.push(Column::new(name, data_type));
        self
    }

    /// Set the docstring
    #[must_use]
    pub fn docstring(mut self, doc: impl Into<String>) -> Self {
        self.docstring = Some(doc.into());
        self
    }

    /// Set the entity type
    #[must_use]
    pub fn entity_type(mut self, entity_type: TableEntityType) -> Self {
        self.entity_type = entity_type;
        self
    }

    /// Get a column by name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// A scalar parameter: an ambient parameter, a declared query parameter
/// or a scalar function argument
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarParameter {
    /// Parameter name, unique within its declaring scope
    pub name: String,

    /// Declared type as reported by the source
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,

    /// KQL type name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csl_type: Option<String>,

    /// Default value as KQL literal text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csl_default_value: Option<String>,
}

impl ScalarParameter {
    /// Create an untyped parameter
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create a parameter of a KQL type
    #[must_use]
    pub fn typed(name: impl Into<String>, csl_type: impl Into<String>) -> Self {
        let csl_type = csl_type.into();
        Self {
            name: name.into(),
            data_type: Some(csl_type.clone()),
            csl_type: Some(csl_type),
            csl_default_value: None,
        }
    }

    /// Set a default value
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.csl_default_value = Some(value.into());
        self
    }
}

/// A tabular parameter: stands for a table with a fixed column shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabularParameter {
    /// Parameter name
    pub name: String,
    /// Expected columns
    pub columns: Vec<ScalarParameter>,
}

/// A function or query parameter, scalar or tabular
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputParameter {
    Tabular(TabularParameter),
    Scalar(ScalarParameter),
}

impl InputParameter {
    /// Parameter name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Tabular(p) => &p.name,
            Self::Scalar(p) => &p.name,
        }
    }

    /// KQL type of a scalar parameter
    #[must_use]
    pub fn csl_type(&self) -> Option<&str> {
        match self {
            Self::Tabular(_) => None,
            Self::Scalar(p) => p.csl_type.as_deref(),
        }
    }
}

impl From<ScalarParameter> for InputParameter {
    fn from(value: ScalarParameter) -> Self {
        Self::Scalar(value)
    }
}

impl From<TabularParameter> for InputParameter {
    fn from(value: TabularParameter) -> Self {
        Self::Tabular(value)
    }
}

/// User-defined function definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    /// Function name
    pub name: String,

    /// Function body (KQL)
    #[serde(default)]
    pub body: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,

    /// Parameter definitions
    #[serde(default)]
    pub input_parameters: Vec<InputParameter>,
}

impl Function {
    /// Create a new function
    #[must_use]
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            docstring: None,
            input_parameters: Vec::new(),
        }
    }

    /// Builder method to add a parameter
    #[must_use]
    pub fn param(mut self, param: impl Into<InputParameter>) -> Self {
        self.input_parameters.push(param.into());
        self
    }
}

/// Database definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub major_version: u32,
    #[serde(default)]
    pub minor_version: u32,
}

impl Database {
    /// Create an empty database
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder method to add a table
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Builder method to add a function
    #[must_use]
    pub fn function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    /// Set the schema version
    #[must_use]
    pub fn version(mut self, major: u32, minor: u32) -> Self {
        self.major_version = major;
        self.minor_version = minor;
        self
    }

    /// Get a table by name
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Get a function by name
    #[must_use]
    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

/// Cluster half of an engine schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub connection_string: String,
    #[serde(default)]
    pub databases: Vec<Database>,
}

/// Schema of an engine cluster with an optional database in context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EngineSchemaRepr", into = "EngineSchemaRepr")]
pub struct EngineSchema {
    cluster: Cluster,
    database_index: Option<usize>,
}

/// Wire shape: the in-context database is spelled out in full
#[derive(Serialize, Deserialize)]
struct EngineSchemaRepr {
    cluster: Cluster,
    #[serde(default)]
    database: Option<Database>,
}

impl From<EngineSchemaRepr> for EngineSchema {
    fn from(repr: EngineSchemaRepr) -> Self {
        let name = repr.database.map(|db| db.name);
        Self::new(repr.cluster, name.as_deref())
    }
}

impl From<EngineSchema> for EngineSchemaRepr {
    fn from(schema: EngineSchema) -> Self {
        let database = schema.database().cloned();
        Self {
            cluster: schema.cluster,
            database,
        }
    }
}

impl EngineSchema {
    /// Create a schema, binding the database in context by name
    /// (case-insensitive). A name with no match leaves no database in
    /// context.
    #[must_use]
    pub fn new(cluster: Cluster, database_in_context: Option<&str>) -> Self {
        let mut schema = Self {
            cluster,
            database_index: None,
        };
        if let Some(name) = database_in_context {
            schema.set_database_in_context(name);
        }
        schema
    }

    /// Cluster connection string
    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.cluster.connection_string
    }

    /// All databases of the cluster
    #[must_use]
    pub fn databases(&self) -> &[Database] {
        &self.cluster.databases
    }

    /// Index of the database in context within [`Self::databases`]
    #[must_use]
    pub fn database_index(&self) -> Option<usize> {
        self.database_index
    }

    /// The database in context
    #[must_use]
    pub fn database(&self) -> Option<&Database> {
        self.database_index
            .and_then(|idx| self.cluster.databases.get(idx))
    }

    /// Mutable access to the database in context
    pub fn database_mut(&mut self) -> Option<&mut Database> {
        self.database_index
            .and_then(|idx| self.cluster.databases.get_mut(idx))
    }

    /// Get a database by name (case-insensitive)
    #[must_use]
    pub fn database_named(&self, name: &str) -> Option<&Database> {
        self.cluster
            .databases
            .iter()
            .find(|db| db.name.eq_ignore_ascii_case(name))
    }

    /// Rebind the database in context; returns whether a database matched
    pub fn set_database_in_context(&mut self, name: &str) -> bool {
        self.database_index = self
            .cluster
            .databases
            .iter()
            .position(|db| db.name.eq_ignore_ascii_case(name));
        self.database_index.is_some()
    }

    /// Append a database to the cluster
    pub fn push_database(&mut self, database: Database) {
        self.cluster.databases.push(database);
    }
}

/// Schema of a cluster-manager target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterManagerSchema {
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub connection_string: String,
}

/// Schema of a data-management target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataManagementSchema {}

/// Schema of the target the worker validates against, tagged by cluster type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "clusterType")]
pub enum Schema {
    Engine(EngineSchema),
    ClusterManager(ClusterManagerSchema),
    DataManagement(DataManagementSchema),
}

impl Default for Schema {
    fn default() -> Self {
        Self::Engine(EngineSchema::default())
    }
}

impl From<EngineSchema> for Schema {
    fn from(value: EngineSchema) -> Self {
        Self::Engine(value)
    }
}

impl Schema {
    /// Parse a typed schema from its JSON form
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// The `clusterType` tag
    #[must_use]
    pub fn cluster_type(&self) -> &'static str {
        match self {
            Self::Engine(_) => "Engine",
            Self::ClusterManager(_) => "ClusterManager",
            Self::DataManagement(_) => "DataManagement",
        }
    }

    /// Databases of an engine schema; other targets have none
    #[must_use]
    pub fn databases(&self) -> &[Database] {
        match self {
            Self::Engine(engine) => engine.databases(),
            Self::ClusterManager(_) | Self::DataManagement(_) => &[],
        }
    }

    /// Database in context of an engine schema
    #[must_use]
    pub fn database_in_context(&self) -> Option<&Database> {
        match self {
            Self::Engine(engine) => engine.database(),
            Self::ClusterManager(_) | Self::DataManagement(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> EngineSchema {
        let cluster = Cluster {
            connection_string: "https://help.kusto.windows.net".to_string(),
            databases: vec![
                Database::new("Samples")
                    .table(
                        Table::new("StormEvents")
                            .with_column("StartTime", "datetime")
                            .with_column("State", "string"),
                    )
                    .version(1, 4),
                Database::new("Security").function(
                    Function::new("RecentEvents", "{ SecurityEvent | take 10 }")
                        .param(ScalarParameter::typed("count", "long").default_value("10")),
                ),
            ],
        };
        EngineSchema::new(cluster, Some("security"))
    }

    #[test]
    fn test_database_in_context_points_into_cluster() {
        let schema = samples();
        let current = schema.database().unwrap();
        assert!(std::ptr::eq(current, &schema.databases()[1]));
        assert_eq!(current.name, "Security");
    }

    #[test]
    fn test_mutation_through_context_is_visible_in_cluster() {
        let mut schema = samples();
        schema
            .database_mut()
            .unwrap()
            .tables
            .push(Table::new("SigninLogs"));
        assert!(schema.databases()[1].get_table("signinlogs").is_some());
        assert!(schema.database().unwrap().get_table("SigninLogs").is_some());
    }

    #[test]
    fn test_rebinding_database() {
        let mut schema = samples();
        assert!(!schema.set_database_in_context("Missing"));
        assert!(schema.database().is_none());
        assert!(schema.set_database_in_context("SAMPLES"));
        assert_eq!(schema.database_index(), Some(0));
    }

    #[test]
    fn test_engine_schema_serialization() {
        let schema = Schema::Engine(samples());
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["clusterType"], "Engine");
        assert_eq!(json["database"]["name"], "Security");
        assert_eq!(json["cluster"]["databases"][0]["majorVersion"], 1);
        assert_eq!(
            json["cluster"]["databases"][1]["functions"][0]["inputParameters"][0]["cslType"],
            "long"
        );

        let parsed: Schema = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, schema);
        assert_eq!(parsed.database_in_context().unwrap().name, "Security");
    }

    #[test]
    fn test_other_cluster_types() {
        let schema = Schema::from_json(
            r#"{"clusterType":"ClusterManager","accounts":["a"],"services":["s1","s2"],"connectionString":"cm"}"#,
        )
        .unwrap();
        assert_eq!(schema.cluster_type(), "ClusterManager");
        assert!(schema.databases().is_empty());
        assert!(schema.database_in_context().is_none());

        let schema = Schema::from_json(r#"{"clusterType":"DataManagement"}"#).unwrap();
        assert_eq!(schema, Schema::DataManagement(DataManagementSchema {}));
    }

    #[test]
    fn test_input_parameter_shapes() {
        let tabular: InputParameter = serde_json::from_str(
            r#"{"name":"T","columns":[{"name":"x","type":"System.Int64","cslType":"long"}]}"#,
        )
        .unwrap();
        assert!(matches!(tabular, InputParameter::Tabular(ref t) if t.columns.len() == 1));
        assert_eq!(tabular.csl_type(), None);

        let scalar: InputParameter =
            serde_json::from_str(r#"{"name":"n","cslType":"string"}"#).unwrap();
        assert_eq!(scalar.name(), "n");
        assert_eq!(scalar.csl_type(), Some("string"));
    }
}
