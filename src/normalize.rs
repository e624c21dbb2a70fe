//! Raw schema normalization
//!
//! Converts the payload of a "show schema" request into an [`EngineSchema`].
//! The payload shape depends on the command and service version that
//! produced it; the normalizer accepts:
//!
//! - `.show schema as json`: `{"Databases": {"<name>": {...}}}` with
//!   `Tables`, `ExternalTables`, `MaterializedViews` and `Functions` maps
//! - the same with arrays instead of maps, or with camelCase keys
//! - a query response envelope (`{"Tables": [{"Rows": [["<json>"]]}]}`)
//!   or a JSON document passed as a string
//! - `.show database schema` row records grouped by `DatabaseName`
//!
//! Normalization never fails. Missing optional fields become `None` or
//! empty, malformed entities are skipped, and a payload with no recognizable
//! structure yields an engine schema with no databases.

use crate::schema::{
    Cluster, Column, Database, EngineSchema, Function, InputParameter, ScalarParameter, Table,
    TableEntityType, TabularParameter,
};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::collections::HashMap;

const NAME: &[&str] = &["Name", "name"];
const DATABASES: &[&str] = &["Databases", "databases"];
const TABLES: &[&str] = &["Tables", "tables"];
const EXTERNAL_TABLES: &[&str] = &["ExternalTables", "externalTables"];
const MATERIALIZED_VIEWS: &[&str] = &["MaterializedViews", "materializedViews"];
const FUNCTIONS: &[&str] = &["Functions", "functions"];
const COLUMNS: &[&str] = &["OrderedColumns", "orderedColumns", "Columns", "columns"];
const INPUT_PARAMETERS: &[&str] = &["InputParameters", "inputParameters"];
const DOCSTRING: &[&str] = &["DocString", "docString", "docstring"];
const BODY: &[&str] = &["Body", "body"];
const TYPE: &[&str] = &["Type", "type"];
const CSL_TYPE: &[&str] = &["CslType", "cslType"];
const CSL_DEFAULT_VALUE: &[&str] = &["CslDefaultValue", "cslDefaultValue"];
const PARAMETER_COLUMNS: &[&str] = &["Columns", "columns"];
const MAJOR_VERSION: &[&str] = &["MajorVersion", "majorVersion"];
const MINOR_VERSION: &[&str] = &["MinorVersion", "minorVersion"];
const VERSION: &[&str] = &["Version", "version", "DatabaseSchemaVersion"];
const ROWS: &[&str] = &["Rows", "rows"];
const DATABASE_NAME: &[&str] = &["DatabaseName", "databaseName"];
const TABLE_NAME: &[&str] = &["TableName", "tableName"];
const COLUMN_NAME: &[&str] = &["ColumnName", "columnName"];
const COLUMN_TYPE: &[&str] = &["ColumnType", "columnType"];

/// CLR type names reported by older payloads, mapped to KQL scalar types
static CLR_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("System.String", "string"),
        ("System.Int64", "long"),
        ("System.Int32", "int"),
        ("System.Double", "real"),
        ("System.Single", "real"),
        ("System.Boolean", "bool"),
        ("System.SByte", "bool"),
        ("System.DateTime", "datetime"),
        ("System.TimeSpan", "timespan"),
        ("System.Guid", "guid"),
        ("System.Object", "dynamic"),
        ("System.Data.SqlTypes.SqlDecimal", "decimal"),
        ("Newtonsoft.Json.Linq.JToken", "dynamic"),
        ("Newtonsoft.Json.Linq.JObject", "dynamic"),
        ("Newtonsoft.Json.Linq.JArray", "dynamic"),
    ])
});

/// KQL scalar type for a CLR type name
#[must_use]
pub fn kql_type_for(clr_type: &str) -> Option<&'static str> {
    CLR_TYPES.get(clr_type).copied()
}

/// Normalize a raw schema payload
///
/// `database_in_context` is bound case-insensitively; when nothing matches
/// the schema has no database in context.
#[must_use]
pub fn normalize_schema(
    raw: &Value,
    connection_string: &str,
    database_in_context: &str,
) -> EngineSchema {
    let databases = collect_databases(raw);
    let schema = EngineSchema::new(
        Cluster {
            connection_string: connection_string.to_string(),
            databases,
        },
        Some(database_in_context),
    );
    log::debug!(
        "Normalized schema for {connection_string}: {} databases, in context: {:?}",
        schema.databases().len(),
        schema.database().map(|db| db.name.as_str())
    );
    schema
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| obj.get(*key))
        .filter(|value| !value.is_null())
}

fn str_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    field(obj, keys)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Non-empty string field
fn name_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    str_field(obj, keys).filter(|name| !name.is_empty())
}

fn u32_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<u32> {
    match field(obj, keys)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse `v1.2` / `1.2` version strings
fn parse_version(version: &str) -> Option<(u32, u32)> {
    let version = version.trim();
    let version = version
        .strip_prefix(['v', 'V'])
        .unwrap_or(version);
    let (major, minor) = version.split_once('.').unwrap_or((version, "0"));
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Map entries keyed by name, or array items without a key
fn entries(value: Option<&Value>) -> Vec<(Option<&str>, &Value)> {
    match value {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (Some(k.as_str()), v)).collect(),
        Some(Value::Array(items)) => items.iter().map(|v| (None, v)).collect(),
        _ => Vec::new(),
    }
}

fn entity_name(obj: &Map<String, Value>, key: Option<&str>) -> Option<String> {
    name_field(obj, NAME).or_else(|| key.filter(|k| !k.is_empty()).map(str::to_string))
}

fn column_type(obj: &Map<String, Value>, csl_keys: &[&str], clr_keys: &[&str]) -> String {
    if let Some(csl) = str_field(obj, csl_keys) {
        return csl;
    }
    str_field(obj, clr_keys)
        .map(|clr| kql_type_for(&clr).map_or(clr, str::to_string))
        .unwrap_or_default()
}

fn collect_databases(raw: &Value) -> Vec<Database> {
    match raw {
        Value::String(json) => match serde_json::from_str::<Value>(json) {
            Ok(inner) if !inner.is_string() => collect_databases(&inner),
            Ok(_) => Vec::new(),
            Err(err) => {
                log::warn!("Schema payload is a string but not JSON: {err}");
                Vec::new()
            }
        },
        Value::Object(obj) => {
            if let Some(databases) = field(obj, DATABASES) {
                return entries(Some(databases))
                    .into_iter()
                    .filter_map(|(key, value)| database_from(key, value))
                    .collect();
            }
            if let Some(payload) = envelope_payload(obj) {
                return collect_databases(payload);
            }
            if field(obj, TABLES).is_some() || field(obj, FUNCTIONS).is_some() {
                return database_from(None, raw).into_iter().collect();
            }
            log::warn!("Schema payload has no recognizable database structure");
            Vec::new()
        }
        Value::Array(items) => {
            let is_rows = items
                .iter()
                .filter_map(Value::as_object)
                .any(|obj| field(obj, DATABASE_NAME).is_some());
            if is_rows {
                databases_from_rows(items)
            } else {
                items
                    .iter()
                    .filter_map(|value| database_from(None, value))
                    .collect()
            }
        }
        _ => Vec::new(),
    }
}

/// First cell of the first row of a query response table
fn envelope_payload(obj: &Map<String, Value>) -> Option<&Value> {
    let first_table = field(obj, TABLES)?.as_array()?.first()?.as_object()?;
    field(first_table, ROWS)?
        .as_array()?
        .first()?
        .as_array()?
        .first()
}

fn database_from(key: Option<&str>, value: &Value) -> Option<Database> {
    let Some(obj) = value.as_object() else {
        log::warn!("Skipping database entry that is not an object");
        return None;
    };
    let Some(name) = entity_name(obj, key) else {
        log::warn!("Skipping database entry without a name");
        return None;
    };

    let mut tables = Vec::new();
    for (keys, entity_type) in [
        (TABLES, TableEntityType::Table),
        (EXTERNAL_TABLES, TableEntityType::ExternalTable),
        (MATERIALIZED_VIEWS, TableEntityType::MaterializedView),
    ] {
        tables.extend(
            entries(field(obj, keys))
                .into_iter()
                .filter_map(|(key, value)| table_from(key, value, entity_type)),
        );
    }

    let functions = entries(field(obj, FUNCTIONS))
        .into_iter()
        .filter_map(|(key, value)| function_from(key, value))
        .collect();

    let (major_version, minor_version) = match (
        u32_field(obj, MAJOR_VERSION),
        u32_field(obj, MINOR_VERSION),
    ) {
        (None, None) => str_field(obj, VERSION)
            .as_deref()
            .and_then(parse_version)
            .unwrap_or((0, 0)),
        (major, minor) => (major.unwrap_or(0), minor.unwrap_or(0)),
    };

    Some(Database {
        name,
        tables,
        functions,
        major_version,
        minor_version,
    })
}

fn table_from(key: Option<&str>, value: &Value, entity_type: TableEntityType) -> Option<Table> {
    let obj = value.as_object()?;
    let Some(name) = entity_name(obj, key) else {
        log::warn!("Skipping {entity_type:?} entry without a name");
        return None;
    };
    let columns = entries(field(obj, COLUMNS))
        .into_iter()
        .filter_map(|(key, value)| column_from(key, value))
        .collect();
    Some(Table {
        name,
        columns,
        docstring: str_field(obj, DOCSTRING),
        entity_type,
    })
}

fn column_from(key: Option<&str>, value: &Value) -> Option<Column> {
    let obj = value.as_object()?;
    Some(Column {
        name: entity_name(obj, key)?,
        data_type: column_type(obj, CSL_TYPE, TYPE),
        docstring: str_field(obj, DOCSTRING),
    })
}

fn function_from(key: Option<&str>, value: &Value) -> Option<Function> {
    let obj = value.as_object()?;
    let Some(name) = entity_name(obj, key) else {
        log::warn!("Skipping function entry without a name");
        return None;
    };
    let input_parameters = entries(field(obj, INPUT_PARAMETERS))
        .into_iter()
        .filter_map(|(_, value)| input_parameter_from(value))
        .collect();
    Some(Function {
        name,
        body: str_field(obj, BODY).unwrap_or_default(),
        docstring: str_field(obj, DOCSTRING),
        input_parameters,
    })
}

fn scalar_parameter_from(obj: &Map<String, Value>) -> Option<ScalarParameter> {
    Some(ScalarParameter {
        name: name_field(obj, NAME)?,
        data_type: str_field(obj, TYPE),
        csl_type: str_field(obj, CSL_TYPE),
        csl_default_value: str_field(obj, CSL_DEFAULT_VALUE),
    })
}

fn input_parameter_from(value: &Value) -> Option<InputParameter> {
    let obj = value.as_object()?;
    match field(obj, PARAMETER_COLUMNS).and_then(Value::as_array) {
        Some(columns) => Some(InputParameter::Tabular(TabularParameter {
            name: name_field(obj, NAME)?,
            columns: columns
                .iter()
                .filter_map(Value::as_object)
                .filter_map(scalar_parameter_from)
                .collect(),
        })),
        None => scalar_parameter_from(obj).map(InputParameter::Scalar),
    }
}

/// Group `.show database schema` rows by database, then table
fn databases_from_rows(rows: &[Value]) -> Vec<Database> {
    let mut databases: Vec<Database> = Vec::new();

    for obj in rows.iter().filter_map(Value::as_object) {
        let Some(database_name) = name_field(obj, DATABASE_NAME) else {
            continue;
        };
        let db_idx = databases
            .iter()
            .position(|db| db.name == database_name)
            .unwrap_or_else(|| {
                databases.push(Database::new(database_name));
                databases.len() - 1
            });
        let database = &mut databases[db_idx];

        let Some(table_name) = name_field(obj, TABLE_NAME) else {
            // Database row
            if let Some((major, minor)) = str_field(obj, VERSION).as_deref().and_then(parse_version)
            {
                database.major_version = major;
                database.minor_version = minor;
            }
            continue;
        };

        let table_idx = database
            .tables
            .iter()
            .position(|t| t.name == table_name)
            .unwrap_or_else(|| {
                database.tables.push(Table::new(table_name));
                database.tables.len() - 1
            });
        let table = &mut database.tables[table_idx];

        match name_field(obj, COLUMN_NAME) {
            Some(column_name) => table.columns.push(Column {
                name: column_name,
                data_type: column_type(obj, CSL_TYPE, COLUMN_TYPE),
                docstring: str_field(obj, DOCSTRING),
            }),
            None => {
                if let Some(doc) = str_field(obj, DOCSTRING).filter(|d| !d.is_empty()) {
                    table.docstring = Some(doc);
                }
            }
        }
    }

    databases
}
