use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::error::SchemaError;
use crate::notion::NotionApi;

/// Property name → Notion property descriptor. Only key presence is checked.
pub type PropertySchema = Map<String, Value>;

pub const REQUIRED_FIELDS: [&str; 3] = ["Name", "Date of Meeting", "Platform"];

pub fn missing_fields(schema: &PropertySchema) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !schema.contains_key(*field))
        .collect()
}

/// Pre-write gate used by `fetch-schema`: logs and returns false on mismatch.
pub fn validate_required_fields(schema: &PropertySchema) -> bool {
    let missing = missing_fields(schema);
    if missing.is_empty() {
        return true;
    }
    error!("Missing required fields in schema: {}", missing.join(", "));
    false
}

/// Startup check used by `watch`: an incompatible schema is fatal.
pub fn validate_schema(schema: &PropertySchema) -> Result<(), SchemaError> {
    let missing = missing_fields(schema);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::MissingFields(missing))
    }
}

/// Fetch the database and pull out its `properties` map.
pub async fn fetch_schema<A>(api: &A, database_id: &str) -> Result<PropertySchema>
where
    A: NotionApi + ?Sized,
{
    let database = api.retrieve_database(database_id).await.map_err(|e| {
        e.log("fetch the database schema");
        e
    })?;

    match database.get("properties") {
        Some(Value::Object(properties)) if !properties.is_empty() => Ok(properties.clone()),
        _ => {
            error!("No properties found in the database schema.");
            Err(SchemaError::Empty.into())
        }
    }
}

/// Write the schema as JSON indented with four spaces.
pub fn write_schema(schema: &PropertySchema, path: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
    schema.serialize(&mut ser).map_err(io::Error::from)?;
    writer.flush()
}

/// Read the cached schema; any failure is logged and yields an empty map.
pub fn load_schema(path: &Path) -> PropertySchema {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            error!(
                "Schema file {} not found. Run `meeting_sync fetch-schema` first.",
                path.display()
            );
            return PropertySchema::new();
        }
        Err(e) => {
            error!("Failed to read schema file {}: {}", path.display(), e);
            return PropertySchema::new();
        }
    };

    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(schema)) => schema,
        Ok(_) => {
            error!("Schema file {} is not a JSON object", path.display());
            PropertySchema::new()
        }
        Err(e) => {
            error!("Failed to decode schema file: {}", e);
            PropertySchema::new()
        }
    }
}

/// Fetch, validate, and persist. Returns whether the file was written.
///
/// Validation mismatches and write failures are logged, not returned, so the
/// command still exits cleanly; only a failed fetch is an error.
pub async fn fetch_and_store<A>(api: &A, database_id: &str, output: &Path) -> Result<bool>
where
    A: NotionApi + ?Sized,
{
    info!("Fetching Notion database schema...");
    let schema = fetch_schema(api, database_id)
        .await
        .context("Failed to fetch database schema")?;

    if !validate_required_fields(&schema) {
        error!("Schema validation failed. Please check the database.");
        return Ok(false);
    }

    match write_schema(&schema, output) {
        Ok(()) => {
            info!("Schema successfully written to {}.", output.display());
            Ok(true)
        }
        Err(e) => {
            error!("Failed to write schema to file: {}", e);
            Ok(false)
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notion::fake::{Call, FakeNotion};
    use serde_json::json;

    fn schema(value: Value) -> PropertySchema {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn full_database() -> Value {
        json!({
            "object": "database",
            "id": "db-1",
            "properties": {
                "Name": { "id": "title", "type": "title", "title": {} },
                "Date of Meeting": { "id": "a1", "type": "date", "date": {} },
                "Platform": { "id": "b2", "type": "select", "select": { "options": [] } },
                "Meeting Type": { "id": "c3", "type": "select", "select": { "options": [] } }
            }
        })
    }

    #[test]
    fn required_fields_present() {
        let s = schema(full_database()["properties"].clone());
        assert!(validate_required_fields(&s));
        assert!(validate_schema(&s).is_ok());
    }

    #[test]
    fn each_missing_field_is_rejected() {
        for field in REQUIRED_FIELDS {
            let mut s = schema(full_database()["properties"].clone());
            s.remove(field);
            assert!(!validate_required_fields(&s), "{} should be required", field);
            assert_eq!(
                validate_schema(&s),
                Err(SchemaError::MissingFields(vec![field]))
            );
        }
    }

    #[test]
    fn empty_schema_lists_all_fields() {
        let err = validate_schema(&PropertySchema::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required fields in schema: Name, Date of Meeting, Platform"
        );
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_schema(&dir.path().join("nope.json")).is_empty());
    }

    #[test]
    fn load_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_schema(&path).is_empty());
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(load_schema(&path).is_empty());
    }

    #[test]
    fn written_schema_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        let s = schema(full_database()["properties"].clone());
        write_schema(&s, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n    \"Date of Meeting\""));
        assert_eq!(load_schema(&path), s);
    }

    #[tokio::test]
    async fn fetch_and_store_writes_valid_schema() {
        let api = FakeNotion {
            database: Some(full_database()),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notion_schema.json");

        assert!(fetch_and_store(&api, "db-1", &path).await.unwrap());
        assert_eq!(api.calls(), vec![Call::RetrieveDatabase("db-1".into())]);
        assert_eq!(load_schema(&path).len(), 4);
    }

    #[tokio::test]
    async fn incomplete_schema_is_not_written() {
        let mut database = full_database();
        database["properties"].as_object_mut().unwrap().remove("Platform");
        let api = FakeNotion {
            database: Some(database),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notion_schema.json");

        assert!(!fetch_and_store(&api, "db-1", &path).await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn empty_properties_is_a_failure() {
        let api = FakeNotion {
            database: Some(json!({ "object": "database", "properties": {} })),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notion_schema.json");

        assert!(fetch_and_store(&api, "db-1", &path).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn remote_error_writes_nothing() {
        let api = FakeNotion::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notion_schema.json");

        assert!(fetch_and_store(&api, "db-1", &path).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn unwritable_output_is_not_fatal() {
        let api = FakeNotion {
            database: Some(full_database()),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("notion_schema.json");

        assert!(!fetch_and_store(&api, "db-1", &path).await.unwrap());
    }
}
