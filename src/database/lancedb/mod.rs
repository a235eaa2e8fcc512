// Local vector store backed by LanceDB
// All namespaces share one table, rows are scoped by a namespace column


use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ScoredMatch, VectorMetadata, VectorRecord, VectorStore, rank_matches};
use crate::{RagError, Result};

const TABLE_NAME: &str = "vectors";

/// LanceDB table holding the vectors of every namespace
pub struct LanceStore {
    connection: Connection,
}

impl std::fmt::Debug for LanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanceStore").finish_non_exhaustive()
    }
}

impl LanceStore {
    /// Open (or create) the database directory at `path`
    #[inline]
    pub async fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            RagError::VectorStore(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", path.display());
        debug!("Opening LanceDB at {}", uri);

        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self { connection })
    }

    async fn open_table(&self) -> Result<Option<Table>> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to list tables: {}", e)))?;

        if !names.iter().any(|name| name == TABLE_NAME) {
            return Ok(None);
        }

        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to open table: {}", e)))?;
        Ok(Some(table))
    }

    /// Open the table, creating it with `dimension`-sized vectors when absent
    async fn table_for_dimension(&self, dimension: usize) -> Result<Table> {
        if let Some(table) = self.open_table().await? {
            let existing = table_dimension(&table).await?;
            if existing != dimension {
                return Err(RagError::VectorStore(format!(
                    "Vector table holds {}-dimension vectors, got {}; delete the namespace data or switch embedding provider",
                    existing, dimension
                )));
            }
            return Ok(table);
        }

        info!("Creating vector table with {} dimensions", dimension);
        self.connection
            .create_empty_table(TABLE_NAME, create_schema(dimension)?)
            .execute()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to create table: {}", e)))
    }
}

#[async_trait]
impl VectorStore for LanceStore {
    #[inline]
    fn name(&self) -> &'static str {
        "LanceDB"
    }

    #[inline]
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<usize> {
        let Some(first) = records.first() else {
            debug!("No vectors to upsert");
            return Ok(0);
        };

        let dimension = first.values.len();
        if let Some(bad) = records.iter().find(|r| r.values.len() != dimension) {
            return Err(RagError::InvalidArgument(format!(
                "Record {} has {} values, expected {}",
                bad.id,
                bad.values.len(),
                dimension
            )));
        }

        let table = self.table_for_dimension(dimension).await?;

        // Replace rows that share an id within the namespace
        let ids = records
            .iter()
            .map(|r| format!("'{}'", escape(&r.id)))
            .collect::<Vec<_>>()
            .join(", ");
        table
            .delete(&format!("{} AND id IN ({})", namespace_filter(namespace), ids))
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to replace vectors: {}", e)))?;

        let batch = create_record_batch(namespace, records, dimension)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to insert vectors: {}", e)))?;

        info!("Upserted {} vectors into namespace {}", records.len(), namespace);
        Ok(records.len())
    }

    #[inline]
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>> {
        let Some(table) = self.open_table().await? else {
            debug!("Vector table does not exist yet, no matches");
            return Ok(Vec::new());
        };

        let mut results = table
            .vector_search(vector)
            .map_err(|e| RagError::VectorStore(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .only_if(namespace_filter(namespace))
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to execute search: {}", e)))?;

        let mut matches = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to read result stream: {}", e)))?
        {
            matches.extend(parse_search_batch(&batch)?);
        }

        debug!("Vector search returned {} matches", matches.len());
        Ok(rank_matches(matches, top_k))
    }

    #[inline]
    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let Some(table) = self.open_table().await? else {
            return Ok(());
        };

        table
            .delete(&namespace_filter(namespace))
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to delete namespace: {}", e)))?;

        info!("Deleted all vectors in namespace {}", namespace);
        Ok(())
    }

    #[inline]
    async fn count(&self, namespace: &str) -> Result<u64> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let count = table
            .count_rows(Some(namespace_filter(namespace)))
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }
}

fn create_schema(dimension: usize) -> Result<Arc<Schema>> {
    let size = i32::try_from(dimension)
        .map_err(|_| RagError::InvalidArgument(format!("Vector dimension {} is too large", dimension)))?;

    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("namespace", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, false)), size),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("scrape_date", DataType::Utf8, false),
        Field::new("section", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
    ])))
}

fn create_record_batch(
    namespace: &str,
    records: &[VectorRecord],
    dimension: usize,
) -> Result<RecordBatch> {
    let schema = create_schema(dimension)?;

    let flat_values: Vec<f32> = records
        .iter()
        .flat_map(|r| r.values.iter().copied())
        .collect();
    let item = Arc::new(Field::new("item", DataType::Float32, false));
    let size = i32::try_from(dimension)
        .map_err(|_| RagError::InvalidArgument(format!("Vector dimension {} is too large", dimension)))?;
    let vectors = FixedSizeListArray::try_new(item, size, Arc::new(Float32Array::from(flat_values)), None)
        .map_err(|e| RagError::VectorStore(format!("Failed to create vector array: {}", e)))?;

    let column = |f: fn(&VectorRecord) -> &str| -> Arc<dyn Array> {
        Arc::new(StringArray::from(records.iter().map(f).collect::<Vec<_>>()))
    };

    let arrays: Vec<Arc<dyn Array>> = vec![
        column(|r| r.id.as_str()),
        Arc::new(StringArray::from(vec![namespace; records.len()])),
        Arc::new(vectors),
        column(|r| r.metadata.text.as_str()),
        column(|r| r.metadata.scrape_date.as_str()),
        column(|r| r.metadata.section.as_str()),
        column(|r| r.metadata.source.as_str()),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| RagError::VectorStore(format!("Failed to create record batch: {}", e)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredMatch>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let dates = string_column(batch, "scrape_date")?;
    let sections = string_column(batch, "section")?;
    let sources = string_column(batch, "source")?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let matches = (0..batch.num_rows())
        .map(|row| {
            let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });
            ScoredMatch {
                id: ids.value(row).to_string(),
                // Cosine distance, so higher is more similar
                score: 1.0 - distance,
                metadata: Some(VectorMetadata {
                    text: texts.value(row).to_string(),
                    scrape_date: dates.value(row).to_string(),
                    section: sections.value(row).to_string(),
                    source: sources.value(row).to_string(),
                }),
            }
        })
        .collect();

    Ok(matches)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::VectorStore(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::VectorStore(format!("Invalid {} column type", name)))
}

async fn table_dimension(table: &Table) -> Result<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| RagError::VectorStore(format!("Failed to get table schema: {}", e)))?;

    for field in schema.fields() {
        if field.name() == "vector" {
            if let DataType::FixedSizeList(_, size) = field.data_type() {
                return usize::try_from(*size)
                    .map_err(|_| RagError::VectorStore(format!("Invalid vector size {}", size)));
            }
        }
    }

    Err(RagError::VectorStore(
        "Could not find vector column or determine dimension".to_string(),
    ))
}

fn namespace_filter(namespace: &str) -> String {
    format!("namespace = '{}'", escape(namespace))
}

/// Escape a value for a single-quoted SQL string literal
fn escape(value: &str) -> String {
    value.replace('\'', "''")
}
