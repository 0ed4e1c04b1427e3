//! LanceDB vector index over the `passages` table.
//!
//! Rows follow [`risklens_core::passages::passage_schema`]: citation metadata
//! as Utf8 columns and the embedding as a `FixedSizeList<Float32>`.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use risklens_core::{MetadataFilter, Passage, PassageMetadata, VectorIndex, passages};
use tracing::{debug, info};

use crate::StoreError;

pub struct LanceIndex {
    db: lancedb::Connection,
}

impl LanceIndex {
    /// Connect to a LanceDB database at the given path.
    ///
    /// Creates the database directory if it doesn't exist.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let uri = path
            .to_str()
            .ok_or_else(|| StoreError::Other("non-UTF8 database path".into()))?;
        let db = lancedb::connect(uri).execute().await?;
        Ok(Self { db })
    }

    pub async fn table(&self) -> Result<lancedb::Table, StoreError> {
        let table = self.db.open_table(passages::TABLE).execute().await?;
        Ok(table)
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.table().await?.count_rows(None).await?)
    }

    pub async fn table_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.db.table_names().execute().await?)
    }

    /// Create (or replace) the `passages` table from embedded passages.
    pub async fn write(&self, rows: &[Passage]) -> Result<(), StoreError> {
        let dim = rows
            .first()
            .map(|p| p.embedding.len())
            .ok_or_else(|| StoreError::Other("no passages provided".into()))?;
        let batch = to_batch(rows, dim)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let existing = self.db.table_names().execute().await?;
        if existing.iter().any(|name| name == passages::TABLE) {
            self.db.drop_table(passages::TABLE, &[]).await?;
        }

        self.db
            .create_table(passages::TABLE, Box::new(reader))
            .execute()
            .await?;

        info!(table = passages::TABLE, rows = rows.len(), dim, "created LanceDB table");
        Ok(())
    }

    /// Nearest `limit` rows to `query_vector`, restricted by `filter`.
    pub async fn search_passages(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Passage>, StoreError> {
        let table = self.table().await?;
        let mut query = table.vector_search(query_vector)?.limit(limit);
        if let Some(predicate) = filter.and_then(MetadataFilter::to_sql) {
            query = query.only_if(predicate);
        }
        let batches: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

        let mut out = Vec::new();
        for batch in &batches {
            out.extend(from_batch(batch)?);
        }
        debug!(limit, rows = out.len(), "lance vector search");
        Ok(out)
    }
}

#[async_trait]
impl VectorIndex for LanceIndex {
    async fn search(
        &self,
        embedding: &[f32],
        fetch_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> anyhow::Result<Vec<Passage>> {
        Ok(self.search_passages(embedding, fetch_k, filter).await?)
    }
}

fn to_batch(rows: &[Passage], dim: usize) -> Result<RecordBatch, StoreError> {
    if let Some(bad) = rows.iter().find(|p| p.embedding.len() != dim) {
        return Err(StoreError::Dimension {
            expected: dim,
            actual: bad.embedding.len(),
        });
    }
    let width = i32::try_from(dim)
        .map_err(|_| StoreError::Other(format!("embedding width {dim} too large")))?;

    let values =
        Float32Array::from_iter_values(rows.iter().flat_map(|p| p.embedding.iter().copied()));
    let item = Arc::new(Field::new("item", DataType::Float32, true));
    let embeddings = FixedSizeListArray::try_new(item, width, Arc::new(values), None)?;

    let schema = Arc::new(passages::passage_schema(width));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            utf8_column(rows, |p| &p.id),
            utf8_column(rows, |p| &p.text),
            utf8_column(rows, |p| &p.metadata.issuer),
            utf8_column(rows, |p| &p.metadata.fiscal_year),
            utf8_column(rows, |p| &p.metadata.section),
            utf8_column(rows, |p| &p.metadata.source),
            Arc::new(embeddings),
        ],
    )?;
    Ok(batch)
}

fn utf8_column<'a>(rows: &'a [Passage], field: impl Fn(&'a Passage) -> &'a str) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(rows.iter().map(field)))
}

fn from_batch(batch: &RecordBatch) -> Result<Vec<Passage>, StoreError> {
    let ids = string_column(batch, passages::ID)?;
    let texts = string_column(batch, passages::TEXT)?;
    let issuers = string_column(batch, passages::ISSUER)?;
    let years = string_column(batch, passages::FISCAL_YEAR)?;
    let sections = string_column(batch, passages::SECTION)?;
    let sources = string_column(batch, passages::SOURCE)?;
    let embeddings = batch
        .column_by_name(passages::EMBEDDING)
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| {
            StoreError::Other("embedding column missing or not a fixed-size list".into())
        })?;

    let get = |col: &StringArray, row: usize| -> String {
        if col.is_null(row) {
            String::new()
        } else {
            col.value(row).to_string()
        }
    };

    (0..batch.num_rows())
        .map(|row| {
            let vector = embeddings.value(row);
            let vector = vector
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| StoreError::Other("embedding values not f32".into()))?;
            Ok(Passage {
                id: get(ids, row),
                text: get(texts, row),
                embedding: vector.values().to_vec(),
                metadata: PassageMetadata {
                    issuer: get(issuers, row),
                    fiscal_year: get(years, row),
                    section: get(sections, row),
                    source: get(sources, row),
                },
            })
        })
        .collect()
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Other(format!("{name} column missing or not Utf8")))
}
