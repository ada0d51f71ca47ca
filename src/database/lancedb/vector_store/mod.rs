
use super::{ChunkMetadata, ContentType, VectorRecord};
use crate::RagError;
use crate::config::{Config, DistanceMetric};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Vector collection backed by LanceDB
pub struct VectorStore {
    connection: Connection,
    table: Table,
    collection_name: String,
    index_name: String,
    vector_dimension: usize,
    distance: DistanceMetric,
}

/// One hit from a similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Higher is more similar
    pub similarity_score: f32,
    pub distance: f32,
}

impl VectorStore {
    /// Connect to the configured store and open (or create) the collection
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, RagError> {
        let uri = config.store_uri();
        debug!("Connecting to vector store at: {}", uri);

        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to connect to vector store: {}", e)))?;

        let collection_name = config.store.collection_name.clone();
        let vector_dimension = config.ollama.embedding_dimension as usize;

        let table = Self::open_or_create_table(&connection, &collection_name, vector_dimension)
            .await?;

        info!(
            "Vector store ready: collection '{}' ({} dimensions, {} distance)",
            collection_name, vector_dimension, config.store.distance
        );

        Ok(Self {
            connection,
            table,
            collection_name,
            index_name: config.store.index_name.clone(),
            vector_dimension,
            distance: config.store.distance,
        })
    }

    async fn open_or_create_table(
        connection: &Connection,
        collection_name: &str,
        vector_dimension: usize,
    ) -> Result<Table, RagError> {
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to list collections: {}", e)))?;

        if table_names.iter().any(|name| name == collection_name) {
            debug!("Collection '{}' exists, checking vector dimension", collection_name);
            let table = connection
                .open_table(collection_name)
                .execute()
                .await
                .map_err(|e| RagError::Store(format!("Failed to open collection: {}", e)))?;

            let existing = Self::detect_vector_dimension(&table).await?;
            if existing != vector_dimension {
                error!(
                    "Collection '{}' stores {}-dimensional vectors but the embedding model produces {}",
                    collection_name, existing, vector_dimension
                );
                return Err(RagError::Store(format!(
                    "Collection '{}' has vector dimension {} but {} is configured",
                    collection_name, existing, vector_dimension
                )));
            }
            return Ok(table);
        }

        info!(
            "Creating collection '{}' with {} dimensions",
            collection_name, vector_dimension
        );

        connection
            .create_empty_table(collection_name, create_schema(vector_dimension))
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to create collection: {}", e)))
    }

    /// Detect vector dimension from an existing table schema
    async fn detect_vector_dimension(table: &Table) -> Result<usize, RagError> {
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Store(format!("Failed to get collection schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(RagError::Store(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    #[inline]
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    #[inline]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    #[inline]
    pub fn distance(&self) -> DistanceMetric {
        self.distance
    }

    /// Write every record in one batch; any record with the wrong dimension
    /// rejects the whole batch before anything is written
    #[inline]
    pub async fn upsert_batch(&self, records: &[VectorRecord]) -> Result<usize, RagError> {
        if records.is_empty() {
            debug!("No records to store");
            return Ok(0);
        }

        if let Some(bad) = records
            .iter()
            .find(|r| r.vector.len() != self.vector_dimension)
        {
            return Err(RagError::Store(format!(
                "Record {} has {} dimensions, collection '{}' expects {}",
                bad.id,
                bad.vector.len(),
                self.collection_name,
                self.vector_dimension
            )));
        }

        debug!("Storing batch of {} records", records.len());

        let record_batch = self.create_record_batch(records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to insert records: {}", e)))?;

        info!(
            "Stored {} records in collection '{}'",
            records.len(),
            self.collection_name
        );
        Ok(records.len())
    }

    fn create_record_batch(&self, records: &[VectorRecord]) -> Result<RecordBatch, RagError> {
        let len = records.len();
        let vector_dim = self.vector_dimension;

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut texts = Vec::with_capacity(len);
        let mut source_paths = Vec::with_capacity(len);
        let mut page_numbers = Vec::with_capacity(len);
        let mut content_types = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            texts.push(record.text.as_str());
            source_paths.push(record.metadata.source_path.as_str());
            page_numbers.push(record.metadata.page_number);
            content_types.push(record.metadata.content_type.as_str());
            created_ats.push(record.created_at.as_str());
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| RagError::Store(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(source_paths)),
            Arc::new(UInt32Array::from(page_numbers)),
            Arc::new(StringArray::from(content_types)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(create_schema(vector_dim), arrays)
            .map_err(|e| RagError::Store(format!("Failed to create record batch: {}", e)))
    }

    /// k-nearest-neighbor search, best match first
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, RagError> {
        debug!("Searching for similar vectors with limit: {}", limit);

        if limit == 0 || self.count_records().await? == 0 {
            return Ok(Vec::new());
        }

        let results = self
            .table
            .vector_search(query_vector)
            .map_err(|e| RagError::Store(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(lance_distance(self.distance))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to execute search: {}", e)))?;

        let mut search_results = self.parse_search_results_stream(results).await?;

        search_results.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        search_results.truncate(limit);
        Ok(search_results)
    }

    async fn parse_search_results_stream(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>, RagError> {
        let mut search_results = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Store(format!("Failed to read result stream: {}", e)))?
        {
            search_results.extend(self.parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    fn parse_search_batch(&self, batch: &RecordBatch) -> Result<Vec<SearchResult>, RagError> {
        let texts = string_column(batch, "text")?;
        let source_paths = string_column(batch, "source_path")?;
        let content_types = string_column(batch, "content_type")?;
        let page_numbers = batch
            .column_by_name("page_number")
            .ok_or_else(|| RagError::Store("Missing page_number column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| RagError::Store("Invalid page_number column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut search_results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let content_type = content_types
                .value(row)
                .parse::<ContentType>()
                .map_err(RagError::Store)?;

            let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            search_results.push(SearchResult {
                text: texts.value(row).to_string(),
                metadata: ChunkMetadata {
                    source_path: source_paths.value(row).to_string(),
                    page_number: page_numbers.value(row),
                    content_type,
                },
                similarity_score: similarity_from_distance(self.distance, distance),
                distance,
            });
        }

        Ok(search_results)
    }

    /// Total number of stored records
    #[inline]
    pub async fn count_records(&self) -> Result<u64, RagError> {
        let count = self
            .table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Store(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Build the named ANN index over the vector column
    #[inline]
    pub async fn create_vector_index(&self) -> Result<(), RagError> {
        info!(
            "Creating vector index '{}' on collection '{}'",
            self.index_name, self.collection_name
        );

        self.table
            .create_index(&["vector"], Index::Auto)
            .name(self.index_name.clone())
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to create vector index: {}", e)))?;

        info!("Vector index '{}' created", self.index_name);
        Ok(())
    }

    /// Check that the connection can still see the collection
    #[inline]
    pub async fn validate_integrity(&self) -> Result<bool, RagError> {
        let table_names = match self.connection.table_names().execute().await {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to list collections during integrity check: {}", e);
                return Ok(false);
            }
        };

        if !table_names.iter().any(|name| name == &self.collection_name) {
            error!(
                "Collection '{}' missing during integrity check",
                self.collection_name
            );
            return Ok(false);
        }

        match self.table.count_rows(None).await {
            Ok(count) => {
                debug!("Integrity check passed, {} rows found", count);
                Ok(true)
            }
            Err(e) => {
                error!("Failed to count rows during integrity check: {}", e);
                Ok(false)
            }
        }
    }
}

/// Create schema with the specified vector dimension
fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("source_path", DataType::Utf8, false),
        Field::new("page_number", DataType::UInt32, false),
        Field::new("content_type", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Store(format!("Invalid {} column type", name)))
}

fn lance_distance(metric: DistanceMetric) -> DistanceType {
    match metric {
        DistanceMetric::Cosine => DistanceType::Cosine,
        DistanceMetric::L2 => DistanceType::L2,
        DistanceMetric::Dot => DistanceType::Dot,
    }
}

/// Map a store distance to a score where higher means closer
fn similarity_from_distance(metric: DistanceMetric, distance: f32) -> f32 {
    match metric {
        DistanceMetric::Cosine | DistanceMetric::Dot => 1.0 - distance,
        DistanceMetric::L2 => 1.0 / (1.0 + distance),
    }
}
