/// Arrow schema of the passage table held by the vector store.
pub mod passages {
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    pub const TABLE: &str = "passages";

    pub const ID: &str = "chunk_id";
    pub const TEXT: &str = "text";
    pub const ISSUER: &str = "issuer";
    pub const FISCAL_YEAR: &str = "fiscal_year";
    pub const SECTION: &str = "section";
    pub const SOURCE: &str = "source";
    pub const EMBEDDING: &str = "embedding";

    /// Schema for indexed passages with `dim`-wide embeddings.
    pub fn passage_schema(dim: i32) -> Schema {
        Schema::new(vec![
            Field::new(ID, DataType::Utf8, false),
            Field::new(TEXT, DataType::Utf8, false),
            Field::new(ISSUER, DataType::Utf8, false),
            Field::new(FISCAL_YEAR, DataType::Utf8, false),
            Field::new(SECTION, DataType::Utf8, true),
            Field::new(SOURCE, DataType::Utf8, true),
            Field::new(
                EMBEDDING,
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
                true,
            ),
        ])
    }
}
