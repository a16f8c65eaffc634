//! Full-text search over discovered tools, backed by an in-RAM tantivy
//! index rebuilt from the current scan.

use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{STORED, Schema, TEXT, Value as _};
use tantivy::{Index, IndexReader, ReloadPolicy, doc};

use crate::error::McpError;
use crate::manifest::ToolSpec;

/// One search hit
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSearchResult {
    pub name: String,
    pub description: String,
    pub score: f32,
}

/// Search index over one scan's worth of tools
pub struct ToolIndex {
    reader: IndexReader,
    query_parser: QueryParser,
    schema: Schema,
}

impl ToolIndex {
    /// Build the index from a scan result.
    ///
    /// # Errors
    ///
    /// Returns an error if the index writer or reader cannot be created.
    pub fn build(tools: &[ToolSpec]) -> Result<Self, McpError> {
        let mut schema_builder = Schema::builder();
        let name_field = schema_builder.add_text_field("name", TEXT | STORED);
        let description_field = schema_builder.add_text_field("description", TEXT | STORED);
        let keywords_field = schema_builder.add_text_field("keywords", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema.clone());
        let mut writer = index
            .writer(15_000_000)
            .map_err(|e| McpError::Search(format!("failed to create index writer: {e}")))?;

        for tool in tools {
            writer
                .add_document(doc!(
                    name_field => tool.name.as_str(),
                    description_field => tool.manifest.description.as_str(),
                    keywords_field => tool.manifest.keywords.join(" "),
                ))
                .map_err(|e| McpError::Search(format!("failed to index tool: {e}")))?;
        }

        writer
            .commit()
            .map_err(|e| McpError::Search(format!("failed to commit index: {e}")))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| McpError::Search(format!("failed to create reader: {e}")))?;

        let query_parser = QueryParser::for_index(&index, vec![name_field, description_field, keywords_field]);

        Ok(Self {
            reader,
            query_parser,
            schema,
        })
    }

    /// Run a query, returning up to `limit` hits by relevance.
    ///
    /// # Errors
    ///
    /// Returns an error when the query cannot be parsed or the search
    /// itself fails.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<ToolSearchResult>, McpError> {
        let searcher = self.reader.searcher();
        let parsed = self
            .query_parser
            .parse_query(query)
            .map_err(|e| McpError::Search(format!("invalid search query: {e}")))?;

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit.max(1)))
            .map_err(|e| McpError::Search(format!("search failed: {e}")))?;

        let name_field = self
            .schema
            .get_field("name")
            .map_err(|_| McpError::Search("missing schema field: name".to_owned()))?;
        let description_field = self
            .schema
            .get_field("description")
            .map_err(|_| McpError::Search("missing schema field: description".to_owned()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let document: tantivy::TantivyDocument = searcher
                .doc(address)
                .map_err(|e| McpError::Search(format!("failed to retrieve doc: {e}")))?;

            let text = |field| -> String {
                document
                    .get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_owned()
            };

            results.push(ToolSearchResult {
                name: text(name_field),
                description: text(description_field),
                score,
            });
        }

        Ok(results)
    }
}
