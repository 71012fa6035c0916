use std::collections::HashSet;
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, INDEXED, STORED,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use super::error::{Result, SearchError};
use super::tokenizer::{query_terms, ForwardTokenizer, FORWARD_TOKENIZER};
use super::FileId;

/// In-memory tantivy index keyed by [`FileId`].
///
/// Mutations are staged until [`IndexEngine::commit`]; queries only see
/// committed state, so a reader never observes a half-applied batch.
pub struct IndexEngine {
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    f_id: Field,
    f_text: Field,
    ids: HashSet<FileId>,
}

impl IndexEngine {
    pub fn new(writer_heap_bytes: usize) -> Result<Self> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(FORWARD_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqs),
        );
        let f_id = schema_builder.add_u64_field("id", INDEXED | STORED);
        let f_text = schema_builder.add_text_field("text", text_options);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        index
            .tokenizers()
            .register(FORWARD_TOKENIZER, ForwardTokenizer);

        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        // One indexing thread: documents are small and commits are frequent
        let writer = index.writer_with_num_threads(1, writer_heap_bytes)?;

        Ok(Self {
            reader,
            writer: Mutex::new(writer),
            f_id,
            f_text,
            ids: HashSet::new(),
        })
    }

    /// Stage a new document. Fails if `id` is already indexed.
    pub fn add(&mut self, id: FileId, text: &str) -> Result<()> {
        if self.ids.contains(&id) {
            return Err(SearchError::DuplicateId(id));
        }
        let writer = self.writer.lock().map_err(SearchError::poisoned)?;
        writer.add_document(self.document(id, text))?;
        drop(writer);
        self.ids.insert(id);
        Ok(())
    }

    /// Replace the text of an indexed document. Fails if `id` is unknown.
    pub fn update(&mut self, id: FileId, text: &str) -> Result<()> {
        if !self.ids.contains(&id) {
            return Err(SearchError::UnknownId(id));
        }
        let writer = self.writer.lock().map_err(SearchError::poisoned)?;
        writer.delete_term(self.id_term(id));
        writer.add_document(self.document(id, text))?;
        Ok(())
    }

    /// Stage removal of `id`; returns false if it was not indexed.
    pub fn remove(&mut self, id: FileId) -> Result<bool> {
        if !self.ids.remove(&id) {
            return Ok(false);
        }
        let writer = self.writer.lock().map_err(SearchError::poisoned)?;
        writer.delete_term(self.id_term(id));
        Ok(true)
    }

    /// Commit staged mutations and make them visible to queries
    pub fn commit(&mut self) -> Result<()> {
        let mut writer = self.writer.lock().map_err(SearchError::poisoned)?;
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }

    /// Ids of documents matching `text`, best score first, at most `limit`.
    ///
    /// With `fuzzy` a document matching any query term is returned; without it
    /// every term must match. Terms match as prefixes of indexed words.
    pub fn query(&self, text: &str, limit: usize, fuzzy: bool) -> Result<Vec<FileId>> {
        let terms = query_terms(text);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let occur = if fuzzy { Occur::Should } else { Occur::Must };
        let subqueries: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|term| {
                let term = Term::from_field_text(self.f_text, term);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::Basic));
                (occur, query)
            })
            .collect();
        let query = BooleanQuery::new(subqueries);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut ids = Vec::with_capacity(top_docs.len());
        for (_score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            if let Some(id) = doc.get_first(self.f_id).and_then(|v| v.as_u64()) {
                ids.push(FileId(id));
            }
        }
        Ok(ids)
    }

    pub fn contains(&self, id: FileId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Committed document count as seen by the reader
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn document(&self, id: FileId, text: &str) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        doc.add_u64(self.f_id, id.get());
        doc.add_text(self.f_text, text);
        doc
    }

    fn id_term(&self, id: FileId) -> Term {
        Term::from_field_u64(self.f_id, id.get())
    }
}
