use std::collections::HashMap;

use crate::tokenizer::tokenize;

/// BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f32,
    /// Length normalization strength.
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Immutable BM25 inverted index over a fixed set of documents.
///
/// Documents are addressed by the slot the caller assigns them (their
/// position in the corpus). The structure is built in one pass and never
/// mutated afterwards; the owning index replaces it wholesale on rebuild.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    params: Bm25Params,
    /// term -> [(slot, term_frequency)]
    postings: HashMap<String, Vec<(usize, f32)>>,
    /// slot -> document length (token count); absent slots were not indexed
    doc_lengths: HashMap<usize, f32>,
    /// Average document length across all indexed documents.
    avg_doc_length: f32,
}

impl Bm25Index {
    /// Create an empty index.
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Build an index from `(slot, text)` pairs.
    pub fn build<'a, I>(params: Bm25Params, docs: I) -> Self
    where
        I: IntoIterator<Item = (usize, &'a str)>,
    {
        let mut index = Self::new(params);
        let mut total_len = 0.0f32;

        for (slot, text) in docs {
            let tokens = tokenize(text);
            let doc_len = tokens.len() as f32;
            total_len += doc_len;

            // Count term frequencies for this document
            let mut term_freq: HashMap<String, f32> = HashMap::new();
            for token in tokens {
                *term_freq.entry(token).or_insert(0.0) += 1.0;
            }
            for (term, freq) in term_freq {
                index.postings.entry(term).or_default().push((slot, freq));
            }
            index.doc_lengths.insert(slot, doc_len);
        }

        if !index.doc_lengths.is_empty() {
            index.avg_doc_length = total_len / index.doc_lengths.len() as f32;
        }
        index
    }

    /// Score every indexed document that shares at least one term with the query.
    ///
    /// Uses the standard BM25 scoring formula:
    /// ```text
    /// score = sum over query terms of:
    ///   IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl / avgdl))
    /// ```
    /// where:
    /// - `IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1.0)`
    /// - `tf` = term frequency of term t in the document
    /// - `dl` = document length
    /// - `avgdl` = average document length
    /// - `N` = total number of documents
    /// - `df` = number of documents containing term t
    ///
    /// Repeated query terms contribute once per occurrence.
    pub fn score(&self, query: &str) -> HashMap<usize, f32> {
        let mut scores: HashMap<usize, f32> = HashMap::new();
        if self.doc_lengths.is_empty() {
            return scores;
        }

        let n = self.doc_lengths.len() as f32;
        let avgdl = if self.avg_doc_length > 0.0 {
            self.avg_doc_length
        } else {
            1.0
        };
        let Bm25Params { k1, b } = self.params;

        for token in tokenize(query) {
            let Some(postings) = self.postings.get(&token) else {
                continue;
            };
            let df = postings.len() as f32;
            // IDF with Robertson's formula (always non-negative)
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for &(slot, tf) in postings {
                let dl = self.doc_lengths.get(&slot).copied().unwrap_or(0.0);
                let numerator = tf * (k1 + 1.0);
                let denominator = tf + k1 * (1.0 - b + b * dl / avgdl);
                *scores.entry(slot).or_insert(0.0) += idf * numerator / denominator;
            }
        }

        scores
    }

    /// Number of documents the index was built over.
    pub fn document_count(&self) -> usize {
        self.doc_lengths.len()
    }

    /// Number of distinct terms.
    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }

    /// Average document length in tokens.
    pub fn avg_doc_length(&self) -> f32 {
        self.avg_doc_length
    }
}
