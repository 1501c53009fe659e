//! Candidate extraction from scored articles.
//!
//! An article arrives as `[url, metadata, {"text": {"s": [...],
//! "neg_log_probability": [...]}}]`. For every query the article matched,
//! each sentence containing the query's search term that has `adjacent`
//! sentences on both sides becomes one extract of `2 * adjacent + 1`
//! sentences, scored by the summed negative log-likelihoods.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::constants::criteria::EXTRACT_JOINER;
use crate::criteria::target_term;
use crate::data::{Candidate, CriterionKey, Query, RecordId, SpatialTag};

const MATCHING_QUERIES_FIELD: &str = "matching_queries";
const ARCHIVE_METADATA_FIELD: &str = "kb_oai_metadata";
const SPATIAL_FIELD: &str = "spatial_distribution";

#[derive(Deserialize, Serialize)]
struct ArticleText {
    text: ScoredSentences,
}

#[derive(Deserialize, Serialize)]
struct ScoredSentences {
    s: Vec<String>,
    neg_log_probability: Vec<f64>,
}

#[derive(Deserialize, Serialize)]
struct RawArticle(RecordId, Value, ArticleText);

/// An article with per-sentence language-model scores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawArticle", into = "RawArticle")]
pub struct ScoredArticle {
    /// Document identifier (archive resolver URL).
    pub url: RecordId,
    /// Archive metadata, passed through to selected candidates.
    pub metadata: Value,
    /// Sentences in document order.
    pub sentences: Vec<String>,
    /// Negative log-likelihood of each sentence.
    pub nlls: Vec<f64>,
}

impl From<RawArticle> for ScoredArticle {
    fn from(RawArticle(url, metadata, text): RawArticle) -> Self {
        Self {
            url,
            metadata,
            sentences: text.text.s,
            nlls: text.text.neg_log_probability,
        }
    }
}

impl From<ScoredArticle> for RawArticle {
    fn from(article: ScoredArticle) -> Self {
        RawArticle(
            article.url,
            article.metadata,
            ArticleText {
                text: ScoredSentences {
                    s: article.sentences,
                    neg_log_probability: article.nlls,
                },
            },
        )
    }
}

impl ScoredArticle {
    /// Queries this article was retrieved for.
    pub fn matching_queries(&self) -> Vec<Query> {
        self.metadata
            .get(MATCHING_QUERIES_FIELD)
            .and_then(Value::as_array)
            .map(|queries| {
                queries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Spatial distribution from the archive metadata, empty when absent.
    pub fn spatial(&self) -> SpatialTag {
        self.metadata
            .get(ARCHIVE_METADATA_FIELD)
            .and_then(|meta| meta.get(SPATIAL_FIELD))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

/// Sentence windows around each case-insensitive occurrence of `term`.
///
/// Returns `(text, score)` pairs. Matches too close to either end of the
/// article to have `adjacent` neighbours on both sides are skipped.
pub fn extract_windows(
    sentences: &[String],
    nlls: &[f64],
    term: &str,
    adjacent: usize,
) -> Vec<(String, f64)> {
    let needle = term.to_lowercase();
    if needle.is_empty() || sentences.len() < 2 * adjacent + 1 {
        return Vec::new();
    }
    (adjacent..sentences.len() - adjacent)
        .filter(|&idx| sentences[idx].to_lowercase().contains(&needle))
        .map(|idx| {
            let window = idx - adjacent..=idx + adjacent;
            (
                sentences[window.clone()].join(EXTRACT_JOINER),
                nlls[window].iter().sum(),
            )
        })
        .collect()
}

/// Build candidates for one article across all its matching queries.
pub fn extract_candidates(article: &ScoredArticle, adjacent: usize) -> Vec<Candidate> {
    if article.sentences.len() != article.nlls.len() {
        warn!(
            url = %article.url,
            sentences = article.sentences.len(),
            scores = article.nlls.len(),
            "[panning:extracts] sentence/score length mismatch; article skipped"
        );
        return Vec::new();
    }
    let spatial = article.spatial();
    article
        .matching_queries()
        .into_iter()
        .flat_map(|query| {
            let key = CriterionKey::new(query.as_str(), spatial.as_str());
            extract_windows(
                &article.sentences,
                &article.nlls,
                target_term(&query),
                adjacent,
            )
            .into_iter()
            .map(move |(text, score)| Candidate {
                source: article.url.clone(),
                key: key.clone(),
                text,
                score,
                metadata: article.metadata.clone(),
            })
        })
        .collect()
}

/// Candidates for every article, in article order.
pub fn candidates_from_articles(articles: &[ScoredArticle], adjacent: usize) -> Vec<Candidate> {
    articles
        .iter()
        .flat_map(|article| extract_candidates(article, adjacent))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sentences(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn article(sentence_list: &[&str], nlls: Vec<f64>, queries: &[&str]) -> ScoredArticle {
        ScoredArticle {
            url: "http://resolver.kb.nl/resolve?urn=ddd:1:mpeg21:a0001:ocr".into(),
            metadata: json!({
                "kb_oai_metadata": {"spatial_distribution": "Landelijk"},
                "matching_queries": queries,
            }),
            sentences: sentences(sentence_list),
            nlls,
        }
    }

    #[test]
    fn windows_need_neighbours_on_both_sides() {
        let sents = sentences(&["Moor one", "two", "three Moor", "four", "five", "MOOR six"]);
        let nlls = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        let windows = extract_windows(&sents, &nlls, "moor", 1);

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].0, "two\n\nthree Moor\n\nfour");
        assert!((windows[0].1 - 9.0).abs() < 1e-12);
    }

    #[test]
    fn zero_adjacency_yields_single_sentences() {
        let sents = sentences(&["a moor", "none", "Moor b"]);
        let windows = extract_windows(&sents, &[1.0, 2.0, 3.0], "moor", 0);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1], ("Moor b".to_string(), 3.0));
    }

    #[test]
    fn short_articles_yield_nothing() {
        let sents = sentences(&["moor", "moor"]);
        assert!(extract_windows(&sents, &[1.0, 1.0], "moor", 1).is_empty());
    }

    #[test]
    fn candidates_carry_query_and_spatial_key() {
        let article = article(
            &["a", "the turk came", "b"],
            vec![1.0, 2.0, 3.0],
            &["turk AND type=artikel", "moor AND type=artikel"],
        );

        let candidates = extract_candidates(&article, 1);

        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].key,
            CriterionKey::new("turk AND type=artikel", "Landelijk")
        );
        assert!((candidates[0].score - 6.0).abs() < 1e-12);
        assert_eq!(candidates[0].source, article.url);
    }

    #[test]
    fn mismatched_scores_skip_the_article() {
        let article = article(&["a", "turk", "b"], vec![1.0], &["turk"]);
        assert!(extract_candidates(&article, 1).is_empty());
    }

    #[test]
    fn article_reads_from_positional_json() {
        let raw = json!([
            "http://resolver.kb.nl/resolve?urn=x",
            {"matching_queries": ["berber AND type=artikel"]},
            {"text": {"title": "t", "s": ["een", "twee"], "neg_log_probability": [1.5, 2.5]}}
        ]);

        let article: ScoredArticle = serde_json::from_value(raw).unwrap();

        assert_eq!(article.url, "http://resolver.kb.nl/resolve?urn=x");
        assert_eq!(article.sentences, vec!["een", "twee"]);
        assert_eq!(article.nlls, vec![1.5, 2.5]);
        assert_eq!(article.matching_queries(), vec!["berber AND type=artikel"]);
        assert_eq!(article.spatial(), "");
    }
}
