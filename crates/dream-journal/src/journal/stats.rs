//! Statistics over archived analyses, recomputed on every request.
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::analysis::{parse_analysis, AnalysisField};
use crate::error::JournalResult;
use crate::journal_db::{ArchivedDream, JournalDatabase, Namespace, Query, Stored};
use crate::utils::TextUtils;

pub const TOP_TERMS_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPresence {
    pub key: &'static str,
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermCount {
    pub term: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldTopTerms {
    pub key: &'static str,
    pub label: &'static str,
    pub terms: Vec<TermCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalStats {
    pub total_dreams: usize,
    pub analyzed_dreams: usize,
    /// Dreams whose analysis could not be parsed.
    pub skipped: usize,
    pub matched_dreams: usize,
    pub presence: Vec<FieldPresence>,
    pub top_terms: Vec<FieldTopTerms>,
}

/// Frequency table that remembers first-encounter order for tie breaking.
#[derive(Default)]
struct TermTally {
    index: HashMap<String, usize>,
    counts: Vec<(String, usize)>,
}

impl TermTally {
    fn add(&mut self, term: String) {
        match self.index.get(&term) {
            Some(&position) => self.counts[position].1 += 1,
            None => {
                self.index.insert(term.clone(), self.counts.len());
                self.counts.push((term, 1));
            }
        }
    }

    fn top(mut self, limit: usize) -> Vec<TermCount> {
        // Stable sort: equal counts keep encounter order.
        self.counts.sort_by(|a, b| b.1.cmp(&a.1));
        self.counts
            .into_iter()
            .take(limit)
            .map(|(term, count)| TermCount { term, count })
            .collect()
    }
}

pub fn compute_stats(dreams: &[Stored<ArchivedDream>]) -> JournalStats {
    let mut presence: HashMap<AnalysisField, usize> = HashMap::new();
    let mut tallies: HashMap<AnalysisField, TermTally> = HashMap::new();
    let mut analyzed = 0;
    let mut skipped = 0;

    for dream in dreams {
        let analysis = match parse_analysis(&dream.data.analysis_text) {
            Ok(map) => map,
            Err(reason) => {
                warn!("Skipping dream {} in statistics: {}", dream.id, reason);
                skipped += 1;
                continue;
            }
        };
        analyzed += 1;

        for field in AnalysisField::ALL {
            if let Some(value) = field.value_in(&analysis) {
                *presence.entry(field).or_default() += 1;
                if AnalysisField::TERM_FIELDS.contains(&field) {
                    let tally = tallies.entry(field).or_default();
                    for term in TextUtils::significant_terms(value) {
                        tally.add(term);
                    }
                }
            }
        }
    }
    debug!("Computed statistics over {} dreams ({} skipped)", dreams.len(), skipped);

    JournalStats {
        total_dreams: dreams.len(),
        analyzed_dreams: analyzed,
        skipped,
        matched_dreams: dreams.iter().filter(|d| d.data.is_matched()).count(),
        presence: AnalysisField::ALL
            .iter()
            .map(|field| FieldPresence {
                key: field.key(),
                label: field.label(),
                count: presence.get(field).copied().unwrap_or(0),
            })
            .collect(),
        top_terms: AnalysisField::TERM_FIELDS
            .iter()
            .map(|field| FieldTopTerms {
                key: field.key(),
                label: field.label(),
                terms: tallies.remove(field).unwrap_or_default().top(TOP_TERMS_LIMIT),
            })
            .collect(),
    }
}

pub struct StatsAggregator {
    db: Arc<JournalDatabase>,
}

impl StatsAggregator {
    pub fn new(db: Arc<JournalDatabase>) -> Self {
        Self { db }
    }

    /// Dreams are tallied oldest first, so ties favour the earliest mention.
    pub fn collect(&self, ns: &Namespace) -> JournalResult<JournalStats> {
        let dreams = self.db.documents.list::<ArchivedDream>(ns, None, &Query::oldest_first())?;
        Ok(compute_stats(&dreams))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn archived(id: &str, analysis: &str) -> Stored<ArchivedDream> {
        Stored {
            id: id.to_string(),
            data: ArchivedDream {
                dream_text: "text".to_string(),
                analysis_text: analysis.to_string(),
                dream_title: String::new(),
                timestamp: Utc::now(),
                matched_reality_event: String::new(),
            },
        }
    }

    fn presence_of(stats: &JournalStats, key: &str) -> usize {
        stats.presence.iter().find(|p| p.key == key).map(|p| p.count).unwrap()
    }

    fn terms_of<'a>(stats: &'a JournalStats, key: &str) -> Vec<&'a str> {
        stats
            .top_terms
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.terms.iter().map(|c| c.term.as_str()).collect())
            .unwrap()
    }

    #[test]
    fn unparsable_analyses_are_skipped_not_counted() {
        let dreams = vec![
            archived("a", r#"{"location":"beach","time":""}"#),
            archived("b", "this is not json"),
            archived("c", r#"{"location":"  ","time":"dawn"}"#),
        ];
        let stats = compute_stats(&dreams);

        assert_eq!(stats.total_dreams, 3);
        assert_eq!(stats.analyzed_dreams, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(presence_of(&stats, "location"), 1);
        assert_eq!(presence_of(&stats, "time"), 1);
        assert_eq!(stats.presence.len(), 12);
    }

    #[test]
    fn top_terms_are_capped_and_filtered() {
        let dreams = vec![
            archived("a", r#"{"actionsPerformed":"running running jumping swimming a I"}"#),
            archived("b", r#"{"actionsPerformed":"flying climbing running digging the of"}"#),
        ];
        let stats = compute_stats(&dreams);
        let terms = terms_of(&stats, "actionsPerformed");

        assert_eq!(terms.len(), TOP_TERMS_LIMIT);
        assert_eq!(terms[0], "running");
        assert!(!terms.iter().any(|t| t.len() <= 1 || TextUtils::is_stop_word(t)));
    }

    #[test]
    fn ties_keep_first_encounter_order() {
        let dreams = vec![archived("a", r#"{"location":"attic cellar garden","messages":"Hello, world"}"#)];
        let stats = compute_stats(&dreams);
        assert_eq!(terms_of(&stats, "location"), vec!["attic", "cellar", "garden"]);
        assert_eq!(terms_of(&stats, "messages"), vec!["hello", "world"]);
        assert!(terms_of(&stats, "spatialAwareness").is_empty());
    }

    #[test]
    fn time_is_not_a_term_field() {
        let stats = compute_stats(&[archived("a", r#"{"time":"midnight"}"#)]);
        assert!(stats.top_terms.iter().all(|t| t.key != "time"));
        assert_eq!(stats.top_terms.len(), 6);
    }

    #[test]
    fn aggregator_reads_from_store() {
        let db = Arc::new(JournalDatabase::new_in_memory().unwrap());
        let ns = Namespace::new("app", "u");
        db.documents.create(&ns, None, archived("", r#"{"familiarPersons":"my sister"}"#).data).unwrap();

        let stats = StatsAggregator::new(db).collect(&ns).unwrap();
        assert_eq!(presence_of(&stats, "familiarPersons"), 1);
        assert_eq!(terms_of(&stats, "familiarPersons"), vec!["sister"]);
    }
}
