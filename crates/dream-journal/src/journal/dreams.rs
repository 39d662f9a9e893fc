//! Dream lifecycle: drafts, analysis-and-archive, archived dreams and their
//! reality-event match.
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::analysis::{AnalysisView, GenerativeBackend};
use crate::error::{JournalError, JournalResult};
use crate::journal_db::{ArchivedDream, DraftDream, JournalDatabase, Namespace, Query, Stored};
use crate::metrics;

/// Fields of a draft that may be edited. `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct DraftChanges {
    pub dream_text: Option<String>,
    pub dream_title: Option<String>,
    pub is_pre_analyzed: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedDreamDetail {
    #[serde(flatten)]
    pub dream: Stored<ArchivedDream>,
    pub analysis: AnalysisView,
}

pub struct DreamLifecycle {
    db: Arc<JournalDatabase>,
    backend: Arc<dyn GenerativeBackend>,
}

impl DreamLifecycle {
    pub fn new(db: Arc<JournalDatabase>, backend: Arc<dyn GenerativeBackend>) -> Self {
        Self { db, backend }
    }

    pub fn save_draft(
        &self,
        ns: &Namespace,
        dream_text: &str,
        dream_title: &str,
        is_pre_analyzed: bool,
    ) -> JournalResult<Stored<DraftDream>> {
        if dream_text.trim().is_empty() {
            return Err(JournalError::invalid("Please write down your dream before saving it"));
        }
        let draft = DraftDream {
            dream_text: dream_text.to_string(),
            dream_title: dream_title.trim().to_string(),
            timestamp: Utc::now(),
            is_pre_analyzed,
        };
        let stored = self.db.documents.create(ns, None, draft)?;
        info!("Saved draft dream {} for {}", stored.id, ns);
        Ok(stored)
    }

    pub fn update_draft(
        &self,
        ns: &Namespace,
        draft_id: &str,
        changes: DraftChanges,
    ) -> JournalResult<Stored<DraftDream>> {
        let mut patch = serde_json::Map::new();
        if let Some(text) = changes.dream_text {
            if text.trim().is_empty() {
                return Err(JournalError::invalid("Dream text cannot be empty"));
            }
            patch.insert("dreamText".to_string(), json!(text));
        }
        if let Some(title) = changes.dream_title {
            patch.insert("dreamTitle".to_string(), json!(title.trim()));
        }
        if let Some(flag) = changes.is_pre_analyzed {
            patch.insert("isPreAnalyzed".to_string(), json!(flag));
        }

        self.db
            .documents
            .update::<DraftDream>(ns, None, draft_id, patch.into())?
            .ok_or_else(|| JournalError::not_found("Draft dream", draft_id))
    }

    pub fn delete_draft(&self, ns: &Namespace, draft_id: &str) -> JournalResult<()> {
        if !self.db.documents.delete::<DraftDream>(ns, None, draft_id)? {
            return Err(JournalError::not_found("Draft dream", draft_id));
        }
        info!("Deleted draft dream {} for {}", draft_id, ns);
        Ok(())
    }

    pub fn list_drafts(&self, ns: &Namespace) -> JournalResult<Vec<Stored<DraftDream>>> {
        Ok(self.db.documents.list(ns, None, &Query::newest_first())?)
    }

    pub fn get_draft(&self, ns: &Namespace, draft_id: &str) -> JournalResult<Stored<DraftDream>> {
        self.db
            .documents
            .get(ns, None, draft_id)?
            .ok_or_else(|| JournalError::not_found("Draft dream", draft_id))
    }

    /// Analyze a draft and replace it with an archived dream. The draft is
    /// left untouched if the analysis fails; the archive write and draft
    /// removal commit together.
    pub async fn analyze_and_archive(
        &self,
        ns: &Namespace,
        draft_id: &str,
    ) -> JournalResult<Stored<ArchivedDream>> {
        let draft = self.get_draft(ns, draft_id)?.data;
        if draft.dream_text.trim().is_empty() {
            return Err(JournalError::invalid("Please write down your dream before analyzing it"));
        }

        let started = Instant::now();
        let analysis_text = match self.backend.analyze_dream(&draft.dream_text).await {
            Ok(text) => text,
            Err(e) => {
                metrics::inc_analysis("failure");
                warn!("Analysis of draft {} failed: {}", draft_id, e);
                return Err(e.into());
            }
        };
        metrics::observe_analysis_latency(started.elapsed().as_secs_f64());

        let archived = ArchivedDream {
            dream_text: draft.dream_text,
            analysis_text,
            dream_title: draft.dream_title,
            timestamp: Utc::now(),
            matched_reality_event: String::new(),
        };

        match self.db.documents.move_document::<DraftDream, ArchivedDream>(ns, draft_id, archived)? {
            Some(stored) => {
                metrics::inc_analysis("success");
                info!("Archived draft {} as analyzed dream {}", draft_id, stored.id);
                Ok(stored)
            }
            None => {
                // Draft was deleted while the analysis was in flight.
                metrics::inc_analysis("discarded");
                Err(JournalError::not_found("Draft dream", draft_id))
            }
        }
    }

    pub fn list_archived(&self, ns: &Namespace) -> JournalResult<Vec<Stored<ArchivedDream>>> {
        Ok(self.db.documents.list(ns, None, &Query::newest_first())?)
    }

    pub fn get_archived(&self, ns: &Namespace, dream_id: &str) -> JournalResult<Stored<ArchivedDream>> {
        self.db
            .documents
            .get(ns, None, dream_id)?
            .ok_or_else(|| JournalError::not_found("Archived dream", dream_id))
    }

    pub fn archived_detail(&self, ns: &Namespace, dream_id: &str) -> JournalResult<ArchivedDreamDetail> {
        let dream = self.get_archived(ns, dream_id)?;
        let analysis = AnalysisView::render(&dream.data.analysis_text);
        Ok(ArchivedDreamDetail { dream, analysis })
    }

    pub fn delete_archived(&self, ns: &Namespace, dream_id: &str) -> JournalResult<()> {
        if !self.db.documents.delete::<ArchivedDream>(ns, None, dream_id)? {
            return Err(JournalError::not_found("Archived dream", dream_id));
        }
        info!("Deleted archived dream {} for {}", dream_id, ns);
        Ok(())
    }

    /// Attach, replace or (with an empty string) clear the match text.
    pub fn set_match(
        &self,
        ns: &Namespace,
        dream_id: &str,
        matched_reality_event: &str,
    ) -> JournalResult<Stored<ArchivedDream>> {
        let patch = json!({ "matchedRealityEvent": matched_reality_event.trim() });
        self.db
            .documents
            .update::<ArchivedDream>(ns, None, dream_id, patch)?
            .ok_or_else(|| JournalError::not_found("Archived dream", dream_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::test_support::StubBackend;

    fn lifecycle(backend: StubBackend) -> (DreamLifecycle, Namespace) {
        let db = Arc::new(JournalDatabase::new_in_memory().unwrap());
        (DreamLifecycle::new(db, Arc::new(backend)), Namespace::new("app", "dreamer"))
    }

    #[tokio::test]
    async fn archiving_removes_draft_and_creates_one_archived_dream() {
        let (dreams, ns) = lifecycle(StubBackend::answering(r#"{"actionsPerformed":"flew"}"#));
        let draft = dreams.save_draft(&ns, "I flew over the sea", "Flight", false).unwrap();

        let archived = dreams.analyze_and_archive(&ns, &draft.id).await.unwrap();

        assert!(dreams.list_drafts(&ns).unwrap().is_empty());
        let all = dreams.list_archived(&ns).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, archived.id);
        assert_eq!(all[0].data.dream_text, "I flew over the sea");
        assert_eq!(all[0].data.dream_title, "Flight");
        assert!(!all[0].data.is_matched());
    }

    /// Backend that removes every draft of `ns` while "analyzing".
    struct DeletingBackend {
        db: Arc<JournalDatabase>,
        ns: Namespace,
    }

    #[async_trait::async_trait]
    impl GenerativeBackend for DeletingBackend {
        async fn analyze_dream(&self, _dream_text: &str) -> Result<String, crate::analysis::AnalysisError> {
            for draft in self.db.documents.list::<DraftDream>(&self.ns, None, &Query::default()).unwrap() {
                self.db.documents.delete::<DraftDream>(&self.ns, None, &draft.id).unwrap();
            }
            Ok(r#"{"actionsPerformed":"vanished"}"#.to_string())
        }

        async fn chat(&self, _history: &[crate::analysis::ChatTurn]) -> Result<String, crate::analysis::AnalysisError> {
            unreachable!("not used by the dream lifecycle")
        }

        async fn generate_image(&self, _prompt: &str) -> Result<String, crate::analysis::AnalysisError> {
            unreachable!("not used by the dream lifecycle")
        }
    }

    #[tokio::test]
    async fn draft_deleted_during_analysis_is_discarded() {
        let db = Arc::new(JournalDatabase::new_in_memory().unwrap());
        let ns = Namespace::new("app", "dreamer");
        let backend = DeletingBackend { db: Arc::clone(&db), ns: ns.clone() };
        let dreams = DreamLifecycle::new(Arc::clone(&db), Arc::new(backend));
        let draft = dreams.save_draft(&ns, "a door that was not there", "", false).unwrap();

        let err = dreams.analyze_and_archive(&ns, &draft.id).await.unwrap_err();

        assert!(matches!(err, JournalError::NotFound { .. }));
        assert!(dreams.list_drafts(&ns).unwrap().is_empty());
        assert!(dreams.list_archived(&ns).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_analysis_keeps_the_draft() {
        let (dreams, ns) = lifecycle(StubBackend::failing());
        let draft = dreams.save_draft(&ns, "falling", "", false).unwrap();

        let err = dreams.analyze_and_archive(&ns, &draft.id).await.unwrap_err();
        assert!(matches!(err, JournalError::Upstream(_)));
        assert_eq!(dreams.list_drafts(&ns).unwrap().len(), 1);
        assert!(dreams.list_archived(&ns).unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_call() {
        let backend = StubBackend::answering("{}");
        let calls = backend.calls();
        let (dreams, ns) = lifecycle(backend);

        assert!(matches!(dreams.save_draft(&ns, "   ", "", false), Err(JournalError::InvalidInput(_))));

        let draft = dreams.save_draft(&ns, "something", "", false).unwrap();
        let err = dreams.update_draft(&ns, &draft.id, DraftChanges {
            dream_text: Some(" ".into()),
            ..Default::default()
        });
        assert!(matches!(err, Err(JournalError::InvalidInput(_))));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn update_and_delete_draft() {
        let (dreams, ns) = lifecycle(StubBackend::answering("{}"));
        let draft = dreams.save_draft(&ns, "first version", "", false).unwrap();

        let updated = dreams
            .update_draft(&ns, &draft.id, DraftChanges {
                dream_text: Some("second version".into()),
                dream_title: Some("  Titled ".into()),
                is_pre_analyzed: None,
            })
            .unwrap();
        assert_eq!(updated.data.dream_text, "second version");
        assert_eq!(updated.data.dream_title, "Titled");

        dreams.delete_draft(&ns, &draft.id).unwrap();
        assert!(matches!(dreams.delete_draft(&ns, &draft.id), Err(JournalError::NotFound { .. })));
        assert!(matches!(
            dreams.update_draft(&ns, &draft.id, DraftChanges::default()),
            Err(JournalError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn detail_renders_view_and_match_round_trips() {
        let (dreams, ns) = lifecycle(StubBackend::answering(r#"{"actionsPerformed":"ran","location":""}"#));
        let draft = dreams.save_draft(&ns, "I ran", "", false).unwrap();
        let archived = dreams.analyze_and_archive(&ns, &draft.id).await.unwrap();

        let detail = dreams.archived_detail(&ns, &archived.id).unwrap();
        assert_eq!(detail.analysis.labels(), vec!["Actions Performed"]);

        let matched = dreams.set_match(&ns, &archived.id, "Went jogging on Monday").unwrap();
        assert!(matched.data.is_matched());
        let cleared = dreams.set_match(&ns, &archived.id, "").unwrap();
        assert!(!cleared.data.is_matched());

        dreams.delete_archived(&ns, &archived.id).unwrap();
        assert!(matches!(dreams.archived_detail(&ns, &archived.id), Err(JournalError::NotFound { .. })));
    }

    #[tokio::test]
    async fn unparsable_analysis_still_archives_and_renders_raw() {
        let (dreams, ns) = lifecycle(StubBackend::answering("not json at all"));
        let draft = dreams.save_draft(&ns, "odd dream", "", false).unwrap();
        let archived = dreams.analyze_and_archive(&ns, &draft.id).await.unwrap();

        let detail = dreams.archived_detail(&ns, &archived.id).unwrap();
        assert!(matches!(detail.analysis, AnalysisView::Raw { .. }));
    }

    #[tokio::test]
    async fn other_users_cannot_reach_a_draft() {
        let (dreams, ns) = lifecycle(StubBackend::answering("{}"));
        let draft = dreams.save_draft(&ns, "private", "", false).unwrap();
        let stranger = Namespace::new("app", "someone-else");

        assert!(matches!(dreams.get_draft(&stranger, &draft.id), Err(JournalError::NotFound { .. })));
        assert!(matches!(
            dreams.analyze_and_archive(&stranger, &draft.id).await,
            Err(JournalError::NotFound { .. })
        ));
    }
}
