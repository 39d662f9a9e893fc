//! Display form of a stored analysis.
use serde::Serialize;

use super::schema::{parse_analysis, AnalysisField};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisSection {
    pub key: &'static str,
    pub label: &'static str,
    pub text: String,
}

/// Parsed sections in canonical order, or the raw text with the reason it
/// could not be parsed. Building a view never fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AnalysisView {
    Parsed { sections: Vec<AnalysisSection> },
    Raw { text: String, error: String },
}

impl AnalysisView {
    pub fn render(analysis_text: &str) -> Self {
        match parse_analysis(analysis_text) {
            Ok(map) => {
                let sections = AnalysisField::ALL
                    .iter()
                    .filter_map(|field| {
                        field.value_in(&map).map(|text| AnalysisSection {
                            key: field.key(),
                            label: field.label(),
                            text: text.to_string(),
                        })
                    })
                    .collect();
                Self::Parsed { sections }
            }
            Err(error) => Self::Raw { text: analysis_text.to_string(), error },
        }
    }

    pub fn labels(&self) -> Vec<&'static str> {
        match self {
            Self::Parsed { sections } => sections.iter().map(|s| s.label).collect(),
            Self::Raw { .. } => Vec::new(),
        }
    }
}
