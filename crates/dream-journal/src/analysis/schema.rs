//! The twelve-field structured dream analysis: keys, labels, prompt and
//! response schema.
use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisField {
    ActionsPerformed,
    Location,
    Time,
    MovementThroughTime,
    EmotionalContent,
    SurfacePsychologicalContent,
    WorkDone,
    FamiliarPersons,
    PastEventRelation,
    FutureEventRelation,
    Messages,
    SpatialAwareness,
}

impl AnalysisField {
    /// Canonical display order.
    pub const ALL: [AnalysisField; 12] = [
        Self::ActionsPerformed,
        Self::Location,
        Self::Time,
        Self::MovementThroughTime,
        Self::EmotionalContent,
        Self::SurfacePsychologicalContent,
        Self::WorkDone,
        Self::FamiliarPersons,
        Self::PastEventRelation,
        Self::FutureEventRelation,
        Self::Messages,
        Self::SpatialAwareness,
    ];

    /// Fields whose free text feeds the top-terms statistics.
    pub const TERM_FIELDS: [AnalysisField; 6] = [
        Self::ActionsPerformed,
        Self::Location,
        Self::EmotionalContent,
        Self::FamiliarPersons,
        Self::Messages,
        Self::SpatialAwareness,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::ActionsPerformed => "actionsPerformed",
            Self::Location => "location",
            Self::Time => "time",
            Self::MovementThroughTime => "movementThroughTime",
            Self::EmotionalContent => "emotionalContent",
            Self::SurfacePsychologicalContent => "surfacePsychologicalContent",
            Self::WorkDone => "workDone",
            Self::FamiliarPersons => "familiarPersons",
            Self::PastEventRelation => "pastEventRelation",
            Self::FutureEventRelation => "futureEventRelation",
            Self::Messages => "messages",
            Self::SpatialAwareness => "spatialAwareness",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ActionsPerformed => "Actions Performed",
            Self::Location => "Location",
            Self::Time => "Time",
            Self::MovementThroughTime => "Movement Through Time",
            Self::EmotionalContent => "Emotional Content",
            Self::SurfacePsychologicalContent => "Surface Psychological Content",
            Self::WorkDone => "Work Done",
            Self::FamiliarPersons => "Familiar Persons",
            Self::PastEventRelation => "Relation to Past Events",
            Self::FutureEventRelation => "Relation to Future Events",
            Self::Messages => "Messages",
            Self::SpatialAwareness => "Spatial Awareness",
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Self::ActionsPerformed => "what the dreamer and others did in the dream",
            Self::Location => "where the dream took place",
            Self::Time => "when the dream seemed to take place (era, season, time of day)",
            Self::MovementThroughTime => "any jumps, loops or shifts in time",
            Self::EmotionalContent => "the emotions felt during the dream",
            Self::SurfacePsychologicalContent => "the most evident psychological themes",
            Self::WorkDone => "any task, labour or problem-solving carried out",
            Self::FamiliarPersons => "people from waking life who appeared",
            Self::PastEventRelation => "how the dream relates to past events in the dreamer's life",
            Self::FutureEventRelation => "how the dream may relate to upcoming or anticipated events",
            Self::Messages => "any messages, symbols or spoken words that stood out",
            Self::SpatialAwareness => "the dreamer's sense of space, distance and orientation",
        }
    }

    /// Trimmed, non-empty string value of this field in a parsed analysis.
    pub fn value_in<'a>(&self, analysis: &'a Map<String, Value>) -> Option<&'a str> {
        analysis
            .get(self.key())
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Parse stored `analysisText`. Only a JSON object is a valid analysis.
pub fn parse_analysis(analysis_text: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(analysis_text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("analysis is a JSON {} rather than an object", json_kind(&other))),
        Err(e) => Err(format!("analysis is not valid JSON: {}", e)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn build_analysis_prompt(dream_text: &str) -> String {
    let mut prompt = String::from(
        "You are a dream analyst. Analyze the dream below and answer with a JSON object \
         containing exactly these twelve string fields. Use an empty string for any field \
         the dream gives no information about.\n\n",
    );
    for field in AnalysisField::ALL {
        prompt.push_str(&format!("- {}: {}\n", field.key(), field.instruction()));
    }
    prompt.push_str("\nDream:\n");
    prompt.push_str(dream_text.trim());
    prompt
}

/// Schema for `generationConfig.responseSchema`: all twelve fields, all
/// strings, all required.
pub fn response_schema() -> Value {
    let properties: Map<String, Value> = AnalysisField::ALL
        .iter()
        .map(|field| (field.key().to_string(), json!({ "type": "STRING" })))
        .collect();
    let required: Vec<&str> = AnalysisField::ALL.iter().map(AnalysisField::key).collect();

    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": required,
    })
}
