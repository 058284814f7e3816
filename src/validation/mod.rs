//! BFG9K validation pattern
//!
//! A five-phase check of an ontology validation request:
//! initialization, exact match, similarity match, LLM selection and final
//! validation. Each phase can be run on its own, or the validator can be
//! advanced through them in order.

use crate::repo::ValidationSettings;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Errors driving the validator
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("validation input must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("validation already completed at the {0} phase")]
    Finished(Bfg9kPhase),
}

/// Phases in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bfg9kPhase {
    Initialization,
    ExactMatch,
    SimilarityMatch,
    LlmSelection,
    FinalValidation,
}

impl Bfg9kPhase {
    pub const ALL: [Bfg9kPhase; 5] = [
        Bfg9kPhase::Initialization,
        Bfg9kPhase::ExactMatch,
        Bfg9kPhase::SimilarityMatch,
        Bfg9kPhase::LlmSelection,
        Bfg9kPhase::FinalValidation,
    ];

    /// Following phase, `None` for the terminal one
    pub fn next(self) -> Option<Bfg9kPhase> {
        match self {
            Bfg9kPhase::Initialization => Some(Bfg9kPhase::ExactMatch),
            Bfg9kPhase::ExactMatch => Some(Bfg9kPhase::SimilarityMatch),
            Bfg9kPhase::SimilarityMatch => Some(Bfg9kPhase::LlmSelection),
            Bfg9kPhase::LlmSelection => Some(Bfg9kPhase::FinalValidation),
            Bfg9kPhase::FinalValidation => None,
        }
    }
}

impl fmt::Display for Bfg9kPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bfg9kPhase::Initialization => write!(f, "initialization"),
            Bfg9kPhase::ExactMatch => write!(f, "exact_match"),
            Bfg9kPhase::SimilarityMatch => write!(f, "similarity_match"),
            Bfg9kPhase::LlmSelection => write!(f, "llm_selection"),
            Bfg9kPhase::FinalValidation => write!(f, "final_validation"),
        }
    }
}

/// Outcome of one phase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseVerdict {
    pub phase: Bfg9kPhase,
    pub valid: bool,
    /// Only set by the similarity phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    pub cache_hit: bool,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl PhaseVerdict {
    fn new(phase: Bfg9kPhase, valid: bool, detail: String) -> Self {
        Self {
            phase,
            valid,
            similarity_score: None,
            cache_hit: false,
            detail,
            timestamp: Utc::now(),
        }
    }
}

/// Shape of a JSON value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    String,
    Array,
    Object,
}

impl JsonKind {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            JsonKind::String => value.is_string(),
            JsonKind::Array => value.is_array(),
            JsonKind::Object => value.is_object(),
        }
    }
}

impl fmt::Display for JsonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonKind::String => write!(f, "string"),
            JsonKind::Array => write!(f, "array"),
            JsonKind::Object => write!(f, "object"),
        }
    }
}

/// Metadata every request carries, with the expected kind of each value
pub const REQUIRED_METADATA: [(&str, JsonKind); 7] = [
    ("ontology_id", JsonKind::String),
    ("validation_type", JsonKind::String),
    ("security_level", JsonKind::String),
    ("pattern_type", JsonKind::String),
    ("pattern_elements", JsonKind::Array),
    ("constraints", JsonKind::Object),
    ("relationships", JsonKind::Array),
];

const INITIALIZATION_FIELDS: [&str; 3] = ["ontology_id", "validation_type", "security_level"];
const LLM_FIELDS: [&str; 3] = ["model_type", "temperature", "max_tokens"];

/// Structural conformance check used by the exact-match and final phases
pub trait ShapeConformance {
    /// Check name, for reporting
    fn name(&self) -> &str;

    /// Violations found in `data`; empty when it conforms
    fn violations(&self, data: &Map<String, Value>) -> Vec<String>;
}

/// Default shape: every required metadata field present with its expected kind
pub struct RequiredMetadataShape;

impl ShapeConformance for RequiredMetadataShape {
    fn name(&self) -> &str {
        "required-metadata"
    }

    fn violations(&self, data: &Map<String, Value>) -> Vec<String> {
        REQUIRED_METADATA
            .iter()
            .filter_map(|(field, kind)| match data.get(*field) {
                None => Some(format!("missing field '{}'", field)),
                Some(value) if !kind.matches(value) => {
                    Some(format!("field '{}' expected {}", field, kind))
                }
                Some(_) => None,
            })
            .collect()
    }
}

/// Distinct inputs whose similarity score is remembered
pub const SIMILARITY_CACHE_LIMIT: usize = 256;

/// Drives a request through the five phases
pub struct Bfg9kValidator {
    phase: Bfg9kPhase,
    finished: bool,
    history: Vec<PhaseVerdict>,
    similarity_threshold: f64,
    shape: Box<dyn ShapeConformance>,
    similarity_cache: HashMap<String, f64>,
}

impl Bfg9kValidator {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            phase: Bfg9kPhase::Initialization,
            finished: false,
            history: Vec::new(),
            similarity_threshold,
            shape: Box::new(RequiredMetadataShape),
            similarity_cache: HashMap::new(),
        }
    }

    pub fn from_settings(settings: &ValidationSettings) -> Self {
        Self::new(settings.similarity_threshold)
    }

    /// Replace the conformance check
    pub fn with_shape(mut self, shape: Box<dyn ShapeConformance>) -> Self {
        self.shape = shape;
        self
    }

    /// Phase the next call to [`advance`](Self::advance) runs
    pub fn phase(&self) -> Bfg9kPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn history(&self) -> &[PhaseVerdict] {
        &self.history
    }

    /// Number of inputs with a remembered similarity score
    pub fn cached_scores(&self) -> usize {
        self.similarity_cache.len()
    }

    /// Return to the first phase; the similarity cache is kept
    pub fn reset(&mut self) {
        self.phase = Bfg9kPhase::Initialization;
        self.finished = false;
        self.history.clear();
    }

    pub fn validate_initialization(&self, data: &Value) -> PhaseVerdict {
        let missing = missing_fields(data.as_object(), &INITIALIZATION_FIELDS);
        let detail = if missing.is_empty() {
            "initialization fields present".to_string()
        } else {
            format!("missing: {}", missing.join(", "))
        };
        PhaseVerdict::new(Bfg9kPhase::Initialization, missing.is_empty(), detail)
    }

    pub fn validate_exact_match(&self, data: &Value) -> PhaseVerdict {
        let (valid, detail) = self.shape_check(data);
        PhaseVerdict::new(Bfg9kPhase::ExactMatch, valid, detail)
    }

    /// Field-presence score, cached per distinct input
    ///
    /// The cache is emptied once it holds [`SIMILARITY_CACHE_LIMIT`] entries.
    pub fn validate_similarity(&mut self, data: &Value) -> PhaseVerdict {
        let key = data.to_string();
        let (score, cache_hit) = match self.similarity_cache.get(&key) {
            Some(&score) => (score, true),
            None => {
                let score = similarity_score(data);
                if self.similarity_cache.len() >= SIMILARITY_CACHE_LIMIT {
                    debug!("Similarity cache full, clearing {} entries", SIMILARITY_CACHE_LIMIT);
                    self.similarity_cache.clear();
                }
                self.similarity_cache.insert(key, score);
                (score, false)
            }
        };

        let valid = score >= self.similarity_threshold;
        let mut verdict = PhaseVerdict::new(
            Bfg9kPhase::SimilarityMatch,
            valid,
            format!("score {:.2} against threshold {:.2}", score, self.similarity_threshold),
        );
        verdict.similarity_score = Some(score);
        verdict.cache_hit = cache_hit;
        verdict
    }

    pub fn validate_llm_selection(&self, data: &Value) -> PhaseVerdict {
        let config = data
            .as_object()
            .and_then(|object| object.get("llm_config"))
            .and_then(Value::as_object);
        let missing = missing_fields(config, &LLM_FIELDS);
        let detail = if missing.is_empty() {
            "llm_config complete".to_string()
        } else {
            format!("llm_config missing: {}", missing.join(", "))
        };
        PhaseVerdict::new(Bfg9kPhase::LlmSelection, missing.is_empty(), detail)
    }

    pub fn validate_final(&self, data: &Value) -> PhaseVerdict {
        let (shape_valid, shape_detail) = self.shape_check(data);
        let metadata_valid = match data.as_object() {
            Some(object) => RequiredMetadataShape.violations(object).is_empty(),
            None => false,
        };
        let detail = format!("{}; metadata valid: {}", shape_detail, metadata_valid);
        PhaseVerdict::new(Bfg9kPhase::FinalValidation, shape_valid && metadata_valid, detail)
    }

    /// Run one phase without moving the validator
    pub fn validate_phase(&mut self, phase: Bfg9kPhase, data: &Value) -> PhaseVerdict {
        match phase {
            Bfg9kPhase::Initialization => self.validate_initialization(data),
            Bfg9kPhase::ExactMatch => self.validate_exact_match(data),
            Bfg9kPhase::SimilarityMatch => self.validate_similarity(data),
            Bfg9kPhase::LlmSelection => self.validate_llm_selection(data),
            Bfg9kPhase::FinalValidation => self.validate_final(data),
        }
    }

    /// Run the current phase, record it, and move on when it passed
    pub fn advance(&mut self, data: &Value) -> Result<PhaseVerdict, ValidationError> {
        if self.finished {
            return Err(ValidationError::Finished(self.phase));
        }
        if !data.is_object() {
            return Err(ValidationError::NotAnObject(kind_name(data)));
        }

        let verdict = self.validate_phase(self.phase, data);
        debug!("BFG9K {}: valid={} ({})", verdict.phase, verdict.valid, verdict.detail);
        self.history.push(verdict.clone());

        if verdict.valid {
            match self.phase.next() {
                Some(next) => self.phase = next,
                None => self.finished = true,
            }
        }
        Ok(verdict)
    }

    /// Advance until a phase fails or the last phase passes
    pub fn run(&mut self, data: &Value) -> Result<Vec<PhaseVerdict>, ValidationError> {
        let mut verdicts = Vec::new();
        loop {
            let verdict = self.advance(data)?;
            let valid = verdict.valid;
            verdicts.push(verdict);
            if !valid || self.finished {
                return Ok(verdicts);
            }
        }
    }

    fn shape_check(&self, data: &Value) -> (bool, String) {
        let Some(object) = data.as_object() else {
            return (false, format!("{}: not an object", self.shape.name()));
        };
        let violations = self.shape.violations(object);
        if violations.is_empty() {
            (true, format!("{}: conforms", self.shape.name()))
        } else {
            (false, format!("{}: {}", self.shape.name(), violations.join("; ")))
        }
    }
}

impl Default for Bfg9kValidator {
    fn default() -> Self {
        Self::from_settings(&ValidationSettings::default())
    }
}

fn missing_fields<'a>(object: Option<&Map<String, Value>>, fields: &[&'a str]) -> Vec<&'a str> {
    fields
        .iter()
        .copied()
        .filter(|field| object.map_or(true, |o| !o.contains_key(*field)))
        .collect()
}

/// 0.0 unless every required field is present; otherwise presence plus a
/// 0.1 bonus per correctly shaped field, normalized and capped at 1.0
pub fn similarity_score(data: &Value) -> f64 {
    let Some(object) = data.as_object() else {
        return 0.0;
    };
    if REQUIRED_METADATA.iter().any(|(field, _)| !object.contains_key(*field)) {
        return 0.0;
    }

    let required = REQUIRED_METADATA.len() as f64;
    let base = 1.0;
    let bonus: f64 = REQUIRED_METADATA
        .iter()
        .filter(|(field, kind)| object.get(*field).is_some_and(|v| kind.matches(v)))
        .map(|_| 0.1)
        .sum();

    f64::min(1.0, base + bonus / required)
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> Value {
        json!({
            "ontology_id": "guidance",
            "validation_type": "shape",
            "security_level": "internal",
            "pattern_type": "rule",
            "pattern_elements": ["ValidationRule"],
            "constraints": {"minCount": 1},
            "relationships": ["hasDependency"],
            "llm_config": {"model_type": "local", "temperature": 0.2, "max_tokens": 512}
        })
    }

    #[test]
    fn test_run_passes_every_phase() {
        let mut validator = Bfg9kValidator::default();
        let verdicts = validator.run(&request()).unwrap();

        let phases: Vec<_> = verdicts.iter().map(|v| v.phase).collect();
        assert_eq!(phases, Bfg9kPhase::ALL.to_vec());
        assert!(verdicts.iter().all(|v| v.valid));
        assert!(validator.is_finished());

        let err = validator.advance(&request()).unwrap_err();
        assert!(matches!(err, ValidationError::Finished(Bfg9kPhase::FinalValidation)));
    }

    #[test]
    fn test_run_stops_at_first_failure() {
        let mut data = request();
        data.as_object_mut().unwrap().remove("llm_config");

        let mut validator = Bfg9kValidator::default();
        let verdicts = validator.run(&data).unwrap();

        assert_eq!(verdicts.len(), 4);
        assert!(!verdicts[3].valid);
        assert!(verdicts[3].detail.contains("model_type"));
        assert_eq!(validator.phase(), Bfg9kPhase::LlmSelection);
        assert!(!validator.is_finished());
        assert_eq!(validator.history().len(), 4);
    }

    #[test]
    fn test_initialization_fields() {
        let validator = Bfg9kValidator::default();
        let verdict = validator.validate_initialization(&json!({"ontology_id": "x"}));
        assert!(!verdict.valid);
        assert_eq!(verdict.detail, "missing: validation_type, security_level");
    }

    #[test]
    fn test_similarity_score_and_cache() {
        let mut validator = Bfg9kValidator::default();

        let first = validator.validate_similarity(&request());
        assert_eq!(first.similarity_score, Some(1.0));
        assert!(!first.cache_hit);
        assert!(first.valid);

        let second = validator.validate_similarity(&request());
        assert!(second.cache_hit);

        let mut partial = request();
        partial.as_object_mut().unwrap().remove("relationships");
        let verdict = validator.validate_similarity(&partial);
        assert_eq!(verdict.similarity_score, Some(0.0));
        assert!(!verdict.valid);
    }

    #[test]
    fn test_similarity_cache_is_bounded() {
        let mut validator = Bfg9kValidator::default();
        for n in 0..SIMILARITY_CACHE_LIMIT + 10 {
            let mut data = request();
            data["ontology_id"] = json!(format!("ontology-{}", n));
            validator.validate_similarity(&data);
            assert!(validator.cached_scores() <= SIMILARITY_CACHE_LIMIT);
        }
        assert_eq!(validator.cached_scores(), 10);

        let last = validator.validate_similarity(&json!({"ontology_id": "x"}));
        assert!(!last.cache_hit);
        assert_eq!(validator.cached_scores(), 11);
    }

    #[test]
    fn test_metadata_kinds_checked() {
        let mut data = request();
        data["constraints"] = json!(["not", "an", "object"]);

        let validator = Bfg9kValidator::default();
        let exact = validator.validate_exact_match(&data);
        assert!(!exact.valid);
        assert!(exact.detail.contains("field 'constraints' expected object"));
        assert!(!validator.validate_final(&data).valid);
    }

    struct RejectAll;

    impl ShapeConformance for RejectAll {
        fn name(&self) -> &str {
            "reject-all"
        }

        fn violations(&self, _data: &Map<String, Value>) -> Vec<String> {
            vec!["nothing conforms".to_string()]
        }
    }

    #[test]
    fn test_custom_shape() {
        let mut validator = Bfg9kValidator::default().with_shape(Box::new(RejectAll));
        let verdicts = validator.run(&request()).unwrap();

        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[1].phase, Bfg9kPhase::ExactMatch);
        assert_eq!(verdicts[1].detail, "reject-all: nothing conforms");
    }

    #[test]
    fn test_non_object_input() {
        let mut validator = Bfg9kValidator::default();
        let err = validator.advance(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, ValidationError::NotAnObject("array")));
        assert!(validator.history().is_empty());
    }
}
