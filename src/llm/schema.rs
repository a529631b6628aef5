//! Hand-written JSON schemas for the structured LLM outputs, paired with
//! validators that parse the model's text into the typed records. The
//! schemas are sent to the provider; the validators are the ingress check
//! on what comes back.

use serde_json::{Value, json};

use crate::models::job::{CoverLetter, JobSummary};
use crate::scoring::{self, PartialScores};

const MAX_LIST_ITEMS: usize = 8;
const MAX_LETTER_WORDS: usize = 400;

/// A response schema plus the validator enforcing it. `validate` returns
/// the normalized JSON document, or `None` when the text violates the
/// schema.
pub struct ResponseFormat {
    pub name: &'static str,
    pub schema: Value,
    validator: fn(&str) -> Option<Value>,
}

impl ResponseFormat {
    pub fn validate(&self, text: &str) -> Option<Value> {
        (self.validator)(text)
    }
}

pub fn job_summary() -> ResponseFormat {
    ResponseFormat {
        name: "job_summary",
        schema: job_summary_schema(),
        validator: validate_job_summary,
    }
}

pub fn cover_letter() -> ResponseFormat {
    ResponseFormat {
        name: "cover_letter",
        schema: cover_letter_schema(),
        validator: validate_cover_letter,
    }
}

fn job_summary_schema() -> Value {
    let score = json!({ "type": "integer", "minimum": 0, "maximum": 100 });
    json!({
        "type": "object",
        "properties": {
            "responsibilities": {
                "type": "array",
                "items": { "type": "string" },
                "minItems": 1,
                "maxItems": MAX_LIST_ITEMS,
            },
            "requirements": {
                "type": "array",
                "items": { "type": "string" },
                "minItems": 1,
                "maxItems": MAX_LIST_ITEMS,
            },
            "opportunity_interest": { "type": "string" },
            "background_aligns": {
                "type": "object",
                "properties": {
                    "total": score.clone(), "skills": score.clone(),
                    "education": score.clone(), "experience": score.clone(),
                    "location": score.clone(), "industries": score.clone(),
                    "languages": score,
                },
                "required": ["total", "skills", "education", "experience", "location", "industries", "languages"],
            },
            "summary": { "type": "string", "minLength": 1 },
        },
        "required": ["responsibilities", "requirements", "opportunity_interest", "background_aligns", "summary"],
    })
}

fn cover_letter_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "subject": { "type": "string", "minLength": 1 },
            "letter_content": { "type": "string", "minLength": 1 },
        },
        "required": ["subject", "letter_content"],
    })
}

fn validate_job_summary(text: &str) -> Option<Value> {
    let summary: JobSummary = serde_json::from_str(extract_object(text)?).ok()?;

    let list_ok = |items: &[String]| {
        (1..=MAX_LIST_ITEMS).contains(&items.len()) && items.iter().all(|i| !i.trim().is_empty())
    };
    if !list_ok(&summary.responsibilities) || !list_ok(&summary.requirements) {
        return None;
    }
    if summary.summary.trim().is_empty() {
        return None;
    }

    let s = summary.background_aligns;
    for component in [
        s.total,
        s.skills,
        s.education,
        s.experience,
        s.location,
        s.industries,
        s.languages,
    ] {
        if component > 100 {
            return None;
        }
    }
    // The total must be recomputable from the parts.
    let recomputed = scoring::overall_score(&PartialScores {
        skills: s.skills,
        education: s.education,
        experience: s.experience,
        location: s.location,
        industries: s.industries,
        languages: s.languages,
    });
    if s.total.abs_diff(recomputed) > 1 {
        return None;
    }

    serde_json::to_value(&summary).ok()
}

fn validate_cover_letter(text: &str) -> Option<Value> {
    let letter: CoverLetter = serde_json::from_str(extract_object(text)?).ok()?;
    if letter.subject.trim().is_empty() || letter.letter_content.trim().is_empty() {
        return None;
    }
    if letter.letter_content.split_whitespace().count() > MAX_LETTER_WORDS {
        return None;
    }
    serde_json::to_value(&letter).ok()
}

/// Models occasionally wrap JSON in prose or code fences; take the
/// outermost object.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
