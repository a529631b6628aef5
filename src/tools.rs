//! Callable tools exposed to the LLM: declared JSON schemas plus a
//! dispatcher that validates arguments before touching the scoring kernel.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::scoring::{self, PartialScores};

/// Weights a language proficiency may take: the CEFR table plus 0 for
/// "not spoken".
const PROFICIENCY_WEIGHTS: [u8; 8] = [0, 15, 30, 45, 60, 75, 90, 100];

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {detail}")]
    InvalidArguments { tool: String, detail: String },

    #[error("argument out of range for {tool}: {detail}")]
    OutOfRange { tool: String, detail: String },
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::InvalidArguments { .. } => "invalid_arguments",
            ToolError::OutOfRange { .. } => "out_of_range",
        }
    }

    /// Structured error payload handed back to the model in place of a
    /// result, so it can correct the call and retry.
    pub fn payload(&self) -> Value {
        json!({ "error": { "kind": self.kind(), "detail": self.to_string() } })
    }
}

/// A declared tool: name, description and the argument/result schemas the
/// provider advertises to the model.
#[derive(Debug, Clone)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
    pub response: Value,
}

/// The fixed set of callables available to the enrichment agent.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    declarations: Vec<ToolDeclaration>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        ToolRegistry::new()
    }
}

impl ToolRegistry {
    pub fn new() -> ToolRegistry {
        ToolRegistry {
            declarations: declarations(),
        }
    }

    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    /// Compact manifest (name, description, parameters) for providers that
    /// embed the tool list in the system prompt instead of using native
    /// function-calling.
    pub fn manifest(&self) -> Value {
        Value::Array(
            self.declarations
                .iter()
                .map(|d| {
                    json!({
                        "name": d.name,
                        "description": d.description,
                        "parameters": d.parameters,
                    })
                })
                .collect(),
        )
    }

    /// Validate the arguments and invoke the bound function. The success
    /// value is the bare result; callers wrap it as `{"result": …}` for
    /// the tool-response turn.
    pub fn dispatch(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        match name {
            "calculate_month_between" => {
                let args: MonthBetweenArgs = parse_args(name, args)?;
                let start = parse_year_month(name, &args.start_date)?;
                let end = parse_year_month(name, &args.end_date)?;
                let months = (end.0 - start.0) * 12 + (end.1 - start.1);
                Ok(json!(months))
            }
            "calculate_skills_score" => {
                let args: SkillsArgs = parse_args(name, args)?;
                Ok(json!(scoring::skills_score(
                    &args.candidate_skills,
                    &args.job_skills
                )))
            }
            "calculate_experience_score" => {
                let args: ExperienceArgs = parse_args(name, args)?;
                Ok(json!(scoring::experience_score(
                    args.candidate_experience,
                    args.job_experience
                )))
            }
            "calculate_industries_score" => {
                let args: IndustriesArgs = parse_args(name, args)?;
                Ok(json!(scoring::industries_score(
                    &args.candidate_industries,
                    &args.job_industries
                )))
            }
            "calculate_languages_score" => {
                let args: LanguagesArgs = parse_args(name, args)?;
                check_proficiencies(name, &args.candidate_languages)?;
                check_proficiencies(name, &args.job_languages)?;
                Ok(json!(scoring::languages_score(
                    &args.candidate_languages,
                    &args.job_languages
                )))
            }
            "calculate_overall_score" => {
                let args: OverallArgs = parse_args(name, args)?;
                check_score_range(name, "skills", args.scores.skills)?;
                check_score_range(name, "education", args.scores.education)?;
                check_score_range(name, "experience", args.scores.experience)?;
                check_score_range(name, "location", args.scores.location)?;
                check_score_range(name, "industries", args.scores.industries)?;
                check_score_range(name, "languages", args.scores.languages)?;
                Ok(json!(scoring::overall_score(&args.scores)))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

#[derive(Deserialize)]
struct MonthBetweenArgs {
    start_date: String,
    end_date: String,
}

#[derive(Deserialize)]
struct SkillsArgs {
    candidate_skills: Vec<String>,
    job_skills: Vec<String>,
}

#[derive(Deserialize)]
struct ExperienceArgs {
    candidate_experience: u32,
    job_experience: u32,
}

#[derive(Deserialize)]
struct IndustriesArgs {
    candidate_industries: Vec<String>,
    job_industries: Vec<String>,
}

#[derive(Deserialize)]
struct LanguagesArgs {
    candidate_languages: BTreeMap<String, u8>,
    job_languages: BTreeMap<String, u8>,
}

#[derive(Deserialize)]
struct OverallArgs {
    scores: PartialScores,
}

fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        detail: e.to_string(),
    })
}

/// Parse a `YYYY-MM` string into (year, month).
fn parse_year_month(tool: &str, value: &str) -> Result<(i32, i32), ToolError> {
    let date = NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").map_err(|_| {
        ToolError::InvalidArguments {
            tool: tool.to_string(),
            detail: format!("expected YYYY-MM, got: {value}"),
        }
    })?;
    Ok((date.year(), date.month() as i32))
}

fn check_score_range(tool: &str, field: &str, value: u8) -> Result<(), ToolError> {
    if value > 100 {
        return Err(ToolError::OutOfRange {
            tool: tool.to_string(),
            detail: format!("{field} must be in 0..=100, got {value}"),
        });
    }
    Ok(())
}

fn check_proficiencies(tool: &str, languages: &BTreeMap<String, u8>) -> Result<(), ToolError> {
    for (language, weight) in languages {
        if !PROFICIENCY_WEIGHTS.contains(weight) {
            return Err(ToolError::OutOfRange {
                tool: tool.to_string(),
                detail: format!(
                    "{language}: {weight} is not a proficiency weight ({PROFICIENCY_WEIGHTS:?})"
                ),
            });
        }
    }
    Ok(())
}

fn declarations() -> Vec<ToolDeclaration> {
    let string_array = json!({ "type": "array", "items": { "type": "string" } });
    let language_map = json!({
        "type": "object",
        "additionalProperties": {
            "type": "integer",
            "enum": [0, 15, 30, 45, 60, 75, 90, 100],
        },
        "description": "Mapping of language name to proficiency weight",
    });
    let score = json!({ "type": "integer", "minimum": 0, "maximum": 100 });

    vec![
        ToolDeclaration {
            name: "calculate_month_between",
            description: "Calculate the number of months between two dates in YYYY-MM format.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "start_date": { "type": "string", "description": "Start date in YYYY-MM format" },
                    "end_date": { "type": "string", "description": "End date in YYYY-MM format" },
                },
                "required": ["start_date", "end_date"],
            }),
            response: json!({ "type": "integer", "description": "Number of months between the dates" }),
        },
        ToolDeclaration {
            name: "calculate_skills_score",
            description: "Calculate the alignment score between candidate skills and job required skills.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "candidate_skills": string_array.clone(),
                    "job_skills": string_array.clone(),
                },
                "required": ["candidate_skills", "job_skills"],
            }),
            response: score.clone(),
        },
        ToolDeclaration {
            name: "calculate_experience_score",
            description: "Calculate the alignment score between candidate experience and job required experience, both in months.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "candidate_experience": { "type": "integer", "description": "Candidate experience in months" },
                    "job_experience": { "type": "integer", "description": "Job experience in months" },
                },
                "required": ["candidate_experience", "job_experience"],
            }),
            response: score.clone(),
        },
        ToolDeclaration {
            name: "calculate_industries_score",
            description: "Calculate the alignment score between candidate industries and job required industries.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "candidate_industries": string_array.clone(),
                    "job_industries": string_array,
                },
                "required": ["candidate_industries", "job_industries"],
            }),
            response: score.clone(),
        },
        ToolDeclaration {
            name: "calculate_languages_score",
            description: "Calculate the alignment score between candidate languages and job required languages, as proficiency-weight maps.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "candidate_languages": language_map.clone(),
                    "job_languages": language_map,
                },
                "required": ["candidate_languages", "job_languages"],
            }),
            response: score.clone(),
        },
        ToolDeclaration {
            name: "calculate_overall_score",
            description: "Calculate the weighted overall score from the six partial scores.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "scores": {
                        "type": "object",
                        "properties": {
                            "skills": score.clone(), "education": score.clone(),
                            "experience": score.clone(), "location": score.clone(),
                            "industries": score.clone(), "languages": score.clone(),
                        },
                        "required": ["skills", "education", "experience", "location", "industries", "languages"],
                    },
                },
                "required": ["scores"],
            }),
            response: score,
        },
    ]
}
