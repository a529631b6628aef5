//! Per-job enrichment: prompt assembly plus the agent and generate calls
//! that attach a summary and a cover letter to a crawled job.

use serde_json::json;

use crate::llm::{LlmClient, LlmError, schema};
use crate::models::candidate::CandidateProfile;
use crate::models::job::{CoverLetter, EnrichedJob, JobSummary, RawJob};

#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// The model never produced a schema-conforming document, even after
    /// the regeneration attempt.
    #[error("model output violated the response schema")]
    Schema,

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// System instructions for one run, embedding the normalized candidate
/// profile. Set once at client construction; re-sent on every call.
pub fn system_prompt(profile: &CandidateProfile) -> String {
    let normalized = profile.normalized();
    let weights: serde_json::Map<String, serde_json::Value> = normalized
        .languages
        .iter()
        .map(|(name, level)| (name.clone(), json!(level.weight())))
        .collect();
    let profile_json = serde_json::to_value(&normalized)
        .unwrap_or_else(|_| json!({}))
        .to_string();
    let weights_json = serde_json::Value::Object(weights).to_string();
    format!(
        "You are an expert job search assistant helping a candidate evaluate and apply for jobs.

NORMALIZED CANDIDATE PROFILE JSON: {profile_json}

CANDIDATE LANGUAGE PROFICIENCY WEIGHTS: {weights_json}

INSTRUCTIONS:
- Provide personalized, specific advice based on the candidate's background
- Focus on actionable insights and concrete examples
- Maintain professional but warm tone
- Be concise and structured in responses
"
    )
}

pub fn job_summary_prompt(job: &RawJob) -> String {
    let job_json = serde_json::to_value(job)
        .unwrap_or_else(|_| json!({}))
        .to_string();
    format!(
        "TASK: Create a concise job summary that captures:

1. Responsibilities (3-5 key points):
   - Extract the most important responsibilities from the job description
   - Focus on what the role actually does day-to-day

2. Requirements (3-5 key points):
   - List essential qualifications and skills
   - Distinguish between \"must-have\" and \"nice-to-have\" requirements

3. Opportunity Interest (2-3 sentences):
   - What makes this role exciting for YOU specifically
   - Use personal pronouns and connect to your career goals
   - Based on the overall score, recommend whether the candidate should apply

4. Background Alignment Score (0-100 scale):
   - Calculate the alignment score from the candidate profile and the job requirements
   - Use the candidate profile from the system prompt
   - Normalize job requirements, skills, education, experience, location, industries and languages before scoring
   - All normalized values must be lowercase
   - Normalize languages by the following rules:
     - Format: language: proficiency
     - Proficiency: a1 -> 15; a2 -> 30; b1 -> 45; b2 -> 60; c1 -> 75; c2 -> 90; native -> 100
     - Languages the job does not require must not be passed to the calculate_languages_score tool
   - To convert experience dates to months, use the calculate_month_between tool
   - To calculate the skills score, use the calculate_skills_score tool
   - To calculate the experience score, use the calculate_experience_score tool
   - To calculate the industries score, use the calculate_industries_score tool
   - To calculate the languages score, use the calculate_languages_score tool
   - To calculate the location score, compare the candidate location with the job location and the candidate's willingness to relocate or work remotely
   - To calculate the education score, compare degree titles: exact match 100, near match (same category) 50, otherwise 0
   - To calculate the overall score, use the calculate_overall_score tool

5. Summary (3-4 sentences):
   - Concise overview of the role and why it is a good fit
   - Focus on the most compelling aspects for your profile

JSON JOB DATA: {job_json}

Keep responses concise, specific, and personalized to the candidate's background.
"
    )
}

pub const COVER_LETTER_PROMPT: &str = "TASK: Create a compelling, personalized cover letter that:

**Structure & Format:**
- Professional greeting (avoid \"To Whom It May Concern\")
- Opening paragraph: Express interest and connection to the role
- Body paragraphs (2-3): Highlight relevant experience and skills
- Closing: Strong call-to-action and professional sign-off

**Content Requirements:**
1. **Opening Hook**: Start with why you're excited about this specific role/company
2. **Experience Alignment**: Connect 2-3 specific experiences from your CV to job requirements
3. **Skill Demonstration**: Show how your skills directly address their needs
4. **Company Knowledge**: Demonstrate understanding of their business/industry
5. **Cultural Fit**: Explain why you'd thrive in their environment
6. **Closing**: Express enthusiasm and request next steps

**Tone & Style:**
- Professional but warm and engaging
- Confident but not arrogant
- Specific and concrete examples
- 250-350 words maximum
- Use active voice and strong action verbs

Make it personal, specific to this opportunity, and compelling based on your actual CV data.
";

/// Run the two-step enrichment for one job. History is cleared first so
/// earlier jobs never leak into this conversation. A schema failure leaves
/// the job un-enriched; it is not delivered.
pub async fn enrich_job(
    client: &mut dyn LlmClient,
    job: &RawJob,
) -> Result<EnrichedJob, EnrichError> {
    client.clear_history();

    let summary = client
        .agent(&job_summary_prompt(job), &schema::job_summary())
        .await?
        .ok_or(EnrichError::Schema)?;
    let job_summary: JobSummary = serde_json::from_value(summary).map_err(|_| EnrichError::Schema)?;

    let letter = client
        .generate(COVER_LETTER_PROMPT, &schema::cover_letter())
        .await?
        .ok_or(EnrichError::Schema)?;
    let cover_letter: CoverLetter =
        serde_json::from_value(letter).map_err(|_| EnrichError::Schema)?;

    Ok(EnrichedJob {
        job: job.clone(),
        job_summary,
        cover_letter,
    })
}
