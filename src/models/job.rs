use serde::{Deserialize, Serialize};

/// One job posting as extracted by the crawler. Strings are trimmed and
/// whitespace-collapsed; non-critical fields fall back to "N/A".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawJob {
    pub job_id: String,
    pub job_title: String,
    pub job_url: String,
    pub job_location: String,
    pub employer: String,
    pub employer_url: String,
    pub job_description: String,
    pub seniority_level: String,
    pub employment_type: String,
    pub job_function: String,
    pub industries: String,
    pub source: String,
}

/// Candidate-to-job alignment, each component in 0..=100. The total is the
/// weighted sum of the six partial scores (see `scoring::overall_score`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentScore {
    pub total: u8,
    pub skills: u8,
    pub education: u8,
    pub experience: u8,
    pub location: u8,
    pub industries: u8,
    pub languages: u8,
}

/// Structured job digest produced by the agent call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub responsibilities: Vec<String>,
    pub requirements: Vec<String>,
    pub opportunity_interest: String,
    pub background_aligns: AlignmentScore,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverLetter {
    pub subject: String,
    pub letter_content: String,
}

/// A crawled job with its AI metadata attached; the shape delivered to the
/// webhook, one POST per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedJob {
    #[serde(flatten)]
    pub job: RawJob,
    pub job_summary: JobSummary,
    pub cover_letter: CoverLetter,
}
