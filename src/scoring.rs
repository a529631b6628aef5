//! Pure alignment scoring. All scores are integers in 0..=100; inputs are
//! validated at the tool boundary before they reach this module.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// The six partial scores feeding the weighted overall score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartialScores {
    pub skills: u8,
    pub education: u8,
    pub experience: u8,
    pub location: u8,
    pub industries: u8,
    pub languages: u8,
}

/// Fraction of required skills present in the candidate's skill set,
/// case-insensitive. An empty requirement list scores 100.
pub fn skills_score(candidate_skills: &[String], job_skills: &[String]) -> u8 {
    coverage_score(candidate_skills, job_skills)
}

/// Same coverage rule as `skills_score`, over industries.
pub fn industries_score(candidate_industries: &[String], job_industries: &[String]) -> u8 {
    coverage_score(candidate_industries, job_industries)
}

fn coverage_score(have: &[String], want: &[String]) -> u8 {
    if want.is_empty() {
        return 100;
    }
    let have: HashSet<String> = have.iter().map(|v| v.trim().to_lowercase()).collect();
    let hits = want
        .iter()
        .filter(|v| have.contains(&v.trim().to_lowercase()))
        .count();
    ((hits as f64 / want.len() as f64) * 100.0).round() as u8
}

/// Months of candidate experience against the months the job asks for,
/// capped at 100. A job asking for zero months scores 100.
pub fn experience_score(candidate_months: u32, job_months: u32) -> u8 {
    if job_months == 0 || candidate_months >= job_months {
        return 100;
    }
    ((candidate_months as f64 / job_months as f64) * 100.0).round() as u8
}

/// Mean closeness of proficiency weights over the languages the job
/// requires. Languages the candidate lacks contribute 0 through the mean
/// denominator; an empty requirement map scores 100.
pub fn languages_score(
    candidate_languages: &BTreeMap<String, u8>,
    job_languages: &BTreeMap<String, u8>,
) -> u8 {
    if job_languages.is_empty() {
        return 100;
    }
    let candidate: BTreeMap<String, u8> = candidate_languages
        .iter()
        .map(|(name, weight)| (name.trim().to_lowercase(), *weight))
        .collect();

    let sum: u32 = job_languages
        .iter()
        .filter_map(|(name, job_weight)| {
            candidate
                .get(&name.trim().to_lowercase())
                .map(|cand_weight| 100 - cand_weight.abs_diff(*job_weight) as u32)
        })
        .sum();

    (sum as f64 / job_languages.len() as f64).round() as u8
}

/// Weighted sum of the partial scores, rounded to the nearest integer.
/// Weights: skills 0.3, education 0.1, experience 0.3, location 0.05,
/// industries 0.05, languages 0.2.
pub fn overall_score(parts: &PartialScores) -> u8 {
    let weighted = 0.3 * parts.skills as f64
        + 0.1 * parts.education as f64
        + 0.3 * parts.experience as f64
        + 0.05 * parts.location as f64
        + 0.05 * parts.industries as f64
        + 0.2 * parts.languages as f64;
    weighted.round() as u8
}
