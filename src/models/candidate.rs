use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// CEFR-style language proficiency, carrying the fixed numeric weight used
/// by the language alignment scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proficiency {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
    Native,
}

impl Proficiency {
    pub fn weight(self) -> u8 {
        match self {
            Proficiency::A1 => 15,
            Proficiency::A2 => 30,
            Proficiency::B1 => 45,
            Proficiency::B2 => 60,
            Proficiency::C1 => 75,
            Proficiency::C2 => 90,
            Proficiency::Native => 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Remote,
    Onsite,
    Hybrid,
    Any,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateLocation {
    pub country: String,
    pub city: String,
    pub location_type: LocationType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EducationEntry {
    pub title: String,
    pub start_date: String,
    pub end_date: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub company: String,
    pub position: String,
    pub total_months: u32,
    pub description: String,
}

/// Normalized CV supplied at submit time. Immutable for the lifetime of a
/// run; the enrichment stage embeds the normalized form in the system
/// prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub name: String,
    pub total_experience_months: u32,
    pub skills: Vec<String>,
    pub education: Vec<EducationEntry>,
    pub location: CandidateLocation,
    pub experience: Vec<ExperienceEntry>,
    pub industries: Vec<String>,
    pub languages: BTreeMap<String, Proficiency>,
}

impl CandidateProfile {
    /// Lowercase skills, industries and language names and drop duplicates.
    /// Education and experience entries keep their submitted order.
    pub fn normalized(&self) -> CandidateProfile {
        let mut profile = self.clone();
        profile.skills = normalize_set(&self.skills);
        profile.industries = normalize_set(&self.industries);
        profile.languages = self
            .languages
            .iter()
            .map(|(name, level)| (name.trim().to_lowercase(), *level))
            .collect();
        profile
    }
}

fn normalize_set(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}
