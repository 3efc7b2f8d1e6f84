use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDocument {
    pub text: String,
    pub source_name: String,
    pub source_path: String,
    pub file_type: String,
}

impl SourceDocument {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// File name without its extension, used as the candidate name in analysis mode.
    pub fn stem(&self) -> &str {
        match self.source_name.rfind('.') {
            Some(position) if position > 0 => &self.source_name[..position],
            _ => &self.source_name,
        }
    }

    pub fn summary(&self) -> SourceSummary {
        SourceSummary {
            source_name: self.source_name.clone(),
            file_type: self.file_type.clone(),
            char_count: self.char_count(),
        }
    }
}

/// What an index remembers about the documents it was built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSummary {
    pub source_name: String,
    pub file_type: String,
    pub char_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_id: String,
    pub chunk_index: u64,
    pub text: String,
    pub source_name: String,
    pub start_offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerResult {
    pub text: String,
    pub cited_chunks: Vec<Chunk>,
}

impl AnswerResult {
    /// Distinct source names in citation order.
    pub fn cited_sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = Vec::new();
        for chunk in &self.cited_chunks {
            if !sources.contains(&chunk.source_name.as_str()) {
                sources.push(&chunk.source_name);
            }
        }
        sources
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Education {
    pub degree: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperienceEntry {
    pub title: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub years: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateAnalysis {
    #[serde(default)]
    pub candidate_name: String,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub years_of_experience: f32,
    pub key_skills: Vec<String>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default)]
    pub certifications: Vec<String>,
    pub strength_score: u8,
    pub strengths_summary: String,
    #[serde(default)]
    pub areas_for_improvement: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Hire,
    Maybe,
    NotRecommended,
}

impl Recommendation {
    /// Same spelling as the serialized form.
    pub fn label(self) -> &'static str {
        match self {
            Recommendation::Hire => "hire",
            Recommendation::Maybe => "maybe",
            Recommendation::NotRecommended => "not_recommended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateRanking {
    pub rank: u32,
    pub candidate_name: String,
    pub match_score: f32,
    #[serde(default)]
    pub key_strengths: Vec<String>,
    pub recommendation: Recommendation,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedCandidate {
    pub candidate_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub job_requirements: String,
    pub total_candidates: usize,
    pub candidates_analyzed: Vec<CandidateAnalysis>,
    pub rankings: Vec<CandidateRanking>,
    pub best_candidate: Option<CandidateRanking>,
    pub failed_candidates: Vec<FailedCandidate>,
}
