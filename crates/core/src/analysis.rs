//! Structured CV analysis and candidate ranking.
//!
//! Both operations ask the generation service for JSON and accept the answer
//! only if it parses into [`CandidateAnalysis`] / [`CandidateRanking`] and
//! passes range checks. A bad answer for one candidate is recorded and the
//! rest of the batch carries on.

use crate::error::AnalysisError;
use crate::generation::{GenerationRequest, Generator};
use crate::models::{
    AnalysisReport, CandidateAnalysis, CandidateRanking, FailedCandidate, SourceDocument,
};
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{error, info, warn};

pub const DEFAULT_JOB_REQUIREMENTS: &str = "Software Engineer with 5+ years experience";
pub const DEFAULT_REPORT_FILE: &str = "cv_analysis_report.json";

/// Only the start of a CV is sent for analysis.
pub const ANALYSIS_CHAR_LIMIT: usize = 3_000;

const RECRUITER_SYSTEM_PROMPT: &str =
    "You are an expert HR recruiter. Answer with valid JSON only, no additional text.";

#[derive(Debug, Clone, Default)]
pub struct CandidateBatch {
    pub candidates: Vec<CandidateAnalysis>,
    pub failed: Vec<FailedCandidate>,
}

pub struct CvAnalyzer<G> {
    generator: G,
}

impl<G: Generator> CvAnalyzer<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    pub fn analyze_cv(
        &self,
        cv_text: &str,
        candidate_name: &str,
    ) -> Result<CandidateAnalysis, AnalysisError> {
        let request = analysis_prompt(cv_text, candidate_name);
        let raw = self.generator.generate(&request)?;
        parse_analysis(&raw, candidate_name)
    }

    /// Analyzes every document. A bad answer for one CV is recorded in
    /// `failed` and the batch moves on; a quota failure stops the batch, since
    /// every later call would hit the same limit.
    pub fn collect_candidates(
        &self,
        documents: &[SourceDocument],
    ) -> Result<CandidateBatch, AnalysisError> {
        let mut batch = CandidateBatch::default();

        for document in documents {
            let candidate_name = document.stem();
            info!(candidate = candidate_name, "analyzing cv");

            match self.analyze_cv(&document.text, candidate_name) {
                Ok(analysis) => batch.candidates.push(analysis),
                Err(failure) if failure.is_quota_exceeded() => {
                    error!(candidate = candidate_name, error = %failure, "generation quota exhausted");
                    return Err(failure);
                }
                Err(failure) => {
                    error!(candidate = candidate_name, error = %failure, "cv analysis failed");
                    batch.failed.push(FailedCandidate {
                        candidate_name: candidate_name.to_string(),
                        reason: failure.to_string(),
                    });
                }
            }
        }

        info!(
            analyzed = batch.candidates.len(),
            failed = batch.failed.len(),
            "cv analysis finished"
        );
        Ok(batch)
    }

    /// Rankings sorted by rank, then by descending match score. No candidates
    /// means no generation call and an empty ranking.
    pub fn rank_candidates(
        &self,
        candidates: &[CandidateAnalysis],
        job_requirements: Option<&str>,
    ) -> Result<Vec<CandidateRanking>, AnalysisError> {
        if candidates.is_empty() {
            warn!("no candidates to rank");
            return Ok(Vec::new());
        }

        let requirements = effective_requirements(job_requirements);
        let request = ranking_prompt(candidates, requirements)?;
        let raw = self.generator.generate(&request)?;
        parse_rankings(&raw)
    }
}

pub fn effective_requirements(job_requirements: Option<&str>) -> &str {
    job_requirements
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_JOB_REQUIREMENTS)
}

pub fn select_best(rankings: &[CandidateRanking]) -> Option<&CandidateRanking> {
    rankings.first()
}

pub fn build_report(
    batch: CandidateBatch,
    rankings: Vec<CandidateRanking>,
    job_requirements: Option<&str>,
) -> AnalysisReport {
    AnalysisReport {
        generated_at: Utc::now(),
        job_requirements: effective_requirements(job_requirements).to_string(),
        total_candidates: batch.candidates.len(),
        best_candidate: select_best(&rankings).cloned(),
        candidates_analyzed: batch.candidates,
        rankings,
        failed_candidates: batch.failed,
    }
}

pub fn write_report(report: &AnalysisReport, path: &Path) -> Result<(), AnalysisError> {
    let failure = |details: String| AnalysisError::Report {
        path: path.display().to_string(),
        details,
    };
    let json = serde_json::to_string_pretty(report).map_err(|e| failure(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| failure(e.to_string()))?;
    info!(path = %path.display(), "analysis report saved");
    Ok(())
}

fn analysis_prompt(cv_text: &str, candidate_name: &str) -> GenerationRequest {
    let excerpt: String = cv_text.chars().take(ANALYSIS_CHAR_LIMIT).collect();
    let user = format!(
        r#"Analyze the following CV and extract key information in JSON format.

Candidate Name: {candidate_name}

CV Content:
{excerpt}

Return a single JSON object with exactly these keys:
- "full_name": string
- "email": string or null
- "phone": string or null
- "years_of_experience": number
- "key_skills": list of up to 5 strings
- "education": list of {{"degree": string, "field": string or null, "institution": string or null}}
- "experience": list of {{"title": string, "company": string or null, "years": string or null}}
- "certifications": list of strings
- "strength_score": integer from 1 to 10
- "strengths_summary": 2-3 sentences
- "areas_for_improvement": list of strings

Return ONLY valid JSON, no additional text."#
    );

    GenerationRequest {
        system: RECRUITER_SYSTEM_PROMPT.to_string(),
        user,
    }
}

fn ranking_prompt(
    candidates: &[CandidateAnalysis],
    requirements: &str,
) -> Result<GenerationRequest, AnalysisError> {
    let candidates_json =
        serde_json::to_string_pretty(candidates).map_err(|e| AnalysisError::MalformedOutput {
            subject: "candidates".to_string(),
            details: e.to_string(),
        })?;

    let user = format!(
        r#"Rank the following candidates based on their qualifications.

Job Requirements:
{requirements}

Candidates Data:
{candidates_json}

Return a JSON array, sorted by rank, where each item has:
- "rank": integer starting at 1
- "candidate_name": string, as given in the candidates data
- "match_score": number from 0 to 100
- "key_strengths": list of 3-4 strings
- "recommendation": one of "hire", "maybe", "not_recommended"
- "reasoning": 1-2 sentences

Return ONLY valid JSON array format."#
    );

    Ok(GenerationRequest {
        system: RECRUITER_SYSTEM_PROMPT.to_string(),
        user,
    })
}

fn fence_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").ok())
        .as_ref()
}

/// Models like to wrap JSON in markdown code fences.
pub fn strip_code_fences(raw: &str) -> &str {
    fence_pattern()
        .and_then(|pattern| pattern.captures(raw))
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str())
        .unwrap_or(raw)
        .trim()
}

pub fn parse_analysis(raw: &str, candidate_name: &str) -> Result<CandidateAnalysis, AnalysisError> {
    let mut analysis: CandidateAnalysis =
        serde_json::from_str(strip_code_fences(raw)).map_err(|e| AnalysisError::MalformedOutput {
            subject: candidate_name.to_string(),
            details: e.to_string(),
        })?;

    if !(1..=10).contains(&analysis.strength_score) {
        return Err(AnalysisError::InvalidField {
            subject: candidate_name.to_string(),
            field: "strength_score".to_string(),
            details: format!("{} is outside 1-10", analysis.strength_score),
        });
    }
    if !analysis.years_of_experience.is_finite() || analysis.years_of_experience < 0.0 {
        return Err(AnalysisError::InvalidField {
            subject: candidate_name.to_string(),
            field: "years_of_experience".to_string(),
            details: format!("{} is not a valid duration", analysis.years_of_experience),
        });
    }

    analysis.candidate_name = candidate_name.to_string();
    Ok(analysis)
}

/// Accepts a JSON array, or a single object as a one-item ranking. Items that
/// fail validation are dropped with a warning; if none survive, the whole
/// output is malformed.
pub fn parse_rankings(raw: &str) -> Result<Vec<CandidateRanking>, AnalysisError> {
    let malformed = |details: String| AnalysisError::MalformedOutput {
        subject: "rankings".to_string(),
        details,
    };

    let value: Value = serde_json::from_str(strip_code_fences(raw)).map_err(|e| malformed(e.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => return Err(malformed(format!("expected an array, got {other}"))),
    };
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let total = items.len();
    let mut rankings = Vec::with_capacity(total);
    for (position, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<CandidateRanking>(item)
            .map_err(|e| e.to_string())
            .and_then(validate_ranking)
        {
            Ok(ranking) => rankings.push(ranking),
            Err(details) => warn!(position, details = %details, "dropping invalid ranking entry"),
        }
    }

    if rankings.is_empty() {
        return Err(malformed(format!("none of {total} ranking entries were valid")));
    }

    rankings.sort_by(|left, right| {
        left.rank.cmp(&right.rank).then(
            right
                .match_score
                .partial_cmp(&left.match_score)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    Ok(rankings)
}

fn validate_ranking(ranking: CandidateRanking) -> Result<CandidateRanking, String> {
    if ranking.rank == 0 {
        return Err(format!("{}: rank must start at 1", ranking.candidate_name));
    }
    if !(0.0..=100.0).contains(&ranking.match_score) {
        return Err(format!(
            "{}: match_score {} is outside 0-100",
            ranking.candidate_name, ranking.match_score
        ));
    }
    if ranking.candidate_name.trim().is_empty() {
        return Err("candidate_name is empty".to_string());
    }
    Ok(ranking)
}
