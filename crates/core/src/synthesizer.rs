use crate::error::GenerationError;
use crate::generation::{GenerationRequest, Generator};
use crate::models::{AnswerResult, Chunk};
use tracing::info;

pub const ANALYST_SYSTEM_PROMPT: &str = "You are a professional CV Analyst assistant. Your role is to help analyze and understand information from CV documents.

Guidelines:
- Context: You have access to a database of CV documents
- Objective: Provide accurate, detailed answers about candidate qualifications, experience, and skills
- Style: Professional, structured, and clear
- Tone: Helpful, impartial, and informative
- Audience: HR professionals, recruiters, and hiring managers
- Response: Detailed, evidence-based answers with specific references to CV content

When answering questions:
1. Provide accurate information based on the retrieved documents
2. Always cite the source CV when providing information
3. Provide specific examples from the documents
4. Be objective and factual
5. If information is not available, clearly state that";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub fn format_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("**Source: {}**\n\n{}", chunk.source_name, chunk.text))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

pub fn build_prompt(question: &str, chunks: &[Chunk]) -> GenerationRequest {
    let user = format!(
        "Based on the following CV content, please answer this question:\n\n\
         Question: {question}\n\n\
         Retrieved CV Content:\n{}\n\n\
         Please provide a detailed, evidence-based answer with specific references to the CV sources.",
        format_context(chunks)
    );

    GenerationRequest {
        system: ANALYST_SYSTEM_PROMPT.to_string(),
        user,
    }
}

pub struct AnswerSynthesizer<G> {
    generator: G,
}

impl<G: Generator> AnswerSynthesizer<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// One generation call per question, even with no retrieved chunks.
    pub fn synthesize(
        &self,
        question: &str,
        retrieved_chunks: Vec<Chunk>,
    ) -> Result<AnswerResult, GenerationError> {
        let request = build_prompt(question, &retrieved_chunks);
        info!(context_chunks = retrieved_chunks.len(), "generating answer");

        let text = self.generator.generate(&request)?;
        Ok(AnswerResult {
            text,
            cited_chunks: retrieved_chunks,
        })
    }
}
