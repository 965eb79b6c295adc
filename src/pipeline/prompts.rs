//! Prompt templates for every LLM call in the pipeline

use crate::clients::SearchHit;
use crate::retrieval::Document;

/// Prompt catalogue
pub struct Prompts;

impl Prompts {
    /// Query rewrite. The passthrough rule is load-bearing: rewriting is
    /// lossy, and chit-chat must reach the router unmodified.
    pub const SYSTEM_REWRITE: &'static str = "\
You are an IT search optimization specialist. Rewrite the user's input \
for retrieval against an IT knowledge base.
Rules:
1. Remove filler and conversational noise (\"um\", \"please help\", \"it's urgent\").
2. Extract the core keywords and make the implicit subject explicit \
(e.g. \"can't connect\" becomes \"VPN connection failure\").
3. Produce one concise, professional search phrase.
4. IMPORTANT: if the input is casual chat (a greeting, thanks, small \
talk), return it verbatim without any modification.
Output only the rewritten text, with no explanation.";

    /// Intent routing. Must return strict JSON.
    pub const SYSTEM_ROUTER: &'static str = "\
You are an intent classifier. You must return JSON only.
Categories:
1. \"rag\": IT faults, software errors, account problems, device issues, \
policy or process questions.
2. \"chat\": greetings, small talk, anything unrelated to IT support.
Output format: {\"type\": \"rag\", \"reason\": \"...\"}";

    pub const SYSTEM_RAG: &'static str = "\
You are the internal IT support assistant. Answer strictly from the \
provided knowledge base entries; do not invent steps.";

    /// Search-backed answers must open with an explicit provenance
    /// notice so users know the internal knowledge base had no record.
    pub const SYSTEM_SEARCH: &'static str = "\
You are the internal IT support assistant. The internal knowledge base \
has no record for this question, and you are working from external web \
search results instead. Integrate the search results into one clear, \
ordered solution.
You MUST begin the answer with exactly this notice:
\"Note: no internal knowledge base record was found. The following is \
based on web search results and is provided for reference only.\"";

    pub const SYSTEM_CHAT: &'static str = "\
You are the internal IT support assistant. The user is making small \
talk; reply briefly and warmly.";

    /// Hallucination grading. Must return strict JSON.
    pub const SYSTEM_GRADER: &'static str = "\
You are a strict grader. Judge whether the generated answer contains \
claims unsupported by the reference documents.
You must return JSON: {\"score\": \"yes\", \"reason\": \"...\"} if the \
answer is fully supported, or {\"score\": \"no\", \"reason\": \"...\"} \
if it is not.";

    /// User prompt for knowledge-base generation
    pub fn rag_user(documents: &[Document], question: &str) -> String {
        let context: Vec<String> = documents.iter().map(|d| d.context_block()).collect();
        format!(
            "[Knowledge base]\n{}\n\n[User question]\n{}\n\n[Task]\nAnswer using only the knowledge base steps.",
            context.join("\n\n"),
            question
        )
    }

    /// User prompt for search-backed generation
    pub fn search_user(hits: &[SearchHit], question: &str) -> String {
        let context: Vec<String> = hits
            .iter()
            .map(|h| format!("Source: {}\nLink: {}\nSummary: {}", h.title, h.url, h.snippet))
            .collect();
        let context = if context.is_empty() {
            "(no results)".to_string()
        } else {
            context.join("\n\n")
        };

        format!("[Search results]\n{}\n\n[User question]\n{}", context, question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Provenance;

    #[test]
    fn test_rag_user_contains_document_blocks() {
        let docs = vec![Document {
            id: "1".to_string(),
            title: "VPN failure".to_string(),
            steps: "reset adapter".to_string(),
            score: 0.9,
            provenance: Provenance::Reranked,
        }];

        let prompt = Prompts::rag_user(&docs, "vpn won't connect");
        assert!(prompt.contains("[Fault scenario] VPN failure"));
        assert!(prompt.contains("vpn won't connect"));
    }

    #[test]
    fn test_search_user_handles_empty_hits() {
        let prompt = Prompts::search_user(&[], "printer offline");
        assert!(prompt.contains("(no results)"));
        assert!(prompt.contains("printer offline"));
    }

    #[test]
    fn test_search_user_formats_hits() {
        let hits = vec![SearchHit {
            title: "Fix guide".to_string(),
            url: "https://x.test".to_string(),
            snippet: "reinstall the driver".to_string(),
        }];

        let prompt = Prompts::search_user(&hits, "q");
        assert!(prompt.contains("Source: Fix guide"));
        assert!(prompt.contains("reinstall the driver"));
    }
}
