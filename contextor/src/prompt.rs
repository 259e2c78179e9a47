//! Prompt builder: synthesis contract as system message + budgeted context block.

use crate::api_types::{FileScore, UsedChunk};
use crate::score::ConfidenceTier;

/// System contract for answer synthesis.
///
/// `{length_rule}` is substituted by [`system_prompt`].
const SYSTEM_TEMPLATE: &str = r#"
You answer questions about the user's documents.
Use ONLY the context chunks supplied below. Anything not literally stated in a chunk
must be marked with "(inference)". Every factual sentence ends with an inline citation
of the form [file_name#chunk_id] naming a supplied chunk.
{length_rule}
Reply with exactly one JSON object and nothing else:
{"answer": string,
 "sources": [{"file_name": string, "chunk_id": integer, "score": number in [0,1], "excerpt": string of at most 200 chars}],
 "confidence_explanation": string,
 "clarifying_question": string or null}
"#;

/// Renders the system contract with the length rule for this request.
pub fn system_prompt(max_words: usize, detailed: bool) -> String {
    let rule = if detailed {
        "The user asked for depth: be thorough, but stay within the context.".to_string()
    } else {
        format!("Keep the answer under {max_words} words.")
    };
    SYSTEM_TEMPLATE.trim().replace("{length_rule}", &rule)
}

/// Build the user prompt: question, routing summary and a labeled context
/// section compacted into at most `max_chars` bytes, preserving rank order.
///
/// # Example
/// ```
/// # use contextor::prompt::build_user_prompt;
/// # use contextor::score::ConfidenceTier;
/// let prompt = build_user_prompt("What is X?", Some(ConfidenceTier::High), &[], &[], 2000);
/// assert!(prompt.contains("Question:"));
/// ```
pub fn build_user_prompt(
    question: &str,
    tier: Option<ConfidenceTier>,
    selected: &[FileScore],
    chunks: &[UsedChunk],
    max_chars: usize,
) -> String {
    let mut out = String::new();
    out.push_str("Question:\n");
    out.push_str(question.trim());
    out.push_str("\n\n");

    if let Some(tier) = tier {
        out.push_str(&format!("Retrieval confidence: {}\n", tier.as_str()));
    }
    if !selected.is_empty() {
        out.push_str("Selected documents:\n");
        for f in selected {
            out.push_str(&format!("- {} (score {:.3}): {}\n", f.file_name, f.score, f.summary));
        }
    }
    if tier == Some(ConfidenceTier::Low) {
        out.push_str(
            "No document matched strongly. Give a best-effort answer and a clarifying question.\n",
        );
    }
    out.push('\n');

    if chunks.is_empty() {
        return out;
    }

    out.push_str("Context (top-ranked):\n");
    let mut budget = max_chars;
    for c in chunks {
        let header = format!("==[{}]== (score {:.3})\n", c.label(), c.score);
        let text = c.text.trim();

        if header.len() >= budget {
            break;
        }
        out.push_str(&header);
        budget -= header.len();

        let take = budget.saturating_sub(2);
        if text.len() > take {
            out.push_str(safe_truncate(text, take));
            out.push_str("\n…\n");
            break;
        }
        out.push_str(text);
        out.push('\n');
        budget -= text.len() + 1;
    }
    out
}

/// Longest prefix of `s` within `max` bytes that ends on a char boundary.
pub fn safe_truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn used(file: &str, id: u64, text: &str) -> UsedChunk {
        UsedChunk {
            file_id: file.into(),
            file_name: file.into(),
            chunk_id: id,
            score: 0.8,
            text: text.into(),
        }
    }

    #[test]
    fn length_rule_depends_on_depth() {
        assert!(system_prompt(200, false).contains("under 200 words"));
        assert!(!system_prompt(200, true).contains("under 200 words"));
        assert!(system_prompt(200, false).contains("(inference)"));
    }

    #[test]
    fn context_respects_budget() {
        let chunks = vec![used("a", 0, &"x".repeat(500)), used("b", 1, "never shown")];
        let p = build_user_prompt("q", Some(ConfidenceTier::High), &[], &chunks, 120);
        assert!(p.contains("a#0"));
        assert!(!p.contains("b#1"));
    }

    #[test]
    fn low_tier_asks_for_clarification() {
        let p = build_user_prompt("q", Some(ConfidenceTier::Low), &[], &[used("a", 0, "t")], 1000);
        assert!(p.contains("clarifying question"));
    }

    #[test]
    fn truncation_keeps_utf8_valid() {
        assert_eq!(safe_truncate("héllo", 2), "h");
        assert_eq!(safe_truncate("abc", 10), "abc");
    }
}
