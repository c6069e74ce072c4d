//! Prompt assembly under a character budget.
//!
//! Each retrieved document is normalized, cut to `per_doc_chars`, and
//! prefixed with its `[row N]` citation tag. Blocks are added in retrieval
//! order until the next one would push the context section (blocks plus the
//! blank lines between them) past `max_ctx_chars`; that block and all later
//! ones are dropped. With no surviving blocks the prompt falls back to a
//! no-context variant without citation instructions.

use crate::config::PromptConfig;
use crate::models::Document;
use crate::retrieve::truncate_chars;

const BLOCK_SEPARATOR: &str = "\n\n";

const SYSTEM_RULES: &str = "You are a precise data assistant. Answer ONLY using the provided context.\n\
If the context is insufficient, say 'Insufficient context.' Do not invent values.\n\
When you reference items, cite row numbers like [row 12].\n\
Prefer concise sentences and, when helpful, a short bullet list.";

const ANSWER_FORMAT: &str = "Format:\n\
1) Answer: <your concise answer>\n\
2) Sources: comma-separated row numbers, e.g., 'Sources: row 3, row 9'\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBudget {
    pub per_doc_chars: usize,
    pub max_ctx_chars: usize,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            per_doc_chars: 600,
            max_ctx_chars: 2400,
        }
    }
}

impl From<&PromptConfig> for PromptBudget {
    fn from(config: &PromptConfig) -> Self {
        Self {
            per_doc_chars: config.per_doc_chars,
            max_ctx_chars: config.max_ctx_chars,
        }
    }
}

/// Collapse whitespace runs and tighten spacing before `;` and `,`.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(" ; ", "; ")
        .replace(" , ", ", ")
}

/// Cited context blocks that fit within `budget`, in input order.
pub fn context_blocks(docs: &[Document], budget: &PromptBudget) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut total = 0usize;

    for doc in docs {
        let row = doc
            .metadata
            .row
            .map(|r| r.to_string())
            .unwrap_or_else(|| "?".to_string());
        let chunk = truncate_chars(&clean_text(&doc.content), budget.per_doc_chars);
        let block = format!("[row {}] {}", row, chunk);

        let separator = if blocks.is_empty() {
            0
        } else {
            BLOCK_SEPARATOR.len()
        };
        let cost = separator + block.chars().count();
        if total + cost > budget.max_ctx_chars {
            break;
        }
        total += cost;
        blocks.push(block);
    }

    blocks
}

/// Render the full prompt for `question`.
pub fn build_prompt(question: &str, docs: &[Document], budget: &PromptBudget) -> String {
    let blocks = context_blocks(docs, budget);

    if blocks.is_empty() {
        return format!(
            "You are a careful data assistant.\n\
             No relevant context was retrieved. If you cannot answer, say so clearly.\n\n\
             Question: {}\n\n\
             Return a concise answer. If unknown, reply: 'Insufficient context.'",
            question
        );
    }

    let context = blocks.join(BLOCK_SEPARATOR);
    format!(
        "{}\n\nQuestion: {}\n\nContext:\n{}\n\n{}",
        SYSTEM_RULES, question, context, ANSWER_FORMAT
    )
}
