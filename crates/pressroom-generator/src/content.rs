//! Shaping raw model output into a publishable post.

use serde::Deserialize;
use tracing::debug;

const MAX_TAGS: usize = 5;

/// Post fields as produced by the model (or recovered from plain text).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Draft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Parse the model's reply. A JSON object `{title, content, tags}` is
/// preferred; anything else is treated as plain text whose first line is
/// the title.
pub fn parse_reply(reply: &str, topic: &str) -> Draft {
    let trimmed = strip_code_fence(reply.trim());
    match serde_json::from_str::<Draft>(trimmed) {
        Ok(draft) if !draft.title.trim().is_empty() && !draft.content.trim().is_empty() => draft,
        Ok(_) => from_text(reply, topic),
        Err(e) => {
            debug!("reply is not a JSON draft ({e}); falling back to text extraction");
            from_text(reply, topic)
        }
    }
}

/// Final clean-up applied to every draft: markdown headings, word cap, tag
/// normalisation.
pub fn finish(mut draft: Draft, topic: &str, max_words: u32) -> Draft {
    draft.title = draft.title.trim().trim_start_matches('#').trim().to_string();
    draft.content = trim_to_words(&ensure_headings(draft.content.trim()), max_words as usize);
    draft.tags = normalise_tags(draft.tags, topic);
    draft
}

fn from_text(reply: &str, topic: &str) -> Draft {
    let title = reply
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.trim_start_matches('#').trim().to_string())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| format!("Understanding {topic}"));
    Draft {
        title,
        content: reply.to_string(),
        tags: hashtags(reply),
    }
}

/// Models sometimes wrap JSON in a ```json fence despite instructions.
fn strip_code_fence(s: &str) -> &str {
    s.strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(s)
}

/// `#word` tokens, in order of appearance. Markdown headings (`# Title`)
/// are not tags because the `#` is followed by a space.
fn hashtags(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|w| w.strip_prefix('#'))
        .map(|w| {
            w.chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .take(MAX_TAGS)
        .collect()
}

fn normalise_tags(tags: Vec<String>, topic: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    if out.is_empty() {
        out = topic
            .split_whitespace()
            .take(3)
            .map(str::to_lowercase)
            .collect();
        out.push("blog".into());
    }
    out.truncate(MAX_TAGS);
    out
}

/// Promote lines that read like section titles (`Something:`) to `##` headings.
fn ensure_headings(content: &str) -> String {
    content
        .lines()
        .map(|line| {
            let l = line.trim();
            let looks_like_heading = l.len() > 10
                && l.len() < 100
                && l.ends_with(':')
                && !l.starts_with(['#', '-', '*']);
            if looks_like_heading {
                format!("## {}", l.trim_end_matches(':'))
            } else {
                line.trim_end().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cap at `max_words`, preferring to end on a sentence boundary in the last
/// fifth of the kept text.
fn trim_to_words(content: &str, max_words: usize) -> String {
    if max_words == 0 || content.split_whitespace().count() <= max_words {
        return content.to_string();
    }
    let kept = &content[..word_end(content, max_words)];
    match kept.rfind(['.', '!', '?']) {
        Some(end) if end * 5 > kept.len() * 4 => kept[..=end].to_string(),
        _ => format!("{kept}..."),
    }
}

/// Byte offset just past the `n`th whitespace-separated word.
fn word_end(content: &str, n: usize) -> usize {
    let mut words = 0;
    let mut in_word = false;
    for (i, c) in content.char_indices() {
        if c.is_whitespace() {
            if in_word {
                words += 1;
                if words == n {
                    return i;
                }
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    content.len()
}
