mod gemini;
mod openai;

pub use gemini::GeminiRewriter;
pub use openai::OpenAiRewriter;

use anyhow::Result;

/// Trait for text rewriting services.
///
/// Implement this trait to add a custom backend. The library ships with
/// [`GeminiRewriter`] and [`OpenAiRewriter`].
///
/// # Example
///
/// ```rust,no_run
/// use exif_session::ai::{GeminiRewriter, TextRewriter, build_prompt};
///
/// # async fn example() -> anyhow::Result<()> {
/// let service = GeminiRewriter::new("key".into(), "gemini-2.0-flash".into());
/// let text = service.rewrite(&build_prompt("Hand-thrown stoneware mug, 350 ml")).await?;
/// println!("{text}");
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait TextRewriter: Send + Sync {
    /// The display name of this service (e.g., "Gemini", "OpenAI").
    fn name(&self) -> &str;
    /// Send a complete prompt and return the model's raw reply text.
    async fn rewrite(&self, prompt: &str) -> Result<String>;
}

/// Build the product-description rewrite prompt around `text`.
pub fn build_prompt(text: &str) -> String {
    format!(
        r#"Rewrite the following product description in fresh wording.

Rules:
- Keep every factual detail: product name, dimensions, materials, quantities, prices, and condition.
- Do not add claims, features, or details that are not in the original.
- Keep roughly the same length and the same language as the original.
- Plain text only. No markdown, no headings, no quotation marks around the result.
- Return ONLY the rewritten description, no preamble or commentary.

Original description:
{text}"#
    )
}

/// Rewrite `text` through each service in order, falling back to the original.
///
/// A service error or an empty reply moves on to the next service. With no services, or
/// when all of them fail, `text` comes back unchanged. Never errors.
pub async fn rewrite_description(services: &[Box<dyn TextRewriter>], text: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }
    if services.is_empty() {
        log::debug!("No text rewriter configured, keeping original description");
        return text.to_string();
    }

    let prompt = build_prompt(text);
    for service in services {
        log::info!("Rewriting description with {}...", service.name());
        match service.rewrite(&prompt).await {
            Ok(reply) => match clean_reply(&reply) {
                Some(cleaned) => {
                    log::info!(
                        "{} rewrote description ({} -> {} chars)",
                        service.name(),
                        text.chars().count(),
                        cleaned.chars().count()
                    );
                    return cleaned;
                }
                None => log::warn!("{} returned an empty reply", service.name()),
            },
            Err(e) => log::warn!("{} failed: {e:#}", service.name()),
        }
    }

    log::warn!("All rewriters failed, keeping original description");
    text.to_string()
}

/// Strip the wrapping models like to add: code fences and surrounding quotes.
/// Returns `None` when nothing is left.
pub fn clean_reply(reply: &str) -> Option<String> {
    log::debug!("Raw rewriter reply:\n{reply}");
    let mut text = reply.trim();

    if text.starts_with("```") {
        text = text
            .trim_start_matches("```")
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .trim_end_matches("```")
            .trim();
    }

    for quote in ['"', '\u{201C}'] {
        let close = if quote == '"' { '"' } else { '\u{201D}' };
        if text.len() > 1 && text.starts_with(quote) && text.ends_with(close) {
            text = text[quote.len_utf8()..text.len() - close.len_utf8()].trim();
        }
    }

    if text.is_empty() { None } else { Some(text.to_string()) }
}
