//! Prompt texts sent to the generative services, and the page function run
//! by the extraction service.

/// Routine the extraction service runs against the article page.
///
/// The first `<h1>` is usually the article headline; the `<title>` is the
/// fallback when a page has no `<h1>`.
pub const PAGE_FUNCTION: &str = r#"
async function pageFunction(context) {
    const { $, request } = context;
    const h1 = $('h1').first().text().trim();
    const title = $('title').text().trim();
    return { url: request.url, headline: h1 || title, title: title };
}
"#;

pub fn fallback_headline(keywords: &str) -> String {
    format!(
        "You are a creative news writer. Based on the keywords: \"{keywords}\", create a \
         realistic, engaging news headline that could be from a recent article. Make it \
         sound professional and current. Return ONLY the headline as a string, nothing else."
    )
}

pub fn meme_image(headline: &str) -> String {
    format!(
        "A high-quality, funny, and visually appealing meme image representing the concept \
         of this news headline: \"{headline}\". Style: modern, shareable, clear, and \
         impactful. IMPORTANT: Do not include any text, words, or letters in the image itself."
    )
}

pub fn meme_caption(headline: &str) -> String {
    format!(
        "You are a witty news commentator. For the headline \"{headline}\", generate a very \
         brief (one short sentence max), funny meme caption that captures the essence of \
         the news."
    )
}

pub fn video_script(headline: &str, caption: &str) -> String {
    format!(
        "You are an AI news moderator for \"Meme Street Journal\". Write a concise, engaging \
         30-second video script about the news headline: \"{headline}\". First, briefly \
         explain the news. Then, present our witty meme about it, which says: \"{caption}\". \
         End with a quick sign-off. The tone should be like a modern news explainer on \
         TikTok or Reels."
    )
}
