//! HTML → text/plain alternative part.
//!
//! The HTML body is converted with `htmd`, then a few cleanup passes remove
//! markup the converter leaves behind and collapse blank-line runs.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Render `html` as readable plain text.
pub fn html_to_text(html: &str) -> String {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["head", "script", "style", "noscript", "iframe", "svg", "img"])
        .build();

    let text = match converter.convert(html) {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "htmd conversion failed, stripping tags instead");
            html.to_string()
        }
    };

    let mut result = strip_leftover_tags(&text);
    result = decode_entities(&result);
    result = trim_lines(&result);
    result = collapse_blank_lines(&result);
    format!("{}\n", result.trim())
}

/// Remove any tags the converter passed through.
fn strip_leftover_tags(text: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->|</?[a-zA-Z][^>]*>").expect("valid regex"));
    static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)<(script|style|head)\b.*?</(script|style|head)>").expect("valid regex")
    });

    let text = BLOCK_RE.replace_all(text, "");
    TAG_RE.replace_all(&text, "").to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn trim_lines(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse runs of 3+ blank lines into one blank line.
fn collapse_blank_lines(text: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(text, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_text_and_drops_scripts() {
        let html = r#"<html><head><style>p { color: red; }</style></head>
            <body><script>track()</script>
            <div><h1>Hello Sweet Crumbs</h1><p>Your <strong>peak hours</strong> are 7-9am.</p></div>
            </body></html>"#;
        let text = html_to_text(html);
        assert!(text.contains("Hello Sweet Crumbs"));
        assert!(text.contains("peak hours"));
        assert!(!text.contains("track()"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn no_runs_of_blank_lines() {
        let html = "<div><p>One</p><br><br><br><br><p>Two</p><table><tr><td>Three</td></tr></table></div>";
        let text = html_to_text(html);
        assert!(!text.contains("\n\n\n"));
        assert!(text.contains("One"));
        assert!(text.contains("Three"));
    }

    #[test]
    fn collapse_keeps_single_blank() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }
}
