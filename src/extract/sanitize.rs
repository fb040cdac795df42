//! Allow-list HTML sanitizer.
//!
//! This is a security control, not a formatting nicety: extracted fragments
//! come from arbitrary third-party pages, and everything they carry ends up
//! stored and later rendered by downstream consumers. Only tags and
//! attributes on the explicit allow-lists survive; script/style content and
//! event-handler attributes are dropped unconditionally.

use ego_tree::NodeRef;
use scraper::{Html, Node};

/// Tags emitted verbatim (with filtered attributes). Anything not listed is
/// either dropped with its entire subtree (DROP_WITH_CONTENT) or unwrapped —
/// the tag disappears but its children are still processed.
const ALLOWED_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "table", "thead", "tbody", "tfoot",
    "tr", "th", "td", "a", "img", "em", "strong", "i", "b", "u", "blockquote", "pre", "code",
    "figure", "figcaption", "br", "hr",
];

/// Subtrees removed wholesale: executable content, embedded documents,
/// interactive controls, and page chrome.
const DROP_WITH_CONTENT: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "frame", "object", "embed", "applet",
    "form", "button", "input", "select", "option", "textarea", "svg", "canvas", "audio", "video",
    "nav", "header", "footer", "aside", "link", "meta", "head",
];

/// The only attributes that survive, and only on allowed tags. Event
/// handlers (`on*`) are rejected by omission.
const ALLOWED_ATTRS: &[&str] = &["href", "src", "alt", "title", "class", "id"];

/// HTML void elements among the allowed tags (no closing tag, no children)
const VOID_TAGS: &[&str] = &["br", "hr", "img"];

/// Sanitize an extracted HTML fragment against the allow-lists.
///
/// The fragment is re-parsed and re-serialized; nothing from the input markup
/// is echoed through, so malformed or hostile syntax cannot survive into the
/// output.
pub fn sanitize_fragment(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len() / 2);
    for child in fragment.tree.root().children() {
        write_node(&mut out, child);
    }
    out
}

/// Plain text of a sanitized fragment, whitespace-collapsed. Adjacent blocks
/// are separated by single spaces so words never fuse across tags.
pub fn fragment_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut chunks: Vec<String> = Vec::new();
    collect_text(fragment.tree.root(), &mut chunks);
    crate::util::collapse_whitespace(&chunks.join(" "))
}

fn collect_text(node: NodeRef<'_, Node>, chunks: &mut Vec<String>) {
    match node.value() {
        Node::Text(t) => chunks.push(t.to_string()),
        Node::Element(el) if DROP_WITH_CONTENT.contains(&el.name()) => {}
        _ => {
            for child in node.children() {
                collect_text(child, chunks);
            }
        }
    }
}

fn write_node(out: &mut String, node: NodeRef<'_, Node>) {
    match node.value() {
        Node::Text(t) => push_escaped_text(out, &t),
        Node::Element(el) => {
            let name = el.name();

            if DROP_WITH_CONTENT.contains(&name) {
                return;
            }

            if !ALLOWED_TAGS.contains(&name) {
                // Unwrap: keep the children, lose the tag
                for child in node.children() {
                    write_node(out, child);
                }
                return;
            }

            out.push('<');
            out.push_str(name);
            for (attr_name, attr_value) in el.attrs() {
                if !ALLOWED_ATTRS.contains(&attr_name) {
                    continue;
                }
                if matches!(attr_name, "href" | "src") && !is_safe_link(attr_value) {
                    continue;
                }
                out.push(' ');
                out.push_str(attr_name);
                out.push_str("=\"");
                push_escaped_attr(out, attr_value);
                out.push('"');
            }
            out.push('>');

            if VOID_TAGS.contains(&name) {
                return;
            }

            for child in node.children() {
                write_node(out, child);
            }

            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        // Comments, doctypes, processing instructions: dropped
        _ => {}
    }
}

/// Reject URL schemes that execute or smuggle content. Relative URLs,
/// fragments, and http(s)/mailto pass.
fn is_safe_link(value: &str) -> bool {
    let trimmed = value.trim();
    // Find a scheme delimiter that precedes any path/query/fragment character
    let colon = match trimmed.find(':') {
        Some(idx) => idx,
        None => return true, // relative URL or fragment
    };
    if trimmed[..colon]
        .find(['/', '?', '#'])
        .is_some()
    {
        return true; // ':' belongs to the path, not a scheme
    }
    let scheme = trimmed[..colon].to_ascii_lowercase();
    matches!(scheme.as_str(), "http" | "https" | "mailto")
}

fn push_escaped_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn push_escaped_attr(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn strips_script_and_event_handlers_keeps_legit_content() {
        let input = r#"<p>Before</p><script>alert('xss')</script><p onclick="steal()">After <a href="https://example.com/next">link</a></p>"#;
        let out = sanitize_fragment(input);

        assert!(!out.contains("script"));
        assert!(!out.contains("alert"));
        assert!(!out.contains("onclick"));
        assert!(!out.contains("steal"));
        assert!(out.contains("<p>Before</p>"));
        assert!(out.contains("After"));
        assert!(out.contains(r#"<a href="https://example.com/next">link</a>"#));
    }

    #[test]
    fn drops_style_blocks_entirely() {
        let input = "<style>.x{color:red}</style><p>kept</p>";
        let out = sanitize_fragment(input);
        assert_eq!(out, "<p>kept</p>");
    }

    #[test]
    fn unwraps_unknown_tags_but_keeps_their_children() {
        let input = r#"<div class="wrapper"><section><p>inner text</p></section></div>"#;
        let out = sanitize_fragment(input);
        assert_eq!(out, "<p>inner text</p>");
    }

    #[test]
    fn filters_attributes_to_allow_list() {
        let input = r#"<p style="color:red" data-track="1" id="lead" class="intro">x</p>"#;
        let out = sanitize_fragment(input);
        assert!(!out.contains("style"));
        assert!(!out.contains("data-track"));
        assert!(out.contains(r#"id="lead""#));
        assert!(out.contains(r#"class="intro""#));
    }

    #[test]
    fn rejects_javascript_and_data_urls() {
        let input = r#"<a href="javascript:alert(1)">a</a><img src="data:text/html;base64,PHNjcmlwdD4=" alt="pic"><a href="/relative">b</a>"#;
        let out = sanitize_fragment(input);
        assert!(!out.contains("javascript"));
        assert!(!out.contains("data:"));
        assert!(out.contains(r#"<a href="/relative">b</a>"#));
        // img survives with its alt, just without the hostile src
        assert!(out.contains(r#"<img alt="pic">"#));
    }

    #[test]
    fn drops_page_chrome_subtrees() {
        let input = "<nav><ul><li>Home</li></ul></nav><p>story</p><footer>© site</footer>";
        let out = sanitize_fragment(input);
        assert_eq!(out, "<p>story</p>");
    }

    #[test]
    fn escapes_text_content() {
        let out = sanitize_fragment("<p>a &lt; b &amp; c</p>");
        assert_eq!(out, "<p>a &lt; b &amp; c</p>");
    }

    #[test]
    fn preserves_tables_and_figures() {
        let input = "<table><tbody><tr><td>cell</td></tr></tbody></table><figure><img src=\"https://example.com/i.png\" alt=\"i\"><figcaption>cap</figcaption></figure>";
        let out = sanitize_fragment(input);
        assert!(out.contains("<td>cell</td>"));
        assert!(out.contains("<figcaption>cap</figcaption>"));
    }

    #[test]
    fn fragment_text_flattens_markup() {
        let text = fragment_text("<p>one</p><p>two <em>three</em></p>");
        assert_eq!(text, "one two three");
    }

    #[test]
    fn fragment_text_skips_script_bodies() {
        let text = fragment_text("<p>real</p><script>var x = 'junk';</script>");
        assert_eq!(text, "real");
    }

    proptest! {
        // Whatever surrounds the payload, executable content never survives
        #[test]
        fn never_emits_scripts_or_handlers(prefix in "[a-zA-Z0-9 <>/=\"']{0,64}", suffix in "[a-zA-Z0-9 <>/=\"']{0,64}") {
            let input = format!(
                "{prefix}<script>alert(1)</script><p onclick=\"x()\" onmouseover=\"y()\">t</p>{suffix}"
            );
            let out = sanitize_fragment(&input);
            prop_assert!(!out.contains("<script"));
            prop_assert!(!out.contains("onclick"));
            prop_assert!(!out.contains("onmouseover"));
        }

        #[test]
        fn output_attrs_stay_within_allow_list(body in "[a-z]{1,12}") {
            let input = format!("<p onfocus=\"z()\" style=\"x\" title=\"t\">{body}</p>");
            let out = sanitize_fragment(&input);
            prop_assert!(out.contains(&body));
            prop_assert!(!out.contains("onfocus"));
            prop_assert!(!out.contains("style"));
            prop_assert!(out.contains("title=\"t\""));
        }
    }
}
