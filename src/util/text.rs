use encoding_rs::Encoding;

/// Ellipsis appended to truncated excerpts
const ELLIPSIS: char = '…';

/// Decode a fetched HTTP body into a `String`, tolerating non-UTF-8 pages.
///
/// Charset resolution order:
/// 1. `charset=` parameter of the `Content-Type` response header
/// 2. a `charset=` declaration within the first 1024 bytes of the body
///    (`<meta charset="...">` or the http-equiv form)
/// 3. UTF-8 with lossy replacement
///
/// Decoding itself is BOM-aware, so a UTF-16 page with a BOM decodes
/// correctly even when both hints are absent or wrong.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let labelled = content_type
        .and_then(charset_from_params)
        .or_else(|| sniff_meta_charset(bytes));

    let encoding = labelled
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(encoding_rs::UTF_8);

    let (text, _actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!(
            encoding = encoding.name(),
            "Replacement characters emitted while decoding body"
        );
    }
    text.into_owned()
}

/// Pull the charset value out of a `Content-Type` header or meta content
/// attribute, e.g. `text/html; charset=ISO-8859-2`.
fn charset_from_params(value: &str) -> Option<String> {
    let lower = value.to_ascii_lowercase();
    let idx = lower.find("charset=")?;
    let rest = &value[idx + "charset=".len()..];
    let token: String = rest
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Scan the document head for a meta charset declaration.
///
/// Only the first 1024 bytes are inspected, matching what browsers do for
/// pre-scan; the slice is decoded as ASCII-compatible text, which is safe for
/// every charset label the pre-scan can legitimately declare.
fn sniff_meta_charset(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(1024)];
    let head_str = String::from_utf8_lossy(head);
    charset_from_params(&head_str)
}

/// Collapse runs of whitespace (including newlines) into single spaces and
/// trim the ends. Extracted text lengths are measured on this normalized
/// form so thresholds are stable across markup styles.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = true; // leading whitespace is dropped
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Take the first `max_chars` characters of `text`, appending an ellipsis
/// when truncation happened. Operates on chars, not bytes, so multibyte
/// input never splits a codepoint.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => {
            let mut out = text[..byte_idx].trim_end().to_string();
            out.push(ELLIPSIS);
            out
        }
    }
}
