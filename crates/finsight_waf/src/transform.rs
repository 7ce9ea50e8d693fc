//! Text transformations applied before a leaf statement matches.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TextTransformation {
    None,
    UrlDecode,
    HtmlEntityDecode,
    Lowercase,
    CompressWhiteSpace,
}

impl TextTransformation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextTransformation::None => "NONE",
            TextTransformation::UrlDecode => "URL_DECODE",
            TextTransformation::HtmlEntityDecode => "HTML_ENTITY_DECODE",
            TextTransformation::Lowercase => "LOWERCASE",
            TextTransformation::CompressWhiteSpace => "COMPRESS_WHITE_SPACE",
        }
    }

    pub fn apply(&self, input: &str) -> String {
        match self {
            TextTransformation::None => input.to_string(),
            TextTransformation::UrlDecode => url_decode(input),
            TextTransformation::HtmlEntityDecode => html_entity_decode(input),
            TextTransformation::Lowercase => input.to_lowercase(),
            TextTransformation::CompressWhiteSpace => compress_whitespace(input),
        }
    }
}

impl std::fmt::Display for TextTransformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Apply transformations in order.
pub fn apply_all(transformations: &[TextTransformation], input: &str) -> String {
    transformations
        .iter()
        .fold(input.to_string(), |text, t| t.apply(&text))
}

/// Percent-decode; `+` becomes a space and malformed escapes stay literal.
fn url_decode(input: &str) -> String {
    let spaced = input.replace('+', " ");
    let decoded = urlencoding::decode_binary(spaced.as_bytes());
    String::from_utf8_lossy(&decoded).into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}

fn numeric_entity(body: &str) -> Option<char> {
    let code = if let Some(hex) = body.strip_prefix('x').or_else(|| body.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        body.parse::<u32>().ok()?
    };
    char::from_u32(code)
}

/// Decode `&name;`, `&#NN;` and `&#xHH;` entities.
fn html_entity_decode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start + 1..];

        let decoded = candidate
            .find(';')
            .filter(|&end| end > 0 && end <= 10)
            .and_then(|end| {
                let body = &candidate[..end];
                let ch = match body.strip_prefix('#') {
                    Some(number) => numeric_entity(number),
                    None => named_entity(body),
                }?;
                Some((ch, end))
            });

        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = candidate;
            }
        }
    }

    out.push_str(rest);
    out
}

fn compress_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_decode() {
        assert_eq!(url_decode("a%20b+c"), "a b c");
        assert_eq!(url_decode("%3Cscript%3E"), "<script>");
        assert_eq!(url_decode("100%"), "100%");
        assert_eq!(url_decode("%zz"), "%zz");
        assert_eq!(url_decode("%E2%9C%93"), "\u{2713}");
    }

    #[test]
    fn test_html_entity_decode() {
        assert_eq!(html_entity_decode("&lt;b&gt;"), "<b>");
        assert_eq!(html_entity_decode("&#39;&#x27;"), "''");
        assert_eq!(html_entity_decode("fish & chips"), "fish & chips");
        assert_eq!(html_entity_decode("&unknown;"), "&unknown;");
    }

    #[test]
    fn test_chain_runs_in_order() {
        let chain = [TextTransformation::UrlDecode, TextTransformation::HtmlEntityDecode];
        assert_eq!(apply_all(&chain, "%26lt%3Bscript%26gt%3B"), "<script>");
    }

    #[test]
    fn test_lowercase_and_whitespace() {
        assert_eq!(TextTransformation::Lowercase.apply("GoogleBot"), "googlebot");
        assert_eq!(
            TextTransformation::CompressWhiteSpace.apply("a \t\n b"),
            "a b"
        );
    }
}
