//! Quoting of bare PII-mask placeholders in serialized tool output.
//!
//! Upstream masking replaces sensitive values with placeholders such as
//! `<MONEY_1>` or `<PERSON_3>`. When the masked value was a number or a
//! bare literal, the placeholder ends up unquoted (`{'amount': <MONEY_1>}`)
//! and the payload no longer parses. [`sanitize_unquoted_tokens`] wraps such
//! bare placeholders in double quotes while leaving every byte inside an
//! existing string literal untouched.
//!
//! The scanner tracks both `"` and `'` string literals (Python reprs use
//! single quotes) and honours backslash escapes inside them.

use std::sync::OnceLock;

use regex::Regex;

/// Placeholder shape, optionally glued to a numeric prefix or suffix
/// (`1.<MONEY_2>`, `<MONEY_2>.50`).
const TOKEN_PATTERN: &str = r"(?:[0-9]+\.)?<[A-Z_][A-Za-z0-9_]*>(?:\.[0-9]+)?";

struct TokenPatterns {
    /// `: <TOKEN>` followed by `,`, `}` or `]`.
    dict_value: Regex,
    /// `[ <TOKEN>` or `, <TOKEN>` followed by `,` or `]`.
    list_item: Regex,
    /// `[<TOKEN>` at the start of a list, whatever follows.
    list_head: Regex,
}

fn patterns() -> &'static TokenPatterns {
    static PATTERNS: OnceLock<TokenPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| TokenPatterns {
        dict_value: Regex::new(&format!(r"(:\s*)({TOKEN_PATTERN})(\s*[,\}}\]])"))
            .expect("dict value pattern is valid"),
        list_item: Regex::new(&format!(r"([\[,]\s*)({TOKEN_PATTERN})(\s*[,\]])"))
            .expect("list item pattern is valid"),
        list_head: Regex::new(&format!(r"(\[\s*)({TOKEN_PATTERN})"))
            .expect("list head pattern is valid"),
    })
}

/// A run of the input that is either inside a string literal or outside.
#[derive(Debug, PartialEq)]
struct Segment<'a> {
    quoted: bool,
    text: &'a str,
}

/// Splits `text` into alternating quoted / unquoted segments.
///
/// A quoted segment includes its opening and closing quote characters.
/// An unterminated string literal runs to the end of the input and is
/// treated as quoted, so nothing inside it is ever rewritten.
fn split_segments(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut open_quote: Option<char> = None;
    let mut escape_next = false;

    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match open_quote {
            Some(_) if c == '\\' => escape_next = true,
            Some(q) if c == q => {
                let end = i + c.len_utf8();
                segments.push(Segment {
                    quoted: true,
                    text: &text[start..end],
                });
                start = end;
                open_quote = None;
            }
            Some(_) => {}
            None if c == '"' || c == '\'' => {
                if start < i {
                    segments.push(Segment {
                        quoted: false,
                        text: &text[start..i],
                    });
                }
                start = i;
                open_quote = Some(c);
            }
            None => {}
        }
    }

    if start < text.len() {
        segments.push(Segment {
            quoted: open_quote.is_some(),
            text: &text[start..],
        });
    }

    segments
}

/// Quotes bare placeholders in a segment that is known to be outside any
/// string literal.
///
/// Regex replacement consumes the delimiter after a match, so adjacent list
/// items (`[<A>, <B>, <C>]`) need more than one pass. Each pass strictly
/// reduces the number of bare placeholders; quoted ones can never match
/// again because a `"` now precedes the `<`.
fn quote_bare_tokens(segment: &str) -> String {
    let p = patterns();
    let mut current = segment.to_string();

    loop {
        let next = p.dict_value.replace_all(&current, "${1}\"${2}\"${3}");
        let next = p.list_item.replace_all(&next, "${1}\"${2}\"${3}");
        let next = p.list_head.replace_all(&next, "${1}\"${2}\"").into_owned();

        if next == current {
            return current;
        }
        current = next;
    }
}

/// Wraps bare `<TOKEN>` placeholders appearing as dict values or list items
/// in double quotes. Content inside existing string literals is returned
/// byte-identical.
pub fn sanitize_unquoted_tokens(text: &str) -> String {
    if !text.contains('<') {
        return text.to_string();
    }

    split_segments(text)
        .into_iter()
        .map(|segment| {
            if segment.quoted {
                segment.text.to_string()
            } else {
                quote_bare_tokens(segment.text)
            }
        })
        .collect()
}
