//! Rewrites raw query text into the form the parser expects.
//!
//! Two things happen here: standalone `and`/`or` in any case become the
//! upper-case keywords, and colons inside the value half of a bare
//! `key:value` word are escaped so that values like `link:http://x` stay one
//! term. Quoted strings are passed through untouched.

use regex::Regex;
use std::sync::LazyLock;

static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<lead>\(*)(?P<key>[A-Za-z0-9_.\-]+):(?P<value>[^\[\{\(].*)$").unwrap()
});

enum Segment<'a> {
    Space(&'a str),
    Quoted(&'a str),
    Word(&'a str),
}

/// Splits text into whitespace runs, quoted strings and bare words, keeping
/// every byte so that the segments concatenate back to the input.
fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            let mut end = start;
            while let Some(&(i, c)) = chars.peek() {
                if !c.is_whitespace() {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            out.push(Segment::Space(&text[start..end]));
        } else if c == '"' {
            chars.next();
            let mut end = text.len();
            let mut escaped = false;
            for (i, c) in chars.by_ref() {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    end = i + 1;
                    break;
                }
            }
            out.push(Segment::Quoted(&text[start..end]));
        } else {
            let mut end = start;
            let mut escaped = false;
            while let Some(&(i, c)) = chars.peek() {
                if !escaped && (c.is_whitespace() || c == '"') {
                    break;
                }
                escaped = !escaped && c == '\\';
                end = i + c.len_utf8();
                chars.next();
            }
            out.push(Segment::Word(&text[start..end]));
        }
    }
    out
}

fn escape_colons(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut escaped = false;
    for c in value.chars() {
        if c == ':' && !escaped {
            out.push('\\');
        }
        escaped = !escaped && c == '\\';
        out.push(c);
    }
    out
}

pub fn normalize(text: &str) -> String {
    let segments = segments(text);
    let standalone = |i: usize| {
        let before = i == 0 || matches!(segments[i - 1], Segment::Space(_));
        let after = i + 1 == segments.len() || matches!(segments[i + 1], Segment::Space(_));
        before && after
    };

    let mut out = String::with_capacity(text.len() + 8);
    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Space(s) | Segment::Quoted(s) => out.push_str(s),
            Segment::Word(w) if standalone(i) && (w.eq_ignore_ascii_case("and") || w.eq_ignore_ascii_case("or")) => {
                out.push_str(&w.to_ascii_uppercase());
            }
            Segment::Word(w) => match KEY_VALUE.captures(w) {
                Some(caps) => {
                    out.push_str(&caps["lead"]);
                    out.push_str(&caps["key"]);
                    out.push(':');
                    out.push_str(&escape_colons(&caps["value"]));
                }
                None => out.push_str(w),
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_are_uppercased() {
        assert_eq!(normalize("a:1 and b:2 Or c:3"), "a:1 AND b:2 OR c:3");
    }

    #[test]
    fn test_keyword_values_are_left_alone() {
        assert_eq!(normalize("word:and band:or"), "word:and band:or");
        assert_eq!(normalize(r#"title:"this and that""#), r#"title:"this and that""#);
    }

    #[test]
    fn test_value_colons_are_escaped() {
        assert_eq!(normalize("link:http://x.org"), r"link:http\://x.org");
        assert_eq!(normalize("(ref:ns:thing)"), r"(ref:ns\:thing)");
    }

    #[test]
    fn test_already_escaped_colons_are_kept() {
        assert_eq!(normalize(r"link:http\://x.org"), r"link:http\://x.org");
    }

    #[test]
    fn test_ranges_and_groups_untouched() {
        assert_eq!(normalize("d:[2020 TO *]"), "d:[2020 TO *]");
        assert_eq!(normalize("s:(a or b)"), "s:(a OR b)");
    }

    #[test]
    fn test_whitespace_preserved() {
        assert_eq!(normalize("  a:1\tand  b:2 "), "  a:1\tAND  b:2 ");
    }
}
