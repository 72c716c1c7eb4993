//! Utilities for generating deterministic, human-friendly post slugs.
//!
//! ASCII slugification comes from the `slug` crate; Chinese text is first
//! transliterated with `pinyin` so inputs like “基线对齐” become
//! `ji-xian-dui-qi`. Titles that cannot produce any slug characters fall back
//! to [`PLACEHOLDER_SLUG`].

use pinyin::{Pinyin, ToPinyin};
use slug::slugify;

/// Slug used when a title has no representable characters.
pub const PLACEHOLDER_SLUG: &str = "n-a";

/// Derive a slug from a post title.
///
/// Lowercases, transliterates to ASCII, collapses every run of
/// non-alphanumeric characters into a single `-`, and trims leading and
/// trailing separators.
pub fn derive_slug(input: &str) -> String {
    let transliterated = transliterate_to_ascii(input);
    let candidate = slugify(&transliterated);

    if candidate.is_empty() {
        PLACEHOLDER_SLUG.to_string()
    } else {
        candidate
    }
}

fn transliterate_to_ascii(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(py) => append_pinyin(&mut output, py),
            None if ch.is_whitespace() => output.push(' '),
            None => {
                // Preserve unhandled characters so slugify can decide how to filter them.
                output.push(ch);
            }
        }
    }

    output
}

fn append_pinyin(buffer: &mut String, pinyin: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(pinyin.plain());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_collapses_to_single_separator() {
        assert_eq!(derive_slug("Hello, World!"), "hello-world");
        assert_eq!(derive_slug("  --Rust   &  Jupyter--  "), "rust-jupyter");
    }

    #[test]
    fn accents_are_transliterated() {
        assert_eq!(derive_slug("Crème Brûlée"), "creme-brulee");
    }

    #[test]
    fn derive_slug_transliterates_chinese() {
        assert_eq!(derive_slug("Rust 基础教程"), "rust-ji-chu-jiao-cheng");
    }

    #[test]
    fn empty_or_symbol_only_titles_use_placeholder() {
        assert_eq!(derive_slug(""), PLACEHOLDER_SLUG);
        assert_eq!(derive_slug("   "), PLACEHOLDER_SLUG);
        assert_eq!(derive_slug("!!!"), PLACEHOLDER_SLUG);
    }
}
