//! Locate `[ipynb ...]` directives inside a post body.
//!
//! Accepted forms:
//!
//! ```text
//! [ipynb https://github.com/user/repo/blob/main/post.ipynb]
//! [ipynb url="https://github.com/user/repo/blob/main/post.ipynb"]
//! ```

use std::ops::Range;

pub const DIRECTIVE_NAME: &str = "ipynb";

/// One directive occurrence in a post body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookDirective {
    /// Byte range of the whole directive, brackets included.
    pub span: Range<usize>,
    /// Source URL, when the directive carries one.
    pub url: Option<String>,
}

/// Find every directive in `body`, in order of appearance.
pub fn find_directives(body: &str) -> Vec<NotebookDirective> {
    let opener = format!("[{DIRECTIVE_NAME}");
    let mut directives = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = body[cursor..].find(&opener) {
        let start = cursor + offset;
        let after_name = start + opener.len();
        cursor = after_name;

        let boundary = body[after_name..].chars().next();
        if !matches!(boundary, Some(ch) if ch == ']' || ch.is_whitespace()) {
            continue;
        }

        let Some(close) = body[after_name..].find(']') else {
            break;
        };
        let end = after_name + close + 1;
        let attributes = &body[after_name..after_name + close];

        directives.push(NotebookDirective {
            span: start..end,
            url: source_url(attributes),
        });
        cursor = end;
    }

    directives
}

/// Return the single directive's URL; `None` when there are zero or several.
pub fn single_directive_url(body: &str) -> Option<String> {
    match find_directives(body).as_slice() {
        [only] => only.url.clone(),
        _ => None,
    }
}

fn source_url(attributes: &str) -> Option<String> {
    let mut positional = None;

    for token in tokenize(attributes) {
        match token.split_once('=') {
            Some((key, value)) if key == "url" => return non_empty(unquote(value)),
            Some((key, _)) if !key.contains("://") => {}
            _ => {
                if positional.is_none() {
                    positional = non_empty(unquote(&token));
                }
            }
        }
    }

    positional
}

fn tokenize(attributes: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in attributes.chars() {
        match quote {
            Some(open) if ch == open => {
                quote = None;
                current.push(ch);
            }
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            None if ch.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(ch),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

fn unquote(value: &str) -> &str {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    trimmed
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://github.com/user/repo/blob/main/post.ipynb";

    #[test]
    fn finds_positional_directive() {
        let body = format!("Intro\n[ipynb {URL}]\nOutro");
        let directives = find_directives(&body);

        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].url.as_deref(), Some(URL));
        assert_eq!(&body[directives[0].span.clone()], format!("[ipynb {URL}]"));
    }

    #[test]
    fn finds_named_and_quoted_directive() {
        let body = format!("[ipynb url=\"{URL}\"] and [ipynb '{URL}']");
        let urls: Vec<_> = find_directives(&body)
            .into_iter()
            .map(|directive| directive.url)
            .collect();

        assert_eq!(urls, vec![Some(URL.to_string()), Some(URL.to_string())]);
    }

    #[test]
    fn ignores_similar_names() {
        assert!(find_directives("[ipynbx foo] [ipy foo]").is_empty());
    }

    #[test]
    fn directive_without_url_still_counts() {
        let directives = find_directives("[ipynb]");
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].url, None);
    }

    #[test]
    fn single_directive_url_rejects_ambiguity() {
        assert_eq!(single_directive_url("no directive"), None);
        assert_eq!(
            single_directive_url(&format!("[ipynb {URL}]")).as_deref(),
            Some(URL)
        );
        assert_eq!(
            single_directive_url(&format!("[ipynb {URL}] [ipynb {URL}]")),
            None
        );
    }

    #[test]
    fn unterminated_directive_is_ignored() {
        assert!(find_directives("[ipynb https://example.com").is_empty());
    }
}
