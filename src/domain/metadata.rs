//! Post metadata carried in a notebook's leading `%META` cell.
//!
//! Each line of the cell is `key=value`. The value is everything after the
//! first `=`, so further `=` characters are kept. Unknown keys and lines
//! without `=` are ignored.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::domain::notebook::Cell;
use crate::domain::slug::derive_slug;

/// Directives read from a metadata cell, before categories are resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataDirectives {
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub categories: Option<Vec<String>>,
}

impl MetadataDirectives {
    pub fn from_cell(cell: &Cell) -> Self {
        Self::from_lines(cell.lines())
    }

    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut directives = Self::default();

        for line in lines {
            let line = line.trim_end_matches(['\n', '\r']);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            // Keys and list items tolerate surrounding whitespace.
            match key.trim() {
                "title" => directives.title = Some(value.to_string()),
                "excerpt" => directives.excerpt = Some(value.to_string()),
                "tags" => directives.tags = Some(split_list(value).collect()),
                "categories" => {
                    let mut names: Vec<String> = Vec::new();
                    for name in split_list(value) {
                        if !names.contains(&name) {
                            names.push(name);
                        }
                    }
                    directives.categories = Some(names);
                }
                _ => {}
            }
        }

        directives
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.excerpt.is_none()
            && self.tags.is_none()
            && self.categories.is_none()
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
}

/// Partial post update derived from a metadata cell. `None` leaves a field
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostMetadataUpdate {
    pub post_id: Uuid,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub category_ids: Option<BTreeSet<Uuid>>,
}

impl PostMetadataUpdate {
    /// Build the update from parsed directives and already-resolved category ids.
    pub fn new(
        post_id: Uuid,
        directives: MetadataDirectives,
        category_ids: Option<BTreeSet<Uuid>>,
    ) -> Self {
        let slug = directives.title.as_deref().map(derive_slug);
        Self {
            post_id,
            title: directives.title,
            slug,
            excerpt: directives.excerpt,
            tags: directives.tags,
            category_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognised_keys() {
        let directives = MetadataDirectives::from_lines([
            "%META\n",
            "title=Hello, World!\n",
            "excerpt=Short summary\n",
            "tags=rust, jupyter,rust\n",
            "categories=Tech,News\n",
        ]);

        assert_eq!(directives.title.as_deref(), Some("Hello, World!"));
        assert_eq!(directives.excerpt.as_deref(), Some("Short summary"));
        assert_eq!(
            directives.tags,
            Some(BTreeSet::from(["jupyter".to_string(), "rust".to_string()]))
        );
        assert_eq!(
            directives.categories,
            Some(vec!["Tech".to_string(), "News".to_string()])
        );
    }

    #[test]
    fn value_keeps_additional_equals_signs() {
        let directives = MetadataDirectives::from_lines(["excerpt=a=b=c"]);
        assert_eq!(directives.excerpt.as_deref(), Some("a=b=c"));
    }

    #[test]
    fn padded_keys_and_list_items_are_normalised() {
        let directives = MetadataDirectives::from_lines([
            " tags = rust, , rust ,web\n",
            "categories =News, Tech,News,\n",
        ]);

        assert_eq!(
            directives.tags,
            Some(BTreeSet::from(["rust".to_string(), "web".to_string()]))
        );
        assert_eq!(
            directives.categories,
            Some(vec!["News".to_string(), "Tech".to_string()])
        );
    }

    #[test]
    fn unknown_keys_and_bare_lines_are_ignored() {
        let directives = MetadataDirectives::from_lines(["%META", "author=me", "just text"]);
        assert!(directives.is_empty());
    }

    #[test]
    fn title_produces_slug() {
        let directives = MetadataDirectives::from_lines(["title=Hello, World!"]);
        let update = PostMetadataUpdate::new(Uuid::nil(), directives, None);

        assert_eq!(update.title.as_deref(), Some("Hello, World!"));
        assert_eq!(update.slug.as_deref(), Some("hello-world"));
        assert!(update.category_ids.is_none());
    }
}
