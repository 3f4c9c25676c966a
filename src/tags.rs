//! Curated search tags offered to API clients.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Used when no curated tags document exists.
const DEFAULT_TAGS: &[&str] = &[
    "painting", "illustration", "drawing", "poster", "white", "blue", "black", "red", "green",
    "pink", "purple", "yellow", "orange", "gold", "flowers", "sky", "water", "field", "ocean",
    "beach", "street", "night", "lights", "air", "tree", "snow", "flower", "bird", "cat",
    "close", "colorful", "city", "group", "face", "bunch",
];

/// `curated_tags.json` layout.
#[derive(Debug, Deserialize)]
struct CuratedTagsDocument {
    all_tags: Vec<String>,
    #[serde(default)]
    art_media_styles: Vec<String>,
    #[serde(default)]
    colors: Vec<String>,
    #[serde(default)]
    nature_environment: Vec<String>,
    #[serde(default)]
    descriptive_terms: Vec<String>,
}

/// Body of `GET /tags`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagList {
    pub tags: Vec<String>,
    pub total_unique_tags: usize,
    /// Empty when the built-in list is used
    pub categories: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum TagsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed curated tags: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read the curated tags document, or fall back to the built-in list when it is absent.
pub fn load_tags(path: &Path) -> Result<TagList, TagsError> {
    if !path.exists() {
        let tags: Vec<String> = DEFAULT_TAGS.iter().map(|t| t.to_string()).collect();
        return Ok(TagList {
            total_unique_tags: tags.len(),
            tags,
            categories: BTreeMap::new(),
        });
    }

    let doc: CuratedTagsDocument = serde_json::from_slice(&std::fs::read(path)?)?;

    let categories = BTreeMap::from([
        ("art_media_styles".to_string(), doc.art_media_styles),
        ("colors".to_string(), doc.colors),
        ("nature_environment".to_string(), doc.nature_environment),
        ("descriptive_terms".to_string(), doc.descriptive_terms),
    ]);

    Ok(TagList {
        total_unique_tags: doc.all_tags.len(),
        tags: doc.all_tags,
        categories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tags_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let tags = load_tags(&tmp.path().join("curated_tags.json")).unwrap();

        assert_eq!(tags.tags.len(), DEFAULT_TAGS.len());
        assert_eq!(tags.total_unique_tags, tags.tags.len());
        assert_eq!(tags.tags[0], "painting");
        assert!(tags.categories.is_empty());
    }

    #[test]
    fn test_curated_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("curated_tags.json");
        std::fs::write(
            &path,
            r#"{"all_tags": ["ink", "teal", "forest"], "colors": ["teal"], "art_media_styles": ["ink"]}"#,
        )
        .unwrap();

        let tags = load_tags(&path).unwrap();
        assert_eq!(tags.tags, vec!["ink", "teal", "forest"]);
        assert_eq!(tags.total_unique_tags, 3);
        assert_eq!(tags.categories["colors"], vec!["teal"]);
        assert!(tags.categories["nature_environment"].is_empty());
    }

    #[test]
    fn test_document_without_all_tags_is_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("curated_tags.json");
        std::fs::write(&path, r#"{"colors": ["teal"]}"#).unwrap();

        assert!(matches!(load_tags(&path), Err(TagsError::Json(_))));
    }
}
