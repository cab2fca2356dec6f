//! Supported content types and the conversions each family allows.
//!
//! The table is built once at startup and handed to the fragment service,
//! so a deployment can extend it without touching the entity or codecs.

use std::collections::HashMap;

/// The class of a content type, deciding which conversions are legal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    PlainText,
    Markdown,
    Html,
    Json,
    Image,
}

const PLAIN_TEXT_TARGETS: &[&str] = &["text/plain"];
const MARKDOWN_TARGETS: &[&str] = &["text/markdown", "text/html", "text/plain"];
const HTML_TARGETS: &[&str] = &["text/html", "text/plain"];
const JSON_TARGETS: &[&str] = &["application/json", "text/plain"];
const IMAGE_TARGETS: &[&str] = &["image/png", "image/jpeg", "image/webp", "image/gif"];

/// How a family turns its payload into one of its targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    /// Bytes are returned as-is, relabelled with the target type.
    PassThrough,
    /// Markdown source rendered to HTML markup.
    MarkdownToHtml,
    /// Pixel data re-encoded into another raster format.
    Raster,
}

impl TypeFamily {
    /// Ordered list of MIME types a fragment of this family converts into.
    pub fn targets(self) -> &'static [&'static str] {
        match self {
            TypeFamily::PlainText => PLAIN_TEXT_TARGETS,
            TypeFamily::Markdown => MARKDOWN_TARGETS,
            TypeFamily::Html => HTML_TARGETS,
            TypeFamily::Json => JSON_TARGETS,
            TypeFamily::Image => IMAGE_TARGETS,
        }
    }

    /// Transform rule for `target`, or `None` when the target is not listed.
    pub fn transform(self, target: &str) -> Option<Transform> {
        if !self.targets().contains(&target) {
            return None;
        }
        let rule = match (self, target) {
            (TypeFamily::Markdown, "text/html") => Transform::MarkdownToHtml,
            (TypeFamily::Image, _) => Transform::Raster,
            _ => Transform::PassThrough,
        };
        Some(rule)
    }
}

/// Immutable table of accepted content types and extension mappings.
#[derive(Clone, Debug)]
pub struct TypeRegistry {
    types: HashMap<String, TypeFamily>,
    extensions: HashMap<String, String>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::empty()
            .with_type("text/plain", TypeFamily::PlainText)
            .with_type("text/plain; charset=utf-8", TypeFamily::PlainText)
            .with_type("text/markdown", TypeFamily::Markdown)
            .with_type("text/html", TypeFamily::Html)
            .with_type("application/json", TypeFamily::Json)
            .with_type("image/png", TypeFamily::Image)
            .with_type("image/jpeg", TypeFamily::Image)
            .with_type("image/webp", TypeFamily::Image)
            .with_type("image/gif", TypeFamily::Image)
            .with_extension("txt", "text/plain")
            .with_extension("md", "text/markdown")
            .with_extension("markdown", "text/markdown")
            .with_extension("html", "text/html")
            .with_extension("htm", "text/html")
            .with_extension("json", "application/json")
            .with_extension("png", "image/png")
            .with_extension("jpg", "image/jpeg")
            .with_extension("jpeg", "image/jpeg")
            .with_extension("webp", "image/webp")
            .with_extension("gif", "image/gif")
    }
}

impl TypeRegistry {
    /// A table that accepts nothing.
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
            extensions: HashMap::new(),
        }
    }

    /// Allow `content_type` (matched exactly) as a member of `family`.
    pub fn with_type(mut self, content_type: impl Into<String>, family: TypeFamily) -> Self {
        self.types.insert(content_type.into(), family);
        self
    }

    /// Map a file extension to a MIME type for conversion requests.
    pub fn with_extension(mut self, ext: &str, mime: impl Into<String>) -> Self {
        self.extensions.insert(ext.to_ascii_lowercase(), mime.into());
        self
    }

    /// True iff `value` is exactly one of the allowlisted type strings.
    pub fn is_supported(&self, value: &str) -> bool {
        self.types.contains_key(value)
    }

    /// Family of an allowlisted type, `None` for anything else.
    pub fn family(&self, content_type: &str) -> Option<TypeFamily> {
        self.types.get(content_type).copied()
    }

    /// Resolve a file extension (`html`, `.PNG`) to its MIME type.
    pub fn mime_for_extension(&self, ext: &str) -> Option<&str> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.extensions.get(&ext).map(String::as_str)
    }
}

/// Strip parameters from a content type: `Text/Plain; charset=utf-8` -> `text/plain`.
pub fn base_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_matches_allowlist_exactly() {
        let types = TypeRegistry::default();
        for t in [
            "text/plain",
            "text/plain; charset=utf-8",
            "text/markdown",
            "text/html",
            "application/json",
            "image/png",
            "image/jpeg",
            "image/webp",
            "image/gif",
        ] {
            assert!(types.is_supported(t), "{t} should be supported");
        }
        assert!(!types.is_supported("audio/mpeg"));
        assert!(!types.is_supported("text/plain;charset=utf-8"));
        assert!(!types.is_supported("text/html; charset=utf-8"));
    }

    #[test]
    fn charset_qualified_plain_text_is_plain_text() {
        let types = TypeRegistry::default();
        assert_eq!(
            types.family("text/plain; charset=utf-8"),
            Some(TypeFamily::PlainText)
        );
    }

    #[test]
    fn base_type_strips_parameters() {
        assert_eq!(base_type("text/plain; charset=utf-8"), "text/plain");
        assert_eq!(base_type(" Text/HTML "), "text/html");
        assert_eq!(base_type("image/png"), "image/png");
    }

    #[test]
    fn extension_lookup_ignores_case_and_dot() {
        let types = TypeRegistry::default();
        assert_eq!(types.mime_for_extension(".HTML"), Some("text/html"));
        assert_eq!(types.mime_for_extension("jpg"), Some("image/jpeg"));
        assert_eq!(types.mime_for_extension("txt"), Some("text/plain"));
        assert_eq!(types.mime_for_extension("exe"), None);
    }

    #[test]
    fn transform_rules_follow_family() {
        assert_eq!(
            TypeFamily::Markdown.transform("text/html"),
            Some(Transform::MarkdownToHtml)
        );
        assert_eq!(
            TypeFamily::Markdown.transform("text/plain"),
            Some(Transform::PassThrough)
        );
        assert_eq!(
            TypeFamily::Image.transform("image/webp"),
            Some(Transform::Raster)
        );
        assert_eq!(TypeFamily::PlainText.transform("application/json"), None);
        assert_eq!(TypeFamily::Html.transform("text/markdown"), None);
    }

    #[test]
    fn registry_can_be_extended() {
        let types = TypeRegistry::default()
            .with_type("text/csv", TypeFamily::PlainText)
            .with_extension("csv", "text/csv");
        assert!(types.is_supported("text/csv"));
        assert_eq!(types.mime_for_extension("csv"), Some("text/csv"));
    }
}
