use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, versioned resume. The pipeline only ever sees an immutable
/// snapshot loaded by a [`RecordSource`](crate::records::RecordSource).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(default)]
    pub version: i32,
    pub sections: Vec<Section>,
    #[serde(default)]
    pub layout: Option<Layout>,
}

impl Record {
    /// Section ids in insertion order.
    pub fn section_ids(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.id.clone()).collect()
    }

    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }
}

/// A typed sub-unit of a record. `content` stays untyped until the
/// renderer decodes it against `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub kind: SectionKind,
    #[serde(default)]
    pub content: Value,
}

/// The closed set of section kinds. Adding a kind means adding a renderer arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Header,
    Summary,
    Skills,
    #[serde(alias = "experience", alias = "projects", alias = "education")]
    Entries,
    #[serde(alias = "raw")]
    RawCustom,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Header => "header",
            SectionKind::Summary => "summary",
            SectionKind::Skills => "skills",
            SectionKind::Entries => "entries",
            SectionKind::RawCustom => "raw_custom",
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record override of section order and visibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    #[serde(default)]
    pub order: Vec<String>,
    #[serde(default)]
    pub disabled: BTreeSet<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Kind-specific payloads
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderContent {
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub github: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    /// Path of a photo relative to the template directory.
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryContent {
    #[serde(default)]
    pub title: Option<String>,
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillGroup {
    pub category: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillsContent {
    #[serde(default)]
    pub title: Option<String>,
    pub groups: Vec<SkillGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub title: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntriesContent {
    #[serde(default)]
    pub title: Option<String>,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawContent {
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
}

/// Decoded section content, one variant per [`SectionKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum SectionContent {
    Header(HeaderContent),
    Summary(SummaryContent),
    Skills(SkillsContent),
    Entries(EntriesContent),
    RawCustom(RawContent),
}

impl Section {
    /// Decodes `content` against the declared kind.
    pub fn typed_content(&self) -> Result<SectionContent, serde_json::Error> {
        let value = self.content.clone();
        Ok(match self.kind {
            SectionKind::Header => SectionContent::Header(serde_json::from_value(value)?),
            SectionKind::Summary => SectionContent::Summary(serde_json::from_value(value)?),
            SectionKind::Skills => SectionContent::Skills(serde_json::from_value(value)?),
            SectionKind::Entries => SectionContent::Entries(serde_json::from_value(value)?),
            SectionKind::RawCustom => SectionContent::RawCustom(serde_json::from_value(value)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_alias_deserializes_to_raw_custom() {
        let section: Section = serde_json::from_value(json!({
            "id": "notes",
            "kind": "raw",
            "content": { "content": "hello" }
        }))
        .unwrap();
        assert_eq!(section.kind, SectionKind::RawCustom);
    }

    #[test]
    fn test_entry_like_kinds_deserialize_to_entries() {
        for kind in ["experience", "projects", "education", "entries"] {
            let section: Section = serde_json::from_value(json!({
                "id": kind,
                "kind": kind,
                "content": { "entries": [{ "title": "Engineer" }] }
            }))
            .unwrap();
            assert_eq!(section.kind, SectionKind::Entries, "{kind}");
            assert!(matches!(section.typed_content().unwrap(), SectionContent::Entries(_)));
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result: Result<Section, _> = serde_json::from_value(json!({
            "id": "x",
            "kind": "publications",
            "content": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_typed_content_matches_kind() {
        let section = Section {
            id: "skills".into(),
            kind: SectionKind::Skills,
            content: json!({ "groups": [{ "category": "Languages", "items": ["Rust"] }] }),
        };
        match section.typed_content().unwrap() {
            SectionContent::Skills(skills) => assert_eq!(skills.groups[0].items, vec!["Rust"]),
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[test]
    fn test_typed_content_shape_mismatch() {
        let section = Section {
            id: "summary".into(),
            kind: SectionKind::Summary,
            content: json!({ "groups": [] }),
        };
        assert!(section.typed_content().is_err());
    }

    #[test]
    fn test_layout_defaults_when_fields_missing() {
        let layout: Layout = serde_json::from_value(json!({})).unwrap();
        assert!(layout.order.is_empty());
        assert!(layout.disabled.is_empty());
    }
}
