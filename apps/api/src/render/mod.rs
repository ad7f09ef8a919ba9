//! Template rendering — record + resolved layout → LaTeX source.
//!
//! Flow: resolved ids → decode each section against its kind →
//!       per-kind renderer → fill main template → (source, asset paths).
//!
//! Rendering is pure: the same record and layout always produce the same
//! bytes. The only I/O is reading the template directory at construction.

pub mod bundle;
pub mod escape;
pub mod sections;
pub mod template;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::warn;

use crate::layout::resolve_record;
use crate::models::record::{Record, SectionKind};

pub use template::TemplateSet;

#[derive(Debug, Error)]
pub enum RenderError {
    /// A section's content does not have the shape its kind requires.
    #[error("section '{section_id}' does not match kind '{kind}': {reason}")]
    ContentShape {
        section_id: String,
        kind: SectionKind,
        reason: String,
    },

    /// Missing static asset or unresolved template reference.
    #[error("template error: {0}")]
    Template(String),
}

/// Rendered LaTeX plus the template-relative assets it needs to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub source: String,
    pub assets: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    templates: TemplateSet,
}

impl Renderer {
    pub fn new(templates: TemplateSet) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// Resolves the record's own layout, then renders.
    pub fn render_record(&self, record: &Record) -> Result<RenderedDocument, RenderError> {
        let resolved = resolve_record(record);
        self.render(record, &resolved)
    }

    /// Renders the given sections, in order.
    pub fn render(
        &self,
        record: &Record,
        resolved_section_ids: &[String],
    ) -> Result<RenderedDocument, RenderError> {
        let mut assets = BTreeSet::from([template::DOCUMENT_CLASS.to_string()]);
        let mut blocks = Vec::with_capacity(resolved_section_ids.len());

        for id in resolved_section_ids {
            let Some(section) = record.section(id) else {
                warn!("Record '{}' has no section '{id}', skipping", record.name);
                continue;
            };
            let content = section
                .typed_content()
                .map_err(|e| RenderError::ContentShape {
                    section_id: section.id.clone(),
                    kind: section.kind,
                    reason: e.to_string(),
                })?;
            blocks.push(sections::render_section(&section.id, &content, &mut assets));
        }

        for asset in &assets {
            if !self.templates.has_asset(asset) {
                return Err(RenderError::Template(format!(
                    "missing static asset '{asset}'"
                )));
            }
        }

        let values = BTreeMap::from([
            ("record_name", escape::escape_tex(&record.name)),
            ("charmap_version", escape::CHARMAP_VERSION.to_string()),
            ("sections", blocks.join("\n")),
        ]);
        let source = self.templates.fill(&values)?;

        Ok(RenderedDocument { source, assets })
    }
}
