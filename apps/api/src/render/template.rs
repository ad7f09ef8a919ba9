//! Document template and static asset catalog.
//!
//! The main template is plain LaTeX with `((( name )))` placeholders. It is
//! read once from the template directory along with the list of files that
//! may be referenced as assets (class file, fonts, photos).

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::RenderError;

pub const MAIN_TEMPLATE: &str = "resume_main.tex";
pub const DOCUMENT_CLASS: &str = "vellum-cv.cls";

const OPEN: &str = "(((";
const CLOSE: &str = ")))";

/// Loaded template source plus the set of asset paths available on disk.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    root: PathBuf,
    main: String,
    assets: BTreeSet<String>,
}

impl TemplateSet {
    /// Reads the main template and indexes every other file under `root`.
    pub fn load(root: &Path) -> Result<Self, RenderError> {
        let main_path = root.join(MAIN_TEMPLATE);
        let main = fs::read_to_string(&main_path).map_err(|e| {
            RenderError::Template(format!("cannot read template {MAIN_TEMPLATE}: {e}"))
        })?;

        let mut assets = BTreeSet::new();
        collect_assets(root, root, &mut assets)
            .map_err(|e| RenderError::Template(format!("cannot index template assets: {e}")))?;
        assets.remove(MAIN_TEMPLATE);

        Ok(Self::from_parts(root.to_path_buf(), main, assets))
    }

    pub fn from_parts(root: PathBuf, main: String, assets: BTreeSet<String>) -> Self {
        Self { root, main, assets }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn has_asset(&self, path: &str) -> bool {
        self.assets.contains(path)
    }

    /// Fills every placeholder in the main template. A placeholder with no
    /// value, or an unterminated one, is a template error.
    pub fn fill(&self, values: &BTreeMap<&str, String>) -> Result<String, RenderError> {
        let mut out = String::with_capacity(self.main.len() + 4096);
        let mut rest = self.main.as_str();

        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + OPEN.len()..];
            let end = after_open.find(CLOSE).ok_or_else(|| {
                RenderError::Template("unterminated placeholder in main template".to_string())
            })?;
            let name = after_open[..end].trim();
            let value = values.get(name).ok_or_else(|| {
                RenderError::Template(format!("unresolved template reference '{name}'"))
            })?;
            out.push_str(value);
            rest = &after_open[end + CLOSE.len()..];
        }
        out.push_str(rest);

        Ok(out)
    }
}

fn collect_assets(root: &Path, dir: &Path, out: &mut BTreeSet<String>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_assets(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.insert(key);
        }
    }
    Ok(())
}
