//! Object key layout: `<key_prefix>/<job_prefix>/<job_id>/<artifact>`.

use crate::models::job::CompileTask;

pub const SOURCE_ARTIFACT: &str = "resume.tex";
pub const ASSETS_ARTIFACT: &str = "assets.zip";
pub const OUTPUT_ARTIFACT: &str = "resume.pdf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    key_prefix: String,
    job_prefix: String,
}

impl KeyLayout {
    pub fn new(key_prefix: &str, job_prefix: &str) -> Self {
        Self {
            key_prefix: key_prefix.trim_matches('/').to_string(),
            job_prefix: job_prefix.trim_matches('/').to_string(),
        }
    }

    /// Prefix shared by every artifact of one job, with a trailing slash.
    pub fn job_root(&self, job_id: &str) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        if !self.key_prefix.is_empty() {
            parts.push(&self.key_prefix);
        }
        if !self.job_prefix.is_empty() {
            parts.push(&self.job_prefix);
        }
        parts.push(job_id);
        format!("{}/", parts.join("/"))
    }

    pub fn artifact(&self, job_id: &str, name: &str) -> String {
        format!("{}{name}", self.job_root(job_id))
    }

    /// The queue message for a job: staged inputs plus the output key.
    pub fn compile_task(&self, job_id: &str) -> CompileTask {
        CompileTask {
            job_id: job_id.to_string(),
            latex_object_key: self.artifact(job_id, SOURCE_ARTIFACT),
            assets_object_key: self.artifact(job_id, ASSETS_ARTIFACT),
            output_filename: self.artifact(job_id, OUTPUT_ARTIFACT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced_per_job() {
        let layout = KeyLayout::new("resumes/", "/resume-jobs/");
        assert_eq!(
            layout.artifact("abc", SOURCE_ARTIFACT),
            "resumes/resume-jobs/abc/resume.tex"
        );
        assert_eq!(layout.job_root("abc"), "resumes/resume-jobs/abc/");
    }

    #[test]
    fn test_empty_prefixes_are_skipped() {
        let layout = KeyLayout::new("", "");
        assert_eq!(layout.artifact("abc", OUTPUT_ARTIFACT), "abc/resume.pdf");
    }

    #[test]
    fn test_compile_task_uses_all_three_artifacts() {
        let task = KeyLayout::new("r", "j").compile_task("id1");
        assert_eq!(task.job_id, "id1");
        assert_eq!(task.latex_object_key, "r/j/id1/resume.tex");
        assert_eq!(task.assets_object_key, "r/j/id1/assets.zip");
        assert_eq!(task.output_filename, "r/j/id1/resume.pdf");
    }
}
