//! Per-kind section renderers. Each returns the LaTeX block for one section
//! and records any static assets the block references.

use std::collections::BTreeSet;

use crate::models::record::{
    EntriesContent, HeaderContent, RawContent, SectionContent, SkillsContent, SummaryContent,
};

use super::escape::{escape_tex, inline_markup};

/// Renders decoded content. Exhaustive over every section kind.
pub fn render_section(
    section_id: &str,
    content: &SectionContent,
    assets: &mut BTreeSet<String>,
) -> String {
    match content {
        SectionContent::Header(header) => render_header(header, assets),
        SectionContent::Summary(summary) => render_summary(section_id, summary),
        SectionContent::Skills(skills) => render_skills(section_id, skills),
        SectionContent::Entries(entries) => render_entries(section_id, entries),
        SectionContent::RawCustom(raw) => render_raw(section_id, raw),
    }
}

/// Title fallback: `work_history` → `Work History`.
fn section_title(explicit: Option<&str>, section_id: &str) -> String {
    if let Some(title) = explicit.filter(|t| !t.trim().is_empty()) {
        return title.to_string();
    }
    section_id
        .split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                None => String::new(),
                Some(f) => f.to_uppercase().to_string() + c.as_str(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_header(header: &HeaderContent, assets: &mut BTreeSet<String>) -> String {
    let mut out = String::new();

    if let Some(photo) = header.photo.as_deref().filter(|p| !p.is_empty()) {
        assets.insert(photo.to_string());
        out.push_str(&format!("\\cvphoto{{{photo}}}\n"));
    }

    out.push_str(&format!(
        "\\cvheader{{{}}}{{{}}}{{{}}}\n",
        escape_tex(&header.first_name),
        escape_tex(header.last_name.as_deref().unwrap_or("")),
        escape_tex(header.position.as_deref().unwrap_or("")),
    ));

    let contacts: Vec<String> = [
        &header.address,
        &header.mobile,
        &header.email,
        &header.github,
        &header.linkedin,
    ]
    .into_iter()
    .filter_map(|field| field.as_deref())
    .filter(|value| !value.trim().is_empty())
    .map(escape_tex)
    .collect();

    if !contacts.is_empty() {
        out.push_str(&format!("\\cvcontacts{{{}}}\n", contacts.join(" \\textbar{} ")));
    }
    out
}

fn render_summary(section_id: &str, summary: &SummaryContent) -> String {
    let mut lines = vec![
        format!(
            "\\cvsection{{{}}}",
            escape_tex(&section_title(summary.title.as_deref(), section_id))
        ),
        "\\begin{cvitems}".to_string(),
    ];
    for bullet in &summary.bullets {
        lines.push(format!("  \\item {{{}}}", inline_markup(bullet)));
    }
    lines.push("\\end{cvitems}".to_string());
    lines.join("\n") + "\n"
}

fn render_skills(section_id: &str, skills: &SkillsContent) -> String {
    let mut lines = vec![
        format!(
            "\\cvsection{{{}}}",
            escape_tex(&section_title(skills.title.as_deref(), section_id))
        ),
        "\\begin{cvskills}".to_string(),
    ];
    for group in &skills.groups {
        let items = group
            .items
            .iter()
            .map(|item| escape_tex(item))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!(
            "  \\cvskill\n    {{{}}}\n    {{{}}}",
            escape_tex(&group.category),
            items
        ));
    }
    lines.push("\\end{cvskills}".to_string());
    lines.join("\n") + "\n"
}

fn render_entries(section_id: &str, entries: &EntriesContent) -> String {
    let mut lines = vec![
        format!(
            "\\cvsection{{{}}}",
            escape_tex(&section_title(entries.title.as_deref(), section_id))
        ),
        "\\begin{cventries}".to_string(),
    ];
    for entry in &entries.entries {
        let items = if entry.bullets.is_empty() {
            String::new()
        } else {
            let mut block = vec!["      \\begin{cvitems}".to_string()];
            for bullet in &entry.bullets {
                block.push(format!("        \\item {{{}}}", inline_markup(bullet)));
            }
            block.push("      \\end{cvitems}".to_string());
            block.join("\n")
        };
        lines.push(format!(
            "  \\cventry\n    {{{}}}\n    {{{}}}\n    {{{}}}\n    {{{}}}\n    {{\n{}\n    }}",
            escape_tex(&entry.title),
            escape_tex(entry.organization.as_deref().unwrap_or("")),
            escape_tex(entry.location.as_deref().unwrap_or("")),
            escape_tex(entry.period.as_deref().unwrap_or("")),
            items
        ));
    }
    lines.push("\\end{cventries}".to_string());
    lines.join("\n") + "\n"
}

fn render_raw(section_id: &str, raw: &RawContent) -> String {
    format!(
        "\\cvsection{{{}}}\n{}\n",
        escape_tex(&section_title(raw.title.as_deref(), section_id)),
        inline_markup(&raw.content)
    )
}
