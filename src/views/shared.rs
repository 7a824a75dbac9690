use crate::types::ExtractedRecord;
use comrak::plugins::syntect::SyntectAdapter;
use comrak::{ComrakOptions, ComrakPlugins, markdown_to_html_with_plugins};
use once_cell::sync::Lazy;
use std::path::Path;

static MARKDOWN_OPTIONS: Lazy<ComrakOptions> = Lazy::new(|| {
    let mut options = ComrakOptions::default();
    options.extension.table = true;
    options.extension.strikethrough = true;
    options.extension.tasklist = true;
    options.extension.autolink = true;
    options
});

pub fn markdown_to_html(md: &str) -> String {
    let adapter = SyntectAdapter::new(Some("base16-ocean.dark"));
    let mut plugins = ComrakPlugins::default();
    plugins.render.codefence_syntax_highlighter = Some(&adapter);
    markdown_to_html_with_plugins(md, &MARKDOWN_OPTIONS, &plugins)
}

pub fn display_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|stem| stem.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Labelled values of a person card, skipping fields that are null or empty.
pub fn display_fields(record: &ExtractedRecord) -> Vec<(&'static str, String)> {
    let names = |value: &Option<Vec<String>>| value.as_ref().map(|names| names.join(", "));
    [
        ("Full Name", record.full_name.clone()),
        ("Date of Birth", record.birth_date.clone()),
        ("Date of Baptism", record.baptism_date.clone()),
        ("Father's Name", record.father_name.clone()),
        ("Mother's Name", record.mother_name.clone()),
        ("Paternal Grandparents", names(&record.paternal_grandparents)),
        ("Maternal Grandparents", names(&record.maternal_grandparents)),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.filter(|v| !v.is_empty()).map(|v| (label, v)))
    .collect()
}

/// Card heading: the person's name, or their position when it is unknown.
pub fn person_title(record: &ExtractedRecord, index: usize) -> String {
    record
        .full_name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("Person {}", index + 1))
}
