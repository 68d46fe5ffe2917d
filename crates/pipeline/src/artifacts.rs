//! Result artifact naming.
//!
//! Generated results are registered as assets named
//! `<project>_<step>_<YYYYMMDD_HHMMSS>.<ext>` so downloads sort and
//! read sensibly. Project names keep their Unicode; only path
//! separators and control characters are replaced.

use serde_json::Value;

use modella_core::step::{MediaType, StepKind};
use modella_core::types::Timestamp;

/// Maximum length of the sanitized project-name component.
const MAX_NAME_COMPONENT: usize = 120;

/// Characters never allowed in a download filename.
const FORBIDDEN: &[char] = &[
    '\\', '/', ':', '*', '?', '"', '<', '>', '|', '\r', '\n', '\t',
];

/// Sanitize a project name for use in a filename.
pub fn safe_name_component(value: &str) -> String {
    let replaced: String = value
        .trim()
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_NAME_COMPONENT).collect()
}

/// Guess the result file extension (with leading dot).
///
/// Tries the result URL's path first, then the first output item's
/// `outputType`, then a per-step default.
pub fn guess_extension(result_url: Option<&str>, step: StepKind, outputs: &[Value]) -> String {
    if let Some(url) = result_url {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let name = path.rsplit('/').next().unwrap_or(path);
        if let Some(idx) = name.rfind('.') {
            if idx + 1 < name.len() {
                return name[idx..].to_ascii_lowercase();
            }
        }
    }

    if let Some(output_type) = outputs
        .first()
        .and_then(|item| item.get("outputType"))
        .and_then(Value::as_str)
    {
        let ext = output_type.to_ascii_lowercase();
        return if ext.starts_with('.') { ext } else { format!(".{ext}") };
    }

    match step.output_type() {
        MediaType::Video => ".mp4",
        MediaType::Image => ".png",
    }
    .to_owned()
}

/// Mime type for a guessed extension.
pub fn mime_from_extension(ext: &str) -> &'static str {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// Display name for a generated result asset.
pub fn result_display_name(
    project_name: &str,
    step: StepKind,
    ext: &str,
    now: Timestamp,
) -> String {
    format!(
        "{}_{}_{}{}",
        safe_name_component(project_name),
        step.as_str(),
        now.format("%Y%m%d_%H%M%S"),
        ext,
    )
}
