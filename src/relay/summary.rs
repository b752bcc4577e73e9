use crate::models::{AcquisitionMethod, SubmissionSummary};

/// Escape the characters legacy Telegram Markdown treats as markup.
pub fn escape_md(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Render the inspection summary as one Markdown message.
pub fn build_summary_message(summary: &SubmissionSummary) -> String {
    let mut lines: Vec<String> = Vec::new();
    let method = summary.acquisition_method();
    let method_suffix = if method == AcquisitionMethod::None {
        String::new()
    } else {
        format!(" ({})", method.as_str())
    };

    lines.push("*🚚 PTI — Pre-Trip Inspection*".to_string());
    lines.push(format!(
        "*Driver:* {} {}",
        escape_md(&summary.driver.first_name),
        escape_md(&summary.driver.last_name)
    ));
    lines.push(format!(
        "*Unit:* `{}` / `{}`",
        escape_md(&summary.unit.truck),
        escape_md(&summary.unit.trailer)
    ));
    lines.push(format!(
        "*Time:* {} `({})`",
        escape_md(&summary.time.human),
        summary.time.tz
    ));

    if let Some(location) = &summary.location {
        if let Some((lat, lon)) = location.coordinates() {
            let accuracy = location
                .accuracy
                .map(|a| format!(" ±{}m", a.round() as i64))
                .unwrap_or_default();
            lines.push(format!(
                "*Location:* [Map](https://maps.google.com/?q={},{}) `{:.5}, {:.5}{}`{}",
                lat, lon, lat, lon, accuracy, method_suffix
            ));
        } else if let Some(text) = location.text.as_deref().filter(|t| !t.trim().is_empty()) {
            lines.push(format!("*Location:* {}{}", escape_md(text), method_suffix));
        }
    }

    if let Some(comment) = summary.comment.as_deref().filter(|c| !c.trim().is_empty()) {
        lines.push("*Comment:*".to_string());
        lines.push(format!("> {}", escape_md(comment.trim())));
    }

    if let Some(tally) = summary.photos {
        lines.push(format!(
            "*Photos:* {} files in {} album(s) (10 per album).",
            tally.files, tally.albums
        ));
    }

    lines.push("——".to_string());
    lines.push("_Generated by PTI form_".to_string());
    lines.join("\n")
}
