use std::collections::HashMap;
use std::fmt::{self, Write};

use serde_json::Value;

use crate::booking::{default_raw, FieldKind, FieldSpec, FormColumn, FIELDS, MONTH_NAMES};
use crate::predictor::{CancellationLabel, PredictionOutcome};

const TITLE: &str = "Hotel Booking Cancellation Prediction";

const STYLE: &str = "
body { font-family: sans-serif; max-width: 960px; margin: 2rem auto; padding: 0 1rem; }
.columns { display: flex; gap: 2rem; }
.column { flex: 1; }
label { display: block; margin-top: 0.75rem; font-weight: 600; }
input, select { width: 100%; padding: 0.3rem; }
button { margin-top: 1.5rem; padding: 0.5rem 1rem; }
.banner { margin-top: 1.5rem; padding: 0.75rem 1rem; border-radius: 4px; }
.error { background: #fde2e1; color: #8a1c14; }
.success { background: #def5e3; color: #1b5e2b; }
.warning { background: #fff4d6; color: #7a5600; }
";

/// What to show under the form after a submission.
#[derive(Debug)]
pub enum Banner {
    Outcome(PredictionOutcome),
    Invalid(String),
    Unavailable,
}

/// Form values as the browser sends them back.
pub type FormValues = HashMap<String, String>;

pub fn default_values() -> FormValues {
    default_raw()
        .into_iter()
        .map(|(name, value)| {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (name, text)
        })
        .collect()
}

pub fn render(values: &FormValues, banner: Option<&Banner>) -> String {
    let mut html = String::new();
    // Writing into a String cannot fail.
    let _ = write_page(&mut html, values, banner);
    html
}

fn write_page(html: &mut String, values: &FormValues, banner: Option<&Banner>) -> fmt::Result {
    write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{TITLE}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <h1>🏨 {TITLE}</h1>\n<p>Enter the booking details below to predict whether the \
         booking is likely to be <strong>canceled</strong>.</p>\n\
         <form method=\"post\" action=\"/\">\n<div class=\"columns\">\n"
    )?;
    for column in [FormColumn::Left, FormColumn::Right] {
        html.push_str("<div class=\"column\">\n");
        for spec in FIELDS.iter().filter(|spec| spec.column == column) {
            let value = values.get(spec.name).map_or("", String::as_str);
            write_field(html, spec, value)?;
        }
        html.push_str("</div>\n");
    }
    html.push_str(
        "</div>\n<button type=\"submit\">🔮 Predict Cancellation</button>\n</form>\n",
    );
    if let Some(banner) = banner {
        write_banner(html, banner)?;
    }
    html.push_str("</body>\n</html>\n");
    Ok(())
}

fn write_field(html: &mut String, spec: &FieldSpec, value: &str) -> fmt::Result {
    writeln!(
        html,
        "<label for=\"{name}\">{label}</label>",
        name = spec.name,
        label = escape(spec.label)
    )?;
    match spec.kind {
        FieldKind::Integer { min, max, .. } => writeln!(
            html,
            "<input type=\"number\" id=\"{name}\" name=\"{name}\" min=\"{min}\" max=\"{max}\" \
             step=\"1\" value=\"{value}\" required>",
            name = spec.name,
            value = escape(value)
        ),
        FieldKind::Decimal { min, max, .. } => writeln!(
            html,
            "<input type=\"number\" id=\"{name}\" name=\"{name}\" min=\"{min:.2}\" max=\"{max:.2}\" \
             step=\"0.01\" value=\"{value}\" required>",
            name = spec.name,
            value = escape(value)
        ),
        FieldKind::Flag => write_select(
            html,
            spec.name,
            value,
            ["0", "1"].iter().map(|v| (v.to_string(), v.to_string())),
        ),
        FieldKind::Month => write_select(
            html,
            spec.name,
            value,
            MONTH_NAMES
                .iter()
                .enumerate()
                .map(|(i, month)| ((i + 1).to_string(), month.to_string())),
        ),
        FieldKind::Choice { options } => write_select(
            html,
            spec.name,
            value,
            options.iter().map(|v| (v.to_string(), v.to_string())),
        ),
    }
}

fn write_select(
    html: &mut String,
    name: &str,
    selected: &str,
    options: impl Iterator<Item = (String, String)>,
) -> fmt::Result {
    writeln!(html, "<select id=\"{name}\" name=\"{name}\">")?;
    for (value, text) in options {
        let marker = if value == selected { " selected" } else { "" };
        writeln!(
            html,
            "<option value=\"{}\"{marker}>{}</option>",
            escape(&value),
            escape(&text)
        )?;
    }
    writeln!(html, "</select>")
}

fn write_banner(html: &mut String, banner: &Banner) -> fmt::Result {
    match banner {
        Banner::Outcome(outcome) => {
            let (class, icon) = match outcome.label {
                CancellationLabel::Canceled => ("error", "❌"),
                CancellationLabel::NotCanceled => ("success", "✅"),
            };
            writeln!(
                html,
                "<div class=\"banner {class}\">{icon} {}</div>",
                outcome.message()
            )
        }
        Banner::Invalid(reason) => writeln!(
            html,
            "<div class=\"banner warning\">Prediction unavailable: {}</div>",
            escape(reason)
        ),
        Banner::Unavailable => writeln!(
            html,
            "<div class=\"banner warning\">Prediction unavailable. Please try again later.</div>"
        ),
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
