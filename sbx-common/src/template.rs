// sbx-common/src/template.rs
//! String-template substitution for catalog URL, filename and archive-name
//! fields. Templates use `{{VERSION}}`, `{{OS}}` and `{{ARCH}}` placeholders;
//! every other variable, and any unclosed placeholder, is a hard error. All
//! path construction in the installers goes through [`render`] so a malformed
//! catalog entry can never produce a partially substituted path.

use crate::error::{Result, SbxError};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Substitution context applied to every templated catalog field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateData {
    pub version: String,
    pub os: String,
    pub arch: String,
}

impl TemplateData {
    fn lookup(&self, variable: &str) -> Option<&str> {
        match variable {
            "VERSION" => Some(&self.version),
            "OS" => Some(&self.os),
            "ARCH" => Some(&self.arch),
            _ => None,
        }
    }
}

/// Renders `template` with `data`, attributing failures to `software`.
pub fn render(template: &str, data: &TemplateData, software: &str) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let end = after_open.find(CLOSE).ok_or_else(|| SbxError::Template {
            software: software.to_string(),
            template: template.to_string(),
            reason: "missing closing delimiter '}}'".to_string(),
        })?;
        let variable = after_open[..end].trim();
        let value = data.lookup(variable).ok_or_else(|| SbxError::Template {
            software: software.to_string(),
            template: template.to_string(),
            reason: format!("unknown template variable '{variable}'"),
        })?;
        out.push_str(value);
        rest = &after_open[end + CLOSE.len()..];
    }
    out.push_str(rest);
    Ok(out)
}
