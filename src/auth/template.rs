//! Authorization URL template
//!
//! Deployments write the template with Go-style placeholders, e.g.
//! `http://control.shop/auth?badge={{.badge}}&action={{.state}}&minutes={{.duration}}`.
//! The template is parsed once at startup so an unusable template is a
//! configuration error rather than a failed scan.

use super::AuthAction;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Badge,
    State,
    Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// Parsed authorization URL template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    segments: Vec<Segment>,
}

impl UrlTemplate {
    /// Parse a template string
    pub fn parse(template: &str) -> Result<Self> {
        if template.trim().is_empty() {
            return Err(AppError::Config(
                "badge_auth.url_template must not be empty".to_string(),
            ));
        }

        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + 2..];
            let end = after_open.find("}}").ok_or_else(|| {
                AppError::Config(format!("unclosed placeholder in url_template: {}", template))
            })?;

            let name = after_open[..end].trim();
            let field = match name.strip_prefix('.') {
                Some("badge") => Field::Badge,
                Some("state") => Field::State,
                Some("duration") => Field::Duration,
                _ => {
                    return Err(AppError::Config(format!(
                        "unknown placeholder '{{{{{}}}}}' in url_template",
                        name
                    )))
                }
            };
            segments.push(Segment::Field(field));
            rest = &after_open[end + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Build the URL for one authorization call
    pub fn expand(&self, badge_id: &str, action: AuthAction, duration_minutes: u32) -> String {
        let mut url = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => url.push_str(text),
                Segment::Field(Field::Badge) => url.push_str(&urlencoding::encode(badge_id)),
                Segment::Field(Field::State) => url.push_str(action.as_str()),
                Segment::Field(Field::Duration) => url.push_str(&duration_minutes.to_string()),
            }
        }
        url
    }
}
