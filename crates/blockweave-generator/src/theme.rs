//! Theme synthesis.
//!
//! A theme is a fixed set of CSS custom properties. The content service picks
//! values for every one of them; replies that omit a variable are retried and
//! unknown variables are discarded.

use std::collections::BTreeMap;

use blockweave_core::Usage;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gateway::{CompletionRequest, ContentGateway, Purpose, extract_json_object};

/// Theme variables with a short hint and the built-in default.
pub const THEME_VARIABLES: &[(&str, &str, &str)] = &[
    ("--color-primary", "primary brand color, hex", "#3b82f6"),
    ("--color-secondary", "secondary color, hex", "#64748b"),
    ("--color-accent", "accent color for highlights, hex", "#f97316"),
    ("--color-background", "page background, hex", "#ffffff"),
    ("--color-text", "body text color, hex", "#1e293b"),
    ("--font-heading", "heading font stack", "'Inter', sans-serif"),
    ("--font-body", "body font stack", "'Inter', sans-serif"),
    ("--radius-md", "medium border radius", "8px"),
    ("--shadow-md", "medium box shadow", "0 4px 12px rgba(0, 0, 0, 0.1)"),
    ("--line-height-normal", "body line height", "1.6"),
];

/// Theme errors.
#[derive(Debug, Error)]
pub enum ThemeError {
    /// Every attempt failed.
    #[error("theme generation failed after {attempts} attempt(s): {message}")]
    Exhausted {
        attempts: usize,
        message: String,
        /// Usage spent on the failed attempts.
        usage: Usage,
    },
}

/// Result type for theme operations.
pub type Result<T> = std::result::Result<T, ThemeError>;

/// A synthesized theme.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub values: BTreeMap<String, String>,
    pub usage: Usage,
}

/// The built-in theme.
#[must_use]
pub fn default_theme() -> BTreeMap<String, String> {
    THEME_VARIABLES
        .iter()
        .map(|(name, _, value)| ((*name).to_string(), (*value).to_string()))
        .collect()
}

/// Template style variables overlaid with the theme. Theme values win.
#[must_use]
pub fn merge_theme(
    template_css: &BTreeMap<String, String>,
    theme: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = template_css.clone();
    merged.extend(theme.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Synthesizes themes through a content gateway.
pub struct ThemeSynthesizer<'a> {
    gateway: &'a dyn ContentGateway,
    attempts: usize,
}

impl<'a> ThemeSynthesizer<'a> {
    #[must_use]
    pub fn new(gateway: &'a dyn ContentGateway) -> Self {
        Self {
            gateway,
            attempts: 1,
        }
    }

    /// Number of attempts before giving up. At least one.
    #[must_use]
    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub async fn synthesize(&self, prompt: &str) -> Result<Theme> {
        let request = CompletionRequest {
            purpose: Purpose::Theme,
            system: system_prompt(prompt),
            user: prompt.to_string(),
        };

        let mut usage = Usage::default();
        let mut message = String::new();

        for attempt in 1..=self.attempts {
            let reply = match self.gateway.complete(&request).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(attempt, error = %e, "theme request failed");
                    message = e.to_string();
                    continue;
                }
            };
            usage += reply.usage;

            match parse_theme(&reply.text) {
                Ok(values) => {
                    info!(attempt, variables = values.len(), "theme synthesized");
                    return Ok(Theme { values, usage });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "theme reply rejected");
                    message = e;
                }
            }
        }

        Err(ThemeError::Exhausted {
            attempts: self.attempts,
            message,
            usage,
        })
    }
}

fn system_prompt(prompt: &str) -> String {
    let variables: Vec<String> = THEME_VARIABLES
        .iter()
        .map(|(name, hint, _)| format!("- {name}: {hint}"))
        .collect();

    format!(
        "You are a web designer. Create a CSS theme.\n\n\
         Website description: {prompt}\n\n\
         CSS variables to generate:\n{}\n\n\
         Return a JSON object with every variable above and its CSS value. \
         Do not invent new variables and do not omit any. Return only JSON.",
        variables.join("\n")
    )
}

/// Keep whitelisted variables; fail if any is missing or empty.
fn parse_theme(text: &str) -> std::result::Result<BTreeMap<String, String>, String> {
    let reply = extract_json_object(text).map_err(|e| e.to_string())?;

    let mut values = BTreeMap::new();
    for (name, _, _) in THEME_VARIABLES {
        let value = match reply.get(*name) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(format!("missing theme variable {name}")),
        };
        values.insert((*name).to_string(), value);
    }

    let extra = reply.len().saturating_sub(values.len());
    if extra > 0 {
        debug!(extra, "discarded non-whitelisted theme variables");
    }

    Ok(values)
}
