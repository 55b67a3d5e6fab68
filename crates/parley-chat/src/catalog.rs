//! Response catalog: the canned replies the matcher chooses from.
//!
//! A catalog is a fixed set of named categories, each an ordered list of
//! templates. It is loaded once, validated, and never mutated afterwards.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use parley_core::error::{ParleyError, Result};

/// The catalog shipped with the crate.
const BUNDLED_CATALOG: &str = include_str!("../data/responses.json");

// =============================================================================
// Category
// =============================================================================

/// Named group of templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Greetings,
    Services,
    Philosophy,
    VibrantCapital,
    Technology,
    Pricing,
    GettingStarted,
    Industries,
    Fallback,
}

impl Category {
    /// Categories taking part in keyword scoring, in scoring order.
    /// `Fallback` is deliberately absent.
    pub const SCORED: [Category; 8] = [
        Category::Greetings,
        Category::Services,
        Category::Philosophy,
        Category::VibrantCapital,
        Category::Technology,
        Category::Pricing,
        Category::GettingStarted,
        Category::Industries,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Greetings => "greetings",
            Category::Services => "services",
            Category::Philosophy => "philosophy",
            Category::VibrantCapital => "vibrant_capital",
            Category::Technology => "technology",
            Category::Pricing => "pricing",
            Category::GettingStarted => "getting_started",
            Category::Industries => "industries",
            Category::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// ResponseTemplate
// =============================================================================

/// A canned reply with its trigger keywords and follow-up chips.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTemplate {
    /// Reply text. Named `response` in catalog documents.
    #[serde(rename = "response")]
    pub reply_text: String,
    /// Trigger keywords, compared case-insensitively.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Quick-reply chips offered after this reply.
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ResponseTemplate {
    pub fn new(reply_text: impl Into<String>, keywords: &[&str], suggestions: &[&str]) -> Self {
        Self {
            reply_text: reply_text.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// =============================================================================
// ResponseCatalog
// =============================================================================

/// The full set of templates, grouped by category.
///
/// Missing categories deserialize as empty; [`ResponseCatalog::validate`]
/// decides whether the result is usable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseCatalog {
    pub greetings: Vec<ResponseTemplate>,
    pub services: Vec<ResponseTemplate>,
    pub philosophy: Vec<ResponseTemplate>,
    pub vibrant_capital: Vec<ResponseTemplate>,
    pub technology: Vec<ResponseTemplate>,
    pub pricing: Vec<ResponseTemplate>,
    pub getting_started: Vec<ResponseTemplate>,
    pub industries: Vec<ResponseTemplate>,
    pub fallback: Vec<ResponseTemplate>,
}

impl ResponseCatalog {
    /// The catalog bundled with the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_CATALOG)
    }

    /// Parse and validate a JSON catalog document.
    pub fn from_json(content: &str) -> Result<Self> {
        let catalog: ResponseCatalog = serde_json::from_str(content)
            .map_err(|e| ParleyError::Catalog(format!("invalid JSON catalog: {}", e)))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse and validate a TOML catalog document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let catalog: ResponseCatalog = toml::from_str(content)
            .map_err(|e| ParleyError::Catalog(format!("invalid TOML catalog: {}", e)))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load an alternate catalog from disk. The format follows the file
    /// extension: `.toml` is TOML, anything else is treated as JSON.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::from_toml(&content)?,
            _ => Self::from_json(&content)?,
        };
        info!(
            path = %path.display(),
            templates = catalog.len(),
            "Response catalog loaded"
        );
        Ok(catalog)
    }

    /// Templates of one category.
    pub fn templates(&self, category: Category) -> &[ResponseTemplate] {
        match category {
            Category::Greetings => &self.greetings,
            Category::Services => &self.services,
            Category::Philosophy => &self.philosophy,
            Category::VibrantCapital => &self.vibrant_capital,
            Category::Technology => &self.technology,
            Category::Pricing => &self.pricing,
            Category::GettingStarted => &self.getting_started,
            Category::Industries => &self.industries,
            Category::Fallback => &self.fallback,
        }
    }

    /// Every template that takes part in scoring, in scoring order.
    pub fn scored_templates(&self) -> impl Iterator<Item = (Category, &ResponseTemplate)> + '_ {
        Category::SCORED
            .into_iter()
            .flat_map(move |c| self.templates(c).iter().map(move |t| (c, t)))
    }

    /// Total number of templates, fallback included.
    pub fn len(&self) -> usize {
        Category::SCORED
            .iter()
            .map(|c| self.templates(*c).len())
            .sum::<usize>()
            + self.fallback.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject catalogs the matcher or the session could not work with.
    ///
    /// - `fallback` must be non-empty (it is the guaranteed-match path).
    /// - `greetings` must be non-empty (a fresh conversation is seeded from it).
    /// - No keyword may be blank: it would match every input.
    /// - No reply text may be blank.
    pub fn validate(&self) -> Result<()> {
        if self.fallback.is_empty() {
            return Err(ParleyError::Catalog(
                "the fallback category must contain at least one template".to_string(),
            ));
        }
        if self.greetings.is_empty() {
            return Err(ParleyError::Catalog(
                "the greetings category must contain at least one template".to_string(),
            ));
        }

        for category in Category::SCORED.into_iter().chain([Category::Fallback]) {
            for (idx, template) in self.templates(category).iter().enumerate() {
                if template.reply_text.trim().is_empty() {
                    return Err(ParleyError::Catalog(format!(
                        "{}[{}] has an empty response",
                        category, idx
                    )));
                }
                if template.keywords.iter().any(|k| k.trim().is_empty()) {
                    return Err(ParleyError::Catalog(format!(
                        "{}[{}] has a blank keyword",
                        category, idx
                    )));
                }
            }
        }
        Ok(())
    }
}
