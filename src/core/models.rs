//! Built-in model catalog
//!
//! The catalog is embedded at build time from `builtin_models.toml` and never
//! changes at runtime. Lookups of ids that are no longer listed (for example
//! from an old persisted session) resolve to the catalog default.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL_ID: &str = "gemini-flash-latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Provider {
    Gemini,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speed {
    Fast,
    Average,
    Slow,
    Varies,
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Speed::Fast => "Fast",
            Speed::Average => "Average",
            Speed::Slow => "Slow",
            Speed::Varies => "Varies",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    pub vision: bool,
    /// Context window bound in tokens.
    pub context: u64,
    pub speed: Speed,
}

impl ModelDescriptor {
    /// Multi-line capability summary shown next to the model picker.
    pub fn summary(&self) -> String {
        format!(
            "{}\nProvider: {}\nContext: {} tokens\nSpeed: {}\nVision Support: {}",
            self.name,
            self.provider,
            group_thousands(self.context),
            self.speed,
            if self.vision { "Yes" } else { "No" }
        )
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    default: String,
    models: Vec<ModelDescriptor>,
}

#[derive(Debug)]
pub struct ModelCatalog {
    default_id: String,
    models: Vec<ModelDescriptor>,
}

static BUILTIN: LazyLock<ModelCatalog> = LazyLock::new(|| {
    const CATALOG_CONTENT: &str = include_str!("../builtin_models.toml");
    ModelCatalog::from_toml(CATALOG_CONTENT).expect("Failed to parse builtin_models.toml")
});

impl ModelCatalog {
    /// The catalog shipped with the binary.
    pub fn builtin() -> &'static ModelCatalog {
        &BUILTIN
    }

    pub fn from_toml(contents: &str) -> Result<Self, String> {
        let file: CatalogFile = toml::from_str(contents).map_err(|err| err.to_string())?;
        if !file.models.iter().any(|model| model.id == file.default) {
            return Err(format!(
                "default model '{}' is not listed in the catalog",
                file.default
            ));
        }
        Ok(Self {
            default_id: file.default,
            models: file.models,
        })
    }

    pub fn all(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn default_model(&self) -> &ModelDescriptor {
        // from_toml guarantees the default is listed.
        self.find(&self.default_id).unwrap_or(&self.models[0])
    }

    pub fn find(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|model| model.id == id)
    }

    /// Descriptor for `id`, or the default descriptor when `id` is unknown.
    pub fn resolve(&self, id: &str) -> &ModelDescriptor {
        self.find(id).unwrap_or_else(|| self.default_model())
    }

    /// Models grouped by provider, preserving catalog order inside a group.
    pub fn by_provider(&self) -> BTreeMap<Provider, Vec<&ModelDescriptor>> {
        let mut groups: BTreeMap<Provider, Vec<&ModelDescriptor>> = BTreeMap::new();
        for model in &self.models {
            groups.entry(model.provider).or_default().push(model);
        }
        groups
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
