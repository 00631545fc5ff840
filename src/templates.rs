//! Meme template catalogue loaded from a bundled JSON file.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

/// A reusable meme image skeleton.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Template {
    /// Unique identifier, eg `drake`
    pub id: String,
    /// Display name
    pub name: String,
    /// Number of text lines the template expects
    pub lines: u32,
    /// Number of image overlays the template supports
    pub overlays: u32,
    /// Style tags, in catalogue order
    pub styles: Vec<String>,
    /// URL of the blank template image
    pub blank: String,
    /// Example payload, usually `{"text": [...], "url": ...}`
    pub example: Map<String, Value>,
    /// Where the meme came from, if known
    pub source: Option<String>,
    /// Matching keywords
    pub keywords: Vec<String>,
    /// Catalogue URL of this record
    pub self_url: String,
}

/// Errors returned when loading the template catalogue.
#[derive(Debug)]
pub enum TemplateError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The JSON payload could not be parsed.
    Parse(serde_json::Error),
    /// The top level value was not an array.
    NotAnArray,
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "Failed to read template file: {err}"),
            Self::Parse(err) => write!(f, "Failed to parse template JSON: {err}"),
            Self::NotAnArray => write!(f, "Template JSON must be an array of records"),
        }
    }
}

impl std::error::Error for TemplateError {}

fn str_field(item: &Map<String, Value>, key: &str) -> String {
    match item.get(key) {
        Some(Value::String(value)) => value.clone(),
        Some(Value::Number(value)) => value.to_string(),
        _ => String::new(),
    }
}

fn count_field(item: &Map<String, Value>, key: &str) -> u32 {
    match item.get(key) {
        Some(Value::Number(value)) => value
            .as_u64()
            .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0),
        Some(Value::String(value)) => value.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn list_field(item: &Map<String, Value>, key: &str) -> Vec<String> {
    item.get(key)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|value| value.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

impl Template {
    /// Builds a template from one catalogue record; missing or malformed fields
    /// fall back to empty values.
    pub fn from_value(value: &Value) -> Self {
        let empty = Map::new();
        let item = value.as_object().unwrap_or(&empty);
        Self {
            id: str_field(item, "id"),
            name: str_field(item, "name"),
            lines: count_field(item, "lines"),
            overlays: count_field(item, "overlays"),
            styles: list_field(item, "styles"),
            blank: str_field(item, "blank"),
            example: item
                .get("example")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            source: item
                .get("source")
                .and_then(Value::as_str)
                .map(str::to_string),
            keywords: list_field(item, "keywords"),
            self_url: str_field(item, "_self"),
        }
    }

    /// Example caption lines, if the record carries any.
    pub fn example_text(&self) -> Vec<String> {
        self.example
            .get("text")
            .and_then(Value::as_array)
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|line| line.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Read-only view over the loaded templates.
#[derive(Clone, Debug, Default)]
pub struct TemplateRepository {
    templates: Vec<Template>,
}

impl TemplateRepository {
    /// Wraps an already-built list of templates.
    pub fn new(templates: Vec<Template>) -> Self {
        Self { templates }
    }

    /// Loads the catalogue from disk; called once during startup.
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let raw = std::fs::read_to_string(path).map_err(TemplateError::Io)?;
        Self::from_json(&raw)
    }

    /// Parses a catalogue from its JSON text.
    pub fn from_json(raw: &str) -> Result<Self, TemplateError> {
        let parsed: Value = serde_json::from_str(raw).map_err(TemplateError::Parse)?;
        let Value::Array(items) = parsed else {
            return Err(TemplateError::NotAnArray);
        };
        Ok(Self::new(items.iter().map(Template::from_value).collect()))
    }

    /// Every record, duplicates included.
    pub fn all(&self) -> &[Template] {
        &self.templates
    }

    /// One record per id, keeping the first occurrence.
    pub fn all_unique(&self) -> Vec<Template> {
        let mut seen = HashSet::new();
        self.templates
            .iter()
            .filter(|template| seen.insert(template.id.as_str()))
            .cloned()
            .collect()
    }

    /// Number of records, duplicates included.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// True when nothing was loaded.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_template(id: &str, name: &str, keywords: &[&str]) -> Template {
    Template {
        id: id.to_string(),
        name: name.to_string(),
        lines: 2,
        overlays: 0,
        styles: Vec::new(),
        blank: format!("https://api.memegen.link/images/{id}.png"),
        example: Map::new(),
        source: None,
        keywords: keywords.iter().map(|kw| kw.to_string()).collect(),
        self_url: format!("https://api.memegen.link/templates/{id}"),
    }
}
