//! Ranks templates against a situation description.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::{Value, json};
use tracing::debug;

use crate::clients::{ChatClient, ChatMessage, ChatRequest};
use crate::constants::{DEFAULT_KEYWORD_WEIGHT, DEFAULT_MAX_CANDIDATES, DEFAULT_NAME_WEIGHT};
use crate::error::MemeError;
use crate::templates::{Template, TemplateRepository};

/// A template with its score for one situation.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateMatch {
    /// The candidate
    pub template: Template,
    /// Non-negative score, higher is better
    pub score: f64,
}

/// Highest score first; equal scores keep their input order.
fn sort_descending(matches: &mut [TemplateMatch]) {
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Scores candidates for a situation.
#[async_trait]
pub trait TemplateMatcher: Send + Sync {
    /// Returns candidates ranked best first.
    async fn rank(
        &self,
        situation: &str,
        candidates: &[Template],
    ) -> Result<Vec<TemplateMatch>, MemeError>;
}

/// Keyword and name substring scoring. Never filters, only ranks.
#[derive(Clone, Copy, Debug)]
pub struct SimpleTemplateMatcher {
    keyword_weight: f64,
    name_weight: f64,
}

impl Default for SimpleTemplateMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORD_WEIGHT, DEFAULT_NAME_WEIGHT)
    }
}

impl SimpleTemplateMatcher {
    /// Matcher with custom weights; negative weights are clamped to zero.
    pub fn new(keyword_weight: f64, name_weight: f64) -> Self {
        Self {
            keyword_weight: keyword_weight.max(0.0),
            name_weight: name_weight.max(0.0),
        }
    }

    fn score(&self, situation: &str, template: &Template) -> f64 {
        if situation.is_empty() {
            return 0.0;
        }
        let mut score = 0.0;
        for keyword in &template.keywords {
            if !keyword.is_empty() && situation.contains(&keyword.to_lowercase()) {
                score += self.keyword_weight;
            }
        }
        let name = template.name.to_lowercase();
        if name.split_whitespace().any(|part| situation.contains(part)) {
            score += self.name_weight;
        }
        score
    }

    /// Synchronous form of [`TemplateMatcher::rank`].
    pub fn rank_sync(&self, situation: &str, candidates: &[Template]) -> Vec<TemplateMatch> {
        let situation = situation.trim().to_lowercase();
        let mut matches: Vec<TemplateMatch> = candidates
            .iter()
            .map(|template| TemplateMatch {
                template: template.clone(),
                score: self.score(&situation, template),
            })
            .collect();
        sort_descending(&mut matches);
        matches
    }
}

#[async_trait]
impl TemplateMatcher for SimpleTemplateMatcher {
    async fn rank(
        &self,
        situation: &str,
        candidates: &[Template],
    ) -> Result<Vec<TemplateMatch>, MemeError> {
        Ok(self.rank_sync(situation, candidates))
    }
}

const RANKING_SYSTEM_PROMPT: &str = "You are a helpful meme template selection assistant. \
Respond ONLY with JSON when asked to return rankings.";

/// Delegates ranking to a text model.
///
/// Transport and parse failures are not retried here; the caller decides.
#[derive(Clone)]
pub struct ModelTemplateMatcher {
    client: Arc<dyn ChatClient>,
    model: String,
    max_candidates: usize,
}

impl ModelTemplateMatcher {
    /// Matcher using `model`; `max_candidates` of zero means no limit.
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>, max_candidates: usize) -> Self {
        Self {
            client,
            model: model.into(),
            max_candidates,
        }
    }

    /// Matcher with the default candidate limit.
    pub fn with_defaults(client: Arc<dyn ChatClient>, model: impl Into<String>) -> Self {
        Self::new(client, model, DEFAULT_MAX_CANDIDATES)
    }

    fn build_prompt(situation: &str, candidates: &[Template]) -> String {
        let mut shuffled: Vec<&Template> = candidates.iter().collect();
        shuffled.shuffle(&mut rand::rng());
        let compact: Vec<Value> = shuffled
            .iter()
            .map(|template| json!({"id": template.id, "name": template.name}))
            .collect();
        format!(
            "Given a situation description and a list of meme templates, rank the most suitable templates.\n\n\
Situation: {situation}\n\n\
Templates: {}\n\n\
Return ONLY JSON in this exact shape: [{{\"id\": \"<template_id>\", \"score\": <0..1>}}].\n\
Include up to 5 items.",
            Value::Array(compact)
        )
    }
}

fn ranking_items(parsed: Value) -> Option<Vec<Value>> {
    match parsed {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter(|item| item.get("id").is_some())
                .collect(),
        ),
        _ => None,
    }
}

/// Reads `[{"id": .., "score": ..}]` out of free text; anything unreadable is empty.
pub fn parse_rankings(text: &str) -> Vec<Value> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    if let Some(items) = serde_json::from_str(text).ok().and_then(ranking_items) {
        return items;
    }
    if let (Some(start), Some(end)) = (text.find('['), text.rfind(']'))
        && end > start
        && let Some(items) = serde_json::from_str(&text[start..=end])
            .ok()
            .and_then(ranking_items)
    {
        return items;
    }
    Vec::new()
}

fn ranking_id(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn ranking_score(item: &Value) -> f64 {
    let score = match item.get("score") {
        Some(Value::Number(score)) => score.as_f64().unwrap_or(0.0),
        Some(Value::String(score)) => score.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if score.is_finite() { score.max(0.0) } else { 0.0 }
}

#[async_trait]
impl TemplateMatcher for ModelTemplateMatcher {
    async fn rank(
        &self,
        situation: &str,
        candidates: &[Template],
    ) -> Result<Vec<TemplateMatch>, MemeError> {
        let candidates = if self.max_candidates > 0 && candidates.len() > self.max_candidates {
            &candidates[..self.max_candidates]
        } else {
            candidates
        };

        let messages = vec![
            ChatMessage::system(RANKING_SYSTEM_PROMPT),
            ChatMessage::user(Self::build_prompt(situation, candidates)),
        ];
        let request = ChatRequest::new(&self.model, messages)
            .with_temperature(0.8)
            .with_max_tokens(512);
        let content = self.client.chat(&request).await?;

        let by_id: HashMap<&str, &Template> = candidates
            .iter()
            .map(|template| (template.id.as_str(), template))
            .collect();
        let mut matches: Vec<TemplateMatch> = parse_rankings(&content)
            .iter()
            .filter_map(|item| {
                let id = ranking_id(item)?;
                let template = by_id.get(id.as_str())?;
                Some(TemplateMatch {
                    template: (*template).clone(),
                    score: ranking_score(item),
                })
            })
            .collect();
        debug!(
            "Ranking model returned {} usable matches from {} chars",
            matches.len(),
            content.len()
        );
        sort_descending(&mut matches);
        Ok(matches)
    }
}

/// Combines the repository with a matcher.
#[derive(Clone)]
pub struct TemplatePicker {
    repo: Arc<TemplateRepository>,
    matcher: Arc<dyn TemplateMatcher>,
}

impl TemplatePicker {
    /// Picker over `repo` ranked by `matcher`.
    pub fn new(repo: Arc<TemplateRepository>, matcher: Arc<dyn TemplateMatcher>) -> Self {
        Self { repo, matcher }
    }

    /// Picker using the keyword matcher.
    pub fn simple(repo: Arc<TemplateRepository>) -> Self {
        Self::new(repo, Arc::new(SimpleTemplateMatcher::default()))
    }

    /// The `k` best matches; negative `k` is treated as zero.
    pub async fn pick_top_k(
        &self,
        situation: &str,
        k: i64,
        unique_ids: bool,
    ) -> Result<Vec<TemplateMatch>, MemeError> {
        let candidates = if unique_ids {
            self.repo.all_unique()
        } else {
            self.repo.all().to_vec()
        };
        let mut ranked = self.matcher.rank(situation, &candidates).await?;
        ranked.truncate(usize::try_from(k).unwrap_or(0));
        Ok(ranked)
    }

    /// The single best match, or `None` when nothing ranked.
    pub async fn pick_best(
        &self,
        situation: &str,
        unique_ids: bool,
    ) -> Result<Option<TemplateMatch>, MemeError> {
        Ok(self
            .pick_top_k(situation, 1, unique_ids)
            .await?
            .into_iter()
            .next())
    }
}
