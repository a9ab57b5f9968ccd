use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::api::TextGenerator;
use crate::error::PipelineError;
use crate::util::{load_json, save_json};
use crate::{loge, logi, logok, logw};

const TITLE_TEMPLATES: &[&str] = &[
    "How to {trend} for {category}",
    "Why you should {trend} for {category}",
    "The secret to {trend} for {category}",
    "3 ways to {trend} for {category}",
    "I tried {trend} for {category}",
];

const DEFAULT_CATEGORIES: &[&str] = &[
    "Fitness", "Cooking", "Personal Finance", "Productivity", "Travel", "Tech",
];
const DEFAULT_AUDIENCES: &[&str] = &[
    "Gen Z (18-24)",
    "Millennials (25-40)",
    "Busy parents",
    "College students",
    "Small business owners",
];
const DEFAULT_TRENDS: &[&str] = &[
    "life-hack", "day in the life", "myth busting", "before and after", "quick tutorial",
];

/// Three-part narration text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub hook: String,
    pub body: String,
    pub cta: String,
}

impl Script {
    /// Hook, body and call-to-action joined with single spaces.
    pub fn full_text(&self) -> String {
        format!("{} {} {}", self.hook, self.body, self.cta)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("hook", &self.hook), ("body", &self.body), ("cta", &self.cta)] {
            if value.trim().is_empty() {
                anyhow::bail!("script {} is empty", name);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoIdea {
    pub title: String,
    pub category: String,
    pub target_audience: String,
    pub trend_type: String,
    pub script: Script,
    pub visual_elements: String,
    pub audio_suggestions: String,
    pub hashtags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
}

/// Selection pools for unset idea parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPools {
    pub categories: Vec<String>,
    pub audiences: Vec<String>,
    pub trends: Vec<String>,
}

impl Default for ContentPools {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            categories: owned(DEFAULT_CATEGORIES),
            audiences: owned(DEFAULT_AUDIENCES),
            trends: owned(DEFAULT_TRENDS),
        }
    }
}

impl ContentPools {
    /// Loads `categories/categories.json`, `categories/audiences.json` and
    /// `trends.json` under `data_dir`, falling back per pool to built-ins.
    pub async fn load(data_dir: &Path) -> Self {
        let defaults = ContentPools::default();
        Self {
            categories: load_pool(&data_dir.join("categories/categories.json"), defaults.categories)
                .await,
            audiences: load_pool(&data_dir.join("categories/audiences.json"), defaults.audiences)
                .await,
            trends: load_pool(&data_dir.join("trends.json"), defaults.trends).await,
        }
    }
}

async fn load_pool(path: &Path, fallback: Vec<String>) -> Vec<String> {
    match load_json::<Vec<String>>(path).await {
        Ok(items) if !items.is_empty() => items,
        Ok(_) => {
            logw(format!("{} is empty; using built-in pool", path.display()));
            fallback
        }
        Err(err) => {
            logw(format!("{:#}; using built-in pool", err));
            fallback
        }
    }
}

fn strip_code_fence(text: &str) -> Result<String> {
    static FENCE_RE: OnceCell<Regex> = OnceCell::new();
    let re = FENCE_RE.get_or_try_init(|| {
        Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").context("failed to compile fence regex")
    })?;
    let trimmed = text.trim();
    Ok(match re.captures(trimmed) {
        Some(cap) => cap[1].to_string(),
        None => trimmed.to_string(),
    })
}

/// Parses the model reply into a script; malformed JSON or missing keys fail.
pub fn parse_script(reply: &str) -> Result<Script> {
    let body = strip_code_fence(reply)?;
    serde_json::from_str::<Script>(&body).context("model reply is not a hook/body/cta JSON object")
}

fn hashtag_token(input: &str) -> String {
    input.chars().filter(|c| c.is_alphanumeric()).collect()
}

pub(crate) fn build_hashtags(category: &str, trend: &str, audience: &str) -> Vec<String> {
    let audience_head = audience.split_whitespace().next().unwrap_or("");
    vec![
        format!("#{}", hashtag_token(category)),
        format!("#{}", hashtag_token(trend)),
        "#TikTokTips".to_string(),
        format!("#{}", hashtag_token(audience_head)),
        "#viral".to_string(),
        "#trending".to_string(),
    ]
}

fn build_prompt(category: &str, audience: &str, trend: &str) -> String {
    format!(
        "Create a TikTok script with three sections:\n\
         1. A hook (max 15 words) about {trend} for {category} targeting {audience}\n\
         2. A body section (max 100 words) explaining 3 key points about {trend}\n\
         3. A call-to-action (max 20 words) encouraging engagement\n\n\
         Return STRICT JSON with exactly the keys: \"hook\", \"body\", \"cta\"\n"
    )
}

struct Selection {
    category: String,
    audience: String,
    trend: String,
    title: String,
}

pub struct IdeaGenerator {
    generator: Arc<dyn TextGenerator>,
    pools: ContentPools,
    rng: Mutex<StdRng>,
}

impl IdeaGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>, pools: ContentPools) -> Self {
        Self::with_rng(generator, pools, StdRng::from_entropy())
    }

    pub fn with_seed(generator: Arc<dyn TextGenerator>, pools: ContentPools, seed: u64) -> Self {
        Self::with_rng(generator, pools, StdRng::seed_from_u64(seed))
    }

    fn with_rng(generator: Arc<dyn TextGenerator>, pools: ContentPools, rng: StdRng) -> Self {
        Self {
            generator,
            pools,
            rng: Mutex::new(rng),
        }
    }

    fn select(
        &self,
        category: Option<&str>,
        audience: Option<&str>,
        trend: Option<&str>,
    ) -> Result<Selection, PipelineError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| PipelineError::Generation("idea rng poisoned".to_string()))?;

        let mut pick = |given: Option<&str>, pool: &[String], what: &str| {
            match given.filter(|s| !s.trim().is_empty()) {
                Some(value) => Ok(value.to_string()),
                None => pool
                    .choose(&mut *rng)
                    .cloned()
                    .ok_or_else(|| PipelineError::Generation(format!("{} pool is empty", what))),
            }
        };

        let category = pick(category, &self.pools.categories, "category")?;
        let audience = pick(audience, &self.pools.audiences, "audience")?;
        let trend = pick(trend, &self.pools.trends, "trend")?;

        let template = TITLE_TEMPLATES.choose(&mut *rng).copied().unwrap_or(TITLE_TEMPLATES[0]);
        let title = template
            .replace("{trend}", &trend.to_lowercase())
            .replace("{category}", &category.to_lowercase());

        Ok(Selection {
            category,
            audience,
            trend,
            title,
        })
    }

    /// Generates one idea; unset parameters are drawn uniformly from the pools.
    pub async fn generate_idea(
        &self,
        category: Option<&str>,
        audience: Option<&str>,
        trend: Option<&str>,
    ) -> Result<VideoIdea, PipelineError> {
        let Selection {
            category,
            audience,
            trend,
            title,
        } = self.select(category, audience, trend)?;

        let prompt = build_prompt(&category, &audience, &trend);
        let reply = self
            .generator
            .generate_text(&prompt)
            .await
            .map_err(|err| {
                loge(format!("Error generating video idea: {:#}", err));
                PipelineError::generation(err)
            })?;
        let script = parse_script(&reply).map_err(|err| {
            loge(format!("Error parsing video idea script: {:#}", err));
            PipelineError::generation(err)
        })?;

        let idea = VideoIdea {
            hashtags: build_hashtags(&category, &trend, &audience),
            visual_elements: format!(
                "Show {} in action with text overlays highlighting key points",
                trend.to_lowercase()
            ),
            audio_suggestions: format!(
                "Upbeat background music suitable for {} content",
                category.to_lowercase()
            ),
            title,
            category,
            target_audience: audience,
            trend_type: trend,
            script,
            id: None,
        };

        logok(format!("Generated video idea: {}", idea.title));
        Ok(idea)
    }

    /// Calls [`generate_idea`](Self::generate_idea) `count` times.
    ///
    /// Failed attempts are dropped, so the result can be shorter than `count`;
    /// successes carry the 1-based attempt number as their id.
    pub async fn generate_multiple(&self, count: usize) -> Vec<VideoIdea> {
        let mut ideas = Vec::with_capacity(count);
        for attempt in 1..=count {
            match self.generate_idea(None, None, None).await {
                Ok(mut idea) => {
                    idea.id = Some(attempt as u32);
                    ideas.push(idea);
                }
                Err(err) => logw(format!("Idea {} dropped: {}", attempt, err)),
            }
        }
        logi(format!("Generated {} of {} ideas", ideas.len(), count));
        ideas
    }
}

pub async fn save_ideas(ideas: &[VideoIdea], path: &Path) -> Result<()> {
    save_json(ideas, path).await?;
    logok(format!("Saved {} ideas to {}", ideas.len(), path.display()));
    Ok(())
}

pub async fn load_ideas(path: &Path) -> Result<Vec<VideoIdea>> {
    let ideas: Vec<VideoIdea> = load_json(path).await?;
    logi(format!("Loaded {} ideas from {}", ideas.len(), path.display()));
    Ok(ideas)
}
