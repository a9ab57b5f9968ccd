//! Concurrent Narration -> Footage -> Assembly over many ideas.
//!
//! Ideas are queued on a bounded channel shared by a fixed number of worker
//! tasks. Each worker runs one item at a time inside its own spawned task and
//! reports a typed [`BatchOutcome`] on a results channel, so one item's
//! failure or panic never reaches its siblings.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, instrument};

use crate::error::{PipelineError, Stage};
use crate::idea::{load_ideas, save_ideas, IdeaGenerator, VideoIdea};
use crate::pipeline::Producer;
use crate::util::{file_exists, file_stamp, save_json};
use crate::{loge, logi, logok, logw};

/// Turns one idea into a video file.
#[async_trait]
pub trait ItemProcessor: Send + Sync + 'static {
    async fn process(&self, idea: &VideoIdea, output_name: &str) -> Result<PathBuf, PipelineError>;
}

#[async_trait]
impl ItemProcessor for Producer {
    async fn process(&self, idea: &VideoIdea, output_name: &str) -> Result<PathBuf, PipelineError> {
        self.produce(idea, Some(output_name)).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub idea_id: Option<u32>,
    pub title: String,
    pub video_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub idea_id: Option<u32>,
    pub title: String,
    /// `None` when the item panicked instead of failing a stage.
    pub stage: Option<Stage>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchOutcome {
    Success(BatchResult),
    Failed(BatchFailure),
}

impl BatchOutcome {
    pub fn idea_id(&self) -> Option<u32> {
        match self {
            BatchOutcome::Success(ok) => ok.idea_id,
            BatchOutcome::Failed(failed) => failed.idea_id,
        }
    }

    pub fn as_success(&self) -> Option<&BatchResult> {
        match self {
            BatchOutcome::Success(ok) => Some(ok),
            BatchOutcome::Failed(_) => None,
        }
    }
}

/// The completed items of a batch, in completion order.
pub fn successes(outcomes: &[BatchOutcome]) -> Vec<&BatchResult> {
    outcomes.iter().filter_map(BatchOutcome::as_success).collect()
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub requested: usize,
    pub outcomes: Vec<BatchOutcome>,
    pub ideas_file: PathBuf,
    pub manifest: PathBuf,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn produced(&self) -> usize {
        successes(&self.outcomes).len()
    }
}

fn id_label(idea: &VideoIdea) -> String {
    idea.id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn run_item(processor: Arc<dyn ItemProcessor>, idea: VideoIdea) -> BatchOutcome {
    let output_name = format!("tiktok_{}_{}.mp4", id_label(&idea), file_stamp());
    let task_idea = idea.clone();
    let handle =
        tokio::spawn(async move { processor.process(&task_idea, &output_name).await });

    match handle.await {
        Ok(Ok(video_path)) => BatchOutcome::Success(BatchResult {
            idea_id: idea.id,
            title: idea.title,
            video_path,
        }),
        Ok(Err(err)) => {
            loge(format!(
                "Failed to create video for idea {} at {} stage: {}",
                id_label(&idea),
                err.stage(),
                err.reason()
            ));
            BatchOutcome::Failed(BatchFailure {
                idea_id: idea.id,
                title: idea.title,
                stage: Some(err.stage()),
                reason: err.reason().to_string(),
            })
        }
        Err(join_err) => {
            loge(format!("Error processing idea {}: {}", id_label(&idea), join_err));
            BatchOutcome::Failed(BatchFailure {
                idea_id: idea.id,
                title: idea.title,
                stage: None,
                reason: format!("task aborted: {}", join_err),
            })
        }
    }
}

async fn worker(
    index: usize,
    processor: Arc<dyn ItemProcessor>,
    jobs: Arc<Mutex<mpsc::Receiver<VideoIdea>>>,
    results: mpsc::UnboundedSender<BatchOutcome>,
) {
    debug!(worker = index, "batch worker started");
    loop {
        let next = jobs.lock().await.recv().await;
        let Some(idea) = next else {
            break;
        };
        let outcome = run_item(Arc::clone(&processor), idea).await;
        if results.send(outcome).is_err() {
            break;
        }
    }
    debug!(worker = index, "batch worker finished");
}

pub struct BatchRunner {
    processor: Arc<dyn ItemProcessor>,
    workers: usize,
}

impl BatchRunner {
    pub fn new(processor: Arc<dyn ItemProcessor>, workers: usize) -> Self {
        Self {
            processor,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Processes every idea with at most `workers` items in flight.
    ///
    /// Outcomes arrive in completion order, one per submitted idea.
    #[instrument(skip(self, ideas), fields(items = ideas.len(), workers = self.workers))]
    pub async fn run_batch(&self, ideas: Vec<VideoIdea>) -> Vec<BatchOutcome> {
        if ideas.is_empty() {
            return Vec::new();
        }

        let pool_size = self.workers.min(ideas.len());
        let (job_tx, job_rx) = mpsc::channel::<VideoIdea>(pool_size);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        for index in 0..pool_size {
            tokio::spawn(worker(
                index,
                Arc::clone(&self.processor),
                Arc::clone(&job_rx),
                result_tx.clone(),
            ));
        }
        drop(result_tx);

        let expected = ideas.len();
        let feeder = tokio::spawn(async move {
            for idea in ideas {
                if job_tx.send(idea).await.is_err() {
                    break;
                }
            }
        });

        let mut outcomes = Vec::with_capacity(expected);
        while let Some(outcome) = result_rx.recv().await {
            outcomes.push(outcome);
        }
        if let Err(err) = feeder.await {
            logw(format!("Batch feeder stopped early: {}", err));
        }
        outcomes
    }

    /// Loads `ideas_file` when it exists, otherwise generates `count` ideas and
    /// snapshots them under `work_dir`; processes the first `count` and writes
    /// `batch_results_<stamp>.json` there.
    pub async fn run(
        &self,
        generator: &IdeaGenerator,
        count: usize,
        ideas_file: Option<&Path>,
        work_dir: &Path,
    ) -> Result<BatchReport> {
        let started = Instant::now();
        logi(format!("Starting batch processing of {} videos", count));

        let existing = match ideas_file {
            Some(path) if file_exists(path).await => Some(path.to_path_buf()),
            Some(path) => {
                logw(format!("Ideas file {} not found; generating", path.display()));
                None
            }
            None => None,
        };
        let (ideas, ideas_path) = match existing {
            Some(path) => (load_ideas(&path).await?, path),
            None => {
                let path = work_dir.join(format!("video_ideas_{}.json", file_stamp()));
                let ideas = generator.generate_multiple(count).await;
                save_ideas(&ideas, &path).await?;
                (ideas, path)
            }
        };

        let selected: Vec<VideoIdea> = ideas.into_iter().take(count).collect();
        let outcomes = self.run_batch(selected).await;

        let manifest = work_dir.join(format!("batch_results_{}.json", file_stamp()));
        save_json(&outcomes, &manifest).await?;

        let report = BatchReport {
            requested: count,
            outcomes,
            ideas_file: ideas_path,
            manifest,
            elapsed: started.elapsed(),
        };
        logok(format!(
            "Batch processing completed in {:.2} seconds",
            report.elapsed.as_secs_f64()
        ));
        logi(format!(
            "Successfully created {} videos out of {} ideas",
            report.produced(),
            report.requested
        ));
        logi(format!("Results saved to {}", report.manifest.display()));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idea::{ContentPools, Script};
    use crate::pipeline::fakes::{producer, std_dirs, FakeModel};
    use tempfile::TempDir;

    fn idea(id: u32, topic: &str) -> VideoIdea {
        VideoIdea {
            title: format!("Idea {id}"),
            category: "Gardening".into(),
            target_audience: "Beginners".into(),
            trend_type: "tutorial".into(),
            script: Script {
                hook: topic.into(),
                body: topic.into(),
                cta: topic.into(),
            },
            visual_elements: String::new(),
            audio_suggestions: String::new(),
            hashtags: Vec::new(),
            id: Some(id),
        }
    }

    #[tokio::test]
    async fn footage_failure_is_isolated_and_tagged() {
        let dir = TempDir::new().unwrap();
        std_dirs(dir.path());
        let runner = BatchRunner::new(Arc::new(producer(dir.path())), 2);
        let ideas = vec![
            idea(1, "tomato"),
            idea(2, "basil"),
            idea(3, "void"),
            idea(4, "pepper"),
            idea(5, "onion"),
        ];

        let outcomes = runner.run_batch(ideas).await;

        assert_eq!(outcomes.len(), 5);
        let ok = successes(&outcomes);
        assert_eq!(ok.len(), 4);
        assert!(ok.iter().all(|r| r.idea_id != Some(3)));
        let failed: Vec<&BatchFailure> = outcomes
            .iter()
            .filter_map(|o| match o {
                BatchOutcome::Failed(f) => Some(f),
                BatchOutcome::Success(_) => None,
            })
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].idea_id, Some(3));
        assert_eq!(failed[0].stage, Some(Stage::Footage));
    }

    #[tokio::test]
    async fn output_names_carry_idea_id() {
        let dir = TempDir::new().unwrap();
        std_dirs(dir.path());
        let runner = BatchRunner::new(Arc::new(producer(dir.path())), 4);

        let outcomes = runner.run_batch(vec![idea(9, "carrot")]).await;
        let result = outcomes[0].as_success().unwrap();
        let name = result.video_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("tiktok_9_"), "{name}");
        assert!(result.video_path.exists());
    }

    #[tokio::test]
    async fn empty_batch_returns_immediately() {
        let dir = TempDir::new().unwrap();
        let runner = BatchRunner::new(Arc::new(producer(dir.path())), 0);
        assert_eq!(runner.workers(), 1);
        assert!(runner.run_batch(Vec::new()).await.is_empty());
    }

    #[tokio::test]
    async fn run_generates_snapshot_and_manifest() {
        let dir = TempDir::new().unwrap();
        std_dirs(dir.path());
        let runner = BatchRunner::new(Arc::new(producer(dir.path())), 3);
        let generator = IdeaGenerator::with_seed(Arc::new(FakeModel), ContentPools::default(), 2);

        let report = runner.run(&generator, 3, None, dir.path()).await.unwrap();

        assert_eq!(report.requested, 3);
        assert_eq!(report.produced(), 3);
        let snapshot = load_ideas(&report.ideas_file).await.unwrap();
        assert_eq!(snapshot.len(), 3);
        let manifest: Vec<BatchOutcome> =
            crate::util::load_json(&report.manifest).await.unwrap();
        assert_eq!(manifest, report.outcomes);
    }

    #[tokio::test]
    async fn run_replays_saved_snapshot() {
        let dir = TempDir::new().unwrap();
        std_dirs(dir.path());
        let saved = vec![idea(4, "lettuce"), idea(8, "void"), idea(15, "mint")];
        let path = dir.path().join("ideas.json");
        save_ideas(&saved, &path).await.unwrap();

        let runner = BatchRunner::new(Arc::new(producer(dir.path())), 2);
        let generator = IdeaGenerator::with_seed(Arc::new(FakeModel), ContentPools::default(), 2);
        let report = runner.run(&generator, 2, Some(&path), dir.path()).await.unwrap();

        assert_eq!(report.ideas_file, path);
        let mut ids: Vec<Option<u32>> = report.outcomes.iter().map(BatchOutcome::idea_id).collect();
        ids.sort();
        assert_eq!(ids, vec![Some(4), Some(8)]);
        assert_eq!(report.produced(), 1);
    }

    #[test]
    fn manifest_entries_are_tagged() {
        let outcome = BatchOutcome::Failed(BatchFailure {
            idea_id: Some(3),
            title: "t".into(),
            stage: Some(Stage::Footage),
            reason: "no clips".into(),
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stage"], "footage");
        assert_eq!(json["idea_id"], 3);
    }
}
