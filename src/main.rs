use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ai_tiktok_shorts::api::http_client;
use ai_tiktok_shorts::batch::BatchRunner;
use ai_tiktok_shorts::config::{Backend, Config};
use ai_tiktok_shorts::idea::save_ideas;
use ai_tiktok_shorts::init;
use ai_tiktok_shorts::pipeline::{
    IdeaRequest, Producer, idea_generator_from_config, produce_single,
};
use ai_tiktok_shorts::set_log_hook;
use ai_tiktok_shorts::util::file_stamp;

#[derive(Parser, Debug)]
#[command(name = "ai-tiktok-shorts")]
#[command(about = "Generate short vertical videos from AI scripts, narration and stock footage", long_about = None)]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a single video
    Single {
        /// Content category
        #[arg(long)]
        category: Option<String>,
        /// Target audience
        #[arg(long)]
        audience: Option<String>,
        /// Trend type
        #[arg(long)]
        trend: Option<String>,
        /// Output filename
        #[arg(long)]
        output: Option<String>,
    },
    /// Generate and save video ideas without producing videos
    Ideas {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    /// Produce many videos concurrently
    Batch {
        /// Number of videos to generate
        #[arg(long, default_value_t = 10)]
        count: usize,
        /// Number of workers (defaults to the config value)
        #[arg(long)]
        workers: Option<usize>,
        /// Existing ideas JSON file to replay
        #[arg(long)]
        ideas: Option<PathBuf>,
    },
}

/// Appends every tagged log line to `<log_dir>/YYYYMMDD.log`.
fn install_file_log(log_dir: &Path) {
    let path = log_dir.join(format!("{}.log", chrono::Local::now().format("%Y%m%d")));
    let hook = move |line: &str| {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
            let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            let _ = writeln!(file, "{} - {}", now, line);
        }
    };
    set_log_hook(Some(Arc::new(Mutex::new(hook))));
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let cfg = Config::load(&args.config).await?;

    init::ensure_directories(&cfg).await?;
    install_file_log(&cfg.paths.log_dir);

    let client = http_client()?;
    let generator = idea_generator_from_config(&cfg, client.clone()).await;
    let work_dir = Path::new(".");

    match args.command {
        Command::Single {
            category,
            audience,
            trend,
            output,
        } => {
            cfg.require_keys(&[Backend::OpenAi, Backend::ElevenLabs, Backend::Pexels])?;
            if !init::check_ffmpeg().await {
                anyhow::bail!("ffmpeg/ffprobe are required to assemble videos");
            }
            let producer = Producer::from_config(&cfg, client);
            let request = IdeaRequest {
                category,
                audience,
                trend,
            };
            match produce_single(&generator, &producer, &request, work_dir, output.as_deref())
                .await
            {
                Ok(path) => println!("Video successfully generated: {}", path.display()),
                Err(err) => {
                    eprintln!("Video generation failed: {}", err);
                    std::process::exit(1);
                }
            }
        }
        Command::Ideas { count } => {
            cfg.require_keys(&[Backend::OpenAi])?;
            let ideas = generator.generate_multiple(count).await;
            let path = work_dir.join(format!("video_ideas_{}.json", file_stamp()));
            save_ideas(&ideas, &path)
                .await
                .context("Failed to save ideas")?;
            println!(
                "Generated {} of {} ideas, saved to {}",
                ideas.len(),
                count,
                path.display()
            );
        }
        Command::Batch {
            count,
            workers,
            ideas,
        } => {
            let replay = ideas.as_deref().is_some_and(Path::exists);
            let mut needed = vec![Backend::ElevenLabs, Backend::Pexels];
            if !replay {
                needed.push(Backend::OpenAi);
            }
            cfg.require_keys(&needed)?;
            if !init::check_ffmpeg().await {
                anyhow::bail!("ffmpeg/ffprobe are required to assemble videos");
            }

            let producer = Producer::from_config(&cfg, client);
            let runner = BatchRunner::new(
                Arc::new(producer),
                workers.unwrap_or(cfg.batch.workers),
            );
            let report = runner
                .run(&generator, count, ideas.as_deref(), work_dir)
                .await?;
            println!(
                "Created {} of {} videos in {:.1}s; results in {}",
                report.produced(),
                report.requested,
                report.elapsed.as_secs_f64(),
                report.manifest.display()
            );
        }
    }

    Ok(())
}
