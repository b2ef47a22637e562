use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use subharvest_core::{
    CaptionSource, CsvArtifactStore, FetchRequest, HarvestConfig, HarvestSummary, Harvester,
    Quota, SourceErrorPolicy, TrackingLedger, TranscriptDirSource, TranscriptSource,
    artifact_name, fetch_video, format::format_language_list, get_tracking_path,
    language::normalize_language, probe_catalog, read_catalog, rechunk_file,
    source_name_from_path,
    video::{default_output_name, write_video},
};
use tracing_subscriber::EnvFilter;

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

#[derive(Parser)]
#[command(name = "subharvest")]
#[command(
    about = "Harvest YouTube subtitles in quota-bounded batches, chunk them by duration, and resume where the last run stopped"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log more (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch subtitles for a catalog of videos into numbered batch files
    Harvest(HarvestArgs),
    /// Re-chunk a merged batch file into coarser rows
    Chunk(ChunkArgs),
    /// Fetch and chunk the subtitles of a single video
    Fetch(FetchArgs),
    /// Annotate a catalog with the subtitle languages each video offers
    Probe(ProbeArgs),
}

#[derive(Args)]
struct HarvestArgs {
    /// Catalog CSV with a video_id (or id) column
    #[arg(long)]
    source_csv: PathBuf,

    /// Languages in priority order
    #[arg(long, value_delimiter = ',', default_value = "zh,en,th")]
    languages: Vec<String>,

    /// Videos per batch file
    #[arg(long, default_value_t = 20)]
    group_size: usize,

    /// Videos to take per language this run, or "all"
    #[arg(long, default_value = "40")]
    max_videos: Quota,

    /// Batch file prefix. Defaults to the catalog's file stem.
    #[arg(long)]
    source_name: Option<String>,

    /// Where batch files and the tracking ledger live
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Merge segments until a chunk lasts this many seconds (0 keeps segments as they are)
    #[arg(long, default_value_t = 0.0)]
    min_chunk_time: f64,

    /// Read speech-recognition transcripts from this directory instead of downloading subtitles
    #[arg(long)]
    transcripts_dir: Option<PathBuf>,

    /// What to do with videos whose fetch failed unexpectedly: retry or mark-processed
    #[arg(long, default_value = "retry")]
    on_source_error: SourceErrorPolicy,

    /// Re-download subtitles even if cached
    #[arg(short, long)]
    force: bool,
}

#[derive(Args)]
struct ChunkArgs {
    /// Merged batch file to re-chunk
    #[arg(long)]
    input_file: PathBuf,

    /// Minimum chunk length in seconds
    #[arg(long, default_value_t = 45.0)]
    min_chunk_time: f64,

    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Args)]
struct FetchArgs {
    /// Video URL
    url: String,

    /// Subtitle language
    #[arg(short, long, default_value = "zh")]
    lang: String,

    /// Minimum chunk length in seconds
    #[arg(short = 't', long, default_value_t = 45.0)]
    min_chunk_time: f64,

    /// Speaker column value. Defaults to the language's label.
    #[arg(short, long)]
    speaker: Option<String>,

    /// Output file. Defaults to <video_id>_<lang>.csv
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Re-download subtitles even if cached
    #[arg(short, long)]
    force: bool,
}

#[derive(Args)]
struct ProbeArgs {
    /// Catalog CSV with a video_id (or id) column
    #[arg(long)]
    input_csv: PathBuf,

    /// Where to write the catalog with its subtitle column
    #[arg(long)]
    output_csv: PathBuf,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/dim}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("━╸ "),
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn language_group(code: &str) -> String {
    normalize_language(code).unwrap_or(code).to_string()
}

fn header(subtitle: &str) {
    println!(
        "\n{}  {}\n",
        style("subharvest").cyan().bold(),
        style(subtitle).dim()
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Harvest(args) => match args.transcripts_dir.clone() {
            Some(dir) => harvest(&TranscriptDirSource::new(dir), args).await,
            None => harvest(&CaptionSource::default().with_force(args.force), args).await,
        },
        Command::Chunk(args) => chunk(args).await,
        Command::Fetch(args) => fetch(args).await,
        Command::Probe(args) => probe(args).await,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn harvest<S: TranscriptSource>(source: &S, args: HarvestArgs) -> Result<()> {
    header("Subtitle Harvester");
    let total_start = Instant::now();

    let config = HarvestConfig {
        source_name: args
            .source_name
            .clone()
            .unwrap_or_else(|| source_name_from_path(&args.source_csv)),
        languages: args.languages.iter().map(|l| language_group(l)).collect(),
        group_size: args.group_size,
        max_per_language: args.max_videos,
        min_chunk_time: args.min_chunk_time,
        on_source_error: args.on_source_error,
    };
    let store = CsvArtifactStore::new(&args.data_dir);
    let harvester = Harvester::new(source, &store, config)?;

    let mut catalog = read_catalog(&args.source_csv)
        .await
        .with_context(|| format!("reading catalog {}", args.source_csv.display()))?;
    println!(
        "{} Catalog: {} videos {}",
        style("✓").green().bold(),
        catalog.items.len(),
        style(format!("({} rows skipped)", catalog.skipped_rows)).dim()
    );

    let mut ledger = TrackingLedger::load(get_tracking_path(store.dir())).await?;
    println!(
        "{} Ledger: {} entries {}",
        style("✓").green().bold(),
        ledger.len(),
        style(ledger.path().display()).dim()
    );

    if !catalog.has_language_column {
        let step_start = Instant::now();
        let spinner = create_spinner("Probing subtitle languages...");
        harvester.resolve_languages(&mut catalog).await;
        spinner.finish_with_message(format!(
            "{} Languages probed {}",
            style("✓").green().bold(),
            style(format!("[{}]", format_duration(step_start.elapsed()))).dim()
        ));
    }

    let schedule = harvester.plan(&catalog.items, &ledger);
    for lang in &schedule.languages {
        println!(
            "{} {}: {} videos in {} batches",
            style("✓").green().bold(),
            style(&lang.language).yellow(),
            lang.item_count(),
            lang.groups.len()
        );
    }
    println!("{}", style("─".repeat(60)).dim());

    if schedule.is_empty() {
        println!(
            "{} Nothing left to harvest {}",
            style("✓").green().bold(),
            style("(all eligible videos processed)").dim()
        );
        return Ok(());
    }

    let mut summary = HarvestSummary::default();
    for group in schedule.groups() {
        let step_start = Instant::now();
        let name = artifact_name(
            &harvester.config().source_name,
            &group.language,
            group.part_index,
        );
        let spinner = create_spinner(&format!("Harvesting {} ({} videos)...", name, group.len()));
        let outcome = match harvester.commit_group(group, &mut ledger).await {
            Ok(outcome) => outcome,
            Err(e) => {
                spinner.finish_with_message(format!("{} {}", style("✗").red().bold(), name));
                return Err(e.into());
            }
        };
        spinner.finish_with_message(format!(
            "{} {}: {} committed, {} skipped, {} rows {}",
            style("✓").green().bold(),
            name,
            outcome.entries.len(),
            outcome.skipped.len(),
            outcome.records.len(),
            style(format!("[{}]", format_duration(step_start.elapsed()))).dim()
        ));
        summary.absorb(&outcome);
    }

    println!("{}", style("─".repeat(60)).dim());
    println!(
        "{} {} videos committed, {} left for a later run, {} rows in {} files",
        style("Done:").dim(),
        style(summary.items_committed).cyan().bold(),
        summary.items_skipped,
        summary.records_written,
        summary.artifacts.len()
    );
    println!(
        "\n{} {}\n",
        style("Total time:").dim(),
        style(format_duration(total_start.elapsed())).cyan().bold()
    );
    Ok(())
}

async fn chunk(args: ChunkArgs) -> Result<()> {
    let step_start = Instant::now();
    let spinner = create_spinner(&format!("Chunking {}...", args.input_file.display()));
    let outcome = rechunk_file(&args.input_file, &args.output_dir, args.min_chunk_time)
        .await
        .with_context(|| format!("re-chunking {}", args.input_file.display()))?;

    match outcome.path {
        Some(path) => spinner.finish_with_message(format!(
            "{} {} chunks from {} videos {} {}",
            style("✓").green().bold(),
            outcome.chunks,
            outcome.references,
            style(path.display()).cyan(),
            style(format!("[{}]", format_duration(step_start.elapsed()))).dim()
        )),
        None => spinner.finish_with_message(format!(
            "{} {} has no rows, nothing written",
            style("!").yellow().bold(),
            args.input_file.display()
        )),
    }
    Ok(())
}

async fn fetch(args: FetchArgs) -> Result<()> {
    let step_start = Instant::now();
    let language = language_group(&args.lang);
    let source = CaptionSource::default().with_force(args.force);
    let request = FetchRequest {
        url: args.url.clone(),
        language: language.clone(),
        min_chunk_time: args.min_chunk_time,
        speaker: args.speaker.clone(),
    };

    let spinner = create_spinner(&format!("Fetching {} subtitles...", language));
    let video = match fetch_video(&source, &request).await {
        Ok(video) => video,
        Err(e) => {
            spinner.finish_with_message(format!("{} {}", style("✗").red().bold(), args.url));
            return Err(e.into());
        }
    };
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(default_output_name(&video.video_id, &language)));
    let path = write_video(output, &video).await?;

    spinner.finish_with_message(format!(
        "{} {}: {} chunks {} {}",
        style("✓").green().bold(),
        video.video_id,
        video.records.len(),
        style(path.display()).cyan(),
        style(format!("[{}]", format_duration(step_start.elapsed()))).dim()
    ));
    Ok(())
}

async fn probe(args: ProbeArgs) -> Result<()> {
    let source = CaptionSource::default();
    let pb = create_progress_bar();
    let summary = probe_catalog(
        &source,
        &args.input_csv,
        &args.output_csv,
        |done, total, id, languages| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
            pb.set_message(format!("{} {}", id, format_language_list(languages)));
        },
    )
    .await
    .with_context(|| format!("probing {}", args.input_csv.display()))?;
    pb.finish_and_clear();

    println!(
        "{} {} videos probed, {} with subtitles {}",
        style("✓").green().bold(),
        summary.rows,
        summary.with_languages,
        style(args.output_csv.display()).cyan()
    );
    Ok(())
}
