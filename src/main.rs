mod classify;
mod config;
mod extract;
mod fetch;
mod input;
mod outline;
mod recover;
mod signals;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scraper::Html;
use tracing::{info, warn};

use crate::config::{CurateConfig, Tunables};
use crate::recover::{ManualRecovery, NoRecovery, Recovery};

#[derive(Parser)]
#[command(
    name = "article_curator",
    about = "Annotate bookmarked articles with dates and word counts, and file them into a topical outline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve publication date and word count for each URL in a bookmark CSV
    Annotate {
        /// Input bookmark CSV (needs a url column)
        #[arg(long)]
        csv: PathBuf,
        /// Output results CSV
        #[arg(short, long, default_value = "annotated.csv")]
        output: PathBuf,
        /// Seconds to wait between fetches
        #[arg(long, default_value = "1.0")]
        fetch_delay: f64,
        /// Per-request timeout in seconds
        #[arg(long, default_value = "20")]
        fetch_timeout: u64,
        /// On 403/429/timeout, ask for a manual browser visit and retry once
        #[arg(long)]
        manual_retry: bool,
        /// File holding a Cookie header value for manual retries
        #[arg(long)]
        cookie_file: Option<PathBuf>,
    },
    /// Classify new CSV articles into an outline HTML file
    Curate {
        /// Input bookmark CSV
        #[arg(long)]
        csv: PathBuf,
        /// Input outline HTML
        #[arg(long)]
        outline: PathBuf,
        /// Output outline HTML
        #[arg(short, long, default_value = "outline_updated.html")]
        output: PathBuf,
        /// Classify from CSV signals only, without fetching URLs
        #[arg(long)]
        no_fetch: bool,
        /// Classify and report without writing output
        #[arg(long)]
        dry_run: bool,
        /// Print per-article placement
        #[arg(long)]
        verbose: bool,
        /// Max subsections an article may be filed under
        #[arg(long, default_value = "1")]
        max_sections: usize,
        /// Seconds to wait between fetches
        #[arg(long, default_value = "1.0")]
        fetch_delay: f64,
        /// Per-request timeout in seconds
        #[arg(long, default_value = "20")]
        fetch_timeout: u64,
        /// Optional TOML file overriding tunables and section hints
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show article counts and date coverage for an outline file
    Stats {
        /// Outline HTML
        #[arg(long)]
        outline: PathBuf,
    },
}

// Fetches are strictly sequential with a politeness delay, so a
// current-thread runtime is all this pipeline needs.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Annotate {
            csv,
            output,
            fetch_delay,
            fetch_timeout,
            manual_retry,
            cookie_file,
        } => {
            run_annotate(
                &csv,
                &output,
                fetch_delay,
                fetch_timeout,
                manual_retry,
                cookie_file,
            )
            .await
        }
        Commands::Curate {
            csv,
            outline,
            output,
            no_fetch,
            dry_run,
            verbose,
            max_sections,
            fetch_delay,
            fetch_timeout,
            config,
        } => {
            run_curate(CurateArgs {
                csv,
                outline,
                output,
                no_fetch,
                dry_run,
                verbose,
                max_sections,
                fetch_delay,
                fetch_timeout,
                config,
            })
            .await
        }
        Commands::Stats { outline } => run_stats(&outline),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

struct PageAnnotation {
    pub_date: Option<String>,
    date_status: String,
    wordcount: Option<u32>,
    wc_status: String,
    wc_method: Option<String>,
}

/// Pure extraction over a fetched page. Parsing stays in sync code so no
/// document is held across an await.
fn annotate_html(body: &str, tunables: &Tunables) -> PageAnnotation {
    let doc = Html::parse_document(body);

    let (pub_date, date_status) = match extract::date::resolve(&doc) {
        Some(candidate) => (Some(candidate.value), "success".to_string()),
        None => (None, "no_date_found".to_string()),
    };

    let (wordcount, wc_status, wc_method) = match extract::wordcount::estimate(body, &doc, tunables)
    {
        Some(wc) => (Some(wc.count), "success".to_string(), Some(wc.method.to_string())),
        None => (None, "no_text_found".to_string(), None),
    };

    PageAnnotation {
        pub_date,
        date_status,
        wordcount,
        wc_status,
        wc_method,
    }
}

async fn run_annotate(
    csv: &Path,
    output: &Path,
    fetch_delay: f64,
    fetch_timeout: u64,
    manual_retry: bool,
    cookie_file: Option<PathBuf>,
) -> Result<()> {
    let records = input::read_records(csv)?;
    let client = fetch::build_client(Duration::from_secs(fetch_timeout))?;
    let tunables = Tunables::default();
    let recovery: Box<dyn Recovery> = if manual_retry {
        Box::new(ManualRecovery::new(cookie_file))
    } else {
        Box::new(NoRecovery)
    };

    println!("Annotating {} articles...", records.len());
    let pb = progress_bar(records.len())?;

    let mut rows = Vec::with_capacity(records.len());
    let mut dated = 0usize;
    let mut counted = 0usize;
    let mut failed = 0usize;

    for record in &records {
        if record.url.is_empty() {
            rows.push(input::AnnotatedRow::no_url(record.title.clone()));
            pb.inc(1);
            continue;
        }

        let mut outcome = fetch::fetch_with_retry(&client, &record.url, None).await;
        if !outcome.status.is_success() && manual_retry && outcome.status.manual_retryable() {
            let cookie = recovery.prepare(&record.url);
            outcome = fetch::fetch_once(&client, &record.url, cookie.as_deref()).await;
        }

        match outcome.body {
            Some(body) if outcome.status.is_success() => {
                let page = annotate_html(&body, &tunables);
                if page.pub_date.is_some() {
                    dated += 1;
                }
                if page.wordcount.is_some() {
                    counted += 1;
                }
                rows.push(input::AnnotatedRow {
                    title: record.title.clone(),
                    url: record.url.clone(),
                    pub_date: page.pub_date,
                    date_status: page.date_status,
                    wordcount: page.wordcount,
                    wc_status: page.wc_status,
                    wc_method: page.wc_method,
                });
            }
            _ => {
                failed += 1;
                rows.push(input::AnnotatedRow::fetch_failed(
                    record.title.clone(),
                    record.url.clone(),
                    outcome.status.label(),
                ));
            }
        }

        pb.inc(1);
        if fetch_delay > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(fetch_delay)).await;
        }
    }

    pb.finish_and_clear();
    input::write_results(output, &rows)?;

    println!("Dates     : {}/{} resolved", dated, records.len());
    println!("Wordcounts: {}/{} resolved", counted, records.len());
    println!("Failures  : {} fetches", failed);
    println!("Output    : {}", output.display());
    Ok(())
}

struct CurateArgs {
    csv: PathBuf,
    outline: PathBuf,
    output: PathBuf,
    no_fetch: bool,
    dry_run: bool,
    verbose: bool,
    max_sections: usize,
    fetch_delay: f64,
    fetch_timeout: u64,
    config: Option<PathBuf>,
}

fn fetch_signals_from_body(body: &str) -> signals::ArticleSignals {
    let doc = Html::parse_document(body);
    signals::extract_fetched_signals(&doc)
}

enum PlaceOutcome {
    Inserted(Vec<String>),
    Duplicate,
    Unplaced,
}

/// File one record into the outline. A URL already present (whether from
/// the input document or inserted earlier in this run) is never inserted
/// again. An explicit _outl: tag names the destination outright; the scorer
/// only runs when no such tag is present.
#[allow(clippy::too_many_arguments)]
fn place_record(
    outline: &mut outline::Outline,
    profiles: &[classify::SubsectionProfile],
    hints: &config::SectionHints,
    tunables: &Tunables,
    max_sections: usize,
    existing_urls: &mut std::collections::HashSet<String>,
    record: &input::ArticleRecord,
    sig: &signals::ArticleSignals,
) -> PlaceOutcome {
    if record.url.is_empty() || existing_urls.contains(&record.url) {
        return PlaceOutcome::Duplicate;
    }

    let date = record.pub_date_override();
    let wordcount = record.wordcount_override();
    let display_title = sig.display_title().to_string();

    let explicit = record.outline_placements();
    let placements: Vec<(String, Option<String>)> = if explicit.is_empty() {
        let targets = classify::best_subsections(
            profiles,
            sig,
            hints,
            &tunables.weights,
            tunables.tie_break_band,
            max_sections,
        );
        let cross_ref = classify::cross_ref_text(&targets);
        targets
            .iter()
            .enumerate()
            .map(|(i, t)| {
                (
                    t.sub_id.clone(),
                    if i == 0 { cross_ref.clone() } else { None },
                )
            })
            .collect()
    } else {
        explicit.into_iter().map(|sub_id| (sub_id, None)).collect()
    };

    let mut placed = Vec::new();
    for (sub_id, cross_ref) in placements {
        let entry = outline::Entry {
            title: display_title.clone(),
            url: record.url.clone(),
            date,
            wordcount,
            cross_ref,
        };
        match outline.insert(&sub_id, entry) {
            Ok(()) => placed.push(sub_id),
            Err(e) => warn!("Skipping placement for {}: {}", record.url, e),
        }
    }

    if placed.is_empty() {
        return PlaceOutcome::Unplaced;
    }
    existing_urls.insert(record.url.clone());
    PlaceOutcome::Inserted(placed)
}

async fn run_curate(args: CurateArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => CurateConfig::load(path)?,
        None => CurateConfig::default(),
    };
    let hints = config.section_hints();
    let tunables = &config.tunables;

    let raw = std::fs::read_to_string(&args.outline)
        .with_context(|| format!("Failed to read outline: {}", args.outline.display()))?;
    let mut outline = outline::Outline::parse(&raw)?;
    let profiles = classify::build_profiles(&outline);
    if profiles.is_empty() {
        anyhow::bail!("No subsections found in {}", args.outline.display());
    }
    info!(
        "Outline: {} sections, {} subsections, {} articles",
        outline.sections.len(),
        profiles.len(),
        outline.total_entries()
    );

    let records = input::read_records(&args.csv)?;
    let mut existing_urls = outline.existing_urls();

    let client = if args.no_fetch {
        None
    } else {
        Some(fetch::build_client(Duration::from_secs(args.fetch_timeout))?)
    };

    println!("Curating {} articles...", records.len());
    let pb = progress_bar(records.len())?;

    let mut inserted = 0usize;
    let mut skipped = 0usize;
    let mut fetch_ok = 0usize;
    let mut fetch_fail = 0usize;

    for record in &records {
        pb.inc(1);
        if record.title.is_empty() && record.url.is_empty() {
            continue;
        }
        if record.url.is_empty() || existing_urls.contains(&record.url) {
            skipped += 1;
            continue;
        }

        let mut sig = signals::ArticleSignals {
            title: record.title.clone(),
            tags: record.tags.clone(),
            note: record.note.clone(),
            excerpt: record.excerpt.clone(),
            ..Default::default()
        };

        if let Some(client) = &client {
            let outcome = fetch::fetch_with_retry(client, &record.url, None).await;
            match outcome.body {
                Some(body) if outcome.status.is_success() => {
                    sig.absorb_fetched(fetch_signals_from_body(&body));
                    fetch_ok += 1;
                }
                _ => {
                    warn!("Fetch failed for {}: {}", record.url, outcome.status.label());
                    fetch_fail += 1;
                }
            }
            if args.fetch_delay > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(args.fetch_delay)).await;
            }
        }

        match place_record(
            &mut outline,
            &profiles,
            &hints,
            tunables,
            args.max_sections,
            &mut existing_urls,
            record,
            &sig,
        ) {
            PlaceOutcome::Inserted(ids) => {
                inserted += 1;
                if args.verbose {
                    let source = if sig.fetch_ok { "fetched" } else { "csv-only" };
                    pb.println(format!(
                        "  [{}] ({}) {}",
                        ids.join(", "),
                        source,
                        truncate(sig.display_title(), 80)
                    ));
                }
            }
            PlaceOutcome::Duplicate => skipped += 1,
            PlaceOutcome::Unplaced => {}
        }
    }

    pb.finish_and_clear();

    outline.sort_entries_by_date();

    println!("Inserted  : {} new articles", inserted);
    println!("Skipped   : {} duplicate or empty rows", skipped);
    if client.is_some() {
        println!("Fetched   : {} OK, {} failed", fetch_ok, fetch_fail);
    }

    if args.dry_run {
        println!("Dry run - no output written.");
        return Ok(());
    }

    std::fs::write(&args.output, outline.render())
        .with_context(|| format!("Failed to write outline: {}", args.output.display()))?;
    println!("Output    : {}", args.output.display());
    Ok(())
}

fn run_stats(path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read outline: {}", path.display()))?;
    let outline = outline::Outline::parse(&raw)?;

    let mut total = 0usize;
    let mut dated = 0usize;
    for section in &outline.sections {
        let sec_count: usize = section.subsections.iter().map(|s| s.entries.len()).sum();
        println!("{:<5} {:<50} {:>4}", section.id, truncate(&section.title, 50), sec_count);
        for sub in &section.subsections {
            let sub_dated = sub.entries.iter().filter(|e| e.date.is_some()).count();
            println!(
                "  {:<5} {:<46} {:>4} ({} dated)",
                sub.id,
                truncate(&sub.title, 46),
                sub.entries.len(),
                sub_dated
            );
            total += sub.entries.len();
            dated += sub_dated;
        }
    }
    println!("\n{} articles, {} with dates", total, dated);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_outline() -> outline::Outline {
        let raw = std::fs::read_to_string("tests/fixtures/outline.html").unwrap();
        outline::Outline::parse(&raw).unwrap()
    }

    fn record(title: &str, url: &str, tags: &str) -> input::ArticleRecord {
        input::ArticleRecord {
            title: title.to_string(),
            url: url.to_string(),
            tags: tags.to_string(),
            ..Default::default()
        }
    }

    fn signals_for(rec: &input::ArticleRecord) -> signals::ArticleSignals {
        signals::ArticleSignals {
            title: rec.title.clone(),
            tags: rec.tags.clone(),
            note: rec.note.clone(),
            excerpt: rec.excerpt.clone(),
            ..Default::default()
        }
    }

    #[test]
    fn rerun_inserts_zero_duplicates() {
        let mut outline = fixture_outline();
        let profiles = classify::build_profiles(&outline);
        let hints = config::default_section_hints();
        let tunables = Tunables::default();
        let mut existing = outline.existing_urls();
        let before = outline.total_entries();

        // URL already filed in the outline document.
        let rec = record(
            "Scaling Laws Revisited",
            "https://example.com/scaling-laws",
            "",
        );
        let sig = signals_for(&rec);
        let outcome = place_record(
            &mut outline,
            &profiles,
            &hints,
            &tunables,
            1,
            &mut existing,
            &rec,
            &sig,
        );
        assert!(matches!(outcome, PlaceOutcome::Duplicate));
        assert_eq!(outline.total_entries(), before);
    }

    #[test]
    fn url_inserted_mid_run_is_not_inserted_twice() {
        let mut outline = fixture_outline();
        let profiles = classify::build_profiles(&outline);
        let hints = config::default_section_hints();
        let tunables = Tunables::default();
        let mut existing = outline.existing_urls();
        let before = outline.total_entries();

        let rec = record("A Fresh Article", "https://example.com/fresh", "_outl:I-A");
        let sig = signals_for(&rec);

        let first = place_record(
            &mut outline,
            &profiles,
            &hints,
            &tunables,
            1,
            &mut existing,
            &rec,
            &sig,
        );
        assert!(matches!(first, PlaceOutcome::Inserted(ref ids) if ids == &["s1a"]));

        let second = place_record(
            &mut outline,
            &profiles,
            &hints,
            &tunables,
            1,
            &mut existing,
            &rec,
            &sig,
        );
        assert!(matches!(second, PlaceOutcome::Duplicate));
        assert_eq!(outline.total_entries(), before + 1);
    }

    #[test]
    fn annotation_columns_flow_into_placed_entry() {
        let mut outline = fixture_outline();
        let profiles = classify::build_profiles(&outline);
        let hints = config::default_section_hints();
        let tunables = Tunables::default();
        let mut existing = outline.existing_urls();

        let mut rec = record("Annotated Article", "https://example.com/annotated", "_outl:I-B");
        rec.pub_date = "2024-03-15".to_string();
        rec.wordcount = "1250".to_string();
        let sig = signals_for(&rec);
        place_record(
            &mut outline,
            &profiles,
            &hints,
            &tunables,
            1,
            &mut existing,
            &rec,
            &sig,
        );

        let entry = outline
            .subsection("s1b")
            .unwrap()
            .entries
            .iter()
            .find(|e| e.url == "https://example.com/annotated")
            .unwrap();
        assert_eq!(entry.date, chrono::NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(entry.wordcount, Some(1250));
    }

    #[test]
    fn explicit_placement_carries_no_cross_ref() {
        let mut outline = fixture_outline();
        let profiles = classify::build_profiles(&outline);
        let hints = config::default_section_hints();
        let tunables = Tunables::default();
        let mut existing = outline.existing_urls();

        let rec = record(
            "Doubly Tagged",
            "https://example.com/doubly-tagged",
            "_outl:I-A, _outl:III-A",
        );
        let sig = signals_for(&rec);
        let outcome = place_record(
            &mut outline,
            &profiles,
            &hints,
            &tunables,
            2,
            &mut existing,
            &rec,
            &sig,
        );
        assert!(matches!(outcome, PlaceOutcome::Inserted(ref ids) if ids.len() == 2));
        for sub_id in ["s1a", "s3a"] {
            let entry = outline
                .subsection(sub_id)
                .unwrap()
                .entries
                .iter()
                .find(|e| e.url == "https://example.com/doubly-tagged")
                .unwrap();
            assert_eq!(entry.cross_ref, None);
        }
    }
}
