//! CV Ranking CLI

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cv_ranking::{
    analysis::DisagreementAnalyzer,
    candidates::{filter_by_ids, load_cvs_from_file, load_job_description, Cv},
    config::Config,
    criteria::{default_criteria, CriteriaSet},
    pipelines::{prompts, PipelineKind},
    providers::{configured_targets, create_endpoints, ModelTarget},
    reporting::{print_console_report, read_results_json, write_run_outputs, DisagreementWriter},
    runner::{ConsoleProgress, Executor, ExecutorConfig, RunError, RunInput},
    store::{ResultStore, RunMetadata},
};

const QUICK_TEST_CVS: usize = 3;

#[derive(Parser)]
#[command(name = "cv-ranking")]
#[command(about = "Rank CVs under competing LLM pipelines and measure their disagreement")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate CVs under every selected (pipeline, model) combination
    Run {
        /// CV file (JSON list or {"cvs": [...]})
        #[arg(long, default_value = "data/cvs.json")]
        cvs: PathBuf,

        /// Job description text file
        #[arg(long, default_value = "data/job_description.md")]
        job: PathBuf,

        /// Markdown rubric (default: built-in criteria)
        #[arg(long)]
        rubric: Option<PathBuf>,

        /// Comma-separated pipelines (default: from config)
        #[arg(long)]
        pipelines: Option<String>,

        /// Comma-separated provider:model pairs (default: from config)
        #[arg(long)]
        models: Option<String>,

        /// Comma-separated CV ids to evaluate
        #[arg(long)]
        cv_ids: Option<String>,

        /// Only evaluate the first three CVs
        #[arg(long)]
        quick_test: bool,

        /// Name of the results subdirectory
        #[arg(long)]
        experiment_name: Option<String>,

        /// Maximum provider calls in flight
        #[arg(long)]
        parallel: Option<usize>,

        /// Stop issuing calls after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Rebuild a result store from results.json and report disagreement
    Analyze {
        /// Path to a results.json written by `run`
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the disagreement report (default: next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List CVs in a CV file
    ListCvs {
        #[arg(long, default_value = "data/cvs.json")]
        cvs: PathBuf,
    },

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/ranking.toml")]
        output: PathBuf,
    },

    /// Write every prompt a run would send to text files for review
    DumpPrompts {
        #[arg(long, default_value = "data/cvs.json")]
        cvs: PathBuf,

        #[arg(long, default_value = "data/job_description.md")]
        job: PathBuf,

        #[arg(long)]
        rubric: Option<PathBuf>,

        /// Output directory for prompt files
        #[arg(short, long, default_value = "results/prompts")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("cv_ranking=debug,info")
    } else {
        EnvFilter::new("cv_ranking=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Run {
            cvs,
            job,
            rubric,
            pipelines,
            models,
            cv_ids,
            quick_test,
            experiment_name,
            parallel,
            deadline_secs,
        } => {
            let args = RunArgs {
                cvs,
                job,
                rubric,
                pipelines,
                models,
                cv_ids,
                quick_test,
                experiment_name,
                parallel,
                deadline_secs,
            };
            run_ranking(config, args).await?;
        }

        Commands::Analyze { input, output } => {
            analyze_results(input, output)?;
        }

        Commands::ListCvs { cvs } => {
            list_cvs(cvs)?;
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }

        Commands::DumpPrompts { cvs, job, rubric, output } => {
            dump_prompts(cvs, job, rubric, output)?;
        }
    }

    Ok(())
}

struct RunArgs {
    cvs: PathBuf,
    job: PathBuf,
    rubric: Option<PathBuf>,
    pipelines: Option<String>,
    models: Option<String>,
    cv_ids: Option<String>,
    quick_test: bool,
    experiment_name: Option<String>,
    parallel: Option<usize>,
    deadline_secs: Option<u64>,
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn load_criteria(rubric: Option<&Path>) -> Result<CriteriaSet, Box<dyn std::error::Error>> {
    match rubric {
        Some(path) => Ok(CriteriaSet::from_markdown(&std::fs::read_to_string(path)?)?),
        None => Ok(default_criteria()),
    }
}

async fn run_ranking(mut config: Config, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let started_at = Utc::now();
    let experiment_name = args
        .experiment_name
        .or_else(|| config.run.experiment_name.clone())
        .unwrap_or_else(|| format!("run_{}", started_at.format("%Y%m%d_%H%M%S")));

    println!("=== CV Ranking ===");
    println!("Experiment: {}", experiment_name);
    println!();

    // Load inputs
    let job_description = load_job_description(&args.job)?;
    let criteria = load_criteria(args.rubric.as_deref())?;
    let mut cvs = load_cvs_from_file(&args.cvs)?;
    if let Some(ids) = &args.cv_ids {
        let ids: Vec<String> = split_list(ids).map(str::to_string).collect();
        cvs = filter_by_ids(cvs, &ids);
    }
    if args.quick_test {
        cvs.truncate(QUICK_TEST_CVS);
    }

    // CLI overrides
    if let Some(parallel) = args.parallel {
        config.run.parallel_requests = parallel;
    }
    if let Some(secs) = args.deadline_secs {
        config.run.deadline_secs = Some(secs);
    }
    let pipelines: Vec<PipelineKind> = match &args.pipelines {
        Some(list) => split_list(list).map(str::parse).collect::<Result<_, _>>()?,
        None => config.run.pipelines.clone(),
    };
    let targets: Vec<ModelTarget> = match &args.models {
        Some(list) => split_list(list).map(str::parse).collect::<Result<_, _>>()?,
        None => configured_targets(&config),
    };

    // Missing API keys fail here, before any call
    let endpoints = create_endpoints(&targets, &config)?;

    println!("CVs:       {}", cvs.len());
    println!("Criteria:  {}", criteria.len());
    println!(
        "Pipelines: {}",
        pipelines.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(", ")
    );
    println!(
        "Models:    {}",
        endpoints.iter().map(|e| format!("{:?}", e)).collect::<Vec<_>>().join(", ")
    );
    println!();

    let executor = Executor::new(endpoints, pipelines, ExecutorConfig::from_run_config(&config.run))
        .with_progress(Arc::new(ConsoleProgress));
    let store = Arc::new(ResultStore::new(executor.metadata(&experiment_name, &cvs)));
    let input = Arc::new(RunInput::new(job_description, criteria, cvs));

    let cancel = executor.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted: finishing in-flight calls");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    println!("Running...");
    // Preconditions fail before anything is recorded; everything else leaves
    // results worth writing
    let outcome = match executor.run(input, Arc::clone(&store)).await {
        Err(
            e @ (RunError::NoCandidates
            | RunError::NoCriteria
            | RunError::NoCombinations
            | RunError::DuplicateCvId(_)),
        ) => return Err(e.into()),
        other => other,
    };

    let (paths, report) = write_run_outputs(&store, &config.output)?;
    print_console_report(&store.export_summary(), &report);
    println!("\nResults written to: {}", paths.dir.display());

    outcome?;
    Ok(())
}

fn analyze_results(input: PathBuf, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let results = read_results_json(&input)?;
    let dir = output
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    let experiment_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "analysis".to_string());

    let metadata = RunMetadata::from_results(experiment_name, &results);
    let store = ResultStore::from_results(metadata, results)?;
    let report = DisagreementAnalyzer::new().analyze(&store.export_table());

    std::fs::create_dir_all(&dir)?;
    DisagreementWriter::write_json(dir.join("disagreement.json"), &report)?;
    DisagreementWriter::write_text(dir.join("disagreement.txt"), &report)?;

    print_console_report(&store.export_summary(), &report);
    println!("\nDisagreement report written to: {}", dir.display());
    Ok(())
}

fn list_cvs(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let cvs = load_cvs_from_file(&path)?;

    println!("Available CVs ({}):", cvs.len());
    println!("{:-<60}", "");
    for cv in &cvs {
        println!("  {:<16} {:<32} {} chars", cv.id, cv.display_name(), cv.content.len());
    }

    Ok(())
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    // Ensure parent directory exists
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    config.save_toml(&output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}

fn write_prompt(dir: &Path, file_name: &str, title: &str, prompt: &str) -> std::io::Result<()> {
    let content = format!("=== {} ===\n{}\n\n{}", title, "=".repeat(50), prompt);
    std::fs::write(dir.join(file_name), content)
}

fn dump_prompts(
    cvs_path: PathBuf,
    job: PathBuf,
    rubric: Option<PathBuf>,
    output_dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let job_description = load_job_description(&job)?;
    let criteria = load_criteria(rubric.as_deref())?;
    let cvs: Vec<Cv> = load_cvs_from_file(&cvs_path)?;

    std::fs::create_dir_all(&output_dir)?;

    println!("=== Dumping Prompts ===");
    println!("CVs:    {}", cvs.len());
    println!("Output: {}", output_dir.display());
    println!();

    write_prompt(
        &output_dir,
        "one_shot.txt",
        "One-Shot (all CVs)",
        &prompts::one_shot_prompt(&job_description, &criteria, &cvs),
    )?;
    write_prompt(
        &output_dir,
        "chain_of_thought.txt",
        "Chain-of-Thought (all CVs)",
        &prompts::chain_of_thought_prompt(&job_description, &criteria, &cvs),
    )?;

    let mut count = 2;
    for criterion in criteria.criteria() {
        write_prompt(
            &output_dir,
            &format!("criterion_{}_batched.txt", criterion.key),
            &format!("Criterion {} (all CVs)", criterion.name),
            &prompts::batched_criterion_prompt(&job_description, criterion, &cvs),
        )?;
        count += 1;

        for cv in &cvs {
            write_prompt(
                &output_dir,
                &format!("criterion_{}_{}.txt", criterion.key, cv.id.to_lowercase()),
                &format!("Criterion {} / CV {}", criterion.name, cv.id),
                &prompts::criterion_prompt(&job_description, criterion, cv),
            )?;
            count += 1;
        }
    }

    println!("Wrote {} prompt files", count);
    Ok(())
}
