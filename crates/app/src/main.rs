use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use cv_rag_core::{
    build_report, write_report, AnalysisError, CharacterNgramEmbedder, ChunkingConfig, CvAnalyzer,
    DocumentConverter, Embedder, GeminiEmbedder, GeminiGenerator, Generator, InitOutcome,
    load_documents, LocalConverter, PipelineConfig, PipelineError, ProviderConfig, RagPipeline,
    DEFAULT_REPORT_FILE,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ANALYSIS_TEMPERATURE: f32 = 0.5;

const EXAMPLE_QUERIES: [&str; 6] = [
    "Who has the most experience with Python?",
    "Which candidates have a degree in Computer Science?",
    "Summarize the work experience of each candidate.",
    "Who has worked with cloud platforms such as AWS or GCP?",
    "Which candidate would fit a senior backend engineering role?",
    "List the certifications mentioned in the CVs.",
];

#[derive(Parser)]
#[command(name = "cv-rag", version, about = "Ask questions about a folder of CVs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Folder that contains the CV files.
    #[arg(long, env = "CV_FOLDER", default_value = "cv", global = true)]
    cv_folder: PathBuf,

    /// Directory where the vector index is persisted.
    #[arg(long, env = "CV_INDEX_PATH", default_value = "cv_vector_store", global = true)]
    index_path: PathBuf,

    /// Maximum chunk length in characters.
    #[arg(long, env = "CV_CHUNK_SIZE", default_value = "1000", global = true)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, env = "CV_CHUNK_OVERLAP", default_value = "200", global = true)]
    chunk_overlap: usize,

    /// Number of chunks retrieved per question.
    #[arg(long, env = "CV_TOP_K", default_value = "4", global = true)]
    top_k: usize,

    /// Embed locally with character n-grams instead of the hosted embedding model.
    #[arg(long, default_value_t = false, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Menu driven question answering session.
    Interactive,
    /// Answer a single question and print the cited sources.
    Ask {
        #[arg(long)]
        question: String,
        /// Ignore any persisted index and rebuild it from the CV folder.
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },
    /// Analyze every CV and rank the candidates against job requirements.
    Analyze {
        #[arg(long)]
        job_requirements: Option<String>,
        /// Where the JSON report is written.
        #[arg(long, default_value = DEFAULT_REPORT_FILE)]
        output: PathBuf,
    },
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            cv_folder: self.cv_folder.clone(),
            index_path: self.index_path.clone(),
            chunking: ChunkingConfig {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
            },
            top_k: self.top_k,
            ..PipelineConfig::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        offline = cli.offline,
        "cv-rag boot"
    );

    let provider = ProviderConfig::from_env().context("GOOGLE_API_KEY must be set")?;
    let converter = LocalConverter::from_env();

    if cli.offline {
        run(&cli, converter, CharacterNgramEmbedder::default(), provider)
    } else {
        let embedder = GeminiEmbedder::new(provider.clone());
        run(&cli, converter, embedder, provider)
    }
}

fn run<C, E>(cli: &Cli, converter: C, embedder: E, provider: ProviderConfig) -> anyhow::Result<()>
where
    C: DocumentConverter,
    E: Embedder,
{
    match &cli.command {
        None | Some(Command::Interactive) => {
            let generator = GeminiGenerator::new(provider);
            let pipeline = RagPipeline::new(cli.pipeline_config(), converter, embedder, generator)?;
            interactive(pipeline)
        }
        Some(Command::Ask { question, rebuild }) => {
            let generator = GeminiGenerator::new(provider);
            let mut pipeline =
                RagPipeline::new(cli.pipeline_config(), converter, embedder, generator)?;
            initialize(&mut pipeline, *rebuild)?;
            match pipeline.query(question) {
                Ok(answer) => {
                    println!("{}", answer.text);
                    print_sources(&answer.cited_sources());
                    Ok(())
                }
                Err(failure) => Err(report_failure(failure)),
            }
        }
        Some(Command::Analyze {
            job_requirements,
            output,
        }) => {
            let generator =
                GeminiGenerator::new(provider.with_temperature(ANALYSIS_TEMPERATURE));
            analyze(cli, &converter, generator, job_requirements.as_deref(), output)
        }
    }
}

fn initialize<C, E, G>(pipeline: &mut RagPipeline<C, E, G>, rebuild: bool) -> anyhow::Result<()>
where
    C: DocumentConverter,
    E: Embedder,
    G: Generator,
{
    match pipeline.initialize(rebuild) {
        Ok(InitOutcome::Reused { chunks }) => {
            println!("Loaded existing vector index ({chunks} chunks).");
            Ok(())
        }
        Ok(InitOutcome::Rebuilt {
            documents,
            skipped_files,
            chunks,
        }) => {
            println!("Indexed {documents} documents into {chunks} chunks.");
            if skipped_files > 0 {
                println!("{skipped_files} files could not be read and were skipped.");
            }
            Ok(())
        }
        Err(failure) => Err(report_failure(failure)),
    }
}

fn report_failure(failure: PipelineError) -> anyhow::Error {
    if failure.is_quota_exceeded() {
        print_quota_guidance();
    }
    anyhow::Error::new(failure)
}

fn report_analysis_failure(failure: AnalysisError) -> anyhow::Error {
    if failure.is_quota_exceeded() {
        print_quota_guidance();
    }
    anyhow::Error::new(failure)
}

fn print_quota_guidance() {
    eprintln!("The Gemini API quota is exhausted. To continue:");
    eprintln!("  - wait for the quota window to reset and try again");
    eprintln!("  - check usage at https://aistudio.google.com/");
    eprintln!("  - or run with --offline to embed locally");
}

fn print_sources(sources: &[&str]) {
    if sources.is_empty() {
        println!("\nNo CV content matched this question.");
        return;
    }
    println!("\nSources:");
    for source in sources {
        println!("  - {source}");
    }
}

fn prompt(label: &str) -> io::Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn interactive<C, E, G>(mut pipeline: RagPipeline<C, E, G>) -> anyhow::Result<()>
where
    C: DocumentConverter,
    E: Embedder,
    G: Generator,
{
    println!("CV RAG assistant");
    if let Err(failure) = initialize(&mut pipeline, false) {
        eprintln!("Initialization failed: {failure}");
        eprintln!("Fix the problem and pick option 2 to try again.");
    }

    loop {
        println!();
        println!("1. Ask a question");
        println!("2. Reinitialize the index");
        println!("3. View loaded documents");
        println!("4. Example queries");
        println!("5. Exit");

        let Some(choice) = prompt("Choose an option: ")? else {
            break;
        };

        match choice.as_str() {
            "1" => {
                let Some(question) = prompt("Question: ")? else {
                    break;
                };
                if question.is_empty() {
                    println!("Please enter a question.");
                    continue;
                }
                match pipeline.query(&question) {
                    Ok(answer) => {
                        println!("\n{}", answer.text);
                        print_sources(&answer.cited_sources());
                    }
                    Err(failure) if failure.is_usage_error() => {
                        println!("{failure}. Pick option 2 to initialize the index.");
                    }
                    Err(failure) => {
                        if failure.is_quota_exceeded() {
                            print_quota_guidance();
                        }
                        eprintln!("Query failed: {failure}");
                    }
                }
            }
            "2" => {
                let answer = prompt("Rebuild the index from scratch? (y/n): ")?.unwrap_or_default();
                let rebuild = matches!(answer.to_lowercase().as_str(), "y" | "yes");
                if let Err(failure) = initialize(&mut pipeline, rebuild) {
                    eprintln!("Initialization failed: {failure}");
                }
            }
            "3" => {
                let sources = pipeline.sources();
                if sources.is_empty() {
                    println!("No documents loaded.");
                }
                for (position, source) in sources.iter().enumerate() {
                    println!(
                        "{}. {} ({}, {} characters)",
                        position + 1,
                        source.source_name,
                        source.file_type,
                        source.char_count
                    );
                }
            }
            "4" => {
                for query in EXAMPLE_QUERIES {
                    println!("  - {query}");
                }
            }
            "5" => break,
            other => println!("Unknown option {other:?}, choose 1-5."),
        }
    }

    println!("Goodbye.");
    Ok(())
}

fn analyze<C, G>(
    cli: &Cli,
    converter: &C,
    generator: G,
    job_requirements: Option<&str>,
    output: &Path,
) -> anyhow::Result<()>
where
    C: DocumentConverter,
    G: Generator,
{
    let report = load_documents(&cli.cv_folder, converter);
    if report.documents.is_empty() {
        anyhow::bail!("no CV documents found in {}", cli.cv_folder.display());
    }
    for skipped in &report.skipped_files {
        println!("Skipped {}: {}", skipped.path.display(), skipped.reason);
    }

    let analyzer = CvAnalyzer::new(generator);
    let batch = analyzer
        .collect_candidates(&report.documents)
        .map_err(report_analysis_failure)?;
    for failed in &batch.failed {
        println!("Could not analyze {}: {}", failed.candidate_name, failed.reason);
    }

    if batch.candidates.is_empty() {
        anyhow::bail!("none of the {} CVs could be analyzed", batch.failed.len());
    }

    let rankings = analyzer
        .rank_candidates(&batch.candidates, job_requirements)
        .map_err(report_analysis_failure)?;

    println!("\nCandidate rankings:");
    for ranking in &rankings {
        println!(
            "{}. {} (match {:.0}/100, {})",
            ranking.rank,
            ranking.candidate_name,
            ranking.match_score,
            ranking.recommendation.label()
        );
        if !ranking.key_strengths.is_empty() {
            println!("   strengths: {}", ranking.key_strengths.join(", "));
        }
        println!("   {}", ranking.reasoning);
    }

    let analysis = build_report(batch, rankings, job_requirements);
    match &analysis.best_candidate {
        Some(best) => println!(
            "\nBest candidate: {} (match {:.0}/100)",
            best.candidate_name, best.match_score
        ),
        None => println!("\nNo candidate could be ranked."),
    }

    write_report(&analysis, output)?;
    println!("Report written to {}", output.display());
    Ok(())
}
