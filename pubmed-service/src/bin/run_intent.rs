//! Runs one request through the full pipeline without the HTTP layer and
//! prints the resulting envelope.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use pubmed_flow::{Feature, IntentParams, RequestIntent, TokioProcessInvoker, Upload};
use pubmed_service::ServiceConfig;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FeatureArg {
    Search,
    AdvancedSearch,
    Details,
    Translate,
    Download,
    Resolve,
}

impl From<FeatureArg> for Feature {
    fn from(arg: FeatureArg) -> Self {
        match arg {
            FeatureArg::Search => Feature::Search,
            FeatureArg::AdvancedSearch => Feature::AdvancedSearch,
            FeatureArg::Details => Feature::Details,
            FeatureArg::Translate => Feature::Translate,
            FeatureArg::Download => Feature::Download,
            FeatureArg::Resolve => Feature::Resolve,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "run_intent", about = "Run a single PubMed request from the command line")]
struct Args {
    #[arg(value_enum)]
    feature: FeatureArg,
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    journal: Option<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    year: Option<String>,
    #[arg(long)]
    keyword: Option<String>,
    #[arg(long)]
    pmid: Option<String>,
    #[arg(long = "target-lang")]
    target_lang: Option<String>,
    #[arg(long)]
    text: Option<String>,
    /// File to translate.
    #[arg(long)]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    let config = ServiceConfig::from_env()?;
    let runner = config.build_runner(Arc::new(TokioProcessInvoker::new()))?;

    let upload = match &args.file {
        Some(path) => Some(Upload {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string()),
            bytes: tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?,
        }),
        None => None,
    };

    let params = IntentParams {
        query: args.query,
        journal: args.journal,
        author: args.author,
        year: args.year,
        keyword: args.keyword,
        pmid: args.pmid,
        target_language: args.target_lang,
        text: args.text,
        upload,
    };

    let normalized = runner
        .run(RequestIntent::new(args.feature.into(), params))
        .await;

    println!("{}", normalized.status);
    println!("{}", serde_json::to_string_pretty(&normalized.envelope)?);

    if !normalized.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
