use cdm_corpus::config::Settings;
use cdm_corpus::corpus::Corpus;
use cdm_corpus::logging;
use cdm_corpus::persistence::JsonPersistence;
use cdm_corpus::storage::FilesystemAdapter;
use cdm_corpus::types::ValidationStage;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cdmc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resolve and index a Common Data Model corpus")]
struct Cli {
    /// Root directory mounted under the default namespace.
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a document and every document it transitively imports, then
    /// resolve and validate the whole set.
    Index {
        /// Corpus path of the document to load, relative to --root.
        document: String,
    },

    /// Load a manifest-shaped document, then print the relationships
    /// extracted from the entities it declares.
    Relationships {
        /// Corpus path of the manifest document.
        manifest: String,
    },

    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = Settings::load().unwrap_or_else(|e| {
        eprintln!("configuration error: {e}, using defaults");
        Settings::default()
    });
    logging::init_with_config(&config.logging);

    if let Commands::Config = &cli.command {
        match toml::to_string_pretty(&config) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("error displaying config: {e}"),
        }
        return;
    }

    let corpus = Corpus::new(config.default_namespace.clone(), Arc::new(JsonPersistence::new()))
        .with_shallow_validation(config.indexing.shallow_validation);
    corpus
        .registry()
        .mount(&config.default_namespace, Arc::new(FilesystemAdapter::new(&cli.root)));

    match &cli.command {
        Commands::Index { document } => run_index(&corpus, document).await,
        Commands::Relationships { manifest } => run_relationships(&corpus, manifest).await,
        Commands::Config => unreachable!(),
    }
}

async fn run_index(corpus: &Corpus, document: &str) {
    match corpus.load(document).await {
        Ok(failures) => {
            for failure in &failures {
                eprintln!("failed to load: {failure}");
            }
        }
        Err(e) => {
            eprintln!("load error: {e}");
            std::process::exit(1);
        }
    }

    let stage = corpus.resolve_references_and_validate(ValidationStage::Finished);
    println!("validated through {stage:?}");
    println!("{} definitions resolved", corpus.definition_count());
}

async fn run_relationships(corpus: &Corpus, manifest: &str) {
    if let Err(e) = corpus.load(manifest).await {
        eprintln!("load error: {e}");
        std::process::exit(1);
    }
    corpus.resolve_references_and_validate(ValidationStage::Finished);

    if let Err(e) = corpus.calculate_entity_graph(manifest) {
        eprintln!("relationship extraction error: {e}");
        std::process::exit(1);
    }

    for entity in corpus.entity_names() {
        for relationship in corpus.fetch_outgoing_relationships(&entity) {
            println!(
                "{}.{} -> {}.{}",
                relationship.from_entity, relationship.from_attribute, relationship.to_entity, relationship.to_attribute
            );
        }
    }
}
