use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use vlsi_agent::RagContext;
use vlsi_core::VlsiConfig;

/// Run a VLSI/OpenROAD query end to end (retrieval, model, OpenROAD, model).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Your VLSI or OpenROAD question
    query: String,

    /// Number of passages to retrieve [default: retrieval.top_k]
    #[arg(long)]
    top_k: Option<u64>,

    /// Minimum cosine score [default: retrieval.similarity_threshold]
    #[arg(long = "sim-thresh")]
    sim_thresh: Option<f32>,

    #[arg(short, long, env = "VLSI_CONFIG", default_value = "vlsi-rag.toml")]
    config: String,

    /// Answer only; never run the generated script
    #[arg(long)]
    no_execute: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match VlsiConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let top_k = args.top_k.unwrap_or(config.retrieval.top_k);
    let sim_thresh = args.sim_thresh.unwrap_or(config.retrieval.similarity_threshold);

    let mut ctx = match RagContext::from_config(&config) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Failed to initialise clients: {}", e);
            std::process::exit(1);
        }
    };

    let answer = if args.no_execute {
        ctx.answer_query(&args.query, top_k, sim_thresh).await?
    } else {
        ctx.run_query_and_execute(&args.query, top_k, sim_thresh)
            .await?
    };

    println!("{}", answer);
    Ok(())
}
