use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use text2sql::cli;

#[derive(Parser)]
#[command(name = "text2sql")]
#[command(about = "Convert natural-language requests into SQL with a local model", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a single request into SQL
    Convert {
        /// Natural-language request to convert
        #[arg(short, long)]
        request: String,

        /// Model name or local path
        #[arg(short, long, default_value = "Qwen/Qwen2.5-Coder-0.5B")]
        model: String,

        /// Compute device (auto, cpu, cuda, metal)
        #[arg(long, default_value = "auto")]
        device: String,

        /// Weight dtype (f32, f16, bf16)
        #[arg(long, default_value = "f32")]
        dtype: String,

        /// Generation budget per request
        #[arg(long, default_value = "256")]
        max_new_tokens: usize,

        /// Write the final SQL to this file
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Interactive conversion loop (blank line to quit)
    Repl {
        /// Model name or local path
        #[arg(short, long, default_value = "Qwen/Qwen2.5-Coder-0.5B")]
        model: String,

        /// Compute device (auto, cpu, cuda, metal)
        #[arg(long, default_value = "auto")]
        device: String,

        /// Weight dtype (f32, f16, bf16)
        #[arg(long, default_value = "f32")]
        dtype: String,

        /// Generation budget per request
        #[arg(long, default_value = "256")]
        max_new_tokens: usize,
    },

    /// List available compute devices
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "text2sql=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            request,
            model,
            device,
            dtype,
            max_new_tokens,
            output,
        } => {
            cli::convert(request, model, device, dtype, max_new_tokens, output).await?;
        }

        Commands::Repl {
            model,
            device,
            dtype,
            max_new_tokens,
        } => {
            cli::repl(model, device, dtype, max_new_tokens).await?;
        }

        Commands::Devices => {
            cli::devices().await?;
        }
    }

    Ok(())
}
