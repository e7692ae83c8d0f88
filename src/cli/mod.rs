//! Command-line interface
//!
//! Command handlers for one-shot conversion, the interactive loop, and
//! device listing. Model loading and pipeline execution are synchronous
//! (candle inference plus a blocking refinement call), so the handlers move
//! that work onto `spawn_blocking` instead of the async workers.

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, BufRead, Write};

use crate::generator::{create_generator, GeneratorConfig};
use crate::model::DevicePreference;
use crate::pipeline::{Pipeline, PipelineBuilder};

/// Execute the convert command
pub async fn convert(
    request: String,
    model: String,
    device: String,
    dtype: String,
    max_new_tokens: usize,
    output: Option<String>,
) -> Result<()> {
    tracing::info!("Starting conversion");
    tracing::info!("  Request: {}", request);
    tracing::info!("  Model: {}", model);
    tracing::info!("  Device: {}", device);

    let conversion = tokio::task::spawn_blocking(move || -> Result<_> {
        let pipeline = build_pipeline(&model, &device, &dtype, max_new_tokens)?;
        pipeline.convert_detailed(&request)
    })
    .await
    .context("Conversion task panicked")??;

    println!("\n{}", conversion);

    if let Some(path) = output {
        fs::write(&path, &conversion.sql)
            .context(format!("Failed to write SQL to {}", path))?;
        println!("Saved SQL to {}", path);
    }

    Ok(())
}

/// Execute the repl command
pub async fn repl(
    model: String,
    device: String,
    dtype: String,
    max_new_tokens: usize,
) -> Result<()> {
    tracing::info!("Starting interactive session");
    tracing::info!("  Model: {}", model);

    tokio::task::spawn_blocking(move || -> Result<()> {
        let pipeline = build_pipeline(&model, &device, &dtype, max_new_tokens)?;

        println!("=== Text→SQL CLI ===\n(leave blank to quit)\n");

        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();

        loop {
            print!("Prompt> ");
            io::stdout().flush()?;

            let line = match lines.next() {
                Some(line) => line?,
                None => break,
            };

            let request = line.trim();
            if request.is_empty() {
                break;
            }

            // Conversion errors end the request, not the session
            match pipeline.convert(request) {
                Ok(sql) => println!("\n{}\n", sql),
                Err(e) => println!("[ERROR] {:#}\n", e),
            }
        }

        Ok(())
    })
    .await
    .context("Interactive session task panicked")??;

    Ok(())
}

/// Execute the devices command
pub async fn devices() -> Result<()> {
    crate::model::print_available_devices();
    Ok(())
}

/// Assemble the full pipeline: generator from CLI flags, refiner from the
/// environment
fn build_pipeline(
    model: &str,
    device: &str,
    dtype: &str,
    max_new_tokens: usize,
) -> Result<Pipeline> {
    let device: DevicePreference = device.parse()?;

    let config = GeneratorConfig::new(model)
        .with_device(device)
        .with_dtype(dtype)
        .with_max_new_tokens(max_new_tokens);

    let generator = create_generator(config)?;

    PipelineBuilder::new()
        .generator_boxed(generator)
        .refiner_from_env()
        .build()
}
