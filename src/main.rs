use rtryon::{logger, TryOnClient, TryOnConfig, TryOnResult};
use std::env;
use std::fs;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    logger::init_with_config(logger::LoggerConfig::development())?;

    if dotenv_loaded {
        log::info!("✅ .env file loaded successfully");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    let args: Vec<String> = env::args().skip(1).collect();
    let (person_url, garment_url) = match args.as_slice() {
        [person, garment, ..] => (person.as_str(), garment.as_str()),
        _ => {
            log::error!("Usage: tryon <person_image_url> <garment_image_url> [output_path]");
            return Ok(ExitCode::from(2));
        }
    };
    let output_path = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| format!("tryon_{}.png", chrono::Utc::now().timestamp()));

    let config = TryOnConfig::from_env();
    logger::log_config_info(&config);
    if !config.has_token() {
        log::warn!("⚠️  HF_TOKEN is not set; the try-on call will fail");
    }

    let client = TryOnClient::new(config);

    log::info!("🔍 Checking model status...");
    let status = client.check_model_status().await;
    if status.available {
        log::info!("✅ Model available: {}", status.status.unwrap_or_default());
    } else {
        log::warn!(
            "⚠️  Shared model unavailable ({}), a private copy may be provisioned",
            status.error.unwrap_or_default()
        );
    }

    log::info!("👕 Running try-on: {} + {}", person_url, garment_url);
    match client.perform_try_on(person_url, garment_url).await {
        TryOnResult::Success {
            image_buffer,
            processing_time,
        } => {
            fs::write(&output_path, &image_buffer)?;
            log::info!(
                "💾 Saved {} bytes to {} ({}ms)",
                image_buffer.len(),
                output_path,
                processing_time
            );
            Ok(ExitCode::SUCCESS)
        }
        TryOnResult::Failure {
            error,
            processing_time,
        } => {
            log::error!("❌ Try-on failed after {}ms: {}", processing_time, error);
            Ok(ExitCode::FAILURE)
        }
    }
}
