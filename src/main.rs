use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use indimap::ai::OpenAiClient;
use indimap::dailymed::DailyMedClient;
use indimap::icd10::Icd10Client;
use indimap::{Config, LabelPipeline, PipelineError};

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let brand_name = match std::env::args().nth(1) {
        Some(name) => name,
        None => {
            eprintln!("usage: indimap <brand name>");
            return ExitCode::from(2);
        }
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut conn = match indimap::db::open_database(&config.database_path) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("database error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let dailymed = DailyMedClient::new(&config.dailymed_base);
    let icd10 = Icd10Client::new(&config.icd10_base);
    let openai = OpenAiClient::new(
        &config.openai_base,
        &config.openai_api_key,
        &config.openai_model,
    );

    let pipeline = LabelPipeline::new(&dailymed, &icd10, &openai);
    match pipeline.process_label(&mut conn, &brand_name) {
        Ok(records) => {
            match serde_json::to_string_pretty(&records) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("failed to serialize output: {e}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e @ PipelineError::NotFound(_)) => {
            eprintln!("{e}");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
