use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use sandbox_runner::server::{self, AppState};
use sandbox_runner::{CodeSandboxTool, Config, SandboxExecutor, SandboxOptions};

const USAGE: &str = "usage: sandbox-runner [serve | run [FILE] | tools]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sandbox_runner=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("serve");

    match command {
        "serve" => serve().await,
        "run" => run_once(args.get(1).map(String::as_str)).await,
        "tools" => {
            let definitions = CodeSandboxTool::definitions();
            println!("{}", serde_json::to_string_pretty(&definitions)?);
            Ok(())
        }
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => anyhow::bail!("unknown command '{}'\n{}", other, USAGE),
    }
}

fn build_executor(config: &Config) -> SandboxExecutor {
    SandboxExecutor::new(config.launcher(), config.executor_settings())
}

async fn serve() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Starting sandbox runner (runtime: {}, image: {}, timeout: {}ms)",
        config.runtime, config.image, config.timeout_ms
    );

    // Launch failures are reported per call, so an unavailable engine is not fatal
    if config.container_launcher().is_available().await {
        info!("Confirmed {} is available", config.runtime);
    } else {
        warn!(
            "{} is not available; executions will fail until it is",
            config.runtime
        );
    }

    let state = AppState {
        tool: CodeSandboxTool::new(build_executor(&config)),
    };
    server::serve(&config.listen_addr, state).await
}

async fn run_once(path: Option<&str>) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let code = match path {
        Some("-") | None => {
            let mut code = String::new();
            tokio::io::stdin()
                .read_to_string(&mut code)
                .await
                .context("Failed to read program from stdin")?;
            code
        }
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read program from {}", path))?,
    };

    let result = build_executor(&config)
        .run(&code, &SandboxOptions::default())
        .await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
