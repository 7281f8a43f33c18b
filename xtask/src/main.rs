use anyhow::{bail, Result};
use cardwise_core::{
    telemetry, ClientContext, ClientSettings, Credentials, FileStorage, Method, MockReply,
    MockTransport, Route,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Cardwise")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a lightweight smoke test of the client core against a scripted backend.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

fn scripted_backend() -> MockTransport {
    let transport = MockTransport::new();
    transport
        .route(
            Method::POST,
            "/auth/login",
            MockReply::ok(json!({
                "access_token": "smoke-token",
                "user": {"id": 7, "username": "smoke"}
            })),
        )
        .route(
            Method::GET,
            "/cards",
            MockReply::ok(json!([{"id": 1, "name": "Smoke Card", "bank": "Test Bank"}])),
        )
        .route(
            Method::POST,
            "/chat",
            MockReply::ok(json!({"response": "pong", "status": "success"})),
        )
        .route(Method::GET, "/auth/me", MockReply::detail(401, "Token has expired"));
    transport
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    let temp_dir = TempDir::new()?;
    let settings = ClientSettings {
        data_dir: Some(temp_dir.path().to_path_buf()),
        ..ClientSettings::default()
    };
    let storage = Arc::new(FileStorage::open(&settings.storage_dir())?);
    let (context, mut events) =
        ClientContext::with_transport(settings, Arc::new(scripted_backend()), storage);

    if !runtime.block_on(context.login(&Credentials::new("smoke", "smoke"))) {
        bail!("smoke login failed");
    }
    let cards = runtime.block_on(context.cards().list())?;
    runtime.block_on(context.conversation().send_message("ping from xtask"));
    info!(
        "cards" = cards.len(),
        "messages" = context.conversation().messages().len(),
        "smoke test conversation finished"
    );

    runtime.block_on(context.auth().get_user_info());
    if context.auth().is_authenticated() || context.navigator().current() != Route::Login {
        bail!("expired credential did not sign the client out");
    }

    let mut received = 0;
    while events.try_recv().is_ok() {
        received += 1;
    }
    info!("events" = received, "smoke test session events drained");

    Ok(())
}
