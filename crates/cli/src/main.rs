mod args;
mod backend;
mod session;

use std::io;

use anyhow::{Context, Result};
use cean_comm::BackendComm;
use cean_form::{DatasetForm, FormContext, FormSetup, TimerQueue};
use cean_util::FormConfig;
use clap::Parser;
use tokio::io::{AsyncBufRead, BufReader};

use crate::args::{Cli, Command, SessionArgs};
use crate::session::{Session, StopReason};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    init_tracing(&config);

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Session(args) => {
            // The form is single-threaded; everything runs on this thread.
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("building runtime")?;
            runtime.block_on(run_session(args, config))
        }
    }
}

/// Logs go to stderr; stdout carries the snapshot stream.
fn init_tracing(config: &FormConfig) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|filter| !filter.trim().is_empty())
        .or_else(|| config.log_filter.clone())
        .unwrap_or_else(|| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

async fn run_session(args: SessionArgs, config: FormConfig) -> Result<()> {
    let setup = match &args.setup {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading setup {}", path.display()))?;
            serde_json::from_str::<FormSetup>(&text).with_context(|| format!("parsing setup {}", path.display()))?
        }
        None => FormSetup::default(),
    };

    let events: Box<dyn AsyncBufRead + Unpin> = match &args.events {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening events {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let (mut backend, stdout, transport) = backend::spawn(&args.backend, &args.backend_args)?;
    let ctx = FormContext::new(BackendComm::new(transport), TimerQueue::new(), config);
    let form = DatasetForm::standard(ctx, setup).context("building the dataset form")?;

    let mut session = Session::new(form, io::stdout().lock());
    let input_done = backend.take_input_done();
    let reason = session.run(Some(events), stdout, input_done).await;
    session.finish();
    backend.shutdown().await?;

    if reason? == StopReason::Interrupted {
        tracing::info!("interrupted");
    }
    Ok(())
}
