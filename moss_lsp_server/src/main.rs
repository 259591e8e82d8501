mod convert;
mod dispatch;
mod lsp_ext;
mod method;
mod notifications;
mod options;
mod queries;
mod queue;
mod server;
mod typecheck;


use crate::options::LspOptions;
use crate::server::LspLoop;
use lsp_server::Connection;
use moss_core::GlobalState;
use std::error::Error;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

fn setup_stderr_logging() -> anyhow::Result<()> {
    let stderr_log_level = tracing_subscriber::filter::LevelFilter::DEBUG;
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(
            stderr_layer
                .with_ansi(false)
                .without_time()
                .with_file(true)
                .with_line_number(true)
                .with_filter(stderr_log_level),
        )
        .try_init()?;

    Ok(())
}

fn main() -> Result<(), Box<dyn Error + Sync + Send>> {
    setup_stderr_logging()?;

    // transport; stdout carries the protocol, logging stays on stderr
    let (connection, io_threads) = Connection::stdio();

    tracing::info!("server is starting up");
    let server = LspLoop::new(connection.sender.clone(), LspOptions::default());
    let final_gs = server.run(connection.receiver.clone(), GlobalState::new());
    drop(final_gs);
    drop(connection);

    io_threads.join()?;
    tracing::info!("shutting down server");

    Ok(())
}
