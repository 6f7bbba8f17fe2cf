use std::{fs::File, net::SocketAddr, path::PathBuf, sync::Mutex, time::Duration};

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, Level, Metadata};
use tracing_subscriber::{
    filter,
    fmt::{format::FmtSpan, writer::BoxMakeWriter},
    prelude::*,
};
use vimscript_dap::BridgeConfig;

#[derive(Parser, Debug)]
#[command(name = "vimscript-dap", version, about)]
struct BridgeOptions {
    /// Address the Vim hook connects to.
    #[arg(long, default_value = "127.0.0.1:8765")]
    listen: SocketAddr,

    /// Seconds to wait for the hook after launch/attach.
    #[arg(long, default_value_t = 20)]
    handshake_timeout: u64,

    /// Seconds to wait for each hook reply.
    #[arg(long, default_value_t = 10)]
    request_timeout: u64,

    /// Log here instead of stderr. Stdout is never an option: it carries
    /// the DAP stream.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

type ProgramResult = Result<(), Exit>;

#[derive(Debug)]
enum Exit {
    LogFile,
    Bind,
    EditorIo,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ProgramResult {
    let options = BridgeOptions::parse();
    init_logger(options.log_file.as_ref())?;

    let config = BridgeConfig {
        listen: options.listen,
        handshake_timeout: Duration::from_secs(options.handshake_timeout),
        request_timeout: Duration::from_secs(options.request_timeout),
    };
    let listener = TcpListener::bind(config.listen).await.map_err(|err| {
        error!(%err, address = %config.listen, "cannot bind the hook listener");
        Exit::Bind
    })?;
    info!(address = %config.listen, "waiting for the Vim hook");

    vimscript_dap::run(listener, tokio::io::stdin(), tokio::io::stdout(), config)
        .await
        .map_err(|err| {
            error!(%err, "editor stream failed");
            Exit::EditorIo
        })
}

fn init_logger(log_file: Option<&PathBuf>) -> Result<(), Exit> {
    let writer = match log_file {
        Some(path) => {
            let file = File::create(path).map_err(|_| Exit::LogFile)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let console_log = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_span_events(FmtSpan::ENTER)
        .compact()
        .with_filter(filter::filter_fn(level_for("vimscript_dap", Level::DEBUG)));
    tracing_subscriber::registry().with(console_log).init();
    Ok(())
}

fn level_for(module: &'static str, level: Level) -> impl Fn(&Metadata) -> bool {
    move |metadata| {
        if metadata
            .module_path()
            .is_some_and(|path| path.starts_with(module))
        {
            metadata.level() <= &level
        } else {
            metadata.level() <= &Level::WARN
        }
    }
}
