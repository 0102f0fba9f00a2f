use std::io;
use std::path::Path;

use clap::CommandFactory;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use isopat_cli::{IsoPat, IsoPatError};

fn make_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy()
}

fn configure_log(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().unwrap_or(path.as_os_str());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(make_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_filter(make_filter()),
        )
        .with(file_layer)
        .init();
    guard
}

fn main() -> Result<(), IsoPatError> {
    let matches = IsoPat::command().get_matches();
    let args = IsoPat::from_layered_matches(&matches)?;
    let _guard = configure_log(args.log_file.as_deref());

    if let Err(e) = args.main() {
        error!("{e}");
        return Err(e);
    }
    Ok(())
}
