use std::path::Path;

use tracing_core::{Level, LevelFilter};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, Layer};

/// Log file written next to the checkpoint.
pub const LOG_FILE: &str = "experiment.log";

/// If a global tracing subscriber is not already configured, log to the console and to
/// `file_path`, and add a panic hook reporting panics as fatal errors.
///
/// Records emitted through the `log` facade are forwarded to the subscriber.
pub fn install_logger(file_path: &str) {
    let path = Path::new(file_path);
    let writer = tracing_appender::rolling::never(
        path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new(".")),
        path.file_name().unwrap_or_else(|| LOG_FILE.as_ref()),
    );

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(LevelFilter::INFO)
        .with_filter(filter_fn(quiet_wgpu));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(LevelFilter::INFO)
        .with_filter(filter_fn(quiet_wgpu));

    if registry().with(file_layer).with(console_layer).try_init().is_ok() {
        update_panic_hook(file_path);
    }
}

// The wgpu crate is logging too much, so we skip `info` level.
fn quiet_wgpu(metadata: &tracing_core::Metadata<'_>) -> bool {
    match metadata.module_path() {
        Some(path) => !(path.starts_with("wgpu") && *metadata.level() >= Level::INFO),
        None => true,
    }
}

fn update_panic_hook(file_path: &str) {
    let hook = std::panic::take_hook();
    let file_path = file_path.to_owned();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {info}");
        eprintln!(
            "=== PANIC ===\nA fatal error happened, you can check the run logs here => \
             '{file_path}'\n============="
        );
        hook(info);
    }));
}
