//! `fern`-based logging setup. The teacher's `main.rs` threads a
//! `(log_level, log_file, log_file_level)` triple through its `Args` to a
//! `setup_logging` call; this crate keeps that shape but builds the
//! dispatcher directly with `fern` + `humantime` instead of the heavier
//! `tracing`/`opentelemetry` stack, which is disproportionate for a library.

use std::path::Path;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;

pub fn setup_logging(
    console_level: log::LevelFilter,
    log_file: Option<&Path>,
    log_file_level: log::LevelFilter,
) -> Result<()> {
    let plain_format = |out: fern::FormatCallback, message: &std::fmt::Arguments, record: &log::Record| {
        out.finish(format_args!(
            "[{} {} {}] {}",
            humantime::format_rfc3339_seconds(std::time::SystemTime::now()),
            record.level(),
            record.target(),
            message
        ))
    };

    let console = fern::Dispatch::new()
        .level(console_level)
        .format(|out, message, record| {
            let colors = fern::colors::ColoredLevelConfig::new();
            out.finish(format_args!(
                "[{} {}] {}",
                humantime::format_rfc3339_seconds(std::time::SystemTime::now()),
                colors.color(record.level()),
                message
            ))
        })
        .chain(std::io::stderr());

    let mut dispatch = fern::Dispatch::new().chain(console);

    if let Some(path) = log_file {
        let file = fern::log_file(path)
            .wrap_err_with(|| format!("failed to open log file: {}", path.display()))?;
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .level(log_file_level)
                .format(plain_format)
                .chain(file),
        );
    }

    dispatch.apply().wrap_err("failed to install logger")?;
    Ok(())
}
