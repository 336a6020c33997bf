//----------------------------------------------------------------------------------------- std lib
use std::io::Write;
use std::time::Instant;
//--------------------------------------------------------------------------------- other libraries
use log::info;
use once_cell::sync::Lazy;

// This will get initialized below.
/// Returns the init [`Instant`]
pub static INIT_INSTANT: Lazy<Instant> = Lazy::new(Instant::now);

/// Returns the seconds since [`INIT_INSTANT`].
pub fn uptime() -> u64 {
    INIT_INSTANT.elapsed().as_secs()
}

//---------------------------------------------------------------------------------------------------- Logger init function
#[allow(clippy::module_name_repetitions)]
/// Initializes the logger.
///
/// Functionality is provided by [`log`] + [`env_logger`].
///
/// The levels are:
/// - ERROR
/// - WARN
/// - INFO
/// - DEBUG
/// - TRACE
///
/// # Panics
/// This must only be called _once_.
pub fn init_logger(filter: log::LevelFilter) {
    // Initialize timer.
    let now = Lazy::force(&INIT_INSTANT);

    // If `RUST_LOG` isn't set, override it and disable all library crate
    // logs except for forever_jukebox and its sub-crates.
    let mut env = String::new();
    #[allow(clippy::option_if_let_else)]
    match std::env::var("RUST_LOG") {
        Ok(e) => {
            std::env::set_var("RUST_LOG", &e);
            env = e;
        }
        _ => std::env::set_var("RUST_LOG", format!("off,forever_jukebox={filter}")),
    }

    env_logger::Builder::new()
        .format(move |buf, record| {
            let mut style = buf.style();
            let level = match record.level() {
                log::Level::Debug => {
                    style.set_color(env_logger::fmt::Color::Blue);
                    "D"
                }
                log::Level::Trace => {
                    style.set_color(env_logger::fmt::Color::Magenta);
                    "T"
                }
                log::Level::Info => {
                    style.set_color(env_logger::fmt::Color::White);
                    "I"
                }
                log::Level::Warn => {
                    style.set_color(env_logger::fmt::Color::Yellow);
                    "W"
                }
                log::Level::Error => {
                    style.set_color(env_logger::fmt::Color::Red);
                    "E"
                }
            };
            writeln!(
                buf,
                "| {} | {: >9.3} | {: >30} @ {: <3} | {}",
                style.set_bold(true).value(level),
                buf.style()
                    .set_dimmed(true)
                    .value(now.elapsed().as_secs_f32()),
                buf.style()
                    .set_dimmed(true)
                    .value(record.file_static().unwrap_or("???")),
                buf.style()
                    .set_dimmed(true)
                    .value(record.line().unwrap_or(0)),
                record.args(),
            )
        })
        .write_style(env_logger::WriteStyle::Always)
        .parse_default_env()
        .init();

    if env.is_empty() {
        info!("Log Level (Flag) ... {}", filter);
    } else {
        info!("Log Level (RUST_LOG) ... {}", env);
    }
}

/// Builds (but does not install) a [`tracing_subscriber`] subscriber for the
/// `#[instrument]` spans on the graph builder and driver hot paths.
///
/// Left uninstalled by default so an embedding application can choose its
/// own layers; `test_utils::init` installs this one for test runs.
pub fn init_tracing() -> impl tracing::Subscriber + Send + Sync {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .finish()
}
