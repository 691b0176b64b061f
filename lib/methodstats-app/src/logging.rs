//! Logging.

use anyhow::{anyhow, Context as _};
use bytesize::ByteSize;
use methodstats::GenericError;
use methodstats_config::GenericConfiguration;
use serde::Deserialize;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_rolling_file::RollingFileAppenderBase;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{Layer, MakeWriter},
    layer::{self, SubscriberExt as _},
    registry::LookupSpan,
    util::SubscriberInitExt as _,
    EnvFilter, Layer as _,
};

fn default_log_level() -> LogLevel {
    LevelFilter::INFO.into()
}

const fn default_true() -> bool {
    true
}

const fn default_log_file_max_size() -> ByteSize {
    ByteSize::mib(10)
}

const fn default_log_file_max_rolls() -> usize {
    1
}

/// Logging configuration.
///
/// Read from the top level of the configuration:
///
/// - `log_level`: filtering directives, in `EnvFilter` syntax (default: `info`)
/// - `log_format_json`: whether to emit logs as JSON (default: `false`)
/// - `log_to_console`: whether to emit logs to standard output (default: `true`)
/// - `log_file`: path of a file to also emit logs to (default: none)
/// - `log_file_max_size`: size at which the log file is rolled over (default: `10MiB`)
/// - `log_file_max_rolls`: number of rolled over log files to keep (default: `1`)
#[derive(Deserialize)]
pub struct LoggingConfiguration {
    #[serde(default = "default_log_level")]
    log_level: LogLevel,

    #[serde(default)]
    log_format_json: bool,

    #[serde(default = "default_true")]
    log_to_console: bool,

    #[serde(default)]
    log_file: String,

    #[serde(default = "default_log_file_max_size")]
    log_file_max_size: ByteSize,

    #[serde(default = "default_log_file_max_rolls")]
    log_file_max_rolls: usize,
}

impl LoggingConfiguration {
    /// Creates a new `LoggingConfiguration` instance from the given configuration.
    ///
    /// # Errors
    ///
    /// If the configuration cannot be deserialized as `LoggingConfiguration`, an error is returned.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        let logging_config = config.as_typed()?;
        Ok(logging_config)
    }
}

impl Default for LoggingConfiguration {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format_json: false,
            log_to_console: true,
            log_file: String::new(),
            log_file_max_size: default_log_file_max_size(),
            log_file_max_rolls: default_log_file_max_rolls(),
        }
    }
}

#[derive(Deserialize)]
#[serde(try_from = "String")]
struct LogLevel(EnvFilter);

impl LogLevel {
    fn as_env_filter(&self) -> EnvFilter {
        self.0.clone()
    }
}

impl From<LevelFilter> for LogLevel {
    fn from(level: LevelFilter) -> Self {
        Self(EnvFilter::default().add_directive(level.into()))
    }
}

impl TryFrom<String> for LogLevel {
    type Error = GenericError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(anyhow!("Log level cannot be empty."));
        }

        EnvFilter::builder()
            .parse(value)
            .map(Self)
            .context("Failed to parse valid log level.")
    }
}

/// Keeps the logging backends running.
///
/// Must be held until the application is about to shut down, so that pending logs are flushed before exiting.
#[derive(Default)]
pub struct LoggingGuard {
    worker_guards: Vec<WorkerGuard>,
}

impl LoggingGuard {
    fn add_worker_guard(&mut self, guard: WorkerGuard) {
        self.worker_guards.push(guard);
    }
}

/// Initializes the logging subsystem for `tracing`.
///
/// Installs one formatting layer per configured output (console, file), all behind a single level filter.
///
/// # Errors
///
/// If the log file appender can't be built, or if the logging subsystem was already initialized, an error will be returned.
pub fn initialize_logging(config: &LoggingConfiguration) -> Result<LoggingGuard, GenericError> {
    let mut configured_layers = Vec::new();
    let mut logging_guard = LoggingGuard::default();

    if config.log_to_console {
        let (nb_stdout, guard) = tracing_appender::non_blocking(std::io::stdout());
        logging_guard.add_worker_guard(guard);

        configured_layers.push(build_formatting_layer(config, nb_stdout));
    }

    if !config.log_file.is_empty() {
        let appender = build_file_appender(config)?;

        let (nb_file, guard) = tracing_appender::non_blocking(appender);
        logging_guard.add_worker_guard(guard);

        configured_layers.push(build_formatting_layer(config, nb_file));
    }

    // Filter once, in front of the fanout, rather than once per output layer.
    tracing_subscriber::registry()
        .with(configured_layers.with_filter(config.log_level.as_env_filter()))
        .try_init()?;

    Ok(logging_guard)
}

fn build_file_appender(config: &LoggingConfiguration) -> Result<RollingFileAppenderBase, GenericError> {
    RollingFileAppenderBase::builder()
        .filename(config.log_file.clone())
        .max_filecount(config.log_file_max_rolls)
        .condition_max_file_size(config.log_file_max_size.as_u64())
        .build()
        .map_err(|e| anyhow!("Failed to open log file '{}': {}", config.log_file, e))
}

fn build_formatting_layer<S, W>(config: &LoggingConfiguration, writer: W) -> Box<dyn layer::Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    if config.log_format_json {
        Layer::new()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(writer)
            .boxed()
    } else {
        Layer::new()
            .with_target(true)
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    }
}
