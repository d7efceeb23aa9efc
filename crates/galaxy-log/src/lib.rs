//! Structured logging for the galaxy renderer.
//!
//! Installs a `tracing` subscriber with console output and, in debug builds,
//! a JSON log file. Library crates emit through `log`; those records are
//! bridged into the same subscriber.
//!
//! Logging comes up before the config is read. The returned [`LogHandle`]
//! then applies the config's level and file logging to the live subscriber.

use galaxy_config::Config;
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

/// Filter used when neither `RUST_LOG` nor the config names a level.
pub const DEFAULT_FILTER: &str = "info,wgpu=warn,naga=warn";

/// Name of the JSON log file written into `log_dir`.
pub const LOG_FILE_NAME: &str = "galaxy.log";

type Filtered = Layered<reload::Layer<EnvFilter, Registry>, Registry>;
type FileLayer = Box<dyn Layer<Filtered> + Send + Sync>;

/// Pick the filter string: the config's `debug.log_level` when set, the
/// default otherwise.
pub fn filter_directive(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.is_empty() => {
            format!("{},wgpu=warn,naga=warn", config.debug.log_level)
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Adjusts the installed subscriber once the config is known.
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    file: reload::Handle<Option<FileLayer>, Filtered>,
    log_dir: Option<PathBuf>,
    env_override: bool,
}

impl LogHandle {
    /// Switch to the config's log level (unless `RUST_LOG` is set) and start
    /// the log file if `debug.file_logging` asks for it.
    pub fn apply_config(&self, config: &Config) {
        if !self.env_override {
            match EnvFilter::try_new(filter_directive(Some(config))) {
                Ok(filter) => {
                    if let Err(err) = self.filter.reload(filter) {
                        tracing::warn!("Could not apply configured log level: {err}");
                    }
                }
                Err(err) => {
                    tracing::warn!("Ignoring log level {:?}: {err}", config.debug.log_level);
                }
            }
        }
        if config.debug.file_logging {
            self.enable_file_log();
        }
    }

    /// Whether records are currently written to [`LOG_FILE_NAME`].
    pub fn file_logging(&self) -> bool {
        self.file
            .with_current(|layer| layer.is_some())
            .unwrap_or(false)
    }

    fn enable_file_log(&self) {
        let Some(log_dir) = &self.log_dir else {
            return;
        };
        if self.file_logging() {
            return;
        }
        let log_file = match std::fs::create_dir_all(log_dir)
            .and_then(|()| std::fs::File::create(log_dir.join(LOG_FILE_NAME)))
        {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!("Could not open log file in {}: {err}", log_dir.display());
                return;
            }
        };
        let layer: FileLayer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json()
            .boxed();
        if let Err(err) = self.file.reload(Some(layer)) {
            tracing::warn!("Could not start file logging: {err}");
        }
    }
}

fn build_subscriber(
    log_dir: Option<&Path>,
    env_filter: Option<EnvFilter>,
) -> (impl Subscriber + for<'a> LookupSpan<'a> + Send + Sync + 'static, LogHandle) {
    let env_override = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER)));
    let (file, file_handle) = reload::Layer::new(None::<FileLayer>);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file)
        .with(console_layer);
    let handle = LogHandle {
        filter: filter_handle,
        file: file_handle,
        log_dir: log_dir.map(Path::to_path_buf),
        env_override,
    };
    (subscriber, handle)
}

/// Initialize the global tracing subscriber at [`DEFAULT_FILTER`].
///
/// `RUST_LOG` takes precedence over everything. When `debug_build` is set and
/// `log_dir` can be created, records are also written as JSON to
/// [`LOG_FILE_NAME`]. Call [`LogHandle::apply_config`] once the config loads.
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool) -> LogHandle {
    let (subscriber, handle) =
        build_subscriber(log_dir, EnvFilter::try_from_default_env().ok());
    subscriber.init();
    if debug_build {
        handle.enable_file_log();
    }
    handle
}
