use eyre::Result;
use tracing::Subscriber;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{prelude::*, Layer};

/// Logging level. A "higher level" means more will be logged.
#[derive(Default, Debug, Clone, Copy, serde::Deserialize, PartialOrd, Ord, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Level {
    Off = 0,
    Error = 1,
    Warn = 2,
    Debug = 3,
    Trace = 5,
    #[serde(other)]
    #[default]
    Info = 4,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
            Level::Info => LevelFilter::INFO,
        }
    }
}

/// Output format of the log lines.
#[derive(Default, Debug, Clone, Copy, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Style {
    /// Multi-line, human readable
    Pretty,
    Compact,
    /// Newline delimited json, for log aggregation
    Json,
    /// One line per event with the span context
    #[serde(other)]
    #[default]
    Full,
}

impl Style {
    fn layer<S>(self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let layer = tracing_subscriber::fmt::layer();
        match self {
            Style::Pretty => layer.pretty().boxed(),
            Style::Full => layer.boxed(),
            Style::Compact => layer.compact().boxed(),
            Style::Json => layer.json().with_current_span(true).boxed(),
        }
    }
}

/// Configuration for the tracing subscribers used by the keeper
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TracingConfig {
    #[serde(default)]
    pub fmt: Style,
    #[serde(default)]
    pub level: Level,
}

impl TracingConfig {
    /// Attempt to instantiate and register a tracing subscriber setup from
    /// settings.
    pub fn start_tracing(&self) -> Result<()> {
        let mut target_layer = Targets::new().with_default(self.level);
        if self.level < Level::Trace {
            // only show these debug and trace logs at trace level
            target_layer = target_layer.with_target("hyper", Level::Info);
            target_layer = target_layer.with_target("reqwest", Level::Info);
            target_layer = target_layer.with_target("rustls", Level::Info);
            target_layer = target_layer.with_target("redis", Level::Info);
        }
        let err_layer = tracing_error::ErrorLayer::default();

        tracing_subscriber::Registry::default()
            .with(target_layer)
            .with(self.fmt.layer())
            .with(err_layer)
            .try_init()?;
        Ok(())
    }
}
