//! Structured logging with sensitive data redaction.
//!
//! - JSON output in production, pretty output in development
//! - Per-module levels, plus a separate level for the `security` target so
//!   access denials stay visible when everything else is quiet
//! - Redaction of credentials, bearer tokens, database URLs and caller
//!   phone numbers before internal error detail reaches a log line

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Log target used for security events.
pub const SECURITY_TARGET: &str = "security";

static REDACTOR: OnceLock<SensitiveFieldRedactor> = OnceLock::new();

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Level for the `security` target
    #[serde(default = "default_security_level")]
    pub security_level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Per-module log levels
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    /// Include file and line
    #[serde(default = "default_true")]
    pub include_location: bool,

    #[serde(default)]
    pub include_thread: bool,

    /// Emit an event when a span closes (carries its duration)
    #[serde(default)]
    pub span_close_events: bool,

    #[serde(default)]
    pub redaction: RedactionConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            security_level: default_security_level(),
            format: LogFormat::default(),
            module_levels: HashMap::new(),
            include_location: true,
            include_thread: false,
            span_close_events: false,
            redaction: RedactionConfig::default(),
        }
    }
}

impl LoggingConfig {
    /// Build the filter: global level, the security target, then module
    /// overrides.
    pub fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)?
            .add_directive(format!("{}={}", SECURITY_TARGET, self.security_level).parse()?);
        for (module, level) in &self.module_levels {
            filter = filter.add_directive(format!("{}={}", module, level).parse()?);
        }
        Ok(filter)
    }

    /// Development gets pretty output unless a non-default format is set.
    pub fn effective_format(&self, environment: &str) -> LogFormat {
        if environment == "development" && self.format == LogFormat::Json {
            LogFormat::Pretty
        } else {
            self.format
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redaction
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for sensitive data redaction.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_redaction_patterns")]
    pub patterns: Vec<RedactionPattern>,

    #[serde(default = "default_redaction_replacement")]
    pub replacement: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: default_redaction_patterns(),
            replacement: default_redaction_replacement(),
        }
    }
}

/// Field names (case-insensitive substring match) and an optional value
/// regex identifying one kind of sensitive data.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactionPattern {
    pub name: String,

    #[serde(default)]
    pub field_names: Vec<String>,

    #[serde(default)]
    pub value_pattern: Option<String>,
}

/// Built-in patterns: name, field names, value regex.
const BUILTIN_PATTERNS: &[(&str, &[&str], Option<&str>)] = &[
    ("secrets", &["password", "passwd", "secret", "credential"], None),
    (
        "tokens",
        &["token", "bearer", "jwt", "authorization"],
        Some(r"eyJ[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+"),
    ),
    (
        "database_urls",
        &["database_url"],
        Some(r"postgres(?:ql)?://[^\s:@/]+:[^\s@]+@[^\s/]+"),
    ),
    (
        "phone_numbers",
        &["phone_number", "caller_id"],
        Some(r"\+\d{10,15}\b"),
    ),
];

/// Redactor for sensitive values in log output.
#[derive(Debug, Clone)]
pub struct SensitiveFieldRedactor {
    field_names: Vec<String>,
    value_regexes: Vec<regex::Regex>,
    replacement: String,
    enabled: bool,
}

impl SensitiveFieldRedactor {
    /// Invalid regexes are skipped.
    pub fn new(config: &RedactionConfig) -> Self {
        let field_names = config
            .patterns
            .iter()
            .flat_map(|p| p.field_names.iter().map(|f| f.to_lowercase()))
            .collect();
        let value_regexes = config
            .patterns
            .iter()
            .filter_map(|p| p.value_pattern.as_deref())
            .filter_map(|pat| regex::Regex::new(pat).ok())
            .collect();

        Self {
            field_names,
            value_regexes,
            replacement: config.replacement.clone(),
            enabled: config.enabled,
        }
    }

    pub fn should_redact_field(&self, field_name: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let lower = field_name.to_lowercase();
        self.field_names.iter().any(|f| lower.contains(f.as_str()))
    }

    /// Replace every value-pattern match inside `value`.
    pub fn redact_value(&self, value: &str) -> String {
        if !self.enabled {
            return value.to_string();
        }
        self.value_regexes
            .iter()
            .fold(value.to_string(), |acc, re| {
                re.replace_all(&acc, self.replacement.as_str()).into_owned()
            })
    }

    /// Redact by field name first, then by value.
    pub fn redact(&self, field_name: &str, value: &str) -> String {
        if self.should_redact_field(field_name) {
            return self.replacement.clone();
        }
        self.redact_value(value)
    }

    /// The redactor installed by [`init_logging`], or the defaults.
    pub fn global() -> &'static SensitiveFieldRedactor {
        REDACTOR.get_or_init(|| SensitiveFieldRedactor::new(&RedactionConfig::default()))
    }
}

fn default_log_level() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn default_security_level() -> String {
    "warn".to_string()
}

fn default_true() -> bool {
    true
}

fn default_redaction_replacement() -> String {
    "[REDACTED]".to_string()
}

fn default_redaction_patterns() -> Vec<RedactionPattern> {
    BUILTIN_PATTERNS
        .iter()
        .map(|(name, fields, value)| RedactionPattern {
            name: name.to_string(),
            field_names: fields.iter().map(|f| f.to_string()).collect(),
            value_pattern: value.map(str::to_string),
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Subscriber
// ═══════════════════════════════════════════════════════════════════════════════

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer(config: &LoggingConfig, format: LogFormat) -> BoxedLayer {
    let span_events = if config.span_close_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread)
        .with_thread_names(config.include_thread);

    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

/// Initialize the logging subsystem.
///
/// When `tracer` is given, spans are also exported through OpenTelemetry.
///
/// # Errors
///
/// Returns an error if a filter directive is invalid or a global
/// subscriber is already set.
pub fn init_logging(
    config: &LoggingConfig,
    environment: &str,
    tracer: Option<opentelemetry_sdk::trace::Tracer>,
) -> anyhow::Result<()> {
    let _ = REDACTOR.set(SensitiveFieldRedactor::new(&config.redaction));

    let filter = config.env_filter()?;
    let otel_layer = tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t));

    tracing_subscriber::registry()
        .with(fmt_layer(config, config.effective_format(environment)))
        .with(otel_layer)
        .with(filter)
        .try_init()?;

    Ok(())
}
