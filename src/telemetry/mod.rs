//! Structured rendering for bus/agent events and the error ladder, shared by
//! every [`crate::event_bus::EventSink`], plus process-wide `tracing` setup.

use std::io::IsTerminal;

use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::channels::errors::ErrorEvent;
use crate::event_bus::Event;

/// Installs the process-wide `tracing` subscriber: an `EnvFilter` read from
/// `RUST_LOG` (defaulting to `info`) feeding an ANSI `fmt` layer, with a
/// `tracing-error` [`ErrorLayer`] so `miette`/`thiserror` sources captured
/// via `#[diagnostic]` can attach the active span trace. Call once, near
/// process start; a second call is a no-op error the caller can ignore.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(ErrorLayer::default())
        .try_init();
}

pub const CONTEXT_COLOR: &str = "\x1b[32m"; // green
pub const LINE_COLOR: &str = "\x1b[35m"; // magenta / dark pink
pub const RESET_COLOR: &str = "\x1b[0m";

/// Whether a [`PlainFormatter`] should emit ANSI color codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatterMode {
    /// Emit color only when stderr is a TTY.
    #[default]
    Auto,
    /// Always emit ANSI color codes.
    Colored,
    /// Never emit ANSI color codes (log files, CI).
    Plain,
}

impl FormatterMode {
    fn colors_enabled(self) -> bool {
        match self {
            FormatterMode::Auto => std::io::stderr().is_terminal(),
            FormatterMode::Colored => true,
            FormatterMode::Plain => false,
        }
    }
}

/// Rendered output for a telemetry item that can be consumed by sinks.
#[derive(Clone, Debug, Default)]
pub struct EventRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl EventRender {
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &Event) -> EventRender;
    fn render_errors(&self, errors: &[ErrorEvent]) -> Vec<EventRender>;
}

/// Plain-text formatter with optional ANSI coloring, used by [`crate::event_bus::StdOutSink`]
/// and the error ladder's `pretty_print*` helpers.
pub struct PlainFormatter {
    mode: FormatterMode,
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl PlainFormatter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_mode(FormatterMode::Auto)
    }

    #[must_use]
    pub fn with_mode(mode: FormatterMode) -> Self {
        Self { mode }
    }

    fn color(&self, code: &str) -> &str {
        if self.mode.colors_enabled() { code } else { "" }
    }
}

fn format_error_chain(
    formatter: &PlainFormatter,
    error: &crate::channels::errors::LadderError,
    indent: usize,
) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(cause) = &error.cause {
        let indent_str = "  ".repeat(indent);
        lines.push(format!(
            "{}{}cause: {}{}\n",
            formatter.color(LINE_COLOR),
            indent_str,
            cause.message,
            formatter.color(RESET_COLOR)
        ));
        lines.extend(format_error_chain(formatter, cause, indent + 1));
    }
    lines
}

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> EventRender {
        let line = format!(
            "{}{}{}\n",
            self.color(LINE_COLOR),
            event,
            self.color(RESET_COLOR)
        );
        EventRender {
            context: event.scope_label().map(|s| s.to_string()),
            lines: vec![line],
        }
    }

    fn render_errors(&self, errors: &[ErrorEvent]) -> Vec<EventRender> {
        errors
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let mut lines = Vec::new();
                let scope_str = format!(
                    "{}{:?}{}",
                    self.color(CONTEXT_COLOR),
                    e.scope,
                    self.color(RESET_COLOR)
                );
                lines.push(format!("[{}] {} | {}\n", i, e.when, scope_str));
                lines.push(format!(
                    "{}  error: {}{}\n",
                    self.color(LINE_COLOR),
                    e.error.message,
                    self.color(RESET_COLOR)
                ));
                lines.extend(format_error_chain(self, &e.error, 1));
                if !e.tags.is_empty() {
                    lines.push(format!(
                        "{}  tags: {:?}{}\n",
                        self.color(LINE_COLOR),
                        e.tags,
                        self.color(RESET_COLOR)
                    ));
                }
                if !e.context.is_null() {
                    lines.push(format!(
                        "{}  context: {}{}\n",
                        self.color(LINE_COLOR),
                        e.context,
                        self.color(RESET_COLOR)
                    ));
                }
                EventRender {
                    context: Some(format!("{:?}", e.scope)),
                    lines,
                }
            })
            .collect()
    }
}
