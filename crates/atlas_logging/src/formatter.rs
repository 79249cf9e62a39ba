use std::fmt::{self, Write as _};

use chrono::{DateTime, Local};
use nu_ansi_term::Color;
use serde::Deserialize;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::level::Level;

const CONSOLE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// A log event flattened into the fields the formatters print.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub target: &'static str,
    pub file: &'static str,
    pub module: &'static str,
    pub line: u32,
    pub message: String,
}

impl LogRecord {
    pub fn from_event(event: &Event<'_>, timestamp: DateTime<Local>) -> Self {
        let metadata = event.metadata();

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        Self {
            timestamp,
            level: Level::from(metadata.level()),
            target: metadata.target(),
            file: metadata.file().map(file_name).unwrap_or("<unknown>"),
            module: metadata.module_path().unwrap_or("<unknown>"),
            line: metadata.line().unwrap_or(0),
            message: visitor.finish(),
        }
    }

    // name:[file:module:line]
    fn location(&self) -> String {
        format!(
            "{}:[{}:{}:{}]",
            self.target, self.file, self.module, self.line
        )
    }

    fn painted_location(&self) -> String {
        format!(
            "{}:[{}:{}:{}]",
            Color::Blue.paint(self.target),
            self.file,
            self.module,
            Color::Blue.paint(self.line.to_string())
        )
    }
}

fn file_name(path: &'static str) -> &'static str {
    path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(path)
}

// Collects the `message` field plus any structured fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(mut self) -> String {
        if self.message.is_empty() {
            return self.fields.trim_start().to_string();
        }
        self.message.push_str(&self.fields);
        self.message
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// How the level-based formatter decorates one severity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelStyle {
    pub color: Color,
    pub with_location: bool,
}

/// Console template for `level`; `None` selects the plain fallback.
pub fn level_style(level: Level) -> Option<LevelStyle> {
    match level {
        Level::Debug => Some(LevelStyle {
            color: Color::Cyan,
            with_location: true,
        }),
        Level::Info => Some(LevelStyle {
            color: Color::Green,
            with_location: false,
        }),
        Level::Error => Some(LevelStyle {
            color: Color::Red,
            with_location: true,
        }),
        Level::Trace | Level::Warn => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formatter {
    /// Colored console output whose layout depends on the severity.
    LevelBased,
    /// `timestamp: LEVEL name:[file:module:line] message` on one line.
    Default,
    /// Same header as `Default`, message on the next line.
    Database,
}

impl Formatter {
    pub fn render(&self, record: &LogRecord) -> String {
        match self {
            Formatter::LevelBased => render_level_based(record),
            Formatter::Default => format!(
                "{}: {} {} {}",
                record.timestamp.format(FILE_TIME_FORMAT),
                record.level,
                record.location(),
                record.message
            ),
            Formatter::Database => format!(
                "{}: {} {}\n{}",
                record.timestamp.format(FILE_TIME_FORMAT),
                record.level,
                record.location(),
                record.message
            ),
        }
    }
}

fn render_level_based(record: &LogRecord) -> String {
    let timestamp = record.timestamp.format(CONSOLE_TIME_FORMAT).to_string();

    let Some(style) = level_style(record.level) else {
        return format!("{}:{} {}", timestamp, record.level, record.message);
    };

    let mut line = format!(
        "{}: {}",
        Color::Green.dimmed().paint(timestamp),
        style.color.paint(record.level.as_str())
    );
    if style.with_location {
        line.push(' ');
        line.push_str(&record.painted_location());
    }
    line.push(' ');
    line.push_str(&record.message);
    line
}

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let record = LogRecord::from_event(event, Local::now());
        writeln!(writer, "{}", self.render(&record))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(level: Level) -> LogRecord {
        LogRecord {
            timestamp: Local.with_ymd_and_hms(2024, 5, 17, 9, 30, 5).unwrap(),
            level,
            target: "api",
            file: "users.rs",
            module: "atlas_app::users",
            line: 42,
            message: "user created".to_string(),
        }
    }

    #[test]
    fn debug_and_error_show_the_source_location() {
        for level in [Level::Debug, Level::Error] {
            let line = Formatter::LevelBased.render(&record(level));

            assert!(line.contains(level.as_str()));
            assert!(line.contains("users.rs:atlas_app::users:"));
            assert!(line.contains("42"));
            assert!(line.ends_with(" user created"));
        }
    }

    #[test]
    fn info_never_shows_the_source_location() {
        let line = Formatter::LevelBased.render(&record(Level::Info));

        assert!(line.contains("INFO"));
        assert!(!line.contains("users.rs"));
        assert!(!line.contains("api"));
        assert!(line.ends_with(" user created"));
    }

    #[test]
    fn level_labels_are_colored_per_severity() {
        let debug = Formatter::LevelBased.render(&record(Level::Debug));
        let info = Formatter::LevelBased.render(&record(Level::Info));
        let error = Formatter::LevelBased.render(&record(Level::Error));

        assert!(debug.contains(&Color::Cyan.paint("DEBUG").to_string()));
        assert!(info.contains(&Color::Green.paint("INFO").to_string()));
        assert!(error.contains(&Color::Red.paint("ERROR").to_string()));
        assert!(debug.starts_with(
            &Color::Green
                .dimmed()
                .paint("2024-05-17 09:30:05")
                .to_string()
        ));
        assert!(debug.contains(&Color::Blue.paint("api").to_string()));
    }

    #[test]
    fn level_label_is_followed_by_a_single_space() {
        let info = Formatter::LevelBased.render(&record(Level::Info));
        let debug = Formatter::LevelBased.render(&record(Level::Debug));

        let label = Color::Green.paint("INFO").to_string();
        assert!(info.ends_with(&format!("{} user created", label)));

        let label = Color::Cyan.paint("DEBUG").to_string();
        let location = Color::Blue.paint("api").to_string();
        assert!(debug.contains(&format!("{} {}", label, location)));
    }

    #[test]
    fn other_levels_fall_back_to_the_plain_template() {
        for level in [Level::Warn, Level::Trace] {
            let line = Formatter::LevelBased.render(&record(level));

            assert_eq!(
                line,
                format!("2024-05-17 09:30:05:{} user created", level.as_str())
            );
        }
    }

    #[test]
    fn level_style_is_defined_for_debug_info_and_error_only() {
        assert_eq!(level_style(Level::Trace), None);
        assert_eq!(level_style(Level::Warn), None);
        assert!(level_style(Level::Debug).unwrap().with_location);
        assert!(!level_style(Level::Info).unwrap().with_location);
        assert!(level_style(Level::Error).unwrap().with_location);
    }

    #[test]
    fn default_format_is_a_single_uncolored_line() {
        let line = Formatter::Default.render(&record(Level::Info));

        assert_eq!(
            line,
            "2024-05-17 09:30:05,000: INFO api:[users.rs:atlas_app::users:42] user created"
        );
    }

    #[test]
    fn database_format_puts_the_message_on_its_own_line() {
        let line = Formatter::Database.render(&record(Level::Debug));

        assert_eq!(
            line,
            "2024-05-17 09:30:05,000: DEBUG api:[users.rs:atlas_app::users:42]\nuser created"
        );
    }

    #[test]
    fn file_name_strips_directories() {
        assert_eq!(file_name("crates/atlas_app/src/main.rs"), "main.rs");
        assert_eq!(file_name("main.rs"), "main.rs");
    }
}
