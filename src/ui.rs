use crate::errors::MirakoError;
use crate::poller::Progress;
use chrono::{DateTime, Local};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use prettytable::format::consts::FORMAT_CLEAN;
use prettytable::{Cell, Row, Table};

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub fn display_error(error: &MirakoError) {
    let error_message = match error {
        MirakoError::Api(api) => api.friendly_message(),
        MirakoError::Authentication(msg) => format!("Authentication Error: {}", msg),
        MirakoError::Config(msg) => format!("Config Error: {}", msg),
        MirakoError::Validation(msg) => format!("Input Error: {}", msg),
        MirakoError::Cancelled(msg) => format!("Cancelled: {}", msg),
        other => other.to_string(),
    };
    eprintln!("{}", format!("❌ {}", error_message).red().bold());
}

/// Spinner line on stdout, advanced one frame per `render` call.
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn new() -> Self {
        let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
        let style = ProgressStyle::default_spinner()
            .tick_strings(SPINNER_FRAMES)
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        Self { pb }
    }
}

impl Default for Spinner {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for Spinner {
    fn render(&mut self, text: &str) {
        self.pb.set_message(text.to_string());
        self.pb.tick();
    }

    fn clear(&mut self) {
        self.pb.finish_and_clear();
    }
}

pub fn print_step(msg: &str) {
    println!("{}", msg);
}

pub fn print_success(msg: &str) {
    println!("{}", format!("✅ {}", msg).green());
}

pub fn print_detail(label: &str, value: &str) {
    println!("   {}: {}", label, value);
}

pub fn print_hint(msg: &str) {
    println!("{}", format!("💡 {}", msg).yellow());
}

/// Formats an RFC 3339 timestamp in local time; returns the input unchanged
/// if it does not parse.
pub fn format_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// prettytable style for a status cell.
pub fn status_style(status: &str) -> &'static str {
    match status.to_lowercase().as_str() {
        "ready" | "completed" | "running" | "active" => "Fg",
        "error" | "failed" | "canceled" | "cancelled" | "timedout" | "timed_out" => "Fr",
        "building" | "processing" | "generating" => "Fy",
        "pending" | "queued" | "in_queue" => "Fb",
        _ => "",
    }
}

/// Column roles decide how cells are styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    Text,
    Status,
    Time,
}

/// Borderless listing table in the style of `gh`.
pub struct Listing {
    table: Table,
    columns: Vec<Column>,
}

impl Listing {
    pub fn new(headers: &[(&str, Column)]) -> Self {
        let mut table = Table::new();
        table.set_format(*FORMAT_CLEAN);
        table.set_titles(Row::new(
            headers
                .iter()
                .map(|(title, _)| Cell::new(&title.to_uppercase()).style_spec("b"))
                .collect(),
        ));
        Self {
            table,
            columns: headers.iter().map(|(_, column)| *column).collect(),
        }
    }

    pub fn add_row(&mut self, values: &[&str]) {
        let cells = values
            .iter()
            .enumerate()
            .map(|(i, value)| match self.columns.get(i) {
                Some(Column::Id) => Cell::new(value).style_spec("Fc"),
                Some(Column::Status) => {
                    Cell::new(&value.to_uppercase()).style_spec(status_style(value))
                }
                Some(Column::Time) => Cell::new(&format_timestamp(value)),
                Some(Column::Text) | None => Cell::new(value),
            })
            .collect();
        self.table.add_row(Row::new(cells));
    }

    pub fn print(&self) {
        self.table.printstd();
    }
}
