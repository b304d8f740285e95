//! Output formatting for CLI

use console::style;
use playgate_core::{PlayerEvent, PlayerSnapshot, QualityLevel};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Format output based on selected format
pub fn format_output<T: Serialize>(data: &T, format: &str) -> String {
    match OutputFormat::from(format) {
        OutputFormat::Json => serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Table | OutputFormat::Text => {
            format!("{}", serde_json::to_value(data).unwrap_or_default())
        }
    }
}

pub fn table<T: Tabled>(rows: Vec<T>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
pub struct LevelRow {
    #[tabled(rename = "#")]
    pub index: usize,
    #[tabled(rename = "Resolution")]
    pub resolution: String,
    #[tabled(rename = "Bitrate")]
    pub bitrate: String,
    #[tabled(rename = "Access")]
    pub access: String,
}

impl LevelRow {
    pub fn new(level: &QualityLevel, cap: Option<u32>, capped: Option<usize>) -> Self {
        let access = match cap {
            Some(c) if level.height > c => "upgrade".to_string(),
            Some(_) if capped == Some(level.index) => "ceiling".to_string(),
            _ => "open".to_string(),
        };
        Self {
            index: level.index,
            resolution: format!("{} ({})", level.resolution(), level.label()),
            bitrate: format!("{:.2} Mbps", level.bitrate as f64 / 1_000_000.0),
            access,
        }
    }
}

#[derive(Tabled)]
pub struct EventRow {
    #[tabled(rename = "At")]
    pub at: String,
    #[tabled(rename = "Event")]
    pub event: String,
}

impl EventRow {
    pub fn new(at_ms: f64, event: &PlayerEvent) -> Self {
        Self {
            at: format!("{:.1}s", at_ms / 1000.0),
            event: describe(event),
        }
    }
}

#[derive(Tabled, Serialize)]
pub struct FloorRow {
    #[tabled(rename = "Asset")]
    pub asset: String,
    #[tabled(rename = "Seconds")]
    pub seconds: String,
}

/// One-line description of a player event
pub fn describe(event: &PlayerEvent) -> String {
    match event {
        PlayerEvent::Ready => "ready".to_string(),
        PlayerEvent::Error { message } => format!("error: {}", message),
        PlayerEvent::PreviewStart { limit_seconds, remaining_seconds, remaining_today } => {
            let mut line = format!("preview started, {:.0}s of {:.0}s left", remaining_seconds, limit_seconds);
            if let Some(today) = remaining_today {
                line.push_str(&format!(" ({} free plays left today)", today));
            }
            line
        }
        PlayerEvent::GateLocked { reason, effective_elapsed, upgrade_href, .. } => {
            let mut line = format!("{} ({:?} after {:.1}s)", style("LOCKED").red().bold(), reason, effective_elapsed);
            if let Some(href) = upgrade_href {
                line.push_str(&format!(", upgrade at {}", href));
            }
            line
        }
        PlayerEvent::RedirectScheduled { href, delay_ms } => {
            format!("redirect to {} in {}ms", href, delay_ms)
        }
        PlayerEvent::Redirect { href } => format!("{} {}", style("redirect").yellow(), href),
        PlayerEvent::Unlocked => style("unlocked").green().to_string(),
        PlayerEvent::StateChange { from, to } => format!("state {} -> {}", from, to),
        PlayerEvent::QualityChange { index, height } => format!("quality level {} ({}p)", index, height),
        PlayerEvent::Buffering { active } => {
            if *active { "buffering".to_string() } else { "buffering done".to_string() }
        }
        PlayerEvent::ControlsVisibility { visible } => {
            if *visible { "controls shown".to_string() } else { "controls hidden".to_string() }
        }
    }
}

/// Closing summary of a simulation
pub fn print_summary(snapshot: &PlayerSnapshot) {
    println!();
    println!("Final state: {}", snapshot.state);
    println!("  Position:  {:.1}s", snapshot.position);
    if let Some(elapsed) = snapshot.effective_elapsed {
        println!("  Preview used: {:.1}s", elapsed);
    }
    if let Some(remaining) = snapshot.remaining_seconds {
        println!("  Preview left: {:.1}s", remaining);
    }
    let status = if snapshot.locked {
        style("locked").red().to_string()
    } else if snapshot.gate_armed {
        style("previewing").yellow().to_string()
    } else {
        style("unrestricted").green().to_string()
    };
    println!("  Access: {}", status);
}
