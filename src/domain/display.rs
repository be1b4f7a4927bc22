use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

/// Characters per row on the 16x2 character LCD
pub const ROW_WIDTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DisplayRow {
    /// Balance and live power
    Status,
    /// Last event (relay switching, commands)
    Event,
}

#[cfg_attr(test, mockall::automock)]
pub trait StatusDisplay: Send + Sync {
    fn show(&self, row: DisplayRow, text: &str);
}

/// Row 0 text: remaining balance and live draw.
pub fn status_line(balance_wh: f64, power_w: f64) -> String {
    format!("{:.2}kWh {:.0}W", balance_wh / 1000.0, power_w)
}

/// Display that writes each update to the log.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl StatusDisplay for LogDisplay {
    fn show(&self, row: DisplayRow, text: &str) {
        info!(%row, text, "display");
    }
}

/// Keeps the current text of both rows, truncated like the LCD would.
#[derive(Debug, Default)]
pub struct MemoryDisplay {
    rows: Mutex<[String; 2]>,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(&self, row: DisplayRow) -> String {
        self.rows.lock()[Self::index(row)].clone()
    }

    fn index(row: DisplayRow) -> usize {
        match row {
            DisplayRow::Status => 0,
            DisplayRow::Event => 1,
        }
    }
}

impl StatusDisplay for MemoryDisplay {
    fn show(&self, row: DisplayRow, text: &str) {
        let fitted: String = text.chars().take(ROW_WIDTH).collect();
        self.rows.lock()[Self::index(row)] = fitted;
    }
}
