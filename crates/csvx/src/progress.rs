//! 📊 progress.rs: "Are we there yet?" Every pipeline, every time, forever.
//!
//! 🚀 One spinner per object, with a comfy-table message of docs/s, docs, batches and
//! elapsed time. We never know how many rows a CSV holds until we've read it, so
//! there's no bar to fill and no ETA to lie about. Just a spinner and honest numbers.
//!
//! ⚠️ Watching this spinner will not make it go faster. We've tried. Science says no.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
/// "1000000 docs" → "1,000,000 docs". You're welcome, eyes.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, you should probably call your mom. It's been a while.
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 Tracks documents and batches for one object, rendered on an indicatif spinner.
///
/// Uses a sliding 5-second window for the docs/s figure so one slow bulk request
/// doesn't make the rate look like a seismograph.
pub(crate) struct ProgressMetrics {
    /// 🏷️ the object key, shown above the numbers
    source_name: String,
    total_docs: u64,
    total_batches: u64,
    progress_bar: ProgressBar,
    /// 🔄 sliding window of (timestamp, docs)
    rate_samples: VecDeque<(Instant, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("ProgressMetrics")
            .field("source_name", &self.source_name)
            .field("total_docs", &self.total_docs)
            .field("total_batches", &self.total_batches)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 Spin up a spinner. `visible: false` gives a hidden bar that swallows every
    /// update, so callers never have to ask.
    pub(crate) fn new(source_name: String, visible: bool) -> Self {
        let progress_bar = if visible {
            let the_bar = ProgressBar::new_spinner();
            the_bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            the_bar.enable_steady_tick(Duration::from_millis(120));
            the_bar
        } else {
            ProgressBar::hidden()
        };

        let start_time = Instant::now();
        // 🔄 seed the window with t=0 so we don't divide by zero like animals
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64));

        Self {
            source_name,
            total_docs: 0,
            total_batches: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    /// 🔄 Book a submitted batch and re-render.
    pub(crate) fn update(&mut self, docs: u64, batches: u64) {
        self.total_docs += docs;
        self.total_batches += batches;
        let the_rate = self.docs_per_sec();
        self.render(the_rate);
    }

    /// ✅ Done. Leave the last frame on screen.
    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }

    fn docs_per_sec(&mut self) -> f64 {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples.push_back((now, self.total_docs));

        match self.rate_samples.front() {
            Some(&(oldest_time, oldest_docs)) => {
                let elapsed = now.duration_since(oldest_time).as_secs_f64();
                if elapsed > 0.0 {
                    self.total_docs.saturating_sub(oldest_docs) as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    fn render(&self, docs_per_sec: f64) {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        table.add_row(vec![
            Cell::new(format!("{} Docs/s", format_number(docs_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} Docs", format_number(self.total_docs)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(self.start_time.elapsed())))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} Batches", format_number(self.total_batches)))
                .set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("object: {}\n{}", self.source_name, table));
    }
}
