//! Line-oriented rendering of the job board.
//!
//! Each card prints a status line when its label, progress or error changes,
//! followed by whatever output it gained since the last render.

use std::collections::HashMap;

use jobmon_core::{AppViewModel, CardId, JobCardView};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct RenderedCard {
    headline: String,
    output: String,
}

#[derive(Debug, Default)]
pub struct Renderer {
    cards: HashMap<CardId, RenderedCard>,
    notice: Option<String>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lines to print for everything that changed since the
    /// previous call.
    pub fn render(&mut self, view: &AppViewModel) -> Vec<String> {
        let mut lines = Vec::new();

        if view.notice != self.notice {
            if let Some(notice) = &view.notice {
                lines.push(format!("! {notice}"));
            }
            self.notice = view.notice.clone();
        }

        for card in &view.jobs {
            let previous = self.cards.entry(card.card_id).or_default();
            let line = headline(card);
            if line != previous.headline {
                lines.push(line.clone());
                previous.headline = line;
            }

            let fresh = match card.output.strip_prefix(previous.output.as_str()) {
                Some(rest) => rest,
                None => card.output.as_str(),
            };
            lines.extend(
                fresh
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| format!("  | {line}")),
            );
            previous.output.clone_from(&card.output);
        }

        self.cards
            .retain(|card_id, _| view.jobs.iter().any(|card| card.card_id == *card_id));
        lines
    }
}

fn headline(card: &JobCardView) -> String {
    let job = card.job_id.as_deref().unwrap_or("-");
    let mut line = format!(
        "[{}] {} {} {:>3}% {}",
        job,
        card.playbook,
        progress_bar(card.progress),
        card.progress,
        card.status_label
    );
    if !card.hosts.is_empty() {
        line.push_str(&format!(" ({})", card.hosts.join(", ")));
    }
    if let Some(error) = &card.error {
        line.push_str(&format!(" error: {error}"));
    }
    line
}

fn progress_bar(percent: u8) -> String {
    const WIDTH: usize = 20;
    let filled = usize::from(percent.min(100)) * WIDTH / 100;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(WIDTH - filled))
}

/// Summary printed once every job has settled.
pub fn summary(view: &AppViewModel) -> Vec<String> {
    view.jobs
        .iter()
        .map(|card| {
            let job = card.job_id.as_deref().unwrap_or("-");
            let mut line = format!("{job}: {} {}", card.playbook, card.status_label);
            for section in &card.host_outputs {
                let recap = section
                    .output
                    .lines()
                    .rev()
                    .find(|l| l.contains(section.host.as_str()) && l.contains("ok="));
                if let Some(recap) = recap {
                    line.push_str(&format!("\n  {}", recap.trim()));
                }
            }
            line
        })
        .collect()
}
