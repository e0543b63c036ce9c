/// Plain-text presentation of an audit.
use std::fmt::Write as _;

use chrono::{Local, TimeZone};

use crate::model::{AuditResponse, HistoryItem};

const BAR_WIDTH: i64 = 20;

/// The full report as shown on screen and written by `--output`.
pub fn render_report(data: &AuditResponse) -> String {
    let mut out = String::new();
    out.push_str("SHARINGAN ANALYSIS COMPLETE\n");
    out.push_str("===========================\n\n");

    out.push_str("RADAR\n");
    for (label, value) in data.scores.axes() {
        let _ = writeln!(out, "  {label:<13} {} {value:>3}", score_bar(value));
    }
    let overall = data.scores.overall();
    let _ = writeln!(out, "  {:<13} {} {overall:>3}\n", "OVERALL", score_bar(overall));

    if let Some(versus) = &data.versus_report {
        out.push_str("VERSUS ANALYSIS\n---------------\n");
        out.push_str(versus.trim_end());
        out.push_str("\n\n");
    }

    out.push_str(data.markdown_report.trim_end());
    out.push('\n');

    if !data.vision_prompts.is_empty() {
        out.push_str("\nVISION PROMPTS\n--------------\n");
        for (i, prompt) in data.vision_prompts.iter().enumerate() {
            let _ = writeln!(out, "Prompt Sequence // {:02}\n{prompt}\n", i + 1);
        }
    }

    let sources: Vec<_> = data
        .citations
        .iter()
        .filter_map(|c| c.uri.as_deref().map(|uri| (uri, c.title.as_deref())))
        .collect();
    if !sources.is_empty() {
        out.push_str("\nINTELLIGENCE SOURCES\n--------------------\n");
        for (uri, title) in sources {
            let _ = writeln!(out, "- {} <{uri}>", title.unwrap_or(uri));
        }
    }
    out
}

/// One line of `sharingan history`.
pub fn render_history_line(item: &HistoryItem) -> String {
    let date = Local
        .timestamp_millis_opt(item.timestamp)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown date".to_string());
    format!("{}  {date}  {:<9}  {}", item.id, item.mode.label(), item.company)
}

/// Vision prompt by 1-based position, as numbered in the report.
pub fn prompt_text(data: &AuditResponse, number: usize) -> Option<&str> {
    number
        .checked_sub(1)
        .and_then(|i| data.vision_prompts.get(i))
        .map(String::as_str)
}

/// The first `fraction` of `text`'s lines, rounded up so any progress shows something.
pub fn visible_lines(text: &str, fraction: f64) -> usize {
    let total = text.lines().count();
    let shown = (total as f64 * fraction.clamp(0.0, 1.0)).ceil() as usize;
    shown.min(total)
}

fn score_bar(value: i64) -> String {
    let filled = (value.clamp(0, 100) * BAR_WIDTH / 100) as usize;
    format!(
        "[{}{}]",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH as usize - filled)
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{AuditScores, GroundingCitation, ScanMode};

    fn sample(versus: Option<&str>) -> AuditResponse {
        AuditResponse {
            markdown_report: "## 0. Executive summary\nStrong heritage.".to_string(),
            scores: AuditScores {
                aesthetics: 80,
                storytelling: 71,
                authority: 65,
                ux: 90,
                uniqueness: 40,
            },
            vision_prompts: vec!["black marble".to_string(), "gold foil".to_string()],
            versus_report: versus.map(str::to_string),
            citations: vec![
                GroundingCitation {
                    uri: Some("https://acme.example/about".to_string()),
                    title: Some("About Acme".to_string()),
                },
                GroundingCitation {
                    uri: None,
                    title: Some("Untraceable".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_report_sections() {
        let text = render_report(&sample(None));
        assert!(text.contains("AESTHETICS"));
        assert!(text.contains("UX / FLOW"));
        assert!(text.contains("OVERALL"));
        assert!(text.contains(" 69\n"));
        assert!(text.contains("## 0. Executive summary"));
        assert!(text.contains("Prompt Sequence // 01\nblack marble"));
        assert!(text.contains("Prompt Sequence // 02\ngold foil"));
        assert!(!text.contains("VERSUS ANALYSIS"));
    }

    #[test]
    fn test_versus_shown_only_when_present() {
        let text = render_report(&sample(Some("Acme wins on authority.")));
        assert!(text.contains("VERSUS ANALYSIS"));
        assert!(text.contains("Acme wins on authority."));
    }

    #[test]
    fn test_sources_without_uri_are_hidden() {
        let text = render_report(&sample(None));
        assert!(text.contains("- About Acme <https://acme.example/about>"));
        assert!(!text.contains("Untraceable"));

        let mut bare = sample(None);
        bare.citations.retain(|c| c.uri.is_none());
        assert!(!render_report(&bare).contains("INTELLIGENCE SOURCES"));
    }

    #[test]
    fn test_score_bar_tolerates_out_of_range() {
        assert_eq!(score_bar(150), format!("[{}]", "#".repeat(20)));
        assert_eq!(score_bar(-5), format!("[{}]", ".".repeat(20)));
        assert_eq!(score_bar(50), format!("[{}{}]", "#".repeat(10), ".".repeat(10)));
    }

    #[test]
    fn test_prompt_lookup_is_one_based() {
        let data = sample(None);
        assert_eq!(prompt_text(&data, 1), Some("black marble"));
        assert_eq!(prompt_text(&data, 2), Some("gold foil"));
        assert_eq!(prompt_text(&data, 0), None);
        assert_eq!(prompt_text(&data, 3), None);
    }

    #[test]
    fn test_visible_lines() {
        let text = "a\nb\nc\nd";
        assert_eq!(visible_lines(text, 0.0), 0);
        assert_eq!(visible_lines(text, 0.1), 1);
        assert_eq!(visible_lines(text, 0.5), 2);
        assert_eq!(visible_lines(text, 1.0), 4);
        assert_eq!(visible_lines(text, 3.0), 4);
    }

    #[test]
    fn test_history_line() {
        let item = HistoryItem {
            id: "0123456789abcdef0123456789abcdef".to_string(),
            timestamp: 1_700_000_000_000,
            company: "Acme".to_string(),
            mode: ScanMode::Mangekyou,
            data: Arc::new(sample(None)),
        };
        let line = render_history_line(&item);
        assert!(line.starts_with("0123456789abcdef0123456789abcdef  2023-11-"));
        assert!(line.contains("MANGEKYOU"));
        assert!(line.ends_with("Acme"));
    }
}
