//! Terminal rendering
//!
//! Everything the REPL prints besides streamed text. Writers are passed in so
//! the session can be driven against an in-memory buffer.

use chrono::Duration;
use std::fmt::Display;
use std::io::{self, Write};

use crate::session::transcript::TranscriptStats;
use crate::storage::history::RecordSummary;
use crate::types::message::Turn;
use crate::types::model::ModelInfo;

/// Context usage above which `/stats` warns
const CONTEXT_WARN_PERCENT: usize = 85;

fn rule(out: &mut dyn Write, ch: char, width: usize) -> io::Result<()> {
    writeln!(out, "{}", ch.to_string().repeat(width))
}

pub fn print_banner(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out)?;
    rule(out, '━', 60)?;
    writeln!(out, "         🤖 lochat · local LLM chat")?;
    rule(out, '━', 60)
}

pub fn print_model_loaded(
    out: &mut dyn Write,
    info: &ModelInfo,
    threads: i32,
    gpu_layers: u32,
) -> io::Result<()> {
    let kv_gb = info.kv_cache_gb();
    let model_gb = info.size_gb();

    writeln!(out, "\n✅ Model loaded: {}", info.name)?;
    rule(out, '━', 60)?;
    writeln!(out, "📊 Context: {} tokens | Threads: {}", info.context_size, threads)?;
    writeln!(
        out,
        "💾 KV Cache: ~{:.1}GB | Model: ~{:.1}GB | Total: ~{:.1}GB",
        kv_gb,
        model_gb,
        kv_gb + model_gb
    )?;
    writeln!(out, "⚡ GPU layers: {gpu_layers}")?;
    if gpu_layers == 0 {
        writeln!(out, "💡 CPU-only mode (use --gpu-layers to offload)")?;
    }
    rule(out, '━', 60)?;
    writeln!(out, "\n💬 Type your message or '/help' for commands")
}

pub fn print_help(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out)?;
    rule(out, '━', 60)?;
    writeln!(out, "Commands:")?;
    writeln!(out, "  /help            - Show this message")?;
    writeln!(out, "  /clear           - Clear chat history")?;
    writeln!(out, "  /save [name]     - Save conversation")?;
    writeln!(out, "  /load <name>     - Resume a saved conversation")?;
    writeln!(out, "  /list            - List saved chats")?;
    writeln!(out, "  /stats           - Show statistics")?;
    writeln!(out, "  /history [n]     - Show the last n turns (default 10)")?;
    writeln!(out, "  /quit            - Exit")?;
    writeln!(out, "Press Ctrl-C while a reply streams to stop it.")?;
    rule(out, '━', 60)
}

pub fn print_error(out: &mut dyn Write, err: &dyn Display) -> io::Result<()> {
    writeln!(out, "❌ {err}")
}

pub fn print_warning(out: &mut dyn Write, message: &str) -> io::Result<()> {
    writeln!(out, "⚠️  {message}")
}

pub fn print_ok(out: &mut dyn Write, message: &str) -> io::Result<()> {
    writeln!(out, "✓ {message}")
}

pub fn print_saved_list(out: &mut dyn Write, records: &[RecordSummary]) -> io::Result<()> {
    if records.is_empty() {
        return writeln!(out, "📭 No saved chats found");
    }

    writeln!(out, "\n💬 Saved chats:")?;
    rule(out, '=', 70)?;
    for (i, record) in records.iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, record.name)?;
        writeln!(
            out,
            "     {} | {} turns | {:.1} KB",
            record.created_at.format("%Y-%m-%d %H:%M:%S %Z"),
            record.turn_count,
            record.size_bytes as f64 / 1024.0
        )?;
    }
    rule(out, '=', 70)
}

/// Session-level facts shown next to the transcript stats
pub struct StatsView<'a> {
    pub stats: &'a TranscriptStats,
    pub system_prompt_tokens: usize,
    pub context_length: u32,
    pub conversation_name: Option<&'a str>,
    pub uptime: Duration,
}

pub fn print_stats(out: &mut dyn Write, view: &StatsView<'_>) -> io::Result<()> {
    let stats = view.stats;
    let with_system = stats.estimated_tokens + view.system_prompt_tokens;

    writeln!(out, "\n📊 Chat Statistics:")?;
    rule(out, '=', 50)?;
    writeln!(out, "  Total turns: {}", stats.total_turns)?;
    writeln!(out, "  User turns: {}", stats.user_turns)?;
    writeln!(out, "  Assistant turns: {}", stats.assistant_turns)?;
    writeln!(out, "  Total characters: {}", stats.total_chars)?;
    writeln!(out, "  Estimated tokens: ~{}", stats.estimated_tokens)?;
    writeln!(out, "  With system prompt: ~{with_system}")?;
    writeln!(out, "  Context limit: {}", view.context_length)?;

    if stats.total_turns > 0 && view.context_length > 0 {
        let usage = (with_system * 100 / view.context_length as usize).min(100);
        writeln!(out, "  Context usage: {usage}%")?;
        if usage > CONTEXT_WARN_PERCENT {
            writeln!(out, "  ⚠️  Warning: approaching context limit!")?;
            writeln!(out, "     Save and start a new chat soon")?;
        }
    }

    writeln!(out, "  Conversation span: {}", format_duration(stats.span))?;
    writeln!(out, "  Session uptime: {}", format_duration(view.uptime))?;
    if let Some(name) = view.conversation_name {
        writeln!(out, "  Saved as: {name}")?;
    }
    rule(out, '=', 50)
}

/// `turns` are the trailing turns of a transcript of `total` turns
pub fn print_history(out: &mut dyn Write, turns: &[Turn], total: usize) -> io::Result<()> {
    if turns.is_empty() {
        return writeln!(out, "📭 No chat history yet.");
    }

    let first_number = total - turns.len() + 1;
    writeln!(out, "\n💬 Chat History (last {} of {}):", turns.len(), total)?;
    rule(out, '=', 70)?;
    for (i, turn) in turns.iter().enumerate() {
        writeln!(
            out,
            "\n{}. {} [{}]:",
            first_number + i,
            turn.role.label(),
            turn.timestamp.format("%H:%M:%S")
        )?;
        for line in turn.text.lines() {
            writeln!(out, "   {line}")?;
        }
    }
    rule(out, '=', 70)
}

/// Compact `1h 02m 03s` / `4m 05s` / `42s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::{Role, CHAT_TIMEZONE};
    use chrono::TimeZone;

    fn render(f: impl FnOnce(&mut dyn Write) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::zero()), "0s");
        assert_eq!(format_duration(Duration::seconds(42)), "42s");
        assert_eq!(format_duration(Duration::seconds(245)), "4m 05s");
        assert_eq!(format_duration(Duration::seconds(3723)), "1h 02m 03s");
        assert_eq!(format_duration(Duration::seconds(-5)), "0s");
    }

    #[test]
    fn test_history_numbers_from_transcript_position() {
        let ts = CHAT_TIMEZONE.with_ymd_and_hms(2026, 5, 2, 8, 15, 0).unwrap();
        let turns = vec![
            Turn::at(Role::User, "fourth", ts),
            Turn::at(Role::Assistant, "fifth\nsecond line", ts),
        ];
        let text = render(|out| print_history(out, &turns, 5));

        assert!(text.contains("4. User [08:15:00]:"));
        assert!(text.contains("5. Assistant [08:15:00]:"));
        assert!(text.contains("   second line"));
    }

    #[test]
    fn test_empty_list_message() {
        let text = render(|out| print_saved_list(out, &[]));
        assert!(text.contains("No saved chats"));
    }

    #[test]
    fn test_stats_warns_near_context_limit() {
        let stats = TranscriptStats {
            total_turns: 2,
            user_turns: 1,
            assistant_turns: 1,
            total_chars: 3600,
            estimated_tokens: 900,
            span: Duration::seconds(3),
        };
        let view = StatsView {
            stats: &stats,
            system_prompt_tokens: 50,
            context_length: 1000,
            conversation_name: Some("notes"),
            uptime: Duration::seconds(70),
        };
        let text = render(|out| print_stats(out, &view));

        assert!(text.contains("Context usage: 95%"));
        assert!(text.contains("approaching context limit"));
        assert!(text.contains("Saved as: notes"));
        assert!(text.contains("Session uptime: 1m 10s"));
    }
}
