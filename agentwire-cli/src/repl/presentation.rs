//! Streamed output for the terminal

use agentwire_core::event::{
    CustomEvent, RunError, StepStarted, TextMessageContent, TextMessageEnd, TextMessageStart,
    ToolCallEnd, ToolCallResult,
};
use agentwire_core::run::normalize_line_breaks;
use agentwire_core::subscriber::{EventContext, RunSubscriber};
use agentwire_core::CustomSignal;
use std::io::{stdout, Write};

const BOX_WIDTH: usize = 80;

/// Subscriber that prints a run as it streams
///
/// Text deltas are written as they arrive. Tool calls are printed once their
/// arguments are complete.
#[derive(Debug, Default)]
pub struct PresentationSubscriber {
    in_text: bool,
}

impl PresentationSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    fn close_text(&mut self) {
        if self.in_text {
            println!("\n");
            self.in_text = false;
        }
    }
}

impl RunSubscriber for PresentationSubscriber {
    fn on_text_message_start(&mut self, _event: &TextMessageStart, _ctx: &EventContext<'_>) {
        println!();
        self.in_text = true;
    }

    fn on_text_message_content(&mut self, event: &TextMessageContent, _ctx: &EventContext<'_>) {
        print!("{}", normalize_line_breaks(&event.delta));
        let _ = stdout().flush();
    }

    fn on_text_message_end(&mut self, _event: &TextMessageEnd, _ctx: &EventContext<'_>) {
        self.close_text();
    }

    fn on_tool_call_end(&mut self, event: &ToolCallEnd, ctx: &EventContext<'_>) {
        self.close_text();
        if let Some(call) = ctx.run.tool_call(&event.tool_call_id) {
            print_tool_header(&call.name);
            if let Some(args) = format_tool_args(call.args()) {
                for line in args.lines() {
                    println!("│  {}", line);
                }
            }
            print_tool_footer(&call.name);
        }
    }

    fn on_tool_call_result(&mut self, event: &ToolCallResult, ctx: &EventContext<'_>) {
        self.close_text();
        let name = ctx
            .run
            .tool_call(&event.tool_call_id)
            .map_or(event.tool_call_id.as_str(), |call| call.name.as_str());
        println!("\x1b[2m{} result\x1b[0m", name);
        if event.content.is_empty() {
            println!("{}", indent_lines("(no output)"));
        } else {
            println!("{}", indent_lines(&event.content.display()));
        }
    }

    fn on_step_started(&mut self, event: &StepStarted, _ctx: &EventContext<'_>) {
        if let Some(name) = &event.step_name {
            println!("{}", dim_text(&format!("▸ {}", name)));
        }
    }

    fn on_custom(&mut self, event: &CustomEvent, _ctx: &EventContext<'_>) {
        self.close_text();
        if let Some(output) = format_custom(&CustomSignal::classify(event)) {
            println!("{}", output);
        }
    }

    fn on_run_error(&mut self, event: &RunError, _ctx: &EventContext<'_>) {
        self.close_text();
        eprintln!("\n❌ Error: {}\n", event.message);
    }
}

/// Pretty-print tool arguments. Non-JSON arguments are shown as sent.
fn format_tool_args(args: &str) -> Option<String> {
    if args.trim().is_empty() {
        return None;
    }
    let formatted = serde_json::from_str::<serde_json::Value>(args)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| args.to_string());
    Some(formatted)
}

fn format_custom(signal: &CustomSignal) -> Option<String> {
    match signal {
        CustomSignal::Instructions(text) => Some(format!(
            "{}\n{}",
            dim_text("📋 Instructions"),
            dim_text(&indent_lines(text))
        )),
        CustomSignal::Attachments(files) if files.is_empty() => None,
        CustomSignal::Attachments(files) => Some(
            files
                .keys()
                .map(|filename| format!("📎 {}", filename))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        CustomSignal::DeferredToolRequests(requests) if requests.is_empty() => None,
        CustomSignal::DeferredToolRequests(requests) => Some(format!(
            "\x1b[33m⏸  {} tool call(s) need approval\x1b[0m",
            requests.len()
        )),
        CustomSignal::Other { name, value } => {
            Some(dim_text(&format!("• {}: {}", name, value.compact())))
        }
    }
}

fn dim_text(text: &str) -> String {
    format!("\x1b[2m{}\x1b[0m", text)
}

/// Print tool header: ┌─ 🛠️  name ───...───┐
pub fn print_tool_header(name: &str) {
    let prefix = format!("┌─ 🛠️  {} ", name);
    let prefix_display_len = 6 + name.len() + 1; // ┌─ + space + emoji(2) + 2 spaces + name + space
    let fill = BOX_WIDTH.saturating_sub(prefix_display_len + 1);
    println!("\n{}{}┐", prefix, "─".repeat(fill));
    println!("│");
}

/// Print tool footer: └───...─── name ─┘
pub fn print_tool_footer(name: &str) {
    println!("│");
    let suffix = format!(" {} ─┘", name);
    let fill = BOX_WIDTH.saturating_sub(suffix.chars().count() + 1);
    println!("└{}{}", "─".repeat(fill), suffix);
}

pub fn indent_lines(text: &str) -> String {
    let mut lines = text.lines();
    let Some(first) = lines.next() else {
        return String::new();
    };
    let mut output = format!("  └ {}", first);
    for line in lines {
        output.push_str(&format!("\n    {}", line));
    }
    output
}
