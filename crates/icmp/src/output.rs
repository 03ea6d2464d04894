use std::fmt::Write as _;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use icmp_frame::Frame;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    frame_type: &'a str,
    msg_id: u8,
    target: u8,
    length: usize,
    payload: String,
    payload_hex: String,
    timestamp: String,
}

#[derive(Serialize)]
struct WireOutput<'a> {
    frame_type: &'a str,
    msg_id: u8,
    target: u8,
    length: usize,
    wire_len: usize,
    wire_hex: String,
}

pub fn print_frame(frame: &Frame, format: OutputFormat) {
    let payload = frame.payload();
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                frame_type: frame.frame_type.name(),
                msg_id: frame.msg_id,
                target: frame.target,
                length: payload.len(),
                payload: payload_preview(payload),
                payload_hex: to_hex(payload),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "MSG ID", "TARGET", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    frame.frame_type.name().to_string(),
                    frame.msg_id.to_string(),
                    frame.target.to_string(),
                    payload.len().to_string(),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} msg_id={} target={} size={} payload={}",
                frame.frame_type,
                frame.msg_id,
                frame.target,
                payload.len(),
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => {
            print_raw(payload);
        }
    }
}

pub fn print_wire(frame: &Frame, wire: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = WireOutput {
                frame_type: frame.frame_type.name(),
                msg_id: frame.msg_id,
                target: frame.target,
                length: frame.payload().len(),
                wire_len: wire.len(),
                wire_hex: to_hex(wire),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "MSG ID", "TARGET", "WIRE"])
                .add_row(vec![
                    frame.frame_type.name().to_string(),
                    frame.msg_id.to_string(),
                    frame.target.to_string(),
                    to_hex(wire),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", to_hex(wire)),
        OutputFormat::Raw => print_raw(wire),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Parse hex, ignoring whitespace, `:` separators and a leading `0x`.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<u8> = trimmed
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits ({})", digits.len()));
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            let hi = hex_value(pair[0]);
            let lo = hex_value(pair[1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
                _ => Err(format!(
                    "invalid hex digits '{}{}'",
                    pair[0] as char, pair[1] as char
                )),
            }
        })
        .collect()
}

fn hex_value(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|v| v as u8)
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
