use std::io::IsTerminal;

use beam_stream::{Direction, StreamInfo};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
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

/// Summary of one loopback run.
#[derive(Debug, Serialize)]
pub struct LoopbackReport {
    pub stream: String,
    pub key: String,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub routed: u64,
    pub dropped: u64,
    pub malformed: u64,
    pub cancelled: bool,
    pub open_streams: Vec<StreamInfo>,
}

/// Print a loopback summary to stderr. Stdout carries the stream bytes.
pub fn print_report(report: &LoopbackReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            eprintln!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "STREAM", "KEY", "WRITTEN", "READ", "ROUTED", "DROPPED", "MALFORMED",
                ])
                .add_row(vec![
                    report.stream.clone(),
                    report.key.clone(),
                    report.bytes_written.to_string(),
                    report.bytes_read.to_string(),
                    report.routed.to_string(),
                    report.dropped.to_string(),
                    report.malformed.to_string(),
                ]);
            eprintln!("{table}");
            if report.cancelled {
                eprintln!("cancelled: all streams closed");
            }
        }
        OutputFormat::Pretty => {
            eprintln!(
                "stream={} key={} written={} read={} routed={} dropped={} malformed={} cancelled={} open=[{}]",
                report.stream,
                report.key,
                report.bytes_written,
                report.bytes_read,
                report.routed,
                report.dropped,
                report.malformed,
                report.cancelled,
                describe_streams(&report.open_streams),
            );
        }
        OutputFormat::Raw => {}
    }
}

fn describe_streams(streams: &[StreamInfo]) -> String {
    streams
        .iter()
        .map(|info| format!("{}:{}", info.name, direction_text(info.direction)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn direction_text(direction: Direction) -> &'static str {
    match direction {
        Direction::Read => "r",
        Direction::Write => "w",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_stream_directions() {
        let report = LoopbackReport {
            stream: "logs".to_string(),
            key: "beam:out".to_string(),
            bytes_written: 6,
            bytes_read: 6,
            routed: 1,
            dropped: 0,
            malformed: 0,
            cancelled: false,
            open_streams: vec![StreamInfo {
                name: "logs".to_string(),
                direction: Direction::Read,
            }],
        };
        let json = serde_json::to_string(&report).expect("report should serialize");
        assert!(json.contains("\"bytes_read\":6"));
        assert!(json.contains("\"direction\":\"read\""));
    }

    #[test]
    fn streams_are_described_compactly() {
        let streams = vec![
            StreamInfo {
                name: "a".to_string(),
                direction: Direction::Read,
            },
            StreamInfo {
                name: "b".to_string(),
                direction: Direction::Write,
            },
        ];
        assert_eq!(describe_streams(&streams), "a:r, b:w");
    }
}
