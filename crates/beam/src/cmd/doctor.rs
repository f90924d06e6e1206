use std::sync::Arc;
use std::time::{Duration, Instant};

use beam_frame::{Envelope, Message};
use beam_stream::{Dispatcher, ReadStream, RouteOutcome, StreamError, Streamer, StreamerConfig};
use beam_transport::{ConnectionPool, MemoryStore, SharedChannel};
use serde::Serialize;

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::OutputFormat;

const CHECK_TIMEOUT: Duration = Duration::from_secs(2);
const PROBE: &[u8] = b"beam doctor\n";

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Info,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn from_outcome(name: &str, outcome: Result<String, String>) -> Self {
        let (status, detail) = match outcome {
            Ok(detail) => (CheckStatus::Pass, detail),
            Err(detail) => (CheckStatus::Fail, detail),
        };
        Self {
            name: name.to_string(),
            status,
            detail,
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(_args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let checks = vec![
        CheckResult::from_outcome("round_trip", round_trip_check()),
        CheckResult::from_outcome("duplicate_open", duplicate_open_check()),
        CheckResult::from_outcome("unknown_route", unknown_route_check()),
        CheckResult::from_outcome("close_releases_name", close_releases_name_check()),
        CheckResult::from_outcome("ordered_close_all", ordered_close_all_check()),
        compiled_features_check(),
    ];

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let overall = if has_fail { "fail" } else { "pass" };

    let output = DoctorOutput { checks, overall };
    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("beam doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<22} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Info => "INFO",
    }
}

fn memory_channel() -> (MemoryStore, SharedChannel) {
    let store = MemoryStore::new();
    let channel: SharedChannel = Arc::new(ConnectionPool::new(store.clone()));
    (store, channel)
}

fn describe(context: &str, err: StreamError) -> String {
    format!("{context}: {err}")
}

/// Drain a read stream until end-of-stream or the deadline.
fn drain(stream: &ReadStream, deadline: Instant) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(format!("timed out after {} bytes", out.len()));
        }
        match stream.recv_timeout(remaining) {
            Ok(Some(chunk)) => out.extend_from_slice(&chunk),
            Ok(None) => continue,
            Err(StreamError::Closed(_)) => return Ok(out),
            Err(err) => return Err(describe("read failed", err)),
        }
    }
}

fn round_trip_check() -> Result<String, String> {
    let (_store, channel) = memory_channel();
    let key = "beam:doctor";
    let sender = Streamer::with_config(Arc::clone(&channel), StreamerConfig::new(key, "-"));
    let receiver = Arc::new(Streamer::with_config(
        Arc::clone(&channel),
        StreamerConfig::new("-", key).with_poll_interval(Duration::from_millis(10)),
    ));

    let inbound = receiver
        .open_read("doctor")
        .map_err(|err| describe("open read", err))?;
    let dispatcher = Dispatcher::new(Arc::clone(&receiver), channel)
        .spawn()
        .map_err(|err| describe("start dispatcher", err))?;

    let sent = sender
        .copy_into("doctor", &mut &PROBE[..])
        .map_err(|err| describe("copy into stream", err))?;
    sender
        .close("doctor")
        .map_err(|err| describe("close write stream", err))?;

    let received = drain(&inbound, Instant::now() + CHECK_TIMEOUT);
    dispatcher
        .stop()
        .map_err(|err| describe("dispatcher", err))?;
    let received = received?;

    if received != PROBE {
        return Err(format!(
            "payload mismatch: sent {sent} bytes, received {}",
            received.len()
        ));
    }
    Ok(format!("{sent} bytes crossed two streamers"))
}

fn duplicate_open_check() -> Result<String, String> {
    let (_store, channel) = memory_channel();
    let streamer = Streamer::new(channel);
    streamer
        .open_read("dup")
        .map_err(|err| describe("first open", err))?;

    match streamer.open_write("dup") {
        Err(StreamError::AlreadyOpen(_)) => Ok("second open rejected".to_string()),
        Ok(_) => Err("second open of the same name succeeded".to_string()),
        Err(err) => Err(describe("unexpected error", err)),
    }
}

fn unknown_route_check() -> Result<String, String> {
    let (_store, channel) = memory_channel();
    let streamer = Streamer::new(channel);
    let message = Message::new("nobody", PROBE)
        .map_err(|err| format!("build message: {err}"))?;

    let started = Instant::now();
    let outcome = streamer.route_message(&message);
    let elapsed = started.elapsed();

    match outcome {
        RouteOutcome::Dropped if streamer.stats().dropped == 1 => {
            Ok(format!("dropped in {}us", elapsed.as_micros()))
        }
        RouteOutcome::Dropped => Err("drop was not counted".to_string()),
        RouteOutcome::Delivered => Err("message for unknown name was delivered".to_string()),
    }
}

fn close_releases_name_check() -> Result<String, String> {
    let (_store, channel) = memory_channel();
    let streamer = Streamer::new(channel);

    streamer
        .open_write("reuse")
        .map_err(|err| describe("open", err))?;
    streamer
        .close("reuse")
        .map_err(|err| describe("close", err))?;
    streamer
        .open_read("reuse")
        .map_err(|err| describe("reopen", err))?;
    Ok("name reusable after close".to_string())
}

fn ordered_close_all_check() -> Result<String, String> {
    let (store, channel) = memory_channel();
    let streamer = Streamer::new(Arc::clone(&channel));
    for name in ["c", "a", "b"] {
        streamer
            .open_write(name)
            .map_err(|err| describe("open", err))?;
    }
    streamer
        .close_all()
        .map_err(|err| describe("close_all", err))?;

    let key = streamer.config().write_key.as_str();
    let mut order = Vec::new();
    while store.queued(key) > 0 {
        let payload = channel
            .receive(key, CHECK_TIMEOUT)
            .map_err(|err| format!("receive: {err}"))?
            .ok_or_else(|| "end-of-stream envelope missing".to_string())?;
        let envelope = Envelope::from_payload(payload, &streamer.config().frame)
            .map_err(|err| format!("decode: {err}"))?;
        order.push(envelope.name().to_string());
    }

    if order != ["a", "b", "c"] {
        return Err(format!("closed in order {order:?}"));
    }
    Ok("closed a, b, c".to_string())
}

fn compiled_features_check() -> CheckResult {
    let mut features = Vec::new();
    if cfg!(feature = "cli") {
        features.push("cli");
    }

    CheckResult {
        name: "compiled_features".to_string(),
        status: CheckStatus::Info,
        detail: features.join(", "),
    }
}
