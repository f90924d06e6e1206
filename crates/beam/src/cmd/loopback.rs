use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use beam_stream::{Dispatcher, Streamer, StreamerConfig};
use beam_transport::{ConnectionPool, MemoryStore, SharedChannel};
use tracing::{info, warn};

use crate::cmd::LoopbackArgs;
use crate::exit::{io_error, stream_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_report, LoopbackReport, OutputFormat};

/// Key nothing publishes under; the unused direction of each streamer.
const IDLE_KEY: &str = "beam:idle";

pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    let channel: SharedChannel = Arc::new(ConnectionPool::new(MemoryStore::new()));
    let poll_interval = Duration::from_millis(args.poll_ms.max(1));

    let sender = Arc::new(Streamer::with_config(
        Arc::clone(&channel),
        StreamerConfig::new(args.key.as_str(), IDLE_KEY),
    ));
    let receiver = Arc::new(Streamer::with_config(
        Arc::clone(&channel),
        StreamerConfig::new(IDLE_KEY, args.key.as_str()).with_poll_interval(poll_interval),
    ));

    let inbound = receiver
        .open_read(&args.name)
        .map_err(|err| stream_error("open read stream failed", err))?;
    let dispatcher = Dispatcher::new(Arc::clone(&receiver), channel)
        .spawn()
        .map_err(|err| stream_error("dispatcher start failed", err))?;

    let cancelled = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(
        Arc::clone(&cancelled),
        Arc::clone(&sender),
        Arc::clone(&receiver),
    )?;

    let writer = {
        let sender = Arc::clone(&sender);
        let receiver = Arc::clone(&receiver);
        let name = args.name.clone();
        thread::Builder::new()
            .name("beam-loopback-stdin".to_string())
            .spawn(move || {
                let result = sender
                    .copy_into(&name, &mut io::stdin().lock())
                    .and_then(|copied| sender.close(&name).map(|()| copied));
                if result.is_err() {
                    // Unblock the stdout side; no end-of-stream will arrive.
                    let _ = receiver.close(&name);
                }
                result
            })
            .map_err(|err| io_error("stdin thread start failed", err))?
    };

    let bytes_read = {
        let mut stdout = io::stdout().lock();
        let copied = io::copy(&mut &inbound, &mut stdout)
            .map_err(|err| io_error("write to stdout failed", err))?;
        stdout
            .flush()
            .map_err(|err| io_error("write to stdout failed", err))?;
        copied
    };

    let cancelled = cancelled.load(Ordering::SeqCst);
    // A cancelled writer may still be blocked on stdin; leave it behind.
    let bytes_written = if cancelled {
        0
    } else {
        writer
            .join()
            .map_err(|_| CliError::new(INTERNAL, "stdin thread panicked"))?
            .map_err(|err| stream_error("copy from stdin failed", err))?
    };

    let malformed = dispatcher.malformed();
    dispatcher
        .stop()
        .map_err(|err| stream_error("dispatcher failed", err))?;
    let open_streams = receiver.stats().streams;
    receiver
        .close_all()
        .map_err(|err| stream_error("close failed", err))?;
    let stats = receiver.stats();

    info!(
        stream = %args.name,
        key = %args.key,
        bytes = bytes_read,
        cancelled,
        "loopback finished"
    );

    print_report(
        &LoopbackReport {
            stream: args.name,
            key: args.key,
            bytes_written,
            bytes_read,
            routed: stats.routed,
            dropped: stats.dropped,
            malformed,
            cancelled,
            open_streams,
        },
        format,
    );

    Ok(SUCCESS)
}

fn install_ctrlc_handler(
    cancelled: Arc<AtomicBool>,
    sender: Arc<Streamer>,
    receiver: Arc<Streamer>,
) -> CliResult<()> {
    ctrlc::set_handler(move || {
        cancelled.store(true, Ordering::SeqCst);
        for streamer in [&sender, &receiver] {
            if let Err(err) = streamer.close_all() {
                warn!(error = %err, "close on interrupt failed");
            }
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
