//! Two streamers sharing one in-memory store, moving three named streams.
//!
//! Run with:
//!   cargo run --example pipe

use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;

use beam::stream::{Dispatcher, Streamer, StreamerConfig};
use beam::transport::{ConnectionPool, MemoryStore, SharedChannel};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::new();
    let channel: SharedChannel = Arc::new(ConnectionPool::new(store.clone()));

    let sender = Streamer::with_config(Arc::clone(&channel), StreamerConfig::new("pipe", "-"));
    let receiver = Arc::new(Streamer::with_config(
        Arc::clone(&channel),
        StreamerConfig::new("-", "pipe"),
    ));

    let names = ["alpha", "beta", "gamma"];
    let readers: Vec<_> = names
        .iter()
        .map(|name| {
            let stream = receiver.open_read(name)?;
            Ok(thread::spawn(move || {
                let mut text = String::new();
                (&stream).read_to_string(&mut text).map(|_| (stream, text))
            }))
        })
        .collect::<Result<_, beam::StreamError>>()?;

    let dispatcher = Dispatcher::new(Arc::clone(&receiver), channel).spawn()?;

    for name in names {
        let mut stream = sender.open_write(name)?;
        writeln!(stream, "hello from {name}")?;
    }
    sender.close_all()?;

    for reader in readers {
        let (stream, text) = reader.join().map_err(|_| "reader panicked")??;
        eprint!("[{}] {text}", stream.name());
    }

    dispatcher.stop()?;
    receiver.close_all()?;
    eprintln!("{:?}", receiver.stats());
    Ok(())
}
