use flume::Sender;
use parking_lot::{Mutex, RwLock};
use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use bytes::Bytes;
use chrono::Local;

use crate::{
    error::is_fatal_io,
    protocol::{
        format::{DisplayOptions, FrameRenderer},
        frame::FrameAccumulator,
        runtime::{Counters, RuntimeEvent, SharedLink, MAX_CONSECUTIVE_ERRORS},
    },
};

pub const IDLE_SLEEP: Duration = Duration::from_millis(10);
const READ_CHUNK: usize = 4096;

/// Everything the reader thread shares with its session.
pub struct ReaderContext {
    pub link: SharedLink,
    pub running: Arc<AtomicBool>,
    /// Set when the session stopped waiting; the reader must close the link.
    pub orphaned: Arc<AtomicBool>,
    pub counters: Arc<Counters>,
    pub accumulator: Arc<Mutex<FrameAccumulator>>,
    pub options: Arc<RwLock<DisplayOptions>>,
    pub events: Sender<RuntimeEvent>,
}

/// Boot the serial receive loop.
/// Must be started in a separate thread, it only returns once the running
/// flag is cleared or the link failed for good. `exit` fires on return.
pub fn boot_serial_loop(ctx: ReaderContext, exit: oneshot::Sender<()>) {
    let mut renderer = FrameRenderer::new();
    let mut consecutive_errors = 0u32;
    let mut buf = vec![0u8; READ_CHUNK];

    while ctx.running.load(Ordering::Acquire) {
        match read_available(&ctx.link, &mut buf) {
            Ok(0) => {
                let frame = ctx.accumulator.lock().poll(Instant::now());
                if let Some(frame) = frame {
                    dispatch_frame(&ctx, &mut renderer, frame);
                }
                thread::sleep(IDLE_SLEEP);
            }
            Ok(n) => {
                consecutive_errors = 0;
                if !ctx.running.load(Ordering::Acquire) {
                    break;
                }
                let rx = ctx.counters.add_rx(n as u64);
                let _ = ctx.events.send(RuntimeEvent::Counters {
                    rx,
                    tx: ctx.counters.tx(),
                });
                let frame = ctx.accumulator.lock().push(&buf[..n], Instant::now());
                if let Some(frame) = frame {
                    dispatch_frame(&ctx, &mut renderer, frame);
                }
            }
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                thread::sleep(IDLE_SLEEP);
            }
            Err(err) => {
                consecutive_errors += 1;
                if is_fatal_io(err.kind()) || consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    log::error!("Serial read failed for good after {consecutive_errors} error(s): {err}");
                    ctx.running.store(false, Ordering::Release);
                    let _ = ctx.events.send(RuntimeEvent::Fatal(format!("Read error: {err}")));
                    break;
                }
                log::warn!("Serial read error #{consecutive_errors}: {err}");
                let _ = ctx.events.send(RuntimeEvent::ReadError {
                    message: format!("Read error: {err}"),
                    consecutive: consecutive_errors,
                });
                thread::sleep(IDLE_SLEEP);
            }
        }
    }

    let leftover = ctx.accumulator.lock().flush(Instant::now());
    if let Some(frame) = leftover {
        dispatch_frame(&ctx, &mut renderer, frame);
    }
    if ctx.orphaned.load(Ordering::Acquire) {
        if let Some(mut link) = ctx.link.lock().take() {
            if let Err(err) = link.close() {
                log::warn!("Releasing abandoned link failed: {err}");
            }
        }
    }
    let _ = ctx.events.send(RuntimeEvent::Stopped);
    let _ = exit.send(());
    log::debug!("Serial reader loop exited");
}

/// Read only what the driver reports as buffered, so the link lock is never
/// held across a blocking wait.
fn read_available(link: &SharedLink, buf: &mut [u8]) -> io::Result<usize> {
    let mut guard = link.lock();
    let Some(link) = guard.as_mut() else {
        return Err(io::Error::new(
            io::ErrorKind::NotConnected,
            "serial link already released",
        ));
    };
    let available = link.bytes_to_read()?;
    if available == 0 {
        return Ok(0);
    }
    let want = available.min(buf.len());
    link.read(&mut buf[..want])
}

fn dispatch_frame(ctx: &ReaderContext, renderer: &mut FrameRenderer, frame: Bytes) {
    let options = ctx.options.read().clone();
    if let Some(text) = renderer.render(&frame, &options, Local::now()) {
        let _ = ctx.events.send(RuntimeEvent::Frame { text, raw: frame });
    }
}
