//! Console progress: cumulative byte counter printed on one rewritten line.

use gdl_core::progress::ProgressSink;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sink side: fetchers bump the counter; a background task renders it.
pub struct ConsoleProgress {
    bytes: AtomicU64,
}

impl ProgressSink for ConsoleProgress {
    fn add(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }
}

/// Handle for the printer task; call `finish` after the download settles to
/// get a final line and a newline.
pub struct Reporter {
    stop: tokio::sync::oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl ConsoleProgress {
    pub fn start() -> (Arc<Self>, Reporter) {
        let sink = Arc::new(ConsoleProgress {
            bytes: AtomicU64::new(0),
        });
        let watched = Arc::clone(&sink);
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut tick = tokio::time::interval(Duration::from_millis(500));
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => print_line(&watched, started),
                    _ = &mut stop_rx => break,
                }
            }
            print_line(&watched, started);
            println!();
        });

        (sink, Reporter { stop: stop_tx, handle })
    }
}

impl Reporter {
    pub async fn finish(self) {
        let _ = self.stop.send(());
        let _ = self.handle.await;
    }
}

fn print_line(sink: &ConsoleProgress, started: Instant) {
    let bytes = sink.bytes.load(Ordering::Relaxed);
    let mib = bytes as f64 / 1_048_576.0;
    let secs = started.elapsed().as_secs_f64();
    let rate = if secs > 0.0 { mib / secs } else { 0.0 };
    print!("\r  {:.1} MiB  {:.2} MiB/s  ", mib, rate);
    let _ = std::io::stdout().flush();
}
