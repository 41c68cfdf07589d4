use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const REPORT_EVERY: Duration = Duration::from_secs(5);
const TICK: Duration = Duration::from_millis(200);

#[derive(Default)]
struct Counters {
    stage: Mutex<String>,
    files_done: AtomicUsize,
    files_total: AtomicUsize,
    bytes_done: AtomicU64,
    bytes_total: AtomicU64,
}

impl Counters {
    fn line(&self, elapsed: Duration) -> String {
        let stage = self.stage.lock().map(|s| s.clone()).unwrap_or_default();
        let fd = self.files_done.load(Ordering::Relaxed);
        let ft = self.files_total.load(Ordering::Relaxed);
        let bd = self.bytes_done.load(Ordering::Relaxed);
        let bt = self.bytes_total.load(Ordering::Relaxed);
        let pct = if bt > 0 { bd.saturating_mul(100) / bt } else { 0 };
        let secs = elapsed.as_secs_f64().max(0.001);
        format!(
            "[{:>4}s] {stage} | files {fd}/{ft} | {} / {} ({pct}%) | {}/s",
            elapsed.as_secs(),
            human_bytes(bd),
            human_bytes(bt),
            human_bytes((bd as f64 / secs) as u64)
        )
    }
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit + 1 < UNITS.len() {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{v:.1} {}", UNITS[unit])
    }
}

/// Shared counters for a seal or verify run. When enabled, a background
/// thread prints them to stderr every few seconds between `start` and `stop`.
///
/// Clones share the same counters, so the digest engine and the driver can
/// both feed one reporter.
#[derive(Clone)]
pub struct Progress {
    enabled: bool,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            counters: Arc::default(),
            running: Arc::new(AtomicBool::new(false)),
            worker: Arc::default(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_stage(&self, s: &str) {
        if !self.enabled {
            return;
        }
        if let Ok(mut stage) = self.counters.stage.lock() {
            *stage = s.to_string();
        }
    }

    pub fn set_files_total(&self, n: usize) {
        self.counters.files_total.store(n, Ordering::Relaxed);
    }

    pub fn inc_file(&self) {
        self.counters.files_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_total(&self, n: u64) {
        self.counters.bytes_total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, n: u64) {
        self.counters.bytes_done.fetch_add(n, Ordering::Relaxed);
    }

    /// `(files_done, files_total, bytes_done, bytes_total)`.
    pub fn snapshot(&self) -> (usize, usize, u64, u64) {
        let c = &self.counters;
        (
            c.files_done.load(Ordering::Relaxed),
            c.files_total.load(Ordering::Relaxed),
            c.bytes_done.load(Ordering::Relaxed),
            c.bytes_total.load(Ordering::Relaxed),
        )
    }

    pub fn start(&self) {
        if !self.enabled || self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let counters = self.counters.clone();
        let running = self.running.clone();
        let handle = thread::spawn(move || {
            let t0 = Instant::now();
            let mut last = t0;
            while running.load(Ordering::Relaxed) {
                thread::sleep(TICK);
                if last.elapsed() >= REPORT_EVERY {
                    last = Instant::now();
                    eprintln!("{}", counters.line(t0.elapsed()));
                }
            }
            eprintln!("{}", counters.line(t0.elapsed()));
        });
        if let Ok(mut worker) = self.worker.lock() {
            *worker = Some(handle);
        }
    }

    /// Stop the reporter; it prints one final line before exiting.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let handle = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(h) = handle {
            let _ = h.join();
        }
    }
}
