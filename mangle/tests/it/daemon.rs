use std::{sync::Arc, time::Duration};

use tokio::{
    io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines},
    task::JoinHandle,
};

use mangle::{
    Direction, Driver, DriverError, DriverOptions, DriverStats, Engine, EngineOptions, MemBinder, MemHub,
    ShutdownReport,
};

const TIMEOUT: Duration = Duration::from_secs(2);

/// A driver running on in-memory links, controlled over in-memory pipes.
pub struct Daemon {
    pub hub: MemHub,
    pub stats: Arc<DriverStats>,
    control: DuplexStream,
    replies: Lines<BufReader<DuplexStream>>,
    driver: JoinHandle<Result<ShutdownReport, DriverError>>,
}

impl Daemon {
    pub fn start() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        let _ = tracing_subscriber::fmt::try_init();

        let driver_options = DriverOptions::default().frame_queue(64);
        let (tx, rx) = driver_options.frame_channel();
        let binder = MemBinder::new(tx);
        let hub = binder.hub();

        let (control, control_rx) = duplex(64 * 1024);
        let (replies_tx, replies) = duplex(64 * 1024);

        let driver = Driver::with_options(
            Engine::with_options(binder, options),
            rx,
            control_rx,
            replies_tx,
            driver_options,
        );
        let stats = driver.stats();

        Self { hub, stats, control, replies: BufReader::new(replies).lines(), driver: tokio::spawn(driver) }
    }

    /// Writes control lines without waiting for replies.
    pub async fn send(&mut self, lines: &str) {
        self.control.write_all(lines.as_bytes()).await.unwrap();
        if !lines.ends_with('\n') {
            self.control.write_all(b"\n").await.unwrap();
        }
    }

    /// Reads the next reply line.
    pub async fn reply(&mut self) -> String {
        tokio::time::timeout(TIMEOUT, self.replies.next_line())
            .await
            .expect("timed out waiting for a reply")
            .unwrap()
            .expect("reply stream ended")
    }

    /// Discards the next `n` replies.
    pub async fn skip(&mut self, n: usize) {
        for _ in 0..n {
            self.reply().await;
        }
    }

    /// Sends one command and returns its single reply.
    pub async fn command(&mut self, line: &str) -> String {
        self.send(line).await;
        self.reply().await
    }

    /// Sends one command and returns `n` replies.
    pub async fn show(&mut self, line: &str, n: usize) -> Vec<String> {
        self.send(line).await;
        let mut replies = Vec::with_capacity(n);
        for _ in 0..n {
            replies.push(self.reply().await);
        }
        replies
    }

    /// Injects an ingress frame and waits until the driver has dispatched it.
    pub async fn inject(&self, iface: &str, frame: &[u8]) {
        self.inject_as(iface, Direction::Ingress, frame).await;
    }

    pub async fn inject_as(&self, iface: &str, direction: Direction, frame: &[u8]) {
        let before = self.stats.frames();
        self.hub.inject(iface, direction, frame).unwrap();

        tokio::time::timeout(TIMEOUT, async {
            while self.stats.frames() == before {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("timed out waiting for dispatch");
    }

    /// Closes the control stream and waits for the driver to shut down.
    pub async fn stop(self) -> ShutdownReport {
        // The reply pipe stays open until the driver is done writing.
        let Self { control, replies, driver, .. } = self;
        drop(control);

        let report = tokio::time::timeout(TIMEOUT, driver).await.unwrap().unwrap().unwrap();
        drop(replies);
        report
    }
}
