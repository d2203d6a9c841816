use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, trace, warn, Span};

use mangle_core::{Engine, ShutdownReport, Verdict};
use mangle_link::{Frame, DEFAULT_QUEUE_SIZE};
use mangle_wire::{ControlCodec, Reply, ReplyCodec, Request};

use crate::{execute, DriverError, DriverStats};

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Capacity of the frame channel between links and the driver.
    frame_queue: usize,
    /// Whether the driver completes when the control stream ends.
    exit_on_eof: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self { frame_queue: DEFAULT_QUEUE_SIZE, exit_on_eof: true }
    }
}

impl DriverOptions {
    /// Sets the frame channel capacity. Frames received while the channel is full are dropped
    /// by the link.
    pub fn frame_queue(mut self, capacity: usize) -> Self {
        self.frame_queue = capacity.max(1);
        self
    }

    /// Sets whether the driver completes at the end of the control stream. If not set, only
    /// the shutdown signal completes it.
    pub fn exit_on_eof(mut self, exit_on_eof: bool) -> Self {
        self.exit_on_eof = exit_on_eof;
        self
    }

    /// Creates the frame channel to build the binder and the driver with.
    pub fn frame_channel(&self) -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        mpsc::channel(self.frame_queue)
    }
}

type Signal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Runs an [`Engine`] on a single task.
///
/// The driver reads commands from the control stream and frames from the frame channel, in
/// the order they become ready, and writes one reply line per acknowledgement or error.
/// It completes when the control stream ends (see [`DriverOptions::exit_on_eof`]) or when the
/// shutdown signal fires, after which the engine is shut down and its report returned.
pub struct Driver<R, W> {
    engine: Engine,
    options: DriverOptions,
    /// `None` once the control stream has ended.
    control: Option<FramedRead<R, ControlCodec>>,
    replies: FramedWrite<W, ReplyCodec>,
    egress_queue: VecDeque<Reply>,
    should_flush: bool,
    frames: mpsc::Receiver<Frame>,
    shutdown: Option<Signal>,
    stats: Arc<DriverStats>,
    span: Span,
}

impl<R, W> Driver<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(engine: Engine, frames: mpsc::Receiver<Frame>, control: R, replies: W) -> Self {
        Self::with_options(engine, frames, control, replies, DriverOptions::default())
    }

    pub fn with_options(
        engine: Engine,
        frames: mpsc::Receiver<Frame>,
        control: R,
        replies: W,
        options: DriverOptions,
    ) -> Self {
        Self {
            engine,
            options,
            control: Some(FramedRead::new(control, ControlCodec::new())),
            replies: FramedWrite::new(replies, ReplyCodec::new()),
            egress_queue: VecDeque::with_capacity(64),
            should_flush: false,
            frames,
            shutdown: None,
            stats: Arc::new(DriverStats::default()),
            span: tracing::info_span!("mangle_driver"),
        }
    }

    /// Completes the driver when `signal` resolves.
    pub fn with_shutdown<F>(mut self, signal: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.shutdown = Some(Box::pin(signal));
        self
    }

    pub fn stats(&self) -> Arc<DriverStats> {
        Arc::clone(&self.stats)
    }

    fn on_request(&mut self, request: Request) {
        let Request { line, text, command } = request;

        let result = command
            .map_err(|e| (mangle_core::ErrorKind::Malformed, e.to_string()))
            .and_then(|command| {
                debug!(line, %command, "applying command");
                execute(&mut self.engine, &command).map_err(|e| (e.kind(), e.to_string()))
            });

        match result {
            Ok(acks) => {
                self.stats.increment_commands();
                self.egress_queue.extend(acks.into_iter().map(Reply::Ack));
            }
            Err((kind, msg)) => {
                warn!(line, cmd = %text, %kind, "command failed: {}", msg);
                self.stats.increment_failed_commands();
                self.egress_queue.push_back(Reply::Error { kind, cmd: text, msg });
            }
        }
    }

    fn on_frame(&mut self, mut frame: Frame) {
        let verdict = self.engine.on_packet(&frame.iface, frame.direction, &mut frame.data[..]);
        trace!(iface = %frame.iface, direction = %frame.direction, ?verdict, "dispatched frame");
        self.stats.increment_frames(matches!(verdict, Verdict::Forwarded { .. }));
    }

    fn finish(&mut self) -> ShutdownReport {
        let report = self.engine.shutdown();
        info!(
            commands = self.stats.commands(),
            failed = self.stats.failed_commands(),
            frames = self.stats.frames(),
            forwarded = self.stats.forwarded(),
            leaks = report.leaks.len(),
            "driver finished"
        );
        report
    }
}

impl<R, W> Future for Driver<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    type Output = Result<ShutdownReport, DriverError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let span = this.span.clone();
        let _enter = span.enter();

        loop {
            if let Some(signal) = this.shutdown.as_mut() {
                if signal.as_mut().poll(cx).is_ready() {
                    info!("shutdown signal received");
                    this.shutdown = None;
                    return Poll::Ready(Ok(this.finish()));
                }
            }

            // Flush any replies on the outgoing buffer
            if this.should_flush {
                match this.replies.poll_flush_unpin(cx) {
                    Poll::Ready(Ok(())) => this.should_flush = false,
                    Poll::Ready(Err(e)) => {
                        error!("Failed to flush replies: {:?}", e);
                        this.finish();
                        return Poll::Ready(Err(e.into()));
                    }
                    Poll::Pending => {}
                }
            }

            // Then, try to drain the egress queue.
            if !this.egress_queue.is_empty() {
                match this.replies.poll_ready_unpin(cx) {
                    Poll::Ready(Ok(())) => {
                        if let Some(reply) = this.egress_queue.pop_front() {
                            if let Err(e) = this.replies.start_send_unpin(reply) {
                                error!("Failed to write reply: {:?}", e);
                                this.finish();
                                return Poll::Ready(Err(e.into()));
                            }

                            this.should_flush = true;
                            continue;
                        }
                    }
                    Poll::Ready(Err(e)) => {
                        error!("Reply sink failed: {:?}", e);
                        this.finish();
                        return Poll::Ready(Err(e.into()));
                    }
                    Poll::Pending => {}
                }
            }

            let mut progress = false;

            // Frames and commands are each given a turn per iteration, so that neither can
            // starve the other.
            if let Poll::Ready(Some(frame)) = this.frames.poll_recv(cx) {
                this.on_frame(frame);
                progress = true;
            }

            if let Some(control) = this.control.as_mut() {
                match control.poll_next_unpin(cx) {
                    Poll::Ready(Some(Ok(request))) => {
                        this.on_request(request);
                        progress = true;
                    }
                    Poll::Ready(Some(Err(e))) => {
                        error!("Control stream failed: {:?}", e);
                        this.finish();
                        return Poll::Ready(Err(e.into()));
                    }
                    Poll::Ready(None) => {
                        info!("control stream ended");
                        this.control = None;
                        progress = true;
                    }
                    Poll::Pending => {}
                }
            }

            if progress {
                continue;
            }

            // Nothing is ready. Complete once the control stream is gone and every reply
            // has been written out.
            if this.control.is_none() &&
                this.options.exit_on_eof &&
                this.egress_queue.is_empty() &&
                !this.should_flush
            {
                return Poll::Ready(Ok(this.finish()));
            }

            return Poll::Pending;
        }
    }
}
