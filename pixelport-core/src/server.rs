//! OPC server runtime: TCP acceptor, per-connection framers, worker
//! lifecycle and shutdown.
//!
//! The inbound side is cooperative (one tokio task per connection, all
//! feeding the same router) while each output runs its own blocking
//! serial thread. The slot is the only boundary between the two worlds.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::OpcCodec;
use crate::config::Config;
use crate::error::BridgeError;
use crate::output::{self, OutputHandle};
use crate::pacing::FramePacer;
use crate::router::{Router, Target};
use crate::slot::Slot;
use crate::stats::{OutputSnapshot, OutputStats, ServerStats};

/// How long shutdown waits for serial workers before abandoning them.
const WORKER_GRACE: Duration = Duration::from_secs(3);

/// Stats ticker period.
pub const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// The assembled bridge: listener configuration, router, and one spawned
/// serial worker per output.
pub struct BridgeServer {
    config: Config,
    router: Arc<Router>,
    slots: Vec<Arc<Slot>>,
    output_stats: Vec<(String, Arc<OutputStats>)>,
    workers: Vec<OutputHandle>,
    shutdown: CancellationToken,
}

impl BridgeServer {
    /// Build runtimes for every configured output and spawn their workers.
    ///
    /// Ports that fail to open are not fatal here: each worker retries
    /// with backoff on its own thread.
    pub fn new(config: Config) -> Result<Self, BridgeError> {
        config.validate()?;

        let server_stats = Arc::new(ServerStats::default());
        let pacer = FramePacer::from_target(config.target_fps);

        let mut targets = Vec::with_capacity(config.outputs.len());
        let mut slots = Vec::with_capacity(config.outputs.len());
        let mut output_stats = Vec::with_capacity(config.outputs.len());
        let mut workers = Vec::with_capacity(config.outputs.len());

        for output_config in &config.outputs {
            let slot = Arc::new(Slot::new());
            let stats = Arc::new(OutputStats::default());
            targets.push(Target::new(
                output_config,
                Arc::clone(&slot),
                Arc::clone(&stats),
            ));
            output_stats.push((output_config.port.clone(), Arc::clone(&stats)));
            workers.push(output::spawn(
                output_config.clone(),
                Arc::clone(&slot),
                stats,
                pacer.clone(),
            ));
            slots.push(slot);
        }

        Ok(Self {
            router: Arc::new(Router::new(targets, server_stats)),
            config,
            slots,
            output_stats,
            workers,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that cancels the accept loop and all connection tasks.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind the OPC listener and accept connections until shutdown.
    ///
    /// Connections are logically independent streams into the same
    /// router; a read error drops that connection only.
    pub async fn run(&self) -> Result<(), BridgeError> {
        let addr = self.config.opc.to_socket_string();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| BridgeError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(%addr, outputs = self.workers.len(), "OPC server listening");

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    info!(%peer, "client connected");
                    let router = Arc::clone(&self.router);
                    let token = self.shutdown.clone();
                    tokio::spawn(async move {
                        serve_connection(stream, router, token).await;
                        info!(%peer, "client disconnected");
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }

        info!("OPC listener closed");
        Ok(())
    }

    /// Spawn the periodic stats ticker. Runs until shutdown.
    pub fn spawn_stats_ticker(&self) -> tokio::task::JoinHandle<()> {
        let server_stats = Arc::clone(self.router.server_stats());
        let outputs = self.output_stats.clone();
        let token = self.shutdown.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STATS_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick completes immediately; skip it.
            interval.tick().await;

            let mut last_received = 0u64;
            let mut last_written: Vec<OutputSnapshot> =
                vec![OutputSnapshot::default(); outputs.len()];

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let secs = STATS_INTERVAL.as_secs_f64();
                let (received, unknown) = server_stats.snapshot();
                let rx_fps = (received - last_received) as f64 / secs;
                last_received = received;

                for (i, (name, stats)) in outputs.iter().enumerate() {
                    let snap = stats.snapshot();
                    let prev = last_written[i];
                    info!(
                        output = %name,
                        written_fps = %format_args!("{:.1}", (snap.frames_written - prev.frames_written) as f64 / secs),
                        replaced = snap.dropped_replaced - prev.dropped_replaced,
                        short = snap.dropped_short - prev.dropped_short,
                        last_write_us = snap.last_write_micros,
                        "output stats"
                    );
                    last_written[i] = snap;
                }
                info!(
                    received_fps = %format_args!("{rx_fps:.1}"),
                    unknown_commands = unknown,
                    "server stats"
                );
            }
        })
    }

    /// Graceful shutdown: stop accepting, close every slot, join workers
    /// within a bounded grace period.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for slot in &self.slots {
            slot.close();
        }

        let workers = std::mem::take(&mut self.workers);
        let join_all = tokio::task::spawn_blocking(move || {
            for worker in workers {
                let name = worker.name().to_string();
                if worker.join().is_err() {
                    warn!(output = %name, "serial worker panicked");
                }
            }
        });

        match tokio::time::timeout(WORKER_GRACE, join_all).await {
            Ok(_) => info!("all serial workers stopped"),
            Err(_) => warn!(
                grace = ?WORKER_GRACE,
                "serial workers still busy after grace period; abandoning"
            ),
        }
    }
}

/// Drive one client connection: decode OPC messages off the stream and
/// hand them to the router until EOF, error, or shutdown.
pub async fn serve_connection(
    stream: TcpStream,
    router: Arc<Router>,
    shutdown: CancellationToken,
) {
    let _ = stream.set_nodelay(true);
    let mut framed = FramedRead::new(stream, OpcCodec);

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = framed.next() => next,
        };
        match next {
            Some(Ok(msg)) => router.dispatch(&msg),
            Some(Err(e)) => {
                // Peer-caused; drop this connection only.
                warn!(error = %e, "connection read error");
                break;
            }
            None => break,
        }
    }
    debug!("connection task finished");
}
