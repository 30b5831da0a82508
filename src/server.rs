//! Acceptor, worker pool, and shutdown controller.
//!
//! Connections are few (one per betting agency) and file contention must
//! stay bounded, so the pool is a real cap: a `Semaphore` of `max_workers`
//! permits acquired *before* the handler is spawned, so a full pool
//! backpressures the accept loop itself rather than just queuing unbounded
//! tasks.

use crate::barrier::CompletionBarrier;
use crate::config::Config;
use crate::handler::handle_connection;
use crate::metrics::Metrics;
use crate::store::BetStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// State shared by every connection handler.
pub struct AppState {
    pub store: Arc<BetStore>,
    pub barrier: Arc<CompletionBarrier>,
    pub should_stop: Arc<AtomicBool>,
    pub shutdown: Arc<Notify>,
    pub metrics: Arc<Metrics>,
}

/// Cheaply cloned handle passed to each connection task.
pub type Shared = Arc<AppState>;

/// Binds the listener and runs the accept loop until a termination signal
/// arrives, then drains in-flight workers before returning.
pub async fn run(config: Config) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = bind_listener(&addr, config.listen_backlog).await?;
    info!(action = "bind", result = "success", %addr, backlog = config.listen_backlog);

    serve(listener, config).await
}

/// Runs the accept loop over an already-bound listener. Split out from
/// [`run`] so integration tests can bind an ephemeral port (`127.0.0.1:0`),
/// learn the resolved address, and drive the protocol against it directly.
pub async fn serve(listener: TcpListener, config: Config) -> std::io::Result<()> {
    let store = Arc::new(BetStore::new(config.storage_path.clone()));
    let barrier = Arc::new(CompletionBarrier::new(
        Arc::clone(&store),
        config.expected_agencies,
        config.lottery_winner_number,
    ));
    let should_stop = Arc::new(AtomicBool::new(false));
    let shutdown = Arc::new(Notify::new());
    let metrics = Arc::new(Metrics::new());

    let shared: Shared = Arc::new(AppState {
        store,
        barrier,
        should_stop: Arc::clone(&should_stop),
        shutdown: Arc::clone(&shutdown),
        metrics,
    });

    tokio::spawn(shutdown_on_signal(Arc::clone(&should_stop), Arc::clone(&shutdown)));

    let semaphore = Arc::new(Semaphore::new(config.max_workers));
    let mut workers: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                info!(action = "accept_connections", result = "success", msg = "shutdown requested, closing listener");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        info!(action = "accept_connections", result = "success", ip = %peer.ip());

                        // Backpressure: acquiring the permit here, before
                        // spawning, blocks the accept loop itself once
                        // `max_workers` handlers are in flight.
                        let permit = match Arc::clone(&semaphore).acquire_owned().await {
                            Ok(p) => p,
                            Err(_) => break, // semaphore closed during shutdown race
                        };
                        let shared = Arc::clone(&shared);

                        workers.spawn(async move {
                            let _permit = permit;
                            handle_connection(stream, shared).await;
                        });
                    }
                    Err(e) => {
                        if should_stop.load(Ordering::SeqCst) {
                            info!(action = "shutdown_gracefully", result = "success");
                        } else {
                            error!(action = "accept_connections", result = "fail", error = %e);
                        }
                        break;
                    }
                }
            }
        }
    }

    drain_workers(&mut workers).await;
    let snapshot = shared.metrics.snapshot();
    info!(
        action = "shutdown_gracefully",
        result = "success",
        msg = "all workers drained",
        bets_received = snapshot.bets_received,
        batches_rejected = snapshot.batches_rejected,
        connections_total = snapshot.connections_total,
    );
    Ok(())
}

async fn bind_listener(addr: &str, backlog: u32) -> std::io::Result<TcpListener> {
    // socket2 for an explicit listen backlog, then handed off to tokio.
    let std_listener = {
        use std::net::TcpListener as StdTcpListener;
        let socket = socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        let sock_addr: std::net::SocketAddr = addr.parse().expect("invalid bind address");
        socket.bind(&sock_addr.into())?;
        socket.listen(backlog as i32)?;
        socket.set_nonblocking(true)?;
        StdTcpListener::from(socket)
    };
    TcpListener::from_std(std_listener)
}

/// Waits for SIGTERM or Ctrl-C, then flips the one-way latch and wakes every
/// blocked accept/handler. All of the work happens in the async task woken
/// by the signal, never inside a raw signal handler.
async fn shutdown_on_signal(should_stop: Arc<AtomicBool>, shutdown: Arc<Notify>) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(action = "shutdown_gracefully", result = "fail", error = %e, msg = "could not install SIGTERM handler");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!(action = "shutdown_gracefully", result = "in_progress", msg = "received SIGTERM signal");
        }
        _ = tokio::signal::ctrl_c() => {
            info!(action = "shutdown_gracefully", result = "in_progress", msg = "received SIGINT signal");
        }
    }

    should_stop.store(true, Ordering::SeqCst);
    shutdown.notify_waiters();
}

async fn drain_workers(workers: &mut JoinSet<()>) {
    while workers.join_next().await.is_some() {}
}
