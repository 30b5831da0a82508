//! Per-connection state machine: `READ_HEADER -> DISPATCH ->
//! {WRITE_RESPONSE} -> READ_HEADER`, with terminal close/abort states
//! folded into the loop simply returning.

use crate::bet::{Bet, MessageCode, ResponseStatus};
use crate::codec::{decode_bet, DecodeOutcome};
use crate::error::{ServerError, ServerResult};
use crate::server::Shared;
use std::sync::atomic::Ordering;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// What the connection loop should do after one request/response cycle.
enum Outcome {
    KeepOpen,
    Close,
}

/// Drives one client connection start to finish. Never panics on anything
/// the peer sends; all decode/I/O failures are mapped to a reply, where one
/// is owed, followed by a close.
pub async fn handle_connection(mut stream: TcpStream, shared: Shared) {
    let peer = stream.peer_addr().ok();
    let mut reader = crate::frame::FrameReader::new();
    shared.metrics.record_connection_opened();

    let outcome = handle_connection_inner(&mut stream, &mut reader, &shared, peer).await;
    shared.metrics.record_connection_closed();
    outcome
}

async fn handle_connection_inner(
    stream: &mut TcpStream,
    reader: &mut crate::frame::FrameReader,
    shared: &Shared,
    peer: Option<std::net::SocketAddr>,
) {
    loop {
        if shared.should_stop.load(Ordering::SeqCst) {
            debug!(action = "handle_connection", result = "abort", msg = "shutdown in progress, closing silently");
            return;
        }

        // A waiter blocked inside `one_request` (on the frame reader's
        // socket read, or on the barrier's condition variable) is released
        // by this select as soon as shutdown fires, without needing to
        // forcibly close the socket from outside the task.
        let request = tokio::select! {
            biased;
            _ = shared.shutdown.notified() => {
                debug!(action = "handle_connection", result = "abort", msg = "shutdown in progress, closing silently");
                return;
            }
            result = one_request(stream, reader, shared) => result,
        };

        match request {
            Ok(Outcome::KeepOpen) => continue,
            Ok(Outcome::Close) => {
                debug!(action = "handle_connection", result = "success", ?peer, msg = "connection closed");
                return;
            }
            Err(ServerError::ConnectionClosed) => {
                // Peer closed mid-request: no reply owed.
                return;
            }
            Err(e) => {
                if shared.should_stop.load(Ordering::SeqCst) {
                    // Shutdown-induced errors are swallowed silently.
                    return;
                }
                error!(action = "handle_connection", result = "fail", error = %e);
                let _ = write_status(stream, ResponseStatus::Error).await;
                return;
            }
        }
    }
}

async fn one_request(
    stream: &mut TcpStream,
    reader: &mut crate::frame::FrameReader,
    shared: &Shared,
) -> ServerResult<Outcome> {
    reader.ensure(stream, 2).await?;
    let agency = reader.peek()[0];
    let code_byte = reader.peek()[1];
    reader.consume(2);

    let code = match MessageCode::from_u8(code_byte) {
        Some(c) => c,
        None => {
            warn!(action = "read_header", result = "fail", agency, code_byte, msg = "unknown message code");
            write_status(stream, ResponseStatus::BadRequest).await?;
            return Ok(Outcome::Close);
        }
    };

    match code {
        MessageCode::Bet => handle_bet(stream, reader, shared, agency).await,
        MessageCode::EndBetting => handle_end_betting(stream, shared, agency).await,
        MessageCode::RequestWinners => handle_request_winners(stream, shared, agency).await,
    }
}

async fn handle_bet(
    stream: &mut TcpStream,
    reader: &mut crate::frame::FrameReader,
    shared: &Shared,
    agency: u8,
) -> ServerResult<Outcome> {
    // A length-prefixed stream protocol can't skip a request without
    // parsing it: the batch still has to be decoded to know where the
    // *next* request begins, even when the agency is already closed. So
    // the batch is always decoded in full to keep framing intact, and
    // `is_open` only gates whether it gets persisted afterwards.
    let accepting = shared.barrier.is_open(agency).await;

    reader.ensure(stream, 1).await?;
    let batch_num = reader.peek()[0];
    reader.consume(1);

    let mut batch: Vec<Bet> = Vec::with_capacity(batch_num as usize);
    for _ in 0..batch_num {
        loop {
            match decode_bet(agency, reader.peek()) {
                DecodeOutcome::Complete(bet, consumed) => {
                    reader.consume(consumed);
                    batch.push(bet);
                    break;
                }
                DecodeOutcome::NeedMore => {
                    let needed = reader.peek().len() + 1;
                    reader.ensure(stream, needed).await?;
                }
                DecodeOutcome::Malformed(msg) => {
                    warn!(action = "apuesta_recibida", result = "fail", agency, error = %msg);
                    write_status(stream, ResponseStatus::BadRequest).await?;
                    return Ok(Outcome::Close);
                }
            }
        }
    }

    if !accepting {
        shared.metrics.record_batch_rejected();
        write_status(stream, ResponseStatus::NoMoreBetsAllowed).await?;
        return Ok(Outcome::KeepOpen);
    }

    let cantidad = batch.len();
    match shared.store.append(batch).await {
        Ok(()) => {
            shared.metrics.record_bets_received(cantidad as u64);
            info!(action = "apuesta_recibida", result = "success", cantidad);
            write_status(stream, ResponseStatus::Ok).await?;
            Ok(Outcome::KeepOpen)
        }
        Err(e) => {
            error!(action = "apuesta_recibida", result = "fail", error = %e);
            write_status(stream, ResponseStatus::Error).await?;
            Ok(Outcome::Close)
        }
    }
}

async fn handle_end_betting(stream: &mut TcpStream, shared: &Shared, agency: u8) -> ServerResult<Outcome> {
    shared.barrier.mark_done(agency).await?;
    info!(action = "end_betting", result = "success", agency);
    write_status(stream, ResponseStatus::Ok).await?;
    Ok(Outcome::KeepOpen)
}

async fn handle_request_winners(stream: &mut TcpStream, shared: &Shared, agency: u8) -> ServerResult<Outcome> {
    let winners = shared.barrier.wait_and_get(agency).await;
    let documents: Vec<u32> = winners.iter().map(|bet| bet.document).collect();
    info!(action = "consulta_ganadores", result = "success", agency, cantidad = documents.len());
    write_winners(stream, &documents).await?;
    Ok(Outcome::KeepOpen)
}

async fn write_status(stream: &mut TcpStream, status: ResponseStatus) -> ServerResult<()> {
    stream.write_all(&[status as u8]).await?;
    Ok(())
}

async fn write_winners(stream: &mut TcpStream, documents: &[u32]) -> ServerResult<()> {
    let mut reply = Vec::with_capacity(1 + 2 + documents.len() * 4);
    reply.push(ResponseStatus::SendWinners as u8);
    reply.extend_from_slice(&(documents.len() as u16).to_le_bytes());
    for document in documents {
        reply.extend_from_slice(&document.to_le_bytes());
    }
    // Single `write_all` call: no partial writes are tolerated.
    stream.write_all(&reply).await?;
    Ok(())
}
