//! Hand-off between the HTTP server's own threads and the tick loop.
//!
//! Server threads read and parse the request, queue it, and block until
//! `tick` answers. `tick` only ever does a `try_recv`.

use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};
use std::time::Duration;

use http::StatusCode;

use super::{Exchange, HttpListener, Reply, Request, Responder, MIME_PLAIN};

/// Largest request body accepted by either server.
pub const MAX_BODY: usize = 16 * 1024;

/// How long a server thread waits for the tick loop to answer.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

struct Pending {
    request: Request,
    reply: SyncSender<Reply>,
}

/// Producer side, cloned into every server thread or handler.
#[derive(Clone)]
pub struct RequestQueue {
    tx: Sender<Pending>,
}

impl RequestQueue {
    /// Queue `request` and wait for its reply. A 503 stands in when the
    /// tick loop does not answer within `timeout`.
    pub fn submit(&self, request: Request, timeout: Duration) -> Reply {
        let (tx, rx) = mpsc::sync_channel(1);
        let uri = request.uri().clone();
        if self.tx.send(Pending { request, reply: tx }).is_err() {
            log::warn!("Dropping {}: request loop is gone", uri);
            return unavailable();
        }
        match rx.recv_timeout(timeout) {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("No reply for {}: {}", uri, e);
                unavailable()
            }
        }
    }
}

fn unavailable() -> Reply {
    Reply::new(StatusCode::SERVICE_UNAVAILABLE, MIME_PLAIN, "Busy")
}

/// Consumer side, polled from `tick`.
pub struct QueueListener {
    rx: Receiver<Pending>,
    stopped: bool,
}

pub fn request_queue() -> (RequestQueue, QueueListener) {
    let (tx, rx) = mpsc::channel();
    (
        RequestQueue { tx },
        QueueListener { rx, stopped: false },
    )
}

impl HttpListener for QueueListener {
    fn poll(&mut self) -> anyhow::Result<Option<Exchange>> {
        match self.rx.try_recv() {
            Ok(Pending { request, reply }) => Ok(Some(Exchange {
                request,
                responder: Box::new(QueuedResponder { reply }),
            })),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                if !self.stopped {
                    self.stopped = true;
                    log::error!("HTTP server threads have stopped");
                }
                Ok(None)
            }
        }
    }
}

struct QueuedResponder {
    reply: SyncSender<Reply>,
}

impl Responder for QueuedResponder {
    fn send(self: Box<Self>, reply: Reply) -> anyhow::Result<()> {
        self.reply
            .send(reply)
            .map_err(|_| anyhow::anyhow!("client went away before the reply"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(uri: &str) -> Request {
        http::Request::builder().uri(uri).body(Vec::new()).unwrap()
    }

    #[test]
    fn test_empty_queue_polls_none() {
        let (_tx, mut listener) = request_queue();
        assert!(listener.poll().unwrap().is_none());
    }

    #[test]
    fn test_submit_waits_for_tick_reply() {
        let (queue, mut listener) = request_queue();
        let client = std::thread::spawn(move || queue.submit(get("/scan"), REPLY_TIMEOUT));

        let exchange = loop {
            if let Some(ex) = listener.poll().unwrap() {
                break ex;
            }
            std::thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(exchange.request.uri().path(), "/scan");
        exchange
            .responder
            .send(Reply::new(StatusCode::OK, MIME_PLAIN, "ok"))
            .unwrap();

        let reply = client.join().unwrap();
        assert_eq!(reply.status(), StatusCode::OK);
        assert_eq!(reply.body(), b"ok");
    }

    #[test]
    fn test_unanswered_request_times_out_as_busy() {
        let (queue, mut listener) = request_queue();
        let reply = queue.submit(get("/"), Duration::from_millis(20));
        assert_eq!(reply.status(), StatusCode::SERVICE_UNAVAILABLE);

        // the stale request is still handed out; answering it is harmless
        let exchange = listener.poll().unwrap().unwrap();
        assert!(exchange.responder.send(Reply::not_found()).is_err());
    }

    #[test]
    fn test_dropped_server_polls_none() {
        let (queue, mut listener) = request_queue();
        drop(queue);
        assert!(listener.poll().unwrap().is_none());
        assert!(listener.poll().unwrap().is_none());
    }
}
