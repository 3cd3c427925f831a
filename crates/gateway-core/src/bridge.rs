//! Bounded hand-off between a run's event producer and its consumer.
//!
//! A run's token events are produced by a task the consumer does not
//! schedule (typically a spawned SSE reader). The bridge carries them over a
//! bounded `mpsc` channel so the connection handler can await tokens without
//! blocking other connections, with backpressure toward the producer and a
//! stall bound on both sides.
//!
//! Terminal semantics: `RunSink::complete` and `RunSink::fail` consume the
//! sink, so a producer can deliver at most one terminal marker. A sink
//! dropped without a terminal surfaces as [`BridgeError::Interrupted`].

use std::time::Duration;

use tokio::sync::mpsc;

use crate::client::AssistantError;

/// Tuning for one bridge channel.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Queue capacity (must be >= 1).
    pub capacity: usize,
    /// How long the producer may stall on a slow consumer before giving up.
    pub send_timeout: Duration,
    /// How long the consumer waits for the next event before the run is
    /// considered stalled.
    pub recv_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            send_timeout: Duration::from_secs(30),
            recv_timeout: Duration::from_secs(60),
        }
    }
}

/// One event observed by the consumer side of a bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// One token of the in-progress reply, in emission order.
    Token(String),
    /// The run finished producing output.
    Completed,
}

/// Consumer-side failure of a run stream.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No event arrived within the configured bound.
    #[error("timed out waiting for the next token")]
    Stalled,
    /// The producer went away without delivering a terminal marker.
    #[error("run stream ended before completing")]
    Interrupted,
    /// The run itself failed upstream.
    #[error(transparent)]
    Upstream(#[from] AssistantError),
}

/// The consumer cancelled the stream (or stalled past the send bound);
/// the producer must stop emitting.
#[derive(Debug, thiserror::Error)]
#[error("token consumer is gone")]
pub struct SinkClosed;

type Item = Result<RunEvent, AssistantError>;

/// Create a connected sink/stream pair for one run.
#[must_use]
pub fn channel(config: &BridgeConfig) -> (RunSink, RunStream) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    (
        RunSink {
            tx,
            send_timeout: config.send_timeout,
        },
        RunStream {
            rx,
            recv_timeout: config.recv_timeout,
        },
    )
}

/// Producer handle for one run.
#[derive(Debug)]
pub struct RunSink {
    tx: mpsc::Sender<Item>,
    send_timeout: Duration,
}

impl RunSink {
    /// Deliver one token, stalling up to `send_timeout` on a full queue.
    ///
    /// # Errors
    /// Returns [`SinkClosed`] if the consumer cancelled the stream or did
    /// not drain the queue in time; the producer must stop emitting.
    pub async fn token(&self, text: impl Into<String>) -> Result<(), SinkClosed> {
        self.tx
            .send_timeout(Ok(RunEvent::Token(text.into())), self.send_timeout)
            .await
            .map_err(|_| SinkClosed)
    }

    /// Deliver the terminal success marker.
    pub async fn complete(self) {
        let _ = self
            .tx
            .send_timeout(Ok(RunEvent::Completed), self.send_timeout)
            .await;
    }

    /// Deliver the terminal error marker.
    pub async fn fail(self, error: AssistantError) {
        let _ = self.tx.send_timeout(Err(error), self.send_timeout).await;
    }

    /// Whether the consumer has cancelled the stream.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer handle for one run.
///
/// Dropping the stream cancels the run: the producer's next send fails and
/// its task is expected to unwind, releasing the underlying run resources.
#[derive(Debug)]
pub struct RunStream {
    rx: mpsc::Receiver<Item>,
    recv_timeout: Duration,
}

impl RunStream {
    /// Await the next event, bounded by `recv_timeout`.
    ///
    /// # Errors
    /// - [`BridgeError::Stalled`] if no event arrived in time (the stream is
    ///   cancelled as a side effect).
    /// - [`BridgeError::Interrupted`] if the producer vanished mid-run.
    /// - [`BridgeError::Upstream`] if the run failed remotely.
    pub async fn next_event(&mut self) -> Result<RunEvent, BridgeError> {
        match tokio::time::timeout(self.recv_timeout, self.rx.recv()).await {
            Err(_) => {
                self.cancel();
                Err(BridgeError::Stalled)
            }
            Ok(None) => Err(BridgeError::Interrupted),
            Ok(Some(Ok(event))) => Ok(event),
            Ok(Some(Err(error))) => {
                self.rx.close();
                Err(BridgeError::Upstream(error))
            }
        }
    }

    /// Stop consuming: further producer sends fail immediately.
    ///
    /// Events already queued could still be drained through the channel,
    /// but no code path reads from a cancelled stream.
    pub fn cancel(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> BridgeConfig {
        BridgeConfig {
            capacity: 4,
            send_timeout: Duration::from_millis(100),
            recv_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn delivers_tokens_in_order() {
        let (sink, mut stream) = channel(&quick_config());

        tokio::spawn(async move {
            for text in ["a", "b", "c"] {
                sink.token(text).await.unwrap();
            }
            sink.complete().await;
        });

        let mut seen = Vec::new();
        loop {
            match stream.next_event().await.unwrap() {
                RunEvent::Token(t) => seen.push(t),
                RunEvent::Completed => break,
            }
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn upstream_failure_is_terminal() {
        let (sink, mut stream) = channel(&quick_config());
        sink.fail(AssistantError::RunFailed("rate limited".into()))
            .await;

        match stream.next_event().await {
            Err(BridgeError::Upstream(AssistantError::RunFailed(msg))) => {
                assert_eq!(msg, "rate limited");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn producer_drop_without_terminal_is_interrupted() {
        let (sink, mut stream) = channel(&quick_config());
        sink.token("partial").await.unwrap();
        drop(sink);

        assert_eq!(
            stream.next_event().await.unwrap(),
            RunEvent::Token("partial".into())
        );
        assert!(matches!(
            stream.next_event().await,
            Err(BridgeError::Interrupted)
        ));
    }

    #[tokio::test]
    async fn consumer_stall_times_out() {
        let config = BridgeConfig {
            recv_timeout: Duration::from_millis(20),
            ..quick_config()
        };
        let (_sink, mut stream) = channel(&config);

        assert!(matches!(
            stream.next_event().await,
            Err(BridgeError::Stalled)
        ));
    }

    #[tokio::test]
    async fn cancel_stops_the_producer() {
        let (sink, mut stream) = channel(&quick_config());

        let producer = tokio::spawn(async move {
            let mut sent = 0u32;
            while sink.token(format!("t{sent}")).await.is_ok() {
                sent += 1;
            }
            sent
        });

        // Consume a couple of tokens, then walk away.
        let _ = stream.next_event().await.unwrap();
        let _ = stream.next_event().await.unwrap();
        stream.cancel();

        // The producer observes the closed channel and stops on its own.
        let sent = producer.await.unwrap();
        assert!(sent >= 2);
    }

    #[tokio::test]
    async fn slow_consumer_bounds_the_producer() {
        let config = BridgeConfig {
            capacity: 1,
            send_timeout: Duration::from_millis(20),
            recv_timeout: Duration::from_millis(500),
        };
        let (sink, _stream) = channel(&config);

        sink.token("fills the queue").await.unwrap();
        // Nobody is draining: the second send must give up within the bound
        // instead of blocking forever.
        assert!(sink.token("never fits").await.is_err());
    }

    #[tokio::test]
    async fn drop_cancels_the_stream() {
        let (sink, stream) = channel(&quick_config());
        drop(stream);

        assert!(sink.is_closed());
        assert!(sink.token("late").await.is_err());
    }
}
