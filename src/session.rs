//! Chat session: one attempt cycle and its supervision.
//!
//! A cycle opens both connections, authorises on the sending one, then runs
//! the inbound reader, outbound writer, watchdog and keepalive pinger
//! together. The first failure among them cancels the others, both sockets
//! are closed, and only then does the supervisor decide whether to retry.

use crate::auth::authorise;
use crate::error::ChatError;
use crate::messages::{ping, read_loop, write_loop};
use crate::protocol::{Config, ConnectionState, LivenessEvent, StatusEvent};
use crate::queue::CoreQueues;
use crate::supervisor::supervise;
use crate::transport::{self, LineReader, LineWriter};
use crate::watchdog::{watch, Liveness};
use std::convert::Infallible;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

/// A supervised chat session
pub struct Session {
    config: Config,
    token: String,
    queues: CoreQueues,
}

impl Session {
    pub fn new(config: Config, token: String, queues: CoreQueues) -> Self {
        Self {
            config,
            token,
            queues,
        }
    }

    /// Run attempt cycles until a fatal error or an exhausted retry budget
    pub async fn run(&self) -> Result<Infallible, ChatError> {
        supervise(&self.config.retry, move |attempt| self.run_cycle(attempt)).await
    }

    /// One full open-authorise-run cycle. Always ends in an error.
    async fn run_cycle(&self, attempt: u32) -> Result<Infallible, ChatError> {
        let endpoint = &self.config.endpoint;
        info!(
            "Connection attempt {} to {} (send {}, receive {})",
            attempt, endpoint.host, endpoint.send_port, endpoint.receive_port
        );

        self.queues.status(StatusEvent::Read(ConnectionState::Initiated));
        self.queues.status(StatusEvent::Send(ConnectionState::Initiated));

        let result = self.connect_and_run().await;

        self.queues.status(StatusEvent::Read(ConnectionState::Closed));
        self.queues.status(StatusEvent::Send(ConnectionState::Closed));
        debug!("Attempt {} torn down", attempt);
        result
    }

    async fn connect_and_run(&self) -> Result<Infallible, ChatError> {
        let endpoint = &self.config.endpoint;
        let (mut send_reader, send_writer) =
            transport::open(&endpoint.host, endpoint.send_port).await?;
        let (mut read_reader, mut read_writer) =
            transport::open(&endpoint.host, endpoint.receive_port).await?;

        self.queues.status(StatusEvent::Read(ConnectionState::Established));
        self.queues.status(StatusEvent::Send(ConnectionState::Established));

        // Fresh channel per cycle: no stale events carry over
        let (liveness, events) = Liveness::channel();
        let send_writer = Mutex::new(send_writer);

        let result = self
            .authorise_and_stream(&mut send_reader, &send_writer, &mut read_reader, &liveness, events)
            .await;

        send_writer.into_inner().shutdown().await;
        read_writer.shutdown().await;
        result
    }

    async fn authorise_and_stream(
        &self,
        send_reader: &mut LineReader,
        send_writer: &Mutex<LineWriter>,
        read_reader: &mut LineReader,
        liveness: &Liveness,
        events: mpsc::UnboundedReceiver<LivenessEvent>,
    ) -> Result<Infallible, ChatError> {
        let timeout = self.config.watchdog_timeout;

        let account = {
            let mut writer = send_writer.lock().await;
            tokio::time::timeout(
                timeout,
                authorise(send_reader, &mut *writer, &self.token, liveness),
            )
            .await
            .map_err(|_| ChatError::ConnectionTimeout(timeout))??
        };
        self.queues
            .status(StatusEvent::NicknameReceived(account.nickname));

        let mut outbound = self.queues.outbound.lock().await;
        let token = self.config.resend_token.then_some(self.token.as_str());

        let outcome = tokio::try_join!(
            read_loop(read_reader, &self.queues.messages, &self.queues.history, liveness),
            write_loop(send_writer, &mut *outbound, liveness, token),
            watch(events, timeout),
            ping(send_writer, send_reader, liveness, self.config.ping_interval),
        );

        match outcome {
            Err(err) => Err(err),
            Ok((never, ..)) => match never {},
        }
    }
}
