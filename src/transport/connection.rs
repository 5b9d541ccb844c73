// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, sleep_until, timeout, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::event::{event_channel, BridgeEvent, EventReceiver, EventSender};
use crate::protocol::{Command, MonitorMessage};
use crate::transport::session::{LoginState, Session, SessionOutput};

/// Receives every monitor message on the connection task, before the
/// matching event is broadcast.
pub trait MonitorSink: Send + Sync {
    fn deliver(&self, message: &MonitorMessage);
}

/// Cloneable handle for queueing commands on a connection.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<String>,
}

impl CommandSender {
    /// Queue a command. It is written once the session is logged in.
    pub fn send(&self, command: impl Into<Command>) -> Result<()> {
        self.tx
            .send(command.into().to_wire_string())
            .map_err(|_| BridgeError::ChannelClosed)
    }
}

/// Connection to a Lutron bridge's integration port.
///
/// Owns a background task that connects, logs in, reads device reports and
/// writes queued commands, reconnecting per the configured policy.
///
/// ```no_run
/// # use lutron_bridge::{BridgeConfig, BridgeConnection, BridgeEvent};
/// # async fn demo() -> lutron_bridge::Result<()> {
/// let connection = BridgeConnection::connect(BridgeConfig::default(), None);
/// let mut events = connection.subscribe();
/// while let Ok(event) = events.recv().await {
///     if let BridgeEvent::MonitorMessageReceived(msg) = event {
///         println!("{} {} {}", msg.integration_id, msg.component, msg.action);
///     }
/// }
/// connection.destroy().await;
/// # Ok(())
/// # }
/// ```
pub struct BridgeConnection {
    command_tx: mpsc::UnboundedSender<String>,
    event_tx: EventSender,
    state_rx: watch::Receiver<LoginState>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl BridgeConnection {
    /// Start connecting in the background. Must be called inside a tokio
    /// runtime.
    ///
    /// Subscribe before the next `.await` to be sure of seeing `Connected`.
    pub fn connect(config: BridgeConfig, sink: Option<Arc<dyn MonitorSink>>) -> Self {
        let (event_tx, _) = event_channel(config.event_capacity.max(1));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LoginState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let driver = Driver {
            session: Session::new(
                config.username.clone(),
                config.password.clone(),
                config.debug,
            ),
            config,
            event_tx: event_tx.clone(),
            state_tx,
            command_rx,
            shutdown_rx,
            sink,
            attempt: 0,
        };
        let task = tokio::spawn(driver.run());

        Self {
            command_tx,
            event_tx,
            state_rx,
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    /// Queue a command. It is written once the session is logged in.
    pub fn send(&self, command: impl Into<Command>) -> Result<()> {
        self.command_tx
            .send(command.into().to_wire_string())
            .map_err(|_| BridgeError::ChannelClosed)
    }

    pub fn command_sender(&self) -> CommandSender {
        CommandSender {
            tx: self.command_tx.clone(),
        }
    }

    /// Current login state.
    pub fn state(&self) -> LoginState {
        *self.state_rx.borrow()
    }

    /// Watch login state changes.
    pub fn state_watch(&self) -> watch::Receiver<LoginState> {
        self.state_rx.clone()
    }

    /// Close the socket and stop the background task.
    ///
    /// Once this returns no further event is broadcast and nothing more is
    /// delivered to the monitor sink.
    pub async fn destroy(mut self) {
        info!("Closing Lutron bridge connection");
        self.shutdown_tx.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Connection task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for BridgeConnection {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// How one socket's session ended.
enum SessionEnd {
    Shutdown,
    Failed(BridgeError),
}

struct Driver {
    config: BridgeConfig,
    session: Session,
    event_tx: EventSender,
    state_tx: watch::Sender<LoginState>,
    command_rx: mpsc::UnboundedReceiver<String>,
    shutdown_rx: watch::Receiver<bool>,
    sink: Option<Arc<dyn MonitorSink>>,
    /// Consecutive failed attempts since the last login
    attempt: u32,
}

impl Driver {
    async fn run(mut self) {
        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let error = match self.run_session().await {
                SessionEnd::Shutdown => break,
                SessionEnd::Failed(e) => e,
            };

            if !error.is_retryable() {
                error!("Lutron bridge connection failed, not retrying: {}", error);
                break;
            }

            self.attempt += 1;
            let Some(delay) = self.config.reconnect.delay_for(self.attempt) else {
                error!(
                    "Giving up on Lutron bridge after {} failed attempt(s); events will stop",
                    self.attempt
                );
                break;
            };

            self.session.closed(true);
            self.publish_state();
            warn!(
                "Reconnecting to Lutron bridge in {}ms (attempt {})",
                delay.as_millis(),
                self.attempt
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown_rx.changed() => break,
            }
        }

        self.session.closed(false);
        self.publish_state();
        debug!("Connection task finished");
    }

    /// Connect, log in and pump one socket until it fails or shutdown.
    async fn run_session(&mut self) -> SessionEnd {
        let address = self.config.address();
        self.session.begin_connect();
        self.publish_state();
        info!("Connecting to Lutron bridge at {}", address);

        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let stream = tokio::select! {
            _ = self.shutdown_rx.changed() => return SessionEnd::Shutdown,
            result = timeout(connect_timeout, TcpStream::connect(&address)) => match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    error!("TCP connect to {} failed: {}", address, e);
                    self.emit(BridgeEvent::Error(e.to_string()));
                    return SessionEnd::Failed(BridgeError::Io(e));
                }
                Err(_) => {
                    error!("TCP connect to {} timed out", address);
                    let e = BridgeError::ConnectionTimeout;
                    self.emit(BridgeEvent::Error(e.to_string()));
                    return SessionEnd::Failed(e);
                }
            },
        };
        debug!("TCP socket connected");
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }

        let (mut reader, mut writer) = stream.into_split();
        let outputs = self.session.connected();
        self.publish_state();
        if let Err(e) = self.apply(outputs, &mut writer).await {
            return self.lost(e);
        }

        let login_limit = self.config.login_timeout_ms > 0;
        let login_deadline = Instant::now() + Duration::from_millis(self.config.login_timeout_ms);
        let mut buf = vec![0u8; 4096];

        loop {
            let awaiting_login = login_limit && !self.session.is_logged_in();
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if let Err(e) = writer.shutdown().await {
                        debug!("Socket shutdown: {}", e);
                    }
                    return SessionEnd::Shutdown;
                }
                result = reader.read(&mut buf) => {
                    let outputs = match result {
                        Ok(0) => {
                            debug!("Reader: connection closed by bridge");
                            return self.lost(BridgeError::Disconnected);
                        }
                        Ok(n) => self.session.receive(&buf[..n]),
                        Err(e) => return self.lost(BridgeError::Io(e)),
                    };
                    if let Err(e) = self.apply(outputs, &mut writer).await {
                        return self.lost(e);
                    }
                }
                Some(line) = self.command_rx.recv() => {
                    let outputs = self.session.enqueue(line);
                    if let Err(e) = self.apply(outputs, &mut writer).await {
                        return self.lost(e);
                    }
                }
                _ = sleep_until(login_deadline), if awaiting_login => {
                    return self.lost(BridgeError::LoginTimeout {
                        secs: self.config.login_timeout_ms / 1000,
                    });
                }
            }
        }
    }

    async fn apply(
        &mut self,
        outputs: Vec<SessionOutput>,
        writer: &mut OwnedWriteHalf,
    ) -> Result<()> {
        for output in outputs {
            match output {
                SessionOutput::Write(text) => writer.write_all(text.as_bytes()).await?,
                SessionOutput::Event(event) => self.emit(event),
                SessionOutput::Fail(e) => return Err(e),
            }
        }
        self.publish_state();
        Ok(())
    }

    /// The current socket is unusable. Reported loudly since events stop
    /// until a reconnect succeeds.
    fn lost(&mut self, e: BridgeError) -> SessionEnd {
        match e {
            BridgeError::Disconnected => error!("Lost connection to Lutron bridge"),
            ref other => {
                error!("Lutron bridge connection failed: {}", other);
                self.emit(BridgeEvent::Error(other.to_string()));
            }
        }
        self.emit(BridgeEvent::Closed);
        SessionEnd::Failed(e)
    }

    fn emit(&mut self, event: BridgeEvent) {
        match &event {
            BridgeEvent::LoggedIn => self.attempt = 0,
            BridgeEvent::MonitorMessageReceived(message) => {
                if let Some(sink) = &self.sink {
                    sink.deliver(message);
                }
            }
            _ => {}
        }
        // No subscribers is not an error
        let _ = self.event_tx.send(event);
    }

    fn publish_state(&self) {
        let state = self.session.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}
