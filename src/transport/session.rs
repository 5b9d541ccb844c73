// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, info, trace, warn};

use crate::error::BridgeError;
use crate::event::BridgeEvent;
use crate::protocol::{parse_line, Message, LINE_TERMINATOR};
use crate::transport::framer::LineFramer;

/// Login state of a bridge connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginState {
    Disconnected,
    Connecting,
    AwaitingLoginPrompt,
    AwaitingPasswordPrompt,
    LoggedIn,
    /// Socket lost, waiting out the backoff before the next connect
    Reconnecting,
    Closed,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginState::Disconnected => "disconnected",
            LoginState::Connecting => "connecting",
            LoginState::AwaitingLoginPrompt => "awaiting login prompt",
            LoginState::AwaitingPasswordPrompt => "awaiting password prompt",
            LoginState::LoggedIn => "logged in",
            LoginState::Reconnecting => "reconnecting",
            LoginState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Something the driver must do on behalf of the session.
#[derive(Debug)]
pub enum SessionOutput {
    /// Bytes to write to the socket, terminator included
    Write(String),
    /// Event to publish (and, for monitor messages, dispatch)
    Event(BridgeEvent),
    /// The session cannot continue on this socket
    Fail(BridgeError),
}

/// Login handshake and command queue for one bridge connection.
///
/// Pure state machine: it is fed bytes and returns what to write and what
/// to publish, and never touches a socket. The queue and credentials
/// outlive individual sockets; the line buffer does not.
#[derive(Debug)]
pub struct Session {
    state: LoginState,
    username: String,
    password: String,
    framer: LineFramer,
    queued: VecDeque<String>,
    debug: bool,
}

impl Session {
    pub fn new(username: impl Into<String>, password: impl Into<String>, debug: bool) -> Self {
        Self {
            state: LoginState::Disconnected,
            username: username.into(),
            password: password.into(),
            framer: LineFramer::new(),
            queued: VecDeque::new(),
            debug,
        }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    pub fn is_logged_in(&self) -> bool {
        self.state == LoginState::LoggedIn
    }

    /// Number of commands waiting for login.
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// A TCP connect is about to be attempted.
    pub fn begin_connect(&mut self) {
        self.framer.clear();
        self.state = LoginState::Connecting;
    }

    /// The socket is up; wait for the login prompt.
    pub fn connected(&mut self) -> Vec<SessionOutput> {
        self.framer.clear();
        self.state = LoginState::AwaitingLoginPrompt;
        vec![SessionOutput::Event(BridgeEvent::Connected)]
    }

    /// The socket is gone. Queued commands are kept for the next login.
    pub fn closed(&mut self, reconnecting: bool) {
        self.framer.clear();
        self.state = if reconnecting {
            LoginState::Reconnecting
        } else {
            LoginState::Closed
        };
    }

    /// Queue a command line (without terminator).
    ///
    /// Written immediately when logged in, otherwise held until the next
    /// login in arrival order.
    pub fn enqueue(&mut self, line: impl Into<String>) -> Vec<SessionOutput> {
        let line = line.into();
        if self.is_logged_in() {
            vec![self.command_write(&line)]
        } else {
            debug!(
                "Not logged in ({}); queueing command ({} pending)",
                self.state,
                self.queued.len() + 1
            );
            self.queued.push_back(line);
            Vec::new()
        }
    }

    /// Feed bytes read from the socket.
    ///
    /// Processing stops at the first failure; the driver is expected to
    /// drop the socket at that point.
    pub fn receive(&mut self, chunk: &[u8]) -> Vec<SessionOutput> {
        let mut outputs = Vec::new();

        let lines: Vec<String> = self.framer.push(chunk).collect();
        for line in lines {
            if self.handle_line(&line, &mut outputs) {
                return outputs;
            }
        }

        // Prompts are never terminated, so a prompt sitting in the buffer
        // is complete as it stands.
        if let Some(prompt) = self
            .framer
            .take_partial_if(|partial| parse_line(partial).is_prompt())
        {
            self.handle_line(&prompt, &mut outputs);
        }

        outputs
    }

    /// Returns true when the session failed.
    fn handle_line(&mut self, line: &str, outputs: &mut Vec<SessionOutput>) -> bool {
        if self.debug {
            info!("Bridge -> {:?}", line);
        } else {
            trace!("Bridge -> {:?}", line);
        }

        match parse_line(line) {
            Message::LoginPrompt => match self.state {
                LoginState::AwaitingLoginPrompt | LoginState::AwaitingPasswordPrompt => {
                    debug!("Login prompt received, sending username");
                    outputs.push(self.credential_write(&self.username, false));
                    self.state = LoginState::AwaitingPasswordPrompt;
                }
                LoginState::LoggedIn => {
                    warn!("Bridge asked for login again after the password was sent");
                    outputs.push(SessionOutput::Fail(BridgeError::AuthenticationFailed));
                    return true;
                }
                state => trace!("Ignoring login prompt in state {}", state),
            },
            Message::PasswordPrompt => match self.state {
                LoginState::AwaitingPasswordPrompt => {
                    debug!("Password prompt received, sending password");
                    outputs.push(self.credential_write(&self.password, true));
                    self.state = LoginState::LoggedIn;
                    info!("Logged in to Lutron bridge");
                    outputs.push(SessionOutput::Event(BridgeEvent::LoggedIn));
                    if !self.queued.is_empty() {
                        debug!("Flushing {} queued command(s)", self.queued.len());
                    }
                    while let Some(line) = self.queued.pop_front() {
                        outputs.push(self.command_write(&line));
                    }
                }
                state => trace!("Ignoring password prompt in state {}", state),
            },
            Message::Ready => trace!("Ready prompt"),
            Message::Monitor(message) => {
                if self.is_logged_in() {
                    outputs.push(SessionOutput::Event(BridgeEvent::MonitorMessageReceived(
                        message,
                    )));
                } else {
                    debug!("Dropping device report received before login: {:?}", message);
                }
            }
            Message::Other(text) => trace!("Unhandled line: {:?}", text),
        }
        false
    }

    fn command_write(&self, line: &str) -> SessionOutput {
        if self.debug {
            info!("Bridge <- {:?}", line);
        }
        SessionOutput::Write(format!("{}{}", line, LINE_TERMINATOR))
    }

    fn credential_write(&self, value: &str, secret: bool) -> SessionOutput {
        if self.debug {
            if secret {
                info!("Bridge <- \"********\"");
            } else {
                info!("Bridge <- {:?}", value);
            }
        }
        SessionOutput::Write(format!("{}{}", value, LINE_TERMINATOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MonitorMessage;

    fn writes(outputs: &[SessionOutput]) -> Vec<&str> {
        outputs
            .iter()
            .filter_map(|o| match o {
                SessionOutput::Write(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn events(outputs: &[SessionOutput]) -> Vec<&BridgeEvent> {
        outputs
            .iter()
            .filter_map(|o| match o {
                SessionOutput::Event(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    fn connected_session() -> Session {
        let mut session = Session::new("lutron", "integration", false);
        session.begin_connect();
        assert_eq!(session.state(), LoginState::Connecting);
        let outputs = session.connected();
        assert_eq!(events(&outputs), vec![&BridgeEvent::Connected]);
        session
    }

    fn logged_in_session() -> Session {
        let mut session = connected_session();
        session.receive(b"login: ");
        session.receive(b"password: ");
        assert!(session.is_logged_in());
        session
    }

    #[test]
    fn test_login_sequence() {
        let mut session = connected_session();
        assert_eq!(session.state(), LoginState::AwaitingLoginPrompt);

        let outputs = session.receive(b"login: ");
        assert_eq!(writes(&outputs), vec!["lutron\r\n"]);
        assert!(events(&outputs).is_empty());
        assert_eq!(session.state(), LoginState::AwaitingPasswordPrompt);

        let outputs = session.receive(b"password: ");
        assert_eq!(writes(&outputs), vec!["integration\r\n"]);
        assert_eq!(events(&outputs), vec![&BridgeEvent::LoggedIn]);
        assert_eq!(session.state(), LoginState::LoggedIn);
    }

    #[test]
    fn test_prompt_split_across_reads() {
        let mut session = connected_session();
        assert!(session.receive(b"log").is_empty());
        let outputs = session.receive(b"in: ");
        assert_eq!(writes(&outputs), vec!["lutron\r\n"]);
    }

    #[test]
    fn test_queued_commands_flush_after_login_in_order() {
        let mut session = connected_session();
        assert!(session.enqueue("#DEVICE,2,4,3").is_empty());
        session.receive(b"login: ");
        assert!(session.enqueue("#DEVICE,2,4,4").is_empty());
        assert_eq!(session.queued_len(), 2);

        let outputs = session.receive(b"password: ");
        assert_eq!(
            writes(&outputs),
            vec!["integration\r\n", "#DEVICE,2,4,3\r\n", "#DEVICE,2,4,4\r\n"]
        );
        // LoggedIn comes before the flushed commands
        assert!(matches!(outputs[1], SessionOutput::Event(BridgeEvent::LoggedIn)));
        assert_eq!(session.queued_len(), 0);
    }

    #[test]
    fn test_enqueue_when_logged_in_writes_immediately() {
        let mut session = logged_in_session();
        let outputs = session.enqueue("?OUTPUT,5,1");
        assert_eq!(writes(&outputs), vec!["?OUTPUT,5,1\r\n"]);
    }

    #[test]
    fn test_monitor_message_after_login() {
        let mut session = logged_in_session();
        let outputs = session.receive(b"GNET> ~DEVICE,2,4,3\r\n");
        assert_eq!(
            events(&outputs),
            vec![&BridgeEvent::MonitorMessageReceived(MonitorMessage::new(
                "2", "4", "3"
            ))]
        );
    }

    #[test]
    fn test_monitor_message_before_login_dropped() {
        let mut session = connected_session();
        let outputs = session.receive(b"~DEVICE,2,4,3\r\n");
        assert!(outputs.is_empty());
    }

    #[test]
    fn test_login_prompt_after_login_is_auth_failure() {
        let mut session = logged_in_session();
        let outputs = session.receive(b"\r\nlogin: ");
        assert!(matches!(
            outputs.last(),
            Some(SessionOutput::Fail(BridgeError::AuthenticationFailed))
        ));
    }

    #[test]
    fn test_queue_survives_reconnect() {
        let mut session = connected_session();
        session.enqueue("#DEVICE,2,2,3");
        session.closed(true);
        assert_eq!(session.state(), LoginState::Reconnecting);

        session.begin_connect();
        session.connected();
        session.receive(b"login: ");
        let outputs = session.receive(b"password: ");
        assert_eq!(
            writes(&outputs),
            vec!["integration\r\n", "#DEVICE,2,2,3\r\n"]
        );
    }

    #[test]
    fn test_reconnect_discards_partial_line() {
        let mut session = logged_in_session();
        session.receive(b"~DEVICE,2,4");
        session.closed(true);
        session.begin_connect();
        session.connected();
        // The stale "~DEVICE,2,4" must not prefix the new socket's data
        let outputs = session.receive(b"login: ");
        assert_eq!(writes(&outputs), vec!["lutron\r\n"]);
    }

    #[test]
    fn test_password_prompt_out_of_order_ignored() {
        let mut session = connected_session();
        let outputs = session.receive(b"password: ");
        assert!(outputs.is_empty());
        assert_eq!(session.state(), LoginState::AwaitingLoginPrompt);
    }
}
