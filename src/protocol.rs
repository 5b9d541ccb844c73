// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

/// Prompt the bridge shows once a session is ready (Caseta / RA2 Select use
/// `GNET>`, RadioRA 2 main repeaters use `QNET>`).
const READY_PROMPTS: [&str; 2] = ["GNET>", "QNET>"];

/// Sigil that starts a device event report.
const DEVICE_SIGIL: &str = "~DEVICE";

/// Line terminator for everything written to the bridge.
pub const LINE_TERMINATOR: &str = "\r\n";

/// A parsed `~DEVICE` report.
///
/// All fields are kept as the strings the bridge sent; the accessory
/// layer decides what the component and action mean.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonitorMessage {
    pub integration_id: String,
    pub component: String,
    pub action: String,
}

impl MonitorMessage {
    pub fn new(
        integration_id: impl Into<String>,
        component: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            integration_id: integration_id.into(),
            component: component.into(),
            action: action.into(),
        }
    }
}

/// Classification of a single line received from the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `login:`: the bridge wants a username
    LoginPrompt,
    /// `password:`: the bridge wants a password
    PasswordPrompt,
    /// `GNET>`: the shell prompt, shown after login and after every command
    Ready,
    /// `~DEVICE,<id>,<component>,<action>`
    Monitor(MonitorMessage),
    /// Anything else (command echoes, `~OUTPUT` reports, errors). Kept for debug logs.
    Other(String),
}

impl Message {
    /// Whether this message is one of the three prompts.
    pub fn is_prompt(&self) -> bool {
        matches!(
            self,
            Message::LoginPrompt | Message::PasswordPrompt | Message::Ready
        )
    }
}

/// Classify one line (terminator already removed).
///
/// Never fails: malformed device reports come back as [`Message::Other`].
/// Leading ready prompts are stripped first, because the bridge does not
/// terminate `GNET> ` and the next report is often glued to it.
pub fn parse_line(line: &str) -> Message {
    if line.trim().is_empty() {
        return Message::Other(line.to_string());
    }
    let body = strip_ready_prompts(line);
    if body.is_empty() {
        return Message::Ready;
    }

    let lowered = body.to_ascii_lowercase();
    if lowered.starts_with("login:") {
        return Message::LoginPrompt;
    }
    if lowered.starts_with("password:") {
        return Message::PasswordPrompt;
    }

    match parse_device_report(body) {
        Some(report) => Message::Monitor(report),
        None => Message::Other(line.to_string()),
    }
}

/// Remove any number of leading `GNET> ` tokens and surrounding whitespace.
fn strip_ready_prompts(line: &str) -> &str {
    let mut rest = line.trim();
    loop {
        let before = rest;
        for prompt in READY_PROMPTS {
            if let Some(stripped) = rest.strip_prefix(prompt) {
                rest = stripped.trim_start();
            }
        }
        if rest.len() == before.len() {
            return rest;
        }
    }
}

/// Parse `~DEVICE,2,4,3` into its three fields.
fn parse_device_report(body: &str) -> Option<MonitorMessage> {
    let rest = body.strip_prefix(DEVICE_SIGIL)?.strip_prefix(',')?;
    let fields: Vec<&str> = rest.split(',').map(str::trim).collect();
    let [id, component, action] = fields.as_slice() else {
        return None;
    };
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if component.is_empty() || action.is_empty() {
        return None;
    }
    Some(MonitorMessage::new(*id, *component, *action))
}

/// Commands that can be sent to the bridge.
///
/// Every command is a single text line; [`Command::to_wire_string`] gives
/// the line without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Pre-formatted command, written verbatim.
    Raw(String),
    /// `#DEVICE,<id>,<component>,<action>`: emulate a button action.
    Device {
        integration_id: u32,
        component: u32,
        action: u32,
    },
    /// `#OUTPUT,<id>,1,<level>`: set a dimmer/switch level (0-100).
    SetOutputLevel { integration_id: u32, level: u8 },
    /// `?OUTPUT,<id>,1`: query an output level; answered with `~OUTPUT`.
    QueryOutputLevel { integration_id: u32 },
    /// `#MONITORING,<kind>,<1|2>`: enable or disable a monitoring class.
    Monitoring { kind: u8, enabled: bool },
}

/// Action code for a button press.
pub const ACTION_PRESS: u32 = 3;
/// Action code for a button release.
pub const ACTION_RELEASE: u32 = 4;

impl Command {
    /// Convert the command to its wire string representation.
    pub fn to_wire_string(&self) -> String {
        match self {
            Command::Raw(s) => s.clone(),
            Command::Device {
                integration_id,
                component,
                action,
            } => format!("#DEVICE,{},{},{}", integration_id, component, action),
            Command::SetOutputLevel {
                integration_id,
                level,
            } => format!("#OUTPUT,{},1,{}", integration_id, (*level).min(100)),
            Command::QueryOutputLevel { integration_id } => {
                format!("?OUTPUT,{},1", integration_id)
            }
            Command::Monitoring { kind, enabled } => {
                format!("#MONITORING,{},{}", kind, if *enabled { 1 } else { 2 })
            }
        }
    }

    /// The wire line including its terminator.
    pub fn to_line(&self) -> String {
        format!("{}{}", self.to_wire_string(), LINE_TERMINATOR)
    }

    /// A full button press: press followed by release.
    pub fn button_press(integration_id: u32, component: u32) -> [Command; 2] {
        [
            Command::Device {
                integration_id,
                component,
                action: ACTION_PRESS,
            },
            Command::Device {
                integration_id,
                component,
                action: ACTION_RELEASE,
            },
        ]
    }
}

impl From<String> for Command {
    fn from(s: String) -> Self {
        Command::Raw(s)
    }
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        Command::Raw(s.to_string())
    }
}
