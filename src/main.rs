// MIT License - Copyright (c) 2026 Peter Wright
// MQTT bridge

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use lutron_bridge::{
    AccessoryCache, AccessoryConfig, AccessoryHandle, BridgeConfig, BridgeEvent, ButtonPress,
    Command, CommandSender, Host, LutronBridge, ReconnectPolicy,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "lutron2mqtt")]
#[command(about = "Bridge between a Lutron integration bridge and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    bridge: BridgeToml,
    mqtt: MqttToml,
    /// Where accessory handles are kept between runs
    #[serde(default = "default_cache_path")]
    cache_path: String,
    #[serde(default)]
    accessories: Vec<AccessoryConfig>,
}

fn default_cache_path() -> String {
    "accessories.json".to_string()
}

#[derive(Debug, Deserialize)]
struct BridgeToml {
    host: String,
    #[serde(default = "default_bridge_port")]
    port: u16,
    #[serde(default = "default_username")]
    username: String,
    #[serde(default = "default_password")]
    password: String,
    #[serde(default)]
    debug: bool,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_ms: u64,
    #[serde(default = "default_login_timeout")]
    login_timeout_ms: u64,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_ms: u64,
    /// 0 retries forever
    #[serde(default)]
    reconnect_max_attempts: u32,
}

fn default_bridge_port() -> u16 {
    23
}
fn default_username() -> String {
    "lutron".to_string()
}
fn default_password() -> String {
    "integration".to_string()
}
fn default_connect_timeout() -> u64 {
    10000
}
fn default_login_timeout() -> u64 {
    30000
}
fn default_reconnect_delay() -> u64 {
    5000
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_subscribe_topic")]
    subscribe_topic: String,
    #[serde(default = "default_publish_topic")]
    publish_topic: String,
}

fn default_client_id() -> String {
    "lutron-bridge".to_string()
}
fn default_subscribe_topic() -> String {
    "lutron/cmd".to_string()
}
fn default_publish_topic() -> String {
    "lutron".to_string()
}

fn build_bridge_config(toml: &BridgeToml) -> BridgeConfig {
    let reconnect = ReconnectPolicy {
        base_delay_ms: toml.reconnect_delay_ms,
        max_attempts: (toml.reconnect_max_attempts > 0).then_some(toml.reconnect_max_attempts),
        ..ReconnectPolicy::default()
    };
    BridgeConfig::builder()
        .host(&toml.host)
        .port(toml.port)
        .username(&toml.username)
        .password(&toml.password)
        .debug(toml.debug)
        .connect_timeout_ms(toml.connect_timeout_ms)
        .login_timeout_ms(toml.login_timeout_ms)
        .reconnect(reconnect)
        .build()
}

fn load_config(path: &str) -> Result<Config> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&text).context("Failed to parse config file")
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Published messages: all share {now, op, ...} flat structure

#[derive(Serialize, Clone)]
struct MqttButton {
    component: u32,
    label: String,
    index: u32,
}

// Retained accessory description: {now, op, accessory}
#[derive(Serialize, Clone)]
struct MqttAccessory {
    #[serde(rename = "integrationId")]
    integration_id: u32,
    uuid: Uuid,
    name: String,
    buttons: Vec<MqttButton>,
}

#[derive(Serialize)]
struct MqttAccessoryEvent {
    now: u64,
    op: String,
    accessory: MqttAccessory,
}

// Button events: {now, op, integrationId, uuid, name, button, event, value}
#[derive(Serialize)]
struct MqttButtonEvent {
    now: u64,
    op: String,
    #[serde(rename = "integrationId")]
    integration_id: u32,
    uuid: Uuid,
    name: String,
    button: MqttButton,
    event: String,
    value: u8,
}

// Bridge status: {now, op} or {now, op, error}
#[derive(Serialize)]
struct MqttBridgeEvent {
    now: u64,
    op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// CMD_ACK response
#[derive(Serialize)]
struct MqttCmdAck {
    now: u64,
    op: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

// Inbound command (subscribed)
#[derive(Deserialize)]
struct MqttCommand {
    op: String,
    #[serde(default)]
    #[allow(dead_code)]
    op_id: Option<String>,
    #[serde(default, rename = "integrationId")]
    integration_id: Option<u32>,
    #[serde(default)]
    component: Option<u32>,
    #[serde(default)]
    level: Option<u8>,
    #[serde(default)]
    command: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn accessory_payload(handle: &AccessoryHandle) -> Option<MqttAccessory> {
    let context = match handle.resolve_context() {
        Ok(context) => context,
        Err(e) => {
            warn!("Not publishing accessory '{}': {e}", handle.display_name);
            return None;
        }
    };
    let buttons = handle
        .services
        .iter()
        .filter_map(|s| {
            Some(MqttButton {
                component: s.subtype.parse().ok()?,
                label: s.label.clone(),
                index: s.index,
            })
        })
        .collect();
    Some(MqttAccessory {
        integration_id: context.config.integration_id,
        uuid: handle.uuid,
        name: handle.display_name.clone(),
        buttons,
    })
}

/// Queue a publish without waiting. Host callbacks run on the bridge
/// connection task, so they must not await the MQTT client.
fn publish_now(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.try_publish(topic, QoS::AtLeastOnce, retain, json) {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

async fn publish_cmd_ack(
    client: &AsyncClient,
    topic: &str,
    success: bool,
    src: Option<serde_json::Value>,
    data: Option<serde_json::Value>,
) {
    let msg = MqttCmdAck {
        now: now_epoch_ms(),
        op: "CMD_ACK".to_string(),
        success,
        src,
        data,
    };
    publish_json(client, topic, &msg, false).await;
}

async fn publish_bridge_event(client: &AsyncClient, topic: &str, op: &str, error: Option<String>) {
    let msg = MqttBridgeEvent {
        now: now_epoch_ms(),
        op: op.to_string(),
        error,
    };
    publish_json(client, topic, &msg, false).await;
}

// ---------------------------------------------------------------------------
// Host: accessories and button presses → MQTT
// ---------------------------------------------------------------------------

struct MqttHost {
    client: AsyncClient,
    topic: String,
    cache: AccessoryCache,
    known: Mutex<BTreeMap<Uuid, AccessoryHandle>>,
}

impl MqttHost {
    fn new(
        client: AsyncClient,
        topic: String,
        cache: AccessoryCache,
        cached: &[AccessoryHandle],
    ) -> Self {
        let known = cached.iter().map(|h| (h.uuid, h.clone())).collect();
        Self {
            client,
            topic,
            cache,
            known: Mutex::new(known),
        }
    }

    fn accessory_topic(&self, integration_id: u32) -> String {
        format!("{}/accessory/{integration_id}", self.topic)
    }

    /// Record handles, publish them retained and rewrite the cache file.
    fn store(&self, handles: &[AccessoryHandle]) {
        let snapshot: Vec<AccessoryHandle> = {
            let mut known = self.known.lock().unwrap_or_else(|p| p.into_inner());
            for handle in handles {
                known.insert(handle.uuid, handle.clone());
            }
            known.values().cloned().collect()
        };

        for handle in handles {
            if let Some(accessory) = accessory_payload(handle) {
                let topic = self.accessory_topic(accessory.integration_id);
                let msg = MqttAccessoryEvent {
                    now: now_epoch_ms(),
                    op: "ACCESSORY".to_string(),
                    accessory,
                };
                publish_now(&self.client, &topic, &msg, true);
            }
        }

        if let Err(e) = self.cache.save(&snapshot) {
            error!(
                "Failed to write accessory cache {}: {e}",
                self.cache.path().display()
            );
        }
    }

    fn accessory_list(&self) -> Vec<MqttAccessory> {
        let known = self.known.lock().unwrap_or_else(|p| p.into_inner());
        let mut list: Vec<MqttAccessory> = known.values().filter_map(accessory_payload).collect();
        list.sort_by_key(|a| a.integration_id);
        list
    }
}

impl Host for MqttHost {
    fn register_accessories(&self, accessories: &[AccessoryHandle]) {
        info!("Registering {} new accessories", accessories.len());
        self.store(accessories);
    }

    fn update_accessories(&self, accessories: &[AccessoryHandle]) {
        debug!("Updating {} accessories", accessories.len());
        self.store(accessories);
    }

    fn button_event(&self, press: &ButtonPress) {
        info!(
            "{} ({}): {} {}",
            press.accessory_name, press.integration_id, press.button.label, press.event
        );
        let Ok(component) = press.button.subtype.parse::<u32>() else {
            warn!("Non-numeric button component {}", press.button.subtype);
            return;
        };
        let msg = MqttButtonEvent {
            now: now_epoch_ms(),
            op: "BUTTON".to_string(),
            integration_id: press.integration_id,
            uuid: press.accessory,
            name: press.accessory_name.clone(),
            button: MqttButton {
                component,
                label: press.button.label.clone(),
                index: press.button.index,
            },
            event: press.event.as_str().to_string(),
            value: press.event.value(),
        };
        publish_now(&self.client, &self.topic, &msg, false);
    }
}

// ---------------------------------------------------------------------------
// Bridge event → MQTT
// ---------------------------------------------------------------------------

async fn handle_bridge_event(event: BridgeEvent, client: &AsyncClient, topic: &str) {
    match event {
        BridgeEvent::Connected => {
            publish_bridge_event(client, topic, "BRIDGE_CONNECTED", None).await;
        }
        BridgeEvent::LoggedIn => {
            info!("Bridge logged in");
            publish_bridge_event(client, topic, "BRIDGE_LOGGED_IN", None).await;
        }
        BridgeEvent::Closed => {
            warn!("Bridge connection closed");
            publish_bridge_event(client, topic, "BRIDGE_CLOSED", None).await;
        }
        BridgeEvent::Error(e) => {
            publish_bridge_event(client, topic, "BRIDGE_ERROR", Some(e)).await;
        }
        BridgeEvent::MonitorMessageReceived(msg) => {
            debug!(
                "Monitor: id {} component {} action {}",
                msg.integration_id, msg.component, msg.action
            );
        }
    }
}

// ---------------------------------------------------------------------------
// MQTT command handler
// ---------------------------------------------------------------------------

/// Queue bridge commands and log the result. Returns `true` on success.
fn exec_bridge_cmd(
    op: &str,
    sender: &CommandSender,
    commands: impl IntoIterator<Item = Command>,
) -> bool {
    for command in commands {
        let wire = command.to_wire_string();
        if let Err(e) = sender.send(command) {
            error!("{op} {wire} failed: {e}");
            return false;
        }
        debug!("{op}: queued {wire}");
    }
    true
}

async fn handle_command(
    payload_str: &str,
    cmd: MqttCommand,
    client: &AsyncClient,
    topic: &str,
    sender: &CommandSender,
    host: &MqttHost,
) {
    // Parse the raw payload as a JSON value for the CMD_ACK src field
    let src_json = serde_json::from_str::<serde_json::Value>(payload_str).ok();

    match cmd.op.as_str() {
        "PING" => {
            info!("Command: PING");
            publish_cmd_ack(client, topic, true, src_json, None).await;
        }

        "LIST" => {
            debug!("Command: LIST");
            let data = serde_json::to_value(host.accessory_list()).ok();
            publish_cmd_ack(client, topic, data.is_some(), src_json, data).await;
        }

        "RAW" => {
            let Some(line) = cmd.command.filter(|c| !c.trim().is_empty()) else {
                warn!("RAW: missing command");
                publish_cmd_ack(client, topic, false, src_json, None).await;
                return;
            };
            info!("Command: RAW {line}");
            let success = exec_bridge_cmd("RAW", sender, [Command::Raw(line)]);
            publish_cmd_ack(client, topic, success, src_json, None).await;
        }

        "PRESS" => {
            let (Some(id), Some(component)) = (cmd.integration_id, cmd.component) else {
                warn!("PRESS: missing integrationId or component");
                publish_cmd_ack(client, topic, false, src_json, None).await;
                return;
            };
            info!("Command: PRESS device {id} component {component}");
            let success = exec_bridge_cmd("PRESS", sender, Command::button_press(id, component));
            publish_cmd_ack(client, topic, success, src_json, None).await;
        }

        "SET_LEVEL" => {
            let id = match cmd.integration_id {
                Some(id) => id,
                None => {
                    warn!("SET_LEVEL: missing integrationId");
                    publish_cmd_ack(client, topic, false, src_json, None).await;
                    return;
                }
            };
            let level = match cmd.level {
                Some(level) if level <= 100 => level,
                Some(level) => {
                    warn!("SET_LEVEL: invalid level {level} (must be 0-100)");
                    publish_cmd_ack(client, topic, false, src_json, None).await;
                    return;
                }
                None => {
                    warn!("SET_LEVEL: missing level");
                    publish_cmd_ack(client, topic, false, src_json, None).await;
                    return;
                }
            };
            info!("Command: SET_LEVEL output {id} to {level}");
            let success = exec_bridge_cmd(
                "SET_LEVEL",
                sender,
                [Command::SetOutputLevel {
                    integration_id: id,
                    level,
                }],
            );
            publish_cmd_ack(client, topic, success, src_json, None).await;
        }

        other => {
            warn!("Unknown command: {other}");
            publish_cmd_ack(client, topic, false, src_json, None).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=lutron_bridge=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    let (mut mqtt_host, mut mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        let publish_topic = config.mqtt.publish_topic.clone();
        let subscribe_topic = config.mqtt.subscribe_topic.clone();

        // Set up MQTT
        let mut mqtt_opts = MqttOptions::new(&config.mqtt.client_id, &mqtt_host, mqtt_port);
        mqtt_opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

        // Restore cached accessories, then reconcile configuration against them
        let cache = AccessoryCache::new(&config.cache_path);
        let cached = match cache.load() {
            Ok(handles) => handles,
            Err(e) => {
                warn!("Ignoring unreadable accessory cache {}: {e}", config.cache_path);
                Vec::new()
            }
        };
        let host = Arc::new(MqttHost::new(
            client.clone(),
            publish_topic.clone(),
            cache,
            &cached,
        ));

        let mut bridge = LutronBridge::new(build_bridge_config(&config.bridge), host.clone());
        let restored = bridge.restore_cached(cached)?;
        info!("Restored {restored} cached accessories");
        bridge.reconcile(&config.accessories)?;

        info!(
            "Connecting to Lutron bridge at {}:{}",
            config.bridge.host, config.bridge.port
        );
        bridge.start();
        let event_rx = bridge
            .subscribe()
            .context("Bridge connection not started")?;
        let sender = bridge
            .command_sender()
            .context("Bridge connection not started")?;

        // Task 1: Bridge event listener
        let client_events = client.clone();
        let topic_events = publish_topic.clone();
        let event_handle = tokio::spawn(async move {
            let mut rx = event_rx;
            loop {
                match rx.recv().await {
                    Ok(event) => handle_bridge_event(event, &client_events, &topic_events).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event receiver lagged, missed {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        info!("Event channel closed");
                        break;
                    }
                }
            }
        });

        // Task 2: MQTT event loop (receives messages, handles commands)
        let client_cmds = client.clone();
        let topic_cmds = publish_topic.clone();
        let host_cmds = host.clone();
        let sub_topic = subscribe_topic.clone();
        let mqtt_handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // rumqttc does not resubscribe after a broker reconnect
                        info!("MQTT: connected, subscribing to {sub_topic}");
                        if let Err(e) =
                            client_cmds.subscribe(&sub_topic, QoS::AtLeastOnce).await
                        {
                            error!("Failed to subscribe to {sub_topic}: {e}");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        if msg.topic == sub_topic {
                            let payload = String::from_utf8_lossy(&msg.payload);
                            match serde_json::from_str::<MqttCommand>(&payload) {
                                Ok(cmd) => {
                                    if cmd.op == "LIST" || cmd.op == "PING" {
                                        debug!("MQTT command received: {payload}");
                                    } else {
                                        info!("MQTT command received: {payload}");
                                    }
                                    handle_command(
                                        &payload,
                                        cmd,
                                        &client_cmds,
                                        &topic_cmds,
                                        &sender,
                                        &host_cmds,
                                    )
                                    .await;
                                }
                                Err(e) => {
                                    warn!("Failed to parse MQTT command: {e}");
                                }
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT event loop error: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        // Wait for a signal
        info!("MQTT bridge running. Send SIGHUP to restart, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting connections...");
                true
            }
        };

        // Close the bridge first so no host callback races the MQTT teardown
        bridge.shutdown().await;
        event_handle.abort();
        mqtt_handle.abort();

        if !restart {
            break;
        }

        // Reload config from disk; keep previous config on failure
        info!("Reloading config from {}", cli.config);
        match load_config(&cli.config) {
            Ok(new_config) => match parse_mqtt_url(&new_config.mqtt.url) {
                Ok((new_host, new_port)) => {
                    mqtt_host = new_host;
                    mqtt_port = new_port;
                    config = new_config;
                    info!("Config reloaded successfully");
                }
                Err(e) => warn!("Invalid MQTT URL in new config, keeping previous: {e}"),
            },
            Err(e) => warn!("Failed to reload config, keeping previous: {e}"),
        }

        info!("Reconnecting...");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str.parse().context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}
