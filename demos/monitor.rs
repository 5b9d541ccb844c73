//! Example: Log in to a bridge and print every device report.
//!
//! Usage: cargo run --example monitor -- <bridge-ip> [username] [password]

use lutron_bridge::{BridgeConfig, BridgeConnection, BridgeEvent, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "192.168.1.100".to_string());
    let username = args.next().unwrap_or_else(|| "lutron".to_string());
    let password = args.next().unwrap_or_else(|| "integration".to_string());

    let config = BridgeConfig::builder()
        .host(host)
        .username(username)
        .password(password)
        .debug(true)
        .build();

    let connection = BridgeConnection::connect(config, None);
    let mut events = connection.subscribe();

    // Queued until the login completes
    connection.send(Command::Monitoring {
        kind: 1,
        enabled: true,
    })?;

    println!("Listening for device reports (Ctrl+C to stop)...\n");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(BridgeEvent::MonitorMessageReceived(msg)) => {
                        println!(
                            "Device {} component {} action {}",
                            msg.integration_id, msg.component, msg.action
                        );
                    }
                    Ok(BridgeEvent::LoggedIn) => {
                        println!("Logged in");
                    }
                    Ok(BridgeEvent::Closed) => {
                        println!("Bridge connection closed, waiting for reconnect...");
                    }
                    Ok(event) => {
                        println!("Event: {:?}", event);
                    }
                    Err(e) => {
                        println!("Event channel error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                break;
            }
        }
    }

    connection.destroy().await;
    Ok(())
}
