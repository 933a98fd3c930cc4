//! Receive core status and RF codes while sending from the main thread.
//!
//! Subscribing to `core` and disabling the receiver-only filter makes the
//! daemon's CPU/RAM reports and the echoes of our own sends show up too.

use std::sync::Arc;
use std::time::Duration;

use pilight_client::{Client, ClientConfig, IdentifyOptions, init_logging};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(false);

    let config = ClientConfig {
        recv_ident: Some(
            IdentifyOptions::default()
                .with("core", 1)
                .with("receiver", 1),
        ),
        recv_codes_only: false,
        ..ClientConfig::new("127.0.0.1", 5000)
    };

    let client = Arc::new(Client::connect(config)?);
    client.set_handler(|event| println!("{}", event.into_value()))?;
    client.start()?;

    let sender = {
        let client = client.clone();
        std::thread::spawn(move || {
            for id in 1..=5 {
                std::thread::sleep(Duration::from_secs(2));
                let code = json!({"protocol": ["kaku_switch"], "id": id, "unit": 0, "off": 1});
                if let Err(e) = client.send_code(&code, true) {
                    eprintln!("send failed: {}", e);
                }
            }
        })
    };

    if sender.join().is_err() {
        eprintln!("sender thread panicked");
    }
    client.stop();
    Ok(())
}
