//! Send two codes to a daemon on localhost:5000.
//!
//! The first is acknowledged; the second carries an invalid id and is
//! rejected by a real daemon.

use pilight_client::{Client, ClientConfig, init_logging};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(false);

    let client = Client::connect(ClientConfig::new("127.0.0.1", 5000))?;

    client.send_code(
        &json!({"protocol": ["kaku_switch"], "id": 1, "unit": 0, "off": 1}),
        true,
    )?;
    println!("first code acknowledged");

    match client.send_code(
        &json!({"protocol": ["kaku_switch"], "id": 0, "unit": 0, "off": 1}),
        true,
    ) {
        Ok(()) => println!("second code acknowledged"),
        Err(e) => println!("second code rejected: {} ({})", e, e.error_code()),
    }

    client.stop();
    Ok(())
}
