//! Print every code the daemon receives for ten seconds.
//!
//! Reads `~/.pilight/config.toml` if present.

use std::time::Duration;

use pilight_client::{Client, init_logging, load_client_config};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(true);

    let client = Client::connect(load_client_config()?)?;
    client.set_handler(|event| println!("{}", event.into_value()))?;
    client.start()?;

    std::thread::sleep(Duration::from_secs(10));
    client.stop();
    Ok(())
}
