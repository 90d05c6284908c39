//! gattmaster BLE transport
//!
//! Drives a single peripheral through the host's Bluetooth adapter using
//! btleplug.
//!
//! # Example
//!
//! ```ignore
//! use gattmaster_ble::ble::{BleOptions, BleTransport};
//! use gattmaster_proto::Transport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut transport = BleTransport::find(BleOptions::new("ecfe7e123456")).await?;
//!     transport.connect().await?;
//!
//!     let name = transport.read("1800", "2a00").await?;
//!     println!("{}", String::from_utf8_lossy(&name));
//!
//!     transport.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod ble;
