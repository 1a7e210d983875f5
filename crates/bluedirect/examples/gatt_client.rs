//! Connects to an LE peripheral, discovers its GATT tree and prints every readable value.
//!
//! Usage: gatt_client <XX:XX:XX:XX:XX:XX> [random]
//!
//! Characteristics that notify or indicate are subscribed to for ten seconds.

use bluedirect::{
    AddressType, BdAddr, CharacteristicProperties, GattCharListener, GattConfig, GattHandler, GattRole,
    GattServerMode, L2capSocket, ValueEvent,
};
use std::sync::Arc;
use std::time::Duration;

struct Printer;

impl GattCharListener for Printer {
    fn notification_received(&self, event: &ValueEvent<'_>) {
        println!("  notification 0x{:04x}: {:02x?}", event.handle, event.value);
    }

    fn indication_received(&self, event: &ValueEvent<'_>, _confirmation_sent: bool) {
        println!("  indication 0x{:04x}: {:02x?}", event.handle, event.value);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let remote: BdAddr = args.next().ok_or("missing device address")?.parse()?;
    let remote_type = match args.next().as_deref() {
        Some("random") => AddressType::Random,
        _ => AddressType::Public,
    };

    println!("Connecting to {}...", remote);
    let socket = L2capSocket::connect(&BdAddr::ANY, &remote, remote_type)?;
    let gatt = GattHandler::new(
        Arc::new(socket),
        remote,
        GattRole::Client,
        Duration::from_millis(420),
        GattConfig::default(),
        GattServerMode::Nop,
    )?;

    gatt.init_client_gatt()?;
    println!("MTU {}", gatt.used_mtu());
    if let Some(ga) = gatt.generic_access() {
        println!("{}", ga);
    }

    let listener: Arc<dyn GattCharListener> = Arc::new(Printer);
    gatt.add_char_listener(listener, None);

    let mut subscribed = 0;
    for service in gatt.services() {
        println!("{}", service);
        for characteristic in &service.characteristics {
            println!("  {}", characteristic);
            if characteristic.properties.contains(CharacteristicProperties::READ) {
                match gatt.read_characteristic_value(characteristic, -1) {
                    Ok(value) => println!("    value: {:02x?}", value),
                    Err(e) => println!("    failed to read: {}", e),
                }
            }
            for descriptor in &characteristic.descriptors {
                println!("    descriptor {} 0x{:04x}: {:02x?}", descriptor.type_, descriptor.handle, descriptor.value);
            }
            if characteristic.client_char_config().is_some() {
                match gatt.enable_notification_or_indication(characteristic) {
                    Ok(_) => subscribed += 1,
                    Err(e) => println!("    failed to subscribe: {}", e),
                }
            }
        }
    }

    if subscribed > 0 {
        println!("Listening to {} characteristics...", subscribed);
        std::thread::sleep(Duration::from_secs(10));
    }

    gatt.ping()?;
    gatt.disconnect();
    println!("Done!");
    Ok(())
}
