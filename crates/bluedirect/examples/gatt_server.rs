//! Serves a small attribute database to the next LE central that connects.
//!
//! The database has Generic Access, a Battery service whose level notifies, and a custom
//! writable characteristic. The battery level drains by one percent a second while the
//! central stays subscribed.

use bluedirect::att::constants::CHAR_USER_DESC_UUID;
use bluedirect::{
    AttPermissions, BdAddr, CharacteristicProperties, GattConfig, GattDatabaseBuilder, GattHandler, GattRole,
    GattServerMode, L2capSocket, Uuid,
};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut builder = GattDatabaseBuilder::new();
    builder.add_generic_access("BlueDirect Server", 0x0080, None)?;

    builder.add_primary_service(Uuid::from_u16(0x180F))?;
    let level_handle = builder.add_characteristic(
        Uuid::from_u16(0x2A19),
        CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
        AttPermissions::read_only(),
        vec![100],
    )?;

    builder.add_primary_service("6e400001-b5a3-f393-e0a9-e50e24dcca9e".parse()?)?;
    let custom_handle = builder.add_characteristic(
        "6e400002-b5a3-f393-e0a9-e50e24dcca9e".parse()?,
        CharacteristicProperties::READ | CharacteristicProperties::WRITE,
        AttPermissions::read_write(),
        b"hello".to_vec(),
    )?;
    builder.add_descriptor(Uuid::from_u16(CHAR_USER_DESC_UUID), AttPermissions::read_only(), b"Scratch".to_vec())?;

    let db = Arc::new(builder.build());
    println!("Database with {} attributes", db.len());

    let listener = L2capSocket::listen(&BdAddr::ANY)?;
    println!("Waiting for a central...");
    let (socket, remote, remote_type) = listener.accept()?;
    println!("Connected to {} ({:?})", remote, remote_type);

    let gatt = GattHandler::new(
        Arc::new(socket),
        remote,
        GattRole::Server,
        Duration::from_millis(420),
        GattConfig::default(),
        GattServerMode::Database(db.clone()),
    )?;

    let mut level = 100u8;
    while gatt.is_connected() {
        std::thread::sleep(Duration::from_secs(1));
        if gatt.client_char_config(level_handle).unwrap_or(0) == 0 {
            continue;
        }
        level = level.saturating_sub(1);
        db.set_value(level_handle, &[level])?;
        if let Err(e) = gatt.send_notification(level_handle, &[level]) {
            println!("Notification failed: {}", e);
        }
    }

    println!("Disconnected: {:?}", gatt.disconnect_reason());
    println!("Custom value was left at {:02x?}", db.value(custom_handle));
    Ok(())
}
