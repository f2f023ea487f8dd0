use equinox::channel::{Fault, RegisterChannel};
use equinox::config::ModbusConfig;
use equinox::modbus::{ModbusChannel, decode_f32_le_words, decode_string, encode_f32_le_words};
use equinox::registers::RegisterName;

#[test]
fn modbus_channel_starts_disconnected() {
    let cfg = ModbusConfig::default();
    let channel = ModbusChannel::new(&cfg);
    assert!(!channel.is_connected());
}

#[test]
fn decode_f32_le_words_happy_path() {
    let regs = [0x0000u16, 0x3F80u16];
    assert!((decode_f32_le_words(&regs).unwrap() - 1.0).abs() < f32::EPSILON);
}

#[test]
fn encode_f32_le_words_happy_path() {
    assert_eq!(encode_f32_le_words(1.0), [0x0000, 0x3F80]);
}

#[test]
fn decode_string_happy_path() {
    let regs = [0x4142u16, 0x4300u16, 0x0000u16];
    assert_eq!(decode_string(&regs, None).unwrap(), "ABC");
}

#[test]
fn modbus_config_defaults() {
    let c = ModbusConfig::default();
    assert_eq!(c.port, 1502);
    assert_eq!(c.unit, 1);
    assert_eq!(c.timeout_secs, 1);
}

#[tokio::test]
async fn modbus_connect_invalid_address_errors() {
    let cfg = ModbusConfig {
        host: "bad host".to_string(),
        ..Default::default()
    };
    let mut channel = ModbusChannel::new(&cfg);
    let err = channel.connect().await.unwrap_err();
    assert!(err.is_transient());
    assert!(err.to_string().contains("Invalid socket address"));
}

#[tokio::test]
async fn modbus_read_write_without_connect_returns_not_connected() {
    let cfg = ModbusConfig::default();
    let mut channel = ModbusChannel::new(&cfg);
    let err_r = channel.read(RegisterName::RcCmdMode).await.unwrap_err();
    assert_eq!(err_r, Fault::NotConnected);
    let err_w = channel
        .write(RegisterName::RcCmdMode, 5.0)
        .await
        .unwrap_err();
    assert_eq!(err_w, Fault::NotConnected);
}

#[tokio::test]
async fn disconnect_without_connection_is_a_no_op() {
    let mut channel = ModbusChannel::new(&ModbusConfig::default());
    channel.disconnect().await;
    assert!(!channel.is_connected());
}
