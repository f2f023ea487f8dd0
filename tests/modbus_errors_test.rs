use equinox::modbus::{
    decode_f32_le_words, decode_string, decode_u32_le_words, encode_f32_le_words,
    encode_u32_le_words,
};

#[test]
fn decode_f32_le_words_insufficient_registers() {
    let regs = [0x3F80u16];
    assert!(decode_f32_le_words(&regs).is_err());
}

#[test]
fn decode_u32_le_words_insufficient_registers() {
    assert!(decode_u32_le_words(&[]).is_err());
}

#[test]
fn decode_string_truncates_and_trims() {
    // "AB C" followed by 0xFF padding
    let regs = [0x4142u16, 0x2043u16, 0xFFFFu16, 0xFFFFu16];
    let s_full = decode_string(&regs, None).unwrap();
    assert_eq!(s_full, "AB C");

    let s_trunc = decode_string(&regs, Some(2)).unwrap();
    assert_eq!(s_trunc, "AB");
}

#[test]
fn decode_string_invalid_utf8_errors() {
    // 0xC3 starts a two-byte sequence that 0x28 does not continue
    let regs = [0xC328u16];
    assert!(decode_string(&regs, None).is_err());
}

#[test]
fn encode_le_words_values() {
    // 2.5f32 -> 0x40200000, low word first
    assert_eq!(encode_f32_le_words(2.5), [0x0000, 0x4020]);
    assert_eq!(encode_u32_le_words(3600), [3600, 0]);
    assert_eq!(encode_u32_le_words(0x0001_0002), [0x0002, 0x0001]);
}
