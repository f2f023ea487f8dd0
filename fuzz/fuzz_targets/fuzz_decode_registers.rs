#![no_main]
use equinox::registers::RegisterName;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Interpret the input as u16 register stream in big-endian pairs
    let mut regs = Vec::new();
    let mut it = data.chunks_exact(2);
    for b in &mut it {
        regs.push(u16::from_be_bytes([b[0], b[1]]));
    }

    // Exercise the decoders under varying lengths
    let _ = equinox::modbus::decode_u32_le_words(&regs);
    let _ = equinox::modbus::decode_f32_le_words(&regs);
    let _ = equinox::modbus::decode_string(&regs, Some(32));
    for register in RegisterName::ALL {
        if let Ok(value) = register.decode(&regs) {
            // Whatever the device reports must survive a write encode
            let _ = register.encode(value);
        }
    }
});
