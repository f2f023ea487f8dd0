#![allow(dead_code)]

use async_trait::async_trait;
use equinox::channel::{Fault, RegisterChannel, WriteAck};
use equinox::modbus::{encode_f32_le_words, encode_u32_le_words};
use equinox::registers::{RegisterName, RegisterValue, battery};
use std::collections::{HashMap, HashSet, VecDeque};

/// Requests seen by the fake, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Connect,
    Disconnect,
    Read(u16, u16),
    Write(u16, Vec<u16>),
}

/// In-memory register map with scripted faults
#[derive(Debug, Default)]
pub struct FakeChannel {
    pub registers: HashMap<u16, u16>,
    pub connected: bool,
    pub connect_faults: VecDeque<Fault>,
    pub write_faults: VecDeque<Fault>,
    pub read_faults: VecDeque<Fault>,
    /// Addresses whose writes get an exception reply
    pub reject_writes: HashSet<u16>,
    /// Addresses whose writes are acknowledged but not stored
    pub ignore_writes: HashSet<u16>,
    pub ops: Vec<Op>,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A SolarEdge battery with the given state in slot 1
    pub fn with_battery(soe: f64, rated_energy_wh: f64) -> Self {
        let mut fake = Self::new();
        let base = battery::BASES[0];
        fake.set_string(base + battery::MANUFACTURER, "SolarEdge");
        fake.set_string(base + battery::MODEL, "BAT-10K1P");
        fake.set_f32(base + battery::RATED_ENERGY, rated_energy_wh);
        fake.set_f32(base + battery::SOE, soe);
        fake.set_f32(base + battery::SOH, 100.0);
        fake
    }

    /// Typical remote-controlled storage block
    pub fn with_storage(mut self, rc_cmd_mode: u16, rc_charge_limit: f64, backup_reserve: f64) -> Self {
        self.set(RegisterName::StorageControlMode, 4.0);
        self.set(RegisterName::StorageDefaultMode, 7.0);
        self.set(RegisterName::RcCmdTimeout, 3600.0);
        self.set(RegisterName::RcCmdMode, f64::from(rc_cmd_mode));
        self.set(RegisterName::RcChargeLimit, rc_charge_limit);
        self.set(RegisterName::StorageBackupReservedSetting, backup_reserve);
        self
    }

    pub fn set_words(&mut self, address: u16, words: &[u16]) {
        for (i, word) in words.iter().enumerate() {
            self.registers.insert(address + i as u16, *word);
        }
    }

    pub fn set_f32(&mut self, address: u16, value: f64) {
        self.set_words(address, &encode_f32_le_words(value as f32));
    }

    pub fn set_u32(&mut self, address: u16, value: u32) {
        self.set_words(address, &encode_u32_le_words(value));
    }

    /// Store a 16-register, NUL padded string field
    pub fn set_string(&mut self, address: u16, value: &str) {
        let mut bytes = value.as_bytes().to_vec();
        bytes.resize(32, 0);
        let words: Vec<u16> = bytes
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        self.set_words(address, &words);
    }

    pub fn set(&mut self, register: RegisterName, value: RegisterValue) {
        self.set_words(register.address(), &register.encode(value));
    }

    pub fn get(&self, register: RegisterName) -> RegisterValue {
        let words = self.words(register.address(), register.kind().word_count());
        register.decode(&words).unwrap()
    }

    fn words(&self, address: u16, count: u16) -> Vec<u16> {
        (0..count)
            .map(|i| self.registers.get(&(address + i)).copied().unwrap_or(0))
            .collect()
    }

    pub fn count(&self, op: fn(&Op) -> bool) -> usize {
        self.ops.iter().filter(|o| op(o)).count()
    }

    pub fn connects(&self) -> usize {
        self.count(|o| matches!(o, Op::Connect))
    }

    pub fn disconnects(&self) -> usize {
        self.count(|o| matches!(o, Op::Disconnect))
    }

    /// Named register writes in the order they were sent
    pub fn writes(&self) -> Vec<(RegisterName, RegisterValue)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Write(address, words) => RegisterName::ALL
                    .into_iter()
                    .find(|r| r.address() == *address)
                    .map(|r| (r, r.decode(words).unwrap())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RegisterChannel for FakeChannel {
    async fn connect(&mut self) -> Result<(), Fault> {
        self.ops.push(Op::Connect);
        if let Some(fault) = self.connect_faults.pop_front() {
            return Err(fault);
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.ops.push(Op::Disconnect);
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn read_holding_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, Fault> {
        if !self.connected {
            return Err(Fault::NotConnected);
        }
        self.ops.push(Op::Read(address, count));
        if let Some(fault) = self.read_faults.pop_front() {
            if matches!(fault, Fault::Transport(_)) {
                self.connected = false;
            }
            return Err(fault);
        }
        Ok(self.words(address, count))
    }

    async fn write_multiple_registers(&mut self, address: u16, values: &[u16]) -> Result<WriteAck, Fault> {
        if !self.connected {
            return Err(Fault::NotConnected);
        }
        self.ops.push(Op::Write(address, values.to_vec()));
        if let Some(fault) = self.write_faults.pop_front() {
            if matches!(fault, Fault::Transport(_)) {
                self.connected = false;
            }
            return Err(fault);
        }
        if self.reject_writes.contains(&address) {
            return Ok(WriteAck::exception("Illegal data value"));
        }
        if !self.ignore_writes.contains(&address) {
            self.set_words(address, values);
        }
        Ok(WriteAck::accepted())
    }
}
