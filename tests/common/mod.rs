#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, ErrorKind, SpiBus};
use w25qxx::{identity, Clock, Config, W25qxx, BLOCK_SIZE, PAGE_SIZE};

pub const W25Q10: [u8; 3] = [0xEF, 0x40, 0x11];
pub const W25Q128: [u8; 3] = [0xEF, 0x40, 0x18];
pub const W25Q256: [u8; 3] = [0xEF, 0x40, 0x19];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

impl spi::Error for BusFault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// In-memory model of a W25Q chip, as seen from the SPI pins.
pub struct Chip {
    pub memory: Vec<u8>,
    pub jedec: [u8; 3],
    pub unique_id: [u8; 8],
    /// Register contents without the BUSY and WEL bits, which are modelled separately.
    pub status: [u8; 3],
    pub write_enabled: bool,
    /// Number of upcoming status reads that report busy.
    pub busy_polls: u32,
    pub busy_after_program: u32,
    pub busy_after_erase: u32,
    pub stuck_busy: bool,
    /// Drops write enable commands, as a hardware protected chip would.
    pub ignore_write_enable: bool,
    /// A cell that comes out of every program or erase with bit 0 flipped.
    pub weak_cell: Option<usize>,

    pub selected: bool,
    current: Vec<u8>,
    aborted: bool,

    /// Every completed select session, as the bytes the chip received.
    pub sessions: Vec<Vec<u8>>,
    /// (address, length) of every page program that was executed.
    pub programs: Vec<(u32, usize)>,
    /// (opcode, address) of every erase that was executed.
    pub erases: Vec<(u8, u32)>,
    pub cs_low: u32,
    pub cs_high: u32,
    pub flushes: u32,

    /// Sessions starting with this opcode fail on the bus...
    pub fail_opcode: Option<u8>,
    /// ...after letting this many through...
    pub fail_skip: u32,
    /// ...this many times.
    pub fail_count: u32,
}

impl Chip {
    pub fn new(jedec: [u8; 3]) -> Self {
        let blocks = identity::block_count(jedec[2], true).unwrap_or(1);
        Chip {
            memory: vec![0xFF; (blocks * BLOCK_SIZE) as usize],
            jedec,
            unique_id: [0x10, 0x32, 0x54, 0x76, 0x98, 0xBA, 0xDC, 0xFE],
            status: [0; 3],
            write_enabled: false,
            busy_polls: 0,
            busy_after_program: 2,
            busy_after_erase: 5,
            stuck_busy: false,
            ignore_write_enable: false,
            weak_cell: None,
            selected: false,
            current: Vec::new(),
            aborted: false,
            sessions: Vec::new(),
            programs: Vec::new(),
            erases: Vec::new(),
            cs_low: 0,
            cs_high: 0,
            flushes: 0,
            fail_opcode: None,
            fail_skip: 0,
            fail_count: 0,
        }
    }

    pub fn clear_log(&mut self) {
        self.sessions.clear();
        self.programs.clear();
        self.erases.clear();
        self.cs_low = 0;
        self.cs_high = 0;
        self.flushes = 0;
    }

    pub fn fail(&mut self, opcode: u8, skip: u32, count: u32) {
        self.fail_opcode = Some(opcode);
        self.fail_skip = skip;
        self.fail_count = count;
    }

    /// First byte of every session.
    pub fn opcodes(&self) -> Vec<u8> {
        self.sessions.iter().map(|s| s[0]).collect()
    }

    fn is_busy(&self) -> bool {
        self.stuck_busy || self.busy_polls > 0
    }

    fn status1(&mut self) -> u8 {
        let busy = if self.stuck_busy {
            true
        } else if self.busy_polls > 0 {
            self.busy_polls -= 1;
            true
        } else {
            false
        };

        (self.status[0] & !0b11) | ((self.write_enabled as u8) << 1) | busy as u8
    }

    fn corrupt(&mut self, range: std::ops::Range<usize>) {
        if let Some(cell) = self.weak_cell.filter(|cell| range.contains(cell)) {
            self.memory[cell] ^= 0x01;
        }
    }

    fn exchange(&mut self, mosi: u8) -> Result<u8, BusFault> {
        assert!(self.selected, "bus clocked while the chip is not selected");

        if self.aborted {
            return Err(BusFault);
        }

        if self.current.is_empty() && self.fail_opcode == Some(mosi) {
            if self.fail_skip > 0 {
                self.fail_skip -= 1;
            } else if self.fail_count > 0 {
                self.fail_count -= 1;
                self.aborted = true;
                return Err(BusFault);
            }
        }

        let pos = self.current.len();
        self.current.push(mosi);
        Ok(self.respond(pos))
    }

    fn address(bytes: &[u8], len: usize) -> usize {
        bytes[1..1 + len]
            .iter()
            .fold(0, |address, &b| (address << 8) | b as usize)
    }

    fn respond(&mut self, pos: usize) -> u8 {
        if pos == 0 {
            return 0xFF;
        }

        let opcode = self.current[0];
        match opcode {
            0x9F => self.jedec.get(pos - 1).copied().unwrap_or(0xFF),
            0x4B if pos <= 4 => 0xFF,
            0x4B => self.unique_id.get(pos - 5).copied().unwrap_or(0xFF),
            0x05 => self.status1(),
            0x35 => self.status[1],
            0x15 => self.status[2],
            0x03 | 0x13 | 0x0B | 0x0C => {
                let address_len = if matches!(opcode, 0x03 | 0x0B) { 3 } else { 4 };
                let dummy = if matches!(opcode, 0x0B | 0x0C) { 1 } else { 0 };
                let data_start = 1 + address_len + dummy;
                if pos < data_start {
                    return 0xFF;
                }

                let address = Self::address(&self.current, address_len) + (pos - data_start);
                self.memory[address % self.memory.len()]
            }
            _ => 0xFF,
        }
    }

    fn end_session(&mut self) {
        let bytes = std::mem::take(&mut self.current);
        let aborted = std::mem::replace(&mut self.aborted, false);

        if bytes.is_empty() {
            return;
        }
        self.sessions.push(bytes.clone());
        if aborted {
            return;
        }

        let busy = self.is_busy();
        match bytes[0] {
            0x06 if !busy && !self.ignore_write_enable => self.write_enabled = true,
            0x04 if !busy => self.write_enabled = false,
            opcode @ (0x02 | 0x12) if self.write_enabled && !busy => {
                let address_len = if opcode == 0x02 { 3 } else { 4 };
                if bytes.len() <= 1 + address_len {
                    return;
                }
                let address = Self::address(&bytes, address_len);
                let data = &bytes[1 + address_len..];
                let page = address - address % PAGE_SIZE as usize;
                for (i, &b) in data.iter().enumerate() {
                    let target = page + (address % PAGE_SIZE as usize + i) % PAGE_SIZE as usize;
                    self.memory[target] &= b;
                    self.corrupt(target..target + 1);
                }
                self.programs.push((address as u32, data.len()));
                self.write_enabled = false;
                self.busy_polls = self.busy_after_program;
            }
            opcode @ (0x20 | 0x21 | 0xD8 | 0xDC) if self.write_enabled && !busy => {
                let address_len = if matches!(opcode, 0x20 | 0xD8) { 3 } else { 4 };
                let size = if matches!(opcode, 0x20 | 0x21) { 4096 } else { 65536 };
                let address = Self::address(&bytes, address_len);
                let start = address - address % size;
                self.memory[start..start + size].fill(0xFF);
                self.corrupt(start..start + size);
                self.erases.push((opcode, address as u32));
                self.write_enabled = false;
                self.busy_polls = self.busy_after_erase;
            }
            0xC7 if self.write_enabled && !busy => {
                self.memory.fill(0xFF);
                self.corrupt(0..self.memory.len());
                self.erases.push((0xC7, 0));
                self.write_enabled = false;
                self.busy_polls = self.busy_after_erase;
            }
            opcode @ (0x01 | 0x31 | 0x11) if self.write_enabled && !busy && bytes.len() > 1 => {
                let index = match opcode {
                    0x01 => 0,
                    0x31 => 1,
                    _ => 2,
                };
                self.status[index] = if index == 0 { bytes[1] & !0b11 } else { bytes[1] };
                self.write_enabled = false;
                self.busy_polls = 1;
            }
            _ => {}
        }
    }
}

pub type SharedChip = Rc<RefCell<Chip>>;

pub struct SimBus(pub SharedChip);

impl spi::ErrorType for SimBus {
    type Error = BusFault;
}

impl SpiBus for SimBus {
    fn read(&mut self, words: &mut [u8]) -> Result<(), BusFault> {
        let mut chip = self.0.borrow_mut();
        for word in words.iter_mut() {
            *word = chip.exchange(0x00)?;
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), BusFault> {
        let mut chip = self.0.borrow_mut();
        for &word in words {
            chip.exchange(word)?;
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), BusFault> {
        let mut chip = self.0.borrow_mut();
        for i in 0..read.len().max(write.len()) {
            let rx = chip.exchange(write.get(i).copied().unwrap_or(0x00))?;
            if let Some(word) = read.get_mut(i) {
                *word = rx;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), BusFault> {
        let mut chip = self.0.borrow_mut();
        for word in words.iter_mut() {
            *word = chip.exchange(*word)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BusFault> {
        self.0.borrow_mut().flushes += 1;
        Ok(())
    }
}

pub struct SimPin(pub SharedChip);

impl digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        let mut chip = self.0.borrow_mut();
        chip.cs_low += 1;
        chip.selected = true;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        let mut chip = self.0.borrow_mut();
        chip.cs_high += 1;
        if chip.selected {
            chip.end_session();
        }
        chip.selected = false;
        Ok(())
    }
}

/// Millisecond clock that advances by one tick every time it is read.
#[derive(Clone)]
pub struct SimClock(pub Rc<Cell<u32>>);

impl Clock for SimClock {
    fn now_ms(&self) -> u32 {
        let now = self.0.get();
        self.0.set(now.wrapping_add(1));
        now
    }
}

pub type Flash = W25qxx<SimBus, SimPin, SimClock>;

pub struct Harness {
    pub flash: Flash,
    pub chip: SharedChip,
    pub time: Rc<Cell<u32>>,
}

impl Harness {
    pub fn new(jedec: [u8; 3], config: Config) -> Self {
        let chip = Rc::new(RefCell::new(Chip::new(jedec)));
        let time = Rc::new(Cell::new(0));
        let flash = W25qxx::new(
            SimBus(chip.clone()),
            SimPin(chip.clone()),
            SimClock(time.clone()),
            config,
        )
        .unwrap();
        chip.borrow_mut().clear_log();

        Harness { flash, chip, time }
    }

    /// A harness whose chip has already been identified, with an empty log.
    pub fn initialized(jedec: [u8; 3]) -> Self {
        Self::initialized_with(jedec, Config::default())
    }

    pub fn initialized_with(jedec: [u8; 3], config: Config) -> Self {
        let mut harness = Self::new(jedec, config);
        harness.flash.init().unwrap();
        harness.chip.borrow_mut().clear_log();
        harness
    }

    pub fn chip(&self) -> std::cell::RefMut<'_, Chip> {
        self.chip.borrow_mut()
    }

    /// Select line released and every session paired with one flush.
    pub fn assert_idle_bus(&self) {
        let chip = self.chip.borrow();
        assert!(!chip.selected);
        assert_eq!(chip.cs_low, chip.cs_high);
        assert_eq!(chip.flushes, chip.cs_high);
    }
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
