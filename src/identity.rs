//! JEDEC identification of W25Qxx parts.

use crate::config::Config;
use crate::geometry::Geometry;

/// Memory type byte reported by W25Q parts in standard SPI mode.
pub const MEMORY_TYPE: u8 = 0x40;

/// Capacity code of the smallest part in [`BLOCK_COUNTS`].
pub const CAPACITY_CODE_BASE: u8 = 0x11;

/// Capacity code used by the W25Q512 family instead of `0x1A`.
pub const CAPACITY_CODE_512MBIT: u8 = 0x20;

/// 64 KiB block count per capacity code, indexed from [`CAPACITY_CODE_BASE`].
pub const BLOCK_COUNTS: [u32; 10] = [
    2,    // W25Q10,  0x11
    4,    // W25Q20,  0x12
    8,    // W25Q40,  0x13
    16,   // W25Q80,  0x14
    32,   // W25Q16,  0x15
    64,   // W25Q32,  0x16
    128,  // W25Q64,  0x17
    256,  // W25Q128, 0x18
    512,  // W25Q256, 0x19
    1024, // W25Q512, 0x1A
];

/// Raw JEDEC ID as returned by the 0x9F command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JedecId(pub [u8; 3]);

impl JedecId {
    pub fn manufacturer(&self) -> u8 {
        self.0[0]
    }

    pub fn memory_type(&self) -> u8 {
        self.0[1]
    }

    pub fn capacity_code(&self) -> u8 {
        self.0[2]
    }
}

/// Looks up the block count for a capacity code.
pub fn block_count(capacity_code: u8, extended: bool) -> Option<u32> {
    if extended && capacity_code == CAPACITY_CODE_512MBIT {
        return Some(1024);
    }

    let index = capacity_code.checked_sub(CAPACITY_CODE_BASE)?;
    BLOCK_COUNTS.get(index as usize).copied()
}

/// A successfully identified device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceIdentity {
    pub manufacturer: u8,
    pub memory_type: u8,
    pub capacity_code: u8,
    pub block_count: u32,
}

impl DeviceIdentity {
    /// Validates a JEDEC ID against the configuration. Returns `None` for
    /// anything the driver does not know how to address.
    pub fn from_jedec(id: JedecId, config: &Config) -> Option<Self> {
        if let Some(manufacturer) = config.manufacturer {
            if id.manufacturer() != manufacturer {
                return None;
            }
        }

        if id.memory_type() != MEMORY_TYPE {
            return None;
        }

        let block_count = block_count(id.capacity_code(), config.extended_capacity_code)?;

        Some(DeviceIdentity {
            manufacturer: id.manufacturer(),
            memory_type: id.memory_type(),
            capacity_code: id.capacity_code(),
            block_count,
        })
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.block_count)
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> u32 {
        self.geometry().capacity()
    }
}
