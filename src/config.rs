/// How reads are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FastReadMode {
    /// Always use the standard read command.
    Disabled,
    /// Caller may toggle at runtime with `set_fast_read`. `default_fast` is
    /// applied on the first successful `init`.
    Enabled { default_fast: bool },
    /// Always fast (`true`) or always standard (`false`), not toggleable.
    Fixed(bool),
}

/// Address width override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressWidth {
    /// 4-byte addressing for parts above 16 MiB, 3-byte otherwise.
    Auto,
    ThreeByte,
    FourByte,
}

/// Upper bounds, in milliseconds, for the busy-wait after each operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeouts {
    /// typical 0.7ms, max 3ms
    pub page_program_ms: u32,
    /// typical 50ms, max 400ms
    pub sector_erase_ms: u32,
    /// typical 150ms, max 2000ms
    pub block_erase_ms: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            page_program_ms: 10,
            sector_erase_ms: 400,
            block_erase_ms: 2000,
        }
    }
}

/// Driver options, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub read_mode: FastReadMode,
    pub address_width: AddressWidth,
    /// Reject any part whose block count differs from this one.
    pub expected_blocks: Option<u32>,
    /// Required manufacturer byte of the JEDEC ID. `None` accepts any vendor.
    pub manufacturer: Option<u8>,
    /// Also accept capacity code 0x20 (512 Mbit).
    pub extended_capacity_code: bool,
    pub timeouts: Timeouts,
}

/// Winbond manufacturer ID.
pub const WINBOND: u8 = 0xEF;

impl Default for Config {
    fn default() -> Self {
        Config {
            read_mode: FastReadMode::Enabled {
                default_fast: false,
            },
            address_width: AddressWidth::Auto,
            expected_blocks: None,
            manufacturer: Some(WINBOND),
            extended_capacity_code: true,
            timeouts: Timeouts::default(),
        }
    }
}
