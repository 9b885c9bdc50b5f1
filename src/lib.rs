#![no_std]

use core::fmt::Debug;
use embedded_hal::digital::OutputPin;
use embedded_storage::nor_flash::{ErrorType, NorFlashError, NorFlashErrorKind};

mod fmt;

pub mod clock;
pub mod command;
pub mod config;
mod external_impls;
pub mod geometry;
pub mod identity;
pub mod register;
pub mod select;
pub mod w25qxx;

pub use clock::Clock;
pub use command::StatusRegister;
pub use config::{AddressWidth, Config, FastReadMode, Timeouts};
pub use geometry::{Geometry, Unit};
pub use identity::{DeviceIdentity, JedecId};
pub use register::{StatusRegister1, StatusRegister2, StatusRegister3, StatusRegisters};

use command::AddressMode;
use select::ChipSelect;

pub const PAGE_SIZE: u32 = 256;
pub const SECTOR_SIZE: u32 = PAGE_SIZE * 16;
pub const BLOCK_SIZE: u32 = SECTOR_SIZE * 16;

/// Clocked out while reading. The value is irrelevant to the chip.
const DUMMY_BYTE: u8 = 0xA5;

/// Read path selection after identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum ReadOpcode {
    Unset,
    Standard,
    Fast,
}

/// Driver for the Winbond W25Qxx flash family.
///
/// The chip is identified at runtime by [`W25qxx::init`]; until that succeeds the
/// detected capacity is zero and every addressed operation returns without
/// touching the bus.
pub struct W25qxx<SPI, CS, CLK> {
    spi: SPI,
    cs: ChipSelect<CS>,
    clock: CLK,
    config: Config,
    identity: Option<DeviceIdentity>,
    geometry: Geometry,
    read_opcode: ReadOpcode,
    status: [u8; 3],
}

impl<SPI, CS, CLK> W25qxx<SPI, CS, CLK> {
    /// Capacity of the identified chip in bytes, 0 before a successful `init`.
    pub fn capacity(&self) -> u32 {
        self.geometry.capacity()
    }

    pub fn page_max(&self) -> u32 {
        self.geometry.page_max()
    }

    pub fn sector_max(&self) -> u32 {
        self.geometry.sector_max()
    }

    pub fn block_max(&self) -> u32 {
        self.geometry.block_max()
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.identity
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Status registers as last read from the chip.
    pub fn status_registers(&self) -> StatusRegisters {
        StatusRegisters::from_raw(self.status)
    }

    /// Address width used for addressed commands.
    pub fn address_mode(&self) -> AddressMode {
        match self.config.address_width {
            AddressWidth::Auto => self.geometry.address_mode(),
            AddressWidth::ThreeByte => AddressMode::ThreeByte,
            AddressWidth::FourByte => AddressMode::FourByte,
        }
    }

    pub fn uses_four_byte_address(&self) -> bool {
        self.address_mode() == AddressMode::FourByte
    }

    /// Whether reads currently go through the fast read command.
    pub fn is_fast_read(&self) -> bool {
        match self.config.read_mode {
            FastReadMode::Disabled => false,
            FastReadMode::Fixed(fast) => fast,
            FastReadMode::Enabled { .. } => self.read_opcode == ReadOpcode::Fast,
        }
    }
}

impl<SPI, S: Debug, P: Debug, CS, CLK> W25qxx<SPI, CS, CLK>
where
    SPI: embedded_hal::spi::ErrorType<Error = S>,
    CS: OutputPin<Error = P>,
    CLK: Clock,
{
    /// Takes ownership of an already configured bus and select line and
    /// deasserts the chip. Call [`W25qxx::init`] before anything else.
    pub fn new(spi: SPI, cs: CS, clock: CLK, config: Config) -> Result<Self, Error<S, P>> {
        let mut flash = Self {
            spi,
            cs: ChipSelect::new(cs),
            clock,
            config,
            identity: None,
            geometry: Geometry::default(),
            read_opcode: ReadOpcode::Unset,
            status: [0; 3],
        };

        flash.cs.reset().map_err(Error::PinError)?;

        Ok(flash)
    }

    /// Switches between fast and standard reads.
    ///
    /// Fails before the chip has been identified, and when the configuration
    /// does not allow toggling.
    pub fn set_fast_read(&mut self, fast: bool) -> Result<(), Error<S, P>> {
        if self.identity.is_none() {
            return Err(Error::NotInitialized);
        }

        match self.config.read_mode {
            FastReadMode::Enabled { .. } => {
                self.read_opcode = if fast {
                    ReadOpcode::Fast
                } else {
                    ReadOpcode::Standard
                };
                Ok(())
            }
            FastReadMode::Disabled | FastReadMode::Fixed(_) => Err(Error::FastReadFixed),
        }
    }

    /// Releases the SPI bus, CS pin and clock from the driver.
    pub fn release(self) -> (SPI, CS, CLK) {
        (self.spi, self.cs.release(), self.clock)
    }
}

impl<SPI, S: Debug, P: Debug, CS, CLK> ErrorType for W25qxx<SPI, CS, CLK>
where
    SPI: embedded_hal::spi::ErrorType<Error = S>,
    CS: OutputPin<Error = P>,
    P: Debug,
    S: Debug,
{
    type Error = Error<S, P>;
}

/// Custom error type for the various errors that can be thrown by W25qxx.
/// Can be converted into a NorFlashError.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error<S: Debug, P: Debug> {
    SpiError(S),
    PinError(P),
    /// The bus failed while probing for the chip.
    DeviceAbsent,
    /// The JEDEC ID does not belong to a supported part.
    UnsupportedDevice(JedecId),
    NotInitialized,
    /// Fast read is fixed by the configuration.
    FastReadFixed,
    NotAligned,
    OutOfBounds,
    BusyTimeout,
    WriteEnableFail,
    PartialWrite { written: usize },
    PartialRead { read: usize },
    ReadbackFail,
}

impl<S: Debug, P: Debug> NorFlashError for Error<S, P> {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Error::NotAligned => NorFlashErrorKind::NotAligned,
            Error::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            _ => NorFlashErrorKind::Other,
        }
    }
}
