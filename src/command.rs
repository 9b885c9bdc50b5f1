/// Easily readable representation of the command bytes used by the flash chip.
///
/// The discriminant is the 3-byte address variant. Use [`Command::opcode`] to get
/// the byte that actually goes on the wire for a given [`AddressMode`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    WriteStatusRegister1 = 0x01,
    PageProgram = 0x02,
    ReadData = 0x03,
    WriteDisable = 0x04,
    ReadStatusRegister1 = 0x05,
    WriteEnable = 0x06,
    FastRead = 0x0B,
    WriteStatusRegister3 = 0x11,
    ReadStatusRegister3 = 0x15,
    SectorErase4KB = 0x20,
    WriteStatusRegister2 = 0x31,
    ReadStatusRegister2 = 0x35,
    ReadUniqueId = 0x4B,
    JedecId = 0x9F,
    ChipErase = 0xC7,
    BlockErase64KB = 0xD8,
}

impl Command {
    /// The opcode for this command, translated to the dedicated 4-byte address
    /// instruction when the device needs one.
    pub const fn opcode(self, mode: AddressMode) -> u8 {
        match (self, mode) {
            (Command::ReadData, AddressMode::FourByte) => 0x13,
            (Command::FastRead, AddressMode::FourByte) => 0x0C,
            (Command::PageProgram, AddressMode::FourByte) => 0x12,
            (Command::SectorErase4KB, AddressMode::FourByte) => 0x21,
            (Command::BlockErase64KB, AddressMode::FourByte) => 0xDC,
            (command, _) => command as u8,
        }
    }

    /// Whether the command is followed by an address.
    pub const fn takes_address(self) -> bool {
        matches!(
            self,
            Command::ReadData
                | Command::FastRead
                | Command::PageProgram
                | Command::SectorErase4KB
                | Command::BlockErase64KB
        )
    }
}

/// Number of address bytes framed after an addressed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressMode {
    ThreeByte,
    FourByte,
}

impl AddressMode {
    pub const fn byte_count(self) -> usize {
        match self {
            AddressMode::ThreeByte => 3,
            AddressMode::FourByte => 4,
        }
    }

    /// Big-endian address bytes, most significant first. Only the first
    /// [`AddressMode::byte_count`] bytes of the returned slice are meaningful.
    pub fn encode(self, address: u32) -> AddressBytes {
        let bytes = address.to_be_bytes();
        match self {
            AddressMode::ThreeByte => AddressBytes {
                bytes: [bytes[1], bytes[2], bytes[3], 0],
                len: 3,
            },
            AddressMode::FourByte => AddressBytes { bytes, len: 4 },
        }
    }
}

/// A framed address, 3 or 4 bytes long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressBytes {
    bytes: [u8; 4],
    len: usize,
}

impl AddressBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Status register selector for the read/write status commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusRegister {
    One,
    Two,
    Three,
}

impl StatusRegister {
    pub const ALL: [StatusRegister; 3] =
        [StatusRegister::One, StatusRegister::Two, StatusRegister::Three];

    pub(crate) const fn index(self) -> usize {
        match self {
            StatusRegister::One => 0,
            StatusRegister::Two => 1,
            StatusRegister::Three => 2,
        }
    }

    pub const fn read_command(self) -> Command {
        match self {
            StatusRegister::One => Command::ReadStatusRegister1,
            StatusRegister::Two => Command::ReadStatusRegister2,
            StatusRegister::Three => Command::ReadStatusRegister3,
        }
    }

    pub const fn write_command(self) -> Command {
        match self {
            StatusRegister::One => Command::WriteStatusRegister1,
            StatusRegister::Two => Command::WriteStatusRegister2,
            StatusRegister::Three => Command::WriteStatusRegister3,
        }
    }
}
