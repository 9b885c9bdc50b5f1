/// Status Register 1
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusRegister1(pub u8);

impl StatusRegister1 {
    /// Erase/write in progress.
    pub fn busy(&self) -> bool {
        self.0 & 0b0000_0001 != 0
    }

    /// Write enable latch.
    pub fn write_enabled(&self) -> bool {
        self.0 & 0b0000_0010 != 0
    }

    /// (BP0, BP1, BP2) block protect bits.
    pub fn block_protect(&self) -> (bool, bool, bool) {
        let bp = (self.0 & 0b0001_1100) >> 2;
        (bp & 0b001 != 0, bp & 0b010 != 0, bp & 0b100 != 0)
    }

    pub fn top_bottom_protect(&self) -> bool {
        self.0 & 0b0010_0000 != 0
    }

    pub fn sector_protect(&self) -> bool {
        self.0 & 0b0100_0000 != 0
    }

    pub fn status_register_protect(&self) -> bool {
        self.0 & 0b1000_0000 != 0
    }
}

/// Status Register 2
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusRegister2(pub u8);

impl StatusRegister2 {
    pub fn status_register_lock(&self) -> bool {
        self.0 & 0b0000_0001 != 0
    }

    pub fn quad_enable(&self) -> bool {
        self.0 & 0b0000_0010 != 0
    }

    /// Security register lock bits (LB1, LB2, LB3).
    pub fn security_lock(&self) -> u8 {
        (self.0 & 0b0011_1000) >> 3
    }

    /// Complement protect.
    pub fn complement_protect(&self) -> bool {
        self.0 & 0b0100_0000 != 0
    }

    /// Program/erase suspended.
    pub fn suspended(&self) -> bool {
        self.0 & 0b1000_0000 != 0
    }
}

/// Status Register 3
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusRegister3(pub u8);

impl StatusRegister3 {
    /// Current address mode on parts that have one, true for 4-byte.
    pub fn four_byte_address_mode(&self) -> bool {
        self.0 & 0b0000_0001 != 0
    }

    /// Write protect selection.
    pub fn write_protect_selection(&self) -> bool {
        self.0 & 0b0000_0100 != 0
    }

    /// Output driver strength (DRV0, DRV1) as a two bit value.
    pub fn driver_strength(&self) -> u8 {
        (self.0 & 0b0110_0000) >> 5
    }
}

/// Last values read from the three status registers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusRegisters {
    pub sr1: StatusRegister1,
    pub sr2: StatusRegister2,
    pub sr3: StatusRegister3,
}

impl StatusRegisters {
    pub(crate) fn from_raw(raw: [u8; 3]) -> Self {
        StatusRegisters {
            sr1: StatusRegister1(raw[0]),
            sr2: StatusRegister2(raw[1]),
            sr3: StatusRegister3(raw[2]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_register_1_bits() {
        let sr = StatusRegister1(0b1001_0011);
        assert!(sr.busy());
        assert!(sr.write_enabled());
        assert_eq!(sr.block_protect(), (false, false, true));
        assert!(!sr.top_bottom_protect());
        assert!(!sr.sector_protect());
        assert!(sr.status_register_protect());
    }

    #[test]
    fn status_register_2_and_3_bits() {
        let sr2 = StatusRegister2(0b0101_0010);
        assert!(sr2.quad_enable());
        assert!(!sr2.status_register_lock());
        assert_eq!(sr2.security_lock(), 0b010);
        assert!(sr2.complement_protect());
        assert!(!sr2.suspended());

        let sr3 = StatusRegister3(0b0110_0101);
        assert!(sr3.four_byte_address_mode());
        assert!(sr3.write_protect_selection());
        assert_eq!(sr3.driver_strength(), 0b11);
    }
}
