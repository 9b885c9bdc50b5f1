use super::*;
use crate::command::Command;
use crate::geometry::{Span, MAX_THREE_BYTE_BLOCKS};
use core::fmt::Debug;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

impl<SPI, S: Debug, P: Debug, CS, CLK> W25qxx<SPI, CS, CLK>
where
    SPI: SpiBus<Error = S>,
    CS: OutputPin<Error = P>,
    CLK: Clock,
    S: Debug,
    P: Debug,
{
    fn select(&mut self) -> Result<(), Error<S, P>> {
        self.cs.select().map_err(Error::PinError)
    }

    fn deselect(&mut self) -> Result<(), Error<S, P>> {
        // The bus has to be done clocking before the line goes high.
        let flushed = if self.cs.is_outermost() {
            self.spi.flush().map_err(Error::SpiError)
        } else {
            Ok(())
        };
        let released = self.cs.deselect().map_err(Error::PinError);

        flushed.and(released)
    }

    /// Runs `f` with the chip selected.
    ///
    /// The matching deselect runs on every exit path of `f`, including errors, so
    /// the select depth always returns to where it was.
    fn selected<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, Error<S, P>>,
    ) -> Result<R, Error<S, P>> {
        self.select()?;
        let result = f(self);
        let released = self.deselect();

        let value = result?;
        released?;
        Ok(value)
    }

    /// Exchanges a single byte.
    fn transfer(&mut self, byte: u8) -> Result<u8, Error<S, P>> {
        self.selected(|flash| {
            let mut buf = [byte];
            flash
                .spi
                .transfer_in_place(&mut buf)
                .map_err(Error::SpiError)?;
            Ok(buf[0])
        })
    }

    /// Clocks in `buf.len()` bytes.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Error<S, P>> {
        self.selected(|flash| {
            flash.spi.read(buf).map_err(Error::SpiError)?;
            Ok(buf.len())
        })
    }

    /// Clocks out all of `buf`.
    fn transmit(&mut self, buf: &[u8]) -> Result<usize, Error<S, P>> {
        self.selected(|flash| {
            flash.spi.write(buf).map_err(Error::SpiError)?;
            Ok(buf.len())
        })
    }

    fn send_command(&mut self, command: Command) -> Result<(), Error<S, P>> {
        let opcode = command.opcode(self.address_mode());
        log_trace!("command {}", opcode);
        self.transfer(opcode)?;
        Ok(())
    }

    fn send_address(&mut self, address: u32) -> Result<(), Error<S, P>> {
        let bytes = self.address_mode().encode(address);
        self.selected(|flash| {
            for &byte in bytes.as_slice() {
                flash.transfer(byte)?;
            }
            Ok(())
        })
    }

    /// Opcode and address in one select session. Further data may follow if the
    /// caller holds the session open.
    fn send_addressed(&mut self, command: Command, address: u32) -> Result<(), Error<S, P>> {
        debug_assert!(command.takes_address());
        self.selected(|flash| {
            flash.send_command(command)?;
            flash.send_address(address)
        })
    }

    /// Sets the enable_write flag on the flash chip to true.
    /// Writes and erases to the chip only have effect when this flag is true.
    /// Each write and erase clears the flag, requiring it to be set to true again for the next command.
    fn enable_write(&mut self) -> Result<(), Error<S, P>> {
        self.send_command(Command::WriteEnable)?;

        if !self.write_enabled()? {
            return Err(Error::WriteEnableFail);
        }

        Ok(())
    }

    fn disable_write(&mut self) -> Result<(), Error<S, P>> {
        self.send_command(Command::WriteDisable)
    }

    /// The flash chip must be write-enabled for write and erase operations to work.
    /// This function returns true while the write-enable flag is set.
    pub fn write_enabled(&mut self) -> Result<bool, Error<S, P>> {
        Ok(self.read_status_register1()?.write_enabled())
    }

    /// Identifies the chip and derives its geometry.
    ///
    /// Any previous identity is dropped first, so a failed re-probe leaves the
    /// driver uninitialized and every addressed operation a no-op.
    pub fn init(&mut self) -> Result<DeviceIdentity, Error<S, P>> {
        self.identity = None;
        self.geometry = Geometry::default();

        let id = self
            .disable_write()
            .and_then(|_| self.read_jedec_id())
            .map_err(|_| Error::DeviceAbsent)?;

        let Some(identity) = DeviceIdentity::from_jedec(id, &self.config) else {
            log_warn!(
                "unsupported device, JEDEC ID {} {} {}",
                id.manufacturer(),
                id.memory_type(),
                id.capacity_code()
            );
            return Err(Error::UnsupportedDevice(id));
        };

        if let Some(expected) = self.config.expected_blocks {
            if identity.block_count != expected {
                log_warn!(
                    "expected {} blocks, device has {}",
                    expected,
                    identity.block_count
                );
                return Err(Error::UnsupportedDevice(id));
            }
        }

        if self.config.address_width == AddressWidth::ThreeByte
            && identity.block_count > MAX_THREE_BYTE_BLOCKS
        {
            return Err(Error::UnsupportedDevice(id));
        }

        for register in StatusRegister::ALL {
            self.read_status(register)?;
        }

        self.identity = Some(identity);
        self.geometry = identity.geometry();

        if self.read_opcode == ReadOpcode::Unset {
            self.read_opcode = match self.config.read_mode {
                FastReadMode::Enabled { default_fast: true } | FastReadMode::Fixed(true) => {
                    ReadOpcode::Fast
                }
                _ => ReadOpcode::Standard,
            };
        }

        log_info!(
            "flash identified: {} blocks, {} bytes",
            identity.block_count,
            identity.capacity()
        );

        Ok(identity)
    }

    /// Reads the 3-byte JEDEC ID.
    pub fn read_jedec_id(&mut self) -> Result<JedecId, Error<S, P>> {
        self.selected(|flash| {
            flash.send_command(Command::JedecId)?;

            let mut id = [0; 3];
            for byte in id.iter_mut() {
                *byte = flash.transfer(DUMMY_BYTE)?;
            }
            Ok(JedecId(id))
        })
    }

    /// Reads up to 8 bytes of the factory unique ID into `buf` and returns how
    /// many were stored. All 8 bytes are always clocked out.
    pub fn read_unique_id(&mut self, buf: &mut [u8]) -> Result<usize, Error<S, P>> {
        let len = buf.len().min(8);

        self.selected(|flash| {
            flash.send_command(Command::ReadUniqueId)?;
            for _ in 0..4 {
                flash.transfer(DUMMY_BYTE)?;
            }

            let mut id = [0; 8];
            for byte in id.iter_mut() {
                *byte = flash.transfer(DUMMY_BYTE)?;
            }

            buf[..len].copy_from_slice(&id[..len]);
            Ok(len)
        })
    }

    /// Reads one of the status registers and updates the cached copy.
    pub fn read_status(&mut self, register: StatusRegister) -> Result<u8, Error<S, P>> {
        let value = self.selected(|flash| {
            flash.send_command(register.read_command())?;
            flash.transfer(DUMMY_BYTE)
        })?;

        self.status[register.index()] = value;
        Ok(value)
    }

    fn read_status_register1(&mut self) -> Result<StatusRegister1, Error<S, P>> {
        Ok(StatusRegister1(self.read_status(StatusRegister::One)?))
    }

    /// Writes one of the status registers and waits, without a bound, for the
    /// chip to finish.
    pub fn write_status(&mut self, register: StatusRegister, value: u8) -> Result<(), Error<S, P>> {
        self.wait_idle()?;
        self.enable_write()?;

        let written = self
            .selected(|flash| {
                flash.send_command(register.write_command())?;
                flash.transfer(value)
            })
            .and_then(|_| self.wait_idle());
        let disabled = self.disable_write();

        written?;
        disabled?;

        self.read_status(register)?;
        Ok(())
    }

    /// The flash chip is unable to perform new commands while it is still working on a previous one. Especially erases take a long time.
    /// This function returns true while the chip is unable to respond to commands (with the exception of the busy command).
    pub fn busy(&mut self) -> Result<bool, Error<S, P>> {
        Ok(self.read_status_register1()?.busy())
    }

    /// Polls the busy bit until it clears. Gives up with [`Error::BusyTimeout`]
    /// once `timeout_ms` has elapsed.
    pub fn wait_busy(&mut self, timeout_ms: u32) -> Result<(), Error<S, P>> {
        let start = self.clock.now_ms();

        loop {
            if !self.busy()? {
                return Ok(());
            }

            if self.clock.elapsed_ms(start) >= timeout_ms {
                log_warn!("still busy after {} ms", timeout_ms);
                return Err(Error::BusyTimeout);
            }
        }
    }

    /// Streams status register 1 in a single session until the busy bit clears.
    ///
    /// There is no timeout. Do not call this on a device that may never clear busy.
    pub fn wait_idle(&mut self) -> Result<(), Error<S, P>> {
        self.selected(|flash| {
            flash.send_command(Command::ReadStatusRegister1)?;

            loop {
                let status = StatusRegister1(flash.transfer(DUMMY_BYTE)?);
                if !status.busy() {
                    flash.status[StatusRegister::One.index()] = status.0;
                    return Ok(());
                }
            }
        })
    }

    /// Reads a chunk of bytes from the flash chip, starting at `address`.
    ///
    /// Returns the number of bytes read. That is 0 when `address` is past the end
    /// of the chip (or no chip was identified) and less than `buf.len()` when the
    /// read would run past the end.
    pub fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<usize, Error<S, P>> {
        let Some(span) = self.geometry.clamp(address, buf.len()) else {
            return Ok(0);
        };

        self.read_span(span, buf)
    }

    /// Reads from `offset` within `page`, stopping at the end of the page.
    pub fn read_page(&mut self, page: u32, offset: u32, buf: &mut [u8]) -> Result<usize, Error<S, P>> {
        self.read_unit(Unit::Page, page, offset, buf)
    }

    /// Reads from `offset` within `sector`, stopping at the end of the sector.
    pub fn read_sector(
        &mut self,
        sector: u32,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<usize, Error<S, P>> {
        self.read_unit(Unit::Sector, sector, offset, buf)
    }

    /// Reads from `offset` within `block`, stopping at the end of the block.
    pub fn read_block(
        &mut self,
        block: u32,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<usize, Error<S, P>> {
        self.read_unit(Unit::Block, block, offset, buf)
    }

    pub fn read_byte(&mut self, address: u32) -> Result<Option<u8>, Error<S, P>> {
        let mut byte = [0];
        Ok((self.read(address, &mut byte)? == 1).then_some(byte[0]))
    }

    fn read_unit(
        &mut self,
        unit: Unit,
        index: u32,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<usize, Error<S, P>> {
        let Some(span) = self.geometry.locate(unit, index, offset, buf.len()) else {
            return Ok(0);
        };

        self.read_span(span, buf)
    }

    fn read_span(&mut self, span: Span, buf: &mut [u8]) -> Result<usize, Error<S, P>> {
        let fast = self.is_fast_read();
        let command = if fast {
            Command::FastRead
        } else {
            Command::ReadData
        };

        self.selected(|flash| {
            flash.send_addressed(command, span.address)?;
            if fast {
                flash.transfer(0x00)?;
            }
            flash.receive(&mut buf[..span.len])
        })
    }

    /// Executes a page write operation on the flash chip.
    ///
    /// Writes from `offset` within `page` and stops at the end of the page.
    /// Returns the number of bytes programmed, 0 if `page` or `offset` is out of range.
    /// A page that is still busy after `Timeouts::page_program_ms` counts as
    /// programmed; the next operation waits for it.
    ///
    /// As this is a NOR-flash chip, the write operation will only change bits from 1 to 0.
    pub fn write_page(&mut self, page: u32, offset: u32, buf: &[u8]) -> Result<usize, Error<S, P>> {
        let Some(span) = self.geometry.locate(Unit::Page, page, offset, buf.len()) else {
            return Ok(0);
        };
        let data = &buf[..span.len];
        let timeout_ms = self.config.timeouts.page_program_ms;

        // in case the chip is still busy from previous operation
        self.wait_busy(timeout_ms)?;
        self.enable_write()?;

        let programmed = self.selected(|flash| {
            flash.send_addressed(Command::PageProgram, span.address)?;
            flash.transmit(data)
        });

        // Once the data is clocked in the page is committed, even if the chip
        // is slow to report completion.
        let settled = match programmed {
            Ok(_) => match self.wait_busy(timeout_ms) {
                Ok(()) => Ok(true),
                Err(Error::BusyTimeout) => {
                    log_warn!("page {} still programming after {} ms", page, timeout_ms);
                    Ok(false)
                }
                Err(error) => Err(error),
            },
            Err(error) => Err(error),
        };
        let disabled = self.disable_write();

        let settled = settled?;
        disabled?;

        if cfg!(feature = "readback-check") && settled {
            self.readback_check(span.address, data)?;
        }

        Ok(span.len)
    }

    /// Writes a chunk of bytes to the flash chip, page by page.
    ///
    /// Stops at the first page that fails and returns how many bytes were
    /// committed before it. A transport error is only returned when nothing was
    /// written at all. Bytes past the end of the chip are dropped.
    ///
    /// Overwriting pages that have already been written to may lead to unexpected behavior.
    /// It is recommended to erase the sector before writing to it.
    pub fn write(&mut self, address: u32, buf: &[u8]) -> Result<usize, Error<S, P>> {
        let Some(span) = self.geometry.clamp(address, buf.len()) else {
            return Ok(0);
        };

        let mut done = 0;
        for chunk in self.geometry.page_spans(span) {
            match self.write_page(chunk.page, chunk.offset, &buf[done..done + chunk.len]) {
                Ok(written) => {
                    done += written;
                    if written < chunk.len {
                        break;
                    }
                }
                Err(error) if done == 0 => return Err(error),
                Err(_) => {
                    log_warn!("short write, {} of {} bytes", done, span.len);
                    break;
                }
            }
        }

        Ok(done)
    }

    /// Same as [`W25qxx::write`], but a page that fails is retried in place
    /// until `timeout_ms` has elapsed since the call started.
    ///
    /// On timeout the bytes committed so far are returned.
    pub fn write_until(
        &mut self,
        address: u32,
        buf: &[u8],
        timeout_ms: u32,
    ) -> Result<usize, Error<S, P>> {
        let Some(span) = self.geometry.clamp(address, buf.len()) else {
            return Ok(0);
        };

        let start = self.clock.now_ms();
        let (mut page, mut offset) = Geometry::split(span.address);
        let mut done = 0;
        let mut last_error = None;

        while done < span.len {
            let written = match self.write_page(page, offset, &buf[done..span.len]) {
                Ok(written) => written,
                Err(error) => {
                    last_error = Some(error);
                    0
                }
            };

            if written == 0 {
                if self.clock.elapsed_ms(start) >= timeout_ms {
                    log_warn!("write timed out, {} of {} bytes", done, span.len);
                    break;
                }

                log_debug!("retrying page {}", page);
                continue;
            }

            done += written;
            page += 1;
            offset = 0;
        }

        match last_error {
            Some(error) if done == 0 => Err(error),
            _ => Ok(done),
        }
    }

    /// Writes from `offset` within `sector`, stopping at the end of the sector.
    pub fn write_sector(&mut self, sector: u32, offset: u32, buf: &[u8]) -> Result<usize, Error<S, P>> {
        self.write_unit(Unit::Sector, sector, offset, buf)
    }

    /// Writes from `offset` within `block`, stopping at the end of the block.
    pub fn write_block(&mut self, block: u32, offset: u32, buf: &[u8]) -> Result<usize, Error<S, P>> {
        self.write_unit(Unit::Block, block, offset, buf)
    }

    pub fn write_byte(&mut self, address: u32, value: u8) -> Result<bool, Error<S, P>> {
        Ok(self.write(address, &[value])? == 1)
    }

    fn write_unit(
        &mut self,
        unit: Unit,
        index: u32,
        offset: u32,
        buf: &[u8],
    ) -> Result<usize, Error<S, P>> {
        let Some(span) = self.geometry.locate(unit, index, offset, buf.len()) else {
            return Ok(0);
        };

        self.write(span.address, &buf[..span.len])
    }

    /// Checks if the data at the provided address matches the provided slice.
    fn readback_check(&mut self, mut address: u32, data: &[u8]) -> Result<(), Error<S, P>> {
        const CHUNK_SIZE: usize = 64;

        let mut buf = [0; CHUNK_SIZE];

        for chunk in data.chunks(CHUNK_SIZE) {
            let buf = &mut buf[..chunk.len()];
            let read = self.read(address, buf)?;
            address += CHUNK_SIZE as u32;

            if read != chunk.len() || buf != chunk {
                return Err(Error::ReadbackFail);
            }
        }

        Ok(())
    }

    fn erased_check(&mut self, address: u32, len: u32) -> Result<(), Error<S, P>> {
        for offset in (0..len).step_by(64) {
            self.readback_check(address + offset, &[0xFF; 64])?;
        }

        Ok(())
    }

    /// Erases a single sector of flash memory with the size of SECTOR_SIZE.
    ///
    /// Returns false without touching the bus if `index` is not below `sector_max()`.
    pub fn erase_sector(&mut self, index: u32) -> Result<bool, Error<S, P>> {
        if index >= self.sector_max() {
            return Ok(false);
        }

        let timeout_ms = self.config.timeouts.sector_erase_ms;
        self.erase_unit(
            Command::SectorErase4KB,
            index * SECTOR_SIZE,
            SECTOR_SIZE,
            timeout_ms,
        )
    }

    /// Erases a single block of flash memory with the size of BLOCK_SIZE.
    ///
    /// Returns false without touching the bus if `index` is not below `block_max()`.
    pub fn erase_block(&mut self, index: u32) -> Result<bool, Error<S, P>> {
        if index >= self.block_max() {
            return Ok(false);
        }

        let timeout_ms = self.config.timeouts.block_erase_ms;
        self.erase_unit(
            Command::BlockErase64KB,
            index * BLOCK_SIZE,
            BLOCK_SIZE,
            timeout_ms,
        )
    }

    fn erase_unit(
        &mut self,
        command: Command,
        address: u32,
        size: u32,
        timeout_ms: u32,
    ) -> Result<bool, Error<S, P>> {
        // in case the chip is still busy from previous operation
        self.wait_busy(timeout_ms)?;
        self.enable_write()?;

        let erased = self
            .send_addressed(command, address)
            .and_then(|_| self.wait_busy(timeout_ms));
        let disabled = self.disable_write();

        erased?;
        disabled?;

        if cfg!(feature = "readback-check") {
            self.erased_check(address, size)?;
        }

        Ok(true)
    }

    /// Erases all sectors on the flash chip. This is a very expensive operation.
    ///
    /// Waits without a bound, both for a previous operation and for the erase
    /// itself (typical 80s, max 400s on 256 Mbit parts).
    pub fn erase_chip(&mut self) -> Result<bool, Error<S, P>> {
        if self.geometry.is_empty() {
            return Ok(false);
        }

        self.wait_idle()?;
        self.enable_write()?;

        let erased = self
            .send_command(Command::ChipErase)
            .and_then(|_| self.wait_idle());
        let disabled = self.disable_write();

        erased?;
        disabled?;

        if cfg!(feature = "readback-check") {
            self.erased_check(0, self.capacity())?;
        }

        Ok(true)
    }

    /// Erases a range of sectors. The range is expressed in bytes. These bytes need to be a multiple of SECTOR_SIZE.
    /// All sectors are erased in the range [start_address..end_address]. Whole
    /// aligned blocks inside the range are erased with a single block erase.
    ///
    /// # Arguments
    /// * `start_address` - Address of the first byte of the start of the range of sectors that need to be erased.
    /// * `end_address` - Address of the first byte of the end of the range of sectors that need to be erased.
    pub fn erase_range(&mut self, start_address: u32, end_address: u32) -> Result<(), Error<S, P>> {
        if start_address % SECTOR_SIZE != 0 || end_address % SECTOR_SIZE != 0 {
            return Err(Error::NotAligned);
        }

        if start_address > end_address || end_address > self.capacity() {
            return Err(Error::OutOfBounds);
        }

        let mut address = start_address;
        while address < end_address {
            if address % BLOCK_SIZE == 0 && end_address - address >= BLOCK_SIZE {
                self.erase_block(address / BLOCK_SIZE)?;
                address += BLOCK_SIZE;
            } else {
                self.erase_sector(address / SECTOR_SIZE)?;
                address += SECTOR_SIZE;
            }
        }

        Ok(())
    }
}
