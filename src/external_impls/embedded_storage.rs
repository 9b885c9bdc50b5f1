use crate::{Clock, Error, W25qxx, SECTOR_SIZE};
use core::fmt::Debug;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use embedded_storage::nor_flash::{MultiwriteNorFlash, NorFlash, ReadNorFlash};

impl<SPI, S: Debug, P: Debug, CS, CLK> ReadNorFlash for W25qxx<SPI, CS, CLK>
where
    SPI: SpiBus<Error = S>,
    CS: OutputPin<Error = P>,
    CLK: Clock,
    S: Debug,
    P: Debug,
{
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_range(W25qxx::capacity(self), offset, bytes.len())?;

        let read = W25qxx::read(self, offset, bytes)?;
        if read != bytes.len() {
            return Err(Error::PartialRead { read });
        }

        Ok(())
    }

    fn capacity(&self) -> usize {
        W25qxx::capacity(self) as usize
    }
}

impl<SPI, S: Debug, P: Debug, CS, CLK> NorFlash for W25qxx<SPI, CS, CLK>
where
    SPI: SpiBus<Error = S>,
    CS: OutputPin<Error = P>,
    CLK: Clock,
    S: Debug,
    P: Debug,
{
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = SECTOR_SIZE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        self.erase_range(from, to)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_range(W25qxx::capacity(self), offset, bytes.len())?;

        let written = W25qxx::write(self, offset, bytes)?;
        if written != bytes.len() {
            return Err(Error::PartialWrite { written });
        }

        Ok(())
    }
}

// Programming only ever clears bits.
impl<SPI, S: Debug, P: Debug, CS, CLK> MultiwriteNorFlash for W25qxx<SPI, CS, CLK>
where
    SPI: SpiBus<Error = S>,
    CS: OutputPin<Error = P>,
    CLK: Clock,
    S: Debug,
    P: Debug,
{
}

fn check_range<S: Debug, P: Debug>(
    capacity: u32,
    offset: u32,
    length: usize,
) -> Result<(), Error<S, P>> {
    let capacity = capacity as usize;
    if length > capacity || offset as usize > capacity - length {
        return Err(Error::OutOfBounds);
    }
    Ok(())
}
