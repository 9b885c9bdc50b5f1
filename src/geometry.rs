//! Address arithmetic across page, sector and block granularity.
//!
//! Everything here is a pure function of the detected block count. A block count
//! of zero (no device identified yet) yields a capacity of zero, so every bounds
//! check below rejects every request without special casing.

use crate::command::AddressMode;
use crate::{BLOCK_SIZE, PAGE_SIZE, SECTOR_SIZE};

/// Devices with more blocks than this need 4-byte addressing.
pub const MAX_THREE_BYTE_BLOCKS: u32 = 256;

/// Addressing granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Unit {
    Page,
    Sector,
    Block,
}

impl Unit {
    pub const fn size(self) -> u32 {
        match self {
            Unit::Page => PAGE_SIZE,
            Unit::Sector => SECTOR_SIZE,
            Unit::Block => BLOCK_SIZE,
        }
    }
}

/// A contiguous byte range on the chip, already clamped to whatever boundary
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Span {
    pub address: u32,
    pub len: usize,
}

/// One page-program worth of a larger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PageSpan {
    pub page: u32,
    pub offset: u32,
    pub len: usize,
}

/// Geometry of an identified chip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Geometry {
    block_count: u32,
}

impl Geometry {
    pub const fn new(block_count: u32) -> Self {
        Geometry { block_count }
    }

    /// Capacity in bytes.
    pub const fn capacity(&self) -> u32 {
        self.block_count * BLOCK_SIZE
    }

    pub const fn block_max(&self) -> u32 {
        self.block_count
    }

    pub const fn sector_max(&self) -> u32 {
        self.block_count * (BLOCK_SIZE / SECTOR_SIZE)
    }

    pub const fn page_max(&self) -> u32 {
        self.block_count * (BLOCK_SIZE / PAGE_SIZE)
    }

    /// Number of units of the given size on the chip.
    pub const fn count(&self, unit: Unit) -> u32 {
        match unit {
            Unit::Page => self.page_max(),
            Unit::Sector => self.sector_max(),
            Unit::Block => self.block_max(),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.block_count == 0
    }

    pub const fn address_mode(&self) -> AddressMode {
        if self.block_count > MAX_THREE_BYTE_BLOCKS {
            AddressMode::FourByte
        } else {
            AddressMode::ThreeByte
        }
    }

    /// Clamps `len` bytes starting at `address` to the end of the chip.
    ///
    /// Returns `None` when `address` is past the end or `len` is zero.
    pub fn clamp(&self, address: u32, len: usize) -> Option<Span> {
        let capacity = self.capacity();
        if address >= capacity || len == 0 {
            return None;
        }

        let remaining = (capacity - address) as usize;
        Some(Span {
            address,
            len: len.min(remaining),
        })
    }

    /// Translates `(index, offset)` at the given granularity into a linear span.
    ///
    /// Fails if the index or the offset is out of range. A length running past
    /// the end of the unit is silently truncated; callers compare the returned
    /// length against what they asked for.
    pub fn locate(&self, unit: Unit, index: u32, offset: u32, len: usize) -> Option<Span> {
        let size = unit.size();
        if index >= self.count(unit) || offset >= size || len == 0 {
            return None;
        }

        let remaining = (size - offset) as usize;
        Some(Span {
            address: index * size + offset,
            len: len.min(remaining),
        })
    }

    /// Splits a linear address into its page index and intra-page offset.
    pub const fn split(address: u32) -> (u32, u32) {
        (address / PAGE_SIZE, address % PAGE_SIZE)
    }

    /// Walks a span page by page. The first chunk ends on the next page
    /// boundary, all following chunks start at offset 0.
    pub fn page_spans(&self, span: Span) -> PageSpans {
        let (page, offset) = Self::split(span.address);
        PageSpans {
            page,
            offset,
            remaining: span.len,
        }
    }
}

/// Iterator returned by [`Geometry::page_spans`].
#[derive(Debug, Clone)]
pub struct PageSpans {
    page: u32,
    offset: u32,
    remaining: usize,
}

impl Iterator for PageSpans {
    type Item = PageSpan;

    fn next(&mut self) -> Option<PageSpan> {
        if self.remaining == 0 {
            return None;
        }

        let len = self.remaining.min((PAGE_SIZE - self.offset) as usize);
        let item = PageSpan {
            page: self.page,
            offset: self.offset,
            len,
        };

        self.remaining -= len;
        self.page += 1;
        self.offset = 0;

        Some(item)
    }
}
