use embedded_hal::digital::OutputPin;

/// Reentrant chip select.
///
/// The pin is driven low on the first [`ChipSelect::select`] and high again on
/// the matching last [`ChipSelect::deselect`]. Nested pairs in between leave the
/// line alone, so helpers that select on their own can be composed inside a
/// larger command sequence.
pub struct ChipSelect<CS> {
    pin: CS,
    depth: u16,
}

impl<CS: OutputPin> ChipSelect<CS> {
    pub fn new(pin: CS) -> Self {
        Self { pin, depth: 0 }
    }

    /// Drives the line high and forgets any outstanding selections.
    pub fn reset(&mut self) -> Result<(), CS::Error> {
        self.depth = 0;
        self.pin.set_high()
    }

    pub fn select(&mut self) -> Result<(), CS::Error> {
        if self.depth == 0 {
            self.pin.set_low()?;
        }
        self.depth += 1;
        Ok(())
    }

    /// Unbalanced calls at depth zero are ignored.
    pub fn deselect(&mut self) -> Result<(), CS::Error> {
        match self.depth {
            0 => Ok(()),
            1 => {
                self.depth = 0;
                self.pin.set_high()
            }
            _ => {
                self.depth -= 1;
                Ok(())
            }
        }
    }
}

impl<CS> ChipSelect<CS> {
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// True when the next `deselect` releases the line.
    pub fn is_outermost(&self) -> bool {
        self.depth == 1
    }

    pub fn release(self) -> CS {
        self.pin
    }
}
