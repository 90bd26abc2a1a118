//! Driver error types

use core::fmt::{self, Debug, Display};

/// Errors reported by the multi-SPI driver.
///
/// Configuration and resource failures are surfaced as distinct results so
/// the owner can report them; none of them are retried internally. Misuse of
/// the API (an out-of-range byte position, an invalid DMA channel index) is
/// a contract violation and panics instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The GPIO controller could not be initialized.
    GpioInit,
    /// The pin could not be reserved as an output line.
    PinUnavailable(u32),
    /// The pin collides with the clock line.
    PinConflict(u32),
    /// Configuration arrived after the control block chain was built.
    ConfigurationSealed,
    /// The DMA controller's register page could not be mapped.
    RegisterMap,
    /// No DMA-coherent memory available.
    CoherentAlloc,
    /// The DMA engine flagged an error during the run.
    Transfer(ErrorStatus),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::GpioInit => write!(f, "GPIO controller unavailable"),
            Error::PinUnavailable(pin) => {
                write!(f, "GPIO {} cannot be reserved as an output", pin)
            }
            Error::PinConflict(pin) => write!(f, "GPIO {} collides with the clock line", pin),
            Error::ConfigurationSealed => {
                write!(f, "configuration is closed once the control block chain exists")
            }
            Error::RegisterMap => write!(f, "cannot map the DMA controller registers"),
            Error::CoherentAlloc => write!(f, "no DMA-coherent memory available"),
            Error::Transfer(status) => write!(f, "DMA engine aborted the run: {}", status),
        }
    }
}

/// A wrapper around a DMA channel's debug register value
///
/// The wrapper contains a copy of the channel's DEBUG register at the point
/// an error was observed. The type implements both `Debug` and `Display`,
/// and may be printed to understand why the engine aborted a run.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ErrorStatus {
    /// The raw debug register value
    debug: u32,
}

impl ErrorStatus {
    pub(crate) const fn new(debug: u32) -> Self {
        ErrorStatus { debug }
    }
    /// Returns the raw debug register value
    pub const fn raw(self) -> u32 {
        self.debug
    }
}

impl Debug for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DMA_DEBUG({:#010X})", self.debug)
    }
}

impl Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,
            "DMA_DEBUG: LITE {lite} VERSION {version} DMA_STATE {state:#05X} DMA_ID {id} OUTSTANDING_WRITES {writes} READ_ERROR {read} FIFO_ERROR {fifo} READ_LAST_NOT_SET_ERROR {last}",
            lite = (self.debug >> 28) & 0x1,
            version = (self.debug >> 25) & 0x7,
            state = (self.debug >> 16) & 0x1FF,
            id = (self.debug >> 8) & 0xFF,
            writes = (self.debug >> 4) & 0xF,
            read = (self.debug >> 2) & 0x1,
            fifo = (self.debug >> 1) & 0x1,
            last = self.debug & 0x1
        )
    }
}
