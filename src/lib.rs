//! DMA-driven multi-line SPI for BCM283x (Raspberry Pi) processors
//!
//! `bcm2835-multi-spi` emits a shared-clock serial protocol on many GPIO
//! data lines at once, with zero CPU involvement during the transfer. The
//! driver precomputes the full sequence of writes against the GPIO
//! set/clear registers, compiles it into a chain of DMA control blocks, and
//! lets the DMA engine replay it while supervising the run to completion.
//!
//! Two hardware tricks make this work:
//!
//! - The GPIO set/clear registers have pulse semantics: a 1 bit acts, a 0
//!   bit leaves the pin untouched. Data lines can therefore share one
//!   register image without clobbering each other, and the clock-raising
//!   images carry no data bits at all.
//! - Each control block uses the engine's 2D stride mode with a *negative*
//!   destination stride, so a linear buffer of register images replays onto
//!   the same four GPIO registers over and over.
//!
//! # Platform services
//!
//! The driver consumes pin reservations, register mappings, and DMA-coherent
//! memory through the traits in [`platform`]; it never opens `/dev/mem` or
//! talks to the mailbox itself. Delays come from `embedded-hal`'s
//! [`DelayNs`](embedded_hal::delay::DelayNs).
//!
//! # Getting started
//!
//! ```ignore
//! use bcm2835_multi_spi::MultiSpi;
//!
//! // Safety: DMA channel 5 is ours alone on this deployment.
//! let mut spi = unsafe { MultiSpi::new(platform, delay, CLOCK_PIN, 5)? };
//!
//! // Two LED strips with 144 RGB pixels each.
//! spi.add_data_pin(18, 144 * 3)?;
//! spi.add_data_pin(22, 144 * 3)?;
//!
//! loop {
//!     for (pos, byte) in frame.iter().enumerate() {
//!         spi.set_byte(18, pos, *byte);
//!     }
//!     spi.send()?; // first call compiles the control block chain
//! }
//! ```
//!
//! ### License
//!
//! Licensed under either of
//!
//! - [Apache License, Version 2.0](http://www.apache.org/licenses/LICENSE-2.0) ([LICENSE-APACHE](./LICENSE-APACHE))
//! - [MIT License](http://opensource.org/licenses/MIT) ([LICENSE-MIT](./LICENSE-MIT))
//!
//! at your option.
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted
//! for inclusion in the work by you, as defined in the Apache-2.0 license, shall be
//! dual licensed as above, without any additional terms or conditions.

#![no_std]

extern crate alloc;

mod chain;
mod channel;
mod error;
mod image;
pub mod platform;
mod ral;
mod spi;
#[cfg(test)]
mod test_support;

pub use channel::Channel;
pub use error::{Error, ErrorStatus};
pub use image::GpioImage;
pub use ral::{
    DMA_CHANNEL_COUNT, DMA_CHANNEL_STRIDE, DMA_OFFSET, GPIO_CLR_OFFSET, GPIO_OFFSET,
    GPIO_SET_BUS_ADDRESS, GPIO_SET_OFFSET, PERIPHERAL_BUS_BASE,
};
pub use spi::MultiSpi;

/// A driver result
pub type Result<T> = core::result::Result<T, Error>;
