//! GPIO register images and the shadow buffer

use alloc::vec::Vec;
use bytemuck::{Pod, Zeroable};

use crate::ral::{GPIO_CLR_OFFSET, GPIO_SET_OFFSET};

/// One atomic write against the GPIO set/clear register block.
///
/// The four words mirror GPSET0 through GPCLR0. A DMA write of this image
/// onto GPSET0 drives every pin whose bit is set in `set` high and every pin
/// whose bit is set in `clear` low; zero bits leave the pin untouched. That
/// pulse semantic is what lets many data lines share one image without
/// clobbering each other.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct GpioImage {
    /// Bits written to GPSET0; pins 0-31 driven high.
    pub set: u32,
    /// GPSET1, pins 32 and up. Unused by this driver, always zero.
    pub set_upper: u32,
    /// Register gap between GPSET1 and GPCLR0.
    pub reserved: u32,
    /// Bits written to GPCLR0; pins 0-31 driven low.
    pub clear: u32,
}

// The image layout is a binary contract: DMA replays it byte for byte over
// GPSET0..GPCLR0, so any size or offset drift corrupts unrelated registers.
const _: () = assert!(
    core::mem::size_of::<GpioImage>() == (GPIO_CLR_OFFSET - GPIO_SET_OFFSET + 4) as usize
);
const _: () =
    assert!(core::mem::offset_of!(GpioImage, clear) == (GPIO_CLR_OFFSET - GPIO_SET_OFFSET) as usize);

impl GpioImage {
    /// Image that pulls the clock line low and latches nothing else.
    pub(crate) const fn clock_low(clock_pin: u32) -> Self {
        GpioImage {
            set: 0,
            set_upper: 0,
            reserved: 0,
            clear: 1 << clock_pin,
        }
    }

    /// Image that raises the clock line. Carries no data bits, so the data
    /// values latched by the preceding image stay electrically present.
    pub(crate) const fn clock_high(clock_pin: u32) -> Self {
        GpioImage {
            set: 1 << clock_pin,
            set_upper: 0,
            reserved: 0,
            clear: 0,
        }
    }
}

/// Images per payload byte: 8 bits, two clock half-steps each.
pub(crate) const IMAGES_PER_BYTE: usize = 16;

/// Number of images needed to clock out `bytes` payload bytes.
///
/// The trailing entry forces the clock low once the transmission is over.
pub(crate) const fn images_for(bytes: usize) -> usize {
    bytes * IMAGES_PER_BYTE + 1
}

/// In-process staging copy of the transmission.
///
/// Byte values are composed here, in ordinary cached memory, and bulk-copied
/// into the DMA-visible region right before a send. Repeated small writes to
/// uncached memory are drastically slower, which is the whole reason this
/// buffer exists.
///
/// Entries alternate by index parity: even entries present data with the
/// clock low, odd entries raise the clock. The alternation is fixed when the
/// buffer grows; afterwards only the data bits of even entries change.
pub(crate) struct ShadowBuffer {
    images: Vec<GpioImage>,
    clock_pin: u32,
    payload_bytes: usize,
}

impl ShadowBuffer {
    pub fn new(clock_pin: u32) -> Self {
        let mut images = Vec::with_capacity(images_for(0));
        images.push(GpioImage::clock_low(clock_pin));
        ShadowBuffer {
            images,
            clock_pin,
            payload_bytes: 0,
        }
    }

    /// Total number of images, trailing clock-low entry included.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Payload length in bytes per data line.
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    pub fn as_slice(&self) -> &[GpioImage] {
        &self.images
    }

    /// Grow the buffer to hold `bytes` payload bytes. Never shrinks.
    ///
    /// New entries are initialized to the clock-low/clock-high alternation.
    /// The previous trailing entry is reinitialized too: it is no longer the
    /// last image, but its parity keeps it a plain clock-low entry.
    pub fn grow_to(&mut self, bytes: usize) {
        if bytes <= self.payload_bytes {
            return;
        }
        let old_end = self.images.len();
        let new_end = images_for(bytes);
        self.images.resize(new_end, GpioImage::zeroed());
        for index in (old_end - 1)..new_end {
            self.images[index] = if index % 2 == 0 {
                GpioImage::clock_low(self.clock_pin)
            } else {
                GpioImage::clock_high(self.clock_pin)
            };
        }
        self.payload_bytes = bytes;
    }

    /// Stage `value` as byte `pos` of `pin`'s payload, most significant bit
    /// first.
    ///
    /// Each bit fully determines both the set and the clear field for `pin`
    /// on its image, so restaging a byte is idempotent and lines never
    /// disturb each other.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is outside the configured payload length.
    pub fn set_byte(&mut self, pin: u32, pos: usize, value: u8) {
        assert!(
            pos < self.payload_bytes,
            "byte position {} outside payload of {} bytes",
            pos,
            self.payload_bytes
        );
        let mask = 1u32 << pin;
        let images = &mut self.images[pos * IMAGES_PER_BYTE..][..IMAGES_PER_BYTE];
        for (bit, image) in images.iter_mut().step_by(2).enumerate() {
            if value & (0x80 >> bit) != 0 {
                image.set |= mask;
                image.clear &= !mask;
            } else {
                image.set &= !mask;
                image.clear |= mask;
            }
        }
    }
}
