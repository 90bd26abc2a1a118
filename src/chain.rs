//! Control block chains
//!
//! A control block is the BCM2835 DMA engine's transfer descriptor: a
//! 32-byte record the engine loads from memory, executes, and follows to the
//! next one. This module compiles the image sequence into a chain of control
//! blocks inside one DMA-coherent region.
//!
//! Each block uses the engine's 2D "stride" mode: X length is one register
//! image, Y is the number of images the block covers, and the destination
//! steps *backwards* by one image width between rows. Every image therefore
//! lands on the same GPSET0..GPCLR0 registers instead of marching through
//! the peripheral's address space.

use core::mem::size_of;
use core::sync::atomic::{fence, Ordering};

use crate::error::Error;
use crate::image::GpioImage;
use crate::platform::{CoherentAlloc, CoherentBlock};
use crate::ral::GPIO_SET_BUS_ADDRESS;

/// Transfer information flags.
pub(crate) mod ti {
    /// Increment the source address per read.
    pub const SRC_INC: u32 = 1 << 8;
    /// Increment the destination address per write.
    pub const DEST_INC: u32 = 1 << 4;
    /// Do not issue wide write bursts.
    pub const NO_WIDE_BURSTS: u32 = 1 << 26;
    /// 2D stride transfer mode.
    pub const TDMODE: u32 = 1 << 1;
}

/// Pack the 2D transfer length: `xlen` bytes per row, `ylen` rows.
///
/// The hardware's Y field holds the row count minus one.
pub(crate) const fn transfer_length_2d(xlen: u32, ylen: u32) -> u32 {
    (((ylen - 1) & 0x3FFF) << 16) | (xlen & 0xFFFF)
}

/// Pack the per-row address adjustments, two's complement 16 bits each.
pub(crate) const fn stride_2d(src: i16, dest: i16) -> u32 {
    ((dest as u16 as u32) << 16) | (src as u16 as u32)
}

/// BCM2835 DMA control block.
///
/// Layout and flag encodings are fixed by the engine; the engine reads the
/// record straight out of memory, so the struct must stay 32 bytes with
/// 32-byte alignment.
#[repr(C, align(32))]
#[derive(Clone, Copy, Debug)]
pub(crate) struct ControlBlock {
    /// Transfer information flags.
    pub info: u32,
    /// Bus address of the source data.
    pub source: u32,
    /// Bus address of the destination.
    pub dest: u32,
    /// Transfer length, 2D-encoded.
    pub length: u32,
    /// 2D stride, signed 16 bits per axis.
    pub stride: u32,
    /// Bus address of the next control block; 0 terminates the chain.
    pub next: u32,
    _pad: [u32; 2],
}

const _: () = assert!(core::mem::size_of::<ControlBlock>() == 32);

/// One control block may span at most this much source data.
const MAX_SPAN_BYTES: usize = 1 << 16;
/// Images a single control block can cover.
const MAX_IMAGES_PER_BLOCK: usize = MAX_SPAN_BYTES / size_of::<GpioImage>();

/// A compiled control block chain plus the device-visible image sequence.
///
/// Owns the coherent region for the engine's lifetime; dropping the chain
/// releases it.
pub(crate) struct Chain<B> {
    region: B,
    control_block_count: usize,
    image_count: usize,
    images_offset: usize,
    head: u32,
}

impl<B: CoherentBlock> Chain<B> {
    /// Lay out `image_count` images and the control blocks that replay them.
    ///
    /// Allocates one coherent region holding the control blocks followed by
    /// the image sequence, and links the blocks by bus address. Allocation
    /// failure is unrecoverable for this driver.
    pub fn compile<A>(alloc: &mut A, image_count: usize) -> Result<Self, Error>
    where
        A: CoherentAlloc<Block = B>,
    {
        let control_block_count = image_count.div_ceil(MAX_IMAGES_PER_BLOCK);
        let images_offset = control_block_count * size_of::<ControlBlock>();
        let size = images_offset + image_count * size_of::<GpioImage>();
        let region = alloc.alloc_coherent(size).ok_or(Error::CoherentAlloc)?;
        let base = region.as_ptr().as_ptr();

        let mut remaining = image_count;
        let mut image_cursor = images_offset;
        for index in 0..control_block_count {
            let count = remaining.min(MAX_IMAGES_PER_BLOCK);
            let next = if index + 1 == control_block_count {
                0
            } else {
                // Safety: the next block lies inside the region we just sized.
                region.bus_address(unsafe { base.add((index + 1) * size_of::<ControlBlock>()) })
            };
            let block = ControlBlock {
                info: ti::SRC_INC | ti::DEST_INC | ti::NO_WIDE_BURSTS | ti::TDMODE,
                // Safety: cursor stays within the image area sized above.
                source: region.bus_address(unsafe { base.add(image_cursor) }),
                dest: GPIO_SET_BUS_ADDRESS,
                length: transfer_length_2d(size_of::<GpioImage>() as u32, count as u32),
                stride: stride_2d(0, -(size_of::<GpioImage>() as i16)),
                next,
                _pad: [0; 2],
            };
            // Safety: in-bounds, and the region is 32-byte aligned per the
            // CoherentBlock contract.
            unsafe {
                base.add(index * size_of::<ControlBlock>())
                    .cast::<ControlBlock>()
                    .write(block);
            }
            remaining -= count;
            image_cursor += count * size_of::<GpioImage>();
        }
        // The engine must observe fully written control blocks.
        fence(Ordering::Release);

        log::debug!(
            "compiled {} control blocks covering {} gpio images",
            control_block_count,
            image_count
        );

        let head = region.bus_address(base);
        Ok(Chain {
            region,
            control_block_count,
            image_count,
            images_offset,
            head,
        })
    }

    /// Bus address of the first control block.
    pub fn head(&self) -> u32 {
        self.head
    }

    /// Synchronize the device-visible images with the shadow contents.
    ///
    /// One bulk copy; the only point where shadow and device state meet.
    pub fn copy_images(&mut self, images: &[GpioImage]) {
        debug_assert_eq!(images.len(), self.image_count);
        let bytes: &[u8] = bytemuck::cast_slice(images);
        // Safety: the image area was sized for exactly image_count entries.
        unsafe {
            let dst = self.region.as_ptr().as_ptr().add(self.images_offset);
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
        }
        fence(Ordering::Release);
    }

    #[cfg(test)]
    pub fn control_blocks(&self) -> &[ControlBlock] {
        // Safety: compile wrote exactly control_block_count records here.
        unsafe {
            core::slice::from_raw_parts(
                self.region.as_ptr().as_ptr().cast::<ControlBlock>(),
                self.control_block_count,
            )
        }
    }

    #[cfg(test)]
    pub fn images(&self) -> &[GpioImage] {
        // Safety: the image area holds image_count entries.
        unsafe {
            core::slice::from_raw_parts(
                self.region
                    .as_ptr()
                    .as_ptr()
                    .add(self.images_offset)
                    .cast::<GpioImage>(),
                self.image_count,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::images_for;
    use crate::test_support::{TestAlloc, TEST_BUS_BASE};
    use alloc::vec::Vec;

    #[test]
    fn length_and_stride_encodings() {
        assert_eq!(transfer_length_2d(16, 1), 16);
        assert_eq!(transfer_length_2d(16, 4096), (4095 << 16) | 16);
        assert_eq!(stride_2d(0, -16), 0xFFF0_0000);
    }

    #[test]
    fn single_block_chain() {
        let mut alloc = TestAlloc::new();
        let chain = Chain::compile(&mut alloc, images_for(1)).unwrap();
        assert_eq!(chain.head(), TEST_BUS_BASE);

        let blocks = chain.control_blocks();
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(
            block.info,
            ti::SRC_INC | ti::DEST_INC | ti::NO_WIDE_BURSTS | ti::TDMODE
        );
        assert_eq!(block.dest, GPIO_SET_BUS_ADDRESS);
        // 17 images start right after the single control block.
        assert_eq!(block.source, TEST_BUS_BASE + 32);
        assert_eq!(block.length, transfer_length_2d(16, 17));
        assert_eq!(block.stride, stride_2d(0, -16));
        assert_eq!(block.next, 0);
    }

    #[test]
    fn chain_splits_at_the_span_ceiling() {
        // 300 payload bytes: 4801 images, one more than a block can carry.
        let image_count = images_for(300);
        let mut alloc = TestAlloc::new();
        let chain = Chain::compile(&mut alloc, image_count).unwrap();
        let blocks = chain.control_blocks();
        assert_eq!(blocks.len(), 2);

        let images_base = TEST_BUS_BASE + 2 * 32;
        let mut expected_source = images_base;
        let mut covered = 0usize;
        for (index, block) in blocks.iter().enumerate() {
            // Gapless, overlap-free coverage: each block picks up exactly
            // where the previous one stopped.
            assert_eq!(block.source, expected_source);
            let rows = ((block.length >> 16) & 0x3FFF) as usize + 1;
            covered += rows;
            expected_source += (rows * 16) as u32;
            if index + 1 == blocks.len() {
                assert_eq!(block.next, 0);
            } else {
                assert_eq!(block.next, TEST_BUS_BASE + ((index + 1) * 32) as u32);
            }
        }
        assert_eq!(blocks[0].length, transfer_length_2d(16, 4096));
        assert_eq!(blocks[1].length, transfer_length_2d(16, 705));
        assert_eq!(covered, image_count);
    }

    #[test]
    fn exact_ceiling_needs_one_block() {
        let mut alloc = TestAlloc::new();
        let chain = Chain::compile(&mut alloc, 4096).unwrap();
        assert_eq!(chain.control_blocks().len(), 1);
        assert_eq!(chain.control_blocks()[0].length, transfer_length_2d(16, 4096));
    }

    #[test]
    fn allocation_failure_is_fatal() {
        let mut alloc = TestAlloc::new();
        alloc.fail = true;
        assert!(matches!(
            Chain::compile(&mut alloc, 17),
            Err(Error::CoherentAlloc)
        ));
    }

    #[test]
    fn image_copy_round_trips() {
        let mut alloc = TestAlloc::new();
        let mut chain = Chain::compile(&mut alloc, 33).unwrap();
        let staged: Vec<GpioImage> = (0..33)
            .map(|n| GpioImage {
                set: n,
                set_upper: 0,
                reserved: 0,
                clear: !n,
            })
            .collect();
        chain.copy_images(&staged);
        assert_eq!(chain.images(), staged.as_slice());
    }
}
