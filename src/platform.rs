//! Services the driver consumes from its hosting environment.
//!
//! The driver never touches pin muxing, register mappings, or DMA-coherent
//! allocations itself; the host provides them through these traits. On a
//! Linux system that typically means `/dev/mem` mappings and mailbox
//! allocations, on a bare-metal system a static MMIO window and a reserved
//! uncached arena. Consult your platform layer for implementations.

use core::ptr::NonNull;

/// GPIO pin reservation service.
///
/// Mirrors what the driver needs from a GPIO layer: one-time bring-up and
/// the ability to claim individual pins as outputs. Reservation failures are
/// reported to the configuring caller; the driver never retries them.
pub trait Gpio {
    /// Prepare the GPIO controller for pin reservations.
    ///
    /// Returns `false` if the controller is unavailable (for example, the
    /// register window could not be opened).
    fn init(&mut self) -> bool;

    /// Switch `pin` to output mode and claim it for this driver.
    ///
    /// Returns `false` if the pin is invalid on this board or cannot be
    /// driven. Re-reserving an already-claimed pin must be harmless.
    fn reserve_output(&mut self, pin: u32) -> bool;
}

/// Maps physical peripheral register pages into the driver's address space.
///
/// # Safety
///
/// Implementations guarantee that a returned pointer addresses the requested
/// peripheral page, is valid for volatile reads and writes, and stays valid
/// for the lifetime of the implementor.
pub unsafe trait MapRegisters {
    /// Map the 4 KiB register page at `offset` from the peripheral base.
    ///
    /// Returns `None` if the mapping fails.
    fn map_register_page(&mut self, offset: u32) -> Option<NonNull<u32>>;
}

/// A block of DMA-coherent (uncached) memory.
///
/// The device and the driver observe each other's writes without cache
/// maintenance. Dropping the block releases it.
///
/// # Safety
///
/// Implementations guarantee that the pointer returned by [`as_ptr`] is
/// valid for reads and writes of [`len`] bytes for the block's lifetime,
/// aligned to at least 32 bytes (control blocks require it), and that
/// [`bus_address`] translates any address inside the block to the address
/// the DMA engine must use for the same byte.
///
/// [`as_ptr`]: CoherentBlock::as_ptr
/// [`len`]: CoherentBlock::len
/// [`bus_address`]: CoherentBlock::bus_address
pub unsafe trait CoherentBlock {
    /// Mapped address of the first byte of the block.
    fn as_ptr(&self) -> NonNull<u8>;

    /// Size of the block in bytes.
    fn len(&self) -> usize;

    /// Translate `ptr`, which must lie inside the block, to the bus address
    /// the DMA engine sees.
    fn bus_address(&self, ptr: *const u8) -> u32;
}

/// Allocator for DMA-coherent memory.
///
/// # Safety
///
/// Implementations guarantee that returned blocks satisfy the
/// [`CoherentBlock`] contract.
pub unsafe trait CoherentAlloc {
    /// The kind of block this allocator hands out.
    type Block: CoherentBlock;

    /// Allocate `size` bytes of uncached, device-visible memory.
    ///
    /// Returns `None` when no coherent memory is available; the driver
    /// treats that as unrecoverable.
    fn alloc_coherent(&mut self, size: usize) -> Option<Self::Block>;
}

/// The full set of services the driver needs from its host.
pub trait Platform: Gpio + MapRegisters + CoherentAlloc {}
impl<T: Gpio + MapRegisters + CoherentAlloc> Platform for T {}
