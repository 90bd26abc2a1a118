//! The multi-line SPI engine

use alloc::vec::Vec;
use embedded_hal::delay::DelayNs;

use crate::chain::Chain;
use crate::channel::Channel;
use crate::error::Error;
use crate::image::ShadowBuffer;
use crate::platform::Platform;
use crate::ral::DMA_OFFSET;
use crate::Result;

/// AXI priority for the channel, normal and panic arbitration alike.
const TRANSFER_PRIORITY: u32 = 7;
/// Wait between completion polls.
const POLL_INTERVAL_US: u32 = 10;
/// Settle time after requesting an abort.
const ABORT_SETTLE_US: u32 = 100;

/// A multi-line SPI transmitter driven by the DMA engine.
///
/// One engine owns one clock pin, any number of data pins, and one DMA
/// channel. Usage is two-phased: configure pins and stage payload bytes,
/// then [`send`](Self::send) replays the whole staged buffer in a single
/// hardware run. The first send compiles the control block chain and seals
/// the pin configuration; byte staging stays available between sends.
///
/// The engine is single-threaded and blocking. `send` polls the channel
/// with short sleeps until the run reaches a terminal state; there is no
/// mid-transfer cancellation.
pub struct MultiSpi<P: Platform, D: DelayNs> {
    platform: P,
    delay: D,
    channel: Channel,
    clock_pin: u32,
    data_pins: Vec<u32>,
    shadow: ShadowBuffer,
    chain: Option<Chain<P::Block>>,
}

impl<P: Platform, D: DelayNs> MultiSpi<P, D> {
    /// Claim `clock_pin` and DMA channel `dma_channel` from the platform.
    ///
    /// Initializes the GPIO service, reserves the clock pin, maps the DMA
    /// controller page, and resets the channel to a known idle state.
    ///
    /// # Safety
    ///
    /// The caller must make sure this engine is the only owner of
    /// `dma_channel` on the whole system. Two engines driving one channel
    /// alias mutable hardware state; the channel number is a deployment
    /// constant, not negotiated at runtime.
    ///
    /// # Panics
    ///
    /// Panics if `dma_channel` is 16 or greater.
    pub unsafe fn new(
        mut platform: P,
        delay: D,
        clock_pin: u32,
        dma_channel: usize,
    ) -> Result<Self> {
        if clock_pin >= 32 {
            return Err(Error::PinUnavailable(clock_pin));
        }
        if !platform.init() {
            return Err(Error::GpioInit);
        }
        if !platform.reserve_output(clock_pin) {
            return Err(Error::PinUnavailable(clock_pin));
        }
        let controller = platform
            .map_register_page(DMA_OFFSET)
            .ok_or(Error::RegisterMap)?;
        let mut channel = Channel::new(controller.as_ptr(), dma_channel);
        channel.reset();
        Ok(MultiSpi {
            platform,
            delay,
            channel,
            clock_pin,
            data_pins: Vec::new(),
            shadow: ShadowBuffer::new(clock_pin),
            chain: None,
        })
    }

    /// The shared clock pin.
    pub fn clock_pin(&self) -> u32 {
        self.clock_pin
    }

    /// Current payload length in bytes per data line.
    pub fn payload_bytes(&self) -> usize {
        self.shadow.payload_bytes()
    }

    /// Register `pin` as a data line carrying `payload_bytes` bytes per send.
    ///
    /// May be called repeatedly, also for pins that already exist; the
    /// staged buffer grows to the largest requested payload and never
    /// shrinks. Fails once the first send (or an explicit
    /// [`compile`](Self::compile)) has sealed the configuration, and when
    /// the platform refuses the pin. Reservation failures are not retried.
    pub fn add_data_pin(&mut self, pin: u32, payload_bytes: usize) -> Result<()> {
        if self.chain.is_some() {
            return Err(Error::ConfigurationSealed);
        }
        if pin >= 32 {
            return Err(Error::PinUnavailable(pin));
        }
        if pin == self.clock_pin {
            return Err(Error::PinConflict(pin));
        }
        self.shadow.grow_to(payload_bytes);
        if !self.platform.reserve_output(pin) {
            return Err(Error::PinUnavailable(pin));
        }
        if !self.data_pins.contains(&pin) {
            self.data_pins.push(pin);
        }
        Ok(())
    }

    /// Stage `value` as byte `pos` of `pin`'s payload.
    ///
    /// Bits go out most significant first. Staging only touches ordinary
    /// memory; nothing reaches the device until [`send`](Self::send).
    ///
    /// # Panics
    ///
    /// Panics if `pos` is outside the configured payload length.
    pub fn set_byte(&mut self, pin: u32, pos: usize, value: u8) {
        debug_assert!(
            self.data_pins.contains(&pin),
            "GPIO {} is not a registered data line",
            pin
        );
        self.shadow.set_byte(pin, pos, value);
    }

    /// Build the control block chain and seal the pin configuration.
    ///
    /// The first [`send`](Self::send) calls this on its own; calling it
    /// twice is an error. Coherent-memory exhaustion is unrecoverable.
    pub fn compile(&mut self) -> Result<()> {
        if self.chain.is_some() {
            return Err(Error::ConfigurationSealed);
        }
        let chain = Chain::compile(&mut self.platform, self.shadow.len())?;
        self.chain = Some(chain);
        Ok(())
    }

    /// Replay the staged buffer once, blocking until the run finishes.
    ///
    /// Copies the shadow into device-visible memory, starts the channel,
    /// and polls with short sleeps until the hardware either completes or
    /// flags an error. Either way the channel is aborted and reset back to
    /// idle before returning; a flagged error surfaces as
    /// [`Error::Transfer`].
    pub fn send(&mut self) -> Result<()> {
        if self.chain.is_none() {
            self.compile()?;
        }
        let chain = self.chain.as_mut().expect("chain compiled above");
        chain.copy_images(self.shadow.as_slice());
        let head = chain.head();

        log::trace!(
            "replaying {} gpio images on dma channel {}",
            self.shadow.len(),
            self.channel.channel()
        );

        self.channel.clear_complete();
        self.channel.set_control_block(head);
        self.channel.set_priority(TRANSFER_PRIORITY, TRANSFER_PRIORITY);
        // Safety: the chain and its coherent images stay alive and untouched
        // until the loop below observes a terminal state.
        unsafe { self.channel.activate() };

        let result = loop {
            if self.channel.is_error() {
                break Err(Error::Transfer(self.channel.error_status()));
            }
            if !self.channel.is_active() {
                break Ok(());
            }
            self.delay.delay_us(POLL_INTERVAL_US);
        };

        // Terminal state either way; force the channel back to a clean idle.
        self.channel.abort();
        self.delay.delay_us(ABORT_SETTLE_US);
        self.channel.clear_active();
        self.channel.reset();

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{CoherentAlloc, Gpio, MapRegisters};
    use crate::test_support::{TestAlloc, TestBlock, TEST_BUS_BASE};
    use alloc::boxed::Box;
    use core::ptr::NonNull;

    const CLOCK: u32 = 17;
    const DATA: u32 = 18;
    const CHANNEL: usize = 5;
    /// Word index of channel 5's CS register within the fake page.
    const CS: usize = CHANNEL * 64;
    const CONBLK_AD: usize = CS + 1;
    const DEBUG: usize = CS + 8;

    const ACTIVE_BIT: u32 = 1 << 0;
    const ERROR_BIT: u32 = 1 << 8;
    const RESET_BIT: u32 = 1 << 31;

    struct TestPlatform {
        /// Keeps the fake register page alive; accessed only through `base`.
        _page: Box<[u32; 1024]>,
        base: *mut u32,
        alloc: TestAlloc,
        fail_init: bool,
        refuse_pin: Option<u32>,
        reserved: Vec<u32>,
    }

    impl TestPlatform {
        fn new() -> Self {
            let mut page = Box::new([0; 1024]);
            // The page lives on the heap; the pointer survives moving the box.
            let base = page.as_mut_ptr();
            TestPlatform {
                _page: page,
                base,
                alloc: TestAlloc::new(),
                fail_init: false,
                refuse_pin: None,
                reserved: Vec::new(),
            }
        }

        fn register_ptr(&self, word: usize) -> *mut u32 {
            unsafe { self.base.add(word) }
        }
    }

    impl Gpio for TestPlatform {
        fn init(&mut self) -> bool {
            !self.fail_init
        }

        fn reserve_output(&mut self, pin: u32) -> bool {
            if self.refuse_pin == Some(pin) {
                return false;
            }
            self.reserved.push(pin);
            true
        }
    }

    unsafe impl MapRegisters for TestPlatform {
        fn map_register_page(&mut self, offset: u32) -> Option<NonNull<u32>> {
            assert_eq!(offset, crate::ral::DMA_OFFSET);
            NonNull::new(self.base)
        }
    }

    unsafe impl CoherentAlloc for TestPlatform {
        type Block = TestBlock;

        fn alloc_coherent(&mut self, size: usize) -> Option<TestBlock> {
            self.alloc.alloc_coherent(size)
        }
    }

    /// What the fake hardware does whenever the poll loop sleeps.
    enum Terminal {
        Complete,
        Error(u32),
    }

    struct ScriptedDelay {
        cs: *mut u32,
        debug: *mut u32,
        terminal: Terminal,
    }

    impl DelayNs for ScriptedDelay {
        fn delay_ns(&mut self, _ns: u32) {
            unsafe {
                let cs = self.cs.read_volatile();
                match self.terminal {
                    Terminal::Complete => self.cs.write_volatile(cs & !ACTIVE_BIT),
                    Terminal::Error(status) => {
                        self.debug.write_volatile(status);
                        self.cs.write_volatile(cs | ERROR_BIT);
                    }
                }
            }
        }
    }

    fn engine_with(
        platform: TestPlatform,
        terminal: Terminal,
    ) -> MultiSpi<TestPlatform, ScriptedDelay> {
        let delay = ScriptedDelay {
            cs: platform.register_ptr(CS),
            debug: platform.register_ptr(DEBUG),
            terminal,
        };
        unsafe { MultiSpi::new(platform, delay, CLOCK, CHANNEL) }.unwrap()
    }

    fn engine(terminal: Terminal) -> MultiSpi<TestPlatform, ScriptedDelay> {
        engine_with(TestPlatform::new(), terminal)
    }

    #[test]
    fn construction_claims_clock_and_resets_channel() {
        let spi = engine(Terminal::Complete);
        assert_eq!(spi.clock_pin(), CLOCK);
        assert_eq!(spi.platform.reserved, [CLOCK]);
        let cs = unsafe { spi.platform.register_ptr(CS).read_volatile() };
        assert_ne!(cs & RESET_BIT, 0);
    }

    #[test]
    fn construction_failures_are_distinguished() {
        let mut platform = TestPlatform::new();
        platform.fail_init = true;
        let delay = ScriptedDelay {
            cs: platform.register_ptr(CS),
            debug: platform.register_ptr(DEBUG),
            terminal: Terminal::Complete,
        };
        let result = unsafe { MultiSpi::new(platform, delay, CLOCK, CHANNEL) };
        assert!(matches!(result, Err(Error::GpioInit)));

        let mut platform = TestPlatform::new();
        platform.refuse_pin = Some(CLOCK);
        let delay = ScriptedDelay {
            cs: platform.register_ptr(CS),
            debug: platform.register_ptr(DEBUG),
            terminal: Terminal::Complete,
        };
        let result = unsafe { MultiSpi::new(platform, delay, CLOCK, CHANNEL) };
        assert!(matches!(result, Err(Error::PinUnavailable(CLOCK))));
    }

    #[test]
    fn data_pin_validation() {
        let mut spi = engine(Terminal::Complete);
        assert_eq!(spi.add_data_pin(CLOCK, 1), Err(Error::PinConflict(CLOCK)));
        assert_eq!(spi.add_data_pin(32, 1), Err(Error::PinUnavailable(32)));
        spi.platform.refuse_pin = Some(22);
        assert_eq!(spi.add_data_pin(22, 1), Err(Error::PinUnavailable(22)));
        // Re-adding an existing pin is idempotent.
        spi.add_data_pin(DATA, 1).unwrap();
        spi.add_data_pin(DATA, 1).unwrap();
        assert_eq!(spi.data_pins, [DATA]);
    }

    #[test]
    fn growth_across_pins_preserves_staged_bytes() {
        let mut spi = engine(Terminal::Complete);
        spi.add_data_pin(DATA, 2).unwrap();
        spi.set_byte(DATA, 0, 0xC3);
        spi.set_byte(DATA, 1, 0x3C);
        spi.add_data_pin(22, 6).unwrap();
        assert_eq!(spi.payload_bytes(), 6);
        assert_eq!(spi.shadow.len(), 6 * 16 + 1);
        let mask = 1u32 << DATA;
        // Byte 0 of the short line: 0xC3 = 1100_0011, still intact.
        let images = spi.shadow.as_slice();
        assert_ne!(images[0].set & mask, 0);
        assert_ne!(images[2].set & mask, 0);
        assert_ne!(images[4].clear & mask, 0);
        assert_ne!(images[14].set & mask, 0);
    }

    #[test]
    fn first_send_compiles_and_replays() {
        let mut spi = engine(Terminal::Complete);
        spi.add_data_pin(DATA, 1).unwrap();
        spi.set_byte(DATA, 0, 0b1011_0000);
        spi.send().unwrap();

        let chain = spi.chain.as_ref().unwrap();
        assert_eq!(chain.head(), TEST_BUS_BASE);
        let images = chain.images();
        assert_eq!(images.len(), 17);
        let mask = 1u32 << DATA;
        for (bit, high) in [true, false, true, true, false, false, false, false]
            .iter()
            .enumerate()
        {
            let image = images[2 * bit];
            assert_eq!(image.set & mask != 0, *high, "bit {bit}");
            assert_eq!(image.clear & mask != 0, !*high, "bit {bit}");
        }
        let tail = images[16];
        assert_eq!(tail.set, 0);
        assert_eq!(tail.clear, 1 << CLOCK);

        // The channel saw the chain head and ended up reset.
        let conblk = unsafe { spi.platform.register_ptr(CONBLK_AD).read_volatile() };
        assert_eq!(conblk, TEST_BUS_BASE);
        let cs = unsafe { spi.platform.register_ptr(CS).read_volatile() };
        assert_eq!(cs & ACTIVE_BIT, 0);
        assert_ne!(cs & RESET_BIT, 0);
    }

    #[test]
    fn send_is_repeatable_and_staging_stays_open() {
        let mut spi = engine(Terminal::Complete);
        spi.add_data_pin(DATA, 1).unwrap();
        spi.set_byte(DATA, 0, 0xFF);
        spi.send().unwrap();
        // Restage between sends; only pin configuration is sealed.
        spi.set_byte(DATA, 0, 0x00);
        spi.send().unwrap();
        let mask = 1u32 << DATA;
        for image in spi.chain.as_ref().unwrap().images()[..16].iter().step_by(2) {
            assert_eq!(image.set & mask, 0);
            assert_ne!(image.clear & mask, 0);
        }
    }

    #[test]
    fn configuration_seals_after_first_send() {
        let mut spi = engine(Terminal::Complete);
        spi.add_data_pin(DATA, 1).unwrap();
        spi.send().unwrap();
        assert_eq!(spi.add_data_pin(22, 1), Err(Error::ConfigurationSealed));
        assert_eq!(spi.compile(), Err(Error::ConfigurationSealed));
    }

    #[test]
    fn explicit_compile_happens_once() {
        let mut spi = engine(Terminal::Complete);
        spi.add_data_pin(DATA, 1).unwrap();
        spi.compile().unwrap();
        assert_eq!(spi.compile(), Err(Error::ConfigurationSealed));
        assert_eq!(spi.add_data_pin(22, 1), Err(Error::ConfigurationSealed));
        spi.send().unwrap();
    }

    #[test]
    fn transfer_error_is_surfaced_and_channel_still_reset() {
        let mut spi = engine(Terminal::Error(0x0000_0005));
        spi.add_data_pin(DATA, 1).unwrap();
        let result = spi.send();
        match result {
            Err(Error::Transfer(status)) => assert_eq!(status.raw(), 0x0000_0005),
            other => panic!("expected transfer error, got {:?}", other),
        }
        let cs = unsafe { spi.platform.register_ptr(CS).read_volatile() };
        assert_ne!(cs & RESET_BIT, 0);
    }

    #[test]
    fn coherent_exhaustion_fails_the_send() {
        let mut spi = engine(Terminal::Complete);
        spi.add_data_pin(DATA, 1).unwrap();
        spi.platform.alloc.fail = true;
        assert_eq!(spi.send(), Err(Error::CoherentAlloc));
    }
}
