//! BCM2835 DMA channel registers
//!
//! One `RegisterBlock` per channel, at `controller + 0x100 * index`. The
//! TI/SOURCE_AD/DEST_AD/TXFR_LEN/STRIDE/NEXTCONBK registers are read-only
//! mirrors of the control block the engine loaded; software drives a run
//! entirely through CS and CONBLK_AD.

#![allow(non_snake_case, non_upper_case_globals)]

use ral_registers::{RORegister, RWRegister};

/// Registers for one DMA channel.
#[repr(C)]
pub struct RegisterBlock {
    /// Control and status.
    pub CS: RWRegister<u32>,
    /// Bus address of the control block to load.
    pub CONBLK_AD: RWRegister<u32>,
    /// Transfer information of the loaded control block.
    pub TI: RORegister<u32>,
    /// Source bus address of the loaded control block.
    pub SOURCE_AD: RORegister<u32>,
    /// Destination bus address of the loaded control block.
    pub DEST_AD: RORegister<u32>,
    /// Transfer length of the loaded control block.
    pub TXFR_LEN: RORegister<u32>,
    /// 2D stride of the loaded control block.
    pub STRIDE: RORegister<u32>,
    /// Bus address of the next control block.
    pub NEXTCONBK: RORegister<u32>,
    /// Debug and error state.
    pub DEBUG: RWRegister<u32>,
}

/// Control and status register fields.
pub mod CS {
    /// Activate the channel. Cleared by hardware when the chain ends.
    pub mod ACTIVE {
        pub const offset: u32 = 0;
        pub const mask: u32 = 0x01 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// Transfer ended. Sticky; write 1 to clear.
    pub mod END {
        pub const offset: u32 = 1;
        pub const mask: u32 = 0x01 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// Interrupt status. Write 1 to clear.
    pub mod INT {
        pub const offset: u32 = 2;
        pub const mask: u32 = 0x01 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// State of the selected DREQ signal.
    pub mod DREQ {
        pub const offset: u32 = 3;
        pub const mask: u32 = 0x01 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// Channel is paused.
    pub mod PAUSED {
        pub const offset: u32 = 4;
        pub const mask: u32 = 0x01 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// Channel is paused because DREQ is inactive.
    pub mod DREQ_STOPS_DMA {
        pub const offset: u32 = 5;
        pub const mask: u32 = 0x01 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// Channel is waiting for its last write to land.
    pub mod WAITING_FOR_OUTSTANDING_WRITES {
        pub const offset: u32 = 6;
        pub const mask: u32 = 0x01 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// The channel observed an error; details in DEBUG.
    pub mod ERROR {
        pub const offset: u32 = 8;
        pub const mask: u32 = 0x01 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// AXI priority of this channel's normal transactions.
    pub mod PRIORITY {
        pub const offset: u32 = 16;
        pub const mask: u32 = 0x0F << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// AXI priority once the panic threshold is crossed.
    pub mod PANIC_PRIORITY {
        pub const offset: u32 = 20;
        pub const mask: u32 = 0x0F << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// Wait for outstanding writes before signaling completion.
    pub mod WAIT_FOR_OUTSTANDING_WRITES {
        pub const offset: u32 = 28;
        pub const mask: u32 = 0x01 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// Keep running while the debug pause signal is asserted.
    pub mod DISDEBUG {
        pub const offset: u32 = 29;
        pub const mask: u32 = 0x01 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// Abort the current control block and load the next.
    pub mod ABORT {
        pub const offset: u32 = 30;
        pub const mask: u32 = 0x01 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
    /// Reset the channel. Self-clearing.
    pub mod RESET {
        pub const offset: u32 = 31;
        pub const mask: u32 = 0x01 << offset;
        pub mod R {}
        pub mod W {}
        pub mod RW {}
    }
}
