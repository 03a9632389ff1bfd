//! AXI Quad SPI in standard mode, polled.
//!
//! The controller runs as master with manual slave select: select is asserted
//! for the whole frame, and the frame is pushed through the FIFO in blocks of
//! at most the FIFO depth.  The transmitter is held inhibited while a block
//! is queued, so a block goes out back to back.

use core::ptr;

use spiflash::Transport;
use storage::{Error, Result};

/// One controller instance in the design.
pub struct SpiConfig {
    pub device_id: u32,
    pub base: usize,
    pub fifo_depth: usize,
}

/// Controllers in the hardware design, by device id.
pub static CONFIGS: &[SpiConfig] = &[SpiConfig {
    device_id: 0,
    base: 0x44a0_0000,
    fifo_depth: 16,
}];

// Register offsets.
const DGIER: usize = 0x1c;
const SRR: usize = 0x40;
const SPICR: usize = 0x60;
const SPISR: usize = 0x64;
const DTR: usize = 0x68;
const DRR: usize = 0x6c;
const SPISSR: usize = 0x70;

const SRR_RESET: u32 = 0x0a;

const CR_SPE: u32 = 1 << 1;
const CR_MASTER: u32 = 1 << 2;
const CR_TXFIFO_RESET: u32 = 1 << 5;
const CR_RXFIFO_RESET: u32 = 1 << 6;
const CR_MANUAL_SS: u32 = 1 << 7;
const CR_INHIBIT: u32 = 1 << 8;

const SR_RX_EMPTY: u32 = 1 << 0;
const SR_TX_EMPTY: u32 = 1 << 2;

/// The flash hangs off the first select line.
const SELECT: u32 = !1;
const DESELECT: u32 = !0;

/// A block of 16 bytes takes a few hundred core cycles at the usual SPI clock.
const TX_POLLS: usize = 100_000;

pub struct AxiQspi {
    regs: Option<Regs>,
    fifo_depth: usize,
}

impl AxiQspi {
    pub const fn new() -> AxiQspi {
        AxiQspi {
            regs: None,
            fifo_depth: 1,
        }
    }

    fn block(regs: &Regs, tx: &[u8], mut rx: Option<&mut [u8]>) -> Result<()> {
        for &byte in tx {
            regs.write(DTR, byte as u32);
        }
        let cr = regs.read(SPICR);
        regs.write(SPICR, cr & !CR_INHIBIT);
        let mut polls = 0;
        while regs.read(SPISR) & SR_TX_EMPTY == 0 {
            polls += 1;
            if polls == TX_POLLS {
                regs.write(SPICR, cr);
                return Err(Error::Timeout);
            }
        }
        regs.write(SPICR, cr);

        // Every byte clocked out clocks one back in.
        for i in 0..tx.len() {
            if regs.read(SPISR) & SR_RX_EMPTY != 0 {
                return Err(Error::Transport);
            }
            let byte = regs.read(DRR) as u8;
            if let Some(rx) = rx.as_deref_mut() {
                rx[i] = byte;
            }
        }
        Ok(())
    }
}

impl Transport for AxiQspi {
    fn configure(&mut self, device_id: u32) -> Result<()> {
        let config = CONFIGS
            .iter()
            .find(|c| c.device_id == device_id)
            .ok_or(Error::DeviceNotFound)?;
        let regs = Regs { base: config.base };

        regs.write(SRR, SRR_RESET);
        regs.write(SPISSR, DESELECT);
        regs.write(
            SPICR,
            CR_SPE | CR_MASTER | CR_MANUAL_SS | CR_INHIBIT | CR_TXFIFO_RESET | CR_RXFIFO_RESET,
        );
        // Polled mode.
        regs.write(DGIER, 0);

        self.regs = Some(regs);
        self.fifo_depth = config.fifo_depth;
        Ok(())
    }

    fn transfer(&mut self, tx: &[u8], mut rx: Option<&mut [u8]>) -> Result<()> {
        let regs = self.regs.as_ref().ok_or(Error::Transport)?;
        if let Some(rx) = rx.as_deref() {
            if rx.len() != tx.len() {
                return Err(Error::Transport);
            }
        }

        regs.write(SPISSR, SELECT);
        let mut res = Ok(());
        for (n, block) in tx.chunks(self.fifo_depth).enumerate() {
            let start = n * self.fifo_depth;
            let rx_block = rx
                .as_deref_mut()
                .map(|rx| &mut rx[start..start + block.len()]);
            res = Self::block(regs, block, rx_block);
            if res.is_err() {
                break;
            }
        }
        regs.write(SPISSR, DESELECT);
        res
    }
}

struct Regs {
    base: usize,
}

impl Regs {
    fn read(&self, offset: usize) -> u32 {
        unsafe { ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&self, offset: usize, value: u32) {
        unsafe { ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}
