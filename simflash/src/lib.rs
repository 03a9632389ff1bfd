//! Simulated SPI flash
//!
//! Serial NOR parts are all driven through much the same small command set,
//! but differ in how long they stay busy and in how forgiving they are about
//! protocol mistakes.  The simulator sits where the SPI controller would, and
//! decodes each frame as the device would see it.  It is deliberately strict:
//! a real part silently ignores a page program without write enable, or wraps
//! a program that runs past the end of a page; here those panic, so driver
//! bugs show up in tests instead of as corrupt data.
//!
//! Memory follows NOR rules.  Erase sets a whole 64 KiB sector to 0xff, and
//! programming can only clear bits.  After each program or erase the device
//! reports busy for a configurable number of status polls.
//!
//! Every decoded command is recorded, so tests can check the sequence of
//! operations the driver produced.

pub mod gen;
pub mod styles;

use anyhow::{bail, Result};
use spiflash::command::{self, Command, HEADER, STATUS_BUSY, STATUS_WEL};
use spiflash::{Transport, PAGE_SIZE, SECTOR_SIZE};

/// The transport configuration id every simulated device answers to.
pub const SIM_DEVICE_ID: u32 = 0;

/// A decoded command.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Op {
    Read { addr: usize, len: usize },
    Program { addr: usize, len: usize },
    Erase { sector: u8 },
    Status,
    WriteEnable,
    ReadId,
}

pub struct SimSpiFlash {
    jedec_id: u32,
    data: Vec<u8>,
    busy_polls: usize,
    busy: usize,
    write_enabled: bool,
    configured: bool,
    refuse_config: bool,
    fail_after: Option<usize>,
    ops: Vec<Op>,
}

impl SimSpiFlash {
    pub fn new(jedec_id: u32, sectors: usize, busy_polls: usize) -> Result<SimSpiFlash> {
        // The sector index has to fit the single erase address byte.
        if sectors == 0 || sectors > 256 {
            bail!("unsupported sector count: {}", sectors);
        }
        Ok(SimSpiFlash {
            jedec_id,
            data: vec![0xff; sectors * SECTOR_SIZE],
            busy_polls,
            busy: 0,
            write_enabled: false,
            configured: false,
            refuse_config: false,
            fail_after: None,
            ops: Vec::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Place `data` in the array directly, as a programmer would have.
    pub fn install(&mut self, data: &[u8], offset: usize) -> Result<()> {
        let end = match offset.checked_add(data.len()) {
            Some(end) if end <= self.data.len() => end,
            _ => bail!("image of {} bytes does not fit at 0x{:x}", data.len(), offset),
        };
        self.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Let `transfers` more exchanges through, then fail every one after.
    pub fn fail_after(&mut self, transfers: usize) {
        self.fail_after = Some(transfers);
    }

    /// Make `configure` fail as if the controller rejected its settings.
    pub fn refuse_config(&mut self) {
        self.refuse_config = true;
    }

    fn check_range(&self, addr: usize, len: usize) {
        if addr + len > self.data.len() {
            panic!("access 0x{:x}+0x{:x} past end of device", addr, len);
        }
    }

    fn status(&mut self) -> u8 {
        let mut status = 0;
        if self.busy > 0 {
            self.busy -= 1;
            status |= STATUS_BUSY;
        }
        if self.write_enabled {
            status |= STATUS_WEL;
        }
        status
    }
}

impl Transport for SimSpiFlash {
    fn configure(&mut self, device_id: u32) -> storage::Result<()> {
        if device_id != SIM_DEVICE_ID {
            return Err(storage::Error::DeviceNotFound);
        }
        if self.refuse_config {
            return Err(storage::Error::Transport);
        }
        self.configured = true;
        Ok(())
    }

    fn transfer(&mut self, tx: &[u8], rx: Option<&mut [u8]>) -> storage::Result<()> {
        assert!(self.configured, "transfer on an unconfigured transport");
        if let Some(left) = self.fail_after {
            if left == 0 {
                return Err(storage::Error::Transport);
            }
            self.fail_after = Some(left - 1);
        }

        let cmd = match Command::from_u8(tx[0]) {
            Some(cmd) => cmd,
            None => panic!("unknown opcode 0x{:02x}", tx[0]),
        };
        if self.busy > 0 && cmd != Command::ReadStatus {
            panic!("{:?} issued while busy", cmd);
        }

        // What the device drives back, byte for byte with the request.
        let mut reply = vec![0xff; tx.len()];
        match cmd {
            Command::ReadStatus => {
                assert!(tx.len() >= 2, "status read without a response byte");
                let status = self.status();
                reply[1..].fill(status);
                self.ops.push(Op::Status);
            }
            Command::WriteEnable => {
                self.write_enabled = true;
                self.ops.push(Op::WriteEnable);
            }
            Command::ReadId => {
                assert!(tx.len() >= 4, "short id read");
                reply[1..4].copy_from_slice(&self.jedec_id.to_be_bytes()[1..]);
                self.ops.push(Op::ReadId);
            }
            Command::Read => {
                assert!(tx.len() >= HEADER, "short read header");
                let addr = command::address(tx);
                let len = tx.len() - HEADER;
                self.check_range(addr, len);
                reply[HEADER..].copy_from_slice(&self.data[addr..addr + len]);
                self.ops.push(Op::Read { addr, len });
            }
            Command::PageProgram => {
                assert!(self.write_enabled, "page program without write enable");
                assert!(tx.len() > HEADER, "page program without data");
                let addr = command::address(tx);
                let len = tx.len() - HEADER;
                assert!(
                    addr % PAGE_SIZE + len <= PAGE_SIZE,
                    "page program at 0x{:x}+0x{:x} crosses a page",
                    addr,
                    len
                );
                self.check_range(addr, len);
                for (cell, byte) in self.data[addr..addr + len].iter_mut().zip(&tx[HEADER..]) {
                    *cell &= *byte;
                }
                self.write_enabled = false;
                self.busy = self.busy_polls;
                self.ops.push(Op::Program { addr, len });
            }
            Command::SectorErase => {
                assert!(self.write_enabled, "sector erase without write enable");
                assert_eq!(tx.len(), 4, "sector erase frame");
                let sector = tx[1];
                let base = sector as usize * SECTOR_SIZE;
                self.check_range(base, SECTOR_SIZE);
                self.data[base..base + SECTOR_SIZE].fill(0xff);
                self.write_enabled = false;
                self.busy = self.busy_polls;
                self.ops.push(Op::Erase { sector });
            }
        }

        if let Some(rx) = rx {
            assert_eq!(rx.len(), tx.len(), "rx and tx lengths differ");
            rx.copy_from_slice(&reply);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> SimSpiFlash {
        let mut sim = SimSpiFlash::new(0x012018, 4, 2).unwrap();
        sim.configure(SIM_DEVICE_ID).unwrap();
        sim
    }

    #[test]
    fn rejects_sector_counts() {
        assert!(SimSpiFlash::new(0, 0, 0).is_err());
        assert!(SimSpiFlash::new(0, 257, 0).is_err());
    }

    #[test]
    fn configure_by_id() {
        let mut sim = SimSpiFlash::new(0, 1, 0).unwrap();
        assert_eq!(sim.configure(5), Err(storage::Error::DeviceNotFound));
        sim.refuse_config();
        assert_eq!(sim.configure(SIM_DEVICE_ID), Err(storage::Error::Transport));
    }

    #[test]
    fn program_clears_bits() {
        let mut sim = device();
        sim.transfer(&[0x06], None).unwrap();
        sim.transfer(&[0x02, 0, 0, 0x10, 0xf0, 0x0f], None).unwrap();
        assert_eq!(&sim.contents()[0x10..0x12], &[0xf0, 0x0f]);

        // Busy for two polls, write enable gone.
        let mut rx = [0u8; 2];
        sim.transfer(&[0x05, 0], Some(&mut rx)).unwrap();
        assert_eq!(rx[1], STATUS_BUSY);
        sim.transfer(&[0x05, 0], Some(&mut rx)).unwrap();
        sim.transfer(&[0x05, 0], Some(&mut rx)).unwrap();
        assert_eq!(rx[1], 0);

        sim.transfer(&[0x06], None).unwrap();
        sim.transfer(&[0x02, 0, 0, 0x10, 0x3c, 0x3c], None).unwrap();
        assert_eq!(&sim.contents()[0x10..0x12], &[0x30, 0x0c]);
    }

    #[test]
    fn erase_sets_sector() {
        let mut sim = device();
        sim.install(&[0u8; 16], SECTOR_SIZE - 8).unwrap();
        sim.transfer(&[0x06], None).unwrap();
        sim.transfer(&[0xd8, 1, 0, 0], None).unwrap();
        assert_eq!(&sim.contents()[SECTOR_SIZE - 8..SECTOR_SIZE], &[0u8; 8]);
        assert_eq!(&sim.contents()[SECTOR_SIZE..SECTOR_SIZE + 8], &[0xffu8; 8]);
        assert_eq!(sim.ops(), &[Op::WriteEnable, Op::Erase { sector: 1 }]);
    }

    #[test]
    fn read_skips_header() {
        let mut sim = device();
        sim.install(b"abcdef", 0x200).unwrap();
        let mut rx = [0u8; 7];
        sim.transfer(&[0x03, 0, 2, 1, 0, 0, 0], Some(&mut rx)).unwrap();
        assert_eq!(&rx[HEADER..], b"bcd");
        assert_eq!(sim.ops(), &[Op::Read { addr: 0x201, len: 3 }]);
    }

    #[test]
    fn jedec_id() {
        let mut sim = device();
        let mut rx = [0u8; 4];
        sim.transfer(&[0x9f, 0, 0, 0], Some(&mut rx)).unwrap();
        assert_eq!(&rx[1..], &[0x01, 0x20, 0x18]);
    }

    #[test]
    fn injected_failure() {
        let mut sim = device();
        sim.fail_after(1);
        assert!(sim.transfer(&[0x06], None).is_ok());
        assert_eq!(sim.transfer(&[0x06], None), Err(storage::Error::Transport));
    }

    #[test]
    #[should_panic(expected = "without write enable")]
    fn program_needs_write_enable() {
        let mut sim = device();
        let _ = sim.transfer(&[0x02, 0, 0, 0, 1], None);
    }

    #[test]
    #[should_panic(expected = "crosses a page")]
    fn program_within_page() {
        let mut sim = device();
        let _ = sim.transfer(&[0x06], None);
        let _ = sim.transfer(&[0x02, 0, 0, 0xff, 1, 2], None);
    }

    #[test]
    #[should_panic(expected = "while busy")]
    fn busy_device() {
        let mut sim = device();
        let _ = sim.transfer(&[0x06], None);
        let _ = sim.transfer(&[0xd8, 0, 0, 0], None);
        let mut rx = [0u8; 4];
        let _ = sim.transfer(&[0x9f, 0, 0, 0], Some(&mut rx));
    }
}
