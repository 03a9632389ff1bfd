//! SPI NOR flash driver
//!
//! The flash sits behind a SPI controller that we only ever drive in polled
//! mode: one synchronous exchange per command, chip select held for the whole
//! frame.  The controller itself is a [`Transport`]; the driver builds command
//! frames, splits transfers at page boundaries, erases sectors ahead of writes
//! and polls the status register until the device is idle.
//!
//! The device uses 24-bit addresses, 256 byte pages and 64 KiB sectors.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub mod command;

use embedded_storage::nor_flash::{ErrorType, NorFlash, ReadNorFlash};
use storage::{Error, Flash, Geometry, ReadFlash, Result};

use command::{Command, ERASE_FRAME, HEADER, ID_FRAME, STATUS_BUSY, STATUS_FRAME};

pub const PAGE_SIZE: usize = 256;
pub const SECTOR_SIZE: usize = 64 * 1024;
pub const GEOMETRY: Geometry = Geometry::new(PAGE_SIZE, SECTOR_SIZE);

/// 24 bits of address.
pub const CAPACITY: usize = 1 << 24;

/// Largest frame: a page of data behind the command header.
const FRAME: usize = PAGE_SIZE + HEADER;

/// The SPI controller, as seen by the driver.
pub trait Transport {
    /// Locate the controller configuration for `device_id` and set it up for
    /// polled master operation with the flash selected.  Fails with
    /// `DeviceNotFound` when there is no such configuration, and `Transport`
    /// when the controller refuses it.
    fn configure(&mut self, device_id: u32) -> Result<()>;

    /// One full-duplex exchange.  When `rx` is given it has the same length as
    /// `tx` and receives every byte clocked in.
    fn transfer(&mut self, tx: &[u8], rx: Option<&mut [u8]>) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn configure(&mut self, device_id: u32) -> Result<()> {
        (**self).configure(device_id)
    }

    fn transfer(&mut self, tx: &[u8], rx: Option<&mut [u8]>) -> Result<()> {
        (**self).transfer(tx, rx)
    }
}

/// The transfer buffers.  Every command is built in `tx` and answered in
/// `rx`; neither survives past the next command.
struct Scratch {
    tx: [u8; FRAME],
    rx: [u8; FRAME],
}

impl Scratch {
    const fn new() -> Scratch {
        Scratch {
            tx: [0; FRAME],
            rx: [0; FRAME],
        }
    }

    fn header(&mut self, cmd: Command, addr: usize) {
        self.tx[..HEADER].copy_from_slice(&command::header(cmd, addr));
    }
}

/// A serial NOR device on a transport.
///
/// The driver owns its scratch buffers, and every operation needs `&mut self`,
/// so there is never more than one transaction in flight.
pub struct SpiFlash<T> {
    transport: T,
    scratch: Scratch,
}

impl<T: Transport> SpiFlash<T> {
    /// Configure the transport for `device_id` and wrap it.
    pub fn init(mut transport: T, device_id: u32) -> Result<SpiFlash<T>> {
        transport.configure(device_id)?;
        Ok(SpiFlash {
            transport,
            scratch: Scratch::new(),
        })
    }

    /// Give back the transport.
    pub fn release(self) -> T {
        self.transport
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Read `buf.len()` bytes starting at `addr`.  Each page-bounded piece is
    /// its own read command, issued in address order.  On error, whatever
    /// landed in `buf` before the failing piece stays there.
    pub fn read(&mut self, addr: usize, buf: &mut [u8]) -> Result<()> {
        storage::check_read(self, addr, buf.len())?;
        for chunk in GEOMETRY.chunks(addr, buf.len()) {
            let data = self.read_page(chunk.addr, chunk.len)?;
            buf[chunk.span()].copy_from_slice(data);
        }
        Ok(())
    }

    fn read_page(&mut self, addr: usize, len: usize) -> Result<&[u8]> {
        self.wait_until_ready()?;
        let frame = HEADER + len;
        self.scratch.header(Command::Read, addr);
        self.scratch.tx[HEADER..frame].fill(0);
        self.transport.transfer(
            &self.scratch.tx[..frame],
            Some(&mut self.scratch.rx[..frame]),
        )?;
        Ok(&self.scratch.rx[HEADER..frame])
    }

    /// Write `data` at `addr`, erasing each sector as the write reaches its
    /// first byte.  A write that starts part way into a sector leaves the
    /// rest of that sector alone, so the bytes it covers must already be
    /// erased.  Returns once the device is idle again.
    pub fn write(&mut self, addr: usize, data: &[u8]) -> Result<()> {
        storage::check_write(self, addr, data.len())?;
        for chunk in GEOMETRY.chunks(addr, data.len()) {
            if GEOMETRY.is_sector_start(chunk.addr) {
                self.erase_sector(GEOMETRY.sector_index(chunk.addr) as u8)?;
            }
            self.program_page(chunk.addr, &data[chunk.span()])?;
        }
        Ok(())
    }

    /// Program `data` at `addr` without erasing anything.
    pub fn program(&mut self, addr: usize, data: &[u8]) -> Result<()> {
        storage::check_write(self, addr, data.len())?;
        for chunk in GEOMETRY.chunks(addr, data.len()) {
            self.program_page(chunk.addr, &data[chunk.span()])?;
        }
        Ok(())
    }

    fn program_page(&mut self, addr: usize, data: &[u8]) -> Result<()> {
        self.wait_until_ready()?;
        self.write_enable()?;
        let frame = HEADER + data.len();
        self.scratch.header(Command::PageProgram, addr);
        self.scratch.tx[HEADER..frame].copy_from_slice(data);
        self.transport.transfer(&self.scratch.tx[..frame], None)?;
        self.wait_until_ready()
    }

    /// Erase one 64 KiB sector.  The index is the only address byte sent.
    pub fn erase_sector(&mut self, sector: u8) -> Result<()> {
        self.write_enable()?;
        self.scratch.tx[..ERASE_FRAME]
            .copy_from_slice(&[Command::SectorErase as u8, sector, 0, 0]);
        self.transport.transfer(&self.scratch.tx[..ERASE_FRAME], None)?;
        self.wait_until_ready()
    }

    fn write_enable(&mut self) -> Result<()> {
        self.scratch.tx[0] = Command::WriteEnable as u8;
        self.transport.transfer(&self.scratch.tx[..1], None)
    }

    /// Read the first status register.
    pub fn status(&mut self) -> Result<u8> {
        self.scratch.tx[..STATUS_FRAME].copy_from_slice(&[Command::ReadStatus as u8, 0]);
        self.transport.transfer(
            &self.scratch.tx[..STATUS_FRAME],
            Some(&mut self.scratch.rx[..STATUS_FRAME]),
        )?;
        Ok(self.scratch.rx[1])
    }

    /// Poll the status register until the busy bit clears.
    ///
    /// There is no bound on this.  A device that never finishes keeps the
    /// caller here forever; use [`SpiFlash::wait_until_ready_bounded`] when
    /// that is not acceptable.
    pub fn wait_until_ready(&mut self) -> Result<()> {
        while self.status()? & STATUS_BUSY != 0 {
            core::hint::spin_loop();
        }
        Ok(())
    }

    /// Like `wait_until_ready`, but give up with `Timeout` after `polls`
    /// status reads that all came back busy.  The status is always read at
    /// least once, so an idle device is ready even with `polls` of zero.
    pub fn wait_until_ready_bounded(&mut self, polls: usize) -> Result<()> {
        for _ in 0..polls.max(1) {
            if self.status()? & STATUS_BUSY == 0 {
                return Ok(());
            }
        }
        Err(Error::Timeout)
    }

    /// The JEDEC identifier: manufacturer, memory type, capacity.
    pub fn read_id(&mut self) -> Result<u32> {
        self.scratch.tx[..ID_FRAME].copy_from_slice(&[Command::ReadId as u8, 0, 0, 0]);
        self.transport.transfer(
            &self.scratch.tx[..ID_FRAME],
            Some(&mut self.scratch.rx[..ID_FRAME]),
        )?;
        let rx = &self.scratch.rx;
        Ok(u32::from_be_bytes([0, rx[1], rx[2], rx[3]]))
    }
}

impl<T: Transport> ReadFlash for SpiFlash<T> {
    fn read_size(&self) -> usize {
        1
    }

    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> Result<()> {
        SpiFlash::read(self, offset, bytes)
    }

    fn capacity(&self) -> usize {
        CAPACITY
    }
}

impl<T: Transport> Flash for SpiFlash<T> {
    fn write_size(&self) -> usize {
        1
    }

    fn erase_size(&self) -> usize {
        SECTOR_SIZE
    }

    fn erase(&mut self, from: usize, to: usize) -> Result<()> {
        storage::check_erase(self, from, to)?;
        for sector in GEOMETRY.sector_index(from)..GEOMETRY.sector_index(to) {
            self.erase_sector(sector as u8)?;
        }
        Ok(())
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        SpiFlash::write(self, offset, bytes)
    }
}

impl<T: Transport> ErrorType for SpiFlash<T> {
    type Error = Error;
}

impl<T: Transport> ReadNorFlash for SpiFlash<T> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<()> {
        SpiFlash::read(self, offset as usize, bytes)
    }

    fn capacity(&self) -> usize {
        CAPACITY
    }
}

/// embedded-storage writes never erase, so this one only programs.
impl<T: Transport> NorFlash for SpiFlash<T> {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<()> {
        Flash::erase(self, from as usize, to as usize)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
        self.program(offset as usize, bytes)
    }
}
