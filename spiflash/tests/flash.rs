// Driver against the simulated devices.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use simflash::{styles, Op, SimSpiFlash, SIM_DEVICE_ID};
use spiflash::{SpiFlash, CAPACITY, SECTOR_SIZE};
use storage::{Error, Flash};

fn flash() -> SpiFlash<SimSpiFlash> {
    SpiFlash::init(styles::N25Q128A.build().unwrap(), SIM_DEVICE_ID).unwrap()
}

fn random(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    data
}

fn erases(ops: &[Op]) -> Vec<u8> {
    ops.iter()
        .filter_map(|op| match *op {
            Op::Erase { sector } => Some(sector),
            _ => None,
        })
        .collect()
}

#[test]
fn read_back_every_device() {
    for dev in styles::all_devices() {
        let (style, sim) = dev.unwrap();
        let mut flash = SpiFlash::init(sim, SIM_DEVICE_ID).unwrap();
        assert_eq!(flash.read_id().unwrap(), style.jedec_id, "{}", style.name);

        // Starts part way into sector 3 and ends in sector 5.
        let addr = 0x3_ff7b;
        let data = random(0x1_2345, style.jedec_id as u64);
        flash.write(addr, &data).unwrap();

        let mut buf = vec![0u8; data.len()];
        flash.read(addr, &mut buf).unwrap();
        assert!(buf == data, "{}: data mismatch", style.name);
        assert_eq!(erases(flash.transport().ops()), [4, 5], "{}", style.name);
    }
}

#[test]
fn erase_leads_the_sector() {
    let mut flash = flash();
    let data = random(600, 1);
    flash.write(SECTOR_SIZE, &data).unwrap();

    let ops = flash.transport().ops();
    let first_erase = ops.iter().position(|op| matches!(op, Op::Erase { .. }));
    let first_program = ops.iter().position(|op| matches!(op, Op::Program { .. }));
    assert!(first_erase.unwrap() < first_program.unwrap());
    assert_eq!(erases(ops), [1]);

    let programs: Vec<_> = ops
        .iter()
        .filter_map(|op| match *op {
            Op::Program { addr, len } => Some((addr, len)),
            _ => None,
        })
        .collect();
    assert_eq!(
        programs,
        [(0x10000, 256), (0x10100, 256), (0x10200, 88)]
    );
}

#[test]
fn write_erases_whole_sectors() {
    let mut sim = styles::S25FL128S.build().unwrap();
    sim.install(&[0u8; 2 * SECTOR_SIZE], SECTOR_SIZE).unwrap();
    let mut flash = SpiFlash::init(sim, SIM_DEVICE_ID).unwrap();

    let addr = SECTOR_SIZE - 0x10;
    let data = random(0x1_8000, 2);
    flash.write(addr, &data).unwrap();

    let sim = flash.release();
    assert_eq!(erases(sim.ops()), [1, 2]);
    assert_eq!(&sim.contents()[addr..addr + data.len()], &data[..]);
    // Past the end of the data, sector 2 is left erased.
    let end = addr + data.len();
    assert!(sim.contents()[end..3 * SECTOR_SIZE].iter().all(|b| *b == 0xff));
}

#[test]
fn nor_flash_programs_without_erase() {
    let mut flash = flash();
    NorFlash::erase(&mut flash, 0x2_0000, 0x4_0000).unwrap();
    flash.transport_mut().clear_ops();

    NorFlash::write(&mut flash, 0x2_0010, &[0xf0; 300]).unwrap();
    NorFlash::write(&mut flash, 0x2_0010, &[0x3c; 300]).unwrap();
    assert!(erases(flash.transport().ops()).is_empty());

    let mut buf = [0u8; 302];
    ReadNorFlash::read(&mut flash, 0x2_000f, &mut buf).unwrap();
    assert_eq!(buf[0], 0xff);
    assert!(buf[1..301].iter().all(|b| *b == 0x30));
    assert_eq!(buf[301], 0xff);
    assert_eq!(ReadNorFlash::capacity(&flash), CAPACITY);
}

#[test]
fn storage_erase_range() {
    let mut flash = flash();
    Flash::erase(&mut flash, 3 * SECTOR_SIZE, 6 * SECTOR_SIZE).unwrap();
    assert_eq!(erases(flash.transport().ops()), [3, 4, 5]);

    flash.transport_mut().clear_ops();
    assert_eq!(
        Flash::erase(&mut flash, 0x100, SECTOR_SIZE),
        Err(Error::NotAligned)
    );
    assert!(flash.transport().ops().is_empty());
}

#[test]
fn out_of_range() {
    let mut flash = flash();
    let mut buf = [0u8; 16];
    assert_eq!(flash.read(CAPACITY - 8, &mut buf), Err(Error::OutOfBounds));
    assert_eq!(flash.write(CAPACITY - 8, &buf), Err(Error::OutOfBounds));
    assert!(flash.transport().ops().is_empty());

    flash.read(CAPACITY - 16, &mut buf).unwrap();
    assert_eq!(buf, [0xff; 16]);
}

#[test]
fn failure_surfaces() {
    let mut sim = styles::W25Q128JV.build().unwrap();
    sim.fail_after(0);
    let mut flash = SpiFlash::init(sim, SIM_DEVICE_ID).unwrap();
    assert_eq!(flash.read_id(), Err(Error::Transport));
    assert_eq!(flash.write(0, &[1, 2, 3]), Err(Error::Transport));
}
