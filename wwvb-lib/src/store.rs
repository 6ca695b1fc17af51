//! Clock store.
//!
//! The store owns the calendar time that survives power cycles: a
//! temperature-compensated RTC chip with battery-backed NVRAM, reached over
//! I2C. Callers never touch the bus; they wait for the command mailbox to
//! show [`Command::Read`], take the lock, mutate the shared fields, and set
//! a new command. A dedicated worker services the mailbox, refreshing the
//! fields from the chip at steady state and returning the mailbox to `Read`
//! when a command completes.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    calendar::CalendarTime,
    decode::{bcd2int, int2bcd, DstState},
    dst, Error, Result,
};

/// Mailbox command for the store worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Steady state: the worker refreshes the calendar fields from the chip.
    Read,
    /// Push the shared calendar fields to the chip.
    WriteDateTime,
    /// Align the chip's second counter to the given value.
    SyncSeconds(u8),
}

/// NVRAM layout: byte 0 holds the DST state, bytes 1-4 the GMT offset as a
/// little-endian signed 32-bit hour count.
const NVRAM_DST: u8 = 0;
const NVRAM_GMT: u8 = 1;

/// Abstract RTC with battery-backed NVRAM.
///
/// Implementations own the I2C transport; the engine only sees calendar
/// fields, the second counter, an oscillator-fault flag, and raw NVRAM
/// bytes.
pub trait RtcChip: Send {
    /// Probe and prepare the chip. False when nothing answers on the bus.
    fn detect(&mut self) -> bool;

    fn read_datetime(&mut self) -> Result<CalendarTime>;

    fn write_datetime(&mut self, time: &CalendarTime) -> Result<()>;

    /// Set only the second counter, leaving the other fields running.
    fn set_seconds(&mut self, seconds: u8) -> Result<()>;

    /// Oscillator-stop flag: true when timekeeping cannot be trusted.
    fn oscillator_fault(&mut self) -> Result<bool>;

    /// Raw register write, used by diagnostics to force fault states.
    fn write_register(&mut self, register: u8, value: u8) -> Result<()>;

    fn read_nvram(&mut self, addr: u8) -> Result<u8>;

    fn write_nvram(&mut self, addr: u8, value: u8) -> Result<()>;
}

/// In-memory RTC with a DS3231-style BCD register map.
///
/// Stands in for the hardware chip in hosted runs and tests.
pub struct MemRtc {
    regs: [u8; 19],
    nvram: [u8; 56],
    present: bool,
}

impl MemRtc {
    const REG_SECONDS: usize = 0x00;
    const REG_MINUTES: usize = 0x01;
    const REG_HOURS: usize = 0x02;
    const REG_WEEKDAY: usize = 0x03;
    const REG_DAY: usize = 0x04;
    const REG_MONTH: usize = 0x05;
    const REG_YEAR: usize = 0x06;
    const REG_STATUS: usize = 0x0f;
    const OSF_BIT: u8 = 0x80;

    #[must_use]
    pub fn new() -> Self {
        MemRtc {
            regs: [0; 19],
            nvram: [0; 56],
            present: true,
        }
    }

    /// A chip that answers nothing, for exercising the absent-hardware path.
    #[must_use]
    pub fn absent() -> Self {
        MemRtc {
            present: false,
            ..MemRtc::new()
        }
    }
}

impl Default for MemRtc {
    fn default() -> Self {
        MemRtc::new()
    }
}

impl RtcChip for MemRtc {
    fn detect(&mut self) -> bool {
        self.present
    }

    fn read_datetime(&mut self) -> Result<CalendarTime> {
        Ok(CalendarTime {
            year: 2000 + u16::from(bcd2int(self.regs[Self::REG_YEAR])),
            month: bcd2int(self.regs[Self::REG_MONTH]),
            day: bcd2int(self.regs[Self::REG_DAY]),
            weekday: self.regs[Self::REG_WEEKDAY],
            hour: bcd2int(self.regs[Self::REG_HOURS]),
            minute: bcd2int(self.regs[Self::REG_MINUTES]),
            second: bcd2int(self.regs[Self::REG_SECONDS]),
        })
    }

    fn write_datetime(&mut self, time: &CalendarTime) -> Result<()> {
        self.regs[Self::REG_YEAR] = int2bcd((time.year % 100) as u8);
        self.regs[Self::REG_MONTH] = int2bcd(time.month);
        self.regs[Self::REG_DAY] = int2bcd(time.day);
        self.regs[Self::REG_WEEKDAY] = time.weekday;
        self.regs[Self::REG_HOURS] = int2bcd(time.hour);
        self.regs[Self::REG_MINUTES] = int2bcd(time.minute);
        self.regs[Self::REG_SECONDS] = int2bcd(time.second);
        // a full set clears the oscillator-stop flag
        self.regs[Self::REG_STATUS] &= !Self::OSF_BIT;
        Ok(())
    }

    fn set_seconds(&mut self, seconds: u8) -> Result<()> {
        self.regs[Self::REG_SECONDS] = int2bcd(seconds);
        Ok(())
    }

    fn oscillator_fault(&mut self) -> Result<bool> {
        Ok(self.regs[Self::REG_STATUS] & Self::OSF_BIT != 0)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        let register = usize::from(register);
        if register >= self.regs.len() {
            return Err(Error::Rtc(format!("no register {register:#x}")));
        }
        self.regs[register] = value;
        Ok(())
    }

    fn read_nvram(&mut self, addr: u8) -> Result<u8> {
        self.nvram
            .get(usize::from(addr))
            .copied()
            .ok_or_else(|| Error::Rtc(format!("nvram address {addr} out of range")))
    }

    fn write_nvram(&mut self, addr: u8, value: u8) -> Result<()> {
        match self.nvram.get_mut(usize::from(addr)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::Rtc(format!("nvram address {addr} out of range"))),
        }
    }
}

#[derive(Debug)]
struct Fields {
    time: CalendarTime,
    command: Command,
    clock_valid: bool,
}

/// Shared clock state plus the command mailbox and the chip it fronts.
///
/// Lock order is fields before chip; only the worker nests them.
pub struct ClockStore {
    fields: Mutex<Fields>,
    chip: Mutex<Box<dyn RtcChip>>,
    running: AtomicBool,
}

impl ClockStore {
    const POLL: Duration = Duration::from_millis(10);

    /// Create the store and verify the chip answers.
    ///
    /// The calendar fields start from whatever the chip kept across the
    /// power cycle, but `clock_valid` stays false until the first decoded
    /// minute is committed.
    ///
    /// # Errors
    /// [`Error::RtcAbsent`] when the chip does not respond.
    pub fn new(mut chip: Box<dyn RtcChip>) -> Result<Arc<Self>> {
        if !chip.detect() {
            return Err(Error::RtcAbsent);
        }
        if chip.oscillator_fault()? {
            warn!("RTC reports oscillator stop; stored time is stale");
        }
        let time = chip.read_datetime()?;

        Ok(Arc::new(ClockStore {
            fields: Mutex::new(Fields {
                time,
                command: Command::Read,
                clock_valid: false,
            }),
            chip: Mutex::new(chip),
            running: AtomicBool::new(false),
        }))
    }

    /// Start the store worker.
    ///
    /// # Errors
    /// [`Error::WorkerSpawn`] when the thread cannot be created.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        self.running.store(true, Ordering::SeqCst);
        let store = self.clone();
        thread::Builder::new()
            .name("clock-store".into())
            .spawn(move || store.run())
            .map_err(|source| Error::WorkerSpawn {
                name: "clock-store",
                source,
            })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn run(&self) {
        debug!("clock store worker running");
        while self.running.load(Ordering::SeqCst) {
            self.service_mailbox();
            thread::sleep(Self::POLL);
        }
        debug!("clock store worker stopped");
    }

    fn service_mailbox(&self) {
        let mut fields = self.fields.lock().expect("clock store poisoned");
        let mut chip = self.chip.lock().expect("rtc chip poisoned");
        match fields.command {
            Command::Read => match chip.read_datetime() {
                Ok(time) => fields.time = time,
                Err(err) => warn!("RTC read failed: {err}"),
            },
            Command::WriteDateTime => {
                if let Err(err) = chip.write_datetime(&fields.time) {
                    warn!("RTC write failed: {err}");
                }
                fields.command = Command::Read;
            }
            Command::SyncSeconds(seconds) => {
                if let Err(err) = chip.set_seconds(seconds) {
                    warn!("RTC seconds sync failed: {err}");
                }
                fields.command = Command::Read;
            }
        }
    }

    /// Block until the mailbox shows [`Command::Read`]. Returns false when
    /// the worker is not running to service it.
    pub fn wait_ready(&self) -> bool {
        loop {
            {
                let fields = self.fields.lock().expect("clock store poisoned");
                if fields.command == Command::Read {
                    return true;
                }
            }
            if !self.running.load(Ordering::SeqCst) {
                return false;
            }
            thread::sleep(Self::POLL);
        }
    }

    /// Snapshot of the calendar fields.
    #[must_use]
    pub fn now(&self) -> CalendarTime {
        self.fields.lock().expect("clock store poisoned").time
    }

    /// True once any decoded minute has been committed since boot.
    #[must_use]
    pub fn clock_valid(&self) -> bool {
        self.fields.lock().expect("clock store poisoned").clock_valid
    }

    /// Align the chip's second counter, e.g. at top-of-minute.
    ///
    /// # Errors
    /// [`Error::StoreStopped`] when no worker is servicing the mailbox.
    pub fn sync_seconds(&self, seconds: u8) -> Result<()> {
        if !self.wait_ready() {
            return Err(Error::StoreStopped);
        }
        let mut fields = self.fields.lock().expect("clock store poisoned");
        fields.command = Command::SyncSeconds(seconds);
        Ok(())
    }

    /// Commit a decoded minute: calendar fields, DST state to NVRAM, and a
    /// date-time write to the chip. Seconds are left to the resync path.
    ///
    /// # Errors
    /// [`Error::StoreStopped`] when no worker is servicing the mailbox;
    /// [`Error::Rtc`] when the NVRAM write fails.
    pub fn commit(&self, time: &CalendarTime, dst: DstState) -> Result<()> {
        self.set_dst_state(dst)?;
        if !self.wait_ready() {
            return Err(Error::StoreStopped);
        }

        let mut fields = self.fields.lock().expect("clock store poisoned");
        let second = fields.time.second;
        fields.time = CalendarTime { second, ..*time };
        fields.clock_valid = true;
        fields.command = Command::WriteDateTime;
        info!(
            year = time.year,
            month = time.month,
            day = time.day,
            hour = time.hour,
            minute = time.minute,
            "calendar committed"
        );
        Ok(())
    }

    pub fn set_dst_state(&self, state: DstState) -> Result<()> {
        let mut chip = self.chip.lock().expect("rtc chip poisoned");
        chip.write_nvram(NVRAM_DST, state.to_nvram())
    }

    pub fn dst_state(&self) -> Result<DstState> {
        let mut chip = self.chip.lock().expect("rtc chip poisoned");
        Ok(DstState::from_nvram(chip.read_nvram(NVRAM_DST)?))
    }

    pub fn set_gmt_hours(&self, hours: i8) -> Result<()> {
        let mut chip = self.chip.lock().expect("rtc chip poisoned");
        for (i, byte) in i32::from(hours).to_le_bytes().iter().enumerate() {
            chip.write_nvram(NVRAM_GMT + i as u8, *byte)?;
        }
        Ok(())
    }

    pub fn gmt_hours(&self) -> Result<i8> {
        let mut chip = self.chip.lock().expect("rtc chip poisoned");
        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = chip.read_nvram(NVRAM_GMT + i as u8)?;
        }
        Ok(i32::from_le_bytes(bytes) as i8)
    }

    /// Local civil time per the stored GMT offset and DST state.
    ///
    /// # Errors
    /// [`Error::Rtc`] when the NVRAM read fails.
    pub fn local_now(&self) -> Result<CalendarTime> {
        let state = self.dst_state()?;
        let hours = self.gmt_hours()?;
        Ok(dst::local_calendar(&self.now(), hours, state))
    }

    /// Raw chip register write, used by diagnostics to force fault states.
    ///
    /// # Errors
    /// [`Error::Rtc`] for unknown registers.
    pub fn write_register(&self, register: u8, value: u8) -> Result<()> {
        let mut chip = self.chip.lock().expect("rtc chip poisoned");
        chip.write_register(register, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_store() -> (Arc<ClockStore>, JoinHandle<()>) {
        let store = ClockStore::new(Box::new(MemRtc::new())).unwrap();
        let worker = store.start().unwrap();
        (store, worker)
    }

    #[test]
    fn absent_chip_is_fatal_at_init() {
        let zult = ClockStore::new(Box::new(MemRtc::absent()));
        assert!(matches!(zult, Err(Error::RtcAbsent)));
    }

    #[test]
    fn commit_round_trips_through_the_chip() {
        let (store, worker) = running_store();
        let time = CalendarTime {
            year: 2023,
            month: 6,
            day: 15,
            weekday: 4,
            hour: 23,
            minute: 59,
            second: 0,
        };

        assert!(!store.clock_valid());
        store.commit(&time, DstState::Enabled).unwrap();
        assert!(store.clock_valid());
        assert!(store.wait_ready(), "write command completes");

        // steady state re-reads the chip into the shared fields
        thread::sleep(Duration::from_millis(50));
        let now = store.now();
        assert_eq!((now.year, now.month, now.day), (2023, 6, 15));
        assert_eq!((now.hour, now.minute), (23, 59));
        assert_eq!(store.dst_state().unwrap(), DstState::Enabled);

        store.stop();
        worker.join().unwrap();
    }

    #[test]
    fn sync_seconds_updates_only_the_counter() {
        let (store, worker) = running_store();
        store.sync_seconds(2).unwrap();
        assert!(store.wait_ready());

        thread::sleep(Duration::from_millis(50));
        assert_eq!(store.now().second, 2);

        store.stop();
        worker.join().unwrap();
    }

    #[test]
    fn commands_fail_without_a_worker() {
        let store = ClockStore::new(Box::new(MemRtc::new())).unwrap();
        store.fields.lock().unwrap().command = Command::WriteDateTime;
        assert!(matches!(store.sync_seconds(1), Err(Error::StoreStopped)));
    }

    #[test]
    fn gmt_offset_round_trips_through_nvram() {
        let store = ClockStore::new(Box::new(MemRtc::new())).unwrap();
        for hours in -12..=14i8 {
            store.set_gmt_hours(hours).unwrap();
            assert_eq!(store.gmt_hours().unwrap(), hours);
        }
    }

    #[test]
    fn local_now_applies_offset_and_dst() {
        let (store, worker) = running_store();
        let time = CalendarTime {
            year: 2023,
            month: 6,
            day: 16,
            weekday: 5,
            hour: 2,
            minute: 30,
            second: 0,
        };
        store.commit(&time, DstState::Enabled).unwrap();
        store.set_gmt_hours(-7).unwrap();
        assert!(store.wait_ready());
        thread::sleep(Duration::from_millis(50));

        let local = store.local_now().unwrap();
        assert_eq!((local.month, local.day), (6, 15));
        assert_eq!((local.hour, local.minute), (20, 30));

        store.stop();
        worker.join().unwrap();
    }

    #[test]
    fn forced_oscillator_fault_reads_back() {
        let store = ClockStore::new(Box::new(MemRtc::new())).unwrap();
        store.write_register(0x0f, 0x80).unwrap();
        let mut chip = store.chip.lock().unwrap();
        assert!(chip.oscillator_fault().unwrap());
    }
}
