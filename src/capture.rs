use crate::bcd;
use crate::lines::{DigitalLines, Line, LineError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

/// Status bits attached to a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SampleFlags(u8);

impl SampleFlags {
    /// The measured value exceeds the selected range.
    pub const OVERLOAD: Self = Self(1 << 0);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub const fn is_overload(self) -> bool {
        self.contains(Self::OVERLOAD)
    }
}

/// One reading as presented on the connector, before any unit handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSample {
    /// Decoded digits with polarity applied.
    pub value: i32,
    /// Absolute power-of-ten range selector.
    pub range: u8,
    /// Decimal point selector, 0..=3.
    pub sensitivity: u8,
    pub flags: SampleFlags,
}

impl RawSample {
    pub fn is_overload(&self) -> bool {
        self.flags.is_overload()
    }
}

/// Read one coherent sample from the connector.
///
/// Fails if any of the lines involved cannot be read; the caller decides
/// whether that is worth reporting.
pub fn capture<L: DigitalLines + ?Sized>(lines: &L) -> Result<RawSample, LineError> {
    let data = bcd::decode(lines, &Line::data_lines())?;
    let range = bcd::decode(lines, &Line::range_lines())?;
    let sensitivity = bcd::decode(lines, &Line::sensitivity_lines())?;

    // 13 data lines hold at most 1999
    let mut value = i32::try_from(data).unwrap_or(i32::MAX);
    if lines.read(Line::Polarity)? {
        value = -value;
    }

    let mut flags = SampleFlags::empty();
    if lines.read(Line::Overload)? {
        flags.insert(SampleFlags::OVERLOAD);
    }

    Ok(RawSample {
        value,
        range: u8::try_from(range).unwrap_or(u8::MAX),
        sensitivity: u8::try_from(sensitivity).unwrap_or(u8::MAX),
        flags,
    })
}

struct Slot {
    sample: RawSample,
    sequence: u64,
}

struct Shared {
    slot: Mutex<Slot>,
    arrived: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a single-slot sample channel. Sending overwrites whatever was in
/// the slot; receivers always see the most recent complete sample.
pub fn sample_channel() -> (SampleSender, SampleReceiver) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            sample: RawSample::default(),
            sequence: 0,
        }),
        arrived: Condvar::new(),
    });
    (
        SampleSender {
            shared: Arc::clone(&shared),
        },
        SampleReceiver { shared },
    )
}

#[derive(Clone)]
pub struct SampleSender {
    shared: Arc<Shared>,
}

impl SampleSender {
    pub fn send(&self, sample: RawSample) {
        {
            let mut slot = self.shared.lock();
            slot.sample = sample;
            slot.sequence += 1;
        }
        self.shared.arrived.notify_all();
    }
}

#[derive(Clone)]
pub struct SampleReceiver {
    shared: Arc<Shared>,
}

impl SampleReceiver {
    /// Most recent sample and its sequence number (0 before the first capture).
    pub fn latest(&self) -> (RawSample, u64) {
        let slot = self.shared.lock();
        (slot.sample, slot.sequence)
    }

    pub fn sequence(&self) -> u64 {
        self.shared.lock().sequence
    }

    /// Block until a sample newer than `sequence` arrives, or `timeout` passes.
    pub fn wait_newer(&self, sequence: u64, timeout: Duration) -> Option<(RawSample, u64)> {
        let slot = self.shared.lock();
        let (slot, result) = self
            .shared
            .arrived
            .wait_timeout_while(slot, timeout, |slot| slot.sequence <= sequence)
            .unwrap_or_else(PoisonError::into_inner);

        if result.timed_out() && slot.sequence <= sequence {
            None
        } else {
            Some((slot.sample, slot.sequence))
        }
    }
}

/// Build the print strobe handler: capture a sample and publish it, dropping
/// it silently when the lines could not be read.
///
/// The handler only keeps a weak reference, since the line bank usually owns it.
pub fn strobe_handler<L: DigitalLines + ?Sized + 'static>(
    lines: &Arc<L>,
    sender: SampleSender,
) -> impl Fn() + Send + Sync {
    let lines: Weak<L> = Arc::downgrade(lines);
    move || {
        let Some(lines) = lines.upgrade() else {
            return;
        };
        match capture(&*lines) {
            Ok(sample) => {
                log::trace!("Captured {:?}", sample);
                sender.send(sample);
            }
            Err(e) => log::trace!("Dropping glitched sample: {}", e),
        }
    }
}
