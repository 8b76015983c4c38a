use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of BCD lines carrying the reading (3.5 digits).
pub const DATA_LINES: u8 = 13;
/// Number of BCD lines carrying the range exponent.
pub const RANGE_LINES: u8 = 5;
/// Number of BCD lines carrying the sensitivity selector.
pub const SENSITIVITY_LINES: u8 = 2;

/// A signal on the electrometer's 50-pin connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    Polarity,
    Overload,
    Trigger,
    /// Print strobe, pulsed by the instrument once a reading is stable.
    Print,
    Hold(u8),
    Data(u8),
    Range(u8),
    Sensitivity(u8),
}

impl Line {
    pub fn data_lines() -> Vec<Self> {
        (0..DATA_LINES).map(Self::Data).collect()
    }

    pub fn range_lines() -> Vec<Self> {
        (0..RANGE_LINES).map(Self::Range).collect()
    }

    pub fn sensitivity_lines() -> Vec<Self> {
        (0..SENSITIVITY_LINES).map(Self::Sensitivity).collect()
    }

    /// Every line the interface uses, with the direction it is configured in at init.
    pub fn all() -> Vec<(Self, Direction)> {
        let mut lines = vec![
            (Self::Polarity, Direction::Input),
            (Self::Overload, Direction::Input),
            (Self::Trigger, Direction::OutputInactive),
            (Self::Print, Direction::Input),
            (Self::Hold(0), Direction::OutputInactive),
            (Self::Hold(1), Direction::OutputInactive),
        ];
        lines.extend(
            Self::data_lines()
                .into_iter()
                .chain(Self::range_lines())
                .chain(Self::sensitivity_lines())
                .map(|line| (line, Direction::Input)),
        );
        lines
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Polarity => write!(f, "polarity"),
            Self::Overload => write!(f, "overload"),
            Self::Trigger => write!(f, "trigger"),
            Self::Print => write!(f, "print"),
            Self::Hold(n) => write!(f, "hold{n}"),
            Self::Data(n) => write!(f, "data{n}"),
            Self::Range(n) => write!(f, "range{n}"),
            Self::Sensitivity(n) => write!(f, "sensitivity{n}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    /// Output, driven inactive when configured.
    OutputInactive,
}

#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("Failed to read line {0}")]
    Read(Line),

    #[error("Failed to write line {0}")]
    Write(Line),

    #[error("Failed to configure line {0}")]
    Configure(Line),

    #[error("Failed to subscribe to edges on line {0}")]
    Subscribe(Line),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handler invoked on every trailing edge of the print strobe.
pub type StrobeHandler = Box<dyn Fn() + Send + Sync>;

/// Digital I/O towards the electrometer.
///
/// Implementations must tolerate `read` being called from the strobe handler
/// while another thread is inside `write`.
pub trait DigitalLines: Send + Sync {
    fn configure(&self, line: Line, direction: Direction) -> Result<(), LineError>;

    /// Current logical level of `line`, `true` when asserted.
    fn read(&self, line: Line) -> Result<bool, LineError>;

    fn write(&self, line: Line, level: bool) -> Result<(), LineError>;

    /// Register `handler` for trailing edges of [`Line::Print`].
    fn subscribe_print_strobe(&self, handler: StrobeHandler) -> Result<(), LineError>;
}

#[derive(Default)]
struct SimState {
    levels: HashMap<Line, bool>,
    failing: HashSet<Line>,
    failing_writes: HashSet<Line>,
    configured: HashMap<Line, Direction>,
    writes: Vec<(Line, bool)>,
    handlers: Vec<Arc<StrobeHandler>>,
    respond_to_trigger: bool,
    reject_subscriptions: bool,
}

/// In-memory line bank standing in for the connector.
#[derive(Default)]
pub struct SimulatedLines {
    state: Mutex<SimState>,
}

impl SimulatedLines {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_level(&self, line: Line, level: bool) {
        self.lock().levels.insert(line, level);
    }

    pub fn level(&self, line: Line) -> bool {
        self.lock().levels.get(&line).copied().unwrap_or(false)
    }

    /// Make every subsequent access to `line` fail.
    pub fn fail_line(&self, line: Line) {
        self.lock().failing.insert(line);
    }

    /// Make writes to `line` fail while configuring and reading still work.
    pub fn fail_writes(&self, line: Line) {
        self.lock().failing_writes.insert(line);
    }

    pub fn heal_line(&self, line: Line) {
        let mut state = self.lock();
        state.failing.remove(&line);
        state.failing_writes.remove(&line);
    }

    pub fn direction(&self, line: Line) -> Option<Direction> {
        self.lock().configured.get(&line).copied()
    }

    /// Every write performed so far, in order.
    pub fn writes(&self) -> Vec<(Line, bool)> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Strobe automatically on the trigger line's falling edge, like the
    /// instrument answering a trigger request.
    pub fn set_respond_to_trigger(&self, respond: bool) {
        self.lock().respond_to_trigger = respond;
    }

    /// Present a reading on the connector. `digits` is the unsigned decimal
    /// magnitude, encoded onto the data lines least significant digit first.
    pub fn present(&self, digits: u32, range: u8, sensitivity: u8, negative: bool, overload: bool) {
        let mut state = self.lock();
        encode_bcd(&mut state.levels, &Line::data_lines(), digits);
        encode_bcd(&mut state.levels, &Line::range_lines(), u32::from(range));
        encode_bcd(&mut state.levels, &Line::sensitivity_lines(), u32::from(sensitivity));
        state.levels.insert(Line::Polarity, negative);
        state.levels.insert(Line::Overload, overload);
    }

    /// Fire the print strobe, running every subscribed handler.
    pub fn strobe(&self) {
        let handlers = self.lock().handlers.clone();
        for handler in handlers {
            handler();
        }
    }

    /// Make edge subscription fail, as when the interrupt cannot be enabled.
    pub fn reject_subscriptions(&self) {
        self.lock().reject_subscriptions = true;
    }

    pub fn handler_count(&self) -> usize {
        self.lock().handlers.len()
    }
}

fn encode_bcd(levels: &mut HashMap<Line, bool>, lines: &[Line], mut value: u32) {
    for group in lines.chunks(4) {
        let digit = value % 10;
        value /= 10;
        for (bit, line) in group.iter().enumerate() {
            levels.insert(*line, (digit >> bit) & 1 == 1);
        }
    }
}

impl DigitalLines for SimulatedLines {
    fn configure(&self, line: Line, direction: Direction) -> Result<(), LineError> {
        let mut state = self.lock();
        if state.failing.contains(&line) {
            return Err(LineError::Configure(line));
        }
        if direction == Direction::OutputInactive {
            state.levels.insert(line, false);
        }
        state.configured.insert(line, direction);
        Ok(())
    }

    fn read(&self, line: Line) -> Result<bool, LineError> {
        let state = self.lock();
        if state.failing.contains(&line) {
            return Err(LineError::Read(line));
        }
        Ok(state.levels.get(&line).copied().unwrap_or(false))
    }

    fn write(&self, line: Line, level: bool) -> Result<(), LineError> {
        let strobe = {
            let mut state = self.lock();
            if state.failing.contains(&line) || state.failing_writes.contains(&line) {
                return Err(LineError::Write(line));
            }
            let previous = state.levels.insert(line, level).unwrap_or(false);
            state.writes.push((line, level));
            line == Line::Trigger && previous && !level && state.respond_to_trigger
        };

        // Handlers read lines back, so the lock must be released first
        if strobe {
            self.strobe();
        }
        Ok(())
    }

    fn subscribe_print_strobe(&self, handler: StrobeHandler) -> Result<(), LineError> {
        let mut state = self.lock();
        if state.reject_subscriptions || state.failing.contains(&Line::Print) {
            return Err(LineError::Subscribe(Line::Print));
        }
        state.handlers.push(Arc::new(handler));
        Ok(())
    }
}
