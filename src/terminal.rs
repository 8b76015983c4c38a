use crate::trigger::TriggerMode;
use crate::units::{OperatingMode, ParseReadingError, Reading};
use regex::Regex;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid ANSI escape pattern")
});

static MODE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)\)\s*$").expect("valid mode number pattern"));

static PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Current trigger period: (\d+) ms").expect("valid period pattern")
});

#[derive(Debug, thiserror::Error)]
pub enum KeiTerminalError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "Timeout error: Expected prompt '{expected}' but got '{actual}'. Likely due to a timeout."
    )]
    Timeout { expected: String, actual: String },

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Board rejected '{command}': {message}")]
    Rejected { command: String, message: String },

    #[error("Unexpected response: {0:?}")]
    UnexpectedResponse(String),

    #[error("Reading error: {0}")]
    Reading(#[from] ParseReadingError),
}

/// Client for the `kei` shell served by the interface board over USB serial.
pub struct KeiTerminal {
    serial: Box<dyn SerialPort>,
    prompt: String,
    timeout: Duration,
}

impl KeiTerminal {
    pub const DEFAULT_PROMPT: &'static str = "uart:~$ ";
    pub const BAUD_RATE: u32 = 115_200;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

    /// Open `port`. Call [`initialize`](Self::initialize) before sending commands.
    pub fn new(port: &str) -> Result<Self, KeiTerminalError> {
        let serial = serialport::new(port, Self::BAUD_RATE)
            .timeout(Duration::from_millis(10))
            .open()?;

        let mut terminal = Self {
            serial,
            prompt: Self::DEFAULT_PROMPT.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
        };

        terminal.flush()?;
        Ok(terminal)
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = prompt.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Abort any half-typed line and wait for a fresh prompt.
    pub fn initialize(&mut self) -> Result<(), KeiTerminalError> {
        log::debug!("Connected to interface board. Sending CTRL-C to reset the line.");
        self.send_ctrl_c()?;
        self.exec("", Some(self.timeout))?;
        self.flush()
    }

    fn flush(&mut self) -> Result<(), KeiTerminalError> {
        self.serial.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }

    /// Send one command line and return its output, without echo or prompt.
    pub fn exec(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String, KeiTerminalError> {
        let timeout = timeout.unwrap_or(self.timeout);
        self.serial.write_all(format!("{command}\n").as_bytes())?;

        let prompt_bytes = self.prompt.as_bytes();
        let mut response = Vec::new();
        let start = Instant::now();

        while !response.ends_with(prompt_bytes) {
            let mut byte = [0u8; 1];
            match self.serial.read(&mut byte) {
                Ok(1) => response.push(byte[0]),
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }

            if start.elapsed() >= timeout {
                let tail = response.len().saturating_sub(self.prompt.len());
                return Err(KeiTerminalError::Timeout {
                    expected: self.prompt.clone(),
                    actual: String::from_utf8_lossy(&response[tail..]).to_string(),
                });
            }
        }

        response.truncate(response.len() - prompt_bytes.len());
        let response = String::from_utf8(response)?;
        Ok(clean_response(&response, command))
    }

    /// Run a setter command; the shell prints nothing on success.
    fn exec_setter(&mut self, command: &str) -> Result<(), KeiTerminalError> {
        let response = self.exec(command, None)?;
        if response.is_empty() {
            Ok(())
        } else {
            Err(KeiTerminalError::Rejected {
                command: command.to_string(),
                message: response,
            })
        }
    }

    pub fn send_ctrl_c(&mut self) -> Result<(), KeiTerminalError> {
        self.serial.write_all(&[0x03])?;
        Ok(())
    }

    pub fn read(&mut self) -> Result<Reading, KeiTerminalError> {
        let response = self.exec("kei read", None)?;
        Ok(response.parse()?)
    }

    pub fn mode(&mut self) -> Result<OperatingMode, KeiTerminalError> {
        let response = self.exec("kei mode", None)?;
        parse_mode_number(&response)
            .and_then(|n| OperatingMode::try_from(n).ok())
            .ok_or(KeiTerminalError::UnexpectedResponse(response))
    }

    pub fn set_mode(&mut self, mode: OperatingMode) -> Result<(), KeiTerminalError> {
        let letter = mode.letter().ok_or_else(|| KeiTerminalError::Rejected {
            command: "kei mode".to_string(),
            message: format!("{mode} cannot be selected from the shell"),
        })?;
        self.exec_setter(&format!("kei mode {letter}"))
    }

    pub fn trigger_mode(&mut self) -> Result<TriggerMode, KeiTerminalError> {
        let response = self.exec("kei trig mode", None)?;
        parse_mode_number(&response)
            .and_then(|n| TriggerMode::try_from(n).ok())
            .ok_or(KeiTerminalError::UnexpectedResponse(response))
    }

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), KeiTerminalError> {
        self.exec_setter(&format!("kei trig mode {}", mode.letter()))
    }

    pub fn trigger_period(&mut self) -> Result<Duration, KeiTerminalError> {
        let response = self.exec("kei trig period", None)?;
        parse_period(&response).ok_or(KeiTerminalError::UnexpectedResponse(response))
    }

    pub fn set_trigger_period(&mut self, period: Duration) -> Result<(), KeiTerminalError> {
        self.exec_setter(&format!("kei trig period {}", period.as_millis()))
    }
}

/// Strip terminal escapes, carriage returns and the echoed command line.
pub fn clean_response(raw: &str, command: &str) -> String {
    let plain = ANSI_ESCAPE.replace_all(raw, "");
    let mut lines = plain
        .split('\n')
        .map(|line| line.trim_end_matches('\r').trim_end())
        .skip_while(|line| line.is_empty())
        .peekable();

    if lines.peek().is_some_and(|line| line.trim() == command.trim()) {
        lines.next();
    }

    lines.collect::<Vec<_>>().join("\n").trim().to_string()
}

/// The number in parentheses at the end of `Current ... mode: name (n)`.
pub fn parse_mode_number(response: &str) -> Option<u8> {
    MODE_NUMBER
        .captures(response.trim())
        .and_then(|caps| caps[1].parse().ok())
}

pub fn parse_period(response: &str) -> Option<Duration> {
    PERIOD
        .captures(response)
        .and_then(|caps| caps[1].parse().ok())
        .map(Duration::from_millis)
}
