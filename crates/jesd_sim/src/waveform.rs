//! Waveform dumps of link signals.
//!
//! The link reports value changes through [`WaveformRecorder`];
//! [`VcdRecorder`] renders them as an IEEE 1364 Value Change Dump for
//! GTKWave, Surfer, or any other VCD viewer.

use std::io::{self, Write};

use jesd_common::{SignalId, SimTime};

use crate::error::LinkError;

/// Sink for traced link signals.
///
/// Every signal is declared inside a scope before the first change is
/// recorded. Changes arrive in non-decreasing time order.
pub trait WaveformRecorder {
    /// Declares a signal of `width` bits in the current scope.
    fn register_signal(&mut self, id: SignalId, name: &str, width: u32) -> Result<(), LinkError>;

    /// Opens a nested scope.
    fn begin_scope(&mut self, name: &str) -> Result<(), LinkError>;

    /// Closes the innermost scope.
    fn end_scope(&mut self) -> Result<(), LinkError>;

    /// Records that `id` took `value` at `time`.
    fn record_change(&mut self, time: SimTime, id: SignalId, value: u64) -> Result<(), LinkError>;

    /// Flushes everything written so far.
    fn finalize(&mut self) -> Result<(), LinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Empty,
    Declaring,
    Dumping(SimTime),
}

#[derive(Debug, Clone)]
struct VcdSignal {
    code: String,
    width: u32,
}

/// Writes a VCD file with a 1 fs timescale.
pub struct VcdRecorder<W: Write> {
    writer: W,
    signals: Vec<Option<VcdSignal>>,
    declared: usize,
    phase: Phase,
}

impl<W: Write> VcdRecorder<W> {
    /// Creates a recorder writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            signals: Vec::new(),
            declared: 0,
            phase: Phase::Empty,
        }
    }

    /// Consumes the recorder and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn declare(&mut self) -> Result<(), LinkError> {
        if self.phase == Phase::Empty {
            writeln!(self.writer, "$version jesdsim {} $end", env!("CARGO_PKG_VERSION"))?;
            writeln!(self.writer, "$timescale 1fs $end")?;
            self.phase = Phase::Declaring;
        }
        Ok(())
    }

    /// Short identifier for the `n`-th declared signal, drawn from the 94
    /// printable characters `!` through `~`.
    fn code(mut n: usize) -> String {
        let mut code = String::new();
        loop {
            code.push(char::from(b'!' + (n % 94) as u8));
            n /= 94;
            if n == 0 {
                return code;
            }
            n -= 1;
        }
    }
}

impl<W: Write> WaveformRecorder for VcdRecorder<W> {
    fn register_signal(&mut self, id: SignalId, name: &str, width: u32) -> Result<(), LinkError> {
        self.declare()?;
        let code = Self::code(self.declared);
        self.declared += 1;
        writeln!(self.writer, "$var wire {width} {code} {name} $end")?;
        if self.signals.len() <= id.index() {
            self.signals.resize(id.index() + 1, None);
        }
        self.signals[id.index()] = Some(VcdSignal { code, width });
        Ok(())
    }

    fn begin_scope(&mut self, name: &str) -> Result<(), LinkError> {
        self.declare()?;
        writeln!(self.writer, "$scope module {name} $end")?;
        Ok(())
    }

    fn end_scope(&mut self) -> Result<(), LinkError> {
        writeln!(self.writer, "$upscope $end")?;
        Ok(())
    }

    fn record_change(&mut self, time: SimTime, id: SignalId, value: u64) -> Result<(), LinkError> {
        let Some(Some(signal)) = self.signals.get(id.index()) else {
            return Err(LinkError::WaveformIo(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{id} was never declared"),
            )));
        };
        let line = if signal.width == 1 {
            format!("{}{}", value & 1, signal.code)
        } else {
            format!("b{value:b} {}", signal.code)
        };

        match self.phase {
            Phase::Dumping(at) if at == time => {}
            Phase::Dumping(_) => writeln!(self.writer, "#{}", time.fs)?,
            Phase::Empty | Phase::Declaring => {
                self.declare()?;
                writeln!(self.writer, "$enddefinitions $end")?;
                writeln!(self.writer, "$dumpvars")?;
                writeln!(self.writer, "#{}", time.fs)?;
            }
        }
        self.phase = Phase::Dumping(time);
        writeln!(self.writer, "{line}")?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), LinkError> {
        if !matches!(self.phase, Phase::Dumping(_)) {
            self.declare()?;
            writeln!(self.writer, "$enddefinitions $end")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
