//! GRBL surface probing session
//!
//! Drives one `G38.2` probe cycle per scan plan point and turns the replies
//! into a [`HeightMap`]. Per point the session walks
//! `MoveClear -> MoveXy -> Probe -> AwaitReply -> Record`; after the last
//! point it retracts and returns to the origin (`Home`) and ends in `Done`.
//!
//! The session owns its transport for its whole lifetime and closes it when
//! the run finishes, fails, or the session is dropped.

use super::response_parser::{GrblResponse, GrblResponseParser, ProbeReport};
use crate::communication::{LineReader, Transport};
use autolevel_core::{ConnectionError, Coordinate, HeightMap, ProbeError, Result};
use std::io::Write;
use std::time::{Duration, Instant};

/// Protocol state of a probe session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    /// Connected, nothing sent yet
    Idle,
    /// Retracting to the clearance height
    MoveClear,
    /// Rapid to the next sample position
    MoveXy,
    /// Probe cycle issued
    Probe,
    /// Waiting for the `[PRB:...]` reply
    AwaitReply,
    /// Storing the measured offset
    Record,
    /// Retracting and returning to the origin after the last point
    Home,
    /// All points probed
    Done,
    /// The run aborted
    Failed,
}

/// Machine parameters of a probe run
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSessionConfig {
    /// Z to retract to before every XY move (mm)
    pub clearance_z: f64,
    /// Feed for the retract move (mm/min)
    pub clearance_feed: f64,
    /// Z the probe cycle travels toward (mm)
    pub probe_target_z: f64,
    /// Feed for the probe cycle (mm/min)
    pub probe_feed: f64,
    /// Longest wait for a probe reply
    pub reply_timeout: Duration,
    /// Read and log the controller banner before unlocking
    pub startup_drain: bool,
}

impl Default for ProbeSessionConfig {
    fn default() -> Self {
        Self {
            clearance_z: 1.0,
            clearance_feed: 95.0,
            probe_target_z: -20.0,
            probe_feed: 30.0,
            reply_timeout: Duration::from_secs(120),
            startup_drain: true,
        }
    }
}

/// One probing run over an open transport
pub struct ProbeSession<T: Transport> {
    transport: Option<T>,
    config: ProbeSessionConfig,
    parser: GrblResponseParser,
    reader: LineReader,
    state: ProbeState,
}

impl<T: Transport> ProbeSession<T> {
    pub fn new(transport: T, config: ProbeSessionConfig) -> Self {
        Self {
            transport: Some(transport),
            config,
            parser: GrblResponseParser::new(),
            reader: LineReader::new(),
            state: ProbeState::Idle,
        }
    }

    /// Current protocol state
    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// Whether the transport is still held
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Probe every point of the plan and return the height map
    ///
    /// The first point must be the datum (0, 0). Each completed point is
    /// appended to `sink` as `x\ty\tz`. The transport is closed before this
    /// returns, whatever the outcome.
    pub fn run(&mut self, plan: &[Coordinate], sink: &mut dyn Write) -> Result<HeightMap> {
        let result = self.execute(plan, sink);
        if let Err(e) = &result {
            tracing::error!("Probe session aborted in {:?}: {}", self.state, e);
            self.state = ProbeState::Failed;
        }
        self.release();
        result
    }

    fn execute(&mut self, plan: &[Coordinate], sink: &mut dyn Write) -> Result<HeightMap> {
        let first = plan.first().ok_or(ProbeError::EmptyPlan)?;
        if !first.is_origin() {
            return Err(ProbeError::MissingDatum {
                x: first.x,
                y: first.y,
            }
            .into());
        }

        self.preamble()?;

        let mut map = HeightMap::new();
        let mut datum: Option<f64> = None;

        for (index, point) in plan.iter().enumerate() {
            tracing::info!("Probing point #{} {}", index, point);

            self.enter(ProbeState::MoveClear);
            let retract = self.retract_command();
            self.send(&retract)?;

            self.enter(ProbeState::MoveXy);
            self.send(&format!("G0 X{:.3} Y{:.3}", point.x, point.y))?;

            self.enter(ProbeState::Probe);
            self.send(&format!(
                "G38.2 Z{:.3} F{:.2}",
                self.config.probe_target_z, self.config.probe_feed
            ))?;

            self.enter(ProbeState::AwaitReply);
            let report = self.await_reply(index, *point)?;

            self.enter(ProbeState::Record);
            let reference = *datum.get_or_insert(report.z);
            let height = report.z - reference;
            map.insert(index, *point, height);

            if let Some(sample) = map.get(index) {
                sink.write_all(HeightMap::log_line(sample).as_bytes())?;
            }
            tracing::info!("Point #{} {} height {:.3}", index, point, height);
        }

        self.enter(ProbeState::Home);
        let retract = self.retract_command();
        self.send(&retract)?;
        self.send("G0 X0 Y0")?;
        sink.flush()?;

        self.enter(ProbeState::Done);
        tracing::info!("Probing finished, {} points", map.len());
        Ok(map)
    }

    fn preamble(&mut self) -> Result<()> {
        if self.config.startup_drain {
            self.drain()?;
        }
        self.send("$X")?;
        if self.config.startup_drain {
            self.drain()?;
        }
        self.send("G90")?;
        self.send("G21")?;
        Ok(())
    }

    /// Log whatever the controller sends until a read brings no data
    fn drain(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.config.reply_timeout;
        loop {
            let pending = self.reader.pending();
            match self.read_line()? {
                Some(line) => tracing::info!(target: "autolevel::rx", "{}", line),
                // part of a line arrived
                None if self.reader.pending() > pending => {}
                None => break,
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        Ok(())
    }

    fn await_reply(&mut self, index: usize, point: Coordinate) -> Result<ProbeReport> {
        let deadline = Instant::now() + self.config.reply_timeout;
        loop {
            if let Some(line) = self.read_line()? {
                match self.parser.parse(&line) {
                    Some(GrblResponse::Probe(report)) => {
                        if report.success == Some(false) {
                            tracing::warn!(
                                "Controller reports no contact at point #{}, recording anyway",
                                index
                            );
                        }
                        return Ok(report);
                    }
                    Some(reply @ (GrblResponse::Error(_) | GrblResponse::Alarm(_))) => {
                        tracing::warn!(target: "autolevel::rx", "{}", reply);
                    }
                    Some(_) => tracing::debug!(target: "autolevel::rx", "{}", line),
                    None => {}
                }
            }

            if Instant::now() >= deadline {
                return Err(ProbeError::TimedOut {
                    index,
                    x: point.x,
                    y: point.y,
                    timeout_ms: self.config.reply_timeout.as_millis() as u64,
                }
                .into());
            }
        }
    }

    fn retract_command(&self) -> String {
        format!(
            "G1 Z{:.3} F{:.2}",
            self.config.clearance_z, self.config.clearance_feed
        )
    }

    fn send(&mut self, line: &str) -> Result<()> {
        self.transport_mut()?.write_line(line)
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let transport = self.transport.as_mut().ok_or_else(Self::released)?;
        self.reader.read_line(transport)
    }

    fn transport_mut(&mut self) -> Result<&mut T> {
        self.transport.as_mut().ok_or_else(|| Self::released().into())
    }

    fn released() -> ConnectionError {
        ConnectionError::ConnectionLost {
            reason: "probe session already released its transport".to_string(),
        }
    }

    fn enter(&mut self, next: ProbeState) {
        tracing::trace!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn release(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                tracing::warn!("Failed to close {}: {}", transport.name(), e);
            }
        }
    }
}

impl<T: Transport> Drop for ProbeSession<T> {
    fn drop(&mut self) {
        self.release();
    }
}
