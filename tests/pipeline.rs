use autolevel::{Config, Error, LevelingJob, Pipeline, Transport};
use autolevel_core::{ConnectionError, ProbeError, SurfaceError, ToolpathError};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Shared {
    written: Vec<String>,
    closed: bool,
}

// GRBL stand-in that reports `surface(x, y)` for every probe cycle
struct Controller {
    shared: Arc<Mutex<Shared>>,
    outbox: VecDeque<u8>,
    partial: String,
    position: (f64, f64),
    surface: fn(f64, f64) -> f64,
    silent: bool,
}

impl Controller {
    fn new(surface: fn(f64, f64) -> f64) -> (Self, Arc<Mutex<Shared>>) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let mut controller = Self {
            shared: shared.clone(),
            outbox: VecDeque::new(),
            partial: String::new(),
            position: (0.0, 0.0),
            surface,
            silent: false,
        };
        controller.outbox.extend(b"Grbl 1.1h ['$' for help]\r\n");
        (controller, shared)
    }

    fn handle(&mut self, line: &str) {
        self.shared.lock().unwrap().written.push(line.to_string());
        if let Some(rest) = line.strip_prefix("G0 X") {
            let mut parts = rest.split(" Y");
            let x = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0.0);
            let y = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0.0);
            self.position = (x, y);
        }
        let reply = if line.starts_with("G38.2") {
            if self.silent {
                return;
            }
            let (x, y) = self.position;
            format!("[PRB:{:.3},{:.3},{:.3}:1]\r\nok\r\n", x, y, (self.surface)(x, y))
        } else {
            "ok\r\n".to_string()
        };
        self.outbox.extend(reply.bytes());
    }
}

impl Transport for Controller {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.partial.push_str(&String::from_utf8_lossy(data));
        while let Some(pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=pos).collect();
            self.handle(line.trim_end());
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.outbox.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.outbox.pop_front().unwrap_or(b'\n');
        }
        Ok(n)
    }

    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn close(&mut self) -> io::Result<()> {
        self.shared.lock().unwrap().closed = true;
        Ok(())
    }
}

// Raw readings: 2 mm below the machine zero, tilted along X
fn tilted(x: f64, y: f64) -> f64 {
    -2.0 + 0.001 * x - 0.002 * y
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.connection.reply_timeout_ms = 200;
    config.output.height_log = dir.join("heights.txt");
    config
}

const PROGRAM: &str = "G21\nG0 X-5 Y5\nG1 Z-1 F60\nG1 X-25 Y25 F200\nM30\n";

#[test]
fn test_full_run_levels_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("board.nc");
    fs::write(&input, PROGRAM).unwrap();

    let pipeline = Pipeline::new(test_config(dir.path()));
    let job = LevelingJob::new(30.0, 30.0, pipeline.config()).with_input(&input);
    let (controller, shared) = Controller::new(tilted);

    let outcome = pipeline.run(&job, |_| Ok(controller)).unwrap();

    assert_eq!(outcome.plan.len(), 16);
    assert_eq!(outcome.height_map.len(), 16);
    assert_eq!(outcome.height_map.datum().map(|s| s.height), Some(0.0));
    assert!(shared.lock().unwrap().closed);

    let log = fs::read_to_string(dir.path().join("heights.txt")).unwrap();
    assert_eq!(log.lines().count(), 16);
    assert_eq!(log.lines().next(), Some("0.000\t0.000\t0.000"));
    assert!(!dir.path().join("heights.txt.partial").exists());
    assert!(outcome.surface.is_some());

    let (output, report) = outcome.leveled.unwrap();
    assert_eq!(output, dir.path().join("board.LEV.nc"));
    assert_eq!(report.linear_moves, 1);
    assert_eq!(report.plunge_pairs, 1);
    assert_eq!(
        fs::read_to_string(output).unwrap(),
        "G21\nG0 X-5.0000 Y5.0000\nG1 Z-0.115 F60\nG1 X-25.0000 Y25.0000 Z-0.175 F200\nM30\n"
    );
}

#[test]
fn test_probe_only_run() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_config(dir.path()));
    let job = LevelingJob::new(30.0, 30.0, pipeline.config());
    let (controller, shared) = Controller::new(tilted);

    let outcome = pipeline.run(&job, |_| Ok(controller)).unwrap();

    assert!(outcome.leveled.is_none());
    let written = shared.lock().unwrap().written.clone();
    assert_eq!(&written[..3], ["$X", "G90", "G21"]);
    assert_eq!(written.last().map(String::as_str), Some("G0 X0 Y0"));
}

#[test]
fn test_structural_errors_stop_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_config(dir.path()));
    let mut connected = false;

    let job = LevelingJob::new(10.0, 10.0, pipeline.config()).with_steps(10.0, 10.0);
    let err = pipeline
        .run(&job, |_| {
            connected = true;
            Ok(Controller::new(tilted).0)
        })
        .unwrap_err();
    assert!(err.is_structural());

    let job = LevelingJob::new(30.0, 30.0, pipeline.config()).with_input(dir.path().join("none.nc"));
    let err = pipeline
        .run(&job, |_| {
            connected = true;
            Ok(Controller::new(tilted).0)
        })
        .unwrap_err();
    assert!(matches!(err, Error::Toolpath(ToolpathError::MissingInput { .. })));

    let job = LevelingJob::new(30.0, 30.0, pipeline.config()).with_input(dir.path());
    assert!(pipeline.run(&job, |_| Ok(Controller::new(tilted).0)).is_err());

    assert!(!connected);
    assert!(!dir.path().join("heights.txt").exists());
}

#[test]
fn test_silent_controller_times_out_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("board.nc");
    fs::write(&input, PROGRAM).unwrap();

    let pipeline = Pipeline::new(test_config(dir.path()));
    let job = LevelingJob::new(30.0, 30.0, pipeline.config()).with_input(&input);
    let (mut controller, shared) = Controller::new(tilted);
    controller.silent = true;

    let err = pipeline.run(&job, |_| Ok(controller)).unwrap_err();

    assert!(matches!(err, Error::Probe(ProbeError::TimedOut { index: 0, .. })));
    assert!(shared.lock().unwrap().closed);
    assert!(!dir.path().join("board.LEV.nc").exists());
    assert_eq!(fs::read_to_string(&input).unwrap(), PROGRAM);
}

#[test]
fn test_small_grid_is_rejected_before_probing_when_leveling() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("board.nc");
    fs::write(&input, PROGRAM).unwrap();

    let pipeline = Pipeline::new(test_config(dir.path()));
    let job = LevelingJob::new(20.0, 10.0, pipeline.config()).with_input(&input);
    let mut connected = false;

    let err = pipeline
        .run(&job, |_| {
            connected = true;
            Ok(Controller::new(tilted).0)
        })
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Surface(SurfaceError::InsufficientSamples {
            distinct_x: 3,
            distinct_y: 2,
            required: 4
        })
    ));
    assert!(!connected);
    assert!(!dir.path().join("board.LEV.nc").exists());
}

#[test]
fn test_small_probe_only_grid_returns_the_map() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_config(dir.path()));
    let job = LevelingJob::new(20.0, 20.0, pipeline.config()).with_steps(10.0, 10.0);
    let (controller, _shared) = Controller::new(tilted);

    let outcome = pipeline.run(&job, |_| Ok(controller)).unwrap();

    assert_eq!(outcome.height_map.len(), 9);
    assert!(outcome.surface.is_none());
    assert!(outcome.leveled.is_none());
    let log = fs::read_to_string(dir.path().join("heights.txt")).unwrap();
    assert_eq!(log.lines().count(), 9);
}

#[test]
fn test_failed_connection_keeps_previous_log() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("heights.txt");
    fs::write(&log, "0.000\t0.000\t0.000\n").unwrap();

    let pipeline = Pipeline::new(test_config(dir.path()));
    let job = LevelingJob::new(30.0, 30.0, pipeline.config());
    let err = pipeline
        .run(&job, |params| -> autolevel::Result<Controller> {
            Err(ConnectionError::FailedToOpen {
                port: params.port.clone(),
                reason: "busy".to_string(),
            }
            .into())
        })
        .unwrap_err();

    assert!(err.is_connection_error());
    assert_eq!(fs::read_to_string(&log).unwrap(), "0.000\t0.000\t0.000\n");
    assert!(!dir.path().join("heights.txt.partial").exists());
}

#[test]
fn test_failed_probe_run_keeps_previous_log() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("heights.txt");
    fs::write(&log, "previous\n").unwrap();

    let pipeline = Pipeline::new(test_config(dir.path()));
    let job = LevelingJob::new(30.0, 30.0, pipeline.config());
    let (mut controller, _shared) = Controller::new(tilted);
    controller.silent = true;

    assert!(pipeline.run(&job, |_| Ok(controller)).is_err());
    assert_eq!(fs::read_to_string(&log).unwrap(), "previous\n");
}

#[test]
fn test_level_from_saved_log() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_config(dir.path()));
    let job = LevelingJob::new(30.0, 30.0, pipeline.config());
    let (controller, _shared) = Controller::new(tilted);
    pipeline.run(&job, |_| Ok(controller)).unwrap();

    let input = dir.path().join("later.ngc");
    fs::write(&input, PROGRAM).unwrap();
    let (_, output, report) = pipeline
        .level_from_log(&dir.path().join("heights.txt"), &input, 0.1)
        .unwrap();

    assert_eq!(output, dir.path().join("later.LEV.ngc"));
    assert_eq!(report.rewritten(), 2);
    assert!(fs::read_to_string(output).unwrap().contains("G1 Z-0.115 F60"));
}
