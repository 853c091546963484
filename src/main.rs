use chrono::Local;
use clap::{Parser, Subcommand};
use legstretch::{
    app_dirs::AppDirs,
    calibration::{target_threshold, Baseline, CalibrationConfig, CalibrationResult, Calibrator},
    capture,
    config::{Config, ConfigStore, FileConfigStore},
    engine::{EngineConfig, RepDetectionEngine},
    events::EngineEvent,
    orientation::{LineQuaternionSource, OrientationSampler, SamplerConfig},
    runtime::{EngineHandle, MonotonicClock},
    session::Session,
    session_log::SessionLog,
    transport::{BalanceStreamReader, BoardCommand, SerialTransport},
};
use std::{
    error::Error,
    io::{self, BufRead},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing_subscriber::EnvFilter;

/// leg stretch trainer: counts repetitions from a balance board and an IMU
#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct Cli {
    /// read settings from this file instead of the per-user config
    #[clap(long, global = true)]
    config_file: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// calibrate, then run a live session controlled from stdin
    Run {
        /// serial port of the balance board
        #[clap(long)]
        board: String,

        /// serial port of the orientation sensor
        #[clap(long)]
        imu: String,

        /// skip the stretch phase and use this maximum angle
        #[clap(long)]
        max_angle: Option<f64>,
    },

    /// run both calibration phases and print the result
    Calibrate {
        /// serial port of the orientation sensor
        #[clap(long)]
        imu: String,
    },

    /// feed a recorded capture through the engine
    Replay {
        /// CSV capture with a time,w,line header
        capture: PathBuf,

        /// calibrated maximum angle in degrees
        #[clap(long)]
        max_angle: f64,

        /// baseline angle; the first reading is used when omitted
        #[clap(long)]
        start_angle: Option<f64>,

        /// write the session log here
        #[clap(long)]
        out: Option<PathBuf>,
    },

    /// print the effective settings
    Config {
        /// also save them to the config file
        #[clap(long)]
        write: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();

    let store = cli
        .config_file
        .map_or_else(FileConfigStore::new, FileConfigStore::with_path);
    let cfg = store.load();

    match cli.command {
        Command::Run {
            board,
            imu,
            max_angle,
        } => run(&cfg, &board, &imu, max_angle),
        Command::Calibrate { imu } => {
            let sampler = open_imu(&cfg, &imu)?;
            let result = calibrate(&sampler, None)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            print_target(&result, cfg.tolerance_percent);
            Ok(())
        }
        Command::Replay {
            capture: path,
            max_angle,
            start_angle,
            out,
        } => {
            let rows = capture::read_capture(&path)?;
            let log = match out {
                Some(out) => SessionLog::create(
                    out,
                    max_angle,
                    target_threshold(max_angle, cfg.tolerance_percent),
                ),
                None => SessionLog::disabled(),
            };
            let baseline = start_angle.map(|start_angle| Baseline { start_angle });
            let replay = capture::replay(&rows, EngineConfig::from(&cfg), baseline, max_angle, log);

            let mut last_reps = 0;
            for event in &replay.events {
                report(event, &mut last_reps);
            }
            print_summary(&replay.session);
            Ok(())
        }
        Command::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            if write {
                store.save(&cfg)?;
                println!("saved to {}", store.path().display());
            }
            Ok(())
        }
    }
}

fn open_imu(cfg: &Config, port: &str) -> Result<OrientationSampler, Box<dyn Error>> {
    let transport = SerialTransport::open(port, cfg.baud_rate, cfg.line_timeout())?;
    Ok(OrientationSampler::spawn(
        LineQuaternionSource::new(transport),
        SamplerConfig::from(cfg),
    ))
}

/// Block until the operator presses Enter.
fn wait_for_enter() -> Arc<AtomicBool> {
    let done = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&done);
    thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
        flag.store(true, Ordering::Release);
    });
    done
}

fn calibrate(
    sampler: &OrientationSampler,
    max_angle: Option<f64>,
) -> Result<CalibrationResult, Box<dyn Error>> {
    let calibrator = Calibrator::new(sampler.handle(), CalibrationConfig::default());

    println!("Stand still with the leg relaxed...");
    let baseline = calibrator.zero()?;

    let max_angle = match max_angle {
        Some(max) => max,
        None => {
            println!("Stretch as far as you can, then press Enter.");
            let done = wait_for_enter();
            calibrator.track_max(baseline, &done)
        }
    };

    Ok(CalibrationResult {
        start_angle: baseline.start_angle,
        max_angle,
    })
}

fn print_target(result: &CalibrationResult, tolerance_percent: f64) {
    match result.target_threshold(tolerance_percent) {
        Some(target) => println!("target {:.1} deg ({}% of max)", target, tolerance_percent),
        None => println!("no usable maximum; every rep will count as failed"),
    }
}

fn run(cfg: &Config, board: &str, imu: &str, max_angle: Option<f64>) -> Result<(), Box<dyn Error>> {
    let mut sampler = open_imu(cfg, imu)?;
    let calibration = calibrate(&sampler, max_angle)?;
    print_target(&calibration, cfg.tolerance_percent);

    let log_path = AppDirs::session_log_path(&cfg.session_dir(), Local::now());
    let log = SessionLog::create(
        &log_path,
        calibration.max_angle,
        calibration.target_threshold(cfg.tolerance_percent),
    );

    let (events_tx, events_rx) = mpsc::channel();
    let engine =
        RepDetectionEngine::from_calibration(EngineConfig::from(cfg), &calibration, log, events_tx);

    let mut handle = EngineHandle::spawn(engine, sampler.handle(), MonotonicClock::new());

    let port = board.to_string();
    let baud_rate = cfg.baud_rate;
    let read_timeout = cfg.line_timeout();
    let mut board = BalanceStreamReader::spawn(
        move || SerialTransport::open(&port, baud_rate, read_timeout),
        handle.input(),
    );
    let printer = spawn_printer(events_rx);

    // the writer slot fills once the reader thread has opened the port
    for _ in 0..50 {
        if board.is_connected() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    board.send_command(BoardCommand::Tare);
    board.send_command(BoardCommand::StreamCop);

    println!("commands: s = start set, e = end set, d = discard session, q = quit");
    for line in io::stdin().lock().lines() {
        match line?.trim() {
            "s" => handle.start_set(),
            "e" => handle.end_set("operator"),
            "d" => handle.discard_data(),
            "q" => break,
            "" => {}
            other => println!("unknown command {:?}", other),
        }
    }

    board.send_command(BoardCommand::StopStream);
    board.stop();
    let session = handle.stop();
    sampler.stop();
    let _ = printer.join();

    if let Some(session) = session {
        print_summary(&session);
    }
    Ok(())
}

fn spawn_printer(events: Receiver<EngineEvent>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut last_reps = 0;
        for event in events {
            report(&event, &mut last_reps);
        }
    })
}

/// Print markers and rep count changes; plain frames are too frequent to show.
fn report(event: &EngineEvent, last_reps: &mut u32) {
    match event.as_frame() {
        Some(frame) if frame.rep_count != *last_reps => {
            *last_reps = frame.rep_count;
            println!("{}", event);
        }
        Some(_) => {}
        None => {
            *last_reps = 0;
            println!("{}", event);
        }
    }
}

fn print_summary(session: &Session) {
    println!(
        "session: {} sets, {} reps, max {:.1} deg",
        session.sets.len(),
        session.total_reps(),
        session.max_angle
    );
    for set in &session.sets {
        println!(
            "  set {}: {}/{} passed, best {}, ended: {}",
            set.index,
            set.passed(),
            set.repetitions.len(),
            set.best_angle()
                .map_or_else(|| "-".to_string(), |a| format!("{:.1} deg", a)),
            set.end_reason.as_deref().unwrap_or("open")
        );
    }
    match &session.log_path {
        Some(path) => println!("log: {}", path.display()),
        None => println!("log: none"),
    }
}
