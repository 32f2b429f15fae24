use std::io::{stdout, Write};
use std::time::Duration;
use std::{env, process, thread};

use blewatch::view::Frame;
use blewatch::{KeyAction, Monitor, MonitorConfig, MonitorEvent};
use blewatch_tools::adapter;
use blewatch_tools::sink::FileSink;

use crossbeam::channel;
use getopts::Options;

use crossterm::ExecutableCommand;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    style::Print,
    terminal::{
        disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
    QueueableCommand,
};

fn monitor_opts() -> Options {
    let mut opts = Options::new();
    opts.optopt(
        "l",
        "log",
        "scan log file (default blescan-<timestamp>.log)",
        "path",
    );
    opts.optopt(
        "",
        "inactive",
        "seconds before an unseen device is shown as inactive (default 10)",
        "secs",
    );
    opts.optopt(
        "",
        "retain",
        "seconds before an unseen device is dropped (default 60)",
        "secs",
    );
    opts.optopt(
        "",
        "rotate",
        "seconds between scan log block rotations (default 30)",
        "secs",
    );
    opts.optopt(
        "",
        "tick",
        "milliseconds between redraws (default 1000)",
        "millis",
    );
    opts.optflag("h", "help", "print this help");
    opts
}

fn parse_config(matches: &getopts::Matches) -> Result<MonitorConfig, String> {
    fn seconds(matches: &getopts::Matches, name: &str) -> Result<Option<Duration>, String> {
        match matches.opt_str(name) {
            Some(value) => {
                let secs: u64 = value
                    .parse()
                    .map_err(|_| format!("bad --{} value: {}", name, value))?;
                Ok(Some(Duration::from_secs(secs)))
            }
            None => Ok(None),
        }
    }

    let mut config = MonitorConfig::default();
    if let Some(d) = seconds(matches, "inactive")? {
        config.inactivity_threshold = d;
    }
    if let Some(d) = seconds(matches, "retain")? {
        config.retention_window = d;
    }
    if let Some(d) = seconds(matches, "rotate")? {
        config.log_rotation_period = d;
    }
    if let Some(value) = matches.opt_str("tick") {
        let millis: u64 = value
            .parse()
            .map_err(|_| format!("bad --tick value: {}", value))?;
        config.render_tick_period = Duration::from_millis(millis);
    }
    config.validate().map_err(|err| err.to_string())?;
    Ok(config)
}

/// Forward decoded key presses until quit or until the monitor goes
/// away.
fn input_loop(events: channel::Sender<MonitorEvent>) {
    loop {
        match crossterm::event::poll(Duration::from_millis(100)) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(_) => break,
        }
        let event = match crossterm::event::read() {
            Ok(event) => event,
            Err(_) => break,
        };
        let key = match event {
            Event::Key(KeyEvent {
                code,
                modifiers,
                kind: KeyEventKind::Press,
                ..
            }) => match code {
                KeyCode::Up | KeyCode::Char('k') => KeyAction::Up,
                KeyCode::Down | KeyCode::Char('j') => KeyAction::Down,
                KeyCode::Enter | KeyCode::Char('d') => KeyAction::ToggleDetail,
                KeyCode::Esc => KeyAction::BackToList,
                KeyCode::Char('q') => KeyAction::Quit,
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                    KeyAction::Quit
                }
                _ => continue,
            },
            _ => continue,
        };
        let quit = key == KeyAction::Quit;
        if events.send(MonitorEvent::Key(key)).is_err() || quit {
            break;
        }
    }
}

/// Paint frames until the monitor drops its end of the channel. Each
/// frame replaces the whole screen.
fn paint_frames(frames: &channel::Receiver<Frame>) -> std::io::Result<()> {
    let mut out = stdout();
    for frame in frames.iter() {
        out.queue(Clear(ClearType::All))?;
        for (row, line) in frame.lines.iter().enumerate() {
            if row > u16::MAX as usize {
                break;
            }
            out.queue(MoveTo(0, row as u16))?;
            out.queue(Print(line))?;
        }
        out.flush()?;
    }
    Ok(())
}

fn run_terminal(frames: channel::Receiver<Frame>) -> std::io::Result<()> {
    let mut out = stdout();
    enable_raw_mode()?;
    out.execute(EnterAlternateScreen)?;
    out.execute(Hide)?;
    out.execute(Clear(ClearType::All))?;

    let result = paint_frames(&frames);

    out.execute(Show)?;
    out.execute(LeaveAlternateScreen)?;
    disable_raw_mode()?;
    result
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let opts = monitor_opts();
    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(2);
        }
    };
    if matches.opt_present("h") {
        print!("{}", opts.usage("Usage: ble-monitor [options]"));
        return;
    }
    let config = match parse_config(&matches) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(2);
        }
    };
    let log_path = matches.opt_str("l").unwrap_or_else(|| {
        format!(
            "blescan-{}.log",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        )
    });
    let sink = match FileSink::create(&log_path) {
        Ok(sink) => sink,
        Err(err) => {
            eprintln!("cannot create scan log {}: {}", log_path, err);
            process::exit(1);
        }
    };

    let (events_tx, events_rx) = channel::unbounded();
    let (frames_tx, frames_rx) = channel::unbounded();

    // Bring the radio up before touching the terminal, so adapter
    // problems come out as a plain error message.
    let scan = match adapter::start_scanning(events_tx.clone()) {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    };

    let monitor = Monitor::new(config, sink, frames_tx);
    let monitor_thread = thread::spawn(move || monitor.run(events_rx));

    let input_events = events_tx.clone();
    let input_thread = thread::spawn(move || input_loop(input_events));
    drop(events_tx);

    if let Err(err) = run_terminal(frames_rx) {
        eprintln!("terminal error: {}", err);
    }

    let _ = monitor_thread.join();
    scan.stop();
    let _ = input_thread.join();

    println!("scan log written to {}", log_path);
}
