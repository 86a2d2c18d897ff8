use std::cell::RefCell;
use std::io::{Error, ErrorKind, Result, Write, stdout};
use std::net::{SocketAddr, ToSocketAddrs};
use std::rc::Rc;
use std::time::{Duration, Instant};

use common::SampleStatus;
use crossterm::{
    ExecutableCommand, cursor,
    cursor::MoveToNextLine,
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use probe::{
    ChannelHandle, Clock, DisconnectOptions, DisconnectReason, SessionConfig, SessionController,
    SessionState, UdpChannel,
};
use tracing_subscriber::EnvFilter;

use crate::cli::parse_args;
use crate::input::{execute_command, handle_input};

mod cli;
mod input;

struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let _ = execute!(stdout(), LeaveAlternateScreen, cursor::Show);
    }
}

pub struct App {
    pub server_addr: SocketAddr,
    pub controller: SessionController,
    pub channel: Option<Rc<RefCell<UdpChannel>>>,
}

impl App {
    pub fn connect(&mut self, now: Instant) -> Result<()> {
        let channel = Rc::new(RefCell::new(UdpChannel::connect(self.server_addr)?));
        let handle: ChannelHandle = channel.clone();
        self.channel = Some(channel);
        self.controller.connect(handle, now);
        // datagram channels are ready as soon as the socket binds
        self.controller.on_channel_open(now);
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let server_addr = args
        .server_addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "unable to resolve server address"))?;

    let mut config = SessionConfig::default();
    if let Some(interval_ms) = args.interval_ms {
        config.probe.interval = Duration::from_millis(interval_ms);
    }

    let mut app = App {
        server_addr,
        controller: SessionController::new(config, Clock::new()),
        channel: None,
    };
    app.controller.set_collection_mode(args.collect);

    terminal::enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen, cursor::Hide)?;
    let _guard = TerminalGuard;

    print_banner()?;
    let result = run_app(&mut app);

    // quit tears the session down quietly; the guard restores the screen
    app.controller.disconnect(
        DisconnectReason::Reload,
        DisconnectOptions {
            suppress_message: true,
            ..DisconnectOptions::default()
        },
        Instant::now(),
    );

    result
}

fn print_banner() -> Result<()> {
    let mut out = stdout();
    println!("sonde latency probe");
    out.execute(MoveToNextLine(1))?;
    println!("Commands: C=connect | D=disconnect | R=reset | M=toggle collection | Q=quit");
    out.execute(MoveToNextLine(1))?;
    Ok(())
}

fn run_app(app: &mut App) -> Result<()> {
    loop {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        code => {
                            if let Some(command) = handle_input(code) {
                                execute_command(command, app, Instant::now())?;
                            }
                        }
                    }
                }
            }
        }

        let now = Instant::now();
        receive_echoes(app, now);
        app.controller.poll(now);
        if app.controller.state() == SessionState::Disconnected {
            // auto-stop or timeout may have torn the session down
            app.channel = None;
        }
        render(app)?;

        std::thread::sleep(Duration::from_millis(1));
    }

    Ok(())
}

fn receive_echoes(app: &mut App, now: Instant) {
    let Some(channel) = app.channel.clone() else {
        return;
    };
    loop {
        let payload = channel.borrow_mut().try_recv();
        let Some(payload) = payload else {
            break;
        };
        app.controller.handle_message(&payload, now);
    }
}

fn render(app: &App) -> Result<()> {
    let mut out = stdout();
    out.execute(cursor::SavePosition)?;
    out.execute(cursor::MoveTo(0, 4))?;
    out.execute(terminal::Clear(terminal::ClearType::FromCursorDown))?;

    let controller = &app.controller;
    let stats = controller.stats();
    let averages = controller.recent_averages();

    let mut output = String::new();
    output.push_str(&format!("State: {:?}", controller.state()));
    if let Some(id) = controller.session_id() {
        output.push_str(&format!(" | session {id}"));
    }
    if controller.collection_enabled() {
        output.push_str(" | collecting");
    }
    output.push_str("\r\n");

    output.push_str(&format!(
        "Probes: sent={} received={} lost={}\r\n",
        stats.total_sent, stats.total_received, stats.total_lost
    ));
    output.push_str(&format!(
        "Latency: last={} avg={} jitter={}\r\n",
        fmt_ms(stats.last_latency_ms),
        fmt_ms(stats.average_latency_ms),
        fmt_ms(stats.jitter_ms)
    ));
    output.push_str(&format!(
        "Window: loss={} latency={} jitter={} | MOS {}\r\n",
        fmt_pct(averages.packet_loss_percent),
        fmt_ms(averages.average_latency_ms),
        fmt_ms(averages.average_jitter_ms),
        controller
            .mos()
            .map(|mos| format!("{mos:.2}"))
            .unwrap_or_else(|| "-".to_string())
    ));

    if let Some(message) = controller.status_message() {
        output.push_str(&format!("Status: {message}\r\n"));
    }
    if let Some(message) = controller.error_message() {
        output.push_str(&format!("Error: {message}\r\n"));
    }

    output.push_str("\r\nRecent samples:\r\n");
    for sample in stats.history.iter().rev().take(5) {
        let status = match sample.status {
            SampleStatus::Received => "received",
            SampleStatus::Lost => "lost",
        };
        output.push_str(&format!(
            "  #{:<6} {:<8} {:>10} at {}\r\n",
            sample.seq,
            status,
            fmt_ms(sample.latency_ms),
            sample.at.format("%H:%M:%S")
        ));
    }

    print!("{output}");
    out.flush()?;
    out.execute(cursor::RestorePosition)?;
    Ok(())
}

fn fmt_ms(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1}ms"))
        .unwrap_or_else(|| "-".to_string())
}

fn fmt_pct(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1}%"))
        .unwrap_or_else(|| "-".to_string())
}
