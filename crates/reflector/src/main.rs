use std::env;
use std::io::{Error, ErrorKind, Result};
use std::net::UdpSocket;

use common::WireMessage;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn parse_bind_args() -> Result<String> {
    let mut host = String::from("0.0.0.0");
    let mut port: u16 = 8080;
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-b" | "--bind" => {
                let value = args.next().ok_or_else(|| {
                    Error::new(ErrorKind::InvalidInput, "missing value for -b/--bind")
                })?;
                host = value;
            }
            "-p" | "--port" => {
                let value = args.next().ok_or_else(|| {
                    Error::new(ErrorKind::InvalidInput, "missing value for -p/--port")
                })?;
                port = value.parse::<u16>().map_err(|_| {
                    Error::new(ErrorKind::InvalidInput, format!("invalid port: {value}"))
                })?;
            }
            "-h" | "--help" => {
                println!("Usage: reflector [-b|--bind <host>] [-p|--port <port>]");
                std::process::exit(0);
            }
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("unknown argument: {arg}"),
                ));
            }
        }
    }

    Ok(format!("{host}:{port}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = parse_bind_args()?;
    let socket = UdpSocket::bind(&addr)?;
    info!(%addr, "reflector listening");

    let mut buf = [0u8; 2048];
    loop {
        let (amt, src) = socket.recv_from(&mut buf)?;

        // The contract is a byte-exact echo of whatever arrives; decoding is
        // only for the log line.
        if let Ok(payload) = std::str::from_utf8(&buf[..amt]) {
            if let Ok(WireMessage::LatencyProbe { seq, .. }) = common::decode_message(payload) {
                debug!(seq, %src, "echoing probe");
            }
        }

        if let Err(error) = socket.send_to(&buf[..amt], src) {
            warn!(%error, %src, "echo failed");
        }
    }
}
