use std::env;
use std::io::{Error, ErrorKind, Result};

pub struct ClientArgs {
    pub server_addr: String,
    pub interval_ms: Option<u64>,
    pub collect: bool,
}

pub fn parse_args() -> Result<ClientArgs> {
    let mut server = String::from("127.0.0.1");
    let mut port: u16 = 8080;
    let mut interval_ms = None;
    let mut collect = false;
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-s" | "--server" => {
                let value = args.next().ok_or_else(|| {
                    Error::new(ErrorKind::InvalidInput, "missing value for -s/--server")
                })?;
                server = value;
            }
            "-p" | "--port" => {
                let value = args.next().ok_or_else(|| {
                    Error::new(ErrorKind::InvalidInput, "missing value for -p/--port")
                })?;
                port = value.parse::<u16>().map_err(|_| {
                    Error::new(ErrorKind::InvalidInput, format!("invalid port: {value}"))
                })?;
            }
            "-i" | "--interval" => {
                let value = args.next().ok_or_else(|| {
                    Error::new(ErrorKind::InvalidInput, "missing value for -i/--interval")
                })?;
                let parsed = value.parse::<u64>().map_err(|_| {
                    Error::new(
                        ErrorKind::InvalidInput,
                        format!("invalid interval: {value}"),
                    )
                })?;
                interval_ms = Some(parsed);
            }
            "-c" | "--collect" => {
                collect = true;
            }
            "-h" | "--help" => {
                println!(
                    "Usage: probe [-s|--server <host>] [-p|--port <port>] [-i|--interval <ms>] [-c|--collect]"
                );
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

    Ok(ClientArgs {
        server_addr: format!("{server}:{port}"),
        interval_ms,
        collect,
    })
}
