use std::io::Result;
use std::time::Instant;

use crossterm::event::KeyCode;
use probe::{DisconnectOptions, DisconnectReason};

use crate::App;

pub enum InputCommand {
    Connect,
    Disconnect,
    ResetStats,
    ToggleCollection,
}

pub fn handle_input(key: KeyCode) -> Option<InputCommand> {
    match key {
        KeyCode::Char('c') => Some(InputCommand::Connect),
        KeyCode::Char('d') => Some(InputCommand::Disconnect),
        KeyCode::Char('r') => Some(InputCommand::ResetStats),
        KeyCode::Char('m') => Some(InputCommand::ToggleCollection),
        _ => None,
    }
}

pub fn execute_command(command: InputCommand, app: &mut App, now: Instant) -> Result<()> {
    match command {
        InputCommand::Connect => app.connect(now),
        InputCommand::Disconnect => {
            app.controller
                .disconnect(DisconnectReason::Manual, DisconnectOptions::default(), now);
            app.channel = None;
            Ok(())
        }
        InputCommand::ResetStats => {
            app.controller.reset_stats();
            Ok(())
        }
        InputCommand::ToggleCollection => {
            let enabled = !app.controller.collection_enabled();
            app.controller.set_collection_mode(enabled);
            Ok(())
        }
    }
}
