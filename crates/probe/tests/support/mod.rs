#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use probe::{ChannelError, ChannelHandle, Clock, ProbeChannel};

/// In-memory channel recording every sent payload; tests feed payloads back
/// through `handle_message` to simulate the reflector's byte-exact echo.
pub struct FakeChannel {
    pub open: bool,
    pub fail_sends: bool,
    pub fail_close: bool,
    pub sent: Vec<String>,
    pub close_calls: u32,
}

impl FakeChannel {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            open: true,
            fail_sends: false,
            fail_close: false,
            sent: Vec::new(),
            close_calls: 0,
        }))
    }
}

impl ProbeChannel for FakeChannel {
    fn is_open(&self) -> bool {
        self.open
    }

    fn send(&mut self, payload: &str) -> Result<(), ChannelError> {
        if self.fail_sends {
            return Err(ChannelError::Io(std::io::Error::other(
                "synthetic send failure",
            )));
        }
        self.sent.push(payload.to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.close_calls += 1;
        self.open = false;
        if self.fail_close {
            return Err(ChannelError::Closed);
        }
        Ok(())
    }
}

pub fn handle(channel: &Rc<RefCell<FakeChannel>>) -> ChannelHandle {
    channel.clone()
}

pub fn test_clock(base: Instant) -> Clock {
    Clock::fixed(base, Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap())
}

pub fn at(base: Instant, ms: u64) -> Instant {
    base + Duration::from_millis(ms)
}

pub fn sent_payload(channel: &Rc<RefCell<FakeChannel>>, index: usize) -> String {
    channel.borrow().sent[index].clone()
}
