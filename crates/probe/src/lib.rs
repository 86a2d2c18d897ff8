pub mod aggregator;
pub mod channel;
pub mod clock;
pub mod export;
pub mod probe;
pub mod session;
pub mod timer;

pub use aggregator::{AggregatorConfig, QualityAggregator};
pub use channel::{ChannelError, ChannelHandle, ProbeChannel, UdpChannel};
pub use clock::Clock;
pub use probe::{LatencyProbe, ProbeConfig};
pub use session::{
    DisconnectOptions, DisconnectReason, SessionConfig, SessionController, SessionState,
};
pub use timer::PeriodicTimer;
