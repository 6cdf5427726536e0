#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bon::Builder;

/// Subprotocol advertised by the plane.watch broker.
pub const DEFAULT_SUBPROTOCOL: &str = "planes";

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_HEARTBEAT_TIMEOUT_DURATION: Duration = Duration::from_secs(15);
const DEFAULT_RECONNECT_DELAY_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for WebSocket client behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Transport-level keepalive
    #[builder(default)]
    pub heartbeat: Heartbeat,
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
    /// Value sent in `Sec-WebSocket-Protocol`
    #[builder(into, default = DEFAULT_SUBPROTOCOL.to_owned())]
    pub subprotocol: String,
    /// Replay every locally subscribed tile once a dropped connection is re-established
    #[builder(default = true)]
    pub resubscribe_on_reconnect: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat: Heartbeat::default(),
            reconnect: ReconnectConfig::default(),
            subprotocol: DEFAULT_SUBPROTOCOL.to_owned(),
            resubscribe_on_reconnect: true,
        }
    }
}

/// WebSocket PING/PONG keepalive.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heartbeat {
    /// Never send PING frames; rely on the transport to report dead peers
    Disabled,
    /// Send a PING every `interval`, treat the connection as lost if no PONG
    /// arrives within `timeout`
    Enabled {
        /// Interval between PING frames
        interval: Duration,
        /// Maximum time to wait for the matching PONG
        timeout: Duration,
    },
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::Enabled {
            interval: DEFAULT_HEARTBEAT_INTERVAL_DURATION,
            timeout: DEFAULT_HEARTBEAT_TIMEOUT_DURATION,
        }
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Default, Builder)]
pub struct ReconnectConfig {
    /// Delay schedule between a close and the next connection attempt
    #[builder(default)]
    pub strategy: ReconnectStrategy,
    /// Maximum number of consecutive failed attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
}

/// Delay schedule used after a non-terminal close.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectStrategy {
    /// Wait the same amount of time before every attempt
    Fixed {
        /// Delay before each reconnect
        delay: Duration,
    },
    /// Capped exponential backoff with jitter
    Exponential {
        /// Initial backoff duration for first reconnection attempt
        initial: Duration,
        /// Maximum backoff duration
        max: Duration,
        /// Multiplier for exponential backoff
        multiplier: f64,
    },
}

impl ReconnectStrategy {
    /// Fixed delay between attempts.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self::Fixed { delay }
    }

    /// Exponential backoff starting at one second, doubling up to a minute.
    #[must_use]
    pub const fn exponential() -> Self {
        Self::Exponential {
            initial: DEFAULT_INITIAL_BACKOFF_DURATION,
            max: DEFAULT_MAX_BACKOFF_DURATION,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl Default for ReconnectStrategy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY_DURATION)
    }
}

impl From<ReconnectStrategy> for Box<dyn Backoff + Send> {
    fn from(strategy: ReconnectStrategy) -> Self {
        match strategy {
            ReconnectStrategy::Fixed { delay } => Box::new(Constant::new(delay)),
            ReconnectStrategy::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let backoff: ExponentialBackoff = ExponentialBackoffBuilder::default()
                    .with_initial_interval(initial)
                    .with_max_interval(max)
                    .with_multiplier(multiplier)
                    .with_max_elapsed_time(None) // We handle max attempts separately
                    .build();
                Box::new(backoff)
            }
        }
    }
}
