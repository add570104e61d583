//! Inactivity monitoring
//!
//! One background task per active session. User interaction re-arms a
//! per-role timer; an independent interval re-checks inactivity as a
//! backstop when no interaction arrives at all.

use crate::types::Role;
use std::fmt;
use std::future::Future;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Lets the per-role timer fire just past the timeout boundary
const TIMER_SLACK: Duration = Duration::from_secs(1);

/// User interactions that count as activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityEvent {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

pub const MONITORED_EVENTS: [ActivityEvent; 6] = [
    ActivityEvent::PointerDown,
    ActivityEvent::PointerMove,
    ActivityEvent::KeyPress,
    ActivityEvent::Scroll,
    ActivityEvent::TouchStart,
    ActivityEvent::Click,
];

impl fmt::Display for ActivityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PointerDown => "pointerdown",
            Self::PointerMove => "pointermove",
            Self::KeyPress => "keypress",
            Self::Scroll => "scroll",
            Self::TouchStart => "touchstart",
            Self::Click => "click",
        })
    }
}

/// Owner of the monitored session
pub trait ActivitySink: Send + Sync + 'static {
    fn is_inactive(&self, role: Role) -> bool;

    /// Called once when inactivity is detected; the monitor stops afterwards
    fn on_inactivity_timeout(&self, role: Role) -> impl Future<Output = ()> + Send;
}

/// Handle to a running monitor task
///
/// Dropping the handle closes the event channel, which stops the task.
pub struct ActivityMonitor {
    role: Role,
    events: mpsc::UnboundedSender<ActivityEvent>,
    task: JoinHandle<()>,
}

impl ActivityMonitor {
    /// Spawn a monitor on the current tokio runtime
    ///
    /// Returns `None` outside a runtime.
    pub fn spawn<S: ActivitySink>(
        sink: Weak<S>,
        role: Role,
        timeout: Duration,
        check_interval: Duration,
    ) -> Option<Self> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(role = %role, "No async runtime, inactivity monitoring disabled");
                return None;
            }
        };

        let (events, receiver) = mpsc::unbounded_channel();
        let task = handle.spawn(run(sink, role, timeout, check_interval, receiver));
        info!(
            role = %role,
            timeout_secs = %timeout.as_secs(),
            check_interval_secs = %check_interval.as_secs(),
            "Started inactivity monitor"
        );

        Some(Self { role, events, task })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Re-arm the inactivity timer
    pub fn notify(&self, event: ActivityEvent) {
        if self.events.send(event).is_err() {
            debug!(role = %self.role, "Activity monitor already stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

async fn run<S: ActivitySink>(
    sink: Weak<S>,
    role: Role,
    timeout: Duration,
    check_interval: Duration,
    mut events: mpsc::UnboundedReceiver<ActivityEvent>,
) {
    let mut deadline = Instant::now() + timeout + TIMER_SLACK;
    let mut backstop = interval_at(Instant::now() + check_interval, check_interval);
    backstop.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    trace!(role = %role, event = %event, "Activity");
                    deadline = Instant::now() + timeout + TIMER_SLACK;
                }
                None => break,
            },
            _ = sleep_until(deadline) => {
                if check(&sink, role).await {
                    break;
                }
                deadline = Instant::now() + timeout + TIMER_SLACK;
            }
            _ = backstop.tick() => {
                if check(&sink, role).await {
                    break;
                }
            }
        }
    }

    debug!(role = %role, "Inactivity monitor stopped");
}

/// Returns true when the monitor should stop
async fn check<S: ActivitySink>(sink: &Weak<S>, role: Role) -> bool {
    let Some(sink) = sink.upgrade() else {
        return true;
    };
    if !sink.is_inactive(role) {
        return false;
    }
    sink.on_inactivity_timeout(role).await;
    true
}
