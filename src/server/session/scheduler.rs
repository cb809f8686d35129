//! Shutdown scheduling for time-boxed sessions.
//!
//! A session's lifetime is fixed when it starts: the expiry instant is
//! computed once from the start time and the approved duration, and a timer
//! armed at session start forces the session closed at that instant
//! regardless of in-flight traffic.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Why a relay session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The scheduler's expiry timer fired.
    Expired,

    /// The client closed its connection.
    ClientDisconnect,

    /// The backend closed its connection.
    BackendDisconnect,

    /// Framing or protocol violation on either stream.
    Protocol(String),

    /// The audit sink refused a statement; the session fails closed.
    AuditFailure(String),

    /// I/O error during relay.
    Io(String),
}

impl DisconnectReason {
    /// Human-readable description for logs.
    pub fn message(&self) -> String {
        match self {
            Self::Expired => "session duration elapsed".to_string(),
            Self::ClientDisconnect => "client disconnected".to_string(),
            Self::BackendDisconnect => "backend disconnected".to_string(),
            Self::Protocol(e) => format!("protocol error: {}", e),
            Self::AuditFailure(e) => format!("audit failure: {}", e),
            Self::Io(e) => format!("I/O error: {}", e),
        }
    }
}

/// Compute the absolute expiry instant for a session.
///
/// Calendar-correct addition: rolls over day, month, and year boundaries.
pub fn compute_expiry(start_time: DateTime<Utc>, duration_minutes: i64) -> DateTime<Utc> {
    start_time + ChronoDuration::minutes(duration_minutes)
}

/// Whether a session that started at `start_time` has already expired.
///
/// A non-positive duration counts as expired: a session must be granted
/// time to exist at all.
pub fn is_session_expired(start_time: DateTime<Utc>, duration_minutes: i64) -> bool {
    duration_minutes <= 0 || Utc::now() > compute_expiry(start_time, duration_minutes)
}

/// Arms the expiry timer for one session and signals the relay to close.
///
/// The disconnect channel is single-shot: the first of timer expiry or an
/// explicit trigger wins, later triggers are no-ops. Dropping the scheduler
/// aborts a still-pending timer.
pub struct ShutdownScheduler {
    session_id: Uuid,
    expiry: Option<DateTime<Utc>>,
    disconnect_tx: Option<oneshot::Sender<DisconnectReason>>,
    disconnect_rx: Option<oneshot::Receiver<DisconnectReason>>,
    timer_task: Option<JoinHandle<()>>,
}

impl ShutdownScheduler {
    /// Create an unarmed scheduler.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            session_id: Uuid::new_v4(),
            expiry: None,
            disconnect_tx: Some(tx),
            disconnect_rx: Some(rx),
            timer_task: None,
        }
    }

    /// The armed expiry instant, if the timer has been armed.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    /// Time left until expiry; zero once past it, `None` before arming.
    pub fn remaining(&self) -> Option<ChronoDuration> {
        self.expiry
            .map(|expiry| (expiry - Utc::now()).max(ChronoDuration::zero()))
    }

    /// The session id this scheduler belongs to.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Arm the expiry timer.
    ///
    /// Fires `DisconnectReason::Expired` at
    /// `compute_expiry(start_time, duration_minutes)`; immediately if that
    /// instant is already past or the duration is non-positive.
    pub fn arm(&mut self, start_time: DateTime<Utc>, duration_minutes: i64) {
        let Some(tx) = self.disconnect_tx.take() else {
            return;
        };

        let session_id = self.session_id;
        let expiry = compute_expiry(start_time, duration_minutes);
        self.expiry = Some(expiry);
        let remaining = (expiry - Utc::now()).to_std().unwrap_or_default();
        let already_expired = is_session_expired(start_time, duration_minutes);

        let task = tokio::spawn(async move {
            if !already_expired {
                tokio::time::sleep(remaining).await;
            }
            info!(
                session_id = %session_id,
                expiry = %expiry,
                "Session expiry reached, forcing close"
            );
            let _ = tx.send(DisconnectReason::Expired);
        });

        self.timer_task = Some(task);
        debug!(
            session_id = %session_id,
            expiry = %expiry,
            "Expiry timer armed"
        );
    }

    /// Take the disconnect receiver for the relay loop to monitor.
    ///
    /// Returns `None` if already taken.
    pub fn take_disconnect_rx(&mut self) -> Option<oneshot::Receiver<DisconnectReason>> {
        self.disconnect_rx.take()
    }

    /// Signal an immediate disconnect with the given reason.
    ///
    /// No-op if the timer already fired or a trigger was already sent.
    pub fn trigger_disconnect(&mut self, reason: DisconnectReason) {
        if let Some(task) = self.timer_task.take() {
            task.abort();
        }
        if let Some(tx) = self.disconnect_tx.take() {
            info!(
                session_id = %self.session_id,
                reason = %reason.message(),
                "Disconnect triggered"
            );
            let _ = tx.send(reason);
        }
    }

    /// Cancel the timer without signaling.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.timer_task.take() {
            task.abort();
        }
        self.disconnect_tx.take();
    }
}

impl Drop for ShutdownScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse::<DateTime<Utc>>().unwrap()
    }

    #[test]
    fn test_compute_expiry_simple() {
        assert_eq!(
            compute_expiry(utc("1999-04-28T08:24:00Z"), 30),
            utc("1999-04-28T08:54:00Z")
        );
        assert_eq!(
            compute_expiry(utc("1970-01-01T00:00:00Z"), 1),
            utc("1970-01-01T00:01:00Z")
        );
    }

    #[test]
    fn test_compute_expiry_rolls_over_day() {
        assert_eq!(
            compute_expiry(utc("2010-10-10T15:00:00Z"), 720),
            utc("2010-10-11T03:00:00Z")
        );
        assert_eq!(
            compute_expiry(utc("2020-09-24T18:00:00Z"), 1440),
            utc("2020-09-25T18:00:00Z")
        );
    }

    #[test]
    fn test_compute_expiry_rolls_over_month_and_year() {
        assert_eq!(
            compute_expiry(utc("2021-01-31T23:45:00Z"), 30),
            utc("2021-02-01T00:15:00Z")
        );
        assert_eq!(
            compute_expiry(utc("1999-12-31T23:59:00Z"), 2),
            utc("2000-01-01T00:01:00Z")
        );
        // Leap day
        assert_eq!(
            compute_expiry(utc("2020-02-28T23:30:00Z"), 60),
            utc("2020-02-29T00:30:00Z")
        );
    }

    #[test]
    fn test_compute_expiry_against_timestamp_arithmetic() {
        let start = Utc.with_ymd_and_hms(2010, 10, 10, 1, 0, 0).unwrap();
        for minutes in [1i64, 60, 720, 1440, 525_600] {
            let expiry = compute_expiry(start, minutes);
            assert_eq!(expiry.timestamp() - start.timestamp(), minutes * 60);
        }
    }

    #[test]
    fn test_is_expired_nonpositive_duration() {
        assert!(is_session_expired(Utc::now(), 0));
        assert!(is_session_expired(Utc::now(), -1));
    }

    #[test]
    fn test_is_expired_past_and_future() {
        let now = Utc::now();
        assert!(is_session_expired(now - ChronoDuration::minutes(11), 10));
        assert!(!is_session_expired(now - ChronoDuration::minutes(9), 10));
        assert!(!is_session_expired(now, 10));
    }

    #[tokio::test]
    async fn test_timer_fires_on_short_duration() {
        let mut scheduler = ShutdownScheduler::new();
        let rx = scheduler.take_disconnect_rx().unwrap();

        // Start time far enough in the past that expiry is imminent
        scheduler.arm(Utc::now() - ChronoDuration::minutes(1), 1);

        let reason = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("timer did not fire")
            .expect("channel closed");
        assert_eq!(reason, DisconnectReason::Expired);
    }

    #[tokio::test]
    async fn test_timer_fires_immediately_when_already_expired() {
        let mut scheduler = ShutdownScheduler::new();
        let rx = scheduler.take_disconnect_rx().unwrap();

        scheduler.arm(Utc::now() - ChronoDuration::minutes(5), 1);

        let reason = tokio::time::timeout(Duration::from_millis(500), rx)
            .await
            .expect("timer did not fire")
            .expect("channel closed");
        assert_eq!(reason, DisconnectReason::Expired);
    }

    #[tokio::test]
    async fn test_trigger_disconnect_wins_over_timer() {
        let mut scheduler = ShutdownScheduler::new();
        let rx = scheduler.take_disconnect_rx().unwrap();

        scheduler.arm(Utc::now(), 60);
        scheduler.trigger_disconnect(DisconnectReason::ClientDisconnect);

        let reason = tokio::time::timeout(Duration::from_millis(500), rx)
            .await
            .expect("signal not delivered")
            .expect("channel closed");
        assert_eq!(reason, DisconnectReason::ClientDisconnect);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_timer() {
        let mut scheduler = ShutdownScheduler::new();
        let mut rx = scheduler.take_disconnect_rx().unwrap();

        scheduler.arm(Utc::now(), 60);
        scheduler.shutdown();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_trigger_after_shutdown_is_noop() {
        let mut scheduler = ShutdownScheduler::new();
        let _rx = scheduler.take_disconnect_rx().unwrap();
        scheduler.shutdown();
        scheduler.trigger_disconnect(DisconnectReason::ClientDisconnect);
        scheduler.shutdown();
    }

    #[test]
    fn test_take_disconnect_rx_once() {
        let mut scheduler = ShutdownScheduler::new();
        assert!(scheduler.take_disconnect_rx().is_some());
        assert!(scheduler.take_disconnect_rx().is_none());
    }

    #[tokio::test]
    async fn test_expiry_and_remaining_accessors() {
        let mut scheduler = ShutdownScheduler::new();
        assert!(scheduler.expiry().is_none());
        assert!(scheduler.remaining().is_none());

        let start = Utc::now();
        scheduler.arm(start, 30);
        assert_eq!(scheduler.expiry(), Some(compute_expiry(start, 30)));

        let remaining = scheduler.remaining().unwrap();
        assert!(remaining > ChronoDuration::minutes(29));
        assert!(remaining <= ChronoDuration::minutes(30));
    }

    #[tokio::test]
    async fn test_remaining_clamps_at_zero() {
        let mut scheduler = ShutdownScheduler::new();
        scheduler.arm(Utc::now() - ChronoDuration::minutes(10), 1);
        assert_eq!(scheduler.remaining(), Some(ChronoDuration::zero()));
    }
}
