// ============================================
// File: crates/tether-probe/src/probe.rs
// ============================================
//! # Reconnect-Cycle Probe
//!
//! ## Creation Reason
//! Exercises a chain the way an application would: connect, exchange one
//! message, close, and again. Every cycle reuses the same chain objects, so
//! a leak or a stale session shows up as a failing later cycle.
//!
//! ## Cycle
//! ```text
//!   connect ──► Connected ──► write ──► read (optional) ──► close
//!      │
//!      ├──► Redirect(code, location) ──► close (record location)
//!      │
//!      └──► Err ──► close (best effort, record error)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A failed cycle never aborts the run; the next cycle reconnects
//! - Redirects are reported, not followed
//!
//! ## Last Modified
//! v0.1.0 - Initial probe runner

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use tether_common::time::millis;
use tether_transport::{ConnectStatus, ErrorRecord, TransportHandle};

use crate::config::ProbeSettings;
use crate::target::Target;

// ============================================
// Outcomes
// ============================================

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Session established and the exchange completed.
    Connected {
        /// Payload bytes written
        sent: usize,
        /// Payload bytes read (0 when no reply was expected)
        received: usize,
    },
    /// Peer answered with a redirect.
    Redirected {
        /// Status code
        code: u16,
        /// Target location
        location: String,
    },
    /// Connect or exchange failed.
    Failed {
        /// Error message
        error: String,
    },
}

/// Aggregated results of a probe run.
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    /// Cycles attempted.
    pub cycles: u32,
    /// Cycles that completed an exchange.
    pub connected: u32,
    /// Cycles answered with a redirect.
    pub redirected: u32,
    /// Cycles that failed.
    pub failed: u32,
    /// Total payload bytes written.
    pub bytes_sent: usize,
    /// Total payload bytes read.
    pub bytes_received: usize,
    /// Last redirect target seen.
    pub last_redirect: Option<String>,
    /// Last error recorded in the chain's error context.
    pub last_error: Option<ErrorRecord>,
    /// Wall time of the whole run.
    pub elapsed: Duration,
}

impl ProbeReport {
    fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Connected { sent, received } => {
                self.connected += 1;
                self.bytes_sent += sent;
                self.bytes_received += received;
            }
            CycleOutcome::Redirected { location, .. } => {
                self.redirected += 1;
                self.last_redirect = Some(location.clone());
            }
            CycleOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Returns `true` if every cycle completed an exchange.
    #[must_use]
    pub const fn all_connected(&self) -> bool {
        self.cycles > 0 && self.connected == self.cycles
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cycles:      {}", self.cycles)?;
        writeln!(f, "Connected:   {}", self.connected)?;
        writeln!(f, "Redirected:  {}", self.redirected)?;
        writeln!(f, "Failed:      {}", self.failed)?;
        writeln!(f, "Sent:        {} bytes", self.bytes_sent)?;
        writeln!(f, "Received:    {} bytes", self.bytes_received)?;
        if let Some(location) = &self.last_redirect {
            writeln!(f, "Redirect:    {location}")?;
        }
        if let Some(record) = &self.last_error {
            writeln!(f, "Last error:  [{}] {}", record.layer, record.message)?;
        }
        write!(f, "Elapsed:     {}ms", millis(self.elapsed))
    }
}

// ============================================
// Prober
// ============================================

/// Runs connect → exchange → close cycles against one chain.
#[derive(Debug)]
pub struct Prober<'a> {
    transport: &'a TransportHandle,
    target: &'a Target,
    settings: &'a ProbeSettings,
}

impl<'a> Prober<'a> {
    /// Creates a prober for the application-facing node of a chain.
    #[must_use]
    pub const fn new(transport: &'a TransportHandle, target: &'a Target, settings: &'a ProbeSettings) -> Self {
        Self {
            transport,
            target,
            settings,
        }
    }

    /// Runs `cycles` cycles and returns the aggregated report.
    pub async fn run(&self, cycles: u32) -> ProbeReport {
        let started = Instant::now();
        let mut report = ProbeReport::default();
        self.transport.errors().clear();

        for cycle in 1..=cycles {
            let outcome = self.cycle().await;
            match &outcome {
                CycleOutcome::Failed { error } => warn!(cycle, %error, "Cycle failed"),
                other => debug!(cycle, outcome = ?other, "Cycle finished"),
            }
            report.record(&outcome);

            if cycle < cycles && !self.settings.pause().is_zero() {
                tokio::time::sleep(self.settings.pause()).await;
            }
        }

        report.last_error = self.transport.last_error();
        report.elapsed = started.elapsed();
        info!(
            cycles = report.cycles,
            connected = report.connected,
            failed = report.failed,
            elapsed_ms = millis(report.elapsed),
            "Probe run finished"
        );
        report
    }

    /// Runs a single cycle. The chain is closed afterwards in every case.
    pub async fn cycle(&self) -> CycleOutcome {
        let outcome = match self
            .transport
            .connect(&self.target.host, self.target.port, self.settings.connect_timeout())
            .await
        {
            Ok(ConnectStatus::Connected) => self.exchange().await,
            Ok(ConnectStatus::Redirect { code, location }) => CycleOutcome::Redirected { code, location },
            Err(e) => CycleOutcome::Failed { error: e.to_string() },
        };

        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "Close after cycle failed");
        }
        outcome
    }

    async fn exchange(&self) -> CycleOutcome {
        let timeout = self.settings.io_timeout();
        let message = self.settings.message.as_bytes();

        let sent = match self.transport.write(message, timeout).await {
            Ok(n) => n,
            Err(e) => return CycleOutcome::Failed { error: e.to_string() },
        };

        if !self.settings.expect_reply {
            return CycleOutcome::Connected { sent, received: 0 };
        }

        let mut buf = vec![0u8; message.len().max(512)];
        match self.transport.read(&mut buf, timeout).await {
            Ok(0) => CycleOutcome::Failed {
                error: "peer closed before replying".to_string(),
            },
            Ok(received) => CycleOutcome::Connected { sent, received },
            Err(e) => CycleOutcome::Failed { error: e.to_string() },
        }
    }
}

// ============================================
// Tests
// ============================================
