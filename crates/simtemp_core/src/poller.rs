//! Task de polling em background para a GUI.
//!
//! Roda o [`Monitor`] com espera curta numa thread própria, escrevendo no
//! [`LiveState`]. Eventos de término vão para a UI por um channel.

use std::io;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, bounded};
use tracing::{error, info};

use crate::alerts::AlertTracker;
use crate::device::{CancelToken, RawDevice, Session};
use crate::live::LiveState;
use crate::monitor::{Monitor, MonitorSummary};

/// Intervalo padrão de espera por iteração.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Mensagem enviada da thread de polling para a UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerEvent {
    Stopped(MonitorSummary),
    Fatal(String),
}

/// Handle da thread de polling. Parar (ou dropar) cancela e aguarda a thread.
pub struct PollerHandle {
    cancel: CancelToken,
    events: Receiver<PollerEvent>,
    thread: Option<JoinHandle<()>>,
}

/// Inicia a thread de polling sobre uma sessão já aberta.
pub fn spawn_poller<D: RawDevice + 'static>(
    session: Session<D>,
    state: LiveState,
    interval: Duration,
) -> io::Result<PollerHandle> {
    let cancel = CancelToken::new()?;
    let (tx, rx) = bounded::<PollerEvent>(4);
    let thread_cancel = cancel.clone();

    let thread = std::thread::Builder::new()
        .name("simtemp-poller".into())
        .spawn(move || {
            let mut sink = state;
            let mut tracker = AlertTracker::new();
            let event = match Monitor::with_wait_interval(interval).run(
                session,
                &mut tracker,
                &mut sink,
                &thread_cancel,
            ) {
                Ok(summary) => PollerEvent::Stopped(summary),
                Err(e) => {
                    error!("Thread de polling encerrada: {e}");
                    PollerEvent::Fatal(e.to_string())
                }
            };
            // UI já pode ter ido embora.
            let _ = tx.try_send(event);
        })?;

    info!("Thread de polling iniciada (intervalo {interval:?})");
    Ok(PollerHandle {
        cancel,
        events: rx,
        thread: Some(thread),
    })
}

impl PollerHandle {
    pub fn events(&self) -> &Receiver<PollerEvent> {
        &self.events
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Cancela e aguarda a thread.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Thread de polling terminou em pânico");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
