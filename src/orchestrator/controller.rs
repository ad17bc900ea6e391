//! Command loop between presentation layers and the acquisition controller.
//!
//! UI layers send [`UiCommand`]s; this loop serializes them onto one
//! [`AcquisitionController`] and reports rejections back as [`InfoEvent`]s.
//! Session state itself flows through the controller's `watch` channel.

use super::acquisition::AcquisitionController;
use crate::engine::Command;
use crate::error::SessionError;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub enum UiCommand {
    Submit(Command),
    Quit,
}

/// Out-of-band messages that are not part of the session state.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoEvent {
    Message(String),
}

impl InfoEvent {
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(m) => m.clone(),
        }
    }
}

/// Drive `controller` from UI commands until `Quit` or the sender is dropped.
///
/// A command arriving while another is still running is rejected with a busy
/// message rather than queued.
pub async fn run_controller(
    controller: AcquisitionController,
    info_tx: UnboundedSender<InfoEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) {
    let controller = Arc::new(Mutex::new(controller));
    let mut active: Option<JoinHandle<()>> = None;

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            UiCommand::Submit(command) => {
                let Ok(mut ctrl) = controller.clone().try_lock_owned() else {
                    tracing::warn!(command = command.name(), "rejected: operation in progress");
                    let _ = info_tx.send(InfoEvent::Message(
                        SessionError::busy(command.name()).to_string(),
                    ));
                    continue;
                };
                let info_tx = info_tx.clone();
                active = Some(tokio::spawn(async move {
                    let res = if command.is_acquisition() {
                        let estimate = command.estimated_millis();
                        ctrl.run(command, estimate).await
                    } else {
                        ctrl.execute(command).await
                    };
                    if let Err(e) = res {
                        let _ = info_tx.send(InfoEvent::Message(e.to_string()));
                    }
                }));
            }
            UiCommand::Quit => break,
        }
    }

    // Abandoning the run only drops the local animation; the external call
    // finishes on its own and settles the session.
    if let Some(handle) = active.take() {
        handle.abort();
        let _ = handle.await;
    }
    controller.lock().await.teardown();
}
