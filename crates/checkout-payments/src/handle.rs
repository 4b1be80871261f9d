//! Checkout Handle
//!
//! Mounts a checkout as a tokio task and exposes it to the UI: commands go
//! in through [`CheckoutHandle::send`], state comes out as [`CheckoutView`]
//! snapshots on a `watch` channel.
//!
//! The task supervises the state machine. A panic inside it is caught,
//! reported and rendered as the fault step, from which the payer can
//! refresh (remount) or go back.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use checkout_core::CheckoutError;
use futures::FutureExt;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::machine::{
    CheckoutCommand, CheckoutMachine, CheckoutStep, CheckoutView, Exit, FAULT_MESSAGE,
};
use crate::services::CheckoutServices;

/// Control surface of a mounted checkout
#[derive(Debug)]
pub struct CheckoutHandle {
    commands: mpsc::UnboundedSender<CheckoutCommand>,
    view: watch::Receiver<CheckoutView>,
    task: JoinHandle<()>,
}

impl CheckoutHandle {
    /// Mount the checkout for `payment_id`
    pub fn mount(services: CheckoutServices, payment_id: impl Into<String>) -> Self {
        let payment_id = payment_id.into();
        let (commands, rx) = mpsc::unbounded_channel();
        let (view_tx, view) = watch::channel(CheckoutView {
            payment_id: payment_id.clone(),
            ..CheckoutView::default()
        });

        tracing::info!(payment_id, "Mounting checkout");
        let task = tokio::spawn(supervise(services, payment_id, Arc::new(view_tx), rx));
        Self {
            commands,
            view,
            task,
        }
    }

    /// Queue a command; `false` once the checkout has shut down
    pub fn send(&self, command: CheckoutCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Current state
    pub fn view(&self) -> CheckoutView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CheckoutView> {
        self.view.clone()
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&CheckoutView) -> bool,
    ) -> Option<CheckoutView> {
        let mut view = self.view.clone();
        let result = view.wait_for(predicate).await;
        result.ok().map(|v| v.clone())
    }

    /// Remount from scratch
    pub fn refresh(&self) -> bool {
        self.send(CheckoutCommand::Reload)
    }

    /// Step back inside the checkout, or leave it
    pub fn go_back(&self) -> bool {
        if self.view.borrow().step == CheckoutStep::BankDetails {
            self.send(CheckoutCommand::Back)
        } else {
            self.send(CheckoutCommand::NavigateBack)
        }
    }

    /// Stop the checkout and wait for its cleanup to finish
    pub async fn unmount(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Checkout task ended abnormally");
        }
    }
}

async fn supervise(
    services: CheckoutServices,
    payment_id: String,
    view_tx: Arc<watch::Sender<CheckoutView>>,
    mut commands: mpsc::UnboundedReceiver<CheckoutCommand>,
) {
    loop {
        let machine = CheckoutMachine::new(services.clone(), payment_id.clone(), view_tx.clone());

        match AssertUnwindSafe(machine.run(&mut commands)).catch_unwind().await {
            Ok(Exit::Unmounted) => return,
            Ok(Exit::Reload) => {}
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                tracing::error!(payment_id, detail, "Checkout crashed");
                services.diagnostics.report_error(
                    &CheckoutError::Other(detail),
                    json!({ "context": "checkout_fault", "paymentId": payment_id }),
                );
                view_tx.send_modify(|view| {
                    view.step = CheckoutStep::Fault;
                    view.error = Some(FAULT_MESSAGE.into());
                    view.is_verifying = false;
                    view.is_submitting = false;
                    view.redirect_to = None;
                });

                loop {
                    match commands.recv().await {
                        None => return,
                        Some(CheckoutCommand::Reload) => break,
                        Some(CheckoutCommand::NavigateBack | CheckoutCommand::Back) => {
                            services.navigator.back();
                        }
                        Some(_) => {}
                    }
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".into())
}
