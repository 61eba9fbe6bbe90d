//! Nullable hardware signer: answers [`DeviceRequest`]s from a task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tandem_wallet_core::{DeviceRequest, ExternalSigner, KeyHandle, LocalSigner, SigningBackend};
use tokio::task::JoinHandle;

/// How the simulated device responds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceBehavior {
    Approve,
    Reject,
    /// Drop every request without answering.
    Ignore,
}

/// A device task plus the [`ExternalSigner`] that talks to it.
pub struct NullDevice {
    signer: ExternalSigner,
    requests: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl NullDevice {
    /// Spawn a device holding `key`. Must be called inside a tokio runtime.
    pub fn spawn(key: KeyHandle, behavior: DeviceBehavior) -> Self {
        let local = LocalSigner::new(key);
        let (signer, mut rx) = ExternalSigner::channel(local.public_key(), 8);
        let requests = Arc::new(AtomicUsize::new(0));
        let seen = requests.clone();
        let task = tokio::spawn(async move {
            while let Some(DeviceRequest { request, reply }) = rx.recv().await {
                seen.fetch_add(1, Ordering::SeqCst);
                let answer = match behavior {
                    DeviceBehavior::Approve => {
                        local.sign_digest(&request).map_err(|e| e.to_string())
                    }
                    DeviceBehavior::Reject => Err("user declined on device".to_string()),
                    DeviceBehavior::Ignore => continue,
                };
                let _ = reply.send(answer);
            }
        });
        Self {
            signer,
            requests,
            task,
        }
    }

    pub fn signer(&self) -> ExternalSigner {
        self.signer.clone()
    }

    /// Number of requests the device has received.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Unplug the device: pending and future requests fail.
    pub fn disconnect(&self) {
        self.task.abort();
    }
}

impl Drop for NullDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}
