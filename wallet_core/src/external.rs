//! Delegation of the private-key step to an external device.
//!
//! The device side owns the receiving half of a channel and answers each
//! [`DeviceRequest`] through its one-shot reply slot.

use crate::error::WalletError;
use crate::signer::{ProducedSignature, SignRequest, SigningBackend};
use async_trait::async_trait;
use bitcoin::secp256k1::PublicKey;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(120);

/// A request forwarded to the device.
#[derive(Debug)]
pub struct DeviceRequest {
    pub request: SignRequest,
    pub reply: oneshot::Sender<Result<ProducedSignature, String>>,
}

/// [`SigningBackend`] that forwards every request to a device task.
#[derive(Clone, Debug)]
pub struct ExternalSigner {
    public_key: PublicKey,
    requests: mpsc::Sender<DeviceRequest>,
    timeout: Duration,
}

impl ExternalSigner {
    /// Create a signer and the device-side receiver.
    pub fn channel(
        public_key: PublicKey,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<DeviceRequest>) {
        let (requests, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                public_key,
                requests,
                timeout: DEFAULT_DEVICE_TIMEOUT,
            },
            rx,
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SigningBackend for ExternalSigner {
    fn public_key(&self) -> PublicKey {
        self.public_key
    }

    async fn sign(&self, request: SignRequest) -> Result<ProducedSignature, WalletError> {
        let (reply, response) = oneshot::channel();
        let input = request.input_index;
        self.requests
            .send(DeviceRequest { request, reply })
            .await
            .map_err(|_| WalletError::Device("device disconnected".into()))?;
        debug!(input, "signature requested from device");

        match tokio::time::timeout(self.timeout, response).await {
            Err(_) => Err(WalletError::Device(format!(
                "no answer within {}s",
                self.timeout.as_secs()
            ))),
            Ok(Err(_)) => Err(WalletError::Device("device dropped the request".into())),
            Ok(Ok(Err(reason))) => Err(WalletError::Device(format!("rejected: {reason}"))),
            Ok(Ok(Ok(signature))) => Ok(signature),
        }
    }
}
