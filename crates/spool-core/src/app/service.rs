//! SiteToSiteService - async entry points over the blocking client.
//!
//! Every call runs the client on tokio's blocking pool and resolves to an
//! explicit `Result`, so async callers never stall a runtime worker on store
//! or network I/O.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinError;

use super::{QueueStatus, QueuedSiteToSiteClient};
use crate::domain::{BatchOutcome, DataPacket, PurgeCount, QueueError, TransactionResult};
use crate::ports::TransferError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("blocking task failed: {0}")]
    Join(#[from] JoinError),
}

#[derive(Clone)]
pub struct SiteToSiteService {
    client: Arc<QueuedSiteToSiteClient>,
}

impl SiteToSiteService {
    pub fn new(client: Arc<QueuedSiteToSiteClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<QueuedSiteToSiteClient> {
        &self.client
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(&QueuedSiteToSiteClient) -> Result<T, ServiceError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || work(&client)).await?
    }

    /// Send one packet now, without queueing it.
    pub async fn send_packet(&self, packet: DataPacket) -> Result<TransactionResult, ServiceError> {
        self.send_packets(vec![packet]).await
    }

    pub async fn send_packets(
        &self,
        packets: Vec<DataPacket>,
    ) -> Result<TransactionResult, ServiceError> {
        self.run_blocking(move |client| Ok(client.send_now(&packets)?))
            .await
    }

    pub async fn enqueue_packet(&self, packet: DataPacket) -> Result<(), ServiceError> {
        self.run_blocking(move |client| Ok(client.enqueue(packet)?))
            .await
    }

    pub async fn enqueue_packets(&self, packets: Vec<DataPacket>) -> Result<(), ServiceError> {
        self.run_blocking(move |client| Ok(client.enqueue_all(packets)?))
            .await
    }

    pub async fn process_queued_packets(&self) -> Result<BatchOutcome, ServiceError> {
        self.run_blocking(|client| Ok(client.process()?)).await
    }

    pub async fn cleanup_queued_packets(&self) -> Result<PurgeCount, ServiceError> {
        self.run_blocking(|client| Ok(client.cleanup()?)).await
    }

    pub async fn status(&self) -> Result<QueueStatus, ServiceError> {
        self.run_blocking(|client| Ok(client.status()?)).await
    }
}
