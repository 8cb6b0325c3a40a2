//! The worker owns the only store connection. Everything else talks to it
//! through [`WorkerHandle`], one request at a time.

use std::path::Path;

use tokio::sync::{mpsc, oneshot};
use tokio::task;

use crate::db::{Repository, MIGRATIONS};
use crate::error::{AppError, Result};
use crate::models::{
    FeedConfig, FeedConfigData, FeedConfigForm, FeedConfigFull, FeedEntryMetadata,
};

mod lines;
mod protocol;

pub use lines::serve_lines;
pub use protocol::{Request, Response};

const QUEUE_SIZE: usize = 100;

struct Envelope {
    request: Request,
    reply: oneshot::Sender<Response>,
}

pub struct Worker {
    repository: Repository,
    rx: mpsc::Receiver<Envelope>,
    allow_dev_ops: bool,
}

impl Worker {
    /// Starts the dispatch loop on an already opened store.
    pub fn spawn(repository: Repository, allow_dev_ops: bool) -> WorkerHandle {
        let (tx, rx) = mpsc::channel(QUEUE_SIZE);

        let worker = Self {
            repository,
            rx,
            allow_dev_ops,
        };
        task::spawn(worker.loop_task());

        WorkerHandle { queue: tx }
    }

    async fn loop_task(mut self) {
        while let Some(Envelope { request, reply }) = self.rx.recv().await {
            let kind = request.kind();
            tracing::debug!("Worker received {}", kind);

            let response = match self.handle(request).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!("Failed to handle {}: {}", kind, err);
                    Response::Error {
                        error: err.to_string(),
                    }
                }
            };

            if reply.send(response).is_err() {
                tracing::debug!("Requester of {} went away before the reply", kind);
            }
        }
        tracing::debug!("Worker stopped");
    }

    async fn handle(&self, request: Request) -> Result<Response> {
        match request {
            Request::Ping => Ok(Response::Pong),

            Request::Init => Ok(Response::Initialized),

            Request::Upgrade => {
                let applied = self.repository.migrate(MIGRATIONS).await?;
                Ok(Response::Upgraded {
                    applied: applied.into_iter().map(String::from).collect(),
                })
            }

            Request::ListFeedConfigs => self.feed_configs().await,

            Request::InsertFeedConfig { feed_config } => {
                self.repository.insert_feed_config(feed_config).await?;
                self.feed_configs().await
            }

            Request::UpdateFeedConfig { feed_config } => {
                let Some(id) = feed_config.id else {
                    return Err(AppError::Validation(
                        "update-feed-config requires feedConfig.id".to_string(),
                    ));
                };
                let title = self
                    .repository
                    .update_feed_config(feed_config)
                    .await?
                    .ok_or(AppError::FeedConfigNotFound(id))?;
                tracing::debug!("Updated feed config {} ({})", id, title);
                self.feed_configs().await
            }

            Request::DeleteFeedConfig { feed_config_id } => {
                if !self.repository.delete_feed_config(feed_config_id).await? {
                    tracing::warn!("Feed config {} was already gone", feed_config_id);
                }
                self.feed_configs().await
            }

            Request::GetFeedConfigFull { feed_config_id } => {
                self.feed_config_full(feed_config_id).await
            }

            Request::UpdateFeedConfigData { feed_config_data } => {
                let id = feed_config_data.id;
                if !self.repository.update_feed_config_data(feed_config_data).await? {
                    return Err(AppError::FeedConfigNotFound(id));
                }
                self.feed_config_full(id).await
            }

            Request::ListFeedEntriesMetadata { feed_config_id } => {
                let entries_metadata = self
                    .repository
                    .list_feed_entries_metadata(feed_config_id)
                    .await?;
                Ok(Response::FeedEntryMetadataList {
                    feed_config_id,
                    entries_metadata,
                })
            }

            Request::UpdateFeedEntryMetadata {
                feed_config_id,
                entry_metadata,
            } => {
                let entry_id = entry_metadata.entry_id.clone();
                self.repository
                    .upsert_feed_entry_metadata(feed_config_id, entry_metadata)
                    .await?;
                Ok(Response::FeedEntryMetadataUpdated {
                    feed_config_id,
                    entry_id,
                })
            }

            Request::BulkUpdateEntriesMarkRead {
                feed_config_id,
                entry_ids,
            } => {
                let count = self
                    .repository
                    .bulk_mark_entries_read(feed_config_id, entry_ids)
                    .await?;
                Ok(Response::FeedEntriesMarkedRead {
                    feed_config_id,
                    count,
                })
            }

            Request::Demo => {
                self.ensure_dev_ops()?;
                let id = self.repository.insert_demo_feed().await?;
                tracing::info!("Inserted demo feed config {}", id);
                self.feed_configs().await
            }

            Request::DevNuke => {
                self.ensure_dev_ops()?;
                let dropped = self.repository.nuke().await?;
                Ok(Response::Nuked { dropped })
            }
        }
    }

    async fn feed_configs(&self) -> Result<Response> {
        let feed_configs = self.repository.list_feed_configs().await?;
        Ok(Response::FeedConfigs { feed_configs })
    }

    async fn feed_config_full(&self, id: i64) -> Result<Response> {
        let data = self
            .repository
            .get_feed_config_full(id)
            .await?
            .ok_or(AppError::FeedConfigNotFound(id))?;
        Ok(Response::FeedConfigFull { data })
    }

    fn ensure_dev_ops(&self) -> Result<()> {
        if self.allow_dev_ops {
            Ok(())
        } else {
            Err(AppError::DevOpsDisabled)
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerHandle {
    queue: mpsc::Sender<Envelope>,
}

impl WorkerHandle {
    /// Opens the store at `db_path`, starts a worker on it and completes the
    /// init handshake.
    pub async fn open(db_path: impl AsRef<Path>, allow_dev_ops: bool) -> Result<Self> {
        let repository = Repository::open(db_path).await?;
        Self::connect(repository, allow_dev_ops).await
    }

    pub async fn open_in_memory(allow_dev_ops: bool) -> Result<Self> {
        let repository = Repository::open_in_memory().await?;
        Self::connect(repository, allow_dev_ops).await
    }

    async fn connect(repository: Repository, allow_dev_ops: bool) -> Result<Self> {
        let handle = Worker::spawn(repository, allow_dev_ops);
        handle.init().await?;
        Ok(handle)
    }

    pub async fn request(&self, request: Request) -> Result<Response> {
        let (reply, response) = oneshot::channel();
        self.queue
            .send(Envelope { request, reply })
            .await
            .map_err(|_| AppError::WorkerUnavailable)?;
        response.await.map_err(|_| AppError::WorkerUnavailable)
    }

    pub async fn ping(&self) -> Result<()> {
        match self.request(Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn init(&self) -> Result<()> {
        match self.request(Request::Init).await? {
            Response::Initialized => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Runs pending migrations and returns the versions applied now.
    pub async fn upgrade(&self) -> Result<Vec<String>> {
        match self.request(Request::Upgrade).await? {
            Response::Upgraded { applied } => Ok(applied),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_feed_configs(&self) -> Result<Vec<FeedConfig>> {
        feed_configs(self.request(Request::ListFeedConfigs).await?)
    }

    pub async fn insert_feed_config(&self, feed_config: FeedConfigForm) -> Result<Vec<FeedConfig>> {
        feed_configs(self.request(Request::InsertFeedConfig { feed_config }).await?)
    }

    pub async fn update_feed_config(&self, feed_config: FeedConfigForm) -> Result<Vec<FeedConfig>> {
        feed_configs(self.request(Request::UpdateFeedConfig { feed_config }).await?)
    }

    pub async fn delete_feed_config(&self, feed_config_id: i64) -> Result<Vec<FeedConfig>> {
        feed_configs(self.request(Request::DeleteFeedConfig { feed_config_id }).await?)
    }

    pub async fn get_feed_config_full(&self, feed_config_id: i64) -> Result<FeedConfigFull> {
        feed_config_full(self.request(Request::GetFeedConfigFull { feed_config_id }).await?)
    }

    pub async fn update_feed_config_data(
        &self,
        feed_config_data: FeedConfigData,
    ) -> Result<FeedConfigFull> {
        feed_config_full(
            self.request(Request::UpdateFeedConfigData { feed_config_data })
                .await?,
        )
    }

    pub async fn list_feed_entries_metadata(
        &self,
        feed_config_id: i64,
    ) -> Result<Vec<FeedEntryMetadata>> {
        match self
            .request(Request::ListFeedEntriesMetadata { feed_config_id })
            .await?
        {
            Response::FeedEntryMetadataList {
                entries_metadata, ..
            } => Ok(entries_metadata),
            other => Err(unexpected(other)),
        }
    }

    pub async fn update_feed_entry_metadata(
        &self,
        feed_config_id: i64,
        entry_metadata: FeedEntryMetadata,
    ) -> Result<()> {
        match self
            .request(Request::UpdateFeedEntryMetadata {
                feed_config_id,
                entry_metadata,
            })
            .await?
        {
            Response::FeedEntryMetadataUpdated { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn bulk_update_entries_mark_read(
        &self,
        feed_config_id: i64,
        entry_ids: Vec<String>,
    ) -> Result<usize> {
        match self
            .request(Request::BulkUpdateEntriesMarkRead {
                feed_config_id,
                entry_ids,
            })
            .await?
        {
            Response::FeedEntriesMarkedRead { count, .. } => Ok(count),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> AppError {
    match response {
        Response::Error { error } => AppError::Worker(error),
        other => AppError::UnexpectedResponse(other.kind()),
    }
}

fn feed_configs(response: Response) -> Result<Vec<FeedConfig>> {
    match response {
        Response::FeedConfigs { feed_configs } => Ok(feed_configs),
        other => Err(unexpected(other)),
    }
}

fn feed_config_full(response: Response) -> Result<FeedConfigFull> {
    match response {
        Response::FeedConfigFull { data } => Ok(data),
        other => Err(unexpected(other)),
    }
}
