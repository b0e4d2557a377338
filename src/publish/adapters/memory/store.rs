//! In-memory publish store.
//!
//! Mirrors the `PostgreSQL` constraints: external channel identifiers are
//! unique per provider and a channel's blocking tasks never share a slot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::publish::{
    domain::{
        ChannelCredentials, ChannelId, LanguageCode, PublishChannel, PublishTask, PublishTaskId,
        PublishTaskStatus, TaskUpdate, UserId,
    },
    ports::{
        PublishStore, PublishStoreError, PublishStoreResult, TaskAcquisition, TaskStatusWrite,
    },
};

/// Thread-safe in-memory publish store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublishStore {
    state: Arc<RwLock<InMemoryPublishState>>,
}

#[derive(Debug, Default)]
struct InMemoryPublishState {
    channels: HashMap<ChannelId, PublishChannel>,
    tasks: HashMap<PublishTaskId, PublishTask>,
}

impl InMemoryPublishState {
    fn slot_holder(
        &self,
        channel_id: ChannelId,
        publish_at: DateTime<Utc>,
        except: PublishTaskId,
    ) -> Option<&PublishTask> {
        self.tasks.values().find(|task| {
            task.id() != except
                && task.channel_id() == channel_id
                && task.publish_at() == publish_at
                && task.status().is_blocking()
        })
    }

    fn oldest_in(&self, statuses: &[PublishTaskStatus]) -> Vec<&PublishTask> {
        let mut matching: Vec<&PublishTask> = self
            .tasks
            .values()
            .filter(|task| statuses.contains(&task.status()))
            .collect();
        matching.sort_by_key(|task| (task.created_at(), task.id().into_inner()));
        matching
    }
}

impl InMemoryPublishStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored task, ordered by publication slot.
    ///
    /// # Errors
    ///
    /// Returns [`PublishStoreError::Persistence`] when the lock is poisoned.
    pub fn tasks(&self) -> PublishStoreResult<Vec<PublishTask>> {
        let state = self.read()?;
        let mut tasks: Vec<PublishTask> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|task| (task.publish_at(), task.created_at(), task.id().into_inner()));
        Ok(tasks)
    }

    fn read(&self) -> PublishStoreResult<RwLockReadGuard<'_, InMemoryPublishState>> {
        self.state
            .read()
            .map_err(|err| PublishStoreError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> PublishStoreResult<RwLockWriteGuard<'_, InMemoryPublishState>> {
        self.state
            .write()
            .map_err(|err| PublishStoreError::persistence(std::io::Error::other(err.to_string())))
    }
}

#[async_trait]
impl PublishStore for InMemoryPublishStore {
    async fn store_channel(&self, channel: &PublishChannel) -> PublishStoreResult<()> {
        let mut state = self.write()?;
        let duplicate = state.channels.contains_key(&channel.id())
            || state.channels.values().any(|existing| {
                existing.provider() == channel.provider()
                    && existing.external_channel_id() == channel.external_channel_id()
            });
        if duplicate {
            return Err(PublishStoreError::DuplicateChannel(channel.id()));
        }
        state.channels.insert(channel.id(), channel.clone());
        Ok(())
    }

    async fn find_channel(&self, id: ChannelId) -> PublishStoreResult<Option<PublishChannel>> {
        let state = self.read()?;
        Ok(state.channels.get(&id).cloned())
    }

    async fn update_channel_credentials(
        &self,
        id: ChannelId,
        credentials: &ChannelCredentials,
        at: DateTime<Utc>,
    ) -> PublishStoreResult<PublishChannel> {
        let mut state = self.write()?;
        let channel = state
            .channels
            .get_mut(&id)
            .ok_or(PublishStoreError::ChannelNotFound(id))?;
        channel.replace_credentials(credentials.clone(), at);
        Ok(channel.clone())
    }

    async fn insert_task(&self, task: &PublishTask) -> PublishStoreResult<()> {
        let mut state = self.write()?;
        if state.tasks.contains_key(&task.id()) {
            return Err(PublishStoreError::DuplicateTask(task.id()));
        }
        if !state.channels.contains_key(&task.channel_id()) {
            return Err(PublishStoreError::ChannelNotFound(task.channel_id()));
        }
        if task.status().is_blocking()
            && state
                .slot_holder(task.channel_id(), task.publish_at(), task.id())
                .is_some()
        {
            return Err(PublishStoreError::SlotTaken {
                channel_id: task.channel_id(),
                publish_at: task.publish_at(),
            });
        }
        state.tasks.insert(task.id(), task.clone());
        Ok(())
    }

    async fn find_task(&self, id: PublishTaskId) -> PublishStoreResult<Option<PublishTask>> {
        let state = self.read()?;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn latest_task_for(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        language_code: &LanguageCode,
        statuses: &[PublishTaskStatus],
    ) -> PublishStoreResult<Option<PublishTask>> {
        let state = self.read()?;
        Ok(state
            .tasks
            .values()
            .filter(|task| {
                task.user_id() == user_id
                    && task.channel_id() == channel_id
                    && task.language_code() == language_code
                    && statuses.contains(&task.status())
            })
            .max_by_key(|task| (task.publish_at(), task.created_at(), task.id().into_inner()))
            .cloned())
    }

    async fn blocking_task_in_window(
        &self,
        channel_id: ChannelId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PublishStoreResult<Option<PublishTask>> {
        let state = self.read()?;
        Ok(state
            .tasks
            .values()
            .filter(|task| {
                task.channel_id() == channel_id
                    && task.status().is_blocking()
                    && task.publish_at() >= start
                    && task.publish_at() <= end
            })
            .min_by_key(|task| (task.publish_at(), task.id().into_inner()))
            .cloned())
    }

    async fn transition_task(
        &self,
        write: &TaskStatusWrite,
    ) -> PublishStoreResult<Option<PublishTask>> {
        let mut state = self.write()?;
        let current = state
            .tasks
            .get(&write.task_id)
            .ok_or(PublishStoreError::TaskNotFound(write.task_id))?;
        if !write.expected.contains(&current.status()) {
            return Ok(None);
        }
        let task = state
            .tasks
            .get_mut(&write.task_id)
            .ok_or(PublishStoreError::TaskNotFound(write.task_id))?;
        task.apply_update(&write.update, write.at);
        Ok(Some(task.clone()))
    }

    async fn list_tasks(
        &self,
        statuses: &[PublishTaskStatus],
        limit: usize,
    ) -> PublishStoreResult<Vec<PublishTask>> {
        let state = self.read()?;
        Ok(state
            .oldest_in(statuses)
            .into_iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn acquire_tasks(
        &self,
        acquisition: &TaskAcquisition,
    ) -> PublishStoreResult<Vec<PublishTask>> {
        let mut state = self.write()?;
        let selected: Vec<PublishTaskId> = state
            .oldest_in(&acquisition.from)
            .into_iter()
            .take(acquisition.limit)
            .map(PublishTask::id)
            .collect();
        let update = TaskUpdate {
            claimed_by: Some(acquisition.claimed_by.clone()),
            ..TaskUpdate::status_only(acquisition.to)
        };
        let mut acquired = Vec::with_capacity(selected.len());
        for task_id in selected {
            if let Some(task) = state.tasks.get_mut(&task_id) {
                task.apply_update(&update, acquisition.at);
                acquired.push(task.clone());
            }
        }
        Ok(acquired)
    }
}
