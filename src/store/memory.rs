//! In-memory conversation store (non-persistent).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::{check_thread_id, ConversationStore, Message, StoreError};

type Thread = Arc<Mutex<Vec<Message>>>;

#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    threads: Arc<RwLock<HashMap<String, Thread>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn thread(&self, thread_id: &str) -> Result<Thread, StoreError> {
        check_thread_id(thread_id)?;
        if let Some(thread) = self.threads.read().await.get(thread_id) {
            return Ok(Arc::clone(thread));
        }
        let mut threads = self.threads.write().await;
        let thread = threads
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(thread_id = %thread_id, "Created thread");
                Arc::new(Mutex::new(Vec::new()))
            });
        Ok(Arc::clone(thread))
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(&self, thread_id: &str, message: Message) -> Result<(), StoreError> {
        let thread = self.thread(thread_id).await?;
        thread.lock().await.push(message);
        Ok(())
    }

    async fn extend(&self, thread_id: &str, messages: Vec<Message>) -> Result<(), StoreError> {
        let thread = self.thread(thread_id).await?;
        thread.lock().await.extend(messages);
        Ok(())
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        let thread = self.thread(thread_id).await?;
        let messages = thread.lock().await.clone();
        Ok(messages)
    }

    async fn thread_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.threads.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
