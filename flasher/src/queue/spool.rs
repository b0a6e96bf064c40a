//! Spool directory queue
//!
//! Each `*.json` file in the directory holds one task request. Files are
//! taken in name order; acknowledging a request deletes its file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use condition_types::TaskRequest;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::FlasherError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::queue::TaskQueue;

pub struct SpoolQueue {
    dir: Dir,
    paths: Mutex<HashMap<Uuid, PathBuf>>,
}

impl SpoolQueue {
    pub fn new(dir: Dir) -> Self {
        Self {
            dir,
            paths: Mutex::new(HashMap::new()),
        }
    }

    /// Add a request to the spool
    pub async fn enqueue(&self, request: &TaskRequest) -> Result<(), FlasherError> {
        self.dir
            .file(&format!("{}.json", request.id))
            .write_json(request)
            .await
    }
}

#[async_trait]
impl TaskQueue for SpoolQueue {
    async fn fetch(&self, limit: usize) -> Result<Vec<TaskRequest>, FlasherError> {
        let mut requests = Vec::new();

        for path in self.dir.list_files("json").await? {
            if requests.len() >= limit {
                break;
            }

            match File::new(&path).read_json::<TaskRequest>().await {
                Ok(request) => {
                    self.paths
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(request.id, path);
                    requests.push(request);
                }
                Err(e) => warn!("Skipping malformed task request {}: {}", path.display(), e),
            }
        }

        Ok(requests)
    }

    async fn ack(&self, id: Uuid) -> Result<(), FlasherError> {
        let path = self
            .paths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .unwrap_or_else(|| self.dir.path().join(format!("{}.json", id)));

        debug!("Acknowledging task {}", id);
        File::new(path).delete().await
    }
}
