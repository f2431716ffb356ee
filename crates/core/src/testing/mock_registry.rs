//! Mock registry client for testing.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::registry::{OutgoingMessage, RegistryClient, RegistryError};
use crate::submission::{SubmissionFolders, SubmissionId, SubmissionRecord, SubmissionStatus};

use super::call_log::CallLog;

type ErrorFactory = Arc<dyn Fn() -> RegistryError + Send + Sync>;

/// Planned failures for one operation.
#[derive(Default)]
struct Failures {
    plans: Vec<(Option<String>, usize, ErrorFactory)>,
}

impl Failures {
    fn add(&mut self, only: Option<&str>, count: usize, make: ErrorFactory) {
        self.plans.push((only.map(str::to_string), count, make));
    }

    /// Consumes one planned failure matching `id`, if any.
    fn take(&mut self, id: Option<&str>) -> Option<RegistryError> {
        let plan = self.plans.iter_mut().find(|(only, remaining, _)| {
            *remaining > 0 && (only.is_none() || only.as_deref() == id)
        })?;
        plan.1 -= 1;
        Some((plan.2)())
    }
}

#[derive(Default)]
struct Inner {
    submissions: Vec<SubmissionRecord>,
    statuses: HashMap<String, SubmissionStatus>,
    status_writes: Vec<(SubmissionId, SubmissionStatus)>,
    annotation_writes: Vec<(SubmissionId, BTreeMap<String, String>)>,
    folders: HashMap<String, SubmissionFolders>,
    uploads: Vec<(String, PathBuf)>,
    messages: Vec<OutgoingMessage>,
    files: HashMap<String, (String, Vec<u8>)>,
    fetch_count: usize,
    /// Status writes that land but report a timeout.
    lost_status_acks: usize,
    fetch_failures: Failures,
    status_failures: Failures,
    annotation_failures: Failures,
    message_failures: Failures,
    download_failures: Failures,
    folder_failures: Failures,
}

/// Mock implementation of the RegistryClient trait.
///
/// Keeps remote state in memory:
/// - submissions returned by fetches, with their current status
/// - every status and annotation write, per submission
/// - created folders, uploads and sent messages
///
/// Failures can be planned per operation (optionally for one submission
/// only). Every successful call is appended to the shared `CallLog`.
pub struct MockRegistry {
    inner: Mutex<Inner>,
    log: CallLog,
}

impl MockRegistry {
    pub fn new(log: CallLog) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            log,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Adds submissions to the view. Their status becomes the remote status.
    pub fn add_submissions(&self, records: Vec<SubmissionRecord>) {
        let mut inner = self.lock();
        for record in records {
            inner
                .statuses
                .entry(record.id.as_str().to_string())
                .or_insert(record.status);
            inner.submissions.push(record);
        }
    }

    pub fn set_status(&self, id: &str, status: SubmissionStatus) {
        self.lock().statuses.insert(id.to_string(), status);
    }

    /// Serves `contents` as the file named `name` for a download reference.
    pub fn set_file(&self, reference: &str, name: &str, contents: impl Into<Vec<u8>>) {
        self.lock()
            .files
            .insert(reference.to_string(), (name.to_string(), contents.into()));
    }

    pub fn status_of(&self, id: &str) -> Option<SubmissionStatus> {
        self.lock().statuses.get(id).copied()
    }

    /// Statuses written for a submission, in order.
    pub fn status_writes(&self, id: &str) -> Vec<SubmissionStatus> {
        self.lock()
            .status_writes
            .iter()
            .filter(|(sid, _)| sid.as_str() == id)
            .map(|(_, status)| *status)
            .collect()
    }

    /// Annotation sets written for a submission, in order.
    pub fn annotation_writes(&self, id: &str) -> Vec<BTreeMap<String, String>> {
        self.lock()
            .annotation_writes
            .iter()
            .filter(|(sid, _)| sid.as_str() == id)
            .map(|(_, annotations)| annotations.clone())
            .collect()
    }

    /// All annotations currently stored for a submission.
    pub fn annotations_of(&self, id: &str) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        for annotations in self.annotation_writes(id) {
            merged.extend(annotations);
        }
        merged
    }

    pub fn sent_messages(&self) -> Vec<OutgoingMessage> {
        self.lock().messages.clone()
    }

    pub fn messages_for(&self, id: &str) -> Vec<OutgoingMessage> {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.submission_id.as_str() == id)
            .cloned()
            .collect()
    }

    /// Uploaded (folder id, source directory) pairs.
    pub fn uploads(&self) -> Vec<(String, PathBuf)> {
        self.lock().uploads.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetch_count
    }

    pub fn fail_fetches(&self, count: usize, make: impl Fn() -> RegistryError + Send + Sync + 'static) {
        self.lock().fetch_failures.add(None, count, Arc::new(make));
    }

    pub fn fail_status_writes(
        &self,
        count: usize,
        make: impl Fn() -> RegistryError + Send + Sync + 'static,
    ) {
        self.lock().status_failures.add(None, count, Arc::new(make));
    }

    pub fn fail_status_writes_for(
        &self,
        id: &str,
        count: usize,
        make: impl Fn() -> RegistryError + Send + Sync + 'static,
    ) {
        self.lock().status_failures.add(Some(id), count, Arc::new(make));
    }

    /// The next `count` status writes are applied but answered with a timeout.
    pub fn fail_status_writes_after_apply(&self, count: usize) {
        self.lock().lost_status_acks = count;
    }

    pub fn fail_annotations(
        &self,
        count: usize,
        make: impl Fn() -> RegistryError + Send + Sync + 'static,
    ) {
        self.lock().annotation_failures.add(None, count, Arc::new(make));
    }

    pub fn fail_messages(
        &self,
        count: usize,
        make: impl Fn() -> RegistryError + Send + Sync + 'static,
    ) {
        self.lock().message_failures.add(None, count, Arc::new(make));
    }

    pub fn fail_downloads(
        &self,
        count: usize,
        make: impl Fn() -> RegistryError + Send + Sync + 'static,
    ) {
        self.lock().download_failures.add(None, count, Arc::new(make));
    }

    pub fn fail_folders_for(
        &self,
        id: &str,
        count: usize,
        make: impl Fn() -> RegistryError + Send + Sync + 'static,
    ) {
        self.lock().folder_failures.add(Some(id), count, Arc::new(make));
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_submissions(
        &self,
        _view_id: &str,
        status: SubmissionStatus,
    ) -> Result<Vec<SubmissionRecord>, RegistryError> {
        let mut inner = self.lock();
        inner.fetch_count += 1;
        if let Some(e) = inner.fetch_failures.take(None) {
            return Err(e);
        }
        // The view reflects status writes made since the record was added.
        let records: Vec<SubmissionRecord> = inner
            .submissions
            .iter()
            .map(|r| SubmissionRecord {
                status: inner
                    .statuses
                    .get(r.id.as_str())
                    .copied()
                    .unwrap_or(r.status),
                ..r.clone()
            })
            .filter(|r| r.status == status)
            .collect();
        drop(inner);
        self.log.record("fetch_submissions", None, status.as_str());
        Ok(records)
    }

    async fn get_submission_status(
        &self,
        id: &SubmissionId,
    ) -> Result<SubmissionStatus, RegistryError> {
        self.lock()
            .statuses
            .get(id.as_str())
            .copied()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    async fn update_status(
        &self,
        id: &SubmissionId,
        status: SubmissionStatus,
    ) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        if let Some(e) = inner.status_failures.take(Some(id.as_str())) {
            return Err(e);
        }
        inner.statuses.insert(id.as_str().to_string(), status);
        inner.status_writes.push((id.clone(), status));
        let lost = inner.lost_status_acks > 0;
        if lost {
            inner.lost_status_acks -= 1;
        }
        drop(inner);
        self.log.record("update_status", Some(id), status.as_str());
        if lost {
            return Err(RegistryError::Timeout);
        }
        Ok(())
    }

    async fn annotate(
        &self,
        id: &SubmissionId,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        if let Some(e) = inner.annotation_failures.take(Some(id.as_str())) {
            return Err(e);
        }
        inner
            .annotation_writes
            .push((id.clone(), annotations.clone()));
        drop(inner);
        let keys: Vec<&str> = annotations.keys().map(String::as_str).collect();
        self.log.record("annotate", Some(id), keys.join(","));
        Ok(())
    }

    async fn download(&self, reference: &str, dest_dir: &Path) -> Result<PathBuf, RegistryError> {
        let (name, contents) = {
            let mut inner = self.lock();
            if let Some(e) = inner.download_failures.take(None) {
                return Err(e);
            }
            inner.files.get(reference).cloned().unwrap_or_else(|| {
                (
                    format!("{}.csv", reference),
                    b"id,probability\n1,0.5\n".to_vec(),
                )
            })
        };
        let path = dest_dir.join(name);
        tokio::fs::create_dir_all(dest_dir).await?;
        tokio::fs::write(&path, contents).await?;
        self.log.record("download", None, reference);
        Ok(path)
    }

    async fn create_folders(&self, id: &SubmissionId) -> Result<SubmissionFolders, RegistryError> {
        let mut inner = self.lock();
        if let Some(e) = inner.folder_failures.take(Some(id.as_str())) {
            return Err(e);
        }
        let folders = inner
            .folders
            .entry(id.as_str().to_string())
            .or_insert_with(|| SubmissionFolders {
                root_id: format!("folder-{}", id),
                output_id: format!("folder-{}-output", id),
                logs_id: format!("folder-{}-logs", id),
            })
            .clone();
        drop(inner);
        self.log.record("create_folders", Some(id), "");
        Ok(folders)
    }

    async fn upload_folder(&self, folder_id: &str, source: &Path) -> Result<usize, RegistryError> {
        let mut files = 0;
        if source.is_dir() {
            let mut entries = tokio::fs::read_dir(source).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    files += 1;
                }
            }
        }

        let owner = {
            let mut inner = self.lock();
            inner.uploads.push((folder_id.to_string(), source.to_path_buf()));
            inner
                .folders
                .iter()
                .find(|(_, f)| f.output_id == folder_id || f.logs_id == folder_id)
                .map(|(id, _)| SubmissionId::new(id.clone()))
        };
        self.log.record("upload_folder", owner.as_ref(), folder_id);
        Ok(files)
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        if let Some(e) = inner
            .message_failures
            .take(Some(message.submission_id.as_str()))
        {
            return Err(e);
        }
        inner.messages.push(message.clone());
        drop(inner);
        self.log
            .record("send_message", Some(&message.submission_id), "");
        Ok(())
    }
}
