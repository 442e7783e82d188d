//! File-backed job store.
//!
//! Pending jobs are persisted as JSON lines, one job per line. Every mutation
//! rewrites the stream through a temporary file and an atomic rename, and the
//! stream is reloaded on construction.

use std::collections::HashMap;
use std::fs::{create_dir_all, rename, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::core::{DelayedJob, JobStore, SchedulerError};
use crate::util::serde::JobKey;

fn backend(e: impl std::fmt::Display) -> SchedulerError {
    SchedulerError::Backend(e.to_string())
}

/// File-backed store using JSON lines for durability.
pub struct FileJobStore<P> {
    path: PathBuf,
    stream: String,
    max_depth: usize,
    jobs: HashMap<JobKey, DelayedJob<P>>,
}

impl<P> FileJobStore<P>
where
    P: Serialize + DeserializeOwned,
{
    /// Open (or create) the store at `path/stream.jsonl` and load its jobs.
    ///
    /// # Errors
    ///
    /// Backend error if the directory cannot be created or a line fails to
    /// parse.
    pub fn open(
        path: impl AsRef<Path>,
        stream: impl Into<String>,
        max_depth: usize,
    ) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        create_dir_all(&path).map_err(backend)?;
        let mut store = Self {
            path,
            stream: stream.into(),
            max_depth,
            jobs: HashMap::new(),
        };
        store.load_from_disk()?;
        tracing::debug!(
            file = %store.file_path().display(),
            jobs = store.jobs.len(),
            "job store loaded"
        );
        Ok(store)
    }

    fn file_path(&self) -> PathBuf {
        self.path.join(format!("{}.jsonl", self.stream))
    }

    fn load_from_disk(&mut self) -> Result<(), SchedulerError> {
        let file_path = self.file_path();
        if !file_path.exists() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .read(true)
            .open(&file_path)
            .map_err(backend)?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(backend)?;
            if line.trim().is_empty() {
                continue;
            }
            let job: DelayedJob<P> = serde_json::from_str(&line).map_err(backend)?;
            self.jobs.insert(job.key.clone(), job);
        }
        Ok(())
    }

    fn rewrite_disk(&self) -> Result<(), SchedulerError> {
        let file_path = self.file_path();
        let tmp_path = self.path.join(format!("{}.jsonl.tmp", self.stream));
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .map_err(backend)?;
            let mut writer = BufWriter::new(file);
            for job in self.jobs.values() {
                let line = serde_json::to_string(job).map_err(backend)?;
                writeln!(writer, "{line}").map_err(backend)?;
            }
            writer.flush().map_err(backend)?;
            writer.get_ref().sync_all().map_err(backend)?;
        }
        rename(&tmp_path, &file_path).map_err(backend)
    }
}

impl<P> JobStore<P> for FileJobStore<P>
where
    P: Serialize + DeserializeOwned + Send,
{
    fn upsert(&mut self, job: DelayedJob<P>) -> Result<(), SchedulerError> {
        if !self.jobs.contains_key(&job.key) && self.len() >= self.max_depth() {
            return Err(SchedulerError::QueueFull("max pending jobs reached".into()));
        }
        let key = job.key.clone();
        let previous = self.jobs.insert(key.clone(), job);
        if let Err(e) = self.rewrite_disk() {
            // keep memory and disk in agreement
            match previous {
                Some(prev) => self.jobs.insert(key, prev),
                None => self.jobs.remove(&key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&mut self, key: &JobKey) -> Result<Option<DelayedJob<P>>, SchedulerError> {
        let Some(removed) = self.jobs.remove(key) else {
            return Ok(None);
        };
        if let Err(e) = self.rewrite_disk() {
            self.jobs.insert(key.clone(), removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    fn get(&self, key: &JobKey) -> Option<&DelayedJob<P>> {
        self.jobs.get(key)
    }

    fn pending(&self) -> Vec<DelayedJob<P>>
    where
        P: Clone,
    {
        let mut jobs: Vec<_> = self.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.key.cmp(&b.key)));
        jobs
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }
}
