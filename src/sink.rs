//! Record sinks: where finished records go.
//!
//! The crawl only needs the trait; the JSONL writer keeps every field
//! explicit (absent optionals serialize as `null`) so downstream tabular
//! tooling sees a stable schema.

use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::model::{InteractionRecord, PostRecord, ThreadSummary, UserRecord};

/// Receives the four record streams for serialization.
pub trait RecordSink {
    /// # Errors
    /// Returns an error if the record cannot be written.
    fn write_post(&mut self, post: &PostRecord) -> Result<()>;
    /// # Errors
    /// Returns an error if the record cannot be written.
    fn write_user(&mut self, user: &UserRecord) -> Result<()>;
    /// # Errors
    /// Returns an error if the record cannot be written.
    fn write_interaction(&mut self, interaction: &InteractionRecord) -> Result<()>;
    /// # Errors
    /// Returns an error if the record cannot be written.
    fn write_thread(&mut self, summary: &ThreadSummary) -> Result<()>;
    /// # Errors
    /// Returns an error if buffered output cannot be flushed.
    fn flush(&mut self) -> Result<()>;
}

/// One JSON object per line, one writer per record stream.
pub struct JsonlSink<W: Write> {
    posts: W,
    users: W,
    interactions: W,
    threads: W,
}

impl<W: Write> JsonlSink<W> {
    pub fn new(posts: W, users: W, interactions: W, threads: W) -> Self {
        Self {
            posts,
            users,
            interactions,
            threads,
        }
    }

    fn write_line<T: Serialize>(out: &mut W, record: &T) -> Result<()> {
        serde_json::to_writer(&mut *out, record).context("failed to serialize record")?;
        out.write_all(b"\n").context("failed to write record")?;
        Ok(())
    }
}

impl<W: Write> RecordSink for JsonlSink<W> {
    fn write_post(&mut self, post: &PostRecord) -> Result<()> {
        Self::write_line(&mut self.posts, post)
    }

    fn write_user(&mut self, user: &UserRecord) -> Result<()> {
        Self::write_line(&mut self.users, user)
    }

    fn write_interaction(&mut self, interaction: &InteractionRecord) -> Result<()> {
        Self::write_line(&mut self.interactions, interaction)
    }

    fn write_thread(&mut self, summary: &ThreadSummary) -> Result<()> {
        Self::write_line(&mut self.threads, summary)
    }

    fn flush(&mut self) -> Result<()> {
        self.posts.flush().context("failed to flush posts")?;
        self.users.flush().context("failed to flush users")?;
        self.interactions
            .flush()
            .context("failed to flush interactions")?;
        self.threads.flush().context("failed to flush threads")?;
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct VecSink {
    pub posts: Vec<PostRecord>,
    pub users: Vec<UserRecord>,
    pub interactions: Vec<InteractionRecord>,
    pub threads: Vec<ThreadSummary>,
}

impl RecordSink for VecSink {
    fn write_post(&mut self, post: &PostRecord) -> Result<()> {
        self.posts.push(post.clone());
        Ok(())
    }

    fn write_user(&mut self, user: &UserRecord) -> Result<()> {
        self.users.push(user.clone());
        Ok(())
    }

    fn write_interaction(&mut self, interaction: &InteractionRecord) -> Result<()> {
        self.interactions.push(interaction.clone());
        Ok(())
    }

    fn write_thread(&mut self, summary: &ThreadSummary) -> Result<()> {
        self.threads.push(summary.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
