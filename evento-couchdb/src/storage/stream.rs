use crate::{
    commit::{Commit, Sequence, Stream},
    error::{Error, Result},
    storage::CouchDbStorageAdapter,
};

/// Outcome of [`CouchDbStreamStorage::append`].
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageResult {
    Success,
    /// Another writer owns commit `sequence`. Commits before it stay persisted.
    Conflict {
        identifier: String,
        sequence: Sequence,
    },
}

impl StorageResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Maps streams onto one document per commit, keyed `{streamId}-{sequence}`.
#[derive(Clone)]
pub struct CouchDbStreamStorage {
    adapter: CouchDbStorageAdapter,
}

impl CouchDbStreamStorage {
    pub fn new(adapter: CouchDbStorageAdapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &CouchDbStorageAdapter {
        &self.adapter
    }

    /// Loads `stream_id`, optionally restricted to `from..=to`.
    ///
    /// A stream that was never written loads as empty with head 0.
    pub fn load(
        &self,
        stream_id: &str,
        from: Option<Sequence>,
        to: Option<Sequence>,
    ) -> Result<Stream> {
        let commit_sequence = self.adapter.load(stream_id, from, to)?;

        Stream::from_commits(stream_id, commit_sequence)
            .map_err(|err| Error::storage(stream_id, err))
    }

    /// Persists the commits of `stream` after `known_head`, in order.
    ///
    /// Each commit is its own document and there is no rollback: on conflict
    /// the commits already written stay persisted and the call reports
    /// [`StorageResult::Conflict`]. A commit found already stored with the same
    /// content counts as written, so retrying with the same `known_head` is safe.
    pub fn append(&self, stream: &Stream, known_head: Sequence) -> Result<StorageResult> {
        if known_head >= stream.head_sequence() {
            return Ok(StorageResult::Success);
        }

        let delta = stream.commit_range(known_head.increment(), stream.head_sequence());

        for commit in delta.iter() {
            let identifier = Self::commit_identifier(stream.stream_id(), commit.sequence);
            let body =
                serde_json::to_value(commit).map_err(|err| Error::storage(&identifier, err))?;

            match self.adapter.append(&identifier, body) {
                Ok(()) => {}
                Err(Error::DocumentConflict(_)) => {
                    if self.is_persisted(&identifier, commit)? {
                        tracing::debug!("commit `{}` already persisted", identifier);
                        continue;
                    }

                    tracing::warn!(
                        "stream `{}` conflicts at sequence {}",
                        stream.stream_id(),
                        commit.sequence
                    );

                    return Ok(StorageResult::Conflict {
                        identifier,
                        sequence: commit.sequence,
                    });
                }
                Err(err) => return Err(err),
            }
        }

        Ok(StorageResult::Success)
    }

    pub fn commit_identifier(stream_id: &str, sequence: Sequence) -> String {
        format!("{stream_id}-{sequence}")
    }

    fn is_persisted(&self, identifier: &str, commit: &Commit) -> Result<bool> {
        let Some(doc) = self.adapter.get(identifier)? else {
            return Ok(false);
        };

        Ok(serde_json::from_value::<Commit>(doc).is_ok_and(|stored| stored == *commit))
    }
}
