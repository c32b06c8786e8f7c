use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Position of a commit inside its stream. Real commits start at 1; 0 marks
/// an empty stream.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(u64);

impl Sequence {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn initial() -> Self {
        Self(0)
    }

    pub const fn increment(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn checked_increment(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(next) => Some(Self(next)),
            None => None,
        }
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Sequence {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("commit sequences start at 1")]
    ZeroSequence,

    #[error("commit {found} does not follow commit {previous}")]
    NonContiguous { previous: Sequence, found: Sequence },

    #[error("commit of stream `{found}` does not belong to stream `{expected}`")]
    ForeignStream { expected: String, found: String },
}

/// One immutable batch of events recorded at a stream position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub stream_id: String,
    pub sequence: Sequence,
    pub events: Vec<Value>,
    pub recorded_at: DateTime<Utc>,
}

impl Commit {
    pub fn new(stream_id: impl Into<String>, sequence: Sequence, events: Vec<Value>) -> Self {
        Self {
            stream_id: stream_id.into(),
            sequence,
            events,
            recorded_at: Utc::now(),
        }
    }

    pub fn to_events<D: DeserializeOwned>(&self) -> serde_json::Result<Vec<D>> {
        self.events
            .iter()
            .map(|event| serde_json::from_value(event.clone()))
            .collect()
    }
}

/// Commits of one stream, ascending and without gaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitSequence(Vec<Commit>);

impl CommitSequence {
    pub fn new(commits: Vec<Commit>) -> Result<Self, SequenceError> {
        let mut iter = commits.iter();

        if let Some(first) = iter.next() {
            if first.sequence.is_initial() {
                return Err(SequenceError::ZeroSequence);
            }

            let mut previous = first;
            for commit in iter {
                if commit.stream_id != first.stream_id {
                    return Err(SequenceError::ForeignStream {
                        expected: first.stream_id.to_owned(),
                        found: commit.stream_id.to_owned(),
                    });
                }

                if previous.sequence.checked_increment() != Some(commit.sequence) {
                    return Err(SequenceError::NonContiguous {
                        previous: previous.sequence,
                        found: commit.sequence,
                    });
                }

                previous = commit;
            }
        }

        Ok(Self(commits))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Sequence of the last commit, or the initial sequence when empty
    pub fn head(&self) -> Sequence {
        self.0.last().map(|c| c.sequence).unwrap_or_default()
    }

    pub fn first(&self) -> Option<&Commit> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&Commit> {
        self.0.last()
    }

    pub fn get(&self, sequence: Sequence) -> Option<&Commit> {
        self.0.iter().find(|c| c.sequence == sequence)
    }

    /// Commits with `from <= sequence <= to`
    pub fn get_range(&self, from: Sequence, to: Sequence) -> CommitSequence {
        Self(
            self.0
                .iter()
                .filter(|c| c.sequence >= from && c.sequence <= to)
                .cloned()
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Commit> {
        self.0.iter()
    }
}

impl IntoIterator for CommitSequence {
    type Item = Commit;
    type IntoIter = std::vec::IntoIter<Commit>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a CommitSequence {
    type Item = &'a Commit;
    type IntoIter = std::slice::Iter<'a, Commit>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Ordered history of one stream as seen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    stream_id: String,
    commit_sequence: CommitSequence,
}

impl Stream {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            commit_sequence: CommitSequence::empty(),
        }
    }

    pub fn from_commits(
        stream_id: impl Into<String>,
        commit_sequence: CommitSequence,
    ) -> Result<Self, SequenceError> {
        let stream_id = stream_id.into();

        if let Some(commit) = commit_sequence.first() {
            if commit.stream_id != stream_id {
                return Err(SequenceError::ForeignStream {
                    expected: stream_id,
                    found: commit.stream_id.to_owned(),
                });
            }
        }

        Ok(Self {
            stream_id,
            commit_sequence,
        })
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn commit_sequence(&self) -> &CommitSequence {
        &self.commit_sequence
    }

    pub fn head_sequence(&self) -> Sequence {
        self.commit_sequence.head()
    }

    pub fn commit_range(&self, from: Sequence, to: Sequence) -> CommitSequence {
        self.commit_sequence.get_range(from, to)
    }

    /// Records `events` as the next commit after the current head.
    pub fn with_commit(mut self, events: Vec<Value>) -> Self {
        let commit = Commit::new(
            self.stream_id.to_owned(),
            self.head_sequence().increment(),
            events,
        );
        self.commit_sequence.0.push(commit);
        self
    }
}
