//! TaskId - タスクの識別子
//!
//! ULID ベースの ID を `task-<ULID>` という文字列で外部に公開します。
//! - 時刻でソート可能（生成順）
//! - 分散環境で調整なしに生成可能
//! - wire / storage 上は常に文字列（`{"task_id": "task-01H..."}`）

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

const PREFIX: &str = "task-";

/// Identifier of a Task. Generated once at submission, never reused.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Ulid);

/// ParseTaskIdError は文字列から TaskId への変換失敗
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task id {input:?}: {reason}")]
pub struct ParseTaskIdError {
    input: String,
    reason: &'static str,
}

impl TaskId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PREFIX, self.0)
    }
}

impl FromStr for TaskId {
    type Err = ParseTaskIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(PREFIX).ok_or_else(|| ParseTaskIdError {
            input: s.to_string(),
            reason: "missing `task-` prefix",
        })?;
        let ulid = Ulid::from_string(raw).map_err(|_| ParseTaskIdError {
            input: s.to_string(),
            reason: "not a valid ULID",
        })?;
        Ok(Self(ulid))
    }
}

// 文字列として直列化する（ulid の構造体表現は外に出さない）
impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
