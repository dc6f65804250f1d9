//! Operation kinds exposed by the replay-statistics API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ThrottleError;

/// An API operation kind.
///
/// Each kind is rate limited independently of the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Ping,
    UploadReplay,
    ListReplays,
    GetReplay,
    DeleteReplay,
    PatchReplay,
    DownloadReplay,
    CreateGroup,
    ListGroups,
    GetGroup,
    DeleteGroup,
    PatchGroup,
    Maps,
    GetThreejs,
    GetTimeline,
    ExportCsv,
}

impl Operation {
    /// Every operation kind, in API order.
    pub const ALL: [Operation; 16] = [
        Operation::Ping,
        Operation::UploadReplay,
        Operation::ListReplays,
        Operation::GetReplay,
        Operation::DeleteReplay,
        Operation::PatchReplay,
        Operation::DownloadReplay,
        Operation::CreateGroup,
        Operation::ListGroups,
        Operation::GetGroup,
        Operation::DeleteGroup,
        Operation::PatchGroup,
        Operation::Maps,
        Operation::GetThreejs,
        Operation::GetTimeline,
        Operation::ExportCsv,
    ];

    /// The operations the service enforces quotas on.
    pub const LIMITED: [Operation; 10] = [
        Operation::ListReplays,
        Operation::GetReplay,
        Operation::DeleteReplay,
        Operation::PatchReplay,
        Operation::DownloadReplay,
        Operation::CreateGroup,
        Operation::ListGroups,
        Operation::GetGroup,
        Operation::DeleteGroup,
        Operation::PatchGroup,
    ];

    /// Get the wire name of this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Ping => "ping",
            Operation::UploadReplay => "upload_replay",
            Operation::ListReplays => "list_replays",
            Operation::GetReplay => "get_replay",
            Operation::DeleteReplay => "delete_replay",
            Operation::PatchReplay => "patch_replay",
            Operation::DownloadReplay => "download_replay",
            Operation::CreateGroup => "create_group",
            Operation::ListGroups => "list_groups",
            Operation::GetGroup => "get_group",
            Operation::DeleteGroup => "delete_group",
            Operation::PatchGroup => "patch_group",
            Operation::Maps => "maps",
            Operation::GetThreejs => "get_threejs",
            Operation::GetTimeline => "get_timeline",
            Operation::ExportCsv => "export_csv",
        }
    }

    /// Whether the service applies a quota to this operation.
    pub fn is_limited(&self) -> bool {
        Self::LIMITED.contains(self)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ThrottleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ThrottleError::UnknownOperation(s.to_string()))
    }
}
