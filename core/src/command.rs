use serde::{Deserialize, Serialize};
use crate::types::Seconds;

/// Commands the presentation layer (or the runner's IPC loop) sends
/// into a running night.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum SessionCommand {
    Start,
    Tick { dt: Seconds },
    CompleteVisit { customer_id: String },
    Close,
    Checkpoint,
    GetState,
    Quit,
}
