//! Normalization of heterogeneous RunningHub status payloads.
//!
//! The status API has shipped two incompatible envelope shapes over
//! time. The legacy shape wraps everything in a numeric `code` plus a
//! `data` member that may be an object or a bare list of outputs; the
//! current shape carries a top-level `status` string. [`classify`]
//! inspects the discriminant fields once and produces a tagged
//! [`StatusPayload`]; [`normalize_status`] flattens either variant into
//! one canonical [`NormalizedStatus`] so consumers never branch on the
//! wire shape.

use serde_json::Value;

/// Legacy result code for a finished task.
const CODE_SUCCESS: i64 = 0;
/// Legacy result code for a failed task.
const CODE_FAILED: i64 = 805;
/// Legacy message accompanying a failed task.
const MSG_FAILED: &str = "APIKEY_TASK_STATUS_ERROR";

/// Current-shape status string for a finished task.
const STATUS_SUCCESS: &str = "SUCCESS";
/// Current-shape status string for a failed task.
const STATUS_FAILED: &str = "FAILED";

/// Canonical remote job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Success,
    Running,
    Failed,
}

impl RemoteStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RemoteStatus::Success | RemoteStatus::Failed)
    }
}

/// Usage metrics reported with a finished task.
///
/// The legacy list shape reports numbers as strings, so extraction
/// accepts either representation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaskUsage {
    pub cost_time_secs: Option<i64>,
    pub consume_money: Option<f64>,
    pub consume_coins: Option<i64>,
    pub third_party_cost: Option<f64>,
}

impl TaskUsage {
    /// Extract usage fields from a JSON object. Returns `None` when no
    /// usage key is present at all.
    pub fn from_value(value: &Value) -> Option<TaskUsage> {
        let usage = TaskUsage {
            cost_time_secs: int_field(value, "taskCostTime"),
            consume_money: float_field(value, "consumeMoney"),
            consume_coins: int_field(value, "consumeCoins"),
            third_party_cost: float_field(value, "thirdPartyConsumeMoney"),
        };
        (usage != TaskUsage::default()).then_some(usage)
    }
}

/// Canonical view of one status poll, regardless of wire shape.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedStatus {
    pub status: RemoteStatus,
    pub progress: i16,
    pub result_url: Option<String>,
    pub usage: Option<TaskUsage>,
    pub error_message: Option<String>,
}

/// A status payload classified by wire shape.
#[derive(Debug)]
pub enum StatusPayload<'a> {
    Legacy(LegacyPayload<'a>),
    Current(CurrentPayload<'a>),
}

/// Legacy envelope: numeric `code`, `msg`, and dict-or-list `data`.
#[derive(Debug)]
pub struct LegacyPayload<'a> {
    code: Option<i64>,
    msg: Option<&'a str>,
    data: LegacyData<'a>,
}

/// The legacy `data` member, which changed shape within the legacy era.
#[derive(Debug)]
enum LegacyData<'a> {
    Absent,
    Object(&'a serde_json::Map<String, Value>),
    List(&'a [Value]),
}

/// Current envelope: top-level `status` string and `results` list.
#[derive(Debug)]
pub struct CurrentPayload<'a> {
    status: Option<&'a str>,
    error_message: Option<&'a str>,
    progress: Option<i64>,
    results: &'a [Value],
    usage: Option<&'a Value>,
}

/// Classify a raw status payload by its discriminant fields.
///
/// The current shape is recognized by a top-level `taskId` or `status`
/// member; everything else is treated as legacy.
pub fn classify(raw: &Value) -> StatusPayload<'_> {
    if raw.get("taskId").is_some() || raw.get("status").is_some() {
        StatusPayload::Current(CurrentPayload {
            status: raw.get("status").and_then(Value::as_str),
            error_message: raw
                .get("errorMessage")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty()),
            progress: raw.get("progress").and_then(Value::as_i64),
            results: raw
                .get("results")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            usage: raw.get("usage"),
        })
    } else {
        let data = match raw.get("data") {
            Some(Value::Object(map)) => LegacyData::Object(map),
            Some(Value::Array(list)) => LegacyData::List(list),
            _ => LegacyData::Absent,
        };
        StatusPayload::Legacy(LegacyPayload {
            code: raw.get("code").and_then(Value::as_i64),
            msg: raw.get("msg").and_then(Value::as_str),
            data,
        })
    }
}

/// Classify and normalize a raw status payload in one call.
pub fn normalize_status(raw: &Value) -> NormalizedStatus {
    classify(raw).normalize()
}

impl StatusPayload<'_> {
    pub fn normalize(&self) -> NormalizedStatus {
        match self {
            StatusPayload::Legacy(payload) => payload.normalize(),
            StatusPayload::Current(payload) => payload.normalize(),
        }
    }
}

impl LegacyPayload<'_> {
    fn normalize(&self) -> NormalizedStatus {
        let status = if self.code == Some(CODE_SUCCESS) {
            RemoteStatus::Success
        } else if self.code == Some(CODE_FAILED) || self.msg == Some(MSG_FAILED) {
            RemoteStatus::Failed
        } else {
            // 804 / TASK_RUNNING, an empty envelope, or an unknown code:
            // the task is not ready yet. Unknown codes keep polling
            // rather than failing fast; the timeout bounds them.
            RemoteStatus::Running
        };

        let outputs: &[Value] = match &self.data {
            LegacyData::Object(map) => map
                .get("outputs")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            LegacyData::List(list) => *list,
            LegacyData::Absent => &[],
        };

        let progress = match &self.data {
            LegacyData::Object(map) => map.get("progress").and_then(Value::as_i64).unwrap_or(0),
            _ => 0,
        };

        let usage = match &self.data {
            LegacyData::Object(map) => map.get("usage").and_then(TaskUsage::from_value),
            LegacyData::List(list) => list.first().and_then(TaskUsage::from_value),
            LegacyData::Absent => None,
        };

        let error_message = if status == RemoteStatus::Failed {
            let failed_reason = match &self.data {
                LegacyData::Object(map) => map
                    .get("failedReason")
                    .and_then(|reason| reason.get("exception_type"))
                    .and_then(Value::as_str),
                _ => None,
            };
            failed_reason.or(self.msg).map(str::to_owned)
        } else {
            None
        };

        NormalizedStatus {
            status,
            progress: clamp_progress(progress),
            result_url: first_output_url(outputs),
            usage,
            error_message,
        }
    }
}

impl CurrentPayload<'_> {
    fn normalize(&self) -> NormalizedStatus {
        // A populated errorMessage means the task failed, even when the
        // status string claims otherwise.
        let status = if self.error_message.is_some() || self.status == Some(STATUS_FAILED) {
            RemoteStatus::Failed
        } else if self.status == Some(STATUS_SUCCESS) {
            RemoteStatus::Success
        } else {
            // RUNNING, QUEUED, or anything unrecognized.
            RemoteStatus::Running
        };

        NormalizedStatus {
            status,
            progress: clamp_progress(self.progress.unwrap_or(0)),
            result_url: first_output_url(self.results),
            usage: self.usage.and_then(TaskUsage::from_value),
            error_message: if status == RemoteStatus::Failed {
                self.error_message.map(str::to_owned)
            } else {
                None
            },
        }
    }
}

/// Pick the result URL from the output list.
///
/// Within one output item `url` strictly wins over `fileUrl`; items
/// carrying neither are skipped.
pub fn first_output_url(outputs: &[Value]) -> Option<String> {
    for output in outputs {
        for key in ["url", "fileUrl"] {
            if let Some(url) = output.get(key).and_then(Value::as_str) {
                if !url.is_empty() {
                    return Some(url.to_owned());
                }
            }
        }
    }
    None
}

fn clamp_progress(value: i64) -> i16 {
    value.clamp(0, 100) as i16
}

fn int_field(value: &Value, key: &str) -> Option<i64> {
    let field = value.get(key)?;
    field
        .as_i64()
        .or_else(|| field.as_str().and_then(|s| s.trim().parse().ok()))
}

fn float_field(value: &Value, key: &str) -> Option<f64> {
    let field = value.get(key)?;
    field
        .as_f64()
        .or_else(|| field.as_str().and_then(|s| s.trim().parse().ok()))
}
