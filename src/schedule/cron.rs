//! Cron expressions and camserve job lines

use super::{ScheduleError, ScheduleResult};
use crate::recorder::MAX_RECORDING_SECS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comment prefix marking lines owned by this service
pub const JOB_MARKER: &str = "# camserve:";

/// Build the cron expression for an interval.
///
/// - no hour (or hour 0) with minute 1..=59: every `minute` minutes
/// - no hour (or hour 0) with minute 0: top of every hour
/// - hour 1..=23 with minute 0..=59: at `minute` past every `hour` hours
pub fn cron_expression(hour: Option<u32>, minute: Option<u32>) -> ScheduleResult<String> {
    let Some(minute) = minute else {
        return Err(ScheduleError::InvalidInterval(
            "must specify minute or both hour and minute".to_string(),
        ));
    };

    match hour {
        None | Some(0) => match minute {
            0 => Ok("0 * * * *".to_string()),
            1..=59 => Ok(format!("*/{minute} * * * *")),
            _ => Err(ScheduleError::InvalidInterval(
                "minute interval must be between 1 and 59".to_string(),
            )),
        },
        Some(hour) => {
            if minute > 59 {
                return Err(ScheduleError::InvalidInterval(
                    "minute must be between 0 and 59".to_string(),
                ));
            }
            if !(1..=23).contains(&hour) {
                return Err(ScheduleError::InvalidInterval(
                    "hour interval must be between 1 and 23".to_string(),
                ));
            }
            Ok(format!("{minute} */{hour} * * *"))
        }
    }
}

/// What a scheduled trigger captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    #[default]
    Picture,
    Video,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Picture => f.write_str("picture"),
            RecordType::Video => f.write_str("video"),
        }
    }
}

impl FromStr for RecordType {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "picture" | "image" => Ok(RecordType::Picture),
            "video" => Ok(RecordType::Video),
            other => Err(ScheduleError::InvalidRequest(format!(
                "unknown record type: {other}"
            ))),
        }
    }
}

/// Body of a schedule creation request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    #[serde(default)]
    pub hour: Option<u32>,
    #[serde(default)]
    pub minute: Option<u32>,
    #[serde(default, alias = "record_type", alias = "type")]
    pub record_type: RecordType,
    #[serde(default)]
    pub duration: Option<u32>,
}

/// A registered recurring capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: String,
    pub hour: u32,
    pub minute: u32,
    pub record_type: RecordType,
    pub duration: u32,
    pub cron: String,
}

impl ScheduleEntry {
    /// Validate a request into an entry
    pub fn from_request(request: &ScheduleRequest) -> ScheduleResult<Self> {
        let cron = cron_expression(request.hour, request.minute)?;
        let duration = match (request.record_type, request.duration) {
            (RecordType::Picture, None | Some(0)) => 0,
            (RecordType::Picture, Some(d)) => {
                return Err(ScheduleError::InvalidRequest(format!(
                    "pictures take no duration, got {d}"
                )))
            }
            (RecordType::Video, Some(d)) if (1..=MAX_RECORDING_SECS).contains(&d) => d,
            (RecordType::Video, d) => {
                return Err(ScheduleError::InvalidRequest(format!(
                    "video duration must be between 1 and {MAX_RECORDING_SECS} seconds, got {}",
                    d.map(|d| d.to_string()).unwrap_or_else(|| "none".to_string())
                )))
            }
        };
        let hour = request.hour.unwrap_or(0);
        let minute = request.minute.unwrap_or(0);
        Ok(Self {
            id: entry_id(hour, minute, request.record_type, duration),
            hour,
            minute,
            record_type: request.record_type,
            duration,
            cron,
        })
    }

    /// Crontab line that fires this entry against the service at `base_url`
    pub fn job_line(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        let command = match self.record_type {
            RecordType::Picture => {
                format!("curl -fsS -X POST {base}/take_picture >/dev/null 2>&1")
            }
            RecordType::Video => format!(
                "curl -fsS -X POST -H 'Content-Type: application/json' -d '{{\"duration\":{}}}' {base}/record_video >/dev/null 2>&1",
                self.duration
            ),
        };
        format!("{} {} {}{}", self.cron, command, JOB_MARKER, self.id)
    }

    /// Recover an entry from one of our crontab lines. Foreign lines give `None`.
    pub fn parse_job_line(line: &str) -> Option<Self> {
        let (_, id) = line.rsplit_once(JOB_MARKER)?;
        let id = id.trim();
        let (hour, minute, record_type, duration) = parse_entry_id(id)?;
        let cron = line.split_whitespace().take(5).collect::<Vec<_>>().join(" ");
        Some(Self {
            id: id.to_string(),
            hour,
            minute,
            record_type,
            duration,
            cron,
        })
    }
}

/// Stable id for the entry key (hour, minute, type, duration)
pub fn entry_id(hour: u32, minute: u32, record_type: RecordType, duration: u32) -> String {
    format!("h{hour}-m{minute}-{record_type}-d{duration}")
}

fn parse_entry_id(id: &str) -> Option<(u32, u32, RecordType, u32)> {
    let mut parts = id.split('-');
    let hour = parts.next()?.strip_prefix('h')?.parse().ok()?;
    let minute = parts.next()?.strip_prefix('m')?.parse().ok()?;
    let record_type = parts.next()?.parse().ok()?;
    let duration = parts.next()?.strip_prefix('d')?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((hour, minute, record_type, duration))
}
