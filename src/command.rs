use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::status::AppointmentStatus;

/// One line of driver input, parsed.
#[derive(Debug, PartialEq)]
pub enum Command {
    Create {
        practitioner_id: Ulid,
        patient_id: Ulid,
        slot: Slot,
        reason: String,
    },
    Confirm {
        id: Ulid,
    },
    Start {
        id: Ulid,
    },
    Finish {
        id: Ulid,
    },
    Cancel {
        id: Ulid,
    },
    NoShow {
        id: Ulid,
    },
    Reschedule {
        id: Ulid,
        slot: Slot,
        reason: Option<String>,
    },
    Get {
        id: Ulid,
    },
    ListPractitioner {
        practitioner_id: Ulid,
        from: Ms,
        to: Ms,
    },
    ListStatus {
        status: AppointmentStatus,
    },
    ListDate {
        date: NaiveDate,
    },
    Available {
        practitioner_id: Ulid,
        slot: Slot,
    },
    Free {
        practitioner_id: Ulid,
        from: Ms,
        to: Ms,
        min_duration: Option<Ms>,
    },
}

impl Command {
    /// Stable name for logs and error output.
    pub fn label(&self) -> &'static str {
        match self {
            Command::Create { .. } => "create",
            Command::Confirm { .. } => "confirm",
            Command::Start { .. } => "start",
            Command::Finish { .. } => "finish",
            Command::Cancel { .. } => "cancel",
            Command::NoShow { .. } => "no-show",
            Command::Reschedule { .. } => "reschedule",
            Command::Get { .. } => "get",
            Command::ListPractitioner { .. } => "list-practitioner",
            Command::ListStatus { .. } => "list-status",
            Command::ListDate { .. } => "list-date",
            Command::Available { .. } => "available",
            Command::Free { .. } => "free",
        }
    }
}

/// Result of a successfully executed command.
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Output {
    Appointment(Appointment),
    Appointments(Vec<Appointment>),
    Available { available: bool },
    Spans(Vec<Span>),
}

/// Parse one whitespace-separated command line.
///
/// Times are UTC, written `2025-03-01T09:00`, with optional seconds, or as
/// RFC 3339. An end of `-` books an open-ended slot. Trailing words after the
/// fixed arguments of `create` and `reschedule` form the reason.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = words.split_first() else {
        return Err(CommandError::Empty);
    };

    match verb.to_ascii_lowercase().as_str() {
        "create" => {
            expect_at_least("create", args, 4)?;
            Ok(Command::Create {
                practitioner_id: parse_ulid(args[0])?,
                patient_id: parse_ulid(args[1])?,
                slot: parse_slot(args[2], args[3])?,
                reason: args[4..].join(" "),
            })
        }
        "confirm" => Ok(Command::Confirm { id: single_id("confirm", args)? }),
        "start" => Ok(Command::Start { id: single_id("start", args)? }),
        "finish" => Ok(Command::Finish { id: single_id("finish", args)? }),
        "cancel" => Ok(Command::Cancel { id: single_id("cancel", args)? }),
        "no-show" | "no_show" => Ok(Command::NoShow { id: single_id("no-show", args)? }),
        "get" => Ok(Command::Get { id: single_id("get", args)? }),
        "reschedule" => {
            expect_at_least("reschedule", args, 3)?;
            let reason = (args.len() > 3).then(|| args[3..].join(" "));
            Ok(Command::Reschedule {
                id: parse_ulid(args[0])?,
                slot: parse_slot(args[1], args[2])?,
                reason,
            })
        }
        "list-practitioner" => {
            expect_exactly("list-practitioner", args, 3)?;
            Ok(Command::ListPractitioner {
                practitioner_id: parse_ulid(args[0])?,
                from: parse_time(args[1])?,
                to: parse_time(args[2])?,
            })
        }
        "list-status" => {
            expect_exactly("list-status", args, 1)?;
            let status = args[0].parse().map_err(CommandError::Parse)?;
            Ok(Command::ListStatus { status })
        }
        "list-date" => {
            expect_exactly("list-date", args, 1)?;
            let date = NaiveDate::parse_from_str(args[0], "%Y-%m-%d")
                .map_err(|e| CommandError::Parse(format!("invalid date {:?}: {e}", args[0])))?;
            Ok(Command::ListDate { date })
        }
        "available" => {
            expect_exactly("available", args, 3)?;
            Ok(Command::Available {
                practitioner_id: parse_ulid(args[0])?,
                slot: parse_slot(args[1], args[2])?,
            })
        }
        "free" => {
            if args.len() != 3 && args.len() != 4 {
                return Err(CommandError::WrongArity("free", 3, args.len()));
            }
            let min_duration = match args.get(3) {
                Some(raw) => Some(parse_minutes(raw)?),
                None => None,
            };
            Ok(Command::Free {
                practitioner_id: parse_ulid(args[0])?,
                from: parse_time(args[1])?,
                to: parse_time(args[2])?,
                min_duration,
            })
        }
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

/// Run a parsed command against the engine.
pub async fn execute(engine: &Engine, command: Command) -> Result<Output, EngineError> {
    let output = match command {
        Command::Create {
            practitioner_id,
            patient_id,
            slot,
            reason,
        } => Output::Appointment(engine.create(practitioner_id, patient_id, slot, reason).await?),
        Command::Confirm { id } => Output::Appointment(engine.confirm(id).await?),
        Command::Start { id } => Output::Appointment(engine.start(id).await?),
        Command::Finish { id } => Output::Appointment(engine.finish(id).await?),
        Command::Cancel { id } => Output::Appointment(engine.cancel(id).await?),
        Command::NoShow { id } => Output::Appointment(engine.mark_no_show(id).await?),
        Command::Reschedule { id, slot, reason } => {
            Output::Appointment(engine.reschedule(id, slot, reason).await?)
        }
        Command::Get { id } => Output::Appointment(engine.get(id).await?),
        Command::ListPractitioner {
            practitioner_id,
            from,
            to,
        } => Output::Appointments(
            engine
                .list_by_practitioner_and_range(practitioner_id, from, to)
                .await?,
        ),
        Command::ListStatus { status } => Output::Appointments(engine.list_by_status(status).await?),
        Command::ListDate { date } => Output::Appointments(engine.list_by_date(date).await?),
        Command::Available {
            practitioner_id,
            slot,
        } => Output::Available {
            available: engine.is_available(practitioner_id, slot).await?,
        },
        Command::Free {
            practitioner_id,
            from,
            to,
            min_duration,
        } => Output::Spans(engine.free_spans(practitioner_id, from, to, min_duration).await?),
    };
    Ok(output)
}

fn expect_exactly(command: &'static str, args: &[&str], n: usize) -> Result<(), CommandError> {
    if args.len() != n {
        return Err(CommandError::WrongArity(command, n, args.len()));
    }
    Ok(())
}

fn expect_at_least(command: &'static str, args: &[&str], n: usize) -> Result<(), CommandError> {
    if args.len() < n {
        return Err(CommandError::WrongArity(command, n, args.len()));
    }
    Ok(())
}

fn single_id(command: &'static str, args: &[&str]) -> Result<Ulid, CommandError> {
    expect_exactly(command, args, 1)?;
    parse_ulid(args[0])
}

fn parse_ulid(s: &str) -> Result<Ulid, CommandError> {
    Ulid::from_string(s).map_err(|e| CommandError::Parse(format!("invalid ULID {s:?}: {e}")))
}

/// UTC wall time to epoch milliseconds.
pub fn parse_time(s: &str) -> Result<Ms, CommandError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
        .ok_or_else(|| CommandError::Parse(format!("invalid time {s:?}")))
}

fn parse_slot(start: &str, end: &str) -> Result<Slot, CommandError> {
    let start = parse_time(start)?;
    let end = match end {
        "-" => None,
        other => Some(parse_time(other)?),
    };
    Ok(Slot { start, end })
}

fn parse_minutes(s: &str) -> Result<Ms, CommandError> {
    s.parse::<u32>()
        .map(|min| min as Ms * MINUTE)
        .map_err(|e| CommandError::Parse(format!("invalid minutes {s:?}: {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    WrongArity(&'static str, usize, usize),
    Parse(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty command"),
            CommandError::Unknown(verb) => write!(f, "unknown command: {verb}"),
            CommandError::WrongArity(cmd, expected, got) => {
                write!(f, "{cmd}: expected {expected} arguments, got {got}")
            }
            CommandError::Parse(s) => write!(f, "parse error: {s}"),
        }
    }
}

impl std::error::Error for CommandError {}
