use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  SecondsFormat,
  TimeZone,
  Utc
};
use chrono_tz::Tz;

const TIMEZONE_ENV_VAR: &str =
  "TASKFLOW_TIMEZONE";
const SYSTEM_TIMEZONE_ENV_VAR: &str =
  "TZ";

/// Resolves the zone used for every
/// calendar-day comparison.
///
/// Precedence: `TASKFLOW_TIMEZONE`,
/// then the configured id, then `TZ`,
/// then UTC.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  resolve_timezone_from(
    std::env::var(TIMEZONE_ENV_VAR)
      .ok()
      .as_deref(),
    configured,
    std::env::var(
      SYSTEM_TIMEZONE_ENV_VAR
    )
    .ok()
    .as_deref()
  )
}

pub(crate) fn resolve_timezone_from(
  env_override: Option<&str>,
  configured: Option<&str>,
  system: Option<&str>
) -> Tz {
  let candidates = [
    (env_override, TIMEZONE_ENV_VAR),
    (configured, "config"),
    (system, SYSTEM_TIMEZONE_ENV_VAR)
  ];

  for (raw, source) in candidates {
    if let Some(raw) = raw
      && let Some(tz) =
        parse_timezone(raw, source)
    {
      return tz;
    }
  }

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw
    .trim()
    .trim_start_matches(':');
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[must_use]
pub fn to_local_date(
  dt: DateTime<Utc>,
  tz: Tz
) -> NaiveDate {
  dt.with_timezone(&tz).date_naive()
}

#[must_use]
pub fn is_same_day(
  a: DateTime<Utc>,
  b: DateTime<Utc>,
  tz: Tz
) -> bool {
  to_local_date(a, tz)
    == to_local_date(b, tz)
}

#[must_use]
pub fn is_today(
  dt: DateTime<Utc>,
  now: DateTime<Utc>,
  tz: Tz
) -> bool {
  is_same_day(dt, now, tz)
}

/// Overdue is a day-granularity notion:
/// a task due earlier today is not
/// overdue yet.
#[must_use]
pub fn is_overdue(
  due: DateTime<Utc>,
  completed: bool,
  now: DateTime<Utc>,
  tz: Tz
) -> bool {
  !completed
    && due < now
    && !is_same_day(due, now, tz)
}

fn to_utc_from_local(
  local_naive: NaiveDateTime,
  tz: Tz,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime {local_naive} \
         does not exist in {tz}: \
         {context}"
      ))
    }
  }
}

/// Lenient reader for stored due dates.
///
/// Accepts RFC 3339, naive date-times
/// (read in `tz`) and bare dates (local
/// start of day). Anything else is
/// `None`, which marks the task as
/// malformed.
pub fn parse_due_timestamp(
  raw: &str,
  tz: Tz
) -> Option<DateTime<Utc>> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return to_utc_from_local(
        ndt, tz, fmt
      )
      .ok();
    }
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .ok()
  .and_then(|date| {
    to_utc_from_local(
      date.and_time(NaiveTime::MIN),
      tz,
      "date"
    )
    .ok()
  })
}

/// Joins the form's date and optional
/// time fields into one instant. A
/// missing time means local start of
/// day.
#[tracing::instrument(skip(tz))]
pub fn compose_due(
  date: &str,
  time: Option<&str>,
  tz: Tz
) -> anyhow::Result<DateTime<Utc>> {
  let date = NaiveDate::parse_from_str(
    date.trim(),
    "%Y-%m-%d"
  )
  .with_context(|| {
    format!(
      "expected YYYY-MM-DD, got \
       {date:?}"
    )
  })?;

  let time = match time
    .map(str::trim)
    .filter(|t| !t.is_empty())
  {
    | Some(raw) => {
      NaiveTime::parse_from_str(
        raw, "%H:%M"
      )
      .or_else(|_| {
        NaiveTime::parse_from_str(
          raw, "%H:%M:%S"
        )
      })
      .with_context(|| {
        format!(
          "expected HH:MM, got {raw:?}"
        )
      })?
    }
    | None => NaiveTime::MIN
  };

  to_utc_from_local(
    date.and_time(time),
    tz,
    "due date"
  )
}

/// Storage form: UTC with milliseconds,
/// e.g. `2024-03-01T09:00:00.000Z`.
#[must_use]
pub fn format_due_timestamp(
  dt: DateTime<Utc>
) -> String {
  dt.to_rfc3339_opts(
    SecondsFormat::Millis,
    true
  )
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };
  use chrono_tz::Tz;

  use super::*;

  fn berlin() -> Tz {
    "Europe/Berlin"
      .parse()
      .expect("valid zone")
  }

  #[test]
  fn completed_tasks_are_never_overdue()
  {
    let now = Utc
      .with_ymd_and_hms(
        2024, 3, 5, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let due = now - Duration::days(30);

    assert!(is_overdue(
      due,
      false,
      now,
      chrono_tz::UTC
    ));
    assert!(!is_overdue(
      due,
      true,
      now,
      chrono_tz::UTC
    ));
  }

  #[test]
  fn earlier_today_is_not_overdue() {
    let now = Utc
      .with_ymd_and_hms(
        2024, 3, 5, 18, 0, 0
      )
      .single()
      .expect("valid now");
    let this_morning = Utc
      .with_ymd_and_hms(
        2024, 3, 5, 0, 0, 0
      )
      .single()
      .expect("valid due");
    let last_night =
      this_morning - Duration::minutes(1);

    assert!(!is_overdue(
      this_morning,
      false,
      now,
      chrono_tz::UTC
    ));
    assert!(is_overdue(
      last_night,
      false,
      now,
      chrono_tz::UTC
    ));
  }

  #[test]
  fn day_boundaries_follow_the_zone() {
    let late_utc = Utc
      .with_ymd_and_hms(
        2024, 3, 9, 23, 30, 0
      )
      .single()
      .expect("valid instant");
    let next_morning = Utc
      .with_ymd_and_hms(
        2024, 3, 10, 8, 0, 0
      )
      .single()
      .expect("valid instant");

    assert!(!is_same_day(
      late_utc,
      next_morning,
      chrono_tz::UTC
    ));
    assert!(is_same_day(
      late_utc,
      next_morning,
      berlin()
    ));
  }

  #[test]
  fn parses_stored_forms() {
    let tz = berlin();
    let iso = parse_due_timestamp(
      "2024-03-01T08:00:00.000Z",
      tz
    )
    .expect("rfc3339");
    let naive = parse_due_timestamp(
      "2024-03-01T09:00",
      tz
    )
    .expect("naive local");
    let bare =
      parse_due_timestamp("2024-03-01", tz)
        .expect("bare date");

    assert_eq!(iso, naive);
    assert_eq!(
      format_due_timestamp(bare),
      "2024-02-29T23:00:00.000Z"
    );
    assert!(
      parse_due_timestamp("next week", tz)
        .is_none()
    );
    assert!(
      parse_due_timestamp("  ", tz)
        .is_none()
    );
  }

  #[test]
  fn composes_date_and_time() {
    let tz = berlin();
    let with_time = compose_due(
      "2024-03-10",
      Some("08:00"),
      tz
    )
    .expect("compose");
    let start_of_day = compose_due(
      "2024-03-10",
      Some(" "),
      tz
    )
    .expect("compose");

    assert_eq!(
      format_due_timestamp(with_time),
      "2024-03-10T07:00:00.000Z"
    );
    assert_eq!(
      format_due_timestamp(start_of_day),
      "2024-03-09T23:00:00.000Z"
    );
    assert!(
      compose_due("10/03/2024", None, tz)
        .is_err()
    );
    assert!(
      compose_due(
        "2024-03-10",
        Some("25:00"),
        tz
      )
      .is_err()
    );
  }

  #[test]
  fn dst_gaps_and_overlaps() {
    let tz: Tz = "America/New_York"
      .parse()
      .expect("valid zone");

    assert!(
      compose_due(
        "2024-03-10",
        Some("02:30"),
        tz
      )
      .is_err()
    );

    let ambiguous = compose_due(
      "2024-11-03",
      Some("01:30"),
      tz
    )
    .expect("ambiguous picks earliest");
    assert_eq!(
      format_due_timestamp(ambiguous),
      "2024-11-03T05:30:00.000Z"
    );
  }

  #[test]
  fn timezone_precedence() {
    assert_eq!(
      resolve_timezone_from(
        Some("Asia/Tokyo"),
        Some("Europe/Berlin"),
        None
      ),
      chrono_tz::Asia::Tokyo
    );
    assert_eq!(
      resolve_timezone_from(
        Some("Not/AZone"),
        Some("Europe/Berlin"),
        Some("UTC")
      ),
      chrono_tz::Europe::Berlin
    );
    assert_eq!(
      resolve_timezone_from(
        None,
        None,
        Some(":America/Chicago")
      ),
      chrono_tz::America::Chicago
    );
    assert_eq!(
      resolve_timezone_from(
        None, None, None
      ),
      chrono_tz::UTC
    );
  }
}
