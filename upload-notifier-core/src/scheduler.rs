// hourly report loop - sleeps to the top of each hour, drains the buffer and sends one message

use crate::buffer::{BufferedLine, NotificationBuffer};
use crate::error::SendError;
use crate::notifier::{Notifier, ParseMode};
use chrono::{DateTime, Duration as ChronoDuration, Local, LocalResult, TimeZone, Timelike};
use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const REPORT_INTRO: &str = "The following backups completed successfully:";

/// telegram refuses longer message texts
pub const MAX_MESSAGE_CHARS: usize = 4096;

lazy_static! {
    // characters with meaning in telegram's legacy markdown
    static ref MARKDOWN_SPECIAL: Regex = Regex::new(r"([_*`\[])").unwrap();
}

/// backslash-escape legacy markdown control characters. only valid outside an entity
pub fn escape_markdown(text: &str) -> String {
    MARKDOWN_SPECIAL.replace_all(text, r"\$1").into_owned()
}

/// wrap `text` in a bold entity. escapes are not allowed inside an entity, so every `*`
/// closes the entity, appears escaped, and the entity reopens after it
pub fn bold_markdown(text: &str) -> String {
    text.split('*')
        .map(|segment| {
            if segment.is_empty() {
                String::new()
            } else {
                format!("*{segment}*")
            }
        })
        .collect::<Vec<_>>()
        .join(r"\*")
}

fn report_header(job_name: &str) -> String {
    format!("{}\n\n{}", bold_markdown(job_name), REPORT_INTRO)
}

fn report_line(line: &BufferedLine) -> String {
    format!("{} - {}", line.timestamp, escape_markdown(&line.canonical_name))
}

/// build the hourly report: bold job name, blank line, intro, then one line per entry
pub fn format_report(job_name: &str, lines: &[BufferedLine]) -> String {
    let mut message = report_header(job_name);
    for line in lines {
        message.push('\n');
        message.push_str(&report_line(line));
    }
    message
}

/// one message of a report, covering `lines` of the drained batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPart {
    pub text: String,
    pub lines: Range<usize>,
}

/// split the report into messages of at most [`MAX_MESSAGE_CHARS`], each with the full header.
/// a single line too long to fit still gets a message of its own
pub fn format_report_parts(job_name: &str, lines: &[BufferedLine]) -> Vec<ReportPart> {
    let header = report_header(job_name);
    let header_len = header.chars().count();
    let mut parts = Vec::new();
    let mut text = header.clone();
    let mut len = header_len;
    let mut start = 0;

    for (index, line) in lines.iter().enumerate() {
        let rendered = report_line(line);
        let added = rendered.chars().count() + 1;
        if index > start && len + added > MAX_MESSAGE_CHARS {
            parts.push(ReportPart {
                text: std::mem::replace(&mut text, header.clone()),
                lines: start..index,
            });
            len = header_len;
            start = index;
        }
        text.push('\n');
        text.push_str(&rendered);
        len += added;
    }

    if start < lines.len() {
        parts.push(ReportPart {
            text,
            lines: start..lines.len(),
        });
    }
    parts
}

/// the first instant strictly after `now` whose minutes and seconds are zero, in `now`'s zone.
///
/// local hours that do not exist (spring-forward gaps) are skipped; for repeated hours the
/// earliest occurrence still in the future is used.
pub fn next_top_of_hour<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let local = now.naive_local();
    let mut candidate = local
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(local);

    loop {
        candidate += ChronoDuration::hours(1);
        let resolved = match tz.from_local_datetime(&candidate) {
            LocalResult::Single(t) => Some(t),
            LocalResult::Ambiguous(early, late) => {
                if early > *now {
                    Some(early)
                } else {
                    Some(late)
                }
            }
            LocalResult::None => None,
        };
        if let Some(t) = resolved.filter(|t| t > now) {
            return t;
        }
    }
}

/// time left until the next top-of-hour boundary
pub fn until_next_hour<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    (next_top_of_hour(now) - now.clone())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// result of one drain cycle
#[derive(Debug)]
pub enum FlushOutcome {
    /// buffer was empty, nothing sent
    Empty,
    Sent { lines: usize },
    Failed { lines: usize, requeued: bool, error: SendError },
}

/// drains the shared buffer on the hour and hands the report to the notifier
pub struct Scheduler {
    buffer: NotificationBuffer,
    notifier: Arc<dyn Notifier>,
    recipient: String,
    job_name: String,
    requeue_failed: bool,
}

impl Scheduler {
    pub fn new(
        buffer: NotificationBuffer,
        notifier: Arc<dyn Notifier>,
        recipient: impl Into<String>,
        job_name: impl Into<String>,
    ) -> Self {
        Self {
            buffer,
            notifier,
            recipient: recipient.into(),
            job_name: job_name.into(),
            requeue_failed: false,
        }
    }

    /// put drained lines back into the buffer when the send fails
    pub fn requeue_failed(mut self, enabled: bool) -> Self {
        self.requeue_failed = enabled;
        self
    }

    /// drain once and dispatch if there was anything buffered. never panics on send errors.
    ///
    /// long reports go out as several messages. when one fails, it and the parts after it are
    /// undelivered; they are requeued only if enabled and the error is worth retrying
    pub async fn flush(&self) -> FlushOutcome {
        // the lock is only held inside drain(), never across the send
        let mut lines = self.buffer.drain();
        if lines.is_empty() {
            debug!("no finished uploads this cycle");
            return FlushOutcome::Empty;
        }

        let count = lines.len();
        let parts = format_report_parts(&self.job_name, &lines);
        for part in &parts {
            if let Err(e) = self
                .notifier
                .send_message(&self.recipient, &part.text, ParseMode::Markdown)
                .await
            {
                let undelivered = lines.split_off(part.lines.start);
                let missed = undelivered.len();
                error!("failed to send report of {missed} finished uploads: {e}");

                let requeued = self.requeue_failed && e.is_retryable();
                if requeued {
                    warn!("requeueing {missed} lines for the next cycle");
                    self.buffer.requeue(undelivered);
                } else if self.requeue_failed {
                    error!("dropping {missed} lines, telegram will not accept them on retry");
                }
                return FlushOutcome::Failed {
                    lines: missed,
                    requeued,
                    error: e,
                };
            }
        }

        info!(
            "sent report of {count} finished uploads in {} message(s)",
            parts.len()
        );
        FlushOutcome::Sent { lines: count }
    }

    /// sleep until each top of hour and flush, until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            let wait = until_next_hour(&Local::now());
            info!(
                "Sleeping for {:.3} seconds until next Telegram notification.",
                wait.as_secs_f64()
            );

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            // an in-flight send is allowed to finish; the client timeout bounds it
            self.flush().await;
        }
        info!("scheduler stopped");
    }
}
