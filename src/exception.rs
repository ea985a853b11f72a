use crate::event::{CallerFrame, LogEvent};

/// Upper bound on the number of frames reported in `exception.traceback`.
pub const MAX_TRACEBACK_FRAMES: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionSummary {
    pub name: String,
    pub message: Option<String>,
    pub traceback: Vec<String>,
}

/// Summarize the event's throwable, or `None` if it carries none.
///
/// The traceback walks at most [`MAX_TRACEBACK_FRAMES`] caller frames,
/// innermost first, and stops at the first frame whose file or line is
/// unknown.
pub fn summarize(event: &LogEvent) -> Option<ExceptionSummary> {
    let throwable = event.throwable.as_ref()?;

    Some(ExceptionSummary {
        name: throwable.class_name.clone(),
        message: throwable.message.clone(),
        traceback: traceback(&event.caller_frames),
    })
}

pub fn traceback(frames: &[CallerFrame]) -> Vec<String> {
    frames
        .iter()
        .take(MAX_TRACEBACK_FRAMES)
        .map_while(format_frame)
        .collect()
}

fn format_frame(frame: &CallerFrame) -> Option<String> {
    frame.file.as_ref()?;
    let line = frame.line?;
    Some(format!(
        "{}:{} {}",
        line,
        short_class_name(&frame.class_name),
        frame.method_name
    ))
}

/// Last segment of a `.` or `::` qualified name.
pub fn short_class_name(qualified: &str) -> &str {
    qualified
        .rsplit(|c: char| c == '.' || c == ':')
        .next()
        .unwrap_or(qualified)
}
