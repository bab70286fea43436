// Worker constants (no magic values in the loop)
use std::time::Duration;

/// Sleep between polls when no job is available (15s)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Bounded attempts for claim/complete/fail queue calls
pub const QUEUE_CALL_ATTEMPTS: u32 = 3;

/// Delay between queue call retries (500ms)
pub const QUEUE_CALL_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Progress reported while the finished output is handed back
pub const UPLOAD_PROGRESS: u8 = 98;

/// Status message accompanying the upload progress report
pub const UPLOAD_MESSAGE: &str = "uploading output";
