use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Summary of one finished reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassMetrics {
    pub pass: &'static str,
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration_ms: u128,
}

impl PassMetrics {
    pub fn new(pass: &'static str, total: usize) -> Self {
        Self {
            pass,
            total,
            ..Self::default()
        }
    }

    /// Regions visited so far, whatever their outcome.
    pub fn visited(&self) -> usize {
        self.processed + self.skipped + self.failed
    }

    pub fn log(&self) {
        if self.failed > 0 {
            tracing::warn!(
                pass = self.pass,
                total = self.total,
                visited = self.visited(),
                processed = self.processed,
                skipped = self.skipped,
                failed = self.failed,
                duration_ms = self.duration_ms,
                "pass finished with {} failed regions",
                self.failed
            );
        } else {
            tracing::info!(
                pass = self.pass,
                total = self.total,
                visited = self.visited(),
                processed = self.processed,
                skipped = self.skipped,
                duration_ms = self.duration_ms,
                "pass finished"
            );
        }
    }
}
