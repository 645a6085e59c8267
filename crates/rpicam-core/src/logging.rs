use crate::{errors::Error, Result};

/// Initialize tracing for the bot.
///
/// `RUST_LOG` wins when set. Otherwise our crates log at `info`, or at `debug`
/// (transport included) when `verbose` is on.
pub fn init(service_name: &str, verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name, verbose)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::External(format!("failed to install tracing subscriber: {e}")))
}

fn default_directives(service_name: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    let service = service_name.replace('-', "_");
    let mut out = format!(
        "warn,{service}={level},rpicam_core={level},rpicam_capture={level},rpicam_telegram={level}"
    );
    if verbose {
        out.push_str(",teloxide=debug");
    }
    out
}

/// In-memory log sink for tests that assert on what got logged.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct LogBuffer {
    buf: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[cfg(test)]
impl LogBuffer {
    /// Plain-text subscriber writing into this buffer, levels `info` and up.
    pub(crate) fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .without_time()
            .finish()
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        let buf = self.buf.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    pub(crate) fn lines_at(&self, level: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.split_whitespace().next() == Some(level))
            .collect()
    }
}

#[cfg(test)]
impl std::io::Write for LogBuffer {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
