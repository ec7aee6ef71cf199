//! Line-oriented output sinks.
//!
//! Every line a listener emits goes through an [`OutputChannel`], which puts
//! the configured prefix in front of it and flushes the sink right away. A
//! fatal error may end the process at any moment, so nothing is ever left
//! sitting in a buffer.
//!
//! [`StatsChannel`] is the secondary, machine readable channel of the
//! test-integrated listener.

use std::{
    fmt::{self, Write as _},
    fs::File,
    io::{self, Write},
    path::Path,
};

use crate::options::ListenerConfig;

/// The two standard streams a listener may write its primary output to.
pub struct OutputStreams {
    /// Used unless `use.stderr` is set.
    pub stdout: Box<dyn Write + Send>,
    /// Used when `use.stderr` is set.
    pub stderr: Box<dyn Write + Send>,
}

impl OutputStreams {
    /// The process's standard output and standard error.
    pub fn standard() -> Self {
        Self {
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
        }
    }

    /// Replaces both streams, for capturing output.
    pub fn new(stdout: impl Write + Send + 'static, stderr: impl Write + Send + 'static) -> Self {
        Self {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        }
    }
}

impl Default for OutputStreams {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for OutputStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStreams").finish_non_exhaustive()
    }
}

/// A byte sink that prefixes and flushes every line.
pub struct OutputChannel {
    sink: Box<dyn Write + Send>,
    prefix: String,
    line: String,
}

impl OutputChannel {
    /// Wraps `sink`, prepending `prefix` to each line.
    pub fn new(sink: impl Write + Send + 'static, prefix: impl Into<String>) -> Self {
        Self::from_boxed(Box::new(sink), prefix.into())
    }

    /// Picks the stream selected by `config` and applies its prefix.
    pub fn open(config: &ListenerConfig, streams: OutputStreams) -> Self {
        let sink = if config.use_stderr {
            streams.stderr
        } else {
            streams.stdout
        };
        Self::from_boxed(sink, config.prefix().to_owned())
    }

    fn from_boxed(sink: Box<dyn Write + Send>, prefix: String) -> Self {
        Self {
            sink,
            prefix,
            line: String::new(),
        }
    }

    /// The prefix applied to each line.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Emits one line. The text must not contain a newline.
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        self.line.clear();
        self.line.push_str(&self.prefix);
        // Writing into a String cannot fail.
        let _ = self.line.write_fmt(args);
        self.line.push('\n');

        if let Err(error) = self
            .sink
            .write_all(self.line.as_bytes())
            .and_then(|()| self.sink.flush())
        {
            tracing::warn!(%error, "failed to write listener output");
        }
    }

    /// Emits a line holding only the prefix.
    pub fn blank(&mut self) {
        self.line(format_args!(""));
    }
}

impl fmt::Debug for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputChannel")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// The unbuffered channel for machine readable statistics.
pub struct StatsChannel {
    sink: Box<dyn Write + Send>,
}

impl StatsChannel {
    /// Creates (or truncates) the file at `path`.
    ///
    /// Returns `None` if the file cannot be opened; the channel is then
    /// simply disabled.
    pub fn create(path: &Path) -> Option<Self> {
        match File::create(path) {
            Ok(file) => Some(Self::new(file)),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "statistics output disabled");
                None
            }
        }
    }

    /// Writes statistics to an arbitrary sink.
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    /// Emits one statement and flushes it.
    pub fn statement(&mut self, args: fmt::Arguments<'_>) {
        let mut text = args.to_string();
        text.push('\n');
        if let Err(error) = self
            .sink
            .write_all(text.as_bytes())
            .and_then(|()| self.sink.flush())
        {
            tracing::warn!(%error, "failed to write statistics output");
        }
    }
}

impl fmt::Debug for StatsChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsChannel").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{options::Options, testing::SharedBuffer};

    #[test]
    fn test_every_line_is_prefixed() {
        let buffer = SharedBuffer::new();
        let mut channel = OutputChannel::new(buffer.clone(), "[T] ");
        channel.line(format_args!("first {}", 1));
        channel.blank();
        channel.line(format_args!("third"));
        assert_eq!(buffer.contents(), "[T] first 1\n[T] \n[T] third\n");
    }

    #[test]
    fn test_open_selects_stream() {
        let stdout = SharedBuffer::new();
        let stderr = SharedBuffer::new();
        let config = ListenerConfig::from_options(&Options::from_pairs([("use.stderr", "true")]));
        let mut channel =
            OutputChannel::open(&config, OutputStreams::new(stdout.clone(), stderr.clone()));
        channel.line(format_args!("hello"));
        assert_eq!(stdout.contents(), "");
        assert_eq!(stderr.contents(), "hello\n");
        assert_eq!(channel.prefix(), "");
    }

    #[test]
    fn test_stats_channel_unopenable_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir").join("stats.php");
        assert!(StatsChannel::create(&missing).is_none());
    }

    #[test]
    fn test_stats_channel_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.php");
        let mut channel = StatsChannel::create(&path).unwrap();
        channel.statement(format_args!("$results->setNumLeaks({});", 2));
        // Visible before the channel is dropped.
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "$results->setNumLeaks(2);\n"
        );
    }
}
