//! Construction options supplied by the engine.
//!
//! The engine passes a flat list of key/value pairs when it creates a
//! listener. [`Options`] keeps them in order, and [`ListenerConfig`] pulls
//! out the keys the listeners understand. Unknown keys are kept but ignored.
//!
//! | key | effect |
//! |---|---|
//! | `use.stderr` | `"true"` sends primary output to stderr |
//! | `output.prefix` | prepended to every emitted line |
//! | `max.leaks.to.report` | cap on individually reported leaks |
//! | `webcat.stats.path` | file receiving machine readable statistics |
//! | `fatal.policy` | `abort`, `fault` or `unwind` |

use std::path::PathBuf;

use indexmap::IndexMap;

use crate::termination::Termination;

/// Key selecting the error stream for primary output.
pub const USE_STDERR: &str = "use.stderr";
/// Key holding the line prefix.
pub const OUTPUT_PREFIX: &str = "output.prefix";
/// Key holding the leak report cap.
pub const MAX_LEAKS_TO_REPORT: &str = "max.leaks.to.report";
/// Key holding the path of the statistics file.
pub const STATS_PATH: &str = "webcat.stats.path";
/// Key selecting how fatal errors stop execution.
pub const FATAL_POLICY: &str = "fatal.policy";

/// An ordered set of construction options.
///
/// ```
/// use dereferee::options::Options;
///
/// let options = Options::from_pairs([
///     ("output.prefix", "[T] "),
///     ("", "ignored: the empty key ends the list"),
///     ("use.stderr", "true"),
/// ]);
/// assert_eq!(options.get("output.prefix"), Some("[T] "));
/// assert_eq!(options.get("use.stderr"), None);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    entries: IndexMap<String, String>,
}

impl Options {
    /// Creates an empty option list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects options from key/value pairs.
    ///
    /// Collection stops at the first pair whose key is empty. When a key
    /// appears more than once the last value wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::new();
        for (key, value) in pairs {
            let key = key.as_ref();
            if key.is_empty() {
                break;
            }
            options.set(key, value.as_ref());
        }
        options
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        self.entries.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Returns the value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Iterates over the options in the order they were first supplied.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no options were supplied.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

/// The settings a listener is built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Send primary output to stderr instead of stdout.
    pub use_stderr: bool,
    /// Prepended to every emitted line.
    pub output_prefix: Option<String>,
    /// How many leaks are reported individually before truncating.
    pub max_leaks_to_report: usize,
    /// Where machine readable statistics go, if anywhere.
    pub stats_path: Option<PathBuf>,
    /// How fatal errors stop execution.
    pub termination: Termination,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            use_stderr: false,
            output_prefix: None,
            max_leaks_to_report: usize::MAX,
            stats_path: None,
            termination: Termination::for_target(),
        }
    }
}

impl ListenerConfig {
    /// Builds a configuration from engine options.
    ///
    /// Malformed values fall back to their defaults.
    pub fn from_options(options: &Options) -> Self {
        let mut config = Self::default();
        for (key, value) in options.iter() {
            match key {
                USE_STDERR => config.use_stderr = value == "true",
                OUTPUT_PREFIX => config.output_prefix = Some(value.to_owned()),
                MAX_LEAKS_TO_REPORT => match value.trim().parse() {
                    Ok(max) => config.max_leaks_to_report = max,
                    Err(error) => {
                        tracing::warn!(key, value, %error, "ignoring malformed leak report cap");
                    }
                },
                STATS_PATH => config.stats_path = Some(PathBuf::from(value)),
                FATAL_POLICY => match value.parse() {
                    Ok(termination) => config.termination = termination,
                    Err(error) => tracing::warn!(key, value, %error, "ignoring fatal policy"),
                },
                _ => tracing::debug!(key, "ignoring unrecognized listener option"),
            }
        }
        config
    }

    /// The prefix to prepend to every line, or an empty string.
    pub fn prefix(&self) -> &str {
        self.output_prefix.as_deref().unwrap_or("")
    }
}

impl From<&Options> for ListenerConfig {
    fn from(options: &Options) -> Self {
        Self::from_options(options)
    }
}
