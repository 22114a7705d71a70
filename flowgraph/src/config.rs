//! Runtime configuration.

use std::time::Duration;

use log::LevelFilter;

/// Knobs of the simulator.
#[derive(Clone, Debug)]
pub struct Config {
    /// Diagnostic log level for the scheduler and channel fabric.
    pub log_level: LevelFilter,
    /// Level gating the per-run message log; deliveries are recorded when
    /// this admits `Info`.
    pub msg_log_level: LevelFilter,
    /// Requested host thread-switch granularity. Meaningful only on hosts
    /// that time-slice workers cooperatively; with preemptive threads it is
    /// accepted and ignored.
    pub thread_switch_interval: Option<Duration>,
    /// Global default capacity for standard channels. Combined with each
    /// input port's own hint: the smaller of the two when both are set, the
    /// larger otherwise. A bounded capacity keeps a fast producer yielding
    /// to its consumer instead of running unchecked.
    pub capacity: usize,
    /// Cadence at which blocked channel operations re-check the stop flag.
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            log_level: LevelFilter::Error,
            msg_log_level: LevelFilter::Error,
            thread_switch_interval: None,
            capacity: 16,
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(feature = "getopts")]
impl Config {
    /// Installs options into a [`getopts::Options`] struct that correspond
    /// to the parameters in the configuration.
    ///
    /// It is the caller's responsibility to ensure that the installed
    /// options do not conflict with any other options that may exist in
    /// `opts`, or that may be installed into `opts` in the future.
    ///
    /// This method is only available if the `getopts` feature is enabled,
    /// which it is by default.
    pub fn install_options(opts: &mut getopts::Options) {
        opts.optopt("l", "log-level", "diagnostic log level", "LEVEL");
        opts.optopt("m", "message-level", "message log level", "LEVEL");
        opts.optopt("q", "capacity", "default channel capacity", "NUM");
        opts.optopt("i", "poll-interval", "seconds between shutdown checks while blocked", "SECS");
        opts.optopt("s", "switch-interval", "requested thread-switch granularity in seconds", "SECS");
    }

    /// Instantiates a configuration based upon the parsed options in
    /// `matches`.
    ///
    /// The `matches` object must have been constructed from a
    /// [`getopts::Options`] which contained at least the options installed
    /// by [`Self::install_options`].
    pub fn from_matches(matches: &getopts::Matches) -> Result<Config, String> {
        let defaults = Config::default();
        let log_level = match matches.opt_str("l") {
            Some(level) => level.parse().map_err(|e| format!("{}", e))?,
            None => defaults.log_level,
        };
        let msg_log_level = match matches.opt_str("m") {
            Some(level) => level.parse().map_err(|e| format!("{}", e))?,
            None => defaults.msg_log_level,
        };
        let capacity =
            matches.opt_get_default("q", defaults.capacity).map_err(|e| e.to_string())?;
        let poll_interval = match matches.opt_str("i") {
            Some(seconds) => {
                Duration::from_secs_f64(seconds.parse::<f64>().map_err(|e| e.to_string())?)
            }
            None => defaults.poll_interval,
        };
        let thread_switch_interval = matches
            .opt_str("s")
            .map(|seconds| seconds.parse::<f64>().map(Duration::from_secs_f64))
            .transpose()
            .map_err(|e| e.to_string())?;
        Ok(Config { log_level, msg_log_level, thread_switch_interval, capacity, poll_interval })
    }

    /// Constructs a new configuration by parsing the supplied text
    /// arguments. Most commonly, callers supply `std::env::args()`.
    pub fn from_args<I: Iterator<Item = String>>(args: I) -> Result<Config, String> {
        let mut opts = getopts::Options::new();
        Config::install_options(&mut opts);
        let matches = opts.parse(args).map_err(|e| e.to_string())?;
        Config::from_matches(&matches)
    }
}

#[cfg(all(test, feature = "getopts"))]
mod tests {
    use super::*;

    #[test]
    fn args_override_defaults() {
        let args = ["-l", "debug", "-q", "4", "-i", "0.25"].iter().map(|s| s.to_string());
        let config = Config::from_args(args).unwrap();
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.capacity, 4);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.msg_log_level, LevelFilter::Error);
    }

    #[test]
    fn bad_level_is_rejected() {
        let args = ["-l", "chatty"].iter().map(|s| s.to_string());
        assert!(Config::from_args(args).is_err());
    }
}
