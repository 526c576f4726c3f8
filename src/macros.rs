//! Logging macros.
//!
//! Each macro captures the template and arguments into a binary snapshot and
//! pushes it through the given logger. The level check runs first, so a
//! filtered call never pays for capture.

/// Log at an explicit level: `log!(logger, Level::Info, "x = {}", x)`.
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $template:literal $(, $arg:expr)* $(,)?) => {{
        let logger = &$logger;
        let level = $level;
        if logger.enabled(level) {
            logger.log(level, $template, &[$($crate::snapshot::ToArg::to_arg(&$arg)),*])
        } else {
            $crate::ring::PushResult::DroppedNewest
        }
    }};
}

/// Log at an explicit level and block until the record reached the sink.
#[macro_export]
macro_rules! log_wfc {
    ($logger:expr, $level:expr, $template:literal $(, $arg:expr)* $(,)?) => {{
        let logger = &$logger;
        let level = $level;
        if logger.enabled(level) {
            logger.log_wfc(level, $template, &[$($crate::snapshot::ToArg::to_arg(&$arg)),*])
        } else {
            $crate::ring::PushResult::DroppedNewest
        }
    }};
}

#[macro_export]
macro_rules! trace {
    ($logger:expr, $template:literal $(, $arg:expr)* $(,)?) => {
        $crate::log!($logger, $crate::Level::Trace, $template $(, $arg)*)
    };
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $template:literal $(, $arg:expr)* $(,)?) => {
        $crate::log!($logger, $crate::Level::Debug, $template $(, $arg)*)
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $template:literal $(, $arg:expr)* $(,)?) => {
        $crate::log!($logger, $crate::Level::Info, $template $(, $arg)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($logger:expr, $template:literal $(, $arg:expr)* $(,)?) => {
        $crate::log!($logger, $crate::Level::Warn, $template $(, $arg)*)
    };
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $template:literal $(, $arg:expr)* $(,)?) => {
        $crate::log!($logger, $crate::Level::Error, $template $(, $arg)*)
    };
}

#[macro_export]
macro_rules! critical {
    ($logger:expr, $template:literal $(, $arg:expr)* $(,)?) => {
        $crate::log!($logger, $crate::Level::Critical, $template $(, $arg)*)
    };
}

#[cfg(test)]
mod tests {
    use crate::error::Result;
    use crate::format::MessageFormatter;
    use crate::level::Level;
    use crate::logger::{ Logger, LoggerConfig };
    use crate::sink::Sink;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct VecSink {
        lines: Mutex<Vec<String>>,
    }

    impl Sink for VecSink {
        fn write(&self, line: &str) -> Result<()> {
            self.lines.lock().push(line.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_macro_argument_capture() {
        let sink = Arc::new(VecSink { lines: Mutex::new(Vec::new()) });
        let logger = Logger::with_output(
            LoggerConfig::sync(),
            Arc::new(MessageFormatter),
            vec![Arc::clone(&sink) as Arc<dyn Sink>]
        ).unwrap();

        let owned = String::from("dynamic");
        crate::info!(logger, "i={} u={} f={} b={} s={}", 3i32, 9u64, 2.5f64, true, owned);
        crate::warn!(logger, "bare");

        let lines = sink.lines.lock();
        assert_eq!(lines[0], "i=3 u=9 f=2.500000 b=true s=dynamic");
        assert_eq!(lines[1], "bare");
    }

    #[test]
    fn test_macro_respects_level() {
        let sink = Arc::new(VecSink { lines: Mutex::new(Vec::new()) });
        let logger = Logger::with_output(
            LoggerConfig::sync().with_level(Level::Error),
            Arc::new(MessageFormatter),
            vec![Arc::clone(&sink) as Arc<dyn Sink>]
        ).unwrap();

        let result = crate::debug!(logger, "invisible");
        assert!(!result.is_published());
        crate::critical!(logger, "visible");
        assert_eq!(sink.lines.lock().len(), 1);
    }
}
