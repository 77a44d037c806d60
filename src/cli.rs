use console::{measure_text_width, Term};

/// Width of the right-aligned message prefix column, including the trailing space
const PREFIX_LEN: usize = 10;

/// Shared terminal writer for all prefixed status messages.
///
/// Messages go to stderr so that `--json` output and source bundles on stdout
/// stay machine readable.
pub struct Writer {
    term: Term,
}

impl Writer {
    pub fn new() -> Self {
        Writer {
            term: Term::stderr(),
        }
    }

    pub fn writeln(&self, prefix: &str, msg: &str) -> std::io::Result<()> {
        self.term
            .write_line(&format!("{}{}", gen_prefix(prefix), msg))
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn gen_prefix(prefix: &str) -> String {
    let width = measure_text_width(prefix);
    let padding = (PREFIX_LEN - 1).saturating_sub(width);
    format!("{}{} ", " ".repeat(padding), prefix)
}

#[macro_export]
macro_rules! msg {
    ($prefix:expr, $($arg:tt)+) => {
        $crate::WRITER.writeln($prefix, &format!($($arg)+)).ok();
    };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {
        if $crate::VERBOSE.load(std::sync::atomic::Ordering::Relaxed) {
            $crate::WRITER
                .writeln(&console::style("DEBUG").dim().to_string(), &format!($($arg)+))
                .ok();
        }
    };
}

#[macro_export]
macro_rules! success {
    ($($arg:tt)+) => {
        $crate::WRITER
            .writeln(&console::style("SUCCESS").green().bold().to_string(), &format!($($arg)+))
            .ok();
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {
        $crate::WRITER
            .writeln(&console::style("INFO").blue().bold().to_string(), &format!($($arg)+))
            .ok();
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {
        $crate::WRITER
            .writeln(&console::style("WARNING").yellow().bold().to_string(), &format!($($arg)+))
            .ok();
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => {
        $crate::WRITER
            .writeln(&console::style("ERROR").red().bold().to_string(), &format!($($arg)+))
            .ok();
    };
}

#[macro_export]
macro_rules! due_to {
    ($($arg:tt)+) => {
        $crate::WRITER
            .writeln(&console::style("DUE TO").yellow().bold().to_string(), &format!($($arg)+))
            .ok();
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prefix_is_right_aligned() {
        assert_eq!(gen_prefix("INFO"), "     INFO ");
        assert_eq!(gen_prefix(""), "          ");
        assert_eq!(gen_prefix("A VERY LONG PREFIX"), "A VERY LONG PREFIX ");
    }
}
