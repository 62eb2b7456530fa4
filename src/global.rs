//! A process-wide printer on standard output, for code that just wants a drop-in
//! `print` without passing an [EphemeralPrinter] around.
//!
//! The instance is created on first use and never dropped, so call [wait] before exiting
//! if the queue should play out.

use std::fmt::Display;
use std::sync::OnceLock;

use crate::error::Result;
use crate::printer::{EphemeralPrinter, PrintOptions};
use crate::wait::Cadence;

static PRINTER: OnceLock<EphemeralPrinter> = OnceLock::new();

pub fn printer() -> &'static EphemeralPrinter {
    PRINTER.get_or_init(EphemeralPrinter::new)
}

pub fn print<I>(parts: I, options: &PrintOptions) -> Result<()>
where
    I: IntoIterator,
    I::Item: Display,
{
    printer().print(parts, options)
}

pub fn set_default_display_duration(secs: f64) -> Result<()> {
    printer().set_default_display_duration(secs)
}

pub fn set_refresh_cadence(cadence: impl Into<Cadence>) {
    printer().set_refresh_cadence(cadence)
}

pub fn is_running() -> bool {
    printer().is_running()
}

pub fn clear(undisplay: bool) {
    printer().clear(undisplay)
}

pub fn skip() {
    printer().skip()
}

pub fn wait() -> Result<()> {
    printer().wait()
}

/// Formats its arguments like [format!] and shows the result ephemerally on the default
/// printer, flushed so it appears right away. Needs a default display duration.
#[macro_export]
macro_rules! temp_print {
    ($($arg:tt)*) => {
        $crate::global::print(
            [::std::format!($($arg)*)],
            &$crate::PrintOptions::new().ephemeral().flush(),
        )
    };
}
