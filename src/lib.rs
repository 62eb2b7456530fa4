/*!
Self-erasing console output.

Text handed to an [EphemeralPrinter] is written to the current line of a terminal stream,
left there for its display duration and then erased in place, making room for the next
queued entry. Persistent entries go through the same queue but are written as ordinary
lines and stay.

```no_run
use temp_print::{EphemeralPrinter, PrintOptions};

# fn main() -> temp_print::Result<()> {
let printer = EphemeralPrinter::builder()
    .default_display_duration(1.5)
    .refresh_cadence(Some(0.05))
    .build()?;
printer.print(["downloading", "index"], &PrintOptions::new().ephemeral().flush())?;
printer.print(["done"], &PrintOptions::new())?;
printer.wait()?;
# Ok(())
# }
```

One background worker per printer does all the writing. For each entry it waits out the
pre-delay, writes the text, waits out the display duration and post-delay, then erases
the line with `\r`, blanks and another `\r`. Waits only notice `skip`/`overwrite` as
often as the refresh cadence lets them.
*/
mod error;
pub mod global;
mod line_replay;
mod printer;
mod queue;
mod sink;
mod wait;
mod worker;

pub use error::{Result, TempPrintError};
pub use line_replay::LineReplay;
pub use printer::{EphemeralPrinter, EphemeralPrinterBuilder, PrintOptions};
pub use queue::{DisplayQueue, EntryKind, QueueEntry};
pub use sink::{MemorySink, Sink};
pub use wait::{wait, Cadence, CancelToken, Clock, SystemClock, Waited};
