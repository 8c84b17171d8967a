//! Post-run reporter.
//!
//! Renders the function catalog and the recorded memory touches into the
//! text dump consumed by reverse-engineering tooling. The data model lives
//! in [`crate::function`] and [`crate::recorder`]; this module owns only the
//! textual layout.

use std::io::{self, Write};

use crate::function::FunctionTracker;
use crate::recorder::AddressRecorder;

/// Write the execution dump: a header listing observed globals, one entry
/// per discovered function with its callers and return sites, and a footer.
pub fn write_execution_dump<W: Write>(
    out: &mut W,
    tracker: &FunctionTracker,
    recorder: &AddressRecorder,
) -> io::Result<()> {
    writeln!(out, "; relic86 execution dump")?;

    if recorder.is_enabled() {
        let touches = recorder.touches();
        writeln!(out, "; globals observed: {}", touches.len())?;
        for touch in touches {
            writeln!(
                out,
                "global {} {} {} ; linear {:05X}",
                touch.width.label(),
                touch.kind.label(),
                touch.address,
                touch.address.linear()
            )?;
        }
    } else {
        writeln!(out, "; address recording disabled")?;
    }

    let functions = tracker.functions();
    writeln!(out, "; functions observed: {}", functions.len())?;
    for info in functions.values() {
        writeln!(out, "function {} {}", info.name_or_default(), info.address)?;
        writeln!(out, "  calls {}", info.calls)?;
        if info.has_override {
            writeln!(out, "  overridden")?;
        }
        for caller in &info.callers {
            writeln!(out, "  caller {}", caller)?;
        }
        for (site, count) in &info.returns {
            writeln!(out, "  return {} count {}", site, count)?;
        }
    }

    writeln!(out, "; end of dump")
}
