//! Line breakpoints, owned by the interpreter and round-tripped through
//! the hook on every change.

use futures::future::try_join_all;

use crate::vim::{
    correlate::{CallError, Correlator},
    link::Link,
    protocol::{ClearLineBreakpointsArguments, HookFunction, SetLineBreakpointArguments},
};

/// Replaces the breakpoint set for one file: a single clear plus one set
/// per requested line.
///
/// The clear is written first (the writer channel preserves order), but
/// the replies may land in any order, so everything is awaited together.
/// Any failed call fails the whole request; the editor then retries with
/// its next `setBreakpoints`.
pub async fn apply_line_breakpoints(
    correlator: &Correlator,
    link: &Link,
    file: &str,
    lines: &[i64],
) -> Result<(), CallError> {
    // Pre-encoded so the clear and set calls share one future type.
    let clear = serde_json::to_value(ClearLineBreakpointsArguments {
        file: file.to_string(),
    })
    .map_err(CallError::Encode)?;

    let mut calls = Vec::with_capacity(lines.len() + 1);
    calls.push(correlator.call(link, HookFunction::ClearLineBreakpoints, clear));
    for &line in lines {
        let set = serde_json::to_value(SetLineBreakpointArguments {
            file: file.to_string(),
            line,
        })
        .map_err(CallError::Encode)?;
        calls.push(correlator.call(link, HookFunction::SetLineBreakpoint, set));
    }
    try_join_all(calls).await?;
    Ok(())
}
