//! Cluster topology parsing
//!
//! One destination node per line:
//!
//! ```text
//! # node-id     label        slots (single or inclusive ranges)
//! 07c37dfe...   node-a       0-5460
//! e7d1eecc...   node-b       5461-10922 16000
//! 6ec23923...   node-c       10923-15999 16001-16383
//! ```
//!
//! Blank lines and `#` comments are skipped. Syntax errors fail parsing;
//! slot coverage is deliberately NOT checked here, since full 16384-slot
//! coverage is the multiplexer's construction invariant.

use std::path::Path;

use contracts::{ContractError, SlotAssignment};

/// Parse a topology file into per-slot assignments.
pub fn parse_file(path: &Path) -> Result<Vec<SlotAssignment>, ContractError> {
    let content = std::fs::read_to_string(path)?;
    parse_lines(content.lines())
}

/// Parse topology lines into per-slot assignments, ranges expanded.
pub fn parse_lines<I, L>(lines: I) -> Result<Vec<SlotAssignment>, ContractError>
where
    I: IntoIterator<Item = L>,
    L: AsRef<str>,
{
    let mut assignments = Vec::new();
    for (number, line) in lines.into_iter().enumerate() {
        let line = line.as_ref().trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        parse_line(line, number + 1, &mut assignments)?;
    }
    Ok(assignments)
}

fn parse_line(
    line: &str,
    number: usize,
    out: &mut Vec<SlotAssignment>,
) -> Result<(), ContractError> {
    let mut fields = line.split_whitespace();
    let node_id = fields
        .next()
        .ok_or_else(|| line_error(number, "missing node id"))?;
    let label = fields
        .next()
        .ok_or_else(|| line_error(number, "missing node label"))?;

    let mut any_slots = false;
    for spec in fields {
        any_slots = true;
        let (start, end) = parse_slot_spec(spec, number)?;
        for slot in start..=end {
            out.push(SlotAssignment::new(node_id, slot, label));
        }
    }
    if !any_slots {
        return Err(line_error(number, "node declares no slots"));
    }
    Ok(())
}

/// A slot spec is either `N` or an inclusive range `A-B`.
fn parse_slot_spec(spec: &str, number: usize) -> Result<(u16, u16), ContractError> {
    let parse = |s: &str| {
        s.parse::<u16>()
            .map_err(|_| line_error(number, format!("invalid slot number '{s}'")))
    };
    match spec.split_once('-') {
        Some((start, end)) => {
            let (start, end) = (parse(start)?, parse(end)?);
            if start > end {
                return Err(line_error(number, format!("inverted slot range '{spec}'")));
            }
            Ok((start, end))
        }
        None => {
            let slot = parse(spec)?;
            Ok((slot, slot))
        }
    }
}

fn line_error(number: usize, message: impl std::fmt::Display) -> ContractError {
    ContractError::config_parse(format!("topology line {number}: {message}"))
}
