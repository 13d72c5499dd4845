//! Control-channel command parsing.
//!
//! Grounded on `original_source/vrrp_ctrl.c`'s `split_cmd`/`vrrp_ctrl_cmd`:
//! a plain whitespace tokenizer over at most three tokens, with no I/O of
//! its own — the FIFO plumbing that feeds it bytes lives in
//! `uvrrpd::fifo`.

use crate::error::{Error, Result};

/// The closed set of commands accepted on the control FIFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Stop,
    Reload,
    Status,
    SetPriority(u8),
}

/// Up to three whitespace-separated tokens read from the control FIFO,
/// matching the 64-byte line buffer `vrrp_ctrl_read` fills before dispatch.
pub const CONTROL_BUFFER_SIZE: usize = 64;

/// Split on ASCII whitespace and parse into a closed command. Unknown
/// verbs, and `prio` without a numeric argument, are rejected.
pub fn parse(line: &[u8]) -> Result<ControlCommand> {
    let text = std::str::from_utf8(line)
        .map_err(|_| Error::protocol("control command is not valid UTF-8"))?
        .trim();

    let mut tokens = text.split_whitespace();
    let verb = tokens
        .next()
        .ok_or_else(|| Error::protocol("empty control command"))?;

    match verb {
        "stop" => Ok(ControlCommand::Stop),
        "reload" => Ok(ControlCommand::Reload),
        "state" | "status" => Ok(ControlCommand::Status),
        "prio" => {
            let arg = tokens
                .next()
                .ok_or_else(|| Error::protocol("prio requires a numeric argument"))?;
            let value: u8 = arg
                .parse()
                .map_err(|_| Error::protocol(format!("invalid priority value: {arg}")))?;
            if value == 0 {
                return Err(Error::protocol("priority must be between 1 and 255"));
            }
            Ok(ControlCommand::SetPriority(value))
        }
        other => Err(Error::protocol(format!("unknown control command: {other}"))),
    }
}
