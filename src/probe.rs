//! Detects the other participant of the frontmost Messages conversation.

use tracing::{debug, warn};

use crate::applescript::{ERROR_PREFIX, NO_CONVERSATION_SENTINEL, ScriptInvocation};
use crate::delivery::{DeliveryError, ScriptRunner};

/// Interpret the participant script's stdout.
///
/// Blank output, the no-conversation sentinel and `Error:` answers all mean
/// there is nobody to report.
pub fn parse_participant_output(stdout: &str) -> Option<String> {
    let answer = stdout.trim();
    if answer.is_empty() || answer == NO_CONVERSATION_SENTINEL || answer.starts_with(ERROR_PREFIX)
    {
        return None;
    }
    let handle = answer.strip_prefix("tel:").unwrap_or(answer).trim();
    if handle.is_empty() {
        None
    } else {
        Some(handle.to_string())
    }
}

/// Ask Messages who is on the other end of the frontmost conversation.
///
/// A script that ran but failed is reported as `Ok(None)`; only a failure to
/// run osascript at all is an error.
pub fn active_participant(runner: &dyn ScriptRunner) -> Result<Option<String>, DeliveryError> {
    let output = runner.run(&ScriptInvocation::active_participant())?;
    if !output.success {
        warn!(status = ?output.status, stderr = %output.stderr.trim(), "participant_probe_failed");
        return Ok(None);
    }

    let participant = parse_participant_output(&output.stdout);
    debug!(found = participant.is_some(), "participant_probed");
    Ok(participant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::tests::{FakeRunner, failed_output, ok_output};

    #[test]
    fn test_parse_participant_output() {
        assert_eq!(
            parse_participant_output("+15551234567\n"),
            Some("+15551234567".to_string())
        );
        assert_eq!(
            parse_participant_output("tel:+15551234567"),
            Some("+15551234567".to_string())
        );
        assert_eq!(
            parse_participant_output("duck@example.com"),
            Some("duck@example.com".to_string())
        );
    }

    #[test]
    fn test_parse_participant_output_nobody() {
        assert_eq!(parse_participant_output(""), None);
        assert_eq!(parse_participant_output("No active conversation found\n"), None);
        assert_eq!(
            parse_participant_output("Error: Can't get item 1 of every chat."),
            None
        );
        assert_eq!(parse_participant_output("tel:"), None);
    }

    #[test]
    fn test_active_participant_uses_runner() {
        let runner = FakeRunner::answering(vec![ok_output("tel:5550001111\n")]);
        assert_eq!(
            active_participant(&runner).unwrap(),
            Some("5550001111".to_string())
        );
        assert_eq!(
            runner.calls.borrow()[0],
            ScriptInvocation::active_participant()
        );
    }

    #[test]
    fn test_active_participant_script_failure_is_none() {
        let runner = FakeRunner::answering(vec![failed_output("Messages got an error")]);
        assert_eq!(active_participant(&runner).unwrap(), None);
    }
}
