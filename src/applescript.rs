//! AppleScript programs used to drive Messages.
//!
//! Scripts are constant text. Everything that comes from the user (recipient,
//! message body, file path) travels as `osascript` arguments and reaches the
//! script through `on run argv`, so it is never parsed as AppleScript.

use serde::{Deserialize, Serialize};

/// Messages service used to reach a recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceKind {
    #[default]
    #[serde(rename = "imessage")]
    IMessage,
    #[serde(rename = "sms")]
    Sms,
}

impl ServiceKind {
    /// Value passed to the scripts to pick the service.
    pub fn script_arg(&self) -> &'static str {
        match self {
            ServiceKind::IMessage => "iMessage",
            ServiceKind::Sms => "SMS",
        }
    }
}

/// Returned by [`ACTIVE_PARTICIPANT`] when no conversation is open.
pub const NO_CONVERSATION_SENTINEL: &str = "No active conversation found";

/// Prefix returned by [`ACTIVE_PARTICIPANT`] when Messages raised an error.
pub const ERROR_PREFIX: &str = "Error:";

/// argv: handle, text, service.
pub const SEND_TEXT: &str = r#"on run argv
    set targetHandle to item 1 of argv
    set messageText to item 2 of argv
    set serviceName to item 3 of argv
    tell application "Messages"
        if serviceName is "SMS" then
            set targetService to 1st service whose service type = SMS
        else
            set targetService to 1st service whose service type = iMessage
        end if
        set targetBuddy to buddy targetHandle of targetService
        send messageText to targetBuddy
    end tell
end run"#;

/// argv: handle, POSIX path, service.
pub const SEND_FILE: &str = r#"on run argv
    set targetHandle to item 1 of argv
    set imageFile to POSIX file (item 2 of argv)
    set serviceName to item 3 of argv
    tell application "Messages"
        if serviceName is "SMS" then
            set targetService to 1st service whose service type = SMS
        else
            set targetService to 1st service whose service type = iMessage
        end if
        set targetBuddy to buddy targetHandle of targetService
        send imageFile to targetBuddy
    end tell
end run"#;

/// No-op round trip through Messages.
pub const PROBE: &str = r#"tell application "Messages"
    return "Messages app is accessible"
end tell"#;

/// Other participant of the frontmost conversation, `tel:` prefix removed.
pub const ACTIVE_PARTICIPANT: &str = r#"tell application "Messages"
    try
        set activeChat to item 1 of chats
        set chatParticipants to participants of activeChat
        repeat with chatParticipant in chatParticipants
            set participantID to id of chatParticipant
            if participantID does not start with "mailto:" and length of participantID > 5 then
                if participantID starts with "tel:" then
                    set participantID to text 5 thru -1 of participantID
                end if
                return participantID
            end if
        end repeat
        if (count of chatParticipants) > 0 then
            set firstParticipant to id of item 1 of chatParticipants
            if firstParticipant starts with "tel:" then
                return text 5 thru -1 of firstParticipant
            end if
            return firstParticipant
        end if
        return "No active conversation found"
    on error errorMessage
        return "Error: " & errorMessage
    end try
end tell"#;

/// A script plus the argv it runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInvocation {
    pub script: &'static str,
    pub args: Vec<String>,
}

impl ScriptInvocation {
    /// Send `text` to an already normalized recipient.
    ///
    /// The recipient goes first. Normalization strips every `-`, so it can't
    /// read as an osascript option and later arguments are inert.
    pub fn send_text(recipient: &str, text: &str, service: ServiceKind) -> Self {
        Self {
            script: SEND_TEXT,
            args: vec![
                recipient.to_string(),
                text.to_string(),
                service.script_arg().to_string(),
            ],
        }
    }

    pub fn send_file(recipient: &str, path: &str, service: ServiceKind) -> Self {
        Self {
            script: SEND_FILE,
            args: vec![
                recipient.to_string(),
                path.to_string(),
                service.script_arg().to_string(),
            ],
        }
    }

    pub fn probe() -> Self {
        Self {
            script: PROBE,
            args: Vec::new(),
        }
    }

    pub fn active_participant() -> Self {
        Self {
            script: ACTIVE_PARTICIPANT,
            args: Vec::new(),
        }
    }
}
