//! One-line status messages.

use std::fmt;

pub struct StatusMessage {
    pub message: String,
    pub success: bool,
}

impl StatusMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: false,
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.success { "Success:" } else { "Error:" };
        writeln!(f, "{label} {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_display() {
        assert!(StatusMessage::success("Saved").to_string().starts_with("Success: Saved"));
        assert!(StatusMessage::failure("Nope").to_string().starts_with("Error: Nope"));
    }
}
