//! Plain-text bodies for the messages the back office sends.

use super::EmailMessage;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

fn format_instant(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

#[must_use]
pub fn invitation(
    to: &str,
    invite_url: &str,
    role: &str,
    invited_by: &str,
    expires_at: OffsetDateTime,
) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "You have been invited to the back office".to_string(),
        body: format!(
            "{invited_by} invited you to join the back office as {role}.\n\n\
             Accept the invitation and choose a password:\n{invite_url}\n\n\
             This link can be used once and expires at {}.\n",
            format_instant(expires_at)
        ),
    }
}

#[must_use]
pub fn account_ready(to: &str, role: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Your back office account is ready".to_string(),
        body: format!(
            "Your {role} account is active. Sign in with this email and the password you chose.\n"
        ),
    }
}

#[must_use]
pub fn password_reset(to: &str, reset_url: &str, expires_at: OffsetDateTime) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Reset your password".to_string(),
        body: format!(
            "Someone asked to reset the password for this account.\n\n\
             Choose a new password here:\n{reset_url}\n\n\
             The link expires at {}. If this wasn't you, ignore this email.\n",
            format_instant(expires_at)
        ),
    }
}

#[must_use]
pub fn password_changed(to: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Your password was changed".to_string(),
        body: "Your password was changed and every signed-in device was logged out.\n\
               If this wasn't you, contact your restaurant owner right away.\n"
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn invitation_carries_link_and_expiry() {
        let message = invitation(
            "chef@bistro.fr",
            "https://maitre.dev/invite/accept?token=abc&tenant=1",
            "chef",
            "owner@bistro.fr",
            datetime!(2026-03-01 12:00 UTC),
        );
        assert_eq!(message.to, "chef@bistro.fr");
        assert!(message.body.contains("token=abc&tenant=1"));
        assert!(message.body.contains("2026-03-01T12:00:00Z"));
        assert!(message.body.contains("owner@bistro.fr"));
    }

    #[test]
    fn reset_carries_link() {
        let message = password_reset(
            "owner@bistro.fr",
            "https://maitre.dev/password-reset/confirm?token=xyz",
            datetime!(2026-03-01 13:00 UTC),
        );
        assert!(message.body.contains("confirm?token=xyz"));
    }
}
