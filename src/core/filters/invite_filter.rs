// Invite-link extraction.
//
// The pattern covers the `discord.gg` / `discord.io` / `discord.me` short
// hosts and the long `discordapp.com/invite/` form, with or without a
// protocol. The `[0-z]` code class is wider than the real invite alphabet
// (it spans punctuation between '9' and 'z' in ASCII); kept as-is because
// changing it changes which messages get flagged.

use std::sync::LazyLock;

use regex::Regex;

static INVITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:https?://)?discord(?:\.(?:gg|io|me)/|app\.com/invite/)([0-z]+)")
        .expect("invite pattern is valid")
});

/// Extracts invite codes from message content.
#[derive(Debug, Clone, Copy, Default)]
pub struct InviteFilter;

impl InviteFilter {
    pub fn new() -> Self {
        Self
    }

    /// The code of the *last* invite in the content, if any.
    ///
    /// When a message carries several invites only the final one is resolved
    /// and judged. Longstanding behavior; changing it would silently change
    /// which invite the allow-list is checked against.
    pub fn last_invite_code<'a>(&self, content: &'a str) -> Option<&'a str> {
        INVITE_RE
            .captures_iter(content)
            .last()
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}
