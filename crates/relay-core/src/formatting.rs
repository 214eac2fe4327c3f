//! String helpers for relayed messages and notification text.

use std::collections::BTreeMap;

use crate::{
    messaging::inbound::{Author, InboundAttachment},
    registry::SourceChannel,
};

pub const UNKNOWN_USER: &str = "Unknown User";
pub const TRUNCATION_MARKER: &str = "...";

const FORBIDDEN_USERNAME_PARTS: [&str; 5] = ["@", "#", ":", "```", "discord"];
const IMAGE_EXTENSIONS: [&str; 5] = [".png", ".jpg", ".jpeg", ".gif", ".webp"];
const DEFAULT_TEXT_COLOR: &str = "#FFFFFF";

/// Webhook usernames may not contain some substrings and are capped at `max_len` chars.
pub fn sanitize_webhook_username(username: &str, max_len: usize) -> String {
    let mut sanitized = username.to_string();
    for part in FORBIDDEN_USERNAME_PARTS {
        sanitized = sanitized.replace(part, "");
    }

    let sanitized = sanitized.trim();
    if sanitized.is_empty() {
        return UNKNOWN_USER.to_string();
    }

    sanitized.chars().take(max_len).collect()
}

/// CDN avatar URL; needs both the user id and the avatar hash.
pub fn avatar_url(author: &Author) -> Option<String> {
    let avatar = author.avatar.as_deref().filter(|a| !a.is_empty())?;
    let user_id = author.id.as_deref().filter(|id| !id.is_empty())?;
    Some(format!(
        "https://cdn.discordapp.com/avatars/{user_id}/{avatar}.png"
    ))
}

pub fn message_link(guild_id: &str, channel_id: &str, message_id: &str) -> Option<String> {
    if guild_id.is_empty() || channel_id.is_empty() || message_id.is_empty() {
        return None;
    }
    Some(format!(
        "https://discord.com/channels/{guild_id}/{channel_id}/{message_id}"
    ))
}

/// Origin line (and jump link) appended below relayed content. Starts with a blank line.
pub fn format_footer(source: &SourceChannel, link: Option<&str>) -> String {
    let mut parts = vec![
        String::new(),
        format!(
            "-# 📍 **{}** | #{}",
            source.guild_name, source.channel_name
        ),
    ];
    if let Some(link) = link {
        parts.push(format!("-# [Jump to Message]({link})"));
    }
    parts.join("\n")
}

/// Compact single-line list of attachment links, or `None` when nothing is linkable.
pub fn attachment_line(attachments: &[InboundAttachment], max: usize) -> Option<String> {
    let links: Vec<String> = attachments
        .iter()
        .take(max)
        .filter_map(|a| a.link().map(|url| format!("[{}]({url})", a.filename)))
        .collect();
    if links.is_empty() {
        return None;
    }
    Some(format!("-# {}", links.join(", ")))
}

/// Truncate to at most `max_len` chars; when cut, the marker is included in the budget.
pub fn truncate_text(s: &str, max_len: usize, marker: &str) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let marker_len = marker.chars().count();
    if max_len <= marker_len {
        return marker.chars().take(max_len).collect();
    }
    let mut out: String = s.chars().take(max_len - marker_len).collect();
    out.push_str(marker);
    out
}

pub fn is_image_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorSegment {
    pub text: String,
    pub color: String,
}

/// Split Minecraft `§`-coded text into coloured runs. Unknown codes are dropped.
pub fn parse_color_codes(text: &str, colors: &BTreeMap<String, String>) -> Vec<ColorSegment> {
    let mut segments = Vec::new();
    let mut color = DEFAULT_TEXT_COLOR.to_string();
    let mut current = String::new();

    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            if let Some(code) = chars.next() {
                if !current.is_empty() {
                    segments.push(ColorSegment {
                        text: std::mem::take(&mut current),
                        color: color.clone(),
                    });
                }
                if let Some(hex) = colors.get(&code.to_lowercase().to_string()) {
                    color = hex.clone();
                }
                continue;
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        segments.push(ColorSegment {
            text: current,
            color,
        });
    }
    segments
}

pub fn strip_color_codes(text: &str) -> String {
    parse_color_codes(text, &BTreeMap::new())
        .into_iter()
        .map(|s| s.text)
        .collect()
}

/// `#RRGGBB` (leading `#` optional) to a packed RGB integer.
pub fn parse_hex_color(hex: &str) -> Option<u32> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}
