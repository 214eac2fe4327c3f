//! Notification message templates with `{placeholder}` substitution.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    errors::Error,
    monitor::differ::{ChangeEvent, UNKNOWN_LEADER},
    Result,
};

/// One template per event kind. Placeholders: `{name}`, `{leader}`, `{old_name}`, `{new_name}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTemplates {
    pub created: String,
    pub removed: String,
    pub renamed: String,
}

impl NotificationTemplates {
    pub fn render(&self, event: &ChangeEvent) -> Result<String> {
        match event {
            ChangeEvent::Created { name, leader, .. } => render_template(
                &self.created,
                &[
                    ("name", name.as_str()),
                    ("leader", leader.as_deref().unwrap_or(UNKNOWN_LEADER)),
                ],
            ),
            ChangeEvent::Removed { name, .. } => render_template(&self.removed, &[("name", name.as_str())]),
            ChangeEvent::Renamed {
                old_name, new_name, ..
            } => render_template(
                &self.renamed,
                &[("old_name", old_name.as_str()), ("new_name", new_name.as_str())],
            ),
        }
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

/// Substitute `{key}` placeholders. `{{` and `}}` are literal braces.
/// A placeholder with no value is a configuration error.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_re().captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        match caps.get(1) {
            Some(key) => {
                let value = values
                    .iter()
                    .find(|(k, _)| *k == key.as_str())
                    .map(|(_, v)| *v)
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "notification template uses unknown placeholder {{{}}}",
                            key.as_str()
                        ))
                    })?;
                out.push_str(value);
            }
            None => out.push_str(&whole.as_str()[..1]),
        }
    }

    out.push_str(&template[last..]);
    Ok(out)
}
