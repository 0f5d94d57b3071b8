//! Castline player theme and per-mount scoped styles
//!
//! Each mount injects one stylesheet whose selectors are scoped to that
//! mount's container id, so two players on a page never share rules. The
//! stylesheet is owned by a [`StyleGuard`] and removed when the guard drops.
//!
//! # Usage
//!
//! ```rust
//! use castline_core::theme::PlayerTheme;
//!
//! let css = PlayerTheme::default().stylesheet("castline-player-1");
//! assert!(css.contains("#castline-player-1"));
//! ```

use crate::{engine::MediaSurface, types::MountId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Prefix of every injected stylesheet and container id
pub const STYLE_ID_PREFIX: &str = "castline-player";

/// Player color palette
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerTheme {
    /// Accent for the progress bar and active menu items
    pub primary: String,
    /// Hover state of the accent
    pub primary_dark: String,
    /// Video background
    pub background: String,
    /// Quality menu background
    pub menu_background: String,
    pub text: String,
    /// Buffering indicator
    pub buffering: String,
}

impl Default for PlayerTheme {
    fn default() -> Self {
        Self {
            primary: "#9147ff".into(),
            primary_dark: "#772ce8".into(),
            background: "#0e0e10".into(),
            menu_background: "rgba(14, 14, 16, 0.95)".into(),
            text: "#efeff1".into(),
            buffering: "#bf94ff".into(),
        }
    }
}

impl PlayerTheme {
    /// Element id for a mount's container and stylesheet
    pub fn scope_id(mount_id: MountId) -> String {
        format!("{STYLE_ID_PREFIX}-{mount_id}")
    }

    /// Stylesheet with every rule scoped under `#scope_id`
    pub fn stylesheet(&self, scope_id: &str) -> String {
        format!(
            r#"#{scope} {{
  --castline-primary: {primary};
  --castline-primary-dark: {primary_dark};
  --castline-background: {background};
  --castline-text: {text};
  background: var(--castline-background);
  color: var(--castline-text);
}}

#{scope} .castline__progress {{
  accent-color: var(--castline-primary);
}}

#{scope} .castline__quality-menu {{
  background: {menu_background};
}}

#{scope} .castline__quality-menu [aria-checked="true"] {{
  color: var(--castline-primary);
}}

#{scope} .castline__quality-menu button:hover {{
  background: var(--castline-primary-dark);
}}

#{scope} .castline__buffering {{
  border-top-color: {buffering};
}}
"#,
            scope = scope_id,
            primary = self.primary,
            primary_dark = self.primary_dark,
            background = self.background,
            text = self.text,
            menu_background = self.menu_background,
            buffering = self.buffering,
        )
    }
}

/// An injected stylesheet; dropping the guard removes it from the surface
#[must_use = "dropping a StyleGuard removes the stylesheet immediately"]
pub struct StyleGuard {
    id: String,
    surface: Arc<dyn MediaSurface>,
}

impl StyleGuard {
    pub fn inject(surface: Arc<dyn MediaSurface>, id: impl Into<String>, css: &str) -> Self {
        let id = id.into();
        surface.inject_style(&id, css);
        debug!(style_id = %id, "Stylesheet injected");
        Self { id, surface }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for StyleGuard {
    fn drop(&mut self) {
        self.surface.remove_style(&self.id);
        debug!(style_id = %self.id, "Stylesheet removed");
    }
}

impl std::fmt::Debug for StyleGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StyleGuard").field("id", &self.id).finish()
    }
}
