//! Embedded static web assets for serve mode.
//!
//! Both files are compiled into the binary via `include_str!`, so no asset
//! files need to be distributed alongside it.

/// Stylesheet for the listing and detail pages.
pub const CSS: &str = include_str!("assets/docview.css");

/// Browser scroll-spy for the detail page TOC sidebar.
///
/// Observes level 1–3 heading anchors with an `IntersectionObserver` whose
/// root margin matches [`crate::spy::ActiveBand::default`], and marks the
/// topmost intersecting heading's TOC link as active.
pub const JS: &str = include_str!("assets/docview.js");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_uses_active_band_margins() {
        assert!(JS.contains("-20% 0px -70% 0px"));
        assert!(JS.contains("pagehide"));
    }

    #[test]
    fn css_styles_active_toc_link() {
        assert!(CSS.contains(".toc-sidebar a.active"));
    }
}
